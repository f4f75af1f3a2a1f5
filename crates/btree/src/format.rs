use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Seek, SeekFrom, Write};

/// Records per leaf block.
pub const LEAF_FANOUT: usize = 32;
/// Child pointers per inner node.
pub const INNER_FANOUT: usize = 32;
/// Target false-positive rate for the embedded bloom filter.
pub const BLOOM_FPR: f64 = 0.01;

/// Trailer size: `bloom_size: u32` + `root_offset: u64`.
pub const TRAILER_BYTES: u64 = 4 + 8;
/// The zero length prefix the writer places after the last block.
pub const BLOCK_SENTINEL_BYTES: u64 = 4;

/// Writes the trailer: `(bloom_size, root_offset)`, big-endian.
pub fn write_trailer<W: Write>(w: &mut W, bloom_size: u32, root_offset: u64) -> IoResult<()> {
    w.write_u32::<BigEndian>(bloom_size)?;
    w.write_u64::<BigEndian>(root_offset)?;
    Ok(())
}

/// Reads the trailer from the end of the file.
///
/// Returns `(file_size, bloom_size, root_offset)`. The caller validates the
/// offsets against the file size.
pub fn read_trailer<R: Read + Seek>(r: &mut R) -> IoResult<(u64, u32, u64)> {
    let file_size = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(file_size.saturating_sub(TRAILER_BYTES)))?;
    let bloom_size = r.read_u32::<BigEndian>()?;
    let root_offset = r.read_u64::<BigEndian>()?;
    Ok((file_size, bloom_size, root_offset))
}
