//! Node block codec.
//!
//! A block is the self-describing unit of a level file:
//!
//! ```text
//! [length: u32][level: u16][payload: length-2 bytes]
//! ```
//!
//! `level == 0` marks a leaf whose payload is a sorted run of records;
//! `level > 0` marks an inner node whose payload is a sorted run of
//! `(separator key, child pointer)` pairs. A `length` of 0 is not a block at
//! all — it is the sentinel the writer places after the last block so
//! sequential scans know where the block region ends.
//!
//! All integers are big-endian.

use byteorder::{BigEndian, ReadBytesExt};

/// Value tag for a live record.
pub const TAG_VALUE: u8 = 0;
/// Value tag for a tombstone. Tombstones are encoded with a zero-length
/// value so they are distinguishable from every legal user value by the tag
/// alone.
pub const TAG_TOMBSTONE: u8 = 1;

/// One key-value entry of a leaf. `value == None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Pointer from an inner node to one child block.
///
/// `first_key` is the smallest key reachable through the child, so an inner
/// node's children partition the key space into half-open intervals
/// `[K_i, K_i+1)` with the last child unbounded above. `size` is the child's
/// full on-disk footprint including its 4-byte length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPtr {
    pub first_key: Vec<u8>,
    pub offset: u64,
    pub size: u32,
}

/// A decoded node block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Vec<Record>),
    Inner(Vec<ChildPtr>),
}

/// Encodes a leaf block (level 0), complete with its length prefix.
pub(crate) fn encode_leaf(records: &[Record]) -> Vec<u8> {
    let mut payload = Vec::new();
    for r in records {
        payload.extend_from_slice(&(r.key.len() as u32).to_be_bytes());
        payload.extend_from_slice(&r.key);
        match &r.value {
            Some(v) => {
                payload.push(TAG_VALUE);
                payload.extend_from_slice(&(v.len() as u32).to_be_bytes());
                payload.extend_from_slice(v);
            }
            None => {
                payload.push(TAG_TOMBSTONE);
                payload.extend_from_slice(&0u32.to_be_bytes());
            }
        }
    }
    frame(0, payload)
}

/// Encodes an inner block at the given height (level >= 1), complete with
/// its length prefix.
pub(crate) fn encode_inner(level: u16, children: &[ChildPtr]) -> Vec<u8> {
    let mut payload = Vec::new();
    for c in children {
        payload.extend_from_slice(&(c.first_key.len() as u32).to_be_bytes());
        payload.extend_from_slice(&c.first_key);
        payload.extend_from_slice(&c.offset.to_be_bytes());
        payload.extend_from_slice(&c.size.to_be_bytes());
    }
    frame(level, payload)
}

fn frame(level: u16, payload: Vec<u8>) -> Vec<u8> {
    let length = (payload.len() + 2) as u32;
    let mut out = Vec::with_capacity(4 + payload.len() + 2);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&level.to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Decodes a block body (the `length` bytes following the length prefix:
/// level tag plus payload).
///
/// Returns a human-readable detail string on failure; the caller attaches
/// the file path and wraps it as a corruption error.
pub(crate) fn decode(body: &[u8]) -> std::result::Result<Node, String> {
    let mut rd = body;
    let level = rd
        .read_u16::<BigEndian>()
        .map_err(|_| "block shorter than its level tag".to_string())?;

    if level == 0 {
        let mut records = Vec::new();
        while !rd.is_empty() {
            let key = read_chunk(&mut rd, "record key")?;
            let tag = rd
                .read_u8()
                .map_err(|_| "record truncated before value tag".to_string())?;
            let value = match tag {
                TAG_VALUE => Some(read_chunk(&mut rd, "record value")?),
                TAG_TOMBSTONE => {
                    let len = rd
                        .read_u32::<BigEndian>()
                        .map_err(|_| "tombstone truncated".to_string())?;
                    if len != 0 {
                        return Err(format!("tombstone carries {} payload bytes", len));
                    }
                    None
                }
                other => return Err(format!("unknown value tag {}", other)),
            };
            records.push(Record { key, value });
        }
        Ok(Node::Leaf(records))
    } else {
        let mut children = Vec::new();
        while !rd.is_empty() {
            let first_key = read_chunk(&mut rd, "separator key")?;
            let offset = rd
                .read_u64::<BigEndian>()
                .map_err(|_| "child pointer truncated".to_string())?;
            let size = rd
                .read_u32::<BigEndian>()
                .map_err(|_| "child pointer truncated".to_string())?;
            children.push(ChildPtr {
                first_key,
                offset,
                size,
            });
        }
        if children.is_empty() {
            return Err("inner node with no children".to_string());
        }
        Ok(Node::Inner(children))
    }
}

/// Reads a `u32` length followed by that many bytes.
fn read_chunk(rd: &mut &[u8], what: &str) -> std::result::Result<Vec<u8>, String> {
    let len = rd
        .read_u32::<BigEndian>()
        .map_err(|_| format!("{} length truncated", what))? as usize;
    if rd.len() < len {
        return Err(format!(
            "{} length {} exceeds remaining block bytes {}",
            what,
            len,
            rd.len()
        ));
    }
    let (chunk, rest) = rd.split_at(len);
    let out = chunk.to_vec();
    *rd = rest;
    Ok(out)
}
