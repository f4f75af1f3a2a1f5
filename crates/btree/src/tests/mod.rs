mod reader_tests;

use crate::Record;

/// Shorthand for building records in tests; `None` is a tombstone.
pub(crate) fn rec(key: &[u8], value: Option<&[u8]>) -> Record {
    Record {
        key: key.to_vec(),
        value: value.map(|v| v.to_vec()),
    }
}

/// Writes `records` (already sorted) to a fresh level file at `path`.
pub(crate) fn write_records(path: &std::path::Path, records: Vec<Record>) -> crate::Result<u64> {
    crate::BTreeWriter::write_from_iterator(path, records.len(), records)
}
