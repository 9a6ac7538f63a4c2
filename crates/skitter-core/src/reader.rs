//! Snapshot of a byte stream that can be re-read any number of times, so a
//! single response body can feed several parsers.

use std::io::{self, Cursor, Read};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MultipleReader {
    data: Arc<[u8]>,
}

impl MultipleReader {
    /// Drains `reader` into an in-memory snapshot.
    pub fn new(mut reader: impl Read) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(MultipleReader { data: data.into() })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        MultipleReader { data: data.into() }
    }

    /// A fresh reader positioned at the start of the snapshot.
    pub fn reader(&self) -> impl Read + 'static {
        Cursor::new(Arc::clone(&self.data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_can_be_consumed_repeatedly() {
        let source: &[u8] = b"<html>hello</html>";
        let snap = MultipleReader::new(source).unwrap();
        for _ in 0..3 {
            let mut buf = String::new();
            snap.reader().read_to_string(&mut buf).unwrap();
            assert_eq!(buf, "<html>hello</html>");
        }
        assert_eq!(snap.len(), 18);
    }

    #[test]
    fn empty_source_yields_empty_snapshot() {
        let snap = MultipleReader::from_bytes(Vec::new());
        assert!(snap.is_empty());
        let mut buf = Vec::new();
        snap.reader().read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }
}
