use bytes::Bytes;

/// Immutable view of a cached value.
///
/// The underlying storage is never mutated in place, so views can be cloned
/// cheaply and handed to callers without a caller's buffer reuse corrupting
/// the cache. `to_vec` gives an owned copy when a mutable buffer is needed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(s.as_bytes()),
        }
    }
}
