//! Storage key construction.
//!
//! Keys are `/`-separated ASCII scope segments followed by fixed-width
//! binary suffixes (addresses, big-endian integers). Prefix scans always
//! stop at a segment boundary, so binary suffixes never need escaping.

use peg_types::Address;

/// Builder for a storage key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(root: &str) -> Self {
        Self(root.as_bytes().to_vec())
    }

    /// Append a `/`-separated text segment.
    pub fn seg(mut self, segment: &str) -> Self {
        self.0.push(b'/');
        self.0.extend_from_slice(segment.as_bytes());
        self
    }

    /// Append a trailing separator, turning the key into a scan prefix.
    pub fn dir(mut self) -> Self {
        self.0.push(b'/');
        self
    }

    pub fn addr(mut self, address: &Address) -> Self {
        self.0.extend_from_slice(address.as_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn byte(mut self, value: u8) -> Self {
        self.0.push(value);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_and_suffixes() {
        let addr = Address::from_low_u8(9);
        let key = Key::new("ledger").seg("AGC").seg("bal").dir().addr(&addr);
        let mut expected = b"ledger/AGC/bal/".to_vec();
        expected.extend_from_slice(addr.as_bytes());
        assert_eq!(key.into_vec(), expected);
    }

    #[test]
    fn integers_are_big_endian() {
        let key = Key::new("k").dir().u64(1);
        assert_eq!(key.as_bytes(), b"k/\0\0\0\0\0\0\0\x01");
    }
}
