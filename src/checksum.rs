//! Incremental MD5 checksum engine.
//!
//! Both sides hash the exact payload bytes they wrote or read, in order,
//! and render the final digest as 32 lowercase hex characters.

use digest::Digest;

/// Streaming MD5 hasher.
#[derive(Clone, Debug, Default)]
pub struct Md5Hasher {
    inner: md5::Md5,
}

impl Md5Hasher {
    /// Creates a hasher with an empty state.
    pub fn new() -> Self {
        Self {
            inner: md5::Md5::new(),
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalizes the digest and renders it as lowercase hex.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Computes the MD5 digest of `data` in one shot, as lowercase hex.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Md5Hasher::new();
    hasher.update(data);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vectors() {
        assert_eq!(digest_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest_hex(b"hello\n"), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = Md5Hasher::new();
        let mid = data.len() / 2;
        hasher.update(&data[..mid]);
        hasher.update(&data[mid..]);
        assert_eq!(hasher.finalize_hex(), digest_hex(data));
    }
}
