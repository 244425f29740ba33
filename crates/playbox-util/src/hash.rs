/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Incremental fingerprint over `(path, content)` pairs.
///
/// Each entry is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
/// Callers feed entries in a stable order.
#[derive(Debug, Default)]
pub struct Fingerprint {
    hasher: blake3::Hasher,
}

impl Fingerprint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, path: &str, content: &[u8]) {
        self.hasher.update(&(path.len() as u64).to_le_bytes());
        self.hasher.update(path.as_bytes());
        self.hasher.update(&(content.len() as u64).to_le_bytes());
        self.hasher.update(content);
    }

    #[must_use]
    pub fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_bytes() {
        let hash = blake3_bytes(b"hello world");
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_fingerprint_is_boundary_sensitive() {
        let mut a = Fingerprint::new();
        a.entry("ab", b"c");
        let mut b = Fingerprint::new();
        b.entry("a", b"bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let build = || {
            let mut f = Fingerprint::new();
            f.entry("/main.ts", b"let x = 1");
            f.entry("/a.css", b"body{}");
            f.finish()
        };
        assert_eq!(build(), build());
        assert_eq!(build().len(), 64);
    }
}
