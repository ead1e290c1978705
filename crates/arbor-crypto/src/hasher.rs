use arbor_types::ContentHash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"arbor-node-v1"`) that is
/// prepended to every hash computation, so identical bytes hashed in
/// different domains never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for serialized tree nodes.
    pub const NODE: Self = Self {
        domain: "arbor-node-v1",
    };

    /// Start an incremental hash in this domain.
    pub fn builder(&self) -> HashBuilder {
        let mut inner = blake3::Hasher::new();
        inner.update(self.domain.as_bytes());
        inner.update(b":");
        HashBuilder { inner }
    }
}

/// Incremental hash state returned by [`ContentHasher::builder`].
pub struct HashBuilder {
    inner: blake3::Hasher,
}

impl HashBuilder {
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn finalize(&self) -> ContentHash {
        ContentHash::from_hash(*self.inner.finalize().as_bytes())
    }
}
