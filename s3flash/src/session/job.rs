//! Flash jobs.

use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Load offset of the application image.
pub const DEFAULT_ADDRESS: u32 = 0x0;

/// One erase+write request. The image and flags are fixed at creation.
#[derive(Debug, Clone)]
pub struct FlashJob {
    image: Arc<[u8]>,
    address: u32,
    erase_requested: bool,
    digest: Option<Vec<u8>>,
}

impl FlashJob {
    /// A job writing `image` at [`DEFAULT_ADDRESS`] without erasing first.
    pub fn new(image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            image: image.into(),
            address: DEFAULT_ADDRESS,
            erase_requested: false,
            digest: None,
        }
    }

    /// Erase the whole flash before writing.
    #[must_use]
    pub fn with_erase(mut self, erase: bool) -> Self {
        self.erase_requested = erase;
        self
    }

    /// Compute a SHA-256 of the image and ask the engine to verify the write.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.digest = verify.then(|| Sha256::digest(&self.image).to_vec());
        self
    }

    /// Image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Load offset.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Whether an erase runs before the write.
    pub fn erase_requested(&self) -> bool {
        self.erase_requested
    }

    /// Whether verification was requested.
    pub fn verify(&self) -> bool {
        self.digest.is_some()
    }

    /// Hex SHA-256 of the image, when verification was requested.
    pub fn digest_hex(&self) -> Option<String> {
        self.digest.as_ref().map(hex::encode)
    }
}

/// What a completed flash job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    /// Highest byte count the engine reported.
    pub bytes_written: usize,
    /// Image size.
    pub bytes_total: usize,
    /// Hex SHA-256 of the image, when verification was requested.
    pub digest: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let job = FlashJob::new(vec![0xE9u8; 16]);
        assert_eq!(job.address(), 0x0);
        assert_eq!(job.len(), 16);
        assert!(!job.erase_requested());
        assert!(!job.verify());
        assert!(job.digest_hex().is_none());
    }

    #[test]
    fn test_verify_computes_sha256() {
        let job = FlashJob::new(b"abc".to_vec()).with_verify(true);
        assert_eq!(
            job.digest_hex().as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(!job.with_verify(false).verify());
    }

    #[test]
    fn test_empty_image() {
        assert!(FlashJob::new(Vec::new()).is_empty());
    }
}
