use serde::Serialize;
use sha2::{Digest, Sha256};

/// Identity of an uploaded file: its name plus a SHA-256 of its bytes.
///
/// Two uploads with the same name but different content are different
/// documents; the same bytes under another name are too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentIdentity {
    pub filename: String,
    /// Lowercase hex digest
    pub sha256: String,
}

impl DocumentIdentity {
    pub fn from_upload(filename: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            filename: filename.to_string(),
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

impl std::fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.filename, &self.sha256[..12.min(self.sha256.len())])
    }
}
