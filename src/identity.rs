use sha2::{Digest, Sha256};

/// Content-addressed identity for a message: SHA-256 of the trimmed text.
///
/// Two messages with the same text share a fingerprint, so a legitimately
/// repeated message cannot be told apart from a re-poll of the same one.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.trim().as_bytes()))
}

/// Tracks the fingerprint of the last processed message.
///
/// Starts empty and lives only as long as the owning monitor.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    last_seen: Option<String>,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `text` differs from the last observed message, along
    /// with its fingerprint. A new fingerprint replaces the stored one.
    pub fn is_new(&mut self, text: &str) -> (bool, String) {
        let fp = fingerprint(text);
        if self.last_seen.as_deref() == Some(fp.as_str()) {
            return (false, fp);
        }
        self.last_seen = Some(fp.clone());
        (true, fp)
    }
}
