//! Secure memory handling with automatic zeroization
//!
//! Zeroing is best effort: the buffers below are wiped on drop and on
//! explicit `zeroize()`, but copies the allocator made while a `Vec` or
//! `String` grew are out of reach.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// 256-bit key derived for a single field operation - zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    /// Create a new key from raw bytes
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key bytes (use carefully - avoid copying)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Mutable secret byte buffer - zeroed when dropped or replaced
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_text(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }

    /// Get the secret bytes (use carefully)
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reinterpret as text, keeping the buffer wiped on failure.
    pub fn into_secret_string(mut self) -> Option<SecretString> {
        let bytes = std::mem::take(&mut self.bytes);
        match String::from_utf8(bytes) {
            Ok(value) => Some(SecretString::new(value)),
            Err(err) => {
                err.into_bytes().zeroize();
                None
            }
        }
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Decrypted secret value - automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    /// Create a new secret string
    pub fn new(value: String) -> Self {
        Self { value }
    }

    /// Get the secret value (use carefully)
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Consume and return the inner value
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.value)
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_bytes_zeroize_clears_buffer() {
        let mut secret = SecretBytes::from_text("hunter2");
        assert_eq!(secret.expose(), b"hunter2");

        secret.zeroize();
        assert!(secret.is_empty());
    }

    #[test]
    fn test_secret_bytes_into_string() {
        let secret = SecretBytes::from_text("pässword");
        assert_eq!(secret.into_secret_string().unwrap().expose(), "pässword");

        let invalid = SecretBytes::new(vec![0xff, 0xfe]);
        assert!(invalid.into_secret_string().is_none());
    }

    #[test]
    fn test_secret_string_expose() {
        let secret = SecretString::new("my-secret".to_string());
        assert_eq!(secret.expose(), "my-secret");
    }

    #[test]
    fn test_debug_redacted() {
        let key = DerivedKey::new([7u8; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));

        let secret = SecretBytes::from_text("topsecret");
        assert!(!format!("{:?}", secret).contains("topsecret"));
    }
}
