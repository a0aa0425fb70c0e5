use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

/// Marks a stored value as ciphertext
pub const ENCRYPTED_PREFIX: &str = "Encrypted: ";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(base64::DecodeError),

    #[error("Invalid key length: expected 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Decryption failed: wrong key or tampered ciphertext")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decoded value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid base64 value: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Cipher built for a single call. Never stored, so concurrent jobs with
/// different keys cannot observe each other's key or IV.
enum TokenCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl TokenCipher {
    fn from_base64_key(key_b64: &str) -> Result<Self, CryptoError> {
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(CryptoError::InvalidKeyEncoding)?;

        match key.len() {
            16 => Aes128Gcm::new_from_slice(&key)
                .map(Self::Aes128)
                .map_err(|_| CryptoError::InvalidKeyLength(16)),
            32 => Aes256Gcm::new_from_slice(&key)
                .map(Self::Aes256)
                .map_err(|_| CryptoError::InvalidKeyLength(32)),
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    }

    fn encrypt(&self, iv: &[u8; IV_LEN], plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(iv);
        match self {
            Self::Aes128(cipher) => cipher.encrypt(nonce, plain),
            Self::Aes256(cipher) => cipher.encrypt(nonce, plain),
        }
        .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(iv);
        match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            Self::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

pub struct EncryptionService;

impl EncryptionService {
    /// Encrypts `plain_text` with AES-GCM under `key_b64`.
    /// Returns `"Encrypted: " + base64(iv || ciphertext || tag)`.
    pub fn encrypt(plain_text: &str, key_b64: &str) -> Result<String, CryptoError> {
        if plain_text.is_empty() {
            return Ok(String::new());
        }

        let cipher = TokenCipher::from_base64_key(key_b64)?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = cipher.encrypt(&iv, plain_text.as_bytes())?;

        let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", ENCRYPTED_PREFIX, BASE64.encode(combined)))
    }

    /// Decrypts a value produced by [`EncryptionService::encrypt`].
    /// Values without the prefix are returned unchanged.
    pub fn decrypt(cipher_text: &str, key_b64: &str) -> Result<String, CryptoError> {
        if cipher_text.is_empty() {
            return Ok(String::new());
        }

        let Some(encoded) = cipher_text.strip_prefix(ENCRYPTED_PREFIX) else {
            tracing::warn!("Value passed for decryption is not encrypted, using it as-is");
            return Ok(cipher_text.to_string());
        };

        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

        if decoded.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::MalformedCiphertext(format!(
                "expected at least {} bytes, got {}",
                IV_LEN + TAG_LEN,
                decoded.len()
            )));
        }

        let cipher = TokenCipher::from_base64_key(key_b64)?;
        let plaintext = cipher.decrypt(&decoded[..IV_LEN], &decoded[IV_LEN..])?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    pub fn is_encrypted(text: &str) -> bool {
        text.starts_with(ENCRYPTED_PREFIX)
    }

    /// Fresh random 256-bit key, base64 encoded
    pub fn new_base64_secret_256() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    pub fn encode_base64(text: &str) -> String {
        BASE64.encode(text.as_bytes())
    }

    pub fn decode_base64(text: &str) -> Result<String, CryptoError> {
        let bytes = BASE64.decode(text.trim())?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_aes256() {
        let key = EncryptionService::new_base64_secret_256();
        let encrypted = EncryptionService::encrypt("bearer-secret", &key).unwrap();

        assert!(EncryptionService::is_encrypted(&encrypted));
        assert!(!encrypted.contains("bearer-secret"));
        assert_eq!(
            EncryptionService::decrypt(&encrypted, &key).unwrap(),
            "bearer-secret"
        );
    }

    #[test]
    fn test_round_trip_aes128() {
        let key = BASE64.encode([7u8; 16]);
        let encrypted = EncryptionService::encrypt("short key", &key).unwrap();
        assert_eq!(EncryptionService::decrypt(&encrypted, &key).unwrap(), "short key");
    }

    #[test]
    fn test_random_iv_per_call() {
        let key = EncryptionService::new_base64_secret_256();
        let a = EncryptionService::encrypt("same", &key).unwrap();
        let b = EncryptionService::encrypt("same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_is_detected() {
        let key = EncryptionService::new_base64_secret_256();
        let other = EncryptionService::new_base64_secret_256();
        let encrypted = EncryptionService::encrypt("bearer-secret", &key).unwrap();

        let result = EncryptionService::decrypt(&encrypted, &other);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_is_detected() {
        let key = EncryptionService::new_base64_secret_256();
        let encrypted = EncryptionService::encrypt("bearer-secret", &key).unwrap();

        let mut raw = BASE64
            .decode(encrypted.strip_prefix(ENCRYPTED_PREFIX).unwrap())
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = format!("{}{}", ENCRYPTED_PREFIX, BASE64.encode(raw));

        assert!(matches!(
            EncryptionService::decrypt(&tampered, &key),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_plaintext_and_empty_passthrough() {
        let key = EncryptionService::new_base64_secret_256();
        assert_eq!(EncryptionService::decrypt("not secret", &key).unwrap(), "not secret");
        assert_eq!(EncryptionService::decrypt("", &key).unwrap(), "");
        assert_eq!(EncryptionService::encrypt("", &key).unwrap(), "");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            EncryptionService::encrypt("x", "not base64!!"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            EncryptionService::encrypt("x", &BASE64.encode([1u8; 20])),
            Err(CryptoError::InvalidKeyLength(20))
        ));
    }

    #[test]
    fn test_short_ciphertext_is_malformed() {
        let key = EncryptionService::new_base64_secret_256();
        let short = format!("{}{}", ENCRYPTED_PREFIX, BASE64.encode([0u8; 10]));
        assert!(matches!(
            EncryptionService::decrypt(&short, &key),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_base64_helpers() {
        let encoded = EncryptionService::encode_base64("token-B");
        assert_eq!(EncryptionService::decode_base64(&encoded).unwrap(), "token-B");
        assert!(EncryptionService::decode_base64("***").is_err());
    }
}
