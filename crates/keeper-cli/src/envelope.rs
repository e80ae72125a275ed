//! Client-side payload encryption.
//!
//! Item payloads are sealed with AES-256-GCM before they leave the client.
//! The key is `SHA-256(secret)`, with no salt and no work factor, so it is
//! only as strong as the secret itself.
//!
//! Sealed format: `ciphertext || tag (16 bytes) || nonce (12 bytes)`. Every
//! call to [`seal`] draws a fresh nonce from `OsRng`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Result, anyhow, bail};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

fn cipher(secret: &str) -> Aes256Gcm {
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()))
}

/// Encrypt `plaintext` under `secret`.
///
/// # Errors
///
/// Returns an error if the AEAD operation fails.
pub fn seal(secret: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut sealed = cipher(secret)
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("encryption failed: {e}"))?;
    sealed.extend_from_slice(&nonce);
    Ok(sealed)
}

/// Decrypt bytes produced by [`seal`].
///
/// # Errors
///
/// Fails if the input is too short to hold a tag and nonce, or if the tag
/// does not verify (wrong secret or tampered data). No partial plaintext is
/// ever returned.
pub fn open(secret: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        bail!(
            "encrypted payload too short: {} bytes, need at least {}",
            sealed.len(),
            NONCE_LEN + TAG_LEN
        );
    }
    let (ciphertext, nonce) = sealed.split_at(sealed.len() - NONCE_LEN);
    cipher(secret)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| anyhow!("decryption failed: wrong secret or corrupted data"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn open_reverses_seal() {
        let sealed = seal("s3cr3t", b"card 4111").unwrap();
        assert_eq!(sealed.len(), b"card 4111".len() + TAG_LEN + NONCE_LEN);
        assert_eq!(open("s3cr3t", &sealed).unwrap(), b"card 4111");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let a = seal("s3cr3t", b"same").unwrap();
        let b = seal("s3cr3t", b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[a.len() - NONCE_LEN..], b[b.len() - NONCE_LEN..]);
    }

    #[test]
    fn wrong_secret_fails() {
        let sealed = seal("right", b"payload").unwrap();
        assert!(open("wrong", &sealed).is_err());
    }

    #[test]
    fn tampering_fails() {
        let mut sealed = seal("s3cr3t", b"payload").unwrap();
        sealed[0] ^= 0xFF;
        assert!(open("s3cr3t", &sealed).is_err());
    }

    #[test]
    fn short_input_fails_cleanly() {
        let err = open("s3cr3t", &[0u8; 27]).unwrap_err();
        assert!(err.to_string().contains("too short"));
        assert!(open("s3cr3t", &[]).is_err());
    }

    #[test]
    fn empty_plaintext_is_fine() {
        let sealed = seal("s3cr3t", b"").unwrap();
        assert!(open("s3cr3t", &sealed).unwrap().is_empty());
    }

    #[test]
    fn every_length_survives_a_round_trip() {
        for len in 0..=64u8 {
            let plaintext: Vec<u8> = (0..len).collect();
            let sealed = seal("s3cr3t", &plaintext).unwrap();
            assert_eq!(open("s3cr3t", &sealed).unwrap(), plaintext, "len {len}");
        }
    }

    #[test]
    fn random_buffers_survive_a_round_trip() {
        use rand::{Rng, RngCore};

        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let mut plaintext = vec![0u8; rng.gen_range(0..4096)];
            rng.fill_bytes(&mut plaintext);
            let sealed = seal("s3cr3t", &plaintext).unwrap();
            assert_eq!(open("s3cr3t", &sealed).unwrap(), plaintext);
        }
    }
}
