//! AES-CBC chunk decryption.

use aes::{Aes128, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::error::ContentError;

/// Size of a CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Decrypt one content blob into its plaintext chunk.
///
/// The cipher is AES-CBC with PKCS#7 padding; the AES variant is selected by
/// key length (16 bytes for legacy streams, 32 for newer ones). The
/// ciphertext must be a non-empty whole number of blocks.
pub fn decrypt_chunk(
    key: &[u8],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ContentError> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(ContentError::DecryptionFailed);
    }

    let plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| ContentError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ContentError::DecryptionFailed)?,
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| ContentError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ContentError::DecryptionFailed)?,
        len => return Err(ContentError::InvalidKeyLength { len }),
    };

    Ok(plaintext)
}

/// Encrypt a plaintext chunk. Fixture helper for tests; the server itself
/// never authors content.
#[cfg(any(test, feature = "test-util"))]
pub fn encrypt_chunk(
    key: &[u8],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, ContentError> {
    use cbc::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;
    type Aes256CbcEnc = cbc::Encryptor<Aes256>;

    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| ContentError::DecryptionFailed)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| ContentError::DecryptionFailed)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        len => return Err(ContentError::InvalidKeyLength { len }),
    };

    Ok(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_roundtrip_aes128() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; IV_SIZE];
        let plaintext = b"twenty bytes exactly";

        let ciphertext = encrypt_chunk(&key, &iv, plaintext).unwrap();
        assert_eq!(ciphertext.len() % 16, 0);

        let decrypted = decrypt_chunk(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_roundtrip_aes256() {
        let key = [0x33u8; 32];
        let iv = [0x44u8; IV_SIZE];
        let plaintext: Vec<u8> = (0..100_000).map(|i| (i % 251) as u8).collect();

        let ciphertext = encrypt_chunk(&key, &iv, &plaintext).unwrap();
        let decrypted = decrypt_chunk(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn block_aligned_plaintext_gains_full_padding_block() {
        let key = [0x55u8; 16];
        let iv = [0u8; IV_SIZE];
        let plaintext = [0xAAu8; 32];

        let ciphertext = encrypt_chunk(&key, &iv, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), 48);

        let decrypted = decrypt_chunk(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let key = [0x66u8; 16];
        let wrong = [0x77u8; 16];
        let iv = [0u8; IV_SIZE];

        let ciphertext = encrypt_chunk(&key, &iv, b"secret chunk").unwrap();
        // Wrong-key CBC either trips the padding check or yields garbage;
        // it must never reproduce the plaintext.
        match decrypt_chunk(&wrong, &iv, &ciphertext) {
            Err(ContentError::DecryptionFailed) => {}
            Ok(garbage) => assert_ne!(garbage, b"secret chunk"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unsupported_key_length() {
        let iv = [0u8; IV_SIZE];
        let result = decrypt_chunk(&[0u8; 24], &iv, &[0u8; 16]);
        assert!(matches!(
            result,
            Err(ContentError::InvalidKeyLength { len: 24 })
        ));
    }

    #[test]
    fn rejects_partial_block_ciphertext() {
        let iv = [0u8; IV_SIZE];
        assert!(matches!(
            decrypt_chunk(&[0u8; 16], &iv, &[0u8; 15]),
            Err(ContentError::DecryptionFailed)
        ));
        assert!(matches!(
            decrypt_chunk(&[0u8; 16], &iv, &[]),
            Err(ContentError::DecryptionFailed)
        ));
    }
}
