//! # Frame Cipher
//!
//! Resettable Blowfish keystream used by the encrypted framing mode.
//!
//! The cipher runs in output-feedback mode from a zero IV: each 8-byte
//! keystream block is the Blowfish encryption of the previous one, and data
//! is XORed against it. Encryption and decryption are therefore the same
//! operation, and a message may be processed in any number of slices as long
//! as the slices are contiguous. [`FrameCipher::reset`] rewinds to the IV;
//! both peers reset after every complete message.
//!
//! ## Security
//! - Key bytes are held in [`Zeroizing`] and wiped on drop.
//! - Blowfish accepts keys of 4 to 56 bytes.

use crate::error::{ProtocolError, Result};
use blowfish::cipher::{Block, BlockEncrypt, KeyInit};
use blowfish::Blowfish;
use zeroize::{Zeroize, Zeroizing};

const BLOCK: usize = 8;

pub const MIN_KEY_LEN: usize = 4;
pub const MAX_KEY_LEN: usize = 56;

#[derive(Clone)]
pub struct FrameCipher {
    cipher: Blowfish,
    key: Zeroizing<Vec<u8>>,
    feedback: Block<Blowfish>,
    /// Offset into `feedback` of the next unused keystream byte; `BLOCK`
    /// means a fresh block must be generated first.
    used: usize,
}

impl FrameCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len()) {
            return Err(ProtocolError::Cipher(format!(
                "key length {} outside {MIN_KEY_LEN}..={MAX_KEY_LEN}",
                key.len()
            )));
        }
        let cipher = <Blowfish as KeyInit>::new_from_slice(key)
            .map_err(|e| ProtocolError::Cipher(e.to_string()))?;
        Ok(Self {
            cipher,
            key: Zeroizing::new(key.to_vec()),
            feedback: Block::<Blowfish>::default(),
            used: BLOCK,
        })
    }

    /// Transforms `data` in place, continuing the current keystream.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == BLOCK {
                self.cipher.encrypt_block(&mut self.feedback);
                self.used = 0;
            }
            *byte ^= self.feedback[self.used];
            self.used += 1;
        }
    }

    /// Rewinds the keystream to its initial state.
    pub fn reset(&mut self) {
        self.feedback.as_mut_slice().zeroize();
        self.used = BLOCK;
    }

    /// A fresh cipher with the same key, for a new connection.
    pub fn fork(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCipher")
            .field("key_len", &self.key.len())
            .field("used", &self.used)
            .finish()
    }
}

impl Drop for FrameCipher {
    fn drop(&mut self) {
        self.feedback.as_mut_slice().zeroize();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_apply_is_involution_after_reset() {
        let mut cipher = FrameCipher::new(b"secret key").unwrap();
        let plain = b"The quick brown fox jumps over the lazy dog".to_vec();
        let mut data = plain.clone();
        cipher.apply(&mut data);
        assert_ne!(data, plain);
        cipher.reset();
        cipher.apply(&mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn test_split_application_matches_whole() {
        let mut whole = FrameCipher::new(b"0123456789").unwrap();
        let mut split = whole.fork();
        let mut a = vec![0x5Au8; 29];
        let mut b = a.clone();
        whole.apply(&mut a);
        split.apply(&mut b[..8]);
        split.apply(&mut b[8..11]);
        split.apply(&mut b[11..]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_length_bounds() {
        assert!(FrameCipher::new(b"abc").is_err());
        assert!(FrameCipher::new(&[1u8; 57]).is_err());
        assert_eq!(FrameCipher::new(&[1u8; 56]).unwrap().key_len(), 56);
    }
}
