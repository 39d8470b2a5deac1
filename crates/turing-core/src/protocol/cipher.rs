//! Frame cipher.
//!
//! The device expects DES with a fixed key, chained block-to-block with the
//! key doubling as IV. Chaining restarts for every frame, so each frame is an
//! independent fixed-key transform.

use des::Des;
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use super::constants::CIPHER_KEY;

const BLOCK_LEN: usize = 8;

/// Encrypt `data` in place. Length must be a multiple of 8.
pub fn encrypt_in_place(data: &mut [u8]) {
    debug_assert_eq!(data.len() % BLOCK_LEN, 0);
    let cipher = Des::new(GenericArray::from_slice(&CIPHER_KEY));

    let mut prev = CIPHER_KEY;
    for block in data.chunks_exact_mut(BLOCK_LEN) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        prev.copy_from_slice(block);
    }
}

/// Decrypt `data` in place. Length must be a multiple of 8.
pub fn decrypt_in_place(data: &mut [u8]) {
    debug_assert_eq!(data.len() % BLOCK_LEN, 0);
    let cipher = Des::new(GenericArray::from_slice(&CIPHER_KEY));

    let mut prev = CIPHER_KEY;
    for block in data.chunks_exact_mut(BLOCK_LEN) {
        let mut saved = [0u8; BLOCK_LEN];
        saved.copy_from_slice(block);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_restores_plaintext() {
        let plain: Vec<u8> = (0..64u8).collect();
        let mut buf = plain.clone();

        encrypt_in_place(&mut buf);
        assert_ne!(buf, plain);

        decrypt_in_place(&mut buf);
        assert_eq!(buf, plain);
    }

    #[test]
    fn test_identical_blocks_encrypt_differently() {
        // Chaining: equal plaintext blocks must not produce equal ciphertext.
        let mut buf = [0u8; 16];
        encrypt_in_place(&mut buf);
        assert_ne!(buf[..8], buf[8..]);
    }

    #[test]
    fn test_each_call_restarts_chain() {
        let mut a = [7u8; 24];
        let mut b = [7u8; 24];
        encrypt_in_place(&mut a);
        encrypt_in_place(&mut b);
        assert_eq!(a, b);
    }
}
