//! Boks offline PIN derivation
//!
//! The locker accepts six-character codes derived from a 32-byte master
//! secret without any round-trip to the device. The firmware uses a keyed
//! two-block compression reverse-engineered from the factory pairing tool:
//! the mixing state starts from the SHA-256 initialization constants (not
//! the standard BLAKE2s IV), runs the usual ten-round sigma message
//! schedule with the 32-bit add-rotate-xor `G` function, and truncates the
//! result to six charset symbols.
//!
//! Reproduce the constants and round structure exactly; "some keyed hash"
//! will not open the door.

use std::fmt;

use crate::{
    error::{Error, Result},
    opcode::CodeKind,
    CODE_CHARSET,
};

/// Mixing state seed: SHA-256 initialization constants
const IV: [u32; 8] = [
    0x6a09_e667, 0xbb67_ae85, 0x3c6e_f372, 0xa54f_f53a,
    0x510e_527f, 0x9b05_688c, 0x1f83_d9ab, 0x5be0_cd19,
];

/// Parameter word XORed into the first state word before block 1
const PARAM_WORD: u32 = 0x0101_2006;

/// Message word permutation per round
const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// 32-byte master secret used to derive keypad codes offline
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Parse a master key from its textual hex form.
    ///
    /// Spaces and dashes are stripped first (keys are often pasted in
    /// grouped form). Anything that does not decode to exactly 32 bytes
    /// is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let clean: String = text.chars().filter(|c| *c != ' ' && *c != '-').collect();

        let bytes = hex::decode(&clean).map_err(|e| Error::MasterKeyInvalid {
            detail: e.to_string(),
        })?;

        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| Error::MasterKeyInvalid {
            detail: format!("{} bytes", b.len()),
        })?;

        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never leak key material through Debug
        f.write_str("MasterKey(***)")
    }
}

/// Mixing function G
fn g(v: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, x: u32, y: u32) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(12);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(8);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(7);
}

/// Compression over one 64-byte block.
///
/// `t0` is the byte-length parameter, `f0` the finalization flag word.
fn compress(h: &mut [u32; 8], block: &[u8; 64], t0: u32, f0: u32) {
    let mut v = [0u32; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);

    v[12] ^= t0;
    v[14] ^= f0;

    let mut m = [0u32; 16];
    for (i, word) in m.iter_mut().enumerate() {
        *word = u32::from_le_bytes([
            block[i * 4],
            block[i * 4 + 1],
            block[i * 4 + 2],
            block[i * 4 + 3],
        ]);
    }

    for s in &SIGMA {
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// Derive the six-character code for `(kind, index)` from the master key.
///
/// Deterministic: the same inputs always yield the same code, and distinct
/// kinds or indices yield distinct codes with overwhelming probability.
///
/// # Examples
///
/// ```
/// use boks_core::{derive_pin, CodeKind, MasterKey};
///
/// let key = MasterKey::parse(
///     "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
/// ).unwrap();
///
/// let pin = derive_pin(&key, CodeKind::Master, 0);
/// assert_eq!(pin.len(), 6);
/// ```
pub fn derive_pin(key: &MasterKey, kind: CodeKind, index: u32) -> String {
    let mut h = IV;
    h[0] ^= PARAM_WORD;

    // Block 1: the key, zero-padded to a full block
    let mut block1 = [0u8; 64];
    block1[..32].copy_from_slice(key.as_bytes());
    compress(&mut h, &block1, 64, 0);

    // Block 2: "<kind-label> <index>", zero-padded, finalized
    let msg = format!("{} {}", kind.label(), index);
    let mut block2 = [0u8; 64];
    block2[..msg.len()].copy_from_slice(msg.as_bytes());
    compress(&mut h, &block2, 64 + msg.len() as u32, 0xFFFF_FFFF);

    let charset = CODE_CHARSET.as_bytes();
    h.iter()
        .flat_map(|w| w.to_le_bytes())
        .take(6)
        .map(|b| charset[(b % 12) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn key() -> MasterKey {
        MasterKey::parse(KEY_HEX).unwrap()
    }

    #[test]
    fn test_known_vectors() {
        // Reference vectors from the firmware pairing tool
        assert_eq!(derive_pin(&key(), CodeKind::Master, 0), "A03260");
        assert_eq!(derive_pin(&key(), CodeKind::Master, 1), "9A8948");
        assert_eq!(derive_pin(&key(), CodeKind::SingleUse, 1), "56A0AA");
        assert_eq!(derive_pin(&key(), CodeKind::SingleUse, 2), "490931");
        assert_eq!(derive_pin(&key(), CodeKind::MultiUse, 1), "B72407");
        assert_eq!(derive_pin(&key(), CodeKind::MultiUse, 7), "A29334");
    }

    #[test]
    fn test_all_ff_key() {
        let key = MasterKey::parse(&"ff".repeat(32)).unwrap();
        assert_eq!(derive_pin(&key, CodeKind::Master, 0), "04BA7B");
    }

    #[test]
    fn test_determinism() {
        assert_eq!(
            derive_pin(&key(), CodeKind::Master, 0),
            derive_pin(&key(), CodeKind::Master, 0)
        );
    }

    #[test]
    fn test_distinct_across_indices_and_kinds() {
        assert_ne!(
            derive_pin(&key(), CodeKind::SingleUse, 1),
            derive_pin(&key(), CodeKind::SingleUse, 2)
        );
        assert_ne!(
            derive_pin(&key(), CodeKind::SingleUse, 3),
            derive_pin(&key(), CodeKind::MultiUse, 3)
        );
    }

    #[test]
    fn test_output_stays_in_charset() {
        for index in 0..50 {
            let pin = derive_pin(&key(), CodeKind::SingleUse, index);
            assert_eq!(pin.len(), 6);
            assert!(pin.chars().all(|c| CODE_CHARSET.contains(c)), "{pin}");
        }
    }

    #[test]
    fn test_parse_grouped_key() {
        let grouped = "00010203-04050607 08090a0b 0c0d0e0f-10111213 14151617 18191a1b-1c1d1e1f";
        assert_eq!(MasterKey::parse(grouped).unwrap(), key());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(matches!(
            MasterKey::parse("0badc0de"),
            Err(Error::MasterKeyInvalid { .. })
        ));
        assert!(matches!(
            MasterKey::parse(&"ab".repeat(33)),
            Err(Error::MasterKeyInvalid { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(MasterKey::parse("not a key at all").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        assert_eq!(format!("{:?}", key()), "MasterKey(***)");
    }
}
