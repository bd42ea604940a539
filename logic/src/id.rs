use std::fmt;
use std::ops::BitXor;

use rand::Rng;
use rand::distributions::{Distribution, Standard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};

use crate::consts::ID_LEN;

/// A 160-bit Kademlia identifier, held as a fixed byte array rather than the
/// hex string the wire format uses — hex is a serialization detail, not the
/// type.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_LEN]);

    /// Draw a self-identifier: SHA-512 over 160 random ASCII letters,
    /// truncated to 160 bits.
    pub fn generate_self<R: Rng + ?Sized>(rng: &mut R) -> Id {
        const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let letters: String = (0..160)
            .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
            .collect();

        let digest = Sha512::digest(letters.as_bytes());
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(&digest[..ID_LEN]);
        Id(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Id, hex::FromHexError> {
        // Left-pad to the full key width, matching hex_to_bin's zfill semantics.
        let padded = format!("{:0>width$}", s, width = ID_LEN * 2);
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(&padded, &mut bytes)?;
        Ok(Id(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The XOR distance between two identifiers, as a totally-ordered value
    /// (an `Id`'s derived `Ord` is big-endian unsigned integer order).
    pub fn distance(&self, other: &Id) -> Id {
        *self ^ *other
    }

    /// MSB-first bit access: `bit(0)` is the top bit of the first byte.
    pub fn bit(&self, index: usize) -> bool {
        let byte = self.0[index / 8];
        let shift = 7 - (index % 8);
        (byte >> shift) & 1 == 1
    }

    pub fn leading_zeros(&self) -> u32 {
        let mut res = 0u32;
        for byte in self.0 {
            if byte == 0 {
                res += 8;
            } else {
                res += byte.leading_zeros();
                break;
            }
        }
        res
    }
}

impl BitXor for Id {
    type Output = Id;

    fn bitxor(self, rhs: Id) -> Id {
        let mut res = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            res[i] = self.0[i] ^ rhs.0[i];
        }
        Id(res)
    }
}

impl Distribution<Id> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Id {
        let mut bytes = [0u8; ID_LEN];
        rng.fill(&mut bytes);
        Id(bytes)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Id::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_identity() {
        let a = Id::from_hex("a0000000").unwrap();
        assert_eq!(a ^ Id::ZERO, a);
        assert_eq!(a ^ a, Id::ZERO);
    }

    #[test]
    fn hex_roundtrip() {
        let a = Id::from_hex("a1b2c3").unwrap();
        assert_eq!(Id::from_hex(&a.to_hex()).unwrap(), a);
    }

    #[test]
    fn bit_is_msb_first() {
        let mut bytes = [0u8; ID_LEN];
        bytes[0] = 0b1000_0000;
        let id = Id(bytes);
        assert!(id.bit(0));
        assert!(!id.bit(1));
    }

    #[test]
    fn hex_left_pads() {
        let short = Id::from_hex("1").unwrap();
        let long = Id::from_hex(&format!("{:0>39}1", "")).unwrap();
        assert_eq!(short, long);
    }
}
