use crate::*;
use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// A 256-bit digest
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UInt256(#[serde(with = "Bytes32Hex")] pub [u8; 32]);

impl UInt256 {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|_| Error::BadHex)?;
        Self::from_slice(&bytes)
    }

    /// Left pads shorter slices with zeros
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() > 32 {
            return Err(Error::BadHex);
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        Ok(UInt256(out))
    }

    pub fn xor(&self, other: &UInt256) -> UInt256 {
        let mut out = [0u8; 32];
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.0[i] ^ other.0[i];
        }
        UInt256(out)
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UInt256({})", self.to_hex())
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take a key of any size")
}

fn finish_mac(mac: HmacSha256) -> UInt256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    UInt256(out)
}

/// HMAC-SHA256 of a single message
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> UInt256 {
    let mut mac = new_mac(key);
    mac.update(message);
    finish_mac(mac)
}

/// Builds H(key; e1, e2, ...) with the election encoding of each element:
/// single bytes, raw byte strings, 32-byte digests, fixed width group elements,
/// UTF-8 strings without length prefix and 4-byte big-endian integers.
pub struct HashBuilder<'a> {
    group: &'a GroupContext,
    mac: HmacSha256,
}

impl GroupContext {
    pub fn hasher(&self, key: &UInt256) -> HashBuilder {
        HashBuilder {
            group: self,
            mac: new_mac(key.as_bytes()),
        }
    }

    /// Hash keyed by an arbitrary byte string, used for the parameter base hash
    pub fn hasher_with_bytes(&self, key: &[u8]) -> HashBuilder {
        HashBuilder {
            group: self,
            mac: new_mac(key),
        }
    }
}

impl<'a> HashBuilder<'a> {
    pub fn byte(mut self, b: u8) -> Self {
        self.mac.update(&[b]);
        self
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.mac.update(b);
        self
    }

    pub fn uint256(mut self, u: &UInt256) -> Self {
        self.mac.update(u.as_bytes());
        self
    }

    pub fn p(mut self, e: &ElementModP) -> Self {
        self.mac.update(&self.group.p_to_bytes(e));
        self
    }

    pub fn q(mut self, e: &ElementModQ) -> Self {
        self.mac.update(&self.group.q_to_bytes(e));
        self
    }

    pub fn ps<'e, I: IntoIterator<Item = &'e ElementModP>>(self, items: I) -> Self {
        items.into_iter().fold(self, |h, e| h.p(e))
    }

    pub fn uint256s<'e, I: IntoIterator<Item = &'e UInt256>>(self, items: I) -> Self {
        items.into_iter().fold(self, |h, e| h.uint256(e))
    }

    pub fn ciphertext(self, c: &ElGamalCiphertext) -> Self {
        self.p(&c.pad).p(&c.data)
    }

    pub fn string(mut self, s: &str) -> Self {
        self.mac.update(s.as_bytes());
        self
    }

    pub fn int(mut self, i: u32) -> Self {
        self.mac.update(&i.to_be_bytes());
        self
    }

    pub fn finish(self) -> UInt256 {
        finish_mac(self.mac)
    }
}

/// NIST SP 800-108 counter mode key derivation:
/// K(i) = HMAC(key, [i]4 || label || 0x00 || context || [L]4)
pub struct Kdf<'a> {
    key: UInt256,
    label: &'a [u8],
    context: &'a [u8],
    length_bits: u32,
}

impl<'a> Kdf<'a> {
    pub fn new(key: UInt256, label: &'a str, context: &'a [u8], length_bits: u32) -> Self {
        Kdf {
            key,
            label: label.as_bytes(),
            context,
            length_bits,
        }
    }

    pub fn get(&self, index: u32) -> UInt256 {
        let mut mac = new_mac(self.key.as_bytes());
        mac.update(&index.to_be_bytes());
        mac.update(self.label);
        mac.update(&[0u8]);
        mac.update(self.context);
        mac.update(&self.length_bits.to_be_bytes());
        finish_mac(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_concatenation() {
        let group = GroupContext::tiny();
        let key = UInt256([7u8; 32]);
        let e = group.g_pow_p(&group.q_from_u64(99));

        let built = group
            .hasher(&key)
            .byte(0x21)
            .string("abc")
            .int(258)
            .p(&e)
            .finish();

        let mut raw = vec![0x21u8];
        raw.extend_from_slice(b"abc");
        raw.extend_from_slice(&[0, 0, 1, 2]);
        raw.extend_from_slice(&group.p_to_bytes(&e));
        assert_eq!(group.p_to_bytes(&e).len(), 4);
        assert_eq!(built, hmac_sha256(key.as_bytes(), &raw));
    }

    #[test]
    fn hash_depends_on_key() {
        let group = GroupContext::tiny();
        let a = group.hasher(&UInt256([1u8; 32])).byte(1).finish();
        let b = group.hasher(&UInt256([2u8; 32])).byte(1).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn kdf_blocks_differ() {
        let kdf = Kdf::new(UInt256([3u8; 32]), "share_enc_keys", b"ctx", 512);
        assert_ne!(kdf.get(0), kdf.get(1));
        assert_eq!(kdf.get(1), kdf.get(1));
    }

    #[test]
    fn uint256_hex() {
        let u = UInt256::from_hex("0102").unwrap();
        assert_eq!(u.0[31], 2);
        assert_eq!(u.0[30], 1);
        assert!(UInt256::from_hex("zz").is_err());
        let json = serde_json::to_string(&u).unwrap();
        let back: UInt256 = serde_json::from_str(&json).unwrap();
        assert_eq!(u, back);
    }
}
