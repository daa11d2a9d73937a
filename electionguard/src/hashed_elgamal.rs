use crate::*;

pub const SHARE_ENC_LABEL: &str = "share_enc_keys";

/// Hybrid ElGamal encryption of an arbitrary byte string.
///
/// `c0` is the ElGamal pad, `c1` the message xor'ed block by block with the KDF stream,
/// and `c2` an HMAC over `c0 || c1` keyed by the first KDF block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HashedElGamalCiphertext {
    pub c0: ElementModP,
    #[serde(with = "BytesHex")]
    pub c1: Vec<u8>,
    pub c2: UInt256,
    pub num_bytes: usize,
}

/// Encrypt `message` given the pad `alpha` and the already derived KDF key
pub fn hashed_elgamal_encrypt(
    group: &GroupContext,
    message: &[u8],
    alpha: &ElementModP,
    kdf_key: UInt256,
    context: &[u8],
) -> HashedElGamalCiphertext {
    let kdf = Kdf::new(kdf_key, SHARE_ENC_LABEL, context, (message.len() * 8) as u32);
    let k0 = kdf.get(0);

    let mut c1 = Vec::with_capacity(message.len() + 32);
    for (i, chunk) in message.chunks(32).enumerate() {
        let mut block = [0u8; 32];
        block[..chunk.len()].copy_from_slice(chunk);
        c1.extend_from_slice(UInt256(block).xor(&kdf.get(i as u32 + 1)).as_bytes());
    }

    let mut tagged = group.p_to_bytes(alpha);
    tagged.extend_from_slice(&c1);
    let c2 = hmac_sha256(k0.as_bytes(), &tagged);

    HashedElGamalCiphertext {
        c0: alpha.clone(),
        c1,
        c2,
        num_bytes: message.len(),
    }
}

impl HashedElGamalCiphertext {
    /// Number of 32-byte blocks in c1
    pub fn num_blocks(&self) -> usize {
        self.c1.len() / 32
    }

    /// Check the HMAC and then recover the plaintext
    pub fn decrypt(
        &self,
        group: &GroupContext,
        kdf_key: UInt256,
        context: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if self.c1.len() % 32 != 0 || self.num_bytes > self.c1.len() {
            return Err(Error::DecryptionFailed(
                "hashed elgamal ciphertext has bad length".to_string(),
            ));
        }
        let kdf = Kdf::new(kdf_key, SHARE_ENC_LABEL, context, (self.num_bytes * 8) as u32);
        let k0 = kdf.get(0);

        let mut tagged = group.p_to_bytes(&self.c0);
        tagged.extend_from_slice(&self.c1);
        if hmac_sha256(k0.as_bytes(), &tagged) != self.c2 {
            log::error!("hashed elgamal decryption failure: HMAC doesn't match");
            return Err(Error::HmacMismatch);
        }

        let mut plaintext = Vec::with_capacity(self.c1.len());
        for (i, chunk) in self.c1.chunks(32).enumerate() {
            let block = UInt256::from_slice(chunk)?;
            plaintext.extend_from_slice(block.xor(&kdf.get(i as u32 + 1)).as_bytes());
        }
        // trailing bytes are covered by the HMAC
        plaintext.truncate(self.num_bytes);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(group: &GroupContext) -> (ElementModP, UInt256) {
        let alpha = group.g_pow_p(&group.q_from_u64(777));
        let key = group.hasher(&UInt256([9u8; 32])).byte(0x22).p(&alpha).finish();
        (alpha, key)
    }

    #[test]
    fn round_trip_uneven_length() {
        let group = GroupContext::tiny();
        let (alpha, key) = setup(&group);
        let message = b"a message that is longer than one block of 32 bytes".to_vec();

        let c = hashed_elgamal_encrypt(&group, &message, &alpha, key, b"contest_data1");
        assert_eq!(c.num_blocks(), 2);
        assert_eq!(c.decrypt(&group, key, b"contest_data1").unwrap(), message);
    }

    #[test]
    fn tampering_fails_hmac() {
        let group = GroupContext::tiny();
        let (alpha, key) = setup(&group);
        let mut c = hashed_elgamal_encrypt(&group, b"secret", &alpha, key, b"ctx");
        c.c1[0] ^= 1;
        assert!(matches!(
            c.decrypt(&group, key, b"ctx"),
            Err(Error::HmacMismatch)
        ));

        let c = hashed_elgamal_encrypt(&group, b"secret", &alpha, key, b"ctx");
        assert!(c.decrypt(&group, key, b"other").is_err());
    }
}
