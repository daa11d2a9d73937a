use crate::*;
use rand_core::{CryptoRng, RngCore};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElGamalPublicKey(pub ElementModP);

#[derive(Clone, PartialEq, Eq)]
pub struct ElGamalSecretKey(pub ElementModQ);

/// A secret key and its public key K = g^s
#[derive(Clone)]
pub struct ElGamalKeypair {
    pub secret_key: ElGamalSecretKey,
    pub public_key: ElGamalPublicKey,
}

impl ElGamalKeypair {
    pub fn from_secret(group: &GroupContext, secret: ElementModQ) -> Self {
        let public = group.g_pow_p(&secret);
        ElGamalKeypair {
            secret_key: ElGamalSecretKey(secret),
            public_key: ElGamalPublicKey(public),
        }
    }

    pub fn random<R: RngCore + CryptoRng>(group: &GroupContext, rng: &mut R) -> Self {
        Self::from_secret(group, group.random_q(rng))
    }
}

/// Exponential ElGamal ciphertext (g^ξ, K^(σ+ξ))
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElGamalCiphertext {
    pub pad: ElementModP,
    pub data: ElementModP,
}

impl ElGamalCiphertext {
    /// The encryption of zero with nonce zero, the identity for homomorphic addition
    pub fn identity(group: &GroupContext) -> Self {
        ElGamalCiphertext {
            pad: group.one_p(),
            data: group.one_p(),
        }
    }

    pub fn add(&self, group: &GroupContext, other: &ElGamalCiphertext) -> ElGamalCiphertext {
        ElGamalCiphertext {
            pad: group.mult_p(&self.pad, &other.pad),
            data: group.mult_p(&self.data, &other.data),
        }
    }

    /// Decrypt with the secret key, returning the exponent found by discrete log against K
    pub fn decrypt(
        &self,
        group: &GroupContext,
        keypair: &ElGamalKeypair,
    ) -> Result<u32, Error> {
        let blind = group.pow_p(&self.pad, &keypair.secret_key.0);
        let t = group.div_p(&self.data, &blind);
        group
            .dlog(&keypair.public_key.0, &t, DEFAULT_MAX_DLOG)
            .ok_or(Error::DlogNotFound(DEFAULT_MAX_DLOG))
    }

    /// Decrypt with the encryption nonce: data / K^ξ = K^σ
    pub fn decrypt_with_nonce(
        &self,
        group: &GroupContext,
        public_key: &ElGamalPublicKey,
        nonce: &ElementModQ,
    ) -> Result<u32, Error> {
        let t = group.div_p(&self.data, &group.pow_p(&public_key.0, nonce));
        group
            .dlog(&public_key.0, &t, DEFAULT_MAX_DLOG)
            .ok_or(Error::DlogNotFound(DEFAULT_MAX_DLOG))
    }
}

/// Encrypt a small integer
pub fn elgamal_encrypt(
    group: &GroupContext,
    vote: u32,
    nonce: &ElementModQ,
    public_key: &ElGamalPublicKey,
) -> ElGamalCiphertext {
    let exponent = group.add_q(&group.q_from_u64(vote as u64), nonce);
    ElGamalCiphertext {
        pad: group.g_pow_p(nonce),
        data: group.pow_p(&public_key.0, &exponent),
    }
}

/// Homomorphic sum of ciphertexts
pub fn elgamal_add_all<'a, I: IntoIterator<Item = &'a ElGamalCiphertext>>(
    group: &GroupContext,
    items: I,
) -> ElGamalCiphertext {
    items
        .into_iter()
        .fold(ElGamalCiphertext::identity(group), |acc, c| acc.add(group, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn encrypt_decrypt() {
        let group = GroupContext::tiny();
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
        let keypair = ElGamalKeypair::random(&group, &mut rng);
        let nonce = group.random_q(&mut rng);

        let c = elgamal_encrypt(&group, 3, &nonce, &keypair.public_key);
        assert_eq!(c.decrypt(&group, &keypair).unwrap(), 3);
        assert_eq!(
            c.decrypt_with_nonce(&group, &keypair.public_key, &nonce)
                .unwrap(),
            3
        );
    }

    #[test]
    fn homomorphic_sum() {
        let group = GroupContext::tiny();
        let mut rng = ChaCha20Rng::from_seed([2u8; 32]);
        let keypair = ElGamalKeypair::random(&group, &mut rng);

        let votes = [1u32, 0, 1, 1, 0];
        let nonces: Vec<ElementModQ> = votes.iter().map(|_| group.random_q(&mut rng)).collect();
        let ciphertexts: Vec<ElGamalCiphertext> = votes
            .iter()
            .zip(nonces.iter())
            .map(|(v, n)| elgamal_encrypt(&group, *v, n, &keypair.public_key))
            .collect();

        let sum = elgamal_add_all(&group, &ciphertexts);
        let nonce_sum = group.add_q_all(&nonces);
        let direct = elgamal_encrypt(&group, 3, &nonce_sum, &keypair.public_key);

        assert_eq!(sum, direct);
        assert_eq!(sum.decrypt(&group, &keypair).unwrap(), 3);
    }
}
