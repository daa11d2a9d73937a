use crate::*;
use hkdf::Hkdf;
use indexmap::IndexMap;
use log::{debug, warn};
use rand::RngCore;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

const SHARE_ENC_CONTEXT: &str = "share_encrypt";

/// P_i(ℓ), hashed-ElGamal encrypted to guardian ℓ's election public key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedKeyShare {
    pub polynomial_owner: String,
    pub secret_share_for: String,
    pub encrypted_coordinate: HashedElGamalCiphertext,
}

/// P_i(ℓ) in the clear, published by the owner when the encrypted share was disputed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyShare {
    pub polynomial_owner: String,
    pub secret_share_for: String,
    pub coordinate: ElementModQ,
}

/// A guardian during the key ceremony.
///
/// Holds the secret polynomial, which never leaves the trustee, plus the public keys and
/// polynomial shares received from the other guardians.
pub struct KeyCeremonyTrustee {
    pub id: String,
    pub x_coordinate: u32,
    pub quorum: u32,
    parameter_base_hash: UInt256,
    seed: [u8; 32],
    polynomial: SecretPolynomial,
    other_public_keys: IndexMap<String, Guardian>,
    // polynomial owner -> P_owner(x_coordinate)
    received_shares: IndexMap<String, ElementModQ>,
}

impl KeyCeremonyTrustee {
    /// Create a new trustee with a fresh random seed
    pub fn new<R: RngCore + rand::CryptoRng>(
        group: &GroupContext,
        parameter_base_hash: &UInt256,
        id: &str,
        x_coordinate: u32,
        quorum: u32,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(group, parameter_base_hash, id, x_coordinate, quorum, seed)
    }

    /// Create a trustee whose polynomial and proofs are fully determined by `seed`
    pub fn from_seed(
        group: &GroupContext,
        parameter_base_hash: &UInt256,
        id: &str,
        x_coordinate: u32,
        quorum: u32,
        seed: [u8; 32],
    ) -> Result<Self, Error> {
        if x_coordinate == 0 {
            return Err(Error::InvalidPublicKeys(
                id.to_string(),
                "x coordinate cannot be zero".to_string(),
            ));
        }
        if quorum == 0 {
            return Err(Error::InvalidQuorum(quorum, 0));
        }
        let mut rng = generator(&seed, b"electionguard_trustee_polynomial");
        let polynomial =
            SecretPolynomial::generate(group, parameter_base_hash, x_coordinate, quorum, &mut rng);
        Ok(KeyCeremonyTrustee {
            id: id.to_string(),
            x_coordinate,
            quorum,
            parameter_base_hash: *parameter_base_hash,
            seed,
            polynomial,
            other_public_keys: IndexMap::new(),
            received_shares: IndexMap::new(),
        })
    }

    /// The public record: commitments K_ij with their Schnorr proofs
    pub fn public_keys(&self) -> Guardian {
        Guardian {
            guardian_id: self.id.clone(),
            x_coordinate: self.x_coordinate,
            coefficient_proofs: self.polynomial.proofs().to_vec(),
        }
    }

    /// Validate and store another guardian's public keys
    pub fn receive_public_keys(&mut self, group: &GroupContext, keys: Guardian) -> Result<(), Error> {
        let invalid = |msg: String| Error::InvalidPublicKeys(keys.guardian_id.clone(), msg);

        if keys.guardian_id == self.id {
            return Err(invalid("cannot receive own public keys".to_string()));
        }
        if keys.x_coordinate == 0 || keys.x_coordinate == self.x_coordinate {
            return Err(invalid(format!("bad x coordinate {}", keys.x_coordinate)));
        }
        if self
            .other_public_keys
            .values()
            .any(|g| g.x_coordinate == keys.x_coordinate && g.guardian_id != keys.guardian_id)
        {
            return Err(invalid(format!("x coordinate {} already taken", keys.x_coordinate)));
        }
        if keys.coefficient_proofs.len() != self.quorum as usize {
            return Err(invalid(format!(
                "{} coefficient proofs, expected {}",
                keys.coefficient_proofs.len(),
                self.quorum
            )));
        }
        for (j, proof) in keys.coefficient_proofs.iter().enumerate() {
            proof
                .verify(group, &self.parameter_base_hash, keys.x_coordinate, j as u32)
                .map_err(|e| invalid(format!("coefficient {}: {}", j, e)))?;
        }

        debug!("trustee {} accepted public keys of {}", self.id, keys.guardian_id);
        self.other_public_keys.insert(keys.guardian_id.clone(), keys);
        Ok(())
    }

    fn other(&self, guardian_id: &str) -> Result<&Guardian, Error> {
        self.other_public_keys.get(guardian_id).ok_or_else(|| {
            Error::InvalidKeyShare(
                self.id.clone(),
                guardian_id.to_string(),
                "public keys not received".to_string(),
            )
        })
    }

    /// P_i(ℓ) for guardian ℓ, encrypted to ℓ's public key K_ℓ
    pub fn encrypted_key_share_for(
        &self,
        group: &GroupContext,
        guardian_id: &str,
    ) -> Result<EncryptedKeyShare, Error> {
        let other = self.other(guardian_id)?;
        let other_key = other.public_key().ok_or_else(|| {
            Error::InvalidPublicKeys(guardian_id.to_string(), "no public key".to_string())
        })?;

        let share = self.polynomial.value_at(group, other.x_coordinate);
        let mut rng = generator(&self.seed, format!("share_nonce_{}", guardian_id).as_bytes());
        let nonce = group.random_q(&mut rng);
        let alpha = group.g_pow_p(&nonce);
        let beta = group.pow_p(other_key, &nonce);
        let key = share_encryption_key(
            group,
            &self.parameter_base_hash,
            self.x_coordinate,
            other.x_coordinate,
            other_key,
            &alpha,
            &beta,
        );
        let encrypted_coordinate = hashed_elgamal_encrypt(
            group,
            &group.q_to_bytes(&share),
            &alpha,
            key,
            SHARE_ENC_CONTEXT.as_bytes(),
        );

        Ok(EncryptedKeyShare {
            polynomial_owner: self.id.clone(),
            secret_share_for: guardian_id.to_string(),
            encrypted_coordinate,
        })
    }

    /// Decrypt and verify a share of another guardian's polynomial
    pub fn receive_encrypted_key_share(
        &mut self,
        group: &GroupContext,
        share: &EncryptedKeyShare,
    ) -> Result<(), Error> {
        let invalid =
            |msg: String| Error::InvalidKeyShare(share.polynomial_owner.clone(), self.id.clone(), msg);
        if share.secret_share_for != self.id {
            return Err(invalid(format!("addressed to {}", share.secret_share_for)));
        }
        let sender = self.other(&share.polynomial_owner)?;

        let own = self.polynomial.secret();
        let alpha = &share.encrypted_coordinate.c0;
        let beta = group.pow_p(alpha, &own.secret_key.0);
        let key = share_encryption_key(
            group,
            &self.parameter_base_hash,
            sender.x_coordinate,
            self.x_coordinate,
            &own.public_key.0,
            alpha,
            &beta,
        );
        let bytes = share
            .encrypted_coordinate
            .decrypt(group, key, SHARE_ENC_CONTEXT.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let coordinate = group
            .element_q(num_bigint::BigUint::from_bytes_be(&bytes))
            .map_err(|e| invalid(e.to_string()))?;

        self.accept_share(group, &share.polynomial_owner, coordinate)
    }

    /// P_i(ℓ) in the clear, for the fallback path
    pub fn key_share_for(&self, group: &GroupContext, guardian_id: &str) -> Result<KeyShare, Error> {
        let other = self.other(guardian_id)?;
        Ok(KeyShare {
            polynomial_owner: self.id.clone(),
            secret_share_for: guardian_id.to_string(),
            coordinate: self.polynomial.value_at(group, other.x_coordinate),
        })
    }

    /// Verify and store a share published in the clear
    pub fn receive_key_share(&mut self, group: &GroupContext, share: &KeyShare) -> Result<(), Error> {
        if share.secret_share_for != self.id {
            return Err(Error::InvalidKeyShare(
                share.polynomial_owner.clone(),
                self.id.clone(),
                format!("addressed to {}", share.secret_share_for),
            ));
        }
        self.accept_share(group, &share.polynomial_owner, share.coordinate.clone())
    }

    fn accept_share(
        &mut self,
        group: &GroupContext,
        owner: &str,
        coordinate: ElementModQ,
    ) -> Result<(), Error> {
        let sender = self.other(owner)?;
        if !verify_polynomial_share(group, sender, self.x_coordinate, &coordinate) {
            warn!("trustee {} rejected share from {}", self.id, owner);
            return Err(Error::InvalidKeyShare(
                owner.to_string(),
                self.id.clone(),
                "share does not match the published commitments".to_string(),
            ));
        }
        self.received_shares.insert(owner.to_string(), coordinate);
        Ok(())
    }

    /// Every other guardian's public keys and polynomial share must be present
    pub fn check_complete(&self, number_of_guardians: u32) -> Result<(), Error> {
        let expected = (number_of_guardians as usize).saturating_sub(1);
        if self.other_public_keys.len() != expected {
            return Err(Error::WrongNumberOfPublicKeys(
                self.id.clone(),
                self.other_public_keys.len() + 1,
                expected + 1,
            ));
        }
        if self.received_shares.len() != expected
            || self
                .other_public_keys
                .keys()
                .any(|id| !self.received_shares.contains_key(id))
        {
            return Err(Error::WrongNumberOfKeyShares(
                self.id.clone(),
                self.received_shares.len(),
                expected,
            ));
        }
        Ok(())
    }

    /// The trustee as it is kept for decryption: election keypair plus received shares
    pub fn decrypting_trustee(&self) -> DecryptingTrustee {
        let own = self.polynomial.secret();
        DecryptingTrustee {
            guardian_id: self.id.clone(),
            x_coordinate: self.x_coordinate,
            public_key: own.public_key.0.clone(),
            secret_key: own.secret_key.0.clone(),
            key_shares: self.received_shares.clone(),
        }
    }
}

// Deterministic generator derived from the trustee seed
fn generator(seed: &[u8; 32], info: &[u8]) -> ChaCha20Rng {
    let h = Hkdf::<Sha256>::new(None, seed);
    let mut okm = [0u8; 32];
    h.expand(info, &mut okm)
        .expect("32 bytes is a valid length for Sha256 to output");
    ChaCha20Rng::from_seed(okm)
}

/// k = H(H_P; 0x11, i, ℓ, K_ℓ, α, β)
fn share_encryption_key(
    group: &GroupContext,
    parameter_base_hash: &UInt256,
    sender: u32,
    receiver: u32,
    receiver_key: &ElementModP,
    alpha: &ElementModP,
    beta: &ElementModP,
) -> UInt256 {
    group
        .hasher(parameter_base_hash)
        .byte(0x11)
        .int(sender)
        .int(receiver)
        .p(receiver_key)
        .p(alpha)
        .p(beta)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trustees(group: &GroupContext) -> (KeyCeremonyTrustee, KeyCeremonyTrustee) {
        let hp = parameter_base_hash(group);
        let t1 = KeyCeremonyTrustee::from_seed(group, &hp, "g1", 1, 2, [1u8; 32]).unwrap();
        let t2 = KeyCeremonyTrustee::from_seed(group, &hp, "g2", 2, 2, [2u8; 32]).unwrap();
        (t1, t2)
    }

    #[test]
    fn encrypted_share_round_trip() {
        let group = GroupContext::tiny();
        let (mut t1, mut t2) = trustees(&group);
        t1.receive_public_keys(&group, t2.public_keys()).unwrap();
        t2.receive_public_keys(&group, t1.public_keys()).unwrap();

        let share = t1.encrypted_key_share_for(&group, "g2").unwrap();
        t2.receive_encrypted_key_share(&group, &share).unwrap();
        assert!(t2.check_complete(2).is_ok());
        assert!(matches!(
            t1.check_complete(2),
            Err(Error::WrongNumberOfKeyShares(_, 0, 1))
        ));
    }

    #[test]
    fn tampered_share_falls_back_to_plain_share() {
        let group = GroupContext::tiny();
        let (mut t1, mut t2) = trustees(&group);
        t1.receive_public_keys(&group, t2.public_keys()).unwrap();
        t2.receive_public_keys(&group, t1.public_keys()).unwrap();

        let mut share = t1.encrypted_key_share_for(&group, "g2").unwrap();
        share.encrypted_coordinate.c1[0] ^= 1;
        assert!(t2.receive_encrypted_key_share(&group, &share).is_err());

        let plain = t1.key_share_for(&group, "g2").unwrap();
        t2.receive_key_share(&group, &plain).unwrap();

        let mut wrong = plain;
        wrong.coordinate = group.add_q(&wrong.coordinate, &group.one_q());
        assert!(t2.receive_key_share(&group, &wrong).is_err());
    }

    #[test]
    fn bad_public_keys_rejected() {
        let group = GroupContext::tiny();
        let (mut t1, t2) = trustees(&group);

        let mut keys = t2.public_keys();
        keys.coefficient_proofs.pop();
        assert!(t1.receive_public_keys(&group, keys).is_err());

        let mut keys = t2.public_keys();
        let response = &keys.coefficient_proofs[1].response;
        keys.coefficient_proofs[1].response = group.add_q(response, &group.one_q());
        assert!(t1.receive_public_keys(&group, keys).is_err());

        let mut keys = t2.public_keys();
        keys.x_coordinate = 1;
        assert!(t1.receive_public_keys(&group, keys).is_err());
    }

    #[test]
    fn seeded_trustees_are_deterministic() {
        let group = GroupContext::tiny();
        let hp = parameter_base_hash(&group);
        let a = KeyCeremonyTrustee::from_seed(&group, &hp, "g1", 1, 2, [7u8; 32]).unwrap();
        let b = KeyCeremonyTrustee::from_seed(&group, &hp, "g1", 1, 2, [7u8; 32]).unwrap();
        assert_eq!(a.public_keys(), b.public_keys());
        assert!(KeyCeremonyTrustee::from_seed(&group, &hp, "g0", 0, 2, [7u8; 32]).is_err());
    }
}
