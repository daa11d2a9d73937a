use crate::*;
use rand_core::{CryptoRng, RngCore};

const RANGE_PROOF_NONCES: &str = "range-chaum-pedersen-proof";
const RANGE_PROOF_CONSTANTS: &str = "range-chaum-pedersen-proof-constants";

/// One challenge/response pair of a Chaum-Pedersen style proof
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChaumPedersenProof {
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

/// Proof that a ciphertext encrypts some ℓ in [0, L], produced with knowledge of the nonce.
///
/// There is one challenge/response pair per possible value; the pairs for j != ℓ are
/// simulated and the challenges sum to the hash of all commitments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RangeProof {
    pub proofs: Vec<ChaumPedersenProof>,
}

impl RangeProof {
    pub fn create(
        group: &GroupContext,
        extended_base_hash: &UInt256,
        ciphertext: &ElGamalCiphertext,
        plaintext: u32,
        limit: u32,
        nonce: &ElementModQ,
        public_key: &ElGamalPublicKey,
    ) -> Result<RangeProof, ProofError> {
        if plaintext > limit {
            return Err(ProofError::PlaintextOutOfRange(plaintext, limit));
        }
        let size = limit as usize + 1;
        let u = Nonces::new(group, nonce, &[RANGE_PROOF_NONCES]).take(size);
        let c = Nonces::new(group, nonce, &[RANGE_PROOF_CONSTANTS]).take(size);
        let k = &public_key.0;
        let ell = group.q_from_u64(plaintext as u64);

        let mut commitments = Vec::with_capacity(2 * size);
        for j in 0..size {
            let a = group.g_pow_p(&u[j]);
            let b = if j as u32 == plaintext {
                group.pow_p(k, &u[j])
            } else {
                // K^((ℓ-j)c_j + u_j)
                let diff = group.sub_q(&ell, &group.q_from_u64(j as u64));
                let exp = group.add_q(&group.mult_q(&diff, &c[j]), &u[j]);
                group.pow_p(k, &exp)
            };
            commitments.push(a);
            commitments.push(b);
        }

        let challenge = range_challenge(group, extended_base_hash, public_key, ciphertext, &commitments);

        let others = group.add_q_all(
            c.iter()
                .enumerate()
                .filter(|(j, _)| *j as u32 != plaintext)
                .map(|(_, cj)| cj),
        );
        let real_challenge = group.sub_q(&challenge, &others);

        let proofs = (0..size)
            .map(|j| {
                let cj = if j as u32 == plaintext {
                    real_challenge.clone()
                } else {
                    c[j].clone()
                };
                let vj = group.sub_q(&u[j], &group.mult_q(&cj, nonce));
                ChaumPedersenProof {
                    challenge: cj,
                    response: vj,
                }
            })
            .collect();

        Ok(RangeProof { proofs })
    }

    /// Verify the proof for a ciphertext that should encrypt a value in [0, limit]
    pub fn verify(
        &self,
        group: &GroupContext,
        extended_base_hash: &UInt256,
        ciphertext: &ElGamalCiphertext,
        public_key: &ElGamalPublicKey,
        limit: u32,
    ) -> Result<(), ProofError> {
        if !group.is_valid_residue(&ciphertext.pad) || !group.is_valid_residue(&ciphertext.data) {
            return Err(ProofError::NotResidue);
        }
        if self.proofs.len() != limit as usize + 1 {
            return Err(ProofError::WrongLength(self.proofs.len(), limit as usize + 1));
        }
        for p in &self.proofs {
            if !group.in_bounds_q(&p.challenge) || !group.in_bounds_q(&p.response) {
                return Err(ProofError::OutOfBounds);
            }
        }

        let k = &public_key.0;
        let mut commitments = Vec::with_capacity(2 * self.proofs.len());
        for (j, p) in self.proofs.iter().enumerate() {
            // a_j = g^v_j α^c_j, b_j = K^(v_j - j c_j) β^c_j
            let a = group.mult_p(
                &group.g_pow_p(&p.response),
                &group.pow_p(&ciphertext.pad, &p.challenge),
            );
            let jc = group.mult_q(&group.q_from_u64(j as u64), &p.challenge);
            let b = group.mult_p(
                &group.pow_p(k, &group.sub_q(&p.response, &jc)),
                &group.pow_p(&ciphertext.data, &p.challenge),
            );
            commitments.push(a);
            commitments.push(b);
        }

        let expected = range_challenge(group, extended_base_hash, public_key, ciphertext, &commitments);
        let sum = group.add_q_all(self.proofs.iter().map(|p| &p.challenge));
        if sum != expected {
            return Err(ProofError::ChallengeMismatch);
        }
        Ok(())
    }
}

fn range_challenge(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    public_key: &ElGamalPublicKey,
    ciphertext: &ElGamalCiphertext,
    commitments: &[ElementModP],
) -> ElementModQ {
    let hash = group
        .hasher(extended_base_hash)
        .byte(0x21)
        .p(&public_key.0)
        .ciphertext(ciphertext)
        .ps(commitments)
        .finish();
    group.q_from_uint256(&hash)
}

/// Schnorr proof of knowledge of a polynomial coefficient a with commitment K = g^a
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchnorrProof {
    pub public_key: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl SchnorrProof {
    pub fn create<R: RngCore + CryptoRng>(
        group: &GroupContext,
        parameter_base_hash: &UInt256,
        guardian_index: u32,
        coefficient: u32,
        keypair: &ElGamalKeypair,
        rng: &mut R,
    ) -> SchnorrProof {
        let u = group.random_q(rng);
        let h = group.g_pow_p(&u);
        let c = schnorr_challenge(
            group,
            parameter_base_hash,
            guardian_index,
            coefficient,
            &keypair.public_key.0,
            &h,
        );
        let v = group.sub_q(&u, &group.mult_q(&c, &keypair.secret_key.0));
        SchnorrProof {
            public_key: keypair.public_key.0.clone(),
            challenge: c,
            response: v,
        }
    }

    pub fn verify(
        &self,
        group: &GroupContext,
        parameter_base_hash: &UInt256,
        guardian_index: u32,
        coefficient: u32,
    ) -> Result<(), ProofError> {
        if !group.is_valid_residue(&self.public_key) {
            return Err(ProofError::NotResidue);
        }
        if !group.in_bounds_q(&self.challenge) || !group.in_bounds_q(&self.response) {
            return Err(ProofError::OutOfBounds);
        }
        // h = g^v K^c
        let h = group.mult_p(
            &group.g_pow_p(&self.response),
            &group.pow_p(&self.public_key, &self.challenge),
        );
        let c = schnorr_challenge(
            group,
            parameter_base_hash,
            guardian_index,
            coefficient,
            &self.public_key,
            &h,
        );
        if c != self.challenge {
            return Err(ProofError::ChallengeMismatch);
        }
        Ok(())
    }
}

fn schnorr_challenge(
    group: &GroupContext,
    parameter_base_hash: &UInt256,
    guardian_index: u32,
    coefficient: u32,
    commitment: &ElementModP,
    h: &ElementModP,
) -> ElementModQ {
    let hash = group
        .hasher(parameter_base_hash)
        .byte(0x10)
        .int(guardian_index)
        .int(coefficient)
        .p(commitment)
        .p(h)
        .finish();
    group.q_from_uint256(&hash)
}

impl ChaumPedersenProof {
    /// Prove that `share = base^s` for the same s with `public = g^s`
    #[allow(clippy::too_many_arguments)]
    pub fn create_for_share<R: RngCore + CryptoRng>(
        group: &GroupContext,
        extended_base_hash: &UInt256,
        tag: u8,
        public: &ElementModP,
        base: &ElementModP,
        share: &ElementModP,
        secret: &ElementModQ,
        rng: &mut R,
    ) -> ChaumPedersenProof {
        let u = group.random_q(rng);
        let a = group.g_pow_p(&u);
        let b = group.pow_p(base, &u);
        let c = share_challenge(group, extended_base_hash, tag, public, base, &a, &b, share);
        ChaumPedersenProof {
            response: group.sub_q(&u, &group.mult_q(&c, secret)),
            challenge: c,
        }
    }

    pub fn verify_share(
        &self,
        group: &GroupContext,
        extended_base_hash: &UInt256,
        tag: u8,
        public: &ElementModP,
        base: &ElementModP,
        share: &ElementModP,
    ) -> Result<(), ProofError> {
        if !group.in_bounds_q(&self.challenge) || !group.in_bounds_q(&self.response) {
            return Err(ProofError::OutOfBounds);
        }
        if !group.is_valid_residue(share) {
            return Err(ProofError::NotResidue);
        }
        // a = g^v public^c, b = base^v share^c
        let a = group.mult_p(
            &group.g_pow_p(&self.response),
            &group.pow_p(public, &self.challenge),
        );
        let b = group.mult_p(
            &group.pow_p(base, &self.response),
            &group.pow_p(share, &self.challenge),
        );
        let c = share_challenge(group, extended_base_hash, tag, public, base, &a, &b, share);
        if c != self.challenge {
            return Err(ProofError::ChallengeMismatch);
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn share_challenge(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    tag: u8,
    public: &ElementModP,
    base: &ElementModP,
    a: &ElementModP,
    b: &ElementModP,
    share: &ElementModP,
) -> ElementModQ {
    let hash = group
        .hasher(extended_base_hash)
        .byte(tag)
        .p(public)
        .p(base)
        .p(a)
        .p(b)
        .p(share)
        .finish();
    group.q_from_uint256(&hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        group: GroupContext,
        he: UInt256,
        keypair: ElGamalKeypair,
        rng: ChaCha20Rng,
    }

    fn fixture() -> Fixture {
        let group = GroupContext::tiny();
        let mut rng = ChaCha20Rng::from_seed([5u8; 32]);
        let keypair = ElGamalKeypair::random(&group, &mut rng);
        Fixture {
            group,
            he: UInt256([0x42; 32]),
            keypair,
            rng,
        }
    }

    #[test]
    fn range_proof_all_values() {
        let mut f = fixture();
        for limit in 1..4u32 {
            for vote in 0..=limit {
                let nonce = f.group.random_q(&mut f.rng);
                let c = elgamal_encrypt(&f.group, vote, &nonce, &f.keypair.public_key);
                let proof = RangeProof::create(
                    &f.group,
                    &f.he,
                    &c,
                    vote,
                    limit,
                    &nonce,
                    &f.keypair.public_key,
                )
                .unwrap();
                proof
                    .verify(&f.group, &f.he, &c, &f.keypair.public_key, limit)
                    .unwrap();
            }
        }
    }

    #[test]
    fn range_proof_rejects_wrong_plaintext() {
        let mut f = fixture();
        let nonce = f.group.random_q(&mut f.rng);
        let c1 = elgamal_encrypt(&f.group, 1, &nonce, &f.keypair.public_key);
        let proof =
            RangeProof::create(&f.group, &f.he, &c1, 1, 1, &nonce, &f.keypair.public_key).unwrap();

        // same nonce, other vote
        let c0 = elgamal_encrypt(&f.group, 0, &nonce, &f.keypair.public_key);
        assert!(proof.verify(&f.group, &f.he, &c0, &f.keypair.public_key, 1).is_err());

        // a vote outside the range cannot be proven
        let c2 = elgamal_encrypt(&f.group, 2, &nonce, &f.keypair.public_key);
        assert_eq!(
            RangeProof::create(&f.group, &f.he, &c2, 2, 1, &nonce, &f.keypair.public_key),
            Err(ProofError::PlaintextOutOfRange(2, 1))
        );
    }

    #[test]
    fn range_proof_rejects_mutation() {
        let mut f = fixture();
        let nonce = f.group.random_q(&mut f.rng);
        let c = elgamal_encrypt(&f.group, 1, &nonce, &f.keypair.public_key);
        let proof =
            RangeProof::create(&f.group, &f.he, &c, 1, 2, &nonce, &f.keypair.public_key).unwrap();

        let mut bad = proof.clone();
        bad.proofs[0].challenge = f.group.add_q(&bad.proofs[0].challenge, &f.group.one_q());
        assert!(bad.verify(&f.group, &f.he, &c, &f.keypair.public_key, 2).is_err());

        let mut bad = proof.clone();
        bad.proofs[1].response = f.group.add_q(&bad.proofs[1].response, &f.group.one_q());
        assert!(bad.verify(&f.group, &f.he, &c, &f.keypair.public_key, 2).is_err());

        let mut bad = proof.clone();
        bad.proofs[2].response = ElementModQ(f.group.constants().small_prime);
        assert_eq!(
            bad.verify(&f.group, &f.he, &c, &f.keypair.public_key, 2),
            Err(ProofError::OutOfBounds)
        );

        assert_eq!(
            proof.verify(&f.group, &f.he, &c, &f.keypair.public_key, 1),
            Err(ProofError::WrongLength(3, 2))
        );

        let other_he = UInt256([0x43; 32]);
        assert!(proof.verify(&f.group, &other_he, &c, &f.keypair.public_key, 2).is_err());
    }

    #[test]
    fn schnorr_proof() {
        let mut f = fixture();
        let hp = UInt256([1u8; 32]);
        let coeff = ElGamalKeypair::random(&f.group, &mut f.rng);
        let proof = SchnorrProof::create(&f.group, &hp, 2, 1, &coeff, &mut f.rng);
        proof.verify(&f.group, &hp, 2, 1).unwrap();
        assert_eq!(
            proof.verify(&f.group, &hp, 3, 1),
            Err(ProofError::ChallengeMismatch)
        );

        let mut bad = proof.clone();
        bad.response = f.group.add_q(&bad.response, &f.group.one_q());
        assert!(bad.verify(&f.group, &hp, 2, 1).is_err());
    }

    #[test]
    fn share_proof() {
        let mut f = fixture();
        let base = f.group.g_pow_p(&f.group.q_from_u64(31337));
        let share = f.group.pow_p(&base, &f.keypair.secret_key.0);
        let proof = ChaumPedersenProof::create_for_share(
            &f.group,
            &f.he,
            0x30,
            &f.keypair.public_key.0,
            &base,
            &share,
            &f.keypair.secret_key.0,
            &mut f.rng,
        );
        proof
            .verify_share(&f.group, &f.he, 0x30, &f.keypair.public_key.0, &base, &share)
            .unwrap();

        let wrong = f.group.mult_p(&share, &f.group.generator());
        assert!(proof
            .verify_share(&f.group, &f.he, 0x30, &f.keypair.public_key.0, &base, &wrong)
            .is_err());
        assert!(proof
            .verify_share(&f.group, &f.he, 0x31, &f.keypair.public_key.0, &base, &share)
            .is_err());
    }
}
