use crate::*;
use rand_core::{CryptoRng, RngCore};

/// A guardian's secret polynomial P_i(x) = Σ_j a_ij x^j of degree quorum - 1.
///
/// Each coefficient is kept as a keypair (a_ij, K_ij = g^a_ij) together with the
/// Schnorr proof that the guardian knows a_ij.
pub struct SecretPolynomial {
    coefficients: Vec<ElGamalKeypair>,
    proofs: Vec<SchnorrProof>,
}

impl SecretPolynomial {
    pub fn generate<R: RngCore + CryptoRng>(
        group: &GroupContext,
        parameter_base_hash: &UInt256,
        guardian_index: u32,
        quorum: u32,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(quorum as usize);
        let mut proofs = Vec::with_capacity(quorum as usize);
        for j in 0..quorum {
            let keypair = ElGamalKeypair::random(group, rng);
            proofs.push(SchnorrProof::create(
                group,
                parameter_base_hash,
                guardian_index,
                j,
                &keypair,
                rng,
            ));
            coefficients.push(keypair);
        }
        SecretPolynomial {
            coefficients,
            proofs,
        }
    }

    /// a_i0, the guardian's election secret key
    pub fn secret(&self) -> &ElGamalKeypair {
        &self.coefficients[0]
    }

    pub fn proofs(&self) -> &[SchnorrProof] {
        &self.proofs
    }

    /// P_i(x) mod q, by Horner's rule
    pub fn value_at(&self, group: &GroupContext, x: u32) -> ElementModQ {
        let x = group.q_from_u64(x as u64);
        self.coefficients
            .iter()
            .rev()
            .fold(group.zero_q(), |acc, c| {
                group.add_q(&group.mult_q(&acc, &x), &c.secret_key.0)
            })
    }
}

/// Check g^P_i(x) = Π_j K_ij^(x^j) for a share received from `sender`
pub fn verify_polynomial_share(
    group: &GroupContext,
    sender: &Guardian,
    x: u32,
    share: &ElementModQ,
) -> bool {
    group.g_pow_p(share) == sender.public_share_at(group, x)
}
