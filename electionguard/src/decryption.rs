use crate::*;
use indexmap::IndexMap;
use log::{debug, info};
use rand_core::{CryptoRng, RngCore};

/// Tag of the share proofs over selection ciphertexts
pub const SELECTION_SHARE_TAG: u8 = 0x30;
/// Tag of the share proofs over contest data pads
pub const CONTEST_DATA_SHARE_TAG: u8 = 0x31;

/// What a guardian keeps after the key ceremony in order to take part in decryption
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptingTrustee {
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub public_key: ElementModP,
    pub secret_key: ElementModQ,
    /// P_i(x_coordinate) from each other guardian i
    pub key_shares: IndexMap<String, ElementModQ>,
}

impl DecryptingTrustee {
    /// M_i = A^s_i, with proof against K_i
    pub fn direct_share<R: RngCore + CryptoRng>(
        &self,
        group: &GroupContext,
        extended_base_hash: &UInt256,
        tag: u8,
        base: &ElementModP,
        rng: &mut R,
    ) -> DirectShare {
        let share = group.pow_p(base, &self.secret_key);
        let proof = ChaumPedersenProof::create_for_share(
            group,
            extended_base_hash,
            tag,
            &self.public_key,
            base,
            &share,
            &self.secret_key,
            rng,
        );
        DirectShare {
            guardian_id: self.guardian_id.clone(),
            share,
            proof,
        }
    }

    /// M_i,ℓ = A^P_i(ℓ) on behalf of missing guardian i, with proof against g^P_i(ℓ)
    pub fn compensated_share<R: RngCore + CryptoRng>(
        &self,
        group: &GroupContext,
        extended_base_hash: &UInt256,
        tag: u8,
        missing: &Guardian,
        base: &ElementModP,
        rng: &mut R,
    ) -> Result<CompensatedShare, Error> {
        let coordinate = self.key_shares.get(&missing.guardian_id).ok_or_else(|| {
            Error::DecryptionFailed(format!(
                "{} holds no key share from {}",
                self.guardian_id, missing.guardian_id
            ))
        })?;
        let recovery_key = missing.public_share_at(group, self.x_coordinate);
        let share = group.pow_p(base, coordinate);
        let proof = ChaumPedersenProof::create_for_share(
            group,
            extended_base_hash,
            tag,
            &recovery_key,
            base,
            &share,
            coordinate,
            rng,
        );
        Ok(CompensatedShare {
            decrypting_guardian_id: self.guardian_id.clone(),
            share,
            proof,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DirectShare {
    pub guardian_id: String,
    pub share: ElementModP,
    pub proof: ChaumPedersenProof,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompensatedShare {
    pub decrypting_guardian_id: String,
    pub share: ElementModP,
    pub proof: ChaumPedersenProof,
}

/// M_i = Π_ℓ M_i,ℓ^w_ℓ for a missing guardian, with the parts it was built from
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecoveredShare {
    pub missing_guardian_id: String,
    pub share: ElementModP,
    pub parts: Vec<CompensatedShare>,
}

/// Every guardian's share of one decryption
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptionShares {
    pub direct: Vec<DirectShare>,
    #[serde(default)]
    pub recovered: Vec<RecoveredShare>,
}

impl DecryptionShares {
    /// Π_i M_i over present and recovered guardians
    pub fn combined(&self, group: &GroupContext) -> ElementModP {
        group.mult_p_all(
            self.direct
                .iter()
                .map(|d| &d.share)
                .chain(self.recovered.iter().map(|r| &r.share)),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedSelection {
    pub selection_id: String,
    pub tally: u32,
    /// T = B / Π M_i = K^t
    pub value: ElementModP,
    pub ciphertext: ElGamalCiphertext,
    pub shares: DecryptionShares,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedContestData {
    pub contest_data: ContestData,
    pub encrypted: HashedElGamalCiphertext,
    /// β = Π M_i over c0
    pub beta: ElementModP,
    pub shares: DecryptionShares,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedContest {
    pub contest_id: String,
    pub selections: Vec<DecryptedSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypted_contest_data: Option<DecryptedContestData>,
}

/// A decrypted tally or spoiled ballot, with all evidence needed to check it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedTallyOrBallot {
    pub id: String,
    pub election_id: UInt256,
    pub lagrange_coordinates: Vec<LagrangeCoordinate>,
    pub contests: Vec<DecryptedContest>,
}

impl DecryptedTallyOrBallot {
    pub fn contest(&self, contest_id: &str) -> Option<&DecryptedContest> {
        self.contests.iter().find(|c| c.contest_id == contest_id)
    }

    /// The plaintext count of one selection
    pub fn tally(&self, contest_id: &str, selection_id: &str) -> Option<u32> {
        self.contest(contest_id)?
            .selections
            .iter()
            .find(|s| s.selection_id == selection_id)
            .map(|s| s.tally)
    }
}

/// Decrypts tallies and ballots with a quorum of trustees
pub struct Decryptor<'a> {
    group: &'a GroupContext,
    init: &'a ElectionInitialized,
    trustees: Vec<&'a DecryptingTrustee>,
    missing: Vec<&'a Guardian>,
    lagrange: Vec<LagrangeCoordinate>,
}

impl<'a> Decryptor<'a> {
    pub fn new(
        group: &'a GroupContext,
        init: &'a ElectionInitialized,
        trustees: &'a [DecryptingTrustee],
    ) -> Result<Self, Error> {
        let quorum = init.config.quorum as usize;
        if trustees.len() < quorum {
            return Err(Error::NotEnoughTrustees(quorum, trustees.len()));
        }

        let mut present = Vec::with_capacity(trustees.len());
        for trustee in trustees {
            let guardian = init
                .guardian(&trustee.guardian_id)
                .ok_or_else(|| Error::TrusteeMismatch(trustee.guardian_id.clone()))?;
            let matches = guardian.x_coordinate == trustee.x_coordinate
                && guardian.public_key() == Some(&trustee.public_key)
                && group.g_pow_p(&trustee.secret_key) == trustee.public_key;
            if !matches {
                return Err(Error::TrusteeMismatch(trustee.guardian_id.clone()));
            }
            present.push((trustee.guardian_id.as_str(), trustee.x_coordinate));
        }
        let lagrange = lagrange_coordinates(group, &present)?;

        let missing: Vec<&Guardian> = init
            .guardians
            .iter()
            .filter(|g| !trustees.iter().any(|t| t.guardian_id == g.guardian_id))
            .collect();
        if !missing.is_empty() {
            info!(
                "decrypting with {} of {} guardians, recovering {:?}",
                trustees.len(),
                init.guardians.len(),
                missing.iter().map(|g| g.guardian_id.as_str()).collect::<Vec<_>>()
            );
        }

        Ok(Decryptor {
            group,
            init,
            trustees: trustees.iter().collect(),
            missing,
            lagrange,
        })
    }

    pub fn lagrange_coordinates(&self) -> &[LagrangeCoordinate] {
        &self.lagrange
    }

    /// All shares of base^s, recovering missing guardians' shares
    fn shares<R: RngCore + CryptoRng>(
        &self,
        tag: u8,
        base: &ElementModP,
        rng: &mut R,
    ) -> Result<DecryptionShares, Error> {
        let group = self.group;
        let he = &self.init.extended_base_hash;

        let direct = self
            .trustees
            .iter()
            .map(|t| t.direct_share(group, he, tag, base, rng))
            .collect();

        let mut recovered = Vec::with_capacity(self.missing.len());
        for missing in &self.missing {
            let mut parts = Vec::with_capacity(self.trustees.len());
            let mut share = group.one_p();
            for trustee in &self.trustees {
                let part = trustee.compensated_share(group, he, tag, missing, base, rng)?;
                let weight = self
                    .lagrange
                    .iter()
                    .find(|c| c.guardian_id == trustee.guardian_id)
                    .map(|c| &c.coefficient)
                    .ok_or_else(|| Error::TrusteeMismatch(trustee.guardian_id.clone()))?;
                share = group.mult_p(&share, &group.pow_p(&part.share, weight));
                parts.push(part);
            }
            recovered.push(RecoveredShare {
                missing_guardian_id: missing.guardian_id.clone(),
                share,
                parts,
            });
        }

        Ok(DecryptionShares { direct, recovered })
    }

    fn decrypt_selection<R: RngCore + CryptoRng>(
        &self,
        selection_id: &str,
        ciphertext: &ElGamalCiphertext,
        rng: &mut R,
    ) -> Result<DecryptedSelection, Error> {
        let shares = self.shares(SELECTION_SHARE_TAG, &ciphertext.pad, rng)?;
        let value = self.group.div_p(&ciphertext.data, &shares.combined(self.group));
        let tally = self
            .group
            .dlog(&self.init.joint_public_key.0, &value, DEFAULT_MAX_DLOG)
            .ok_or(Error::DlogNotFound(DEFAULT_MAX_DLOG))?;
        Ok(DecryptedSelection {
            selection_id: selection_id.to_string(),
            tally,
            value,
            ciphertext: ciphertext.clone(),
            shares,
        })
    }

    fn decrypt_contest_data<R: RngCore + CryptoRng>(
        &self,
        contest_id: &str,
        encrypted: &HashedElGamalCiphertext,
        rng: &mut R,
    ) -> Result<DecryptedContestData, Error> {
        let shares = self.shares(CONTEST_DATA_SHARE_TAG, &encrypted.c0, rng)?;
        let beta = shares.combined(self.group);
        let contest_data = encrypted.decrypt_contest_data_with_beta(
            self.group,
            &self.init.joint_public_key,
            &self.init.extended_base_hash,
            contest_id,
            &beta,
        )?;
        Ok(DecryptedContestData {
            contest_data,
            encrypted: encrypted.clone(),
            beta,
            shares,
        })
    }

    pub fn decrypt_tally<R: RngCore + CryptoRng>(
        &self,
        tally: &EncryptedTally,
        rng: &mut R,
    ) -> Result<DecryptedTallyOrBallot, Error> {
        let mut contests = Vec::with_capacity(tally.contests.len());
        for contest in &tally.contests {
            let mut selections = Vec::with_capacity(contest.selections.len());
            for selection in &contest.selections {
                selections.push(self.decrypt_selection(
                    &selection.selection_id,
                    &selection.ciphertext,
                    rng,
                )?);
            }
            contests.push(DecryptedContest {
                contest_id: contest.contest_id.clone(),
                selections,
                decrypted_contest_data: None,
            });
        }
        info!("decrypted tally {}", tally.tally_id);
        Ok(DecryptedTallyOrBallot {
            id: tally.tally_id.clone(),
            election_id: tally.election_id,
            lagrange_coordinates: self.lagrange.clone(),
            contests,
        })
    }

    /// Decrypt a spoiled ballot, including its contest data
    pub fn decrypt_ballot<R: RngCore + CryptoRng>(
        &self,
        ballot: &EncryptedBallot,
        rng: &mut R,
    ) -> Result<DecryptedTallyOrBallot, Error> {
        let mut contests = Vec::with_capacity(ballot.contests.len());
        for contest in &ballot.contests {
            let mut selections = Vec::new();
            for selection in contest.real_selections() {
                selections.push(self.decrypt_selection(
                    &selection.selection_id,
                    &selection.ciphertext,
                    rng,
                )?);
            }
            let data = self.decrypt_contest_data(&contest.contest_id, &contest.contest_data, rng)?;
            contests.push(DecryptedContest {
                contest_id: contest.contest_id.clone(),
                selections,
                decrypted_contest_data: Some(data),
            });
        }
        debug!("decrypted ballot {}", ballot.ballot_id);
        Ok(DecryptedTallyOrBallot {
            id: ballot.ballot_id.clone(),
            election_id: ballot.election_id,
            lagrange_coordinates: self.lagrange.clone(),
            contests,
        })
    }
}
