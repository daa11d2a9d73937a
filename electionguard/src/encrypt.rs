use crate::*;
use log::debug;

/// Turns a plaintext ballot into a fully proven ciphertext ballot
pub trait BallotEncryptor {
    /// Encrypt with the given ballot nonce and auxiliary confirmation code input.
    /// The same inputs always produce the same ciphertext ballot.
    fn encrypt(
        &self,
        ballot: &PlaintextBallot,
        ballot_nonce: UInt256,
        code_baux: Vec<u8>,
    ) -> Result<CiphertextBallot, Error>;
}

/// One encrypted slot of a contest: a real selection or a placeholder
#[derive(Debug, Clone)]
pub(crate) struct SelectionSlot {
    pub selection_id: String,
    pub sequence_order: u32,
    pub limit: u32,
    pub is_placeholder: bool,
}

/// Real selections in sequence order, followed by votes_allowed placeholders
pub(crate) fn selection_slots(contest: &ContestDescription) -> Vec<SelectionSlot> {
    let mut real: Vec<&SelectionDescription> = contest.selections.iter().collect();
    real.sort_by_key(|s| s.sequence_order);
    let next = real.last().map(|s| s.sequence_order + 1).unwrap_or(1);

    let mut slots: Vec<SelectionSlot> = real
        .into_iter()
        .map(|s| SelectionSlot {
            selection_id: s.selection_id.clone(),
            sequence_order: s.sequence_order,
            limit: contest.option_limit,
            is_placeholder: false,
        })
        .collect();
    for k in 0..contest.votes_allowed {
        slots.push(SelectionSlot {
            selection_id: format!("{}-placeholder-{}", contest.contest_id, k + 1),
            sequence_order: next + k,
            limit: 1,
            is_placeholder: true,
        });
    }
    slots
}

/// The values to encrypt in each slot of a contest
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContestPlan {
    pub votes: Vec<u32>,
    pub real_total: u32,
    pub contest_data: ContestData,
}

/// Decide what gets encrypted: overvoted contests are zeroed and their intent moved to the
/// contest data; placeholders absorb unused votes so all slots sum to votes_allowed.
pub(crate) fn plan_contest(
    contest: &ContestDescription,
    slots: &[SelectionSlot],
    real_votes: &[u32],
    write_ins: &[String],
) -> ContestPlan {
    let limit = contest.votes_allowed;
    let voted_for: Vec<i32> = slots
        .iter()
        .zip(real_votes.iter())
        .filter(|(_, v)| **v > 0)
        .map(|(s, _)| s.sequence_order as i32)
        .collect();
    let sum = real_votes.iter().fold(0u32, |acc, v| acc.saturating_add(*v));
    let over_option = real_votes.iter().any(|v| *v > contest.option_limit);

    let mut contest_data = ContestData::new(limit, voted_for.clone(), write_ins.to_vec());
    let overvoted =
        contest_data.status == ContestDataStatus::OverVote || over_option || sum > limit;
    if overvoted {
        contest_data.status = ContestDataStatus::OverVote;
        contest_data.over_votes = voted_for;
    }

    let mut votes: Vec<u32> = if overvoted {
        vec![0; real_votes.len()]
    } else {
        real_votes.to_vec()
    };
    let real_total: u32 = votes.iter().sum();
    for k in 0..limit {
        votes.push(if k < limit - real_total { 1 } else { 0 });
    }

    ContestPlan {
        votes,
        real_total,
        contest_data,
    }
}

/// ξ = H(He; 0x20, ξ_B, Λ, λ) mod q
pub fn selection_nonce(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    ballot_nonce: &UInt256,
    contest_id: &str,
    selection_id: &str,
) -> ElementModQ {
    let h = group
        .hasher(extended_base_hash)
        .byte(0x20)
        .uint256(ballot_nonce)
        .string(contest_id)
        .string(selection_id)
        .finish();
    group.q_from_uint256(&h)
}

/// The canonical ballot encryptor
pub struct Encryptor<'a> {
    pub(crate) group: &'a GroupContext,
    pub(crate) manifest: &'a Manifest,
    pub(crate) public_key: ElGamalPublicKey,
    pub(crate) extended_base_hash: UInt256,
    pub(crate) device: String,
}

impl<'a> Encryptor<'a> {
    pub fn new(
        group: &'a GroupContext,
        manifest: &'a Manifest,
        init: &ElectionInitialized,
        device: &str,
    ) -> Self {
        Encryptor {
            group,
            manifest,
            public_key: init.joint_public_key.clone(),
            extended_base_hash: init.extended_base_hash,
            device: device.to_string(),
        }
    }

    pub(crate) fn encrypt_selection(
        &self,
        ballot_nonce: &UInt256,
        contest_id: &str,
        slot: &SelectionSlot,
        vote: u32,
    ) -> Result<(EncryptedSelection, ElementModQ), Error> {
        let nonce = selection_nonce(
            self.group,
            &self.extended_base_hash,
            ballot_nonce,
            contest_id,
            &slot.selection_id,
        );
        let ciphertext = elgamal_encrypt(self.group, vote, &nonce, &self.public_key);
        let proof = RangeProof::create(
            self.group,
            &self.extended_base_hash,
            &ciphertext,
            vote,
            slot.limit,
            &nonce,
            &self.public_key,
        )
        .map_err(|e| Error::EncryptionCheckFailed(slot.selection_id.clone(), e.to_string()))?;

        let selection = EncryptedSelection {
            selection_id: slot.selection_id.clone(),
            sequence_order: slot.sequence_order,
            ciphertext,
            proof,
            is_placeholder: slot.is_placeholder,
        };
        Ok((selection, nonce))
    }

    /// Add the contest proof, contest data and contest hash to encrypted selections
    pub(crate) fn finish_contest(
        &self,
        contest: &ContestDescription,
        plan: &ContestPlan,
        encrypted: Vec<(EncryptedSelection, ElementModQ)>,
        ballot_nonce: &UInt256,
    ) -> Result<(EncryptedContest, Vec<ElementModQ>), Error> {
        let (selections, nonces): (Vec<EncryptedSelection>, Vec<ElementModQ>) =
            encrypted.into_iter().unzip();

        let real_ciphertexts = selections
            .iter()
            .filter(|s| !s.is_placeholder)
            .map(|s| &s.ciphertext);
        let total = elgamal_add_all(self.group, real_ciphertexts);
        let total_nonce = self.group.add_q_all(
            selections
                .iter()
                .zip(nonces.iter())
                .filter(|(s, _)| !s.is_placeholder)
                .map(|(_, n)| n),
        );
        let proof = RangeProof::create(
            self.group,
            &self.extended_base_hash,
            &total,
            plan.real_total,
            contest.votes_allowed,
            &total_nonce,
            &self.public_key,
        )
        .map_err(|e| Error::EncryptionCheckFailed(contest.contest_id.clone(), e.to_string()))?;

        let contest_data = plan.contest_data.encrypt(
            self.group,
            &self.public_key,
            &self.extended_base_hash,
            &contest.contest_id,
            contest.sequence_order,
            ballot_nonce,
            contest.votes_allowed,
        )?;

        let contest_hash = contest_hash(
            self.group,
            &self.extended_base_hash,
            &contest.contest_id,
            &self.public_key,
            selections.iter().map(|s| &s.ciphertext),
        );

        let encrypted = EncryptedContest {
            contest_id: contest.contest_id.clone(),
            sequence_order: contest.sequence_order,
            contest_hash,
            selections,
            proof,
            contest_data,
            pre_encryption: None,
        };
        Ok((encrypted, nonces))
    }

    /// Sort contests, compute the confirmation code and assemble the ballot
    pub(crate) fn finish_ballot(
        &self,
        ballot_id: &str,
        ballot_style_id: &str,
        ballot_nonce: UInt256,
        mut contests: Vec<(EncryptedContest, Vec<ElementModQ>)>,
        code_baux: Vec<u8>,
    ) -> CiphertextBallot {
        contests.sort_by_key(|(c, _)| c.sequence_order);
        let (contests, selection_nonces): (Vec<EncryptedContest>, Vec<Vec<ElementModQ>>) =
            contests.into_iter().unzip();

        let code = confirmation_code(
            self.group,
            &self.extended_base_hash,
            contests.iter().map(|c| &c.contest_hash),
            &code_baux,
        );
        debug!("encrypted ballot {} confirmation code {}", ballot_id, code);

        CiphertextBallot {
            ballot: EncryptedBallot {
                ballot_id: ballot_id.to_string(),
                ballot_style_id: ballot_style_id.to_string(),
                encrypting_device: self.device.clone(),
                election_id: self.extended_base_hash,
                confirmation_code: code,
                code_baux,
                contests,
                state: BallotState::Unknown,
                is_preencrypt: false,
            },
            ballot_nonce,
            selection_nonces,
        }
    }

    fn encrypt_contest(
        &self,
        contest: &ContestDescription,
        plaintext: Option<&PlaintextContest>,
        ballot_nonce: &UInt256,
    ) -> Result<(EncryptedContest, Vec<ElementModQ>), Error> {
        let slots = selection_slots(contest);
        let real_votes: Vec<u32> = slots
            .iter()
            .filter(|s| !s.is_placeholder)
            .map(|s| {
                plaintext
                    .and_then(|p| p.selection(&s.selection_id))
                    .map(|p| p.vote)
                    .unwrap_or(0)
            })
            .collect();
        let write_ins = plaintext.map(|p| p.write_ins.clone()).unwrap_or_default();
        let plan = plan_contest(contest, &slots, &real_votes, &write_ins);

        let mut encrypted = Vec::with_capacity(slots.len());
        for (slot, vote) in slots.iter().zip(plan.votes.iter()) {
            encrypted.push(self.encrypt_selection(ballot_nonce, &contest.contest_id, slot, *vote)?);
        }
        self.finish_contest(contest, &plan, encrypted, ballot_nonce)
    }
}

impl<'a> BallotEncryptor for Encryptor<'a> {
    fn encrypt(
        &self,
        ballot: &PlaintextBallot,
        ballot_nonce: UInt256,
        code_baux: Vec<u8>,
    ) -> Result<CiphertextBallot, Error> {
        let contests = self
            .manifest
            .contests_for_style(&ballot.ballot_style_id)
            .ok_or_else(|| {
                ValidationError::UnknownBallotStyle(
                    ballot.ballot_id.clone(),
                    ballot.ballot_style_id.clone(),
                )
            })?;

        // contests on the style but missing from the ballot are encrypted as all zero
        let mut encrypted = Vec::with_capacity(contests.len());
        for contest in contests {
            let plaintext = ballot.contest(&contest.contest_id);
            encrypted.push(self.encrypt_contest(contest, plaintext, &ballot_nonce)?);
        }

        Ok(self.finish_ballot(
            &ballot.ballot_id,
            &ballot.ballot_style_id,
            ballot_nonce,
            encrypted,
            code_baux,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election, test_manifest};
    use crate::*;

    #[test]
    fn plan_undervote_fills_placeholders() {
        let manifest = test_manifest();
        let council = manifest.contest("council").unwrap();
        let slots = selection_slots(council);
        assert_eq!(slots.len(), 6);
        assert!(slots[4].is_placeholder && slots[5].is_placeholder);

        let plan = plan_contest(council, &slots, &[0, 1, 0, 0], &[]);
        assert_eq!(plan.votes, vec![0, 1, 0, 0, 1, 0]);
        assert_eq!(plan.real_total, 1);
        assert_eq!(plan.contest_data.status, ContestDataStatus::UnderVote);

        let plan = plan_contest(council, &slots, &[0, 0, 0, 0], &[]);
        assert_eq!(plan.votes, vec![0, 0, 0, 0, 1, 1]);
        assert_eq!(plan.contest_data.status, ContestDataStatus::NullVote);
    }

    #[test]
    fn plan_overvote_zeroes_selections() {
        let manifest = test_manifest();
        let president = manifest.contest("president").unwrap();
        let slots = selection_slots(president);
        let plan = plan_contest(president, &slots, &[1, 0, 1], &[]);
        assert_eq!(plan.votes, vec![0, 0, 0, 1]);
        assert_eq!(plan.real_total, 0);
        assert_eq!(plan.contest_data.status, ContestDataStatus::OverVote);
        assert_eq!(plan.contest_data.over_votes, vec![1, 3]);

        // a single selection over its option limit is also an overvote
        let plan = plan_contest(president, &slots, &[2, 0, 0], &[]);
        assert_eq!(plan.contest_data.status, ContestDataStatus::OverVote);
        assert_eq!(plan.votes, vec![0, 0, 0, 1]);
    }

    #[test]
    fn encryption_is_deterministic_and_complete() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");

        // council is missing from the ballot
        let ballot = test_ballot("b1", &[("president", "alice"), ("measure", "no")]);
        let nonce = UInt256([1u8; 32]);
        let a = encryptor.encrypt(&ballot, nonce, vec![]).unwrap();
        let b = encryptor.encrypt(&ballot, nonce, vec![]).unwrap();
        assert_eq!(a.ballot, b.ballot);

        let ids: Vec<&str> = a.ballot.contests.iter().map(|c| c.contest_id.as_str()).collect();
        assert_eq!(ids, vec!["president", "council", "measure"]);
        assert_eq!(a.ballot.election_id, init.extended_base_hash);

        let other = encryptor.encrypt(&ballot, UInt256([2u8; 32]), vec![]).unwrap();
        assert_ne!(other.ballot.confirmation_code, a.ballot.confirmation_code);
    }

    #[test]
    fn contest_proof_covers_the_real_selections() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("b1", &[("council", "erin")]);
        let encrypted = encryptor.encrypt(&ballot, UInt256([4u8; 32]), vec![]).unwrap();
        let council = encrypted.ballot.contest("council").unwrap();
        let he = &init.extended_base_hash;
        let key = &init.joint_public_key;

        // one real vote and one placeholder absorbing the unused vote
        assert_eq!(council.selections.iter().filter(|s| s.is_placeholder).count(), 2);
        let real = elgamal_add_all(&group, council.real_selections().map(|s| &s.ciphertext));
        council.proof.verify(&group, he, &real, key, 2).unwrap();

        let all = elgamal_add_all(&group, council.selections.iter().map(|s| &s.ciphertext));
        assert!(council.proof.verify(&group, he, &all, key, 2).is_err());
    }

    #[test]
    fn long_multibyte_write_in_still_encrypts() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let mut ballot = test_ballot("b1", &[("president", "alice")]);
        ballot.contests[0].write_ins.push("é".repeat(31));

        let encrypted = encryptor.encrypt(&ballot, UInt256([3u8; 32]), vec![]).unwrap();
        let president = encrypted.ballot.contest("president").unwrap();
        assert_eq!(president.contest_data.num_bytes, 64);
    }

    #[test]
    fn unknown_style_is_rejected() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let mut ballot = test_ballot("b1", &[("president", "alice")]);
        ballot.ballot_style_id = "missing".to_string();
        assert!(matches!(
            encryptor.encrypt(&ballot, UInt256::default(), vec![]),
            Err(Error::InvalidBallot(ValidationError::UnknownBallotStyle(_, _)))
        ));
    }
}
