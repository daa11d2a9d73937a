use crate::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

// rule for a rejected proof: residue, length, challenge
fn proof_rule(rules: [&'static str; 3], e: &ProofError) -> &'static str {
    match e {
        ProofError::NotResidue => rules[0],
        ProofError::WrongLength(_, _) | ProofError::PlaintextOutOfRange(_, _) => rules[1],
        ProofError::OutOfBounds | ProofError::ChallengeMismatch => rules[2],
    }
}

/// Checks encrypted ballots, their confirmation codes and the tally built from them
pub struct BallotVerifier<'a> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    init: &'a ElectionInitialized,
}

impl<'a> BallotVerifier<'a> {
    pub fn new(group: &'a GroupContext, manifest: &'a Manifest, init: &'a ElectionInitialized) -> Self {
        BallotVerifier {
            group,
            manifest,
            init,
        }
    }

    /// Everything that can be checked on one ballot in isolation
    pub fn verify_ballot(&self, ballot: &EncryptedBallot) -> Vec<VerificationError> {
        let id = &ballot.ballot_id;
        let mut errors = Vec::new();

        if ballot.election_id != self.init.extended_base_hash {
            errors.push(VerificationError::new(
                "6.H",
                format!("ballot {} has the wrong election id", id),
            ));
        }

        match self.manifest.style_contest_ids(&ballot.ballot_style_id) {
            None => errors.push(VerificationError::new(
                "11.A",
                format!("ballot {} has unknown style {}", id, ballot.ballot_style_id),
            )),
            Some(expected) => {
                let found: Vec<&str> = ballot.contests.iter().map(|c| c.contest_id.as_str()).collect();
                if found != expected {
                    errors.push(VerificationError::new(
                        "11.A",
                        format!("ballot {} has contests {:?}, style has {:?}", id, found, expected),
                    ));
                }
            }
        }

        for contest in &ballot.contests {
            errors.extend(self.verify_contest(ballot, contest));
        }

        let hashes = ballot.contests.iter().map(|c| &c.contest_hash);
        let (rule, code) = if ballot.is_preencrypt {
            let code = preencryption_confirmation_code(
                self.group,
                &self.init.extended_base_hash,
                hashes,
                &ballot.code_baux,
            );
            ("17.C", code)
        } else {
            let code = confirmation_code(self.group, &self.init.extended_base_hash, hashes, &ballot.code_baux);
            ("6.B", code)
        };
        if code != ballot.confirmation_code {
            errors.push(VerificationError::new(
                rule,
                format!("ballot {} confirmation code does not match", id),
            ));
        }
        errors
    }

    fn verify_contest(&self, ballot: &EncryptedBallot, contest: &EncryptedContest) -> Vec<VerificationError> {
        let id = &ballot.ballot_id;
        let group = self.group;
        let he = &self.init.extended_base_hash;
        let key = &self.init.joint_public_key;
        let mut errors = Vec::new();

        let description = match self.manifest.contest(&contest.contest_id) {
            Some(d) => d,
            None => {
                errors.push(VerificationError::new(
                    "11.A",
                    format!("ballot {} has unknown contest {}", id, contest.contest_id),
                ));
                return errors;
            }
        };

        let mut real: Vec<&str> = contest.real_selections().map(|s| s.selection_id.as_str()).collect();
        let mut expected = self.manifest.selection_ids(&contest.contest_id);
        real.sort_unstable();
        expected.sort_unstable();
        if real != expected {
            errors.push(VerificationError::new(
                "11.B",
                format!("ballot {} contest {} selections do not match the manifest", id, contest.contest_id),
            ));
        }
        let placeholders = contest.selections.iter().filter(|s| s.is_placeholder).count();
        let expected_placeholders = if ballot.is_preencrypt {
            0
        } else {
            description.votes_allowed as usize
        };
        if placeholders != expected_placeholders {
            errors.push(VerificationError::new(
                "11.C",
                format!(
                    "ballot {} contest {} has {} placeholders, expected {}",
                    id, contest.contest_id, placeholders, expected_placeholders
                ),
            ));
        }

        for selection in &contest.selections {
            let limit = if selection.is_placeholder {
                1
            } else {
                description.option_limit
            };
            if let Err(e) = selection.proof.verify(group, he, &selection.ciphertext, key, limit) {
                errors.push(VerificationError::new(
                    proof_rule(["4.A", "4.B", "4.C"], &e),
                    format!("ballot {} selection {}: {}", id, selection.selection_id, e),
                ));
            }
        }

        let total = elgamal_add_all(group, contest.real_selections().map(|s| &s.ciphertext));
        if let Err(e) = contest.proof.verify(group, he, &total, key, description.votes_allowed) {
            errors.push(VerificationError::new(
                proof_rule(["5.A", "5.B", "5.C"], &e),
                format!("ballot {} contest {}: {}", id, contest.contest_id, e),
            ));
        }

        match (&contest.pre_encryption, ballot.is_preencrypt) {
            (Some(pe), true) => errors.extend(self.verify_preencryption(id, description, contest, pe)),
            (None, false) => {
                let hash = contest_hash(
                    group,
                    he,
                    &contest.contest_id,
                    key,
                    contest.selections.iter().map(|s| &s.ciphertext),
                );
                if hash != contest.contest_hash {
                    errors.push(VerificationError::new(
                        "6.A",
                        format!("ballot {} contest {} hash does not match", id, contest.contest_id),
                    ));
                }
            }
            _ => errors.push(VerificationError::new(
                "17.B",
                format!(
                    "ballot {} contest {} pre-encryption record does not match the ballot type",
                    id, contest.contest_id
                ),
            )),
        }
        errors
    }

    fn verify_preencryption(
        &self,
        id: &str,
        description: &ContestDescription,
        contest: &EncryptedContest,
        pe: &PreEncryption,
    ) -> Vec<VerificationError> {
        let group = self.group;
        let he = &self.init.extended_base_hash;
        let key = &self.init.joint_public_key;
        let cid = &contest.contest_id;
        let width = contest.selections.len();
        let mut errors = Vec::new();
        let all: HashSet<&UInt256> = pe.all_selection_hashes.iter().collect();

        if pe.selected_vectors.len() != description.votes_allowed as usize {
            errors.push(VerificationError::new(
                "16.B",
                format!(
                    "ballot {} contest {} has {} selected vectors, expected {}",
                    id,
                    cid,
                    pe.selected_vectors.len(),
                    description.votes_allowed
                ),
            ));
        }
        let codes: IndexMap<&UInt256, String> = pe
            .all_selection_hashes
            .iter()
            .zip(short_codes(&pe.all_selection_hashes))
            .collect();
        for vector in &pe.selected_vectors {
            if codes.get(&vector.selection_hash) != Some(&vector.short_code) {
                errors.push(VerificationError::new(
                    "16.A",
                    format!("ballot {} contest {} short code {} does not match", id, cid, vector.short_code),
                ));
            }
            if vector.encryptions.len() != width {
                errors.push(VerificationError::new(
                    "16.B",
                    format!("ballot {} contest {} selected vector has the wrong length", id, cid),
                ));
            }
            let hash = selection_hash(group, he, key, &vector.encryptions);
            if hash != vector.selection_hash || !all.contains(&hash) {
                errors.push(VerificationError::new(
                    "17.A",
                    format!("ballot {} contest {} selection hash {} does not match", id, cid, vector.short_code),
                ));
            }
        }

        for (k, selection) in contest.selections.iter().enumerate() {
            let product = elgamal_add_all(
                group,
                pe.selected_vectors.iter().filter_map(|v| v.encryptions.get(k)),
            );
            if product != selection.ciphertext {
                errors.push(VerificationError::new(
                    "16.B",
                    format!(
                        "ballot {} contest {} selection {} is not the product of the selected vectors",
                        id, cid, selection.selection_id
                    ),
                ));
            }
        }

        let expected_hashes = description.selections.len() + description.votes_allowed as usize;
        let sorted = pe.all_selection_hashes.windows(2).all(|w| w[0] <= w[1]);
        let hash = preencryption_contest_hash(group, he, cid, key, &pe.all_selection_hashes);
        if !sorted
            || pe.all_selection_hashes.len() != expected_hashes
            || hash != pe.preencryption_hash
            || hash != contest.contest_hash
        {
            errors.push(VerificationError::new(
                "17.B",
                format!("ballot {} contest {} pre-encryption hash does not match", id, cid),
            ));
        }
        errors
    }

    /// Checks across ballots: unique confirmation codes and every device's chain
    pub fn verify_confirmation_codes(
        &self,
        ballots: &[EncryptedBallot],
        chains: &IndexMap<String, Option<EncryptedBallotChain>>,
    ) -> Vec<VerificationError> {
        let mut errors = Vec::new();

        let mut seen: HashMap<&UInt256, &str> = HashMap::new();
        for ballot in ballots {
            if let Some(first) = seen.insert(&ballot.confirmation_code, &ballot.ballot_id) {
                errors.push(VerificationError::new(
                    "6.C",
                    format!(
                        "ballots {} and {} share confirmation code {}",
                        first, ballot.ballot_id, ballot.confirmation_code
                    ),
                ));
            }
        }

        let chained = self.init.config.chain_confirmation_codes;
        let head = chain_head(self.group, &self.init.extended_base_hash, &self.init.config.config_baux0);
        for (device, chain) in chains {
            let by_id: HashMap<&str, &EncryptedBallot> = ballots
                .iter()
                .filter(|b| &b.encrypting_device == device)
                .map(|b| (b.ballot_id.as_str(), b))
                .collect();

            let chain = match chain {
                Some(chain) => chain,
                None => {
                    if chained {
                        errors.push(VerificationError::new(
                            "6.D",
                            format!("device {} has no ballot chain", device),
                        ));
                    }
                    continue;
                }
            };

            if chained {
                let listed: HashSet<&str> = chain.ballot_ids.iter().map(|s| s.as_str()).collect();
                let present: HashSet<&str> = by_id.keys().copied().collect();
                if !chain.chained || listed != present || listed.len() != chain.ballot_ids.len() {
                    errors.push(VerificationError::new(
                        "6.D",
                        format!("device {} chain does not list exactly its ballots", device),
                    ));
                }

                let mut previous: Option<&UInt256> = None;
                for (j, ballot_id) in chain.ballot_ids.iter().enumerate() {
                    let ballot = match by_id.get(ballot_id.as_str()) {
                        Some(b) => b,
                        None => break,
                    };
                    let expected = chained_baux(&head, previous);
                    if ballot.code_baux != expected {
                        let rule = if j == 0 { "6.E" } else { "6.F" };
                        errors.push(VerificationError::new(
                            rule,
                            format!("device {} ballot {} is not chained to its predecessor", device, ballot_id),
                        ));
                    }
                    previous = Some(&ballot.confirmation_code);
                }
            }

            let last = chain
                .ballot_ids
                .last()
                .and_then(|id| by_id.get(id.as_str()))
                .map(|b| &b.confirmation_code);
            let closing = closing_hash(self.group, &self.init.extended_base_hash, &head, last);
            if closing != chain.closing_hash || last != chain.last_confirmation_code.as_ref() {
                errors.push(VerificationError::new(
                    "6.G",
                    format!("device {} closing hash does not match", device),
                ));
            }
        }
        errors
    }

    /// Recompute the tally from the cast ballots and compare
    pub fn verify_aggregation(
        &self,
        ballots: &[EncryptedBallot],
        tally: &EncryptedTally,
    ) -> Vec<VerificationError> {
        let mut errors = Vec::new();
        let he = &self.init.extended_base_hash;

        if &tally.election_id != he {
            errors.push(VerificationError::new("7.B", "tally has the wrong election id"));
        }

        let mut accumulate = AccumulateTally::new(self.group, self.manifest, *he);
        for ballot in ballots {
            if let Err(e) = accumulate.add(ballot) {
                errors.push(VerificationError::new("7.A", e.to_string()));
            }
        }
        let expected = accumulate.build(&tally.tally_id);

        let cast: HashSet<&String> = expected.cast_ballot_ids.iter().collect();
        let listed: HashSet<&String> = tally.cast_ballot_ids.iter().collect();
        if cast != listed || listed.len() != tally.cast_ballot_ids.len() {
            errors.push(VerificationError::new(
                "7.D",
                format!(
                    "tally lists {} cast ballots, record has {}",
                    tally.cast_ballot_ids.len(),
                    cast.len()
                ),
            ));
        }

        for contest in &expected.contests {
            let found = match tally.contest(&contest.contest_id) {
                Some(c) => c,
                None => {
                    errors.push(VerificationError::new(
                        "7.C",
                        format!("tally is missing contest {}", contest.contest_id),
                    ));
                    continue;
                }
            };
            for selection in &contest.selections {
                match found.selection(&selection.selection_id) {
                    None => errors.push(VerificationError::new(
                        "7.C",
                        format!("tally is missing selection {}", selection.selection_id),
                    )),
                    Some(s) if s.ciphertext != selection.ciphertext => {
                        errors.push(VerificationError::new(
                            "7.A",
                            format!(
                                "contest {} selection {} is not the product of the cast ballots",
                                contest.contest_id, selection.selection_id
                            ),
                        ))
                    }
                    Some(_) => {}
                }
            }
            if found.selections.len() != contest.selections.len() {
                errors.push(VerificationError::new(
                    "7.C",
                    format!("tally contest {} has extra selections", contest.contest_id),
                ));
            }
        }
        if tally.contests.len() != expected.contests.len() {
            errors.push(VerificationError::new("7.C", "tally has extra contests"));
        }
        errors
    }
}
