use crate::*;
use indexmap::{IndexMap, IndexSet};
use log::{info, warn};

/// Homomorphic sum of all cast ballots, per contest and selection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedTally {
    pub tally_id: String,
    pub election_id: UInt256,
    pub contests: Vec<EncryptedTallyContest>,
    pub cast_ballot_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedTallyContest {
    pub contest_id: String,
    pub sequence_order: u32,
    pub selections: Vec<EncryptedTallySelection>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedTallySelection {
    pub selection_id: String,
    pub sequence_order: u32,
    pub ciphertext: ElGamalCiphertext,
}

impl EncryptedTally {
    pub fn contest(&self, contest_id: &str) -> Option<&EncryptedTallyContest> {
        self.contests.iter().find(|c| c.contest_id == contest_id)
    }
}

impl EncryptedTallyContest {
    pub fn selection(&self, selection_id: &str) -> Option<&EncryptedTallySelection> {
        self.selections
            .iter()
            .find(|s| s.selection_id == selection_id)
    }
}

/// Accumulates cast ballots into an `EncryptedTally`
pub struct AccumulateTally<'a> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    election_id: UInt256,
    // contest id -> selection id -> running sum
    sums: IndexMap<String, IndexMap<String, ElGamalCiphertext>>,
    cast_ids: IndexSet<String>,
}

impl<'a> AccumulateTally<'a> {
    pub fn new(group: &'a GroupContext, manifest: &'a Manifest, election_id: UInt256) -> Self {
        let mut contests: Vec<&ContestDescription> = manifest.contests.iter().collect();
        contests.sort_by_key(|c| c.sequence_order);
        let sums = contests
            .iter()
            .map(|c| {
                let mut selections: Vec<&SelectionDescription> = c.selections.iter().collect();
                selections.sort_by_key(|s| s.sequence_order);
                let zeros = selections
                    .iter()
                    .map(|s| (s.selection_id.clone(), ElGamalCiphertext::identity(group)))
                    .collect();
                (c.contest_id.clone(), zeros)
            })
            .collect();
        AccumulateTally {
            group,
            manifest,
            election_id,
            sums,
            cast_ids: IndexSet::new(),
        }
    }

    /// Add a ballot. Spoiled ballots are skipped and return false; a ballot from another
    /// election, a duplicate, or one with unknown contents is rejected.
    pub fn add<B: EncryptedBallotIF>(&mut self, ballot: &B) -> Result<bool, Error> {
        let id = ballot.ballot_id();
        if ballot.state() != BallotState::Cast {
            return Ok(false);
        }
        let reject = |msg: &str| {
            warn!("tally rejected ballot {}: {}", id, msg);
            Error::TallyRejected(id.to_string(), msg.to_string())
        };
        if ballot.election_id() != &self.election_id {
            return Err(reject("wrong election id"));
        }
        if self.cast_ids.contains(id) {
            return Err(reject("duplicate ballot id"));
        }

        let contests = ballot.contest_ciphertexts();
        // check everything before mutating anything
        for (contest_id, selections) in &contests {
            let sums = self
                .sums
                .get(*contest_id)
                .ok_or_else(|| reject(&format!("unknown contest {}", contest_id)))?;
            for (selection_id, _) in selections {
                if !sums.contains_key(*selection_id) {
                    return Err(reject(&format!("unknown selection {}", selection_id)));
                }
            }
        }

        for (contest_id, selections) in contests {
            if let Some(sums) = self.sums.get_mut(contest_id) {
                for (selection_id, ciphertext) in selections {
                    if let Some(sum) = sums.get_mut(selection_id) {
                        *sum = sum.add(self.group, ciphertext);
                    }
                }
            }
        }
        self.cast_ids.insert(id.to_string());
        Ok(true)
    }

    pub fn cast_count(&self) -> usize {
        self.cast_ids.len()
    }

    pub fn build(self, tally_id: &str) -> EncryptedTally {
        let manifest = self.manifest;
        let contests = self
            .sums
            .into_iter()
            .filter_map(|(contest_id, sums)| {
                let description = manifest.contest(&contest_id)?;
                let selections = sums
                    .into_iter()
                    .filter_map(|(selection_id, ciphertext)| {
                        let s = description.selection(&selection_id)?;
                        Some(EncryptedTallySelection {
                            selection_id,
                            sequence_order: s.sequence_order,
                            ciphertext,
                        })
                    })
                    .collect();
                Some(EncryptedTallyContest {
                    contest_id,
                    sequence_order: description.sequence_order,
                    selections,
                })
            })
            .collect();

        info!("tally {} accumulated {} cast ballots", tally_id, self.cast_ids.len());
        EncryptedTally {
            tally_id: tally_id.to_string(),
            election_id: self.election_id,
            contests,
            cast_ballot_ids: self.cast_ids.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election};
    use crate::*;

    #[test]
    fn accumulates_cast_ballots_only() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let mut tally = AccumulateTally::new(&group, &manifest, init.extended_base_hash);

        let b1 = encryptor
            .encrypt(&test_ballot("b1", &[("president", "alice")]), UInt256([1u8; 32]), vec![])
            .unwrap()
            .cast();
        let b2 = encryptor
            .encrypt(&test_ballot("b2", &[("president", "alice")]), UInt256([2u8; 32]), vec![])
            .unwrap()
            .spoil();

        assert!(tally.add(&b1).unwrap());
        assert!(!tally.add(&b2).unwrap());
        assert!(matches!(tally.add(&b1), Err(Error::TallyRejected(_, _))));

        let mut other = b1.clone();
        other.ballot_id = "b3".to_string();
        other.election_id = UInt256([9u8; 32]);
        assert!(tally.add(&other).is_err());

        let tally = tally.build("tally");
        assert_eq!(tally.cast_ballot_ids, vec!["b1".to_string()]);

        let alice = &tally.contest("president").unwrap().selection("alice").unwrap().ciphertext;
        assert_eq!(alice, &b1.contests[0].selections[0].ciphertext);
        // placeholders never reach the tally
        assert_eq!(tally.contest("president").unwrap().selections.len(), 3);

        let bob = &tally.contest("president").unwrap().selection("bob").unwrap().ciphertext;
        // an encrypted zero, not the identity
        assert_ne!(bob, &ElGamalCiphertext::identity(&group));
    }

    #[test]
    fn covers_every_selection() {
        let (group, manifest, init, _) = test_election();
        let tally = AccumulateTally::new(&group, &manifest, init.extended_base_hash).build("empty");
        assert_eq!(tally.contests.len(), manifest.contests.len());
        let council = tally.contest("council").unwrap();
        assert_eq!(council.selections.len(), 4);
        assert_eq!(council.selections[0].ciphertext, ElGamalCiphertext::identity(&group));
    }
}
