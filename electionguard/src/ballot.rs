use crate::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// A voter's selections, before encryption
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextBallot {
    pub ballot_id: String,
    pub ballot_style_id: String,
    pub contests: Vec<PlaintextContest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextContest {
    pub contest_id: String,
    pub sequence_order: u32,
    pub selections: Vec<PlaintextSelection>,
    #[serde(default)]
    pub write_ins: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextSelection {
    pub selection_id: String,
    pub sequence_order: u32,
    pub vote: u32,
}

impl PlaintextBallot {
    pub fn contest(&self, contest_id: &str) -> Option<&PlaintextContest> {
        self.contests.iter().find(|c| c.contest_id == contest_id)
    }
}

impl PlaintextContest {
    pub fn selection(&self, selection_id: &str) -> Option<&PlaintextSelection> {
        self.selections
            .iter()
            .find(|s| s.selection_id == selection_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotState {
    Cast,
    Spoiled,
    Unknown,
}

/// A submitted ballot: encrypted, proven, and free of nonces
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedBallot {
    pub ballot_id: String,
    pub ballot_style_id: String,
    pub encrypting_device: String,
    pub election_id: UInt256,
    pub confirmation_code: UInt256,
    #[serde(with = "BytesHex")]
    pub code_baux: Vec<u8>,
    pub contests: Vec<EncryptedContest>,
    pub state: BallotState,
    #[serde(default)]
    pub is_preencrypt: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedContest {
    pub contest_id: String,
    pub sequence_order: u32,
    pub contest_hash: UInt256,
    pub selections: Vec<EncryptedSelection>,
    /// Proof that the sum of the real selections is in [0, votes_allowed]
    pub proof: RangeProof,
    pub contest_data: HashedElGamalCiphertext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_encryption: Option<PreEncryption>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedSelection {
    pub selection_id: String,
    pub sequence_order: u32,
    pub ciphertext: ElGamalCiphertext,
    /// Proof that the vote is in [0, option_limit]
    pub proof: RangeProof,
    #[serde(default)]
    pub is_placeholder: bool,
}

impl EncryptedBallot {
    pub fn contest(&self, contest_id: &str) -> Option<&EncryptedContest> {
        self.contests.iter().find(|c| c.contest_id == contest_id)
    }
}

impl EncryptedContest {
    pub fn real_selections(&self) -> impl Iterator<Item = &EncryptedSelection> {
        self.selections.iter().filter(|s| !s.is_placeholder)
    }
}

/// An encrypted ballot that still holds its nonces. Only lives inside the encryption call
/// chain; submitting it drops the nonces.
#[derive(Debug, Clone)]
pub struct CiphertextBallot {
    pub ballot: EncryptedBallot,
    pub ballot_nonce: UInt256,
    /// Parallel to `ballot.contests[i].selections[j]`
    pub(crate) selection_nonces: Vec<Vec<ElementModQ>>,
}

impl CiphertextBallot {
    pub fn selection_nonce(&self, contest: usize, selection: usize) -> Option<&ElementModQ> {
        self.selection_nonces.get(contest)?.get(selection)
    }

    pub fn submit(self, state: BallotState) -> EncryptedBallot {
        let mut ballot = self.ballot;
        ballot.state = state;
        ballot
    }

    pub fn cast(self) -> EncryptedBallot {
        self.submit(BallotState::Cast)
    }

    pub fn spoil(self) -> EncryptedBallot {
        self.submit(BallotState::Spoiled)
    }
}

/// The view of an encrypted ballot needed to tally it
pub trait EncryptedBallotIF {
    fn ballot_id(&self) -> &str;

    fn election_id(&self) -> &UInt256;

    fn state(&self) -> BallotState;

    /// (contest id, real selections as (selection id, ciphertext))
    fn contest_ciphertexts(&self) -> Vec<(&str, Vec<(&str, &ElGamalCiphertext)>)>;
}

impl EncryptedBallotIF for EncryptedBallot {
    fn ballot_id(&self) -> &str {
        &self.ballot_id
    }

    fn election_id(&self) -> &UInt256 {
        &self.election_id
    }

    fn state(&self) -> BallotState {
        self.state
    }

    fn contest_ciphertexts(&self) -> Vec<(&str, Vec<(&str, &ElGamalCiphertext)>)> {
        self.contests
            .iter()
            .map(|c| {
                let selections = c
                    .real_selections()
                    .map(|s| (s.selection_id.as_str(), &s.ciphertext))
                    .collect();
                (c.contest_id.as_str(), selections)
            })
            .collect()
    }
}

impl EncryptedBallotIF for CiphertextBallot {
    fn ballot_id(&self) -> &str {
        self.ballot.ballot_id()
    }

    fn election_id(&self) -> &UInt256 {
        self.ballot.election_id()
    }

    fn state(&self) -> BallotState {
        self.ballot.state
    }

    fn contest_ciphertexts(&self) -> Vec<(&str, Vec<(&str, &ElGamalCiphertext)>)> {
        self.ballot.contest_ciphertexts()
    }
}

/// Generates random valid ballots for a manifest, for testing and demos
pub struct RandomBallotProvider<'a> {
    manifest: &'a Manifest,
    with_write_ins: bool,
}

impl<'a> RandomBallotProvider<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        RandomBallotProvider {
            manifest,
            with_write_ins: false,
        }
    }

    pub fn with_write_ins(mut self) -> Self {
        self.with_write_ins = true;
        self
    }

    pub fn ballot<R: Rng>(&self, rng: &mut R) -> Option<PlaintextBallot> {
        let style = self.manifest.ballot_styles.choose(rng)?;
        let contests = self.manifest.contests_for_style(&style.ballot_style_id)?;

        let mut plaintext_contests = Vec::with_capacity(contests.len());
        for contest in contests {
            let limit = contest.votes_allowed as usize;
            let votes = rng.gen_range(0, limit + 1);
            let chosen: Vec<&SelectionDescription> =
                contest.selections.choose_multiple(rng, votes).collect();
            let selections = contest
                .selections
                .iter()
                .map(|s| PlaintextSelection {
                    selection_id: s.selection_id.clone(),
                    sequence_order: s.sequence_order,
                    vote: if chosen.iter().any(|c| c.selection_id == s.selection_id) {
                        1
                    } else {
                        0
                    },
                })
                .collect();
            let write_ins = if self.with_write_ins && votes < limit && rng.gen_bool(0.2) {
                vec![format!("write-in {}", rng.gen::<u16>())]
            } else {
                Vec::new()
            };
            plaintext_contests.push(PlaintextContest {
                contest_id: contest.contest_id.clone(),
                sequence_order: contest.sequence_order,
                selections,
                write_ins,
            });
        }

        Some(PlaintextBallot {
            ballot_id: format!("ballot-{}", uuid::Uuid::new_v4()),
            ballot_style_id: style.ballot_style_id.clone(),
            contests: plaintext_contests,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::test_manifest;
    use crate::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn random_ballots_are_within_limits() {
        let manifest = test_manifest();
        let provider = RandomBallotProvider::new(&manifest).with_write_ins();
        let mut rng = ChaCha20Rng::from_seed([9u8; 32]);
        for _ in 0..20 {
            let ballot = provider.ballot(&mut rng).unwrap();
            assert!(validate_ballot(&manifest, &ballot).is_ok());
            for contest in &ballot.contests {
                let limit = manifest.contest_limit(&contest.contest_id).unwrap();
                let votes: u32 = contest.selections.iter().map(|s| s.vote).sum();
                assert!(votes + contest.write_ins.len() as u32 <= limit);
            }
        }
    }
}
