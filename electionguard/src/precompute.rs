use crate::*;
use std::collections::HashMap;

type CachedSelection = (EncryptedSelection, ElementModQ);

/// Incremental encryption of one contest. Every slot is encrypted as zero up front;
/// a slot is re-encrypted only when a vote actually changes it.
pub struct ContestPrecompute<'a> {
    contest: &'a ContestDescription,
    slots: Vec<SelectionSlot>,
    votes: Vec<u32>,
    write_ins: Vec<String>,
    cache: Vec<HashMap<u32, CachedSelection>>,
}

impl<'a> ContestPrecompute<'a> {
    fn new(
        encryptor: &Encryptor,
        contest: &'a ContestDescription,
        ballot_nonce: &UInt256,
    ) -> Result<Self, Error> {
        let slots = selection_slots(contest);
        let mut cache = Vec::with_capacity(slots.len());
        for slot in &slots {
            let mut entry = HashMap::new();
            entry.insert(
                0,
                encryptor.encrypt_selection(ballot_nonce, &contest.contest_id, slot, 0)?,
            );
            cache.push(entry);
        }
        let real = slots.iter().filter(|s| !s.is_placeholder).count();
        Ok(ContestPrecompute {
            contest,
            slots,
            votes: vec![0; real],
            write_ins: Vec::new(),
            cache,
        })
    }

    fn ensure(
        &mut self,
        encryptor: &Encryptor,
        ballot_nonce: &UInt256,
        index: usize,
        vote: u32,
    ) -> Result<(), Error> {
        if !self.cache[index].contains_key(&vote) {
            let encrypted = encryptor.encrypt_selection(
                ballot_nonce,
                &self.contest.contest_id,
                &self.slots[index],
                vote,
            )?;
            self.cache[index].insert(vote, encrypted);
        }
        Ok(())
    }

    fn vote(
        &mut self,
        encryptor: &Encryptor,
        ballot_nonce: &UInt256,
        selection_id: &str,
        vote: u32,
    ) -> Result<(), Error> {
        let index = self
            .slots
            .iter()
            .position(|s| !s.is_placeholder && s.selection_id == selection_id)
            .ok_or_else(|| {
                Error::UnknownSelection(self.contest.contest_id.clone(), selection_id.to_string())
            })?;
        self.votes[index] = vote;
        // an over limit vote is zeroed by the plan, nothing to precompute
        if vote <= self.slots[index].limit {
            self.ensure(encryptor, ballot_nonce, index, vote)?;
        }
        Ok(())
    }

    fn finish(
        mut self,
        encryptor: &Encryptor,
        ballot_nonce: &UInt256,
    ) -> Result<(EncryptedContest, Vec<ElementModQ>), Error> {
        let plan = plan_contest(self.contest, &self.slots, &self.votes, &self.write_ins);
        let mut encrypted = Vec::with_capacity(self.slots.len());
        for (index, vote) in plan.votes.iter().enumerate() {
            self.ensure(encryptor, ballot_nonce, index, *vote)?;
            match self.cache[index].remove(vote) {
                Some(selection) => encrypted.push(selection),
                None => {
                    return Err(Error::EncryptionCheckFailed(
                        self.contest.contest_id.clone(),
                        "missing precomputed selection".to_string(),
                    ))
                }
            }
        }
        encryptor.finish_contest(self.contest, &plan, encrypted, ballot_nonce)
    }
}

/// Incremental encryption of a whole ballot, fed one vote at a time
pub struct BallotPrecompute<'e, 'a> {
    encryptor: &'e Encryptor<'a>,
    ballot_id: String,
    ballot_style_id: String,
    ballot_nonce: UInt256,
    contests: Vec<ContestPrecompute<'a>>,
}

impl<'e, 'a> BallotPrecompute<'e, 'a> {
    pub fn new(
        encryptor: &'e Encryptor<'a>,
        ballot_id: &str,
        ballot_style_id: &str,
        ballot_nonce: UInt256,
    ) -> Result<Self, Error> {
        let manifest: &'a Manifest = encryptor.manifest;
        let contests = manifest.contests_for_style(ballot_style_id).ok_or_else(|| {
            ValidationError::UnknownBallotStyle(ballot_id.to_string(), ballot_style_id.to_string())
        })?;
        let mut precomputed = Vec::with_capacity(contests.len());
        for contest in contests {
            precomputed.push(ContestPrecompute::new(encryptor, contest, &ballot_nonce)?);
        }
        Ok(BallotPrecompute {
            encryptor,
            ballot_id: ballot_id.to_string(),
            ballot_style_id: ballot_style_id.to_string(),
            ballot_nonce,
            contests: precomputed,
        })
    }

    fn contest_mut(&mut self, contest_id: &str) -> Result<&mut ContestPrecompute<'a>, Error> {
        self.contests
            .iter_mut()
            .find(|c| c.contest.contest_id == contest_id)
            .ok_or_else(|| Error::UnknownContest(contest_id.to_string()))
    }

    pub fn vote(&mut self, contest_id: &str, selection_id: &str, vote: u32) -> Result<(), Error> {
        let encryptor = self.encryptor;
        let nonce = self.ballot_nonce;
        self.contest_mut(contest_id)?
            .vote(encryptor, &nonce, selection_id, vote)
    }

    pub fn write_in(&mut self, contest_id: &str, text: &str) -> Result<(), Error> {
        self.contest_mut(contest_id)?.write_ins.push(text.to_string());
        Ok(())
    }

    pub fn encrypt(self, code_baux: Vec<u8>) -> Result<CiphertextBallot, Error> {
        let mut encrypted = Vec::with_capacity(self.contests.len());
        for contest in self.contests {
            encrypted.push(contest.finish(self.encryptor, &self.ballot_nonce)?);
        }
        Ok(self.encryptor.finish_ballot(
            &self.ballot_id,
            &self.ballot_style_id,
            self.ballot_nonce,
            encrypted,
            code_baux,
        ))
    }
}

/// The incremental pipeline behind the common encryptor interface
pub struct IncrementalEncryptor<'a>(pub Encryptor<'a>);

impl<'a> BallotEncryptor for IncrementalEncryptor<'a> {
    fn encrypt(
        &self,
        ballot: &PlaintextBallot,
        ballot_nonce: UInt256,
        code_baux: Vec<u8>,
    ) -> Result<CiphertextBallot, Error> {
        let mut precompute =
            BallotPrecompute::new(&self.0, &ballot.ballot_id, &ballot.ballot_style_id, ballot_nonce)?;

        let on_style: Vec<String> = precompute
            .contests
            .iter()
            .map(|c| c.contest.contest_id.clone())
            .collect();
        for contest in ballot
            .contests
            .iter()
            .filter(|c| on_style.contains(&c.contest_id))
        {
            let known = self.0.manifest.selection_ids(&contest.contest_id);
            for selection in &contest.selections {
                if selection.vote > 0 && known.contains(&selection.selection_id.as_str()) {
                    precompute.vote(&contest.contest_id, &selection.selection_id, selection.vote)?;
                }
            }
            for write_in in &contest.write_ins {
                precompute.write_in(&contest.contest_id, write_in)?;
            }
        }
        precompute.encrypt(code_baux)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election};
    use crate::*;

    #[test]
    fn incremental_matches_canonical() {
        let (group, manifest, init, _) = test_election();
        let canonical = Encryptor::new(&group, &manifest, &init, "device-1");
        let incremental = IncrementalEncryptor(Encryptor::new(&group, &manifest, &init, "device-1"));

        let ballots = vec![
            test_ballot("b1", &[("president", "bob"), ("council", "dave")]),
            // overvote
            test_ballot("b2", &[("president", "alice"), ("president", "carol")]),
            test_ballot("b3", &[]),
        ];
        for (i, ballot) in ballots.iter().enumerate() {
            let nonce = UInt256([i as u8 + 10; 32]);
            let a = canonical.encrypt(ballot, nonce, vec![1, 2, 3]).unwrap();
            let b = incremental.encrypt(ballot, nonce, vec![1, 2, 3]).unwrap();
            assert_eq!(a.ballot, b.ballot);
        }
    }

    #[test]
    fn interactive_voting_can_change_its_mind() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let nonce = UInt256([77u8; 32]);

        let mut precompute = BallotPrecompute::new(&encryptor, "b9", "style-all", nonce).unwrap();
        precompute.vote("president", "alice", 1).unwrap();
        precompute.vote("president", "alice", 0).unwrap();
        precompute.vote("president", "bob", 1).unwrap();
        precompute.write_in("council", "Scrooge").unwrap();
        assert!(precompute.vote("president", "zorro", 1).is_err());
        assert!(precompute.vote("mayor", "bob", 1).is_err());
        let interactive = precompute.encrypt(vec![]).unwrap();

        let mut ballot = test_ballot("b9", &[("president", "bob")]);
        ballot.contests.push(PlaintextContest {
            contest_id: "council".to_string(),
            sequence_order: 2,
            selections: vec![],
            write_ins: vec!["Scrooge".to_string()],
        });
        let canonical = encryptor.encrypt(&ballot, nonce, vec![]).unwrap();
        assert_eq!(interactive.ballot, canonical.ballot);
    }
}
