use crate::*;

/// Decrypts a ballot with its ballot nonce, without any guardian.
///
/// Used by the encrypting device to check its own output and to let a voter confirm a
/// challenged ballot. Overvoted contests are restored from the contest data.
pub struct NonceDecryptor<'a> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    public_key: &'a ElGamalPublicKey,
    extended_base_hash: &'a UInt256,
}

impl<'a> NonceDecryptor<'a> {
    pub fn new(group: &'a GroupContext, manifest: &'a Manifest, init: &'a ElectionInitialized) -> Self {
        NonceDecryptor {
            group,
            manifest,
            public_key: &init.joint_public_key,
            extended_base_hash: &init.extended_base_hash,
        }
    }

    pub fn decrypt(
        &self,
        ballot: &EncryptedBallot,
        ballot_nonce: &UInt256,
    ) -> Result<PlaintextBallot, Error> {
        let mut contests = Vec::with_capacity(ballot.contests.len());
        for contest in &ballot.contests {
            contests.push(self.decrypt_contest(contest, ballot_nonce)?);
        }
        Ok(PlaintextBallot {
            ballot_id: ballot.ballot_id.clone(),
            ballot_style_id: ballot.ballot_style_id.clone(),
            contests,
        })
    }

    fn decrypt_contest(
        &self,
        contest: &EncryptedContest,
        ballot_nonce: &UInt256,
    ) -> Result<PlaintextContest, Error> {
        if self.manifest.contest(&contest.contest_id).is_none() {
            return Err(Error::UnknownContest(contest.contest_id.clone()));
        }
        let data = contest.contest_data.decrypt_contest_data_with_nonce(
            self.group,
            self.public_key,
            self.extended_base_hash,
            &contest.contest_id,
            contest.sequence_order,
            ballot_nonce,
        )?;

        let mut selections = Vec::new();
        for selection in contest.real_selections() {
            let nonce = selection_nonce(
                self.group,
                self.extended_base_hash,
                ballot_nonce,
                &contest.contest_id,
                &selection.selection_id,
            );
            let mut vote = selection
                .ciphertext
                .decrypt_with_nonce(self.group, self.public_key, &nonce)?;
            if data.status == ContestDataStatus::OverVote
                && data.over_votes.contains(&(selection.sequence_order as i32))
            {
                vote = 1;
            }
            selections.push(PlaintextSelection {
                selection_id: selection.selection_id.clone(),
                sequence_order: selection.sequence_order,
                vote,
            });
        }

        Ok(PlaintextContest {
            contest_id: contest.contest_id.clone(),
            sequence_order: contest.sequence_order,
            selections,
            write_ins: data.write_ins,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election};
    use crate::*;

    #[test]
    fn inverse_of_encryption() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let decryptor = NonceDecryptor::new(&group, &manifest, &init);

        let cases = vec![
            // normal, undervote and missing contest
            test_ballot("b1", &[("president", "carol"), ("council", "erin")]),
            // overvote
            test_ballot("b2", &[("council", "dave"), ("council", "erin"), ("council", "grace")]),
        ];
        for (i, ballot) in cases.iter().enumerate() {
            let nonce = UInt256([i as u8 + 1; 32]);
            let encrypted = encryptor.encrypt(ballot, nonce, vec![]).unwrap().cast();
            let decrypted = decryptor.decrypt(&encrypted, &nonce).unwrap();

            for contest in &decrypted.contests {
                for selection in &contest.selections {
                    let expected = ballot
                        .contest(&contest.contest_id)
                        .and_then(|c| c.selection(&selection.selection_id))
                        .map(|s| s.vote)
                        .unwrap_or(0);
                    assert_eq!(
                        selection.vote, expected,
                        "{} {}",
                        contest.contest_id, selection.selection_id
                    );
                }
            }
        }
    }

    #[test]
    fn overvote_is_zero_in_the_ciphertext() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("b3", &[("president", "alice"), ("president", "bob")]);
        let nonce = UInt256([3u8; 32]);
        let ciphertext = encryptor.encrypt(&ballot, nonce, vec![]).unwrap();

        let president = &ciphertext.ballot.contests[0];
        for (j, selection) in president.real_selections().enumerate() {
            let selection_nonce = ciphertext.selection_nonce(0, j).unwrap();
            let vote = selection
                .ciphertext
                .decrypt_with_nonce(&group, &init.joint_public_key, selection_nonce)
                .unwrap();
            assert_eq!(vote, 0);
        }

        let decrypted = NonceDecryptor::new(&group, &manifest, &init)
            .decrypt(&ciphertext.ballot, &nonce)
            .unwrap();
        let votes: Vec<u32> = decrypted.contests[0].selections.iter().map(|s| s.vote).collect();
        assert_eq!(votes, vec![1, 1, 0]);
    }

    #[test]
    fn wrong_nonce_fails() {
        let (group, manifest, init, _) = test_election();
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("b4", &[("measure", "yes")]);
        let encrypted = encryptor.encrypt(&ballot, UInt256([4u8; 32]), vec![]).unwrap().cast();
        let result = NonceDecryptor::new(&group, &manifest, &init).decrypt(&encrypted, &UInt256([5u8; 32]));
        assert!(matches!(result, Err(Error::HmacMismatch)));
    }
}
