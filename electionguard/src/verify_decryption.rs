use crate::*;
use std::collections::HashSet;

/// Checks decrypted tallies and spoiled ballots against the ciphertexts they came from
pub struct DecryptionVerifier<'a> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    init: &'a ElectionInitialized,
}

impl<'a> DecryptionVerifier<'a> {
    pub fn new(group: &'a GroupContext, manifest: &'a Manifest, init: &'a ElectionInitialized) -> Self {
        DecryptionVerifier {
            group,
            manifest,
            init,
        }
    }

    pub fn verify_tally(
        &self,
        decrypted: &DecryptedTallyOrBallot,
        tally: &EncryptedTally,
    ) -> Vec<VerificationError> {
        let mut errors = self.verify_lagrange(decrypted);
        if decrypted.election_id != self.init.extended_base_hash || decrypted.id != tally.tally_id {
            errors.push(VerificationError::new(
                "9.A",
                format!("decrypted tally {} does not belong to tally {}", decrypted.id, tally.tally_id),
            ));
        }

        for contest in &tally.contests {
            let found = decrypted.contest(&contest.contest_id);
            for selection in &contest.selections {
                let label = format!("tally {}/{}", contest.contest_id, selection.selection_id);
                match found.and_then(|c| c.selections.iter().find(|s| s.selection_id == selection.selection_id)) {
                    Some(s) => errors.extend(self.verify_selection(&label, s, &selection.ciphertext, decrypted)),
                    None => errors.push(VerificationError::new("9.A", format!("{} was not decrypted", label))),
                }
            }
        }

        let extras = unexpected_entries(decrypted, |contest_id, selection_id| {
            match (tally.contest(contest_id), selection_id) {
                (Some(contest), Some(id)) => contest.selection(id).is_some(),
                (found, None) => found.is_some(),
                (None, Some(_)) => false,
            }
        });
        for extra in extras {
            errors.push(VerificationError::new(
                "9.A",
                format!("tally {} has no encrypted counterpart", extra),
            ));
        }
        errors
    }

    pub fn verify_spoiled_ballot(
        &self,
        decrypted: &DecryptedTallyOrBallot,
        ballot: &EncryptedBallot,
    ) -> Vec<VerificationError> {
        let mut errors = self.verify_lagrange(decrypted);
        if decrypted.election_id != self.init.extended_base_hash || decrypted.id != ballot.ballot_id {
            errors.push(VerificationError::new(
                "9.A",
                format!("decrypted ballot {} does not belong to ballot {}", decrypted.id, ballot.ballot_id),
            ));
        }

        for contest in &ballot.contests {
            let found = match decrypted.contest(&contest.contest_id) {
                Some(c) => c,
                None => {
                    errors.push(VerificationError::new(
                        "12.C",
                        format!("ballot {} contest {} was not decrypted", ballot.ballot_id, contest.contest_id),
                    ));
                    continue;
                }
            };
            let mut total = 0;
            for selection in contest.real_selections() {
                let label = format!("ballot {} {}/{}", ballot.ballot_id, contest.contest_id, selection.selection_id);
                match found.selections.iter().find(|s| s.selection_id == selection.selection_id) {
                    Some(s) => {
                        errors.extend(self.verify_selection(&label, s, &selection.ciphertext, decrypted));
                        total += s.tally;
                        if let Some(limit) = self.manifest.option_limit(&contest.contest_id) {
                            if s.tally > limit {
                                errors.push(VerificationError::new(
                                    "12.B",
                                    format!("{} decrypts to {}, limit {}", label, s.tally, limit),
                                ));
                            }
                        }
                    }
                    None => errors.push(VerificationError::new("9.A", format!("{} was not decrypted", label))),
                }
            }
            if let Some(limit) = self.manifest.contest_limit(&contest.contest_id) {
                if total > limit {
                    errors.push(VerificationError::new(
                        "12.A",
                        format!(
                            "ballot {} contest {} has {} votes, limit {}",
                            ballot.ballot_id, contest.contest_id, total, limit
                        ),
                    ));
                }
            }

            let label = format!("ballot {} contest {} data", ballot.ballot_id, contest.contest_id);
            match &found.decrypted_contest_data {
                Some(data) => errors.extend(self.verify_contest_data(&label, &contest.contest_id, data, contest, decrypted)),
                None => errors.push(VerificationError::new("12.C", format!("{} was not decrypted", label))),
            }
        }

        let extras = unexpected_entries(decrypted, |contest_id, selection_id| {
            match (ballot.contest(contest_id), selection_id) {
                (Some(contest), Some(id)) => contest.real_selections().any(|s| s.selection_id == id),
                (found, None) => found.is_some(),
                (None, Some(_)) => false,
            }
        });
        for extra in extras {
            errors.push(VerificationError::new(
                "12.C",
                format!("ballot {} {} has no encrypted counterpart", ballot.ballot_id, extra),
            ));
        }
        errors
    }

    fn verify_selection(
        &self,
        label: &str,
        selection: &DecryptedSelection,
        ciphertext: &ElGamalCiphertext,
        decrypted: &DecryptedTallyOrBallot,
    ) -> Vec<VerificationError> {
        let group = self.group;
        let mut errors = self.verify_shares(
            label,
            SELECTION_SHARE_TAG,
            &ciphertext.pad,
            &selection.shares,
            decrypted,
        );

        let combined = selection.shares.combined(group);
        if &selection.ciphertext != ciphertext || group.mult_p(&selection.value, &combined) != ciphertext.data {
            errors.push(VerificationError::new(
                "9.A",
                format!("{}: T · Π M_i does not equal B", label),
            ));
        }
        if group.pow_p_u64(&self.init.joint_public_key.0, selection.tally as u64) != selection.value {
            errors.push(VerificationError::new(
                "9.B",
                format!("{}: T is not K^{}", label, selection.tally),
            ));
        }
        errors
    }

    fn verify_contest_data(
        &self,
        label: &str,
        contest_id: &str,
        data: &DecryptedContestData,
        contest: &EncryptedContest,
        decrypted: &DecryptedTallyOrBallot,
    ) -> Vec<VerificationError> {
        let group = self.group;
        let mut errors = self.verify_shares(
            label,
            CONTEST_DATA_SHARE_TAG,
            &contest.contest_data.c0,
            &data.shares,
            decrypted,
        );

        if data.encrypted != contest.contest_data || data.shares.combined(group) != data.beta {
            errors.push(VerificationError::new(
                "12.C",
                format!("{}: β is not the product of the shares", label),
            ));
            return errors;
        }
        match data.encrypted.decrypt_contest_data_with_beta(
            group,
            &self.init.joint_public_key,
            &self.init.extended_base_hash,
            contest_id,
            &data.beta,
        ) {
            Ok(contest_data) if contest_data == data.contest_data => {}
            Ok(_) => errors.push(VerificationError::new(
                "12.C",
                format!("{}: decrypts to different contest data", label),
            )),
            Err(e) => errors.push(VerificationError::new("12.C", format!("{}: {}", label, e))),
        }
        errors
    }

    /// 10.A: the published coefficients are the ones for the present guardians
    fn verify_lagrange(&self, decrypted: &DecryptedTallyOrBallot) -> Vec<VerificationError> {
        let present: Vec<(&str, u32)> = decrypted
            .lagrange_coordinates
            .iter()
            .map(|c| (c.guardian_id.as_str(), c.x_coordinate))
            .collect();
        let known = present.iter().all(|(id, x)| {
            self.init
                .guardian(id)
                .map(|g| g.x_coordinate == *x)
                .unwrap_or(false)
        });
        let enough = present.len() >= self.init.config.quorum as usize;

        match lagrange_coordinates(self.group, &present) {
            Ok(expected) if known && enough && expected == decrypted.lagrange_coordinates => Vec::new(),
            Ok(_) => vec![VerificationError::new(
                "10.A",
                format!("{} has wrong Lagrange coordinates", decrypted.id),
            )],
            Err(e) => vec![VerificationError::new("10.A", format!("{}: {}", decrypted.id, e))],
        }
    }

    fn verify_shares(
        &self,
        label: &str,
        tag: u8,
        base: &ElementModP,
        shares: &DecryptionShares,
        decrypted: &DecryptedTallyOrBallot,
    ) -> Vec<VerificationError> {
        let group = self.group;
        let he = &self.init.extended_base_hash;
        let mut errors = Vec::new();

        let direct: Vec<&str> = shares.direct.iter().map(|s| s.guardian_id.as_str()).collect();
        let recovered: Vec<&str> = shares.recovered.iter().map(|s| s.missing_guardian_id.as_str()).collect();
        let covered: HashSet<&str> = direct.iter().chain(recovered.iter()).copied().collect();
        let all: HashSet<&str> = self.init.guardians.iter().map(|g| g.guardian_id.as_str()).collect();
        let present: HashSet<&str> = decrypted
            .lagrange_coordinates
            .iter()
            .map(|c| c.guardian_id.as_str())
            .collect();
        let direct_set: HashSet<&str> = direct.iter().copied().collect();
        if covered != all || direct.len() + recovered.len() != all.len() || direct_set != present {
            errors.push(VerificationError::new(
                "8.B",
                format!("{}: shares do not cover every guardian exactly once", label),
            ));
        }

        for share in &shares.direct {
            let key = self.init.guardian(&share.guardian_id).and_then(|g| g.public_key());
            let ok = key
                .map(|k| share.proof.verify_share(group, he, tag, k, base, &share.share).is_ok())
                .unwrap_or(false);
            if !ok {
                errors.push(VerificationError::new(
                    "8.A",
                    format!("{}: share proof of {} is invalid", label, share.guardian_id),
                ));
            }
        }

        for share in &shares.recovered {
            let missing = match self.init.guardian(&share.missing_guardian_id) {
                Some(g) => g,
                None => {
                    errors.push(VerificationError::new(
                        "10.B",
                        format!("{}: unknown missing guardian {}", label, share.missing_guardian_id),
                    ));
                    continue;
                }
            };
            let mut product = group.one_p();
            let mut complete = share.parts.len() == decrypted.lagrange_coordinates.len();
            for part in &share.parts {
                let coordinate = decrypted
                    .lagrange_coordinates
                    .iter()
                    .find(|c| c.guardian_id == part.decrypting_guardian_id);
                let coordinate = match coordinate {
                    Some(c) => c,
                    None => {
                        complete = false;
                        continue;
                    }
                };
                let recovery_key = missing.public_share_at(group, coordinate.x_coordinate);
                if part
                    .proof
                    .verify_share(group, he, tag, &recovery_key, base, &part.share)
                    .is_err()
                {
                    errors.push(VerificationError::new(
                        "10.C",
                        format!(
                            "{}: compensated share of {} for {} is invalid",
                            label, part.decrypting_guardian_id, share.missing_guardian_id
                        ),
                    ));
                }
                product = group.mult_p(&product, &group.pow_p(&part.share, &coordinate.coefficient));
            }
            if !complete || product != share.share {
                errors.push(VerificationError::new(
                    "10.B",
                    format!("{}: recovered share of {} does not match its parts", label, share.missing_guardian_id),
                ));
            }
        }
        errors
    }
}

// Decrypted contests and selections that `known` does not recognize
fn unexpected_entries<F>(decrypted: &DecryptedTallyOrBallot, known: F) -> Vec<String>
where
    F: Fn(&str, Option<&str>) -> bool,
{
    let mut extras = Vec::new();
    for contest in &decrypted.contests {
        if !known(&contest.contest_id, None) {
            extras.push(contest.contest_id.clone());
            continue;
        }
        for selection in &contest.selections {
            if !known(&contest.contest_id, Some(&selection.selection_id)) {
                extras.push(format!("{}/{}", contest.contest_id, selection.selection_id));
            }
        }
    }
    extras
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election};
    use crate::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn compensated_spoiled_ballot_verifies() {
        let (group, manifest, init, trustees) = test_election();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("s1", &[("president", "bob"), ("council", "dave"), ("council", "grace")]);
        let spoiled = encryptor.encrypt(&ballot, UInt256([2u8; 32]), vec![]).unwrap().spoil();

        let present = vec![trustees[0].clone(), trustees[2].clone()];
        let decrypted = Decryptor::new(&group, &init, &present)
            .unwrap()
            .decrypt_ballot(&spoiled, &mut rng)
            .unwrap();
        let verifier = DecryptionVerifier::new(&group, &manifest, &init);
        assert_eq!(verifier.verify_spoiled_ballot(&decrypted, &spoiled), vec![]);

        let mut wrong = decrypted.clone();
        for s in wrong.contests[0].selections.iter_mut().filter(|s| s.selection_id == "bob") {
            s.tally = 0;
        }
        let rules: Vec<&str> = verifier.verify_spoiled_ballot(&wrong, &spoiled).iter().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["9.B"]);

        let mut extra = decrypted.clone();
        let mut write_in = extra.contests[0].selections[0].clone();
        write_in.selection_id = "zed".to_string();
        extra.contests[0].selections.push(write_in);
        let rules: Vec<&str> = verifier.verify_spoiled_ballot(&extra, &spoiled).iter().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["12.C"]);

        let mut part = decrypted;
        let recovered = &mut part.contests[1].selections[0].shares.recovered[0];
        recovered.parts[0].share = group.mult_p(&recovered.parts[0].share, &group.generator());
        let rules: Vec<&str> = verifier.verify_spoiled_ballot(&part, &spoiled).iter().map(|e| e.rule).collect();
        assert!(rules.contains(&"10.C"));
        assert!(rules.contains(&"10.B"));
    }

    #[test]
    fn forged_direct_share_is_rejected() {
        let (group, manifest, init, trustees) = test_election();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("c1", &[("measure", "no")]);
        let cast = encryptor.encrypt(&ballot, UInt256([3u8; 32]), vec![]).unwrap().cast();

        let mut accumulate = AccumulateTally::new(&group, &manifest, init.extended_base_hash);
        accumulate.add(&cast).unwrap();
        let tally = accumulate.build("tally");
        let mut decrypted = Decryptor::new(&group, &init, &trustees)
            .unwrap()
            .decrypt_tally(&tally, &mut rng)
            .unwrap();
        let verifier = DecryptionVerifier::new(&group, &manifest, &init);
        assert_eq!(verifier.verify_tally(&decrypted, &tally), vec![]);

        let mut extra = decrypted.clone();
        let mut unknown = extra.contests[2].clone();
        unknown.contest_id = "dog-catcher".to_string();
        extra.contests.push(unknown);
        let mut stray = extra.contests[0].selections[0].clone();
        stray.selection_id = "zed".to_string();
        extra.contests[0].selections.push(stray);
        let errors = verifier.verify_tally(&extra, &tally);
        let rules: Vec<&str> = errors.iter().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["9.A", "9.A"]);
        assert!(errors[0].message.contains("president/zed"));
        assert!(errors[1].message.contains("dog-catcher"));

        let direct = &mut decrypted.contests[2].selections[1].shares.direct[0];
        direct.share = group.mult_p(&direct.share, &group.generator());
        let rules: Vec<&str> = verifier.verify_tally(&decrypted, &tally).iter().map(|e| e.rule).collect();
        assert!(rules.contains(&"8.A"));
        assert!(rules.contains(&"9.A"));

        decrypted.lagrange_coordinates.pop();
        let rules: Vec<&str> = verifier.verify_tally(&decrypted, &tally).iter().map(|e| e.rule).collect();
        assert!(rules.contains(&"10.A"));
    }
}
