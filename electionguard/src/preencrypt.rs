use crate::*;
use log::debug;
use std::collections::HashSet;

const SHORT_CODE_LEN: usize = 5;

/// Ω: the user visible short codes of one contest's selection hashes.
///
/// Codes are hex prefixes of a common length, at least five characters, grown until no
/// two selections of the contest share a code.
pub fn short_codes(selection_hashes: &[UInt256]) -> Vec<String> {
    let hexes: Vec<String> = selection_hashes.iter().map(|h| h.to_hex()).collect();
    let full = hexes.first().map(|h| h.len()).unwrap_or(SHORT_CODE_LEN);
    let mut len = SHORT_CODE_LEN.min(full);
    while len < full {
        let unique: HashSet<&str> = hexes.iter().map(|h| &h[..len]).collect();
        if unique.len() == hexes.len() {
            break;
        }
        len += 1;
    }
    hexes.iter().map(|h| h[..len].to_string()).collect()
}

/// One option (or null choice) of a pre-encrypted contest: a vector with a single 1 at
/// the option's position, encrypted component by component.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreEncryptedSelection {
    pub selection_id: String,
    pub sequence_order: u32,
    pub selection_hash: UInt256,
    pub short_code: String,
    pub selection_vector: Vec<ElGamalCiphertext>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreEncryptedContest {
    pub contest_id: String,
    pub sequence_order: u32,
    pub votes_allowed: u32,
    /// Options and null vectors, sorted by selection hash
    pub selections: Vec<PreEncryptedSelection>,
    pub contest_hash: UInt256,
}

/// A printed ballot, before the voter marks it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreEncryptedBallot {
    pub ballot_id: String,
    pub ballot_style_id: String,
    pub contests: Vec<PreEncryptedContest>,
    pub confirmation_code: UInt256,
}

/// The short codes a voter selected
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarkedPreEncryptedBallot {
    pub ballot_id: String,
    pub ballot_style_id: String,
    pub contests: Vec<MarkedPreEncryptedContest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarkedPreEncryptedContest {
    pub contest_id: String,
    pub selected_codes: Vec<String>,
}

/// A selected pre-encryption vector, as published with the recorded ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectedVector {
    pub selection_hash: UInt256,
    pub short_code: String,
    pub encryptions: Vec<ElGamalCiphertext>,
}

/// Pre-encryption evidence carried by each contest of a recorded ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreEncryption {
    pub preencryption_hash: UInt256,
    /// All m + L selection hashes of the contest, sorted
    pub all_selection_hashes: Vec<UInt256>,
    /// Exactly votes_allowed vectors, null vectors filling undervotes
    pub selected_vectors: Vec<SelectedVector>,
}

/// ψ = H(He; 0x40, K, α_1, β_1, ..., α_m, β_m)
pub fn selection_hash<'a, I: IntoIterator<Item = &'a ElGamalCiphertext>>(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    public_key: &ElGamalPublicKey,
    vector: I,
) -> UInt256 {
    let mut h = group
        .hasher(extended_base_hash)
        .byte(0x40)
        .p(&public_key.0);
    for c in vector {
        h = h.ciphertext(c);
    }
    h.finish()
}

/// χ = H(He; 0x41, Λ, K, ψ_σ(1), ..., ψ_σ(m+L)) over sorted selection hashes
pub fn preencryption_contest_hash(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    contest_id: &str,
    public_key: &ElGamalPublicKey,
    sorted_hashes: &[UInt256],
) -> UInt256 {
    group
        .hasher(extended_base_hash)
        .byte(0x41)
        .string(contest_id)
        .p(&public_key.0)
        .uint256s(sorted_hashes)
        .finish()
}

/// H(B) = H(He; 0x42, χ_1, ..., χ_m, B_aux)
pub fn preencryption_confirmation_code<'a, I: IntoIterator<Item = &'a UInt256>>(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    contest_hashes: I,
    baux: &[u8],
) -> UInt256 {
    group
        .hasher(extended_base_hash)
        .byte(0x42)
        .uint256s(contest_hashes)
        .bytes(baux)
        .finish()
}

/// ξ_i,j,k = H(He; 0x43, ξ, Λ_i, λ_j, λ_k)
fn vector_nonce(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    primary_nonce: &UInt256,
    contest_id: &str,
    selection_id: &str,
    component_id: &str,
) -> ElementModQ {
    let h = group
        .hasher(extended_base_hash)
        .byte(0x43)
        .uint256(primary_nonce)
        .string(contest_id)
        .string(selection_id)
        .string(component_id)
        .finish();
    group.q_from_uint256(&h)
}

fn sorted_selections(contest: &ContestDescription) -> Vec<&SelectionDescription> {
    let mut selections: Vec<&SelectionDescription> = contest.selections.iter().collect();
    selections.sort_by_key(|s| s.sequence_order);
    selections
}

/// Builds pre-encrypted ballots. Everything is derived from the primary nonce, so the
/// recording tool regenerates the same vectors later.
pub struct PreEncryptor<'a> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    public_key: ElGamalPublicKey,
    extended_base_hash: UInt256,
}

impl<'a> PreEncryptor<'a> {
    pub fn new(group: &'a GroupContext, manifest: &'a Manifest, init: &ElectionInitialized) -> Self {
        PreEncryptor {
            group,
            manifest,
            public_key: init.joint_public_key.clone(),
            extended_base_hash: init.extended_base_hash,
        }
    }

    pub fn preencrypt(
        &self,
        ballot_id: &str,
        ballot_style_id: &str,
        primary_nonce: &UInt256,
        code_baux: &[u8],
    ) -> Result<PreEncryptedBallot, Error> {
        let contests = self
            .manifest
            .contests_for_style(ballot_style_id)
            .ok_or_else(|| {
                ValidationError::UnknownBallotStyle(ballot_id.to_string(), ballot_style_id.to_string())
            })?;

        let contests: Vec<PreEncryptedContest> = contests
            .into_iter()
            .map(|c| self.preencrypt_contest(c, primary_nonce))
            .collect();
        let confirmation_code = preencryption_confirmation_code(
            self.group,
            &self.extended_base_hash,
            contests.iter().map(|c| &c.contest_hash),
            code_baux,
        );

        Ok(PreEncryptedBallot {
            ballot_id: ballot_id.to_string(),
            ballot_style_id: ballot_style_id.to_string(),
            contests,
            confirmation_code,
        })
    }

    fn preencrypt_contest(
        &self,
        contest: &ContestDescription,
        primary_nonce: &UInt256,
    ) -> PreEncryptedContest {
        let options = sorted_selections(contest);
        let labels: Vec<&str> = options.iter().map(|s| s.selection_id.as_str()).collect();

        let mut selections: Vec<PreEncryptedSelection> = options
            .iter()
            .map(|s| {
                self.preencrypt_selection(
                    primary_nonce,
                    &contest.contest_id,
                    &s.selection_id,
                    s.sequence_order,
                    &labels,
                )
            })
            .collect();
        let next = options.last().map(|s| s.sequence_order + 1).unwrap_or(1);
        for k in 0..contest.votes_allowed {
            selections.push(self.preencrypt_selection(
                primary_nonce,
                &contest.contest_id,
                &null_id(k),
                next + k,
                &labels,
            ));
        }
        selections.sort_by(|a, b| a.selection_hash.cmp(&b.selection_hash));

        let hashes: Vec<UInt256> = selections.iter().map(|s| s.selection_hash).collect();
        for (selection, code) in selections.iter_mut().zip(short_codes(&hashes)) {
            selection.short_code = code;
        }
        let contest_hash = preencryption_contest_hash(
            self.group,
            &self.extended_base_hash,
            &contest.contest_id,
            &self.public_key,
            &hashes,
        );

        PreEncryptedContest {
            contest_id: contest.contest_id.clone(),
            sequence_order: contest.sequence_order,
            votes_allowed: contest.votes_allowed,
            selections,
            contest_hash,
        }
    }

    fn preencrypt_selection(
        &self,
        primary_nonce: &UInt256,
        contest_id: &str,
        selection_id: &str,
        sequence_order: u32,
        labels: &[&str],
    ) -> PreEncryptedSelection {
        let selection_vector: Vec<ElGamalCiphertext> = labels
            .iter()
            .map(|label| {
                let nonce = self.nonce(primary_nonce, contest_id, selection_id, label);
                let vote = if *label == selection_id { 1 } else { 0 };
                elgamal_encrypt(self.group, vote, &nonce, &self.public_key)
            })
            .collect();
        let hash = selection_hash(
            self.group,
            &self.extended_base_hash,
            &self.public_key,
            &selection_vector,
        );
        PreEncryptedSelection {
            selection_id: selection_id.to_string(),
            sequence_order,
            selection_hash: hash,
            // assigned once the whole contest is known
            short_code: String::new(),
            selection_vector,
        }
    }

    fn nonce(
        &self,
        primary_nonce: &UInt256,
        contest_id: &str,
        selection_id: &str,
        component_id: &str,
    ) -> ElementModQ {
        vector_nonce(
            self.group,
            &self.extended_base_hash,
            primary_nonce,
            contest_id,
            selection_id,
            component_id,
        )
    }
}

fn null_id(k: u32) -> String {
    format!("null{}", k + 1)
}

/// Turns a marked pre-encrypted ballot into an encrypted ballot with proofs
pub struct Recorder<'a> {
    preencryptor: PreEncryptor<'a>,
    device: String,
}

impl<'a> Recorder<'a> {
    pub fn new(
        group: &'a GroupContext,
        manifest: &'a Manifest,
        init: &ElectionInitialized,
        device: &str,
    ) -> Self {
        Recorder {
            preencryptor: PreEncryptor::new(group, manifest, init),
            device: device.to_string(),
        }
    }

    pub fn record(
        &self,
        marked: &MarkedPreEncryptedBallot,
        primary_nonce: UInt256,
        code_baux: Vec<u8>,
    ) -> Result<CiphertextBallot, Error> {
        let pre = self.preencryptor.preencrypt(
            &marked.ballot_id,
            &marked.ballot_style_id,
            &primary_nonce,
            &code_baux,
        )?;

        let mut contests = Vec::with_capacity(pre.contests.len());
        let mut selection_nonces = Vec::with_capacity(pre.contests.len());
        for contest in &pre.contests {
            let codes = marked
                .contests
                .iter()
                .find(|c| c.contest_id == contest.contest_id)
                .map(|c| c.selected_codes.as_slice())
                .unwrap_or(&[]);
            let (encrypted, nonces) =
                self.record_contest(&marked.ballot_id, contest, codes, &primary_nonce)?;
            contests.push(encrypted);
            selection_nonces.push(nonces);
        }
        debug!(
            "recorded pre-encrypted ballot {} confirmation code {}",
            marked.ballot_id, pre.confirmation_code
        );

        Ok(CiphertextBallot {
            ballot: EncryptedBallot {
                ballot_id: marked.ballot_id.clone(),
                ballot_style_id: marked.ballot_style_id.clone(),
                encrypting_device: self.device.clone(),
                election_id: self.preencryptor.extended_base_hash,
                confirmation_code: pre.confirmation_code,
                code_baux,
                contests,
                state: BallotState::Unknown,
                is_preencrypt: true,
            },
            ballot_nonce: primary_nonce,
            selection_nonces,
        })
    }

    fn record_contest(
        &self,
        ballot_id: &str,
        contest: &PreEncryptedContest,
        codes: &[String],
        primary_nonce: &UInt256,
    ) -> Result<(EncryptedContest, Vec<ElementModQ>), Error> {
        let pe = &self.preencryptor;
        let group = pe.group;
        let description = pe
            .manifest
            .contest(&contest.contest_id)
            .ok_or_else(|| Error::UnknownContest(contest.contest_id.clone()))?;
        let options = sorted_selections(description);

        let unique: HashSet<&String> = codes.iter().collect();
        if codes.len() > contest.votes_allowed as usize || unique.len() != codes.len() {
            return Err(Error::EncryptionCheckFailed(
                ballot_id.to_string(),
                format!(
                    "contest {} has {} selected codes, limit {}",
                    contest.contest_id,
                    codes.len(),
                    contest.votes_allowed
                ),
            ));
        }

        let mut selected: Vec<&PreEncryptedSelection> = Vec::with_capacity(codes.len());
        for code in codes {
            let mut matching = contest.selections.iter().filter(|s| &s.short_code == code);
            let found = matching
                .next()
                .ok_or_else(|| Error::UnknownShortCode(code.clone(), contest.contest_id.clone()))?;
            if matching.next().is_some() {
                return Err(Error::EncryptionCheckFailed(
                    ballot_id.to_string(),
                    format!("short code {} is ambiguous in contest {}", code, contest.contest_id),
                ));
            }
            selected.push(found);
        }
        // undervotes are filled with unused null vectors, in null order
        let mut nulls: Vec<&PreEncryptedSelection> = contest
            .selections
            .iter()
            .filter(|s| s.selection_id.starts_with("null") && description.selection(&s.selection_id).is_none())
            .filter(|s| !selected.iter().any(|x| x.selection_id == s.selection_id))
            .collect();
        nulls.sort_by_key(|s| s.sequence_order);
        let missing = contest.votes_allowed as usize - selected.len();
        selected.extend(nulls.into_iter().take(missing));

        // component-wise product of the selected vectors, with summed nonces
        let mut selections = Vec::with_capacity(options.len());
        let mut nonces = Vec::with_capacity(options.len());
        for (k, option) in options.iter().enumerate() {
            let ciphertext = elgamal_add_all(group, selected.iter().map(|s| &s.selection_vector[k]));
            let component_nonces: Vec<ElementModQ> = selected
                .iter()
                .map(|s| {
                    pe.nonce(
                        primary_nonce,
                        &contest.contest_id,
                        &s.selection_id,
                        &option.selection_id,
                    )
                })
                .collect();
            let nonce = group.add_q_all(&component_nonces);
            let vote = selected
                .iter()
                .filter(|s| s.selection_id == option.selection_id)
                .count() as u32;
            let proof = RangeProof::create(
                group,
                &pe.extended_base_hash,
                &ciphertext,
                vote,
                description.option_limit,
                &nonce,
                &pe.public_key,
            )
            .map_err(|e| Error::EncryptionCheckFailed(ballot_id.to_string(), e.to_string()))?;
            selections.push(EncryptedSelection {
                selection_id: option.selection_id.clone(),
                sequence_order: option.sequence_order,
                ciphertext,
                proof,
                is_placeholder: false,
            });
            nonces.push(nonce);
        }

        let voted_for: Vec<i32> = options
            .iter()
            .filter(|o| selected.iter().any(|s| s.selection_id == o.selection_id))
            .map(|o| o.sequence_order as i32)
            .collect();
        let real_total = voted_for.len() as u32;

        let total = elgamal_add_all(group, selections.iter().map(|s| &s.ciphertext));
        let total_nonce = group.add_q_all(&nonces);
        let proof = RangeProof::create(
            group,
            &pe.extended_base_hash,
            &total,
            real_total,
            contest.votes_allowed,
            &total_nonce,
            &pe.public_key,
        )
        .map_err(|e| Error::EncryptionCheckFailed(ballot_id.to_string(), e.to_string()))?;

        let contest_data = ContestData::new(contest.votes_allowed, voted_for, Vec::new()).encrypt(
            group,
            &pe.public_key,
            &pe.extended_base_hash,
            &contest.contest_id,
            contest.sequence_order,
            primary_nonce,
            contest.votes_allowed,
        )?;

        let pre_encryption = PreEncryption {
            preencryption_hash: contest.contest_hash,
            all_selection_hashes: contest.selections.iter().map(|s| s.selection_hash).collect(),
            selected_vectors: selected
                .iter()
                .map(|s| SelectedVector {
                    selection_hash: s.selection_hash,
                    short_code: s.short_code.clone(),
                    encryptions: s.selection_vector.clone(),
                })
                .collect(),
        };

        let encrypted = EncryptedContest {
            contest_id: contest.contest_id.clone(),
            sequence_order: contest.sequence_order,
            contest_hash: contest.contest_hash,
            selections,
            proof,
            contest_data,
            pre_encryption: Some(pre_encryption),
        };
        Ok((encrypted, nonces))
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::test_election;
    use crate::*;

    fn code(pre: &PreEncryptedBallot, contest_id: &str, selection_id: &str) -> String {
        pre.contests
            .iter()
            .find(|c| c.contest_id == contest_id)
            .and_then(|c| c.selections.iter().find(|s| s.selection_id == selection_id))
            .map(|s| s.short_code.clone())
            .unwrap()
    }

    fn marked(pre: &PreEncryptedBallot, choices: &[(&str, &str)]) -> MarkedPreEncryptedBallot {
        let contests = pre
            .contests
            .iter()
            .map(|c| MarkedPreEncryptedContest {
                contest_id: c.contest_id.clone(),
                selected_codes: choices
                    .iter()
                    .filter(|(contest, _)| *contest == c.contest_id)
                    .map(|(contest, selection)| code(pre, contest, selection))
                    .collect(),
            })
            .collect();
        MarkedPreEncryptedBallot {
            ballot_id: pre.ballot_id.clone(),
            ballot_style_id: pre.ballot_style_id.clone(),
            contests,
        }
    }

    #[test]
    fn preencryption_is_reproducible() {
        let (group, manifest, init, _) = test_election();
        let preencryptor = PreEncryptor::new(&group, &manifest, &init);
        let nonce = UInt256([7u8; 32]);

        let a = preencryptor.preencrypt("p1", "style-all", &nonce, b"").unwrap();
        let b = preencryptor.preencrypt("p1", "style-all", &nonce, b"").unwrap();
        assert_eq!(a, b);

        let council = &a.contests[1];
        assert_eq!(council.contest_id, "council");
        // four options and two null vectors, each over four components
        assert_eq!(council.selections.len(), 6);
        assert!(council.selections.iter().all(|s| s.selection_vector.len() == 4));
        assert!(council
            .selections
            .windows(2)
            .all(|w| w[0].selection_hash <= w[1].selection_hash));
        assert!(council.selections.iter().all(|s| s.short_code.len() == 5));
        assert!(council
            .selections
            .iter()
            .all(|s| s.selection_hash.to_hex().starts_with(&s.short_code)));

        let c = preencryptor.preencrypt("p1", "style-all", &UInt256([8u8; 32]), b"").unwrap();
        assert_ne!(a.confirmation_code, c.confirmation_code);

        assert!(preencryptor.preencrypt("p1", "nope", &nonce, b"").is_err());
    }

    #[test]
    fn colliding_short_codes_are_lengthened() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[..3].copy_from_slice(&[0xab, 0xcd, 0xe1]);
        b[..3].copy_from_slice(&[0xab, 0xcd, 0xe2]);
        let c = [0x12u8; 32];

        let codes = short_codes(&[UInt256(a), UInt256(b), UInt256(c)]);
        assert_eq!(codes, vec!["ABCDE1", "ABCDE2", "121212"]);

        let codes = short_codes(&[UInt256(a), UInt256(c)]);
        assert_eq!(codes, vec!["ABCDE", "12121"]);
    }

    #[test]
    fn ambiguous_short_code_is_not_recorded() {
        let (group, manifest, init, _) = test_election();
        let nonce = UInt256([7u8; 32]);
        let pre = PreEncryptor::new(&group, &manifest, &init)
            .preencrypt("p1", "style-all", &nonce, b"")
            .unwrap();
        let mut contest = pre.contests[0].clone();
        let code = contest.selections[0].short_code.clone();
        contest.selections[1].short_code = code.clone();

        let recorder = Recorder::new(&group, &manifest, &init, "device-1");
        assert!(matches!(
            recorder.record_contest("p1", &contest, &[code], &nonce),
            Err(Error::EncryptionCheckFailed(_, _))
        ));
    }

    #[test]
    fn recorded_ballot_encrypts_the_marked_choices() {
        let (group, manifest, init, _) = test_election();
        let nonce = UInt256([7u8; 32]);
        let pre = PreEncryptor::new(&group, &manifest, &init)
            .preencrypt("p1", "style-all", &nonce, b"")
            .unwrap();
        let marks = marked(&pre, &[("president", "bob"), ("council", "grace")]);

        let recorded = Recorder::new(&group, &manifest, &init, "device-1")
            .record(&marks, nonce, vec![])
            .unwrap();
        let ballot = &recorded.ballot;
        assert!(ballot.is_preencrypt);
        assert_eq!(ballot.confirmation_code, pre.confirmation_code);

        let expected: Vec<Vec<u32>> = vec![vec![0, 1, 0], vec![0, 0, 0, 1], vec![0, 0]];
        for (i, contest) in ballot.contests.iter().enumerate() {
            let limit = manifest.contest_limit(&contest.contest_id).unwrap();
            let pe = contest.pre_encryption.as_ref().unwrap();
            assert_eq!(pe.selected_vectors.len(), limit as usize);
            assert_eq!(pe.preencryption_hash, contest.contest_hash);

            for (j, selection) in contest.selections.iter().enumerate() {
                let vote = selection
                    .ciphertext
                    .decrypt_with_nonce(&group, &init.joint_public_key, recorded.selection_nonce(i, j).unwrap())
                    .unwrap();
                assert_eq!(vote, expected[i][j]);
                assert!(selection
                    .proof
                    .verify(&group, &init.extended_base_hash, &selection.ciphertext, &init.joint_public_key, 1)
                    .is_ok());
            }
            let total = elgamal_add_all(&group, contest.selections.iter().map(|s| &s.ciphertext));
            assert!(contest
                .proof
                .verify(&group, &init.extended_base_hash, &total, &init.joint_public_key, limit)
                .is_ok());
        }

        let data = ballot.contests[1]
            .contest_data
            .decrypt_contest_data_with_nonce(&group, &init.joint_public_key, &init.extended_base_hash, "council", 2, &nonce)
            .unwrap();
        assert_eq!(data.status, ContestDataStatus::UnderVote);
    }

    #[test]
    fn bad_marks_are_rejected() {
        let (group, manifest, init, _) = test_election();
        let nonce = UInt256([7u8; 32]);
        let pre = PreEncryptor::new(&group, &manifest, &init)
            .preencrypt("p1", "style-all", &nonce, b"")
            .unwrap();
        let recorder = Recorder::new(&group, &manifest, &init, "device-1");

        let mut marks = marked(&pre, &[("measure", "yes")]);
        marks.contests[2].selected_codes = vec!["zzzzz".to_string()];
        assert!(matches!(
            recorder.record(&marks, nonce, vec![]),
            Err(Error::UnknownShortCode(_, _))
        ));

        let marks = marked(&pre, &[("president", "alice"), ("president", "carol")]);
        assert!(matches!(
            recorder.record(&marks, nonce, vec![]),
            Err(Error::EncryptionCheckFailed(_, _))
        ));
    }
}
