use crate::*;
use indexmap::IndexMap;
use log::{debug, info, warn};
use num_bigint::BigUint;
use num_traits::One;
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Numbered check groups, in report order
const CHECK_GROUPS: &[(u32, &str)] = &[
    (1, "election parameters"),
    (2, "guardian public keys"),
    (3, "election public key"),
    (4, "selection encryptions"),
    (5, "contest selection limits"),
    (6, "confirmation codes"),
    (7, "ballot aggregation"),
    (8, "decryption shares"),
    (9, "tally decryption"),
    (10, "share recovery"),
    (11, "manifest coverage"),
    (12, "spoiled ballots"),
    (16, "pre-encrypted selections"),
    (17, "pre-encryption hashes"),
];

fn group_number(rule: &str) -> Option<u32> {
    rule.split('.').next()?.parse().ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckGroup {
    pub number: u32,
    pub name: &'static str,
    /// False when the record stopped before this group could run
    pub checked: bool,
    pub errors: Vec<VerificationError>,
}

impl CheckGroup {
    pub fn is_ok(&self) -> bool {
        self.checked && self.errors.is_empty()
    }
}

/// Outcome of verifying an election record
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub stage: Option<ElectionRecordStage>,
    pub groups: Vec<CheckGroup>,
    /// Set when verification stopped early for lack of artifacts
    pub stopped_at: Option<ElectionRecordStage>,
}

impl VerificationReport {
    fn new(stage: Option<ElectionRecordStage>) -> Self {
        VerificationReport {
            stage,
            groups: CHECK_GROUPS
                .iter()
                .map(|&(number, name)| CheckGroup {
                    number,
                    name,
                    checked: false,
                    errors: Vec::new(),
                })
                .collect(),
            stopped_at: None,
        }
    }

    fn mark_checked(&mut self, numbers: &[u32]) {
        for group in self.groups.iter_mut().filter(|g| numbers.contains(&g.number)) {
            group.checked = true;
        }
    }

    fn add(&mut self, errors: Vec<VerificationError>) {
        for error in errors {
            warn!("{}", error);
            let number = group_number(error.rule);
            match self.groups.iter_mut().find(|g| Some(g.number) == number) {
                Some(group) => group.errors.push(error),
                None => self.groups[0].errors.push(error),
            }
        }
    }

    /// True when every check that ran passed. A record that stops early is not a failure.
    pub fn is_ok(&self) -> bool {
        self.groups.iter().filter(|g| g.checked).all(|g| g.errors.is_empty())
    }

    pub fn errors(&self) -> impl Iterator<Item = &VerificationError> {
        self.groups.iter().flat_map(|g| g.errors.iter())
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for group in &self.groups {
            let status = if !group.checked {
                "not checked".to_string()
            } else if group.errors.is_empty() {
                "OK".to_string()
            } else {
                format!("FAILED ({} errors)", group.errors.len())
            };
            writeln!(f, "{:>2}. {}: {}", group.number, group.name, status)?;
        }
        if let Some(stage) = self.stopped_at {
            writeln!(f, "not verifiable beyond this stage: {:?}", stage)?;
        }
        write!(f, "verification {}", if self.is_ok() { "OK" } else { "FAILED" })
    }
}

// Failures collected by concurrent workers
#[derive(Default)]
struct Aggregator {
    errors: Mutex<Vec<VerificationError>>,
}

impl Aggregator {
    fn add(&self, errors: Vec<VerificationError>) {
        if errors.is_empty() {
            return;
        }
        if let Ok(mut all) = self.errors.lock() {
            all.extend(errors);
        }
    }

    fn into_errors(self) -> Vec<VerificationError> {
        self.errors.into_inner().unwrap_or_default()
    }
}

/// Verifies an election record, stage by stage, as far as its artifacts go
pub struct Verifier<'a, C: Consumer + ?Sized> {
    record: &'a C,
    nthreads: usize,
    cancel: CancelToken,
}

impl<'a, C: Consumer + ?Sized> Verifier<'a, C> {
    pub fn new(record: &'a C, nthreads: usize) -> Self {
        Verifier {
            record,
            nthreads,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn verify(&self) -> Result<VerificationReport, Error> {
        let stage = self.record.stage();
        let mut report = VerificationReport::new(stage);
        let stage = match stage {
            Some(stage) => stage,
            None => return Err(Error::MissingArtifact("election config")),
        };
        info!("verifying election record at stage {:?}", stage);

        let config = self.record.read_election_config()?;
        report.mark_checked(&[1]);
        let (group, manifest) = match self.verify_parameters(&config, &mut report) {
            Some(found) => found,
            None => {
                report.stopped_at = Some(ElectionRecordStage::Config);
                return Ok(report);
            }
        };
        if stage < ElectionRecordStage::Init {
            report.stopped_at = Some(ElectionRecordStage::Config);
            return Ok(report);
        }

        let init = self.record.read_election_initialized()?;
        report.mark_checked(&[2, 3]);
        report.add(verify_guardians(&group, &config, &init));

        if stage < ElectionRecordStage::Encrypted {
            report.stopped_at = Some(ElectionRecordStage::Init);
            return Ok(report);
        }
        let ballots = self.record.iterate_encrypted_ballots(&|_| true)?;
        report.mark_checked(&[4, 5, 6, 11, 16, 17]);
        let ballot_verifier = BallotVerifier::new(&group, &manifest, &init);

        let aggregator = Aggregator::default();
        let checked = run_pool(
            ballots.iter(),
            self.nthreads,
            &self.cancel,
            |ballot| aggregator.add(ballot_verifier.verify_ballot(ballot)),
            |_| Ok(()),
        )?;
        debug!("checked {} encrypted ballots", checked);
        report.add(aggregator.into_errors());

        let mut chains = IndexMap::new();
        for device in self.record.encrypting_devices()? {
            let chain = match self.record.read_encrypted_ballot_chain(&device) {
                Ok(chain) => Some(chain),
                Err(Error::MissingArtifact(_)) => None,
                Err(e) => return Err(e),
            };
            chains.insert(device, chain);
        }
        report.add(ballot_verifier.verify_confirmation_codes(&ballots, &chains));

        if stage < ElectionRecordStage::Tallied {
            report.stopped_at = Some(ElectionRecordStage::Encrypted);
            return Ok(report);
        }
        let tally = self.record.read_encrypted_tally()?;
        report.mark_checked(&[7]);
        report.add(ballot_verifier.verify_aggregation(&ballots, &tally));

        if stage < ElectionRecordStage::Decrypted {
            report.stopped_at = Some(ElectionRecordStage::Tallied);
            return Ok(report);
        }
        let decrypted = self.record.read_decrypted_tally()?;
        report.mark_checked(&[8, 9, 10, 12]);
        let decryption_verifier = DecryptionVerifier::new(&group, &manifest, &init);
        report.add(decryption_verifier.verify_tally(&decrypted, &tally));

        let spoiled: IndexMap<&str, &EncryptedBallot> = ballots
            .iter()
            .filter(|b| b.state == BallotState::Spoiled)
            .map(|b| (b.ballot_id.as_str(), b))
            .collect();
        let decrypted_ballots = self.record.iterate_decrypted_ballots()?;
        let aggregator = Aggregator::default();
        run_pool(
            decrypted_ballots.iter(),
            self.nthreads,
            &self.cancel,
            |decrypted| match spoiled.get(decrypted.id.as_str()) {
                Some(ballot) => aggregator.add(decryption_verifier.verify_spoiled_ballot(decrypted, ballot)),
                None => aggregator.add(vec![VerificationError::new(
                    "12.C",
                    format!("decrypted ballot {} is not a spoiled ballot of this record", decrypted.id),
                )]),
            },
            |_| Ok(()),
        )?;
        report.add(aggregator.into_errors());

        info!("verification finished: {}", if report.is_ok() { "OK" } else { "FAILED" });
        Ok(report)
    }

    // 1.A - 1.H. Returns the group and manifest when later stages can be checked
    fn verify_parameters(
        &self,
        config: &ElectionConfig,
        report: &mut VerificationReport,
    ) -> Option<(GroupContext, Manifest)> {
        let c = &config.constants;
        let group = match GroupContext::from_constants(c) {
            Ok(group) => group,
            Err(e) => {
                report.add(vec![VerificationError::new("1.A", e.to_string())]);
                return None;
            }
        };

        let mut errors = Vec::new();
        if c.large_prime != &c.cofactor * &c.small_prime + BigUint::one() {
            errors.push(VerificationError::new("1.B", "p is not r·q + 1"));
        }
        let g = group.generator();
        if !group.is_valid_residue(&g) || g == group.one_p() {
            errors.push(VerificationError::new("1.C", "g does not generate the order q subgroup"));
        }
        if config.config_version != PROTOCOL_VERSION {
            errors.push(VerificationError::new(
                "1.D",
                format!("protocol version {} is not {}", config.config_version, PROTOCOL_VERSION),
            ));
        }

        let hp = parameter_base_hash(&group);
        if hp != config.parameter_base_hash {
            errors.push(VerificationError::new("1.E", "parameter base hash does not match"));
        }
        let hm = manifest_hash(&group, &hp, &config.manifest_bytes);
        if hm != config.manifest_hash {
            errors.push(VerificationError::new("1.F", "manifest hash does not match"));
        }
        let hb = election_base_hash(&group, &hp, &hm, config.number_of_guardians, config.quorum);
        if hb != config.election_base_hash {
            errors.push(VerificationError::new("1.G", "election base hash does not match"));
        }
        if config.quorum == 0 || config.quorum > config.number_of_guardians {
            errors.push(VerificationError::new(
                "1.H",
                format!("quorum {} of {} guardians", config.quorum, config.number_of_guardians),
            ));
        }

        let manifest = match config.manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                errors.push(VerificationError::new("1.F", format!("manifest does not parse: {}", e)));
                report.add(errors);
                return None;
            }
        };
        if let Err(invalid) = validate_manifest(&manifest) {
            for e in invalid {
                errors.push(VerificationError::new("1.F", e.to_string()));
            }
        }
        report.add(errors);
        Some((group, manifest))
    }
}

/// 2.A - 2.B and 3.A - 3.C
fn verify_guardians(
    group: &GroupContext,
    config: &ElectionConfig,
    init: &ElectionInitialized,
) -> Vec<VerificationError> {
    let mut errors = Vec::new();
    let hp = &config.parameter_base_hash;

    if &init.config != config {
        errors.push(VerificationError::new("3.B", "initialized election has a different config"));
    }

    let xs: HashSet<u32> = init.guardians.iter().map(|g| g.x_coordinate).collect();
    let ids: HashSet<&str> = init.guardians.iter().map(|g| g.guardian_id.as_str()).collect();
    let n = config.number_of_guardians as usize;
    if init.guardians.len() != n
        || xs.len() != n
        || ids.len() != n
        || xs.iter().any(|x| *x == 0 || *x as usize > n)
    {
        errors.push(VerificationError::new(
            "3.C",
            format!("{} guardians with distinct coordinates in 1..={} expected", n, n),
        ));
    }

    for guardian in &init.guardians {
        if guardian.coefficient_proofs.len() != config.quorum as usize {
            errors.push(VerificationError::new(
                "2.B",
                format!(
                    "guardian {} has {} commitments, expected {}",
                    guardian.guardian_id,
                    guardian.coefficient_proofs.len(),
                    config.quorum
                ),
            ));
        }
        for (j, proof) in guardian.coefficient_proofs.iter().enumerate() {
            if let Err(e) = proof.verify(group, hp, guardian.x_coordinate, j as u32) {
                let rule = match e {
                    ProofError::NotResidue => "2.A",
                    _ => "2.B",
                };
                errors.push(VerificationError::new(
                    rule,
                    format!("guardian {} coefficient {}: {}", guardian.guardian_id, j, e),
                ));
            }
        }
    }

    let keys: Option<Vec<&ElementModP>> = init.guardians.iter().map(|g| g.public_key()).collect();
    match keys {
        Some(keys) if group.mult_p_all(keys.iter().copied()) == init.joint_public_key.0 => {}
        _ => errors.push(VerificationError::new("3.A", "joint public key is not the product of the guardian keys")),
    }
    let he = extended_base_hash(group, &config.election_base_hash, &init.joint_public_key, &init.guardians);
    if he != init.extended_base_hash {
        errors.push(VerificationError::new("3.B", "extended base hash does not match"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use crate::tests::test_election;
    use crate::*;

    #[test]
    fn report_lists_groups_and_stops_at_the_record_stage() {
        let (group, _, init, _) = test_election();
        let mut record = ElectionRecord::new();
        record.write_election_initialized(&init).unwrap();

        let report = Verifier::new(&record, 2).verify().unwrap();
        assert_eq!(report.stopped_at, Some(ElectionRecordStage::Init));
        assert!(report.is_ok());
        assert_eq!(report.errors().count(), 0);
        let text = report.to_string();
        assert!(text.contains(" 1. election parameters: OK"));
        assert!(text.contains(" 4. selection encryptions: not checked"));
        assert!(text.contains("not verifiable beyond this stage: Init"));
        assert!(text.ends_with("verification OK"));

        let mut bad = init.clone();
        bad.joint_public_key = ElGamalPublicKey(group.generator());
        let mut record = ElectionRecord::new();
        record.write_election_initialized(&bad).unwrap();
        let report = Verifier::new(&record, 1).verify().unwrap();
        let rules: Vec<&str> = report.errors().map(|e| e.rule).collect();
        assert!(rules.contains(&"3.A"));
        assert!(rules.contains(&"3.B"));
        assert!(!report.is_ok());
        assert!(report.to_string().ends_with("verification FAILED"));
    }

    #[test]
    fn tampered_config_is_reported() {
        let (_, _, init, _) = test_election();
        let mut record = ElectionRecord::new();
        let mut config = init.config.clone();
        config.quorum = 4;
        config.config_version = "v1.0".to_string();
        record.write_election_config(&config).unwrap();

        let report = Verifier::new(&record, 1).verify().unwrap();
        let rules: Vec<&str> = report.errors().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["1.D", "1.G", "1.H"]);
        assert_eq!(report.stopped_at, Some(ElectionRecordStage::Config));
        assert!(!report.is_ok());
    }

    #[test]
    fn clean_config_only_record_is_ok() {
        let (_, _, init, _) = test_election();
        let mut record = ElectionRecord::new();
        record.write_election_config(&init.config).unwrap();

        let report = Verifier::new(&record, 1).verify().unwrap();
        assert_eq!(report.stopped_at, Some(ElectionRecordStage::Config));
        assert!(report.is_ok());
        assert!(report.to_string().contains(" 2. guardian public keys: not checked"));
    }
}
