use crate::*;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize as SerializeT;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "election_config.json";
const INIT_FILE: &str = "election_initialized.json";
const TALLY_FILE: &str = "encrypted_tally.json";
const DECRYPTED_TALLY_FILE: &str = "decrypted_tally.json";
const CHAIN_FILE: &str = "ballot_chain.json";
const BALLOTS_DIR: &str = "encrypted_ballots";
const DECRYPTED_BALLOTS_DIR: &str = "decrypted_ballots";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_json<T: SerializeT>(path: &Path, value: &T) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

// JSON files of a directory in name order, empty if the directory does not exist
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every plaintext ballot in a directory
pub fn read_plaintext_ballots(
    dir: &Path,
    filter: &dyn Fn(&PlaintextBallot) -> bool,
) -> Result<Vec<PlaintextBallot>, Error> {
    let mut ballots = Vec::new();
    for path in json_files(dir)? {
        let ballot: PlaintextBallot = read_json(&path)?;
        if filter(&ballot) {
            ballots.push(ballot);
        }
    }
    debug!("read {} plaintext ballots from {}", ballots.len(), dir.display());
    Ok(ballots)
}

pub fn write_plaintext_ballot(dir: &Path, ballot: &PlaintextBallot) -> Result<(), Error> {
    write_json(&dir.join(format!("pballot-{}.json", ballot.ballot_id)), ballot)
}

pub fn read_trustee_file(dir: &Path, guardian_id: &str) -> Result<DecryptingTrustee, Error> {
    read_json(&dir.join(format!("decrypting_trustee-{}.json", guardian_id)))
}

pub fn write_trustee_file(dir: &Path, trustee: &DecryptingTrustee) -> Result<(), Error> {
    write_json(
        &dir.join(format!("decrypting_trustee-{}.json", trustee.guardian_id)),
        trustee,
    )
}

/// An election record stored as a directory of JSON files:
///
/// ```text
/// election_config.json
/// election_initialized.json
/// encrypted_ballots/<device>/eballot-<id>.json
/// encrypted_ballots/<device>/ballot_chain.json
/// encrypted_tally.json
/// decrypted_tally.json
/// decrypted_ballots/dballot-<id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonRecord {
    root: PathBuf,
}

impl JsonRecord {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        JsonRecord { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, device: &str) -> PathBuf {
        self.root.join(BALLOTS_DIR).join(device)
    }
}

struct JsonBallotSink {
    dir: PathBuf,
}

impl EncryptedBallotSink for JsonBallotSink {
    fn write_encrypted_ballot(&mut self, ballot: &EncryptedBallot) -> Result<(), Error> {
        let path = self.dir.join(format!("eballot-{}.json", ballot.ballot_id));
        if path.exists() {
            warn!("overwriting encrypted ballot {}", path.display());
        }
        write_json(&path, ballot)
    }
}

impl Consumer for JsonRecord {
    fn stage(&self) -> Option<ElectionRecordStage> {
        let has = |name: &str| self.root.join(name).is_file();
        let has_ballots = self
            .encrypting_devices()
            .map(|devices| !devices.is_empty())
            .unwrap_or(false);
        if has(DECRYPTED_TALLY_FILE) {
            Some(ElectionRecordStage::Decrypted)
        } else if has(TALLY_FILE) {
            Some(ElectionRecordStage::Tallied)
        } else if has_ballots {
            Some(ElectionRecordStage::Encrypted)
        } else if has(INIT_FILE) {
            Some(ElectionRecordStage::Init)
        } else if has(CONFIG_FILE) {
            Some(ElectionRecordStage::Config)
        } else {
            None
        }
    }

    fn read_election_config(&self) -> Result<ElectionConfig, Error> {
        let path = self.root.join(CONFIG_FILE);
        if path.is_file() {
            return read_json(&path);
        }
        Ok(self.read_election_initialized()?.config)
    }

    fn read_election_initialized(&self) -> Result<ElectionInitialized, Error> {
        let path = self.root.join(INIT_FILE);
        if !path.is_file() {
            return Err(Error::MissingArtifact("election initialized"));
        }
        read_json(&path)
    }

    fn iterate_encrypted_ballots(
        &self,
        filter: &dyn Fn(&EncryptedBallot) -> bool,
    ) -> Result<Vec<EncryptedBallot>, Error> {
        let mut ballots = Vec::new();
        for device in self.encrypting_devices()? {
            for path in json_files(&self.device_dir(&device))? {
                if path.file_name().map(|n| n == CHAIN_FILE).unwrap_or(false) {
                    continue;
                }
                let ballot: EncryptedBallot = read_json(&path)?;
                if filter(&ballot) {
                    ballots.push(ballot);
                }
            }
        }
        Ok(ballots)
    }

    fn encrypting_devices(&self) -> Result<Vec<String>, Error> {
        let dir = self.root.join(BALLOTS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut devices = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                devices.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        devices.sort();
        Ok(devices)
    }

    fn read_encrypted_ballot_chain(&self, device: &str) -> Result<EncryptedBallotChain, Error> {
        let path = self.device_dir(device).join(CHAIN_FILE);
        if !path.is_file() {
            return Err(Error::MissingArtifact("encrypted ballot chain"));
        }
        read_json(&path)
    }

    fn read_encrypted_tally(&self) -> Result<EncryptedTally, Error> {
        let path = self.root.join(TALLY_FILE);
        if !path.is_file() {
            return Err(Error::MissingArtifact("encrypted tally"));
        }
        read_json(&path)
    }

    fn read_decrypted_tally(&self) -> Result<DecryptedTallyOrBallot, Error> {
        let path = self.root.join(DECRYPTED_TALLY_FILE);
        if !path.is_file() {
            return Err(Error::MissingArtifact("decrypted tally"));
        }
        read_json(&path)
    }

    fn iterate_decrypted_ballots(&self) -> Result<Vec<DecryptedTallyOrBallot>, Error> {
        json_files(&self.root.join(DECRYPTED_BALLOTS_DIR))?
            .iter()
            .map(|path| read_json(path))
            .collect()
    }
}

impl Publisher for JsonRecord {
    fn write_election_config(&mut self, config: &ElectionConfig) -> Result<(), Error> {
        write_json(&self.root.join(CONFIG_FILE), config)
    }

    fn write_election_initialized(&mut self, init: &ElectionInitialized) -> Result<(), Error> {
        write_json(&self.root.join(CONFIG_FILE), &init.config)?;
        write_json(&self.root.join(INIT_FILE), init)
    }

    fn encrypted_ballot_sink<'s>(
        &'s mut self,
        device: &str,
    ) -> Result<Box<dyn EncryptedBallotSink + 's>, Error> {
        let dir = self.device_dir(device);
        fs::create_dir_all(&dir)?;
        Ok(Box::new(JsonBallotSink { dir }))
    }

    fn write_encrypted_ballot_chain(&mut self, chain: &EncryptedBallotChain) -> Result<(), Error> {
        write_json(
            &self.device_dir(&chain.encrypting_device).join(CHAIN_FILE),
            chain,
        )
    }

    fn write_encrypted_tally(&mut self, tally: &EncryptedTally) -> Result<(), Error> {
        write_json(&self.root.join(TALLY_FILE), tally)
    }

    fn write_decrypted_tally(&mut self, tally: &DecryptedTallyOrBallot) -> Result<(), Error> {
        write_json(&self.root.join(DECRYPTED_TALLY_FILE), tally)
    }

    fn write_decrypted_ballot(&mut self, ballot: &DecryptedTallyOrBallot) -> Result<(), Error> {
        write_json(
            &self
                .root
                .join(DECRYPTED_BALLOTS_DIR)
                .join(format!("dballot-{}.json", ballot.id)),
            ballot,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_election};
    use crate::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("electionguard-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn json_record_round_trip() {
        let (group, manifest, init, trustees) = test_election();
        let dir = scratch("record");
        let mut record = JsonRecord::new(&dir);
        assert_eq!(record.stage(), None);

        record.write_election_initialized(&init).unwrap();
        assert_eq!(record.stage(), Some(ElectionRecordStage::Init));
        assert_eq!(record.read_election_initialized().unwrap(), init);
        assert_eq!(record.read_election_config().unwrap(), init.config);

        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = test_ballot("b1", &[("president", "carol")]);
        let encrypted = encryptor.encrypt(&ballot, UInt256([1u8; 32]), vec![]).unwrap().spoil();
        record
            .encrypted_ballot_sink("device-1")
            .unwrap()
            .write_encrypted_ballot(&encrypted)
            .unwrap();
        let chain = ConfirmationChain::new(&group, &init).close(&group, &init, "device-1");
        record.write_encrypted_ballot_chain(&chain).unwrap();

        assert_eq!(record.stage(), Some(ElectionRecordStage::Encrypted));
        // the chain file is not a ballot
        assert_eq!(record.iterate_encrypted_ballots(&|_| true).unwrap(), vec![encrypted]);
        assert_eq!(record.read_encrypted_ballot_chain("device-1").unwrap(), chain);

        record.write_trustee(&dir.join("trustees"), &trustees[0]).unwrap();
        let trustee = record.read_trustee(&dir.join("trustees"), &trustees[0].guardian_id).unwrap();
        assert_eq!(trustee, trustees[0]);

        let plaintext = dir.join("plaintext");
        write_plaintext_ballot(&plaintext, &ballot).unwrap();
        let read = record.iterate_plaintext_ballots(&plaintext, &|_| true).unwrap();
        assert_eq!(read, vec![ballot]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_artifacts_are_reported() {
        let dir = scratch("missing");
        let record = JsonRecord::new(&dir);
        assert!(matches!(
            record.read_encrypted_tally(),
            Err(Error::MissingArtifact("encrypted tally"))
        ));
        assert!(record.iterate_decrypted_ballots().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
