use crate::*;
use indexmap::IndexMap;
use std::path::Path;

/// Append-only writer for one device's encrypted ballots
pub trait EncryptedBallotSink {
    fn write_encrypted_ballot(&mut self, ballot: &EncryptedBallot) -> Result<(), Error>;
}

/// Read access to an election record
pub trait Consumer {
    /// The furthest stage this record holds artifacts for
    fn stage(&self) -> Option<ElectionRecordStage>;

    fn read_election_config(&self) -> Result<ElectionConfig, Error>;

    fn read_election_initialized(&self) -> Result<ElectionInitialized, Error>;

    /// Plaintext ballots are inputs, not part of the record; they are always read from disk
    fn iterate_plaintext_ballots(
        &self,
        dir: &Path,
        filter: &dyn Fn(&PlaintextBallot) -> bool,
    ) -> Result<Vec<PlaintextBallot>, Error> {
        read_plaintext_ballots(dir, filter)
    }

    fn iterate_encrypted_ballots(
        &self,
        filter: &dyn Fn(&EncryptedBallot) -> bool,
    ) -> Result<Vec<EncryptedBallot>, Error>;

    fn encrypting_devices(&self) -> Result<Vec<String>, Error>;

    fn read_encrypted_ballot_chain(&self, device: &str) -> Result<EncryptedBallotChain, Error>;

    fn read_encrypted_tally(&self) -> Result<EncryptedTally, Error>;

    fn read_decrypted_tally(&self) -> Result<DecryptedTallyOrBallot, Error>;

    fn iterate_decrypted_ballots(&self) -> Result<Vec<DecryptedTallyOrBallot>, Error>;

    /// Trustees are private to their guardian and live outside the record
    fn read_trustee(&self, dir: &Path, guardian_id: &str) -> Result<DecryptingTrustee, Error> {
        read_trustee_file(dir, guardian_id)
    }
}

/// Write access to an election record
pub trait Publisher {
    fn write_election_config(&mut self, config: &ElectionConfig) -> Result<(), Error>;

    fn write_election_initialized(&mut self, init: &ElectionInitialized) -> Result<(), Error>;

    fn encrypted_ballot_sink<'s>(
        &'s mut self,
        device: &str,
    ) -> Result<Box<dyn EncryptedBallotSink + 's>, Error>;

    fn write_encrypted_ballot_chain(&mut self, chain: &EncryptedBallotChain) -> Result<(), Error>;

    fn write_encrypted_tally(&mut self, tally: &EncryptedTally) -> Result<(), Error>;

    fn write_decrypted_tally(&mut self, tally: &DecryptedTallyOrBallot) -> Result<(), Error>;

    fn write_decrypted_ballot(&mut self, ballot: &DecryptedTallyOrBallot) -> Result<(), Error>;

    fn write_trustee(&mut self, dir: &Path, trustee: &DecryptingTrustee) -> Result<(), Error> {
        write_trustee_file(dir, trustee)
    }
}

/// A simple election record held in memory
#[derive(Default, Debug, Clone)]
pub struct ElectionRecord {
    config: Option<ElectionConfig>,
    init: Option<ElectionInitialized>,
    ballots: IndexMap<String, Vec<EncryptedBallot>>,
    chains: IndexMap<String, EncryptedBallotChain>,
    tally: Option<EncryptedTally>,
    decrypted_tally: Option<DecryptedTallyOrBallot>,
    decrypted_ballots: Vec<DecryptedTallyOrBallot>,
}

impl ElectionRecord {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemBallotSink<'a> {
    ballots: &'a mut Vec<EncryptedBallot>,
}

impl<'a> EncryptedBallotSink for MemBallotSink<'a> {
    fn write_encrypted_ballot(&mut self, ballot: &EncryptedBallot) -> Result<(), Error> {
        self.ballots.push(ballot.clone());
        Ok(())
    }
}

impl Consumer for ElectionRecord {
    fn stage(&self) -> Option<ElectionRecordStage> {
        if self.decrypted_tally.is_some() {
            Some(ElectionRecordStage::Decrypted)
        } else if self.tally.is_some() {
            Some(ElectionRecordStage::Tallied)
        } else if self.ballots.values().any(|b| !b.is_empty()) {
            Some(ElectionRecordStage::Encrypted)
        } else if self.init.is_some() {
            Some(ElectionRecordStage::Init)
        } else if self.config.is_some() {
            Some(ElectionRecordStage::Config)
        } else {
            None
        }
    }

    fn read_election_config(&self) -> Result<ElectionConfig, Error> {
        match (&self.config, &self.init) {
            (Some(config), _) => Ok(config.clone()),
            (None, Some(init)) => Ok(init.config.clone()),
            (None, None) => Err(Error::MissingArtifact("election config")),
        }
    }

    fn read_election_initialized(&self) -> Result<ElectionInitialized, Error> {
        self.init
            .clone()
            .ok_or(Error::MissingArtifact("election initialized"))
    }

    fn iterate_encrypted_ballots(
        &self,
        filter: &dyn Fn(&EncryptedBallot) -> bool,
    ) -> Result<Vec<EncryptedBallot>, Error> {
        Ok(self
            .ballots
            .values()
            .flatten()
            .filter(|b| filter(*b))
            .cloned()
            .collect())
    }

    fn encrypting_devices(&self) -> Result<Vec<String>, Error> {
        Ok(self.ballots.keys().cloned().collect())
    }

    fn read_encrypted_ballot_chain(&self, device: &str) -> Result<EncryptedBallotChain, Error> {
        self.chains
            .get(device)
            .cloned()
            .ok_or(Error::MissingArtifact("encrypted ballot chain"))
    }

    fn read_encrypted_tally(&self) -> Result<EncryptedTally, Error> {
        self.tally.clone().ok_or(Error::MissingArtifact("encrypted tally"))
    }

    fn read_decrypted_tally(&self) -> Result<DecryptedTallyOrBallot, Error> {
        self.decrypted_tally
            .clone()
            .ok_or(Error::MissingArtifact("decrypted tally"))
    }

    fn iterate_decrypted_ballots(&self) -> Result<Vec<DecryptedTallyOrBallot>, Error> {
        Ok(self.decrypted_ballots.clone())
    }
}

impl Publisher for ElectionRecord {
    fn write_election_config(&mut self, config: &ElectionConfig) -> Result<(), Error> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn write_election_initialized(&mut self, init: &ElectionInitialized) -> Result<(), Error> {
        self.config = Some(init.config.clone());
        self.init = Some(init.clone());
        Ok(())
    }

    fn encrypted_ballot_sink<'s>(
        &'s mut self,
        device: &str,
    ) -> Result<Box<dyn EncryptedBallotSink + 's>, Error> {
        let ballots = self.ballots.entry(device.to_string()).or_default();
        Ok(Box::new(MemBallotSink { ballots }))
    }

    fn write_encrypted_ballot_chain(&mut self, chain: &EncryptedBallotChain) -> Result<(), Error> {
        self.chains
            .insert(chain.encrypting_device.clone(), chain.clone());
        Ok(())
    }

    fn write_encrypted_tally(&mut self, tally: &EncryptedTally) -> Result<(), Error> {
        self.tally = Some(tally.clone());
        Ok(())
    }

    fn write_decrypted_tally(&mut self, tally: &DecryptedTallyOrBallot) -> Result<(), Error> {
        self.decrypted_tally = Some(tally.clone());
        Ok(())
    }

    fn write_decrypted_ballot(&mut self, ballot: &DecryptedTallyOrBallot) -> Result<(), Error> {
        self.decrypted_ballots.push(ballot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn stage_follows_artifacts() {
        let (group, manifest, init, _) = crate::tests::test_election();
        let mut record = ElectionRecord::new();
        assert_eq!(record.stage(), None);
        assert!(record.read_election_config().is_err());

        record.write_election_initialized(&init).unwrap();
        assert_eq!(record.stage(), Some(ElectionRecordStage::Init));
        assert_eq!(record.read_election_config().unwrap(), init.config);

        let encryptor = Encryptor::new(&group, &manifest, &init, "device-1");
        let ballot = crate::tests::test_ballot("b1", &[("measure", "yes")]);
        let encrypted = encryptor.encrypt(&ballot, UInt256([1u8; 32]), vec![]).unwrap().cast();
        {
            let mut sink = record.encrypted_ballot_sink("device-1").unwrap();
            sink.write_encrypted_ballot(&encrypted).unwrap();
        }
        assert_eq!(record.stage(), Some(ElectionRecordStage::Encrypted));
        assert_eq!(record.encrypting_devices().unwrap(), vec!["device-1".to_string()]);
        assert_eq!(record.iterate_encrypted_ballots(&|_| true).unwrap().len(), 1);
        assert!(record
            .iterate_encrypted_ballots(&|b| b.state == BallotState::Spoiled)
            .unwrap()
            .is_empty());
    }
}
