use crate::*;
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;
use std::str::FromStr;

/// Extra work done on every ballot after it is encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    None,
    /// Verify every proof and hash of the encrypted ballot
    Verify,
    /// Encrypt again with the same nonce and compare
    EncryptTwice,
    /// Decrypt with the ballot nonce and compare with the plaintext
    DecryptNonce,
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(CheckType::None),
            "Verify" => Ok(CheckType::Verify),
            "EncryptTwice" => Ok(CheckType::EncryptTwice),
            "DecryptNonce" => Ok(CheckType::DecryptNonce),
            _ => Err(format!("unknown check type {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub device: String,
    pub check: CheckType,
    pub nthreads: usize,
    /// Draw ballot nonces from a ChaCha20 generator with this seed instead of the OS
    pub fixed_seed: Option<[u8; 32]>,
    /// Ballots submitted as spoiled; every other ballot is cast
    pub spoiled: HashSet<String>,
}

impl BatchOptions {
    pub fn new(device: &str) -> Self {
        BatchOptions {
            device: device.to_string(),
            check: CheckType::None,
            nthreads: 1,
            fixed_seed: None,
            spoiled: HashSet::new(),
        }
    }
}

#[derive(Debug)]
pub struct BatchResult {
    pub encrypted: usize,
    /// Ballots that failed validation, with every reason
    pub invalid: Vec<(PlaintextBallot, Vec<ValidationError>)>,
    /// Valid ballots whose encryption or check failed; they are not in the record
    pub failed: Vec<(PlaintextBallot, Error)>,
    pub chain: EncryptedBallotChain,
}

/// Encrypts a batch of plaintext ballots into an election record
pub struct BatchEncryption<'a, E: BallotEncryptor + Sync = Encryptor<'a>> {
    group: &'a GroupContext,
    manifest: &'a Manifest,
    init: &'a ElectionInitialized,
    encryptor: E,
    options: BatchOptions,
}

impl<'a> BatchEncryption<'a, Encryptor<'a>> {
    pub fn new(
        group: &'a GroupContext,
        manifest: &'a Manifest,
        init: &'a ElectionInitialized,
        options: BatchOptions,
    ) -> Self {
        let encryptor = Encryptor::new(group, manifest, init, &options.device);
        BatchEncryption::with_encryptor(group, manifest, init, encryptor, options)
    }
}

impl<'a, E: BallotEncryptor + Sync> BatchEncryption<'a, E> {
    pub fn with_encryptor(
        group: &'a GroupContext,
        manifest: &'a Manifest,
        init: &'a ElectionInitialized,
        encryptor: E,
        options: BatchOptions,
    ) -> Self {
        BatchEncryption {
            group,
            manifest,
            init,
            encryptor,
            options,
        }
    }

    pub fn run<P: Publisher + ?Sized>(
        &self,
        ballots: Vec<PlaintextBallot>,
        publisher: &mut P,
        cancel: &CancelToken,
    ) -> Result<BatchResult, Error> {
        let mut valid = Vec::with_capacity(ballots.len());
        let mut invalid = Vec::new();
        for ballot in ballots {
            match validate_ballot(self.manifest, &ballot) {
                Ok(()) => valid.push(ballot),
                Err(errors) => {
                    warn!(
                        "ballot {} is invalid: {}",
                        ballot.ballot_id,
                        errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
                    );
                    invalid.push((ballot, errors));
                }
            }
        }

        // nonces are drawn up front, in input order, so fixed mode is reproducible
        let nonces: Vec<UInt256> = match self.options.fixed_seed {
            Some(seed) => {
                let mut rng = ChaCha20Rng::from_seed(seed);
                valid.iter().map(|_| UInt256(rng.gen())).collect()
            }
            None => {
                let mut rng = rand::thread_rng();
                valid.iter().map(|_| UInt256(rng.gen())).collect()
            }
        };
        let work: Vec<(PlaintextBallot, UInt256)> = valid.into_iter().zip(nonces).collect();

        let mut chain = ConfirmationChain::new(self.group, self.init);
        let mut count = 0;
        let mut failed = Vec::new();
        {
            let mut sink = publisher.encrypted_ballot_sink(&self.options.device)?;

            if chain.is_chained() {
                // each B_aux depends on the previous confirmation code; a failed ballot
                // leaves the chain where it was
                for (ballot, nonce) in work {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    match self.encrypt_one(&ballot, nonce, chain.next_baux()) {
                        Ok(encrypted) => {
                            chain.record(&encrypted.ballot_id, encrypted.confirmation_code);
                            sink.write_encrypted_ballot(&encrypted)?;
                            count += 1;
                        }
                        Err(e) => {
                            warn!("ballot {} was not encrypted: {}", ballot.ballot_id, e);
                            failed.push((ballot, e));
                        }
                    }
                }
            } else {
                let baux = self.init.config.config_baux0.clone();
                run_pool(
                    work,
                    self.options.nthreads,
                    cancel,
                    |(ballot, nonce)| match self.encrypt_one(&ballot, nonce, baux.clone()) {
                        Ok(encrypted) => Ok(encrypted),
                        Err(e) => Err((ballot, e)),
                    },
                    |result| match result {
                        Ok(encrypted) => {
                            chain.record(&encrypted.ballot_id, encrypted.confirmation_code);
                            count += 1;
                            sink.write_encrypted_ballot(&encrypted)
                        }
                        Err((ballot, e)) => {
                            warn!("ballot {} was not encrypted: {}", ballot.ballot_id, e);
                            failed.push((ballot, e));
                            Ok(())
                        }
                    },
                )?;
            }
        }

        let chain = chain.close(self.group, self.init, &self.options.device);
        publisher.write_encrypted_ballot_chain(&chain)?;
        info!(
            "device {} encrypted {} ballots, {} invalid, {} failed",
            self.options.device,
            count,
            invalid.len(),
            failed.len()
        );

        Ok(BatchResult {
            encrypted: count,
            invalid,
            failed,
            chain,
        })
    }

    fn encrypt_one(
        &self,
        ballot: &PlaintextBallot,
        nonce: UInt256,
        baux: Vec<u8>,
    ) -> Result<EncryptedBallot, Error> {
        let ciphertext = self.encryptor.encrypt(ballot, nonce, baux.clone())?;
        self.check(ballot, &ciphertext, baux)?;

        let state = if self.options.spoiled.contains(&ballot.ballot_id) {
            BallotState::Spoiled
        } else {
            BallotState::Cast
        };
        Ok(ciphertext.submit(state))
    }

    fn check(
        &self,
        ballot: &PlaintextBallot,
        ciphertext: &CiphertextBallot,
        baux: Vec<u8>,
    ) -> Result<(), Error> {
        let fail = |msg: String| Error::EncryptionCheckFailed(ballot.ballot_id.clone(), msg);
        match self.options.check {
            CheckType::None => Ok(()),
            CheckType::Verify => {
                let errors = BallotVerifier::new(self.group, self.manifest, self.init)
                    .verify_ballot(&ciphertext.ballot);
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(fail(
                        errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "),
                    ))
                }
            }
            CheckType::EncryptTwice => {
                let again = self.encryptor.encrypt(ballot, ciphertext.ballot_nonce, baux)?;
                if again.ballot != ciphertext.ballot {
                    return Err(fail("second encryption differs".to_string()));
                }
                Ok(())
            }
            CheckType::DecryptNonce => {
                let decrypted = NonceDecryptor::new(self.group, self.manifest, self.init)
                    .decrypt(&ciphertext.ballot, &ciphertext.ballot_nonce)?;
                for contest in &decrypted.contests {
                    let original = ballot.contest(&contest.contest_id);
                    if !same_intent(self.manifest, original, contest) {
                        return Err(fail(format!(
                            "contest {} decrypts to different votes",
                            contest.contest_id
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Compare votes exactly, or as sets of voted-for selections when the original overvoted
fn same_intent(
    manifest: &Manifest,
    original: Option<&PlaintextContest>,
    decrypted: &PlaintextContest,
) -> bool {
    let vote = |contest: Option<&PlaintextContest>, selection_id: &str| {
        contest
            .and_then(|c| c.selection(selection_id))
            .map(|s| s.vote)
            .unwrap_or(0)
    };
    let overvoted = match (original, manifest.contest(&decrypted.contest_id)) {
        (Some(o), Some(d)) => {
            let sum = o.selections.iter().fold(0u32, |acc, s| acc.saturating_add(s.vote));
            sum > d.votes_allowed || o.selections.iter().any(|s| s.vote > d.option_limit)
        }
        _ => false,
    };

    decrypted.selections.iter().all(|s| {
        let expected = vote(original, &s.selection_id);
        if overvoted {
            (expected > 0) == (s.vote > 0)
        } else {
            expected == s.vote
        }
    })
}
