use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("electionguard: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("electionguard: JSON error: {0}")]
    JSONDeserialization(#[from] serde_json::Error),

    #[error("electionguard: invalid hexidecimal")]
    BadHex,

    #[error("electionguard: invalid group element: {0}")]
    InvalidElement(String),

    #[error("electionguard: quorum {0} is invalid for {1} guardians")]
    InvalidQuorum(u32, u32),

    #[error("electionguard: guardian {0} has {1} public key sets, expected {2}")]
    WrongNumberOfPublicKeys(String, usize, usize),

    #[error("electionguard: guardian {0} received {1} key shares, expected {2}")]
    WrongNumberOfKeyShares(String, usize, usize),

    #[error("electionguard: invalid public keys from guardian {0}: {1}")]
    InvalidPublicKeys(String, String),

    #[error("electionguard: invalid key share from {0} to {1}: {2}")]
    InvalidKeyShare(String, String, String),

    #[error("electionguard: {0} guardians found, election is configured for {1}")]
    GuardianCountMismatch(usize, u32),

    #[error("electionguard: lagrange coefficient for {0} cannot be computed over {1:?}")]
    LagrangeCoefficient(u32, Vec<u32>),

    #[error("electionguard: not enough trustees: need {0}, found {1}")]
    NotEnoughTrustees(usize, usize),

    #[error("electionguard: trustee {0} does not match the election record")]
    TrusteeMismatch(String),

    #[error("electionguard: hashed elgamal HMAC verification failed")]
    HmacMismatch,

    #[error("electionguard: contest data for {0} cannot be packed into {1} bytes")]
    ContestDataOverflow(String, usize),

    #[error("electionguard: malformed contest data: {0}")]
    ContestDataMalformed(String),

    #[error("electionguard: discrete log not found below {0}")]
    DlogNotFound(u32),

    #[error("electionguard: election record has no {0}")]
    MissingArtifact(&'static str),

    #[error("electionguard: invalid ballot: {0}")]
    InvalidBallot(#[from] ValidationError),

    #[error("electionguard: manifest has {} validation errors", .0.len())]
    InvalidManifest(Vec<ValidationError>),

    #[error("electionguard: unknown contest {0}")]
    UnknownContest(String),

    #[error("electionguard: unknown selection {1} in contest {0}")]
    UnknownSelection(String, String),

    #[error("electionguard: ballot {0} rejected by tally: {1}")]
    TallyRejected(String, String),

    #[error("electionguard: short code {0} not found in contest {1}")]
    UnknownShortCode(String, String),

    #[error("electionguard: ballot {0} failed encryption check: {1}")]
    EncryptionCheckFailed(String, String),

    #[error("electionguard: decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("electionguard: cancelled")]
    Cancelled,
}

/// Input validation errors, tagged with the rule that was broken
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Manifest.A.1: duplicate contest id {0}")]
    DuplicateContestId(String),

    #[error("Manifest.A.2: duplicate contest sequence order {0}")]
    DuplicateContestSequence(u32),

    #[error("Manifest.A.3: duplicate selection id {1} in contest {0}")]
    DuplicateSelectionId(String, String),

    #[error("Manifest.A.4: duplicate selection sequence order {1} in contest {0}")]
    DuplicateSelectionSequence(String, u32),

    #[error("Manifest.A.5: contest {0} has an invalid vote limit")]
    InvalidVoteLimit(String),

    #[error("Manifest.A.6: ballot style {0} refers to unknown geopolitical unit {1}")]
    UnknownGeopoliticalUnit(String, String),

    #[error("Manifest.A.7: contest {0} refers to unknown geopolitical unit {1}")]
    ContestUnknownGeopoliticalUnit(String, String),

    #[error("Ballot.A.1: ballot {0} has unknown ballot style {1}")]
    UnknownBallotStyle(String, String),

    #[error("Ballot.A.2: ballot {0} has unknown contest {1}")]
    UnknownContest(String, String),

    #[error("Ballot.A.2.1: ballot {0} contest {1} has sequence order {2}, manifest has {3}")]
    ContestSequenceMismatch(String, String, u32, u32),

    #[error("Ballot.A.3: ballot {0} contest {1} is not in ballot style {2}")]
    ContestNotInStyle(String, String, String),

    #[error("Ballot.A.4: ballot {0} contest {1} has unknown selection {2}")]
    UnknownSelection(String, String, String),

    #[error("Ballot.A.4.1: ballot {0} selection {1} has sequence order {2}, manifest has {3}")]
    SelectionSequenceMismatch(String, String, u32, u32),

    #[error("Ballot.B.1: ballot {0} has duplicate contest {1}")]
    DuplicateContest(String, String),

    #[error("Ballot.B.2: ballot {0} contest {1} has duplicate selection {2}")]
    DuplicateSelection(String, String, String),

    #[error("Ballot.B.3: ballot {0} contest {1} has duplicate selection sequence order {2}")]
    DuplicateBallotSelectionSequence(String, String, u32),
}

/// Reasons a zero knowledge proof is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProofError {
    #[error("public value is not a valid residue")]
    NotResidue,

    #[error("proof has {0} parts, expected {1}")]
    WrongLength(usize, usize),

    #[error("challenge or response is out of bounds")]
    OutOfBounds,

    #[error("challenge does not match the recomputed hash")]
    ChallengeMismatch,

    #[error("plaintext {0} is larger than the limit {1}")]
    PlaintextOutOfRange(u32, u32),
}

/// A failed verification check, identified by its rule number
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{rule}: {message}")]
pub struct VerificationError {
    pub rule: &'static str,
    pub message: String,
}

impl VerificationError {
    pub fn new(rule: &'static str, message: impl Into<String>) -> Self {
        VerificationError {
            rule,
            message: message.into(),
        }
    }
}
