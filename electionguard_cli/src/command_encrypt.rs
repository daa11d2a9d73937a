use crate::{expand, fail, load_election, nthreads};
use electionguard::*;
use std::path::Path;

/// Seed used by --fixed
const FIXED_SEED: [u8; 32] = [0x45; 32];

pub fn command_encrypt(matches: &clap::ArgMatches) {
    // Unwraps are OK, these args are required or have defaults
    let input = expand(matches.value_of("input").unwrap());
    let ballots_dir = expand(matches.value_of("ballots").unwrap());
    let output = matches.value_of("output").map(expand).unwrap_or_else(|| input.clone());
    let invalid = matches.value_of("invalid").map(expand);
    let device = matches.value_of("device").unwrap();
    let check = matches
        .value_of("check")
        .unwrap()
        .parse()
        .unwrap_or_else(|e| fail("encrypt", e));

    let mut options = BatchOptions::new(device);
    options.check = check;
    options.nthreads = nthreads(matches, "encrypt");
    if matches.is_present("fixed") {
        options.fixed_seed = Some(FIXED_SEED);
    }
    if let Some(spoil) = matches.values_of("spoil") {
        options.spoiled = spoil.map(|s| s.to_string()).collect();
    }

    let source = JsonRecord::new(&input);
    let ballots = source
        .iterate_plaintext_ballots(Path::new(&ballots_dir), &|_| true)
        .unwrap_or_else(|e| fail("encrypt", e));
    let mut record = JsonRecord::new(&output);
    let result = run_encrypt(&source, &mut record, ballots, options, invalid.as_deref().map(Path::new))
        .unwrap_or_else(|e| fail("encrypt", e));

    println!(
        "encrypted {} ballots on device {}, {} invalid, {} failed",
        result.encrypted,
        device,
        result.invalid.len(),
        result.failed.len()
    );
    if let Some(code) = result.chain.last_confirmation_code {
        println!("last confirmation code: {}", code);
    }
}

/// Encrypt ballots from the election in `source` into `record`.
/// Invalid ballots, and ballots whose encryption failed, are written to `invalid_dir` when given.
pub fn run_encrypt(
    source: &JsonRecord,
    record: &mut JsonRecord,
    ballots: Vec<PlaintextBallot>,
    options: BatchOptions,
    invalid_dir: Option<&Path>,
) -> Result<BatchResult, Error> {
    let (group, manifest, init) = load_election(source, "encrypt");
    if record.stage().is_none() {
        record.write_election_initialized(&init)?;
    }

    let result = BatchEncryption::new(&group, &manifest, &init, options).run(
        ballots,
        record,
        &CancelToken::new(),
    )?;
    if let Some(dir) = invalid_dir {
        for (ballot, errors) in &result.invalid {
            write_plaintext_ballot(dir, ballot)?;
            for e in errors {
                eprintln!("  {}: {}", ballot.ballot_id, e);
            }
        }
        for (ballot, e) in &result.failed {
            write_plaintext_ballot(dir, ballot)?;
            eprintln!("  {}: {}", ballot.ballot_id, e);
        }
    }
    Ok(result)
}
