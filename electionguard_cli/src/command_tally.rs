use crate::{expand, fail, load_election};
use electionguard::*;

pub fn command_tally(matches: &clap::ArgMatches) {
    // Unwraps are OK, both args are required or have defaults
    let input = expand(matches.value_of("input").unwrap());
    let name = matches.value_of("name").unwrap();

    let mut record = JsonRecord::new(&input);
    let tally = run_tally(&mut record, name).unwrap_or_else(|e| fail("tally", e));
    println!(
        "tally {} accumulated {} cast ballots",
        tally.tally_id,
        tally.cast_ballot_ids.len()
    );
}

pub fn run_tally(record: &mut JsonRecord, name: &str) -> Result<EncryptedTally, Error> {
    let (group, manifest, init) = load_election(record, "tally");
    let mut accumulate = AccumulateTally::new(&group, &manifest, init.extended_base_hash);
    for ballot in record.iterate_encrypted_ballots(&|b| b.state == BallotState::Cast)? {
        accumulate.add(&ballot)?;
    }
    let tally = accumulate.build(name);
    record.write_encrypted_tally(&tally)?;
    Ok(tally)
}
