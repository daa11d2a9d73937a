use crate::{expand, fail, load_election};
use electionguard::*;
use log::info;
use std::collections::HashSet;
use std::path::Path;

pub fn command_decrypt(matches: &clap::ArgMatches) {
    // Unwraps are OK, these args are required
    let input = expand(matches.value_of("input").unwrap());
    let trustees_dir = expand(matches.value_of("trustees").unwrap());
    let missing: HashSet<&str> = matches.values_of("missing").map(|m| m.collect()).unwrap_or_default();

    let mut record = JsonRecord::new(&input);
    let (_, _, init) = load_election(&record, "decrypt");
    let mut trustees = Vec::new();
    for guardian in init.guardians.iter().filter(|g| !missing.contains(g.guardian_id.as_str())) {
        let trustee = record
            .read_trustee(Path::new(&trustees_dir), &guardian.guardian_id)
            .unwrap_or_else(|e| fail("decrypt", format!("trustee {}: {}", guardian.guardian_id, e)));
        trustees.push(trustee);
    }

    let decrypted = run_decrypt(&mut record, &trustees).unwrap_or_else(|e| fail("decrypt", e));
    for contest in &decrypted.contests {
        println!("{}", contest.contest_id);
        for selection in &contest.selections {
            println!("  {}: {}", selection.selection_id, selection.tally);
        }
    }
}

/// Decrypt the tally and every spoiled ballot of a record with the given trustees
pub fn run_decrypt(
    record: &mut JsonRecord,
    trustees: &[DecryptingTrustee],
) -> Result<DecryptedTallyOrBallot, Error> {
    let (group, _, init) = load_election(record, "decrypt");
    let tally = record.read_encrypted_tally()?;
    let decryptor = Decryptor::new(&group, &init, trustees)?;
    let mut rng = rand::rngs::OsRng;

    let decrypted = decryptor.decrypt_tally(&tally, &mut rng)?;
    record.write_decrypted_tally(&decrypted)?;

    let spoiled = record.iterate_encrypted_ballots(&|b| b.state == BallotState::Spoiled)?;
    for ballot in &spoiled {
        let decrypted_ballot = decryptor.decrypt_ballot(ballot, &mut rng)?;
        record.write_decrypted_ballot(&decrypted_ballot)?;
    }
    info!("decrypted tally {} and {} spoiled ballots", tally.tally_id, spoiled.len());
    Ok(decrypted)
}
