use crate::command_decrypt::run_decrypt;
use crate::command_encrypt::run_encrypt;
use crate::command_keyceremony::run_keyceremony;
use crate::command_tally::run_tally;
use crate::command_verify::print_report;
use crate::{expand, fail, group_arg, nthreads, parse_arg, read_manifest};
use electionguard::*;
use std::collections::HashSet;
use std::path::Path;

/// Every nth random ballot is spoiled
const SPOIL_EVERY: usize = 5;

pub fn command_e2e(matches: &clap::ArgMatches) {
    // Unwraps are OK, these args are required
    let manifest = read_manifest(&expand(matches.value_of("manifest").unwrap()), "e2e");
    let output = expand(matches.value_of("output").unwrap());
    let nballots: usize = parse_arg(matches, "nballots", "e2e");
    let missing: HashSet<&str> = matches.values_of("missing").map(|m| m.collect()).unwrap_or_default();
    let nthreads = nthreads(matches, "e2e");

    let group = group_arg(matches);
    let mut record = JsonRecord::new(&output);
    let trustees_dir = Path::new(&output).join("private_trustees");
    let init = run_keyceremony(&group, &manifest, matches, &mut record, &trustees_dir)
        .unwrap_or_else(|e| fail("e2e", e));

    let provider = RandomBallotProvider::new(&manifest).with_write_ins();
    let mut rng = rand::thread_rng();
    let ballots: Vec<PlaintextBallot> = (0..nballots).filter_map(|_| provider.ballot(&mut rng)).collect();
    let mut options = BatchOptions::new("e2e-device");
    options.nthreads = nthreads;
    options.check = CheckType::Verify;
    options.spoiled = ballots
        .iter()
        .step_by(SPOIL_EVERY)
        .map(|b| b.ballot_id.clone())
        .collect();
    let source = record.clone();
    let encrypted = run_encrypt(&source, &mut record, ballots, options, None)
        .unwrap_or_else(|e| fail("e2e", e));
    println!("encrypted {} ballots", encrypted.encrypted);

    run_tally(&mut record, "e2e-tally").unwrap_or_else(|e| fail("e2e", e));

    let mut trustees = Vec::new();
    for guardian in init.guardians.iter().filter(|g| !missing.contains(g.guardian_id.as_str())) {
        let trustee = record
            .read_trustee(&trustees_dir, &guardian.guardian_id)
            .unwrap_or_else(|e| fail("e2e", e));
        trustees.push(trustee);
    }
    let decrypted = run_decrypt(&mut record, &trustees).unwrap_or_else(|e| fail("e2e", e));
    for contest in &decrypted.contests {
        let counts: Vec<String> = contest
            .selections
            .iter()
            .map(|s| format!("{}={}", s.selection_id, s.tally))
            .collect();
        println!("{}: {}", contest.contest_id, counts.join(" "));
    }

    let report = Verifier::new(&record, nthreads)
        .verify()
        .unwrap_or_else(|e| fail("e2e", e));
    print_report(&report);
    if !report.is_ok() {
        std::process::exit(1);
    }
}
