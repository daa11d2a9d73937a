use crate::{expand, fail, nthreads};
use electionguard::*;

pub fn command_verify(matches: &clap::ArgMatches) {
    // Unwrap is OK, input is required
    let input = expand(matches.value_of("input").unwrap());
    let record = JsonRecord::new(&input);

    let report = Verifier::new(&record, nthreads(matches, "verify"))
        .verify()
        .unwrap_or_else(|e| fail("verify", e));
    print_report(&report);
    if !report.is_ok() {
        std::process::exit(1);
    }
}

pub fn print_report(report: &VerificationReport) {
    for error in report.errors() {
        eprintln!("  {}", error);
    }
    println!("{}", report);
}
