use crate::{expand, fail, group_arg, parse_arg, read_manifest};
use electionguard::*;
use log::info;
use std::path::Path;

pub fn command_keyceremony(matches: &clap::ArgMatches) {
    // Unwraps are OK, these args are required
    let manifest = read_manifest(&expand(matches.value_of("manifest").unwrap()), "keyceremony");
    let output = expand(matches.value_of("output").unwrap());
    let trustees = expand(matches.value_of("trustees").unwrap());

    let group = group_arg(matches);
    let mut record = JsonRecord::new(&output);
    let init = run_keyceremony(&group, &manifest, matches, &mut record, Path::new(&trustees))
        .unwrap_or_else(|e| fail("keyceremony", e));

    println!("election initialized in {}", output);
    println!("extended base hash: {}", init.extended_base_hash);
}

/// Run the ceremony, publish the initialized election and write one file per trustee
pub fn run_keyceremony(
    group: &GroupContext,
    manifest: &Manifest,
    matches: &clap::ArgMatches,
    record: &mut JsonRecord,
    trustees_dir: &Path,
) -> Result<ElectionInitialized, Error> {
    let guardians: u32 = parse_arg(matches, "guardians", "keyceremony");
    let quorum: u32 = parse_arg(matches, "quorum", "keyceremony");
    let device_info = matches.value_of("device-info").unwrap_or_default();

    let config = ElectionConfig::new(
        group,
        manifest,
        guardians,
        quorum,
        matches.is_present("chain"),
        device_info.as_bytes().to_vec(),
    )?;
    let (init, trustees) = run_key_ceremony(group, config, &mut rand::rngs::OsRng)?;

    record.write_election_initialized(&init)?;
    for trustee in &trustees {
        record.write_trustee(trustees_dir, trustee)?;
    }
    info!(
        "wrote {} trustees to {}",
        trustees.len(),
        trustees_dir.display()
    );
    Ok(init)
}
