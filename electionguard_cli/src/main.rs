use clap::{App, AppSettings, Arg, SubCommand};
use electionguard::*;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;

mod command_decrypt;
mod command_e2e;
mod command_encrypt;
mod command_keyceremony;
mod command_tally;
mod command_verify;

use command_decrypt::command_decrypt;
use command_e2e::command_e2e;
use command_encrypt::command_encrypt;
use command_keyceremony::command_keyceremony;
use command_tally::command_tally;
use command_verify::command_verify;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Warn = 0,
    Info = 1,
    Debug = 2,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

fn main() {
    let record_arg = || {
        Arg::with_name("input")
            .long("input")
            .short("i")
            .takes_value(true)
            .required(true)
            .help("Election record directory")
    };
    let nthreads_arg = || {
        Arg::with_name("nthreads")
            .long("nthreads")
            .takes_value(true)
            .help("Number of worker threads - can also be set with EG_NTHREADS")
    };
    let guardian_args = || {
        vec![
            Arg::with_name("guardians")
                .long("guardians")
                .short("n")
                .takes_value(true)
                .default_value("3")
                .help("Number of guardians"),
            Arg::with_name("quorum")
                .long("quorum")
                .short("k")
                .takes_value(true)
                .default_value("2")
                .help("Number of guardians needed to decrypt"),
            Arg::with_name("chain")
                .long("chain")
                .help("Chain confirmation codes on each encrypting device"),
            Arg::with_name("group")
                .long("group")
                .takes_value(true)
                .possible_values(&["production", "tiny"])
                .default_value("production")
                .help("Group parameters; tiny is insecure and for testing only"),
            Arg::with_name("device-info")
                .long("device-info")
                .takes_value(true)
                .default_value("device")
                .help("Device information hashed into the head of every confirmation chain"),
        ]
    };

    let matches = App::new("ElectionGuard CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs and verifies end-to-end verifiable elections")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("keyceremony")
                .about("Run the key ceremony and write the initialized election")
                .arg(
                    Arg::with_name("manifest")
                        .long("manifest")
                        .short("m")
                        .takes_value(true)
                        .required(true)
                        .help("Election manifest in JSON format"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .required(true)
                        .help("Election record directory to create"),
                )
                .arg(
                    Arg::with_name("trustees")
                        .long("trustees")
                        .takes_value(true)
                        .required(true)
                        .help("Directory for the private trustee files"),
                )
                .args(&guardian_args()),
        )
        .subcommand(
            SubCommand::with_name("encrypt")
                .about("Encrypt a directory of plaintext ballots")
                .arg(record_arg())
                .arg(
                    Arg::with_name("ballots")
                        .long("ballots")
                        .short("b")
                        .takes_value(true)
                        .required(true)
                        .help("Directory of plaintext ballots"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("Election record directory to write to, defaults to the input record"),
                )
                .arg(
                    Arg::with_name("invalid")
                        .long("invalid")
                        .takes_value(true)
                        .help("Directory for ballots that fail validation"),
                )
                .arg(
                    Arg::with_name("device")
                        .long("device")
                        .short("d")
                        .takes_value(true)
                        .required(true)
                        .help("Encrypting device name"),
                )
                .arg(
                    Arg::with_name("fixed")
                        .long("fixed")
                        .help("Use a fixed nonce seed so encryption is reproducible (testing only)"),
                )
                .arg(
                    Arg::with_name("check")
                        .long("check")
                        .takes_value(true)
                        .possible_values(&["None", "Verify", "EncryptTwice", "DecryptNonce"])
                        .default_value("None")
                        .help("Extra check done on every encrypted ballot"),
                )
                .arg(
                    Arg::with_name("spoil")
                        .long("spoil")
                        .takes_value(true)
                        .multiple(true)
                        .help("Ids of ballots to submit as spoiled"),
                )
                .arg(nthreads_arg()),
        )
        .subcommand(
            SubCommand::with_name("tally")
                .about("Accumulate the cast ballots of a record into an encrypted tally")
                .arg(record_arg())
                .arg(
                    Arg::with_name("name")
                        .long("name")
                        .takes_value(true)
                        .default_value("tally")
                        .help("Tally id"),
                ),
        )
        .subcommand(
            SubCommand::with_name("decrypt")
                .about("Decrypt the tally and spoiled ballots of a record")
                .arg(record_arg())
                .arg(
                    Arg::with_name("trustees")
                        .long("trustees")
                        .takes_value(true)
                        .required(true)
                        .help("Directory of trustee files"),
                )
                .arg(
                    Arg::with_name("missing")
                        .long("missing")
                        .takes_value(true)
                        .multiple(true)
                        .help("Guardian ids that do not take part; their shares are recovered"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verify an election record")
                .arg(record_arg())
                .arg(nthreads_arg()),
        )
        .subcommand(
            SubCommand::with_name("e2e")
                .about("Run a complete election with random ballots and verify it")
                .arg(
                    Arg::with_name("manifest")
                        .long("manifest")
                        .short("m")
                        .takes_value(true)
                        .required(true)
                        .help("Election manifest in JSON format"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .required(true)
                        .help("Election record directory to create"),
                )
                .arg(
                    Arg::with_name("nballots")
                        .long("nballots")
                        .takes_value(true)
                        .default_value("10")
                        .help("Number of random ballots"),
                )
                .arg(
                    Arg::with_name("missing")
                        .long("missing")
                        .takes_value(true)
                        .multiple(true)
                        .help("Guardian ids left out of decryption"),
                )
                .args(&guardian_args())
                .arg(nthreads_arg()),
        )
        .get_matches();

    let occurrences = matches.occurrences_of("v").min(2) as u8;
    let verbosity = Verbosity::try_from(occurrences).unwrap_or(Verbosity::Debug);
    init_logging(verbosity);

    // Subcommands
    match matches.subcommand() {
        ("keyceremony", Some(matches)) => command_keyceremony(matches),
        ("encrypt", Some(matches)) => command_encrypt(matches),
        ("tally", Some(matches)) => command_tally(matches),
        ("decrypt", Some(matches)) => command_decrypt(matches),
        ("verify", Some(matches)) => command_verify(matches),
        ("e2e", Some(matches)) => command_e2e(matches),
        _ => {}
    }
}

fn logging_config(verbosity: Verbosity) -> Result<Config, String> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l})} {t} - {m}{n}")))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(verbosity.level()))
        .map_err(|e| e.to_string())
}

fn init_logging(verbosity: Verbosity) {
    let result = logging_config(verbosity)
        .and_then(|config| log4rs::init_config(config).map(|_| ()).map_err(|e| e.to_string()));
    if let Err(e) = result {
        eprintln!("electionguard: unable to initialize logging: {}", e);
    }
}

pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.to_string(),
        Err(e) => {
            eprintln!("electionguard: unable to expand {}: {}", input, e);
            std::process::exit(1);
        }
    }
}

/// Print an error and exit with a non-zero status
pub fn fail(command: &str, message: impl std::fmt::Display) -> ! {
    eprintln!("electionguard {}: {}", command, message);
    std::process::exit(1);
}

pub fn group_arg(matches: &clap::ArgMatches) -> GroupContext {
    match matches.value_of("group") {
        Some("tiny") => GroupContext::tiny(),
        _ => GroupContext::production(),
    }
}

pub fn parse_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, command: &str) -> T {
    // Unwrap is OK, every parsed arg has a default value
    let value = matches.value_of(name).unwrap();
    value
        .parse()
        .unwrap_or_else(|_| fail(command, format!("invalid value for --{}: {}", name, value)))
}

pub fn nthreads(matches: &clap::ArgMatches, command: &str) -> usize {
    let explicit = matches.value_of("nthreads").map(|v| {
        v.parse()
            .unwrap_or_else(|_| fail(command, format!("invalid value for --nthreads: {}", v)))
    });
    default_nthreads(explicit)
}

/// The initialized election of a record, with its group and manifest
pub fn load_election(
    record: &JsonRecord,
    command: &str,
) -> (GroupContext, Manifest, ElectionInitialized) {
    let loaded = record.read_election_initialized().and_then(|init| {
        let group = GroupContext::from_constants(&init.config.constants)?;
        let manifest = init.config.manifest()?;
        Ok((group, manifest, init))
    });
    loaded.unwrap_or_else(|e| {
        fail(
            command,
            format!("unable to read election from {}: {}", record.root().display(), e),
        )
    })
}

pub fn read_manifest(path: &str, command: &str) -> Manifest {
    let bytes = std::fs::read(path)
        .unwrap_or_else(|e| fail(command, format!("unable to read {}: {}", path, e)));
    let manifest: Manifest = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| fail(command, format!("unable to parse {}: {}", path, e)));
    if let Err(errors) = validate_manifest(&manifest) {
        for e in &errors {
            eprintln!("  {}", e);
        }
        fail(command, format!("manifest {} is invalid", path));
    }
    manifest
}
