#[macro_use]
extern crate serde;

mod ballot;
mod batch;
mod chain;
mod contest_data;
mod decrypt_nonce;
mod decryption;
mod election;
mod elgamal;
mod encrypt;
mod error;
mod group;
mod hash;
mod hashed_elgamal;
mod keygen;
mod lagrange;
mod manifest;
mod nonces;
mod polynomial;
mod pool;
mod precompute;
mod preencrypt;
mod proof;
mod publish;
mod serde_hex;
mod store;
mod tally;
mod trustee;
mod validation;
mod verifier;
mod verify_ballots;
mod verify_decryption;

pub use ballot::*;
pub use batch::*;
pub use chain::*;
pub use contest_data::*;
pub use decrypt_nonce::*;
pub use decryption::*;
pub use election::*;
pub use elgamal::*;
pub use encrypt::*;
pub use error::*;
pub use group::*;
pub use hash::*;
pub use hashed_elgamal::*;
pub use keygen::*;
pub use lagrange::*;
pub use manifest::*;
pub use nonces::*;
pub use polynomial::*;
pub use pool::*;
pub use precompute::*;
pub use preencrypt::*;
pub use proof::*;
pub use publish::*;
pub use serde_hex::*;
pub use store::*;
pub use tally::*;
pub use trustee::*;
pub use validation::*;
pub use verifier::*;
pub use verify_ballots::*;
pub use verify_decryption::*;
