//! Ledgerlink domain core.
//!
//! Pure logic shared by every other crate: identifier types, the domain
//! error type, request signing and consent-token encryption for the Open
//! Banking provider, at-rest token encryption, the bank connection state
//! machine, retry backoff arithmetic, transaction normalisation and the
//! credit scoring model. Nothing in here performs I/O.

pub mod backoff;
pub mod connection_state;
pub mod error;
pub mod hashing;
pub mod jwt;
pub mod normalize;
pub mod scoring;
pub mod signing;
pub mod status;
pub mod token_cipher;
pub mod types;
