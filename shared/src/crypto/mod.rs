//! Cryptographic utilities
//!
//! Only content hashing is needed: files are identified by their SHA-256 digest.

pub mod hashing;

pub use hashing::sha256;
