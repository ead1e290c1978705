//! Hashing primitives for Arbor.
//!
//! Provides domain-separated BLAKE3 content hashing and a BuzHash rolling
//! hash used to pick content-defined chunk boundaries.
//!
//! All cryptographic operations wrap established libraries; there is no custom
//! cryptography. The rolling hash is not cryptographic and is only used
//! for boundary detection.

pub mod hasher;
pub mod rolling;

pub use hasher::ContentHasher;
pub use rolling::BuzHash;
