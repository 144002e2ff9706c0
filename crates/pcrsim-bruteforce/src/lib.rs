// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hamming-distance brute forcing
//!
//! [`brute_force_bytes`] finds the smallest set of bit flips that makes a
//! byte string pass a predicate, searching all candidates at distance 1,
//! then 2, and so on, across worker threads. [`register`] builds on it to
//! recover register values from an expected PCR after a simulated boot.

pub mod brute_forcer;
pub mod combination;
pub mod error;
pub mod iterator;
pub mod register;

pub use brute_forcer::{brute_force_bytes, shell_size, BruteForcer, MIN_ITERATIONS_PER_WORKER};
pub use combination::{apply_bit_flips, binomial, rank, unrank, UniqueUnorderedCombination};
pub use error::{BruteForceError, InitError, RecoveryError};
pub use iterator::UniqueUnorderedCombinationIterator;
pub use register::{recover_register, Measurement, PcrReplay, RecoveredRegister, RegisterLocation};
