// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parallel search for the bit flips that satisfy a predicate
//!
//! Candidates are searched shell by shell: every combination at Hamming
//! distance 1, then 2, up to the maximum distance. Each shell's id space
//! `[0, C(bits, distance))` is split into contiguous ranges, one per worker
//! thread. Workers stop cooperatively once any of them finds a match.

use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::debug;
use parking_lot::Mutex;

use crate::combination::{binomial, UniqueUnorderedCombination};
use crate::error::{BruteForceError, InitError};
use crate::iterator::UniqueUnorderedCombinationIterator;

/// Smallest shell slice worth a dedicated worker.
pub const MIN_ITERATIONS_PER_WORKER: u64 = 10_000;

/// Searches for bit flips of `initial_data` accepted by `check`.
///
/// `init` builds one private context per worker (a prepared hasher, a
/// scratch buffer, ...) that `check` receives mutably.
pub struct BruteForcer<'a, C, I, F> {
    initial_data: &'a [u8],
    init: I,
    check: F,
    max_concurrency: usize,
    min_iterations_per_worker: u64,
    _ctx: PhantomData<fn() -> C>,
}

impl<'a, C, I, F> BruteForcer<'a, C, I, F>
where
    I: Fn() -> Result<C, InitError> + Sync,
    F: Fn(&mut C, &[u8]) -> bool + Sync,
{
    pub fn new(initial_data: &'a [u8], init: I, check: F) -> Self {
        Self {
            initial_data,
            init,
            check,
            max_concurrency: 0,
            min_iterations_per_worker: MIN_ITERATIONS_PER_WORKER,
            _ctx: PhantomData,
        }
    }

    /// Cap the number of worker threads; 0 means no cap.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn min_iterations_per_worker(mut self, iterations: u64) -> Self {
        self.min_iterations_per_worker = iterations.max(1);
        self
    }

    /// Search up to `max_distance` flipped bits.
    ///
    /// Returns the empty combination if `initial_data` already passes, and
    /// `None` if no combination within the distance does.
    pub fn run(&self, max_distance: u64) -> Result<Option<UniqueUnorderedCombination>, BruteForceError> {
        let mut ctx = (self.init)().map_err(|e| BruteForceError::Init(e.to_string()))?;
        if (self.check)(&mut ctx, self.initial_data) {
            return Ok(Some(UniqueUnorderedCombination::default()));
        }

        let bits = self.initial_data.len() as u64 * 8;
        for distance in 1..=max_distance.min(bits) {
            let count = shell_size(bits, distance)?;
            let workers = self.worker_count(count);
            debug!(
                "brute force: distance {} has {} combinations over {} workers",
                distance, count, workers
            );
            if let Some(found) = self.search_shell(bits, distance, count, workers)? {
                debug!("brute force: found {} at distance {}", found, distance);
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn worker_count(&self, combinations: u64) -> u64 {
        let parallelism = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1) as u64;
        let mut workers = parallelism
            .min(combinations / self.min_iterations_per_worker)
            .max(1);
        if self.max_concurrency > 0 {
            workers = workers.min(self.max_concurrency as u64);
        }
        workers
    }

    fn search_shell(
        &self,
        bits: u64,
        distance: u64,
        count: u64,
        workers: u64,
    ) -> Result<Option<UniqueUnorderedCombination>, BruteForceError> {
        let found = AtomicBool::new(false);
        let result: Mutex<Option<UniqueUnorderedCombination>> = Mutex::new(None);
        let piece = count / workers;

        let errors: Vec<String> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let start = i * piece;
                    let end = if i == workers - 1 { count } else { start + piece };
                    debug!("brute force: worker {} takes ids {}..{}", i, start, end);
                    let (found, result) = (&found, &result);
                    scope.spawn(move || self.work(bits, distance, start, end, found, result))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(_) => Some("worker panicked".to_string()),
                })
                .collect()
        });

        if !errors.is_empty() {
            return Err(BruteForceError::Workers { distance, errors });
        }
        Ok(result.into_inner())
    }

    fn work(
        &self,
        bits: u64,
        distance: u64,
        start: u64,
        end: u64,
        found: &AtomicBool,
        result: &Mutex<Option<UniqueUnorderedCombination>>,
    ) -> Result<(), String> {
        let mut ctx = (self.init)()
            .map_err(|e| format!("init failed for combination ids {}..{}: {}", start, end, e))?;
        let mut data = self.initial_data.to_vec();
        let mut iter = UniqueUnorderedCombinationIterator::new(distance, bits);
        iter.set_combination_id(u128::from(start));

        for _ in start..end {
            // Relaxed: a few extra candidates after a match are harmless
            if found.load(Ordering::Relaxed) {
                return Ok(());
            }
            iter.apply_bit_flips(&mut data);
            if (self.check)(&mut ctx, &data) {
                let mut slot = result.lock();
                if slot.is_none() {
                    *slot = Some(iter.get_combination());
                }
                found.store(true, Ordering::Relaxed);
                return Ok(());
            }
            iter.apply_bit_flips(&mut data);
            iter.advance();
        }
        Ok(())
    }
}

/// Number of combinations at `distance` flipped bits out of `bits`.
///
/// Fails when the ids of the shell do not fit the `i64` id space.
pub fn shell_size(bits: u64, distance: u64) -> Result<u64, BruteForceError> {
    binomial(bits, distance)
        .and_then(|count| u64::try_from(count).ok())
        .filter(|count| *count < i64::MAX as u64)
        .ok_or(BruteForceError::TooManyCombinations { bits, distance })
}

/// Search up to `max_distance` flipped bits of `initial_data` with the
/// default worker sizing.
pub fn brute_force_bytes<C, I, F>(
    initial_data: &[u8],
    max_distance: u64,
    init: I,
    check: F,
    max_concurrency: usize,
) -> Result<Option<UniqueUnorderedCombination>, BruteForceError>
where
    I: Fn() -> Result<C, InitError> + Sync,
    F: Fn(&mut C, &[u8]) -> bool + Sync,
{
    BruteForcer::new(initial_data, init, check)
        .max_concurrency(max_concurrency)
        .run(max_distance)
}
