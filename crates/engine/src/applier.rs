//! Applying mutations to the target store with retry.
//!
//! Only errors the store classifies as retryable are retried; everything else
//! fails the mutation immediately. Retries back off exponentially between
//! `base_delay_ms` and `max_delay_ms`.

use crate::store::{StoreClient, StoreError};
use std::time::Duration;
use tracing::warn;
use walplayer_core::{CellOp, Mutation, ReplayError, Result};

/// How often and how patiently a rejected mutation is resent to the store.
///
/// Filled from `max_retries`, `retry_base_delay_ms` and `retry_max_delay_ms` in
/// the replay settings. A mutation is sent at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Resends allowed after the first attempt; zero fails on the first
    /// retryable store error.
    pub max_retries: u32,
    /// Wait before the first resend. Doubles for every later resend.
    pub base_delay_ms: u64,
    /// Ceiling on the wait between two resends.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Send each mutation once and surface the first store error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace both waits; `(0, 0)` resends without sleeping.
    pub fn with_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Sleep before resend number `attempt + 1` of a mutation.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // base * 2^attempt, clamped so the shift stays inside a u64
        let factor = 1u64 << attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Counters kept by an [`Applier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Mutations fully applied
    pub mutations: u64,
    /// Operations fully applied
    pub ops: u64,
    /// Retry attempts made
    pub retries: u64,
}

/// Submits mutations to a [`StoreClient`].
pub struct Applier<C> {
    client: C,
    retry: RetryConfig,
    stats: ApplyStats,
}

impl<C: StoreClient> Applier<C> {
    /// Create an applier that owns `client`.
    pub fn new(client: C, retry: RetryConfig) -> Self {
        Applier {
            client,
            retry,
            stats: ApplyStats::default(),
        }
    }

    /// Apply one mutation, retrying retryable store errors.
    ///
    /// Operations are submitted in order. A retry resubmits the whole
    /// mutation; every operation carries an explicit timestamp, so reapplying
    /// one that already landed leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ApplyFailed`] when the store rejects the
    /// mutation permanently or retries are exhausted.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.submit(mutation) {
                Ok(()) => {
                    self.stats.mutations += 1;
                    self.stats.ops += mutation.len() as u64;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.calculate_delay(attempt);
                    attempt += 1;
                    self.stats.retries += 1;
                    warn!(
                        table = %mutation.table,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying mutation"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => {
                    return Err(ReplayError::ApplyFailed {
                        table: mutation.table.clone(),
                        row: mutation.row.clone(),
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn submit(&mut self, mutation: &Mutation) -> std::result::Result<(), StoreError> {
        let table = mutation.table.as_str();
        let row = mutation.row.as_slice();
        for op in &mutation.ops {
            match op {
                CellOp::Put {
                    family,
                    qualifier,
                    timestamp,
                    value,
                } => self
                    .client
                    .put(table, row, family, qualifier, value, *timestamp)?,
                CellOp::DeleteColumn {
                    family,
                    qualifier,
                    timestamp,
                } => self.client.delete(
                    table,
                    row,
                    Some(family.as_slice()),
                    Some(qualifier.as_slice()),
                    Some(*timestamp),
                )?,
                CellOp::DeleteFamily { family, timestamp } => {
                    self.client
                        .delete(table, row, Some(family.as_slice()), None, Some(*timestamp))?
                }
                CellOp::DeleteRow { timestamp } => {
                    self.client.delete(table, row, None, None, Some(*timestamp))?
                }
            }
        }
        Ok(())
    }

    /// Counters since creation.
    pub fn stats(&self) -> ApplyStats {
        self.stats
    }

    /// Retry policy.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// The owned client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Consume the applier, returning its client.
    pub fn into_client(self) -> C {
        self.client
    }
}
