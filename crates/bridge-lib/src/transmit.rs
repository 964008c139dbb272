//! Transmitter seam
//!
//! The bridge hands each batch to a [`Transmitter`] and only needs to know
//! whether it was accepted. Credentials and wire formats live behind the
//! trait.

use crate::models::NormalizedPoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SendOutcome {
    Success,
    /// Rejected by the endpoint or the connection failed
    Failure(String),
    /// No answer within the allowed time; delivery state unknown
    Timeout(String),
}

impl SendOutcome {
    pub fn failure(detail: impl fmt::Display) -> Self {
        SendOutcome::Failure(detail.to_string())
    }

    pub fn timeout(detail: impl fmt::Display) -> Self {
        SendOutcome::Timeout(detail.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SendOutcome::Timeout(_))
    }
}

/// Delivers batches to the downstream store.
///
/// Implementations must not retain or mutate the batch and should return
/// within a bounded time; the scheduler enforces its own send timeout.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn send(&self, batch: &[NormalizedPoint]) -> SendOutcome;

    /// Short name used in logs
    fn name(&self) -> &str {
        "transmitter"
    }
}

/// Number of distinct signals in a batch
pub fn series_count(batch: &[NormalizedPoint]) -> usize {
    let mut ids: Vec<&str> = batch.iter().map(|p| p.signal_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}
