//! Absolute deadline threaded through every outbound call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};

/// An absolute point in time by which a probe must finish.
///
/// Copy it into every call that may block. [`Deadline::run`] drops the
/// wrapped future on expiry, which aborts the in-flight HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Race `fut` against the deadline.
    pub async fn run<F, T>(&self, fut: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::DeadlineExceeded),
        }
    }
}
