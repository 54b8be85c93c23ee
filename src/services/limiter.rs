//! Bounded concurrency for converter processes.
//!
//! Every conversion spawns a full office suite, so the number running at once
//! is capped. Requests over the cap wait for a slot up to a deadline and are
//! turned away afterwards.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::AppConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("Too many conversions in progress. Please retry later.")]
    Busy,

    #[error("Conversion service temporarily unavailable.")]
    Closed,
}

#[derive(Debug)]
pub struct ConversionLimiter {
    semaphore: Arc<Semaphore>,
    max_wait: Duration,
}

impl ConversionLimiter {
    /// Returns `None` when `max_concurrent_conversions` is 0 (unlimited).
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if config.max_concurrent_conversions == 0 {
            return None;
        }
        Some(Self::new(
            config.max_concurrent_conversions,
            Duration::from_secs(config.conversion_queue_wait_secs),
        ))
    }

    pub fn new(max_concurrent: usize, max_wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_wait,
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a conversion slot. A zero wait rejects immediately when full.
    pub async fn acquire(&self) -> Result<ConversionPermit, LimiterError> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(ConversionPermit { _permit: permit });
        }

        if self.max_wait.is_zero() {
            return Err(LimiterError::Busy);
        }

        tracing::debug!("All conversion slots busy, waiting up to {:?}", self.max_wait);
        match tokio::time::timeout(self.max_wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(ConversionPermit { _permit: permit }),
            Ok(Err(_)) => Err(LimiterError::Closed),
            Err(_) => Err(LimiterError::Busy),
        }
    }
}

/// Releases the slot when dropped.
#[must_use]
#[derive(Debug)]
pub struct ConversionPermit {
    _permit: OwnedSemaphorePermit,
}
