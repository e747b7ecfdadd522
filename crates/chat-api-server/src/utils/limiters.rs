use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::LimitsConfig;

#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("Limiter acquire timeout for op={op} after {waited:?}")]
    Timeout { op: &'static str, waited: Duration },

    #[error("Limiter closed for op={0}")]
    Closed(&'static str),
}

/// Bounds concurrent outbound provider calls
#[derive(Clone)]
pub struct Limiters {
    pub llm_generate: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(cfg: &LimitsConfig) -> Self {
        Self {
            llm_generate: Arc::new(Semaphore::new(cfg.llm_concurrency.max(1))),
            acquire_timeout: Duration::from_millis(cfg.acquire_timeout_ms.max(1)),
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration), LimiterError> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| LimiterError::Timeout {
                op,
                waited: start.elapsed(),
            })?
            .map_err(|_| LimiterError::Closed(op))?;

        Ok((permit, start.elapsed()))
    }

    pub async fn acquire_llm(&self) -> Result<(OwnedSemaphorePermit, Duration), LimiterError> {
        Self::acquire_timed(self.llm_generate.clone(), self.acquire_timeout, "llm_generate").await
    }
}
