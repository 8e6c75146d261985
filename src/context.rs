//! Per-operation cancellation and deadline
//!
//! Every collaborator call runs under an `OpContext`. The call is raced
//! against the caller's cancellation token and optional deadline, and
//! loses to whichever fires first.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, BackendResult};

/// Caller-supplied cancellation signal and deadline
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Context bound to an existing cancellation token
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> BackendResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BackendError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run `fut` unless the context is cancelled or its deadline passes first
    pub async fn run<T, F>(&self, fut: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BackendError::Cancelled),
            _ = deadline => Err(BackendError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
