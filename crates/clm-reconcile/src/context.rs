//! Reconcile context - cancellation and deadline for one pass
//!
//! Every collaborator call made by a subreconciler goes through
//! [`ReconcileContext::run`], so a cancelled or timed-out pass fails fast
//! instead of waiting on in-flight I/O.

use crate::error::{ReconcileError, ReconcileResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancels every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl ReconcileContext {
    /// A cancellable context and the handle that cancels it.
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                cancelled: rx,
                deadline: None,
            },
        )
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::new().1
    }

    /// Derive a context that also expires after `timeout`. An earlier
    /// existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancelled: self.cancelled.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> ReconcileResult<()> {
        if *self.cancelled.borrow() {
            return Err(ReconcileError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ReconcileError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run a collaborator call bounded by this context.
    pub async fn run<F, T, E>(&self, fut: F) -> ReconcileResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ReconcileError>,
    {
        self.check()?;

        let mut cancelled = self.cancelled.clone();
        let deadline = self.deadline;

        tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => Err(ReconcileError::Cancelled),
            _ = wait_deadline(deadline) => Err(ReconcileError::DeadlineExceeded),
            result = fut => result.map_err(Into::into),
        }
    }

    /// Sleep unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> ReconcileResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok::<_, ReconcileError>(())
        })
        .await
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    // A dropped handle can no longer cancel.
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
