//! Requeue signal and the subreconciler protocol
//!
//! A subreconciler returns `None` when the scheduler may proceed, or a
//! [`Requeue`] describing why and how the pass should be retried.

use crate::collaborators::ClusterReconciler;
use crate::context::ReconcileContext;
use crate::error::ReconcileError;
use async_trait::async_trait;
use clm_types::Cluster;
use std::fmt;
use std::time::Duration;

/// Result of a reconciliation step that could not finish.
#[derive(Debug)]
pub enum Requeue {
    /// The step failed; the scheduler stops the pass and reports the cause.
    Error(ReconcileError),

    /// The step needs another attempt.
    Retry {
        message: String,
        /// Requested delay before the next attempt.
        delay: Option<Duration>,
        /// Whether the scheduler may stretch the delay with backoff. When
        /// `false` the delay is applied exactly.
        delayed_requeue: bool,
    },
}

impl Requeue {
    pub fn error(err: impl Into<ReconcileError>) -> Self {
        Requeue::Error(err.into())
    }

    /// Message-only retry with no requested delay.
    pub fn message(message: impl Into<String>) -> Self {
        Requeue::Retry {
            message: message.into(),
            delay: None,
            delayed_requeue: false,
        }
    }

    pub fn after(message: impl Into<String>, delay: Duration, delayed_requeue: bool) -> Self {
        Requeue::Retry {
            message: message.into(),
            delay: Some(delay),
            delayed_requeue,
        }
    }
}

impl fmt::Display for Requeue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requeue::Error(err) => write!(f, "error: {}", err),
            Requeue::Retry {
                message,
                delay: Some(delay),
                ..
            } => write!(f, "{} (retry after {:?})", message, delay),
            Requeue::Retry { message, .. } => f.write_str(message),
        }
    }
}

/// One step of cluster reconciliation.
///
/// A step reads the process group directory off `cluster`, mutates it in
/// memory as needed and writes it back only if it changed. Steps must be
/// safe to re-run with no progress until their inputs change.
#[async_trait]
pub trait Subreconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        reconciler: &ClusterReconciler,
        cluster: &mut Cluster,
    ) -> Option<Requeue>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushError;

    #[test]
    fn test_message_has_no_delay() {
        let requeue = Requeue::message("errors occurred");
        assert!(matches!(
            requeue,
            Requeue::Retry {
                delay: None,
                delayed_requeue: false,
                ..
            }
        ));
        assert_eq!(requeue.to_string(), "errors occurred");
    }

    #[test]
    fn test_error_signal() {
        let requeue = Requeue::error(PushError::Rejected("nope".into()));
        assert!(matches!(requeue, Requeue::Error(_)));
        assert!(requeue.to_string().starts_with("error:"));
    }

    #[test]
    fn test_delayed_retry() {
        let requeue = Requeue::after("waiting", Duration::from_secs(15), true);
        assert!(matches!(
            requeue,
            Requeue::Retry {
                delay: Some(delay),
                delayed_requeue: true,
                ..
            } if delay == Duration::from_secs(15)
        ));
        assert_eq!(requeue.to_string(), "waiting (retry after 15s)");
    }
}
