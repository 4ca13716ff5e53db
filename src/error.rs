//! Error type carried by streams and surfaced by the engine.
//!
//! [`RxError`] covers three families:
//!
//! - **Terminal stream errors**: user failures travelling as a value in
//!   [`Notification::Error`](crate::Notification::Error), never as a panic.
//! - **Contract violations**: reentrant delivery, double subscribe, slot
//!   exhaustion, a concurrent-only consumer on a cooperative scheduler. These are
//!   delivered to the offending subscriber only.
//! - **Cancellation**: not an error while streaming, but [`Subscriber::wait`](crate::Subscriber::wait)
//!   reports [`RxError::Unsubscribed`] for a subscription that was canceled rather
//!   than completed or failed.
//!
//! `RxError` is `Clone` because a single terminal error is fanned out to every
//! subscriber of a multicast subject.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by streams and by the engine itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum RxError {
    /// The subscription was canceled before it completed or failed.
    #[error("subscription canceled")]
    Unsubscribed,

    /// A value arrived while the previous delivery to the same observer was still running.
    #[error("observer busy: reentrant delivery rejected")]
    ObserverBusy,

    /// A link or connectable was subscribed twice.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// Every subscription slot of a subject is in use.
    #[error("out of subscription slots (max {max})")]
    OutOfSubscriptions {
        /// Configured slot limit.
        max: usize,
    },

    /// A consumer that needs parallel progress was driven by a cooperative scheduler.
    #[error("{operator} requires a concurrent scheduler")]
    ConcurrentSchedulerRequired {
        /// Name of the consumer that rejected the scheduler.
        operator: &'static str,
    },

    /// No item arrived within the configured window.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The window that elapsed.
        timeout: Duration,
    },

    /// Stream failed with a plain message.
    #[error("stream failed: {error}")]
    Failed {
        /// The failure message.
        error: String,
    },

    /// Stream failed with a foreign error.
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl RxError {
    /// Builds a [`RxError::Failed`] from a message.
    ///
    /// # Example
    /// ```
    /// use rill::RxError;
    ///
    /// let err = RxError::failed("boom");
    /// assert_eq!(err.to_string(), "stream failed: boom");
    /// ```
    pub fn failed(error: impl Into<String>) -> Self {
        RxError::Failed {
            error: error.into(),
        }
    }

    /// Wraps a foreign error.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RxError::Other(Arc::new(error))
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rill::RxError;
    ///
    /// assert_eq!(RxError::Unsubscribed.as_label(), "rx_unsubscribed");
    /// assert_eq!(RxError::failed("x").as_label(), "rx_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RxError::Unsubscribed => "rx_unsubscribed",
            RxError::ObserverBusy => "rx_observer_busy",
            RxError::AlreadySubscribed => "rx_already_subscribed",
            RxError::OutOfSubscriptions { .. } => "rx_out_of_subscriptions",
            RxError::ConcurrentSchedulerRequired { .. } => "rx_concurrent_scheduler_required",
            RxError::Timeout { .. } => "rx_timeout",
            RxError::Failed { .. } => "rx_failed",
            RxError::Other(_) => "rx_other",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RxError::Unsubscribed => "unsubscribed".to_string(),
            RxError::ObserverBusy => "reentrant delivery".to_string(),
            RxError::AlreadySubscribed => "double subscribe".to_string(),
            RxError::OutOfSubscriptions { max } => format!("slots exhausted: max={max}"),
            RxError::ConcurrentSchedulerRequired { operator } => {
                format!("cooperative scheduler rejected by {operator}")
            }
            RxError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            RxError::Failed { error } => format!("error: {error}"),
            RxError::Other(e) => format!("error: {e}"),
        }
    }

    /// Indicates whether the error reports misuse of the engine rather than a stream failure.
    ///
    /// # Example
    /// ```
    /// use rill::RxError;
    ///
    /// assert!(RxError::ObserverBusy.is_contract_violation());
    /// assert!(!RxError::failed("boom").is_contract_violation());
    /// ```
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            RxError::ObserverBusy
                | RxError::AlreadySubscribed
                | RxError::OutOfSubscriptions { .. }
                | RxError::ConcurrentSchedulerRequired { .. }
        )
    }
}
