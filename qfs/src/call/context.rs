//! Per-call context: deadline, cancellation and outgoing metadata
// (c) 2025 qfs contributors

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::client::BearerToken;
use crate::protocol::{
    rpc::Metadata,
    status::{Code, Status},
};

/// Metadata key carrying the caller's credential
pub const AUTHORIZATION: &str = "authorization";

/// The attributes of one call.
///
/// A context is created fresh for each call and consumed by it; it is deliberately not `Clone`.
///
/// ```
/// use std::time::Duration;
/// use qfs::CallContext;
/// let ctx = CallContext::new()
///     .with_timeout(Duration::from_secs(10))
///     .with_metadata("x-request-id", "1234");
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    metadata: Metadata,
}

impl CallContext {
    /// A context with no deadline, no cancellation and no metadata
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline to `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. If there already was one, the earlier of the two applies.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attaches a cancellation token. Cancelling it aborts the call.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Adds an outgoing metadata entry
    #[must_use]
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let _ = self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attaches a bearer credential as `authorization` metadata
    #[must_use]
    pub fn with_bearer_token(self, token: &BearerToken) -> Self {
        self.with_metadata(AUTHORIZATION, token.header_value())
    }

    /// Accessor
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Accessor
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// Splits the context into the metadata to send and the expiry tracker for the call
    pub(crate) fn into_parts(self) -> (Metadata, Expiry) {
        let cancel = self
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        (
            self.metadata,
            Expiry {
                deadline: self.deadline,
                cancel,
            },
        )
    }
}

/// Tracks the deadline and cancellation of one call.
///
/// Every suspension point of a call runs through [`Expiry::run`], so that all of them
/// unblock when the call expires.
#[derive(Debug, Clone)]
pub(crate) struct Expiry {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Expiry {
    /// An expiry which never fires
    #[cfg(test)]
    pub(crate) fn never() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    fn deadline_status() -> Status {
        Status::new(Code::DeadlineExceeded, "deadline exceeded")
    }

    fn cancelled_status() -> Status {
        Status::new(Code::Cancelled, "call cancelled")
    }

    /// Returns an error status if the call has already expired
    pub(crate) fn check(&self) -> Result<(), Status> {
        if self.cancel.is_cancelled() {
            return Err(Self::cancelled_status());
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(Self::deadline_status()),
            _ => Ok(()),
        }
    }

    /// Resolves when the call expires, with the reason
    pub(crate) async fn expired(&self) -> Status {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Self::cancelled_status(),
            () = deadline => Self::deadline_status(),
        }
    }

    /// Runs a future to completion unless the call expires first.
    ///
    /// An already-expired call does not poll the future at all.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Status> {
        self.check()?;
        tokio::select! {
            biased;
            status = self.expired() => {
                trace!("call expired: {status}");
                Err(status)
            }
            out = fut => Ok(out),
        }
    }

    /// Milliseconds until the deadline, if there is one
    pub(crate) fn remaining_ms(&self) -> Option<u64> {
        self.deadline.map(|d| {
            let ms = d.saturating_duration_since(Instant::now()).as_millis();
            u64::try_from(ms).unwrap_or(u64::MAX)
        })
    }
}
