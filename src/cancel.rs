use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

/// Why a [`CancelToken`] fired.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// [`CancelToken::cancel`] was called.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Cooperative cancellation signal attached to a request.
///
/// Clones share state: cancelling any clone cancels all of them. The engine
/// checks the token before every attempt, while the transport call is in
/// flight, and while sleeping between attempts.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            deadline: None,
        }
    }

    /// Returns a token that also fires once `deadline` passes.
    ///
    /// The returned token shares the explicit-cancel state with `self`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            state: Arc::clone(&self.state),
            deadline: Some(deadline),
        }
    }

    /// Shorthand for [`CancelToken::with_deadline`] relative to now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the token fired, or `None` while it is still live.
    pub fn reason(&self) -> Option<CancelReason> {
        if *self.state.borrow() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes once the token fires.
    pub async fn cancelled(&self) -> CancelReason {
        let explicit = self.wait_explicit();
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = explicit => CancelReason::Cancelled,
                _ = sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                explicit.await;
                CancelReason::Cancelled
            }
        }
    }

    async fn wait_explicit(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives in `self`, so `changed` cannot observe a close.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &*self.state.borrow())
            .field("deadline", &self.deadline)
            .finish()
    }
}
