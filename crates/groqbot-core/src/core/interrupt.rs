use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static CURRENT_TURN: Mutex<Option<CancelToken>> = parking_lot::const_mutex(None);

#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Cooperative cancellation flag shared between a send and its stop control.
///
/// Cancelling never aborts the transport; the stream notices the flag at its
/// next poll and stops delivering fragments.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns a token that is cancelled with this one but can also be
    /// cancelled on its own without affecting this one.
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Cancels this token once `timeout` elapses.
    ///
    /// Total-duration limits are layered on top of a send this way; the core
    /// itself imposes none. Abort the returned handle to disarm the timer.
    pub fn cancel_after(&self, timeout: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token.cancel();
        })
    }
}

/// Initializes the Ctrl+C handler.
///
/// The handler never prints. While a turn is registered with [`watch`], Ctrl+C
/// cancels that turn's token. Otherwise it sets the interrupt flag, and a
/// second Ctrl+C force-exits.
///
/// # Errors
/// Returns an error if the handler cannot be registered.
pub fn init() -> Result<()> {
    ctrlc::set_handler(trigger_ctrl_c).context("Error setting Ctrl+C handler")
}

/// Handles one Ctrl+C press.
pub fn trigger_ctrl_c() {
    if let Some(token) = CURRENT_TURN.lock().as_ref() {
        token.cancel();
        return;
    }
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }
}

/// Checks if an interrupt has been requested outside of a turn.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Resets the interrupt flag.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Routes Ctrl+C to `token` until the returned guard is dropped.
pub fn watch(token: CancelToken) -> TurnGuard {
    *CURRENT_TURN.lock() = Some(token);
    TurnGuard { _private: () }
}

/// Unregisters the watched turn on drop.
#[must_use = "Ctrl+C stops reaching the turn once the guard is dropped"]
pub struct TurnGuard {
    _private: (),
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        CURRENT_TURN.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancelToken::new();
        let stop = token.clone();
        assert!(!token.is_cancelled());
        stop.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_ctrl_c_cancels_watched_turn_only_while_guarded() {
        let token = CancelToken::new();
        {
            let _guard = watch(token.clone());
            trigger_ctrl_c();
            assert!(token.is_cancelled());
            assert!(!is_interrupted());
        }
        assert!(CURRENT_TURN.lock().is_none());
    }

    #[test]
    fn test_child_follows_parent_but_not_the_reverse() {
        let deadline = CancelToken::new();
        let turn = deadline.child();

        turn.cancel();
        assert!(turn.is_cancelled());
        assert!(!deadline.is_cancelled());

        let deadline = CancelToken::new();
        let turn = deadline.child();
        deadline.cancel();
        assert!(turn.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fires_once_timeout_elapses() {
        let token = CancelToken::new();
        let timer = token.cancel_after(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        timer.await.unwrap();
        assert!(token.is_cancelled());
    }
}
