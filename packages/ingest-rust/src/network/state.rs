//! Channel lifecycle shared between the handle and the socket tasks.
//!
//! Uses `ArcSwap` for lock-free state transitions so `send` can check
//! validity on every call without contending with the reader task.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Channel state.
///
/// State machine: Connecting -> Open -> Closed. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake in progress.
    Connecting,
    /// Frames may be sent.
    Open,
    /// The socket is gone; the handle is invalid.
    Closed { reason: String },
}

/// Tracks channel state and notifies listeners when the channel closes.
#[derive(Debug)]
pub struct ChannelLifecycle {
    state: ArcSwap<ChannelState>,
    closed_signal: watch::Sender<bool>,
}

impl ChannelLifecycle {
    /// Creates a lifecycle in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: ArcSwap::from_pointee(ChannelState::Connecting),
            closed_signal: tx,
        }
    }

    /// Transitions to `Open`. Has no effect once closed.
    pub fn set_open(&self) {
        self.state.rcu(|current| match **current {
            ChannelState::Connecting => Arc::new(ChannelState::Open),
            _ => Arc::clone(current),
        });
    }

    /// Transitions to `Closed`, keeping the first reason recorded.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn close(&self, reason: &str) -> bool {
        let previous = self.state.rcu(|current| match **current {
            ChannelState::Closed { .. } => Arc::clone(current),
            _ => Arc::new(ChannelState::Closed {
                reason: reason.to_string(),
            }),
        });
        let transitioned = !matches!(*previous, ChannelState::Closed { .. });
        if transitioned {
            // Ignore send errors -- receivers may have been dropped
            let _ = self.closed_signal.send(true);
        }
        transitioned
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        ChannelState::clone(&self.state.load())
    }

    /// Returns the close reason if the channel is closed.
    #[must_use]
    pub fn closed_reason(&self) -> Option<String> {
        match &**self.state.load() {
            ChannelState::Closed { reason } => Some(reason.clone()),
            _ => None,
        }
    }

    /// Returns a receiver that flips to `true` when the channel closes.
    #[must_use]
    pub fn closed_receiver(&self) -> watch::Receiver<bool> {
        self.closed_signal.subscribe()
    }
}

impl Default for ChannelLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
