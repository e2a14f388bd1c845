//! Consumer-facing handle on a running watch.
//!
//! A session is the whole boundary between an endpoint's watch pipeline and
//! the diff engine: an ordered event channel, an unordered error channel, and
//! a done signal. The endpoint keeps the producing halves ([`SessionHandles`])
//! and drops them once its pipeline has fully drained, which is what closes
//! the consumer's channels.

use crate::error::{Result, TandemError};
use crate::types::ChangeEvent;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Created, not yet registered with the notification source
    Idle,
    /// Receiving and translating notifications
    Subscribed,
    /// Unregistered; flushing already-buffered notifications
    Draining,
    /// Channels closed, nothing more will be delivered
    Closed,
}

/// Producer side of a session, owned by the endpoint pipeline.
pub struct SessionHandles {
    pub events: mpsc::Sender<ChangeEvent>,
    pub errors: mpsc::UnboundedSender<TandemError>,
    pub done: CancellationToken,
    pub state: watch::Sender<WatchState>,
}

impl SessionHandles {
    pub fn set_state(&self, state: WatchState) {
        self.state.send_replace(state);
    }

    /// Drop both data channels, then publish [`WatchState::Closed`].
    pub fn close(self) {
        let Self {
            events,
            errors,
            state,
            ..
        } = self;
        drop(events);
        drop(errors);
        state.send_replace(WatchState::Closed);
    }
}

/// One active subscription producing a [`ChangeEvent`] stream.
///
/// Dropping the session signals done, so an abandoned session never keeps its
/// OS subscription alive.
pub struct WatchSession {
    events: mpsc::Receiver<ChangeEvent>,
    errors: mpsc::UnboundedReceiver<TandemError>,
    done: CancellationToken,
    state: watch::Receiver<WatchState>,
}

impl WatchSession {
    /// Create a session and the handles its producer writes through.
    pub fn channel(event_capacity: usize) -> (Self, SessionHandles) {
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WatchState::Idle);
        let done = CancellationToken::new();

        let session = Self {
            events: event_rx,
            errors: error_rx,
            done: done.clone(),
            state: state_rx,
        };
        let handles = SessionHandles {
            events: event_tx,
            errors: error_tx,
            done,
            state: state_tx,
        };
        (session, handles)
    }

    /// Next event in notification order, `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Next non-fatal error, `None` once the session is closed.
    pub async fn next_error(&mut self) -> Option<TandemError> {
        self.errors.recv().await
    }

    /// Whichever of the two channels yields first; `None` when both are closed.
    pub async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        tokio::select! {
            Some(event) = self.events.recv() => Some(Ok(event)),
            Some(err) = self.errors.recv() => Some(Err(err)),
            else => None,
        }
    }

    /// Signal done. The pipeline stops accepting notifications, finishes what
    /// it has buffered, then closes both channels. Signalling twice is a no-op.
    pub fn close(&self) {
        self.done.cancel();
    }

    pub fn is_closing(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Wait until the pipeline has closed both channels.
    pub async fn closed(&mut self) {
        // An Err means the producer side is gone, which also means closed.
        let _ = self
            .state
            .wait_for(|state| *state == WatchState::Closed)
            .await;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("state", &self.state())
            .field("closing", &self.is_closing())
            .finish()
    }
}
