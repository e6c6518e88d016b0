//! UI-state signals emitted on state transitions

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum UiSignal {
    LoadingStarted,
    LoadingFinished,
    Error,
    NoSession,
}

impl UiSignal {
    /// event name as the page expects it
    pub fn name(self) -> &'static str {
        match self {
            UiSignal::LoadingStarted => "loading-started",
            UiSignal::LoadingFinished => "loading-finished",
            UiSignal::Error => "error",
            UiSignal::NoSession => "no-session",
        }
    }
}

pub trait UiSignals: Send + Sync {
    fn emit(&self, signal: UiSignal);
}

/// Fans signals out to any number of subscribers
pub struct BroadcastSignals {
    tx: broadcast::Sender<UiSignal>,
}

impl BroadcastSignals {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiSignal> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSignals {
    fn default() -> Self {
        Self::new(32)
    }
}

impl UiSignals for BroadcastSignals {
    fn emit(&self, signal: UiSignal) {
        debug!("emit_state: {}", signal.name());
        // no subscribers is not an error
        let _ = self.tx.send(signal);
    }
}
