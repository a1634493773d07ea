use arc_swap::ArcSwap;
use std::sync::Arc;

/// The nick we want, and the nick the server last confirmed.
///
/// Both are published atomically; the supervisor and the session tasks may
/// read or replace them concurrently.
pub(crate) struct Identity {
    desired: ArcSwap<String>,
    current: ArcSwap<String>,
}

impl Identity {
    pub fn new(nick: &str) -> Self {
        Self {
            desired: ArcSwap::from_pointee(nick.to_string()),
            current: ArcSwap::from_pointee(nick.to_string()),
        }
    }

    pub fn desired(&self) -> Arc<String> {
        self.desired.load_full()
    }

    pub fn current(&self) -> Arc<String> {
        self.current.load_full()
    }

    pub fn set_desired(&self, nick: &str) {
        self.desired.store(Arc::new(nick.to_string()));
    }

    pub fn set_current(&self, nick: &str) {
        self.current.store(Arc::new(nick.to_string()));
    }

    /// Whether the confirmed nick differs from the one we asked for.
    pub fn drifted(&self) -> bool {
        **self.desired.load() != **self.current.load()
    }
}
