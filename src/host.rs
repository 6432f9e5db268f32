//! Bridge to the embedding desktop shell.
//!
//! In the hosted deployment the shell owns two functions: a theme setter
//! and a navigator refresh. Standalone builds route the theme flag back
//! through the app event channel and record navigator refreshes in the
//! diagnostics feed.

use crate::event::AppEvent;
use std::sync::{mpsc, Mutex};

pub trait HostBridge: Send + Sync {
    fn set_theme(&self, dark: bool);
    fn refresh_navigator(&self);
}

pub struct ChannelBridge {
    tx: mpsc::Sender<AppEvent>,
    refresh_log: Mutex<Vec<String>>,
}

impl ChannelBridge {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            tx,
            refresh_log: Mutex::new(Vec::new()),
        }
    }

    /// Take the navigator-refresh notes recorded since the last drain.
    pub fn drain_refreshes(&self) -> Vec<String> {
        match self.refresh_log.lock() {
            Ok(mut log) => std::mem::take(&mut *log),
            Err(_) => Vec::new(),
        }
    }
}

impl HostBridge for ChannelBridge {
    fn set_theme(&self, dark: bool) {
        let _ = self.tx.send(AppEvent::SetTheme { dark });
    }

    fn refresh_navigator(&self) {
        if let Ok(mut log) = self.refresh_log.lock() {
            log.push("navigator refresh requested".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_theme_routes_through_event_channel() {
        let (tx, rx) = mpsc::channel();
        let bridge = ChannelBridge::new(tx);
        bridge.set_theme(false);

        let event = rx.try_recv().expect("theme event should be queued");
        assert!(matches!(event, AppEvent::SetTheme { dark: false }));
    }

    #[test]
    fn refresh_calls_are_recorded_and_drained() {
        let (tx, _rx) = mpsc::channel();
        let bridge = ChannelBridge::new(tx);
        bridge.refresh_navigator();
        bridge.refresh_navigator();

        assert_eq!(bridge.drain_refreshes().len(), 2);
        assert!(bridge.drain_refreshes().is_empty());
    }
}
