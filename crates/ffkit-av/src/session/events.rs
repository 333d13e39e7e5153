//! Run events and the kill handle.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::telemetry::{InputCodecData, Progress};

/// Events sent to subscribers while a session runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// The engine was spawned with this command line.
    Start { command_line: String },
    /// Input codec information, emitted once per run.
    CodecData(Vec<InputCodecData>),
    /// A progress report.
    Progress(Progress),
    /// One line of engine stderr.
    Stderr(String),
}

/// Fans events out to every subscriber.
///
/// Each subscriber gets its own unbounded queue, so a slow reader never
/// loses events. Subscribers whose receiver was dropped are pruned on the
/// next send.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn send(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        match subscribers.len() {
            0 => {}
            1 => {
                if subscribers[0].send(event).is_err() {
                    subscribers.clear();
                }
            }
            _ => subscribers.retain(|tx| tx.send(event.clone()).is_ok()),
        }
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        !subscribers.is_empty()
    }
}

/// Kills the process of a running session.
///
/// The handle can be cloned out of a session before calling `run()` and used
/// from another task; it only has an effect while a run is live.
#[derive(Debug, Clone, Default)]
pub struct KillHandle {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl KillHandle {
    /// Kill the live process. Returns false if nothing was running.
    pub fn kill(&self) -> bool {
        match self.slot.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub(crate) fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot.lock() = Some(token.clone());
        token
    }

    pub(crate) fn disarm(&self) {
        self.slot.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_without_run_is_noop() {
        let handle = KillHandle::default();
        assert!(!handle.kill());
        assert!(!handle.is_running());
    }

    #[test]
    fn armed_handle_cancels_token() {
        let handle = KillHandle::default();
        let token = handle.arm();
        let remote = handle.clone();
        assert!(remote.is_running());
        assert!(remote.kill());
        assert!(token.is_cancelled());
        handle.disarm();
        assert!(!remote.kill());
    }

    #[test]
    fn hub_keeps_every_event_for_late_readers() {
        let hub = EventHub::default();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        for i in 0..1000 {
            hub.send(Event::Stderr(i.to_string()));
        }
        drop(hub);

        let mut count = 0;
        while let Ok(Event::Stderr(line)) = first.try_recv() {
            assert_eq!(line, count.to_string());
            count += 1;
        }
        assert_eq!(count, 1000);
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(second.try_recv(), Ok(Event::Stderr(line)) if line == "0"));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = EventHub::default();
        assert!(!hub.has_subscribers());
        let events = hub.subscribe();
        assert!(hub.has_subscribers());
        drop(events);
        assert!(!hub.has_subscribers());
        hub.send(Event::Stderr("nobody listens".into()));
    }

    #[test]
    fn events_serialize_tagged() {
        let event = Event::Start {
            command_line: "ffmpeg -i a.mkv".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["data"]["command_line"], "ffmpeg -i a.mkv");

        let line = serde_json::to_value(Event::Stderr("frame=1".into())).unwrap();
        assert_eq!(line["data"], "frame=1");
    }
}
