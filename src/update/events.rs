//! Notifications emitted by an update session
//!
//! The session never presents anything itself. Hosts observe progress by
//! installing an [`EventSink`], either a callback or a channel.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::version::Version;
use crate::core::error::{ErrorKind, UpdateError};

/// Something a host may want to show the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    UpdateAvailable {
        version: Version,
    },
    Error {
        kind: ErrorKind,
        message: String,
        /// The installation may be broken; the host should tell the user
        unrecoverable: bool,
    },
    Installed {
        version: Version,
    },
}

impl UpdateEvent {
    pub fn from_error(error: &UpdateError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
            unrecoverable: error.is_unrecoverable(),
        }
    }
}

/// Event callback type
pub type EventCallback = Arc<dyn Fn(UpdateEvent) + Send + Sync>;

/// Destination for session events
#[derive(Clone, Default)]
pub enum EventSink {
    /// Events are dropped
    #[default]
    Discard,
    Callback(EventCallback),
    Channel(mpsc::UnboundedSender<UpdateEvent>),
}

impl EventSink {
    pub fn callback(f: impl Fn(UpdateEvent) + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(f))
    }

    /// Sink paired with the receiving end of a new channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UpdateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(tx), rx)
    }

    pub fn emit(&self, event: UpdateEvent) {
        match self {
            Self::Discard => {}
            Self::Callback(f) => f(event),
            Self::Channel(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!("Event receiver dropped");
                }
            }
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discard => "Discard",
            Self::Callback(_) => "Callback",
            Self::Channel(_) => "Channel",
        };
        f.debug_tuple("EventSink").field(&name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_error_event_carries_kind_and_severity() {
        let err = UpdateError::Rollback {
            install: "rename failed".to_string(),
            rollback: "restore failed".to_string(),
        };
        match UpdateEvent::from_error(&err) {
            UpdateEvent::Error {
                kind,
                unrecoverable,
                ..
            } => {
                assert_eq!(kind, ErrorKind::Rollback);
                assert!(unrecoverable);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_callback_sink_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            EventSink::callback(move |e| seen.lock().unwrap().push(e))
        };

        sink.emit(UpdateEvent::Installed {
            version: Version::new(1, 1, 0),
        });

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(UpdateEvent::UpdateAvailable {
            version: Version::new(2, 0, 0),
        });
        assert!(matches!(
            rx.recv().await,
            Some(UpdateEvent::UpdateAvailable { .. })
        ));

        drop(rx);
        sink.emit(UpdateEvent::Installed {
            version: Version::new(2, 0, 0),
        });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(UpdateEvent::Installed {
            version: Version::new(1, 2, 3),
        })
        .unwrap();
        assert_eq!(json["event"], "installed");
    }
}
