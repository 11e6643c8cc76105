//! Session lifecycle hooks.

use tracing::info;

/// A session lifecycle transition. Ids are borrowed from the store for the
/// duration of the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    Created {
        session_id: &'a str,
        username: &'a str,
    },
    Destroyed {
        session_id: &'a str,
        username: &'a str,
    },
    IdChanged {
        old_id: &'a str,
        new_id: &'a str,
        username: &'a str,
    },
    Expired {
        session_id: &'a str,
        username: &'a str,
    },
}

/// Receives session events. Called synchronously after the store lock is
/// released, so implementations must not block.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent<'_>);
}

/// Logs every event with truncated session ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSessionListener;

impl SessionListener for TracingSessionListener {
    fn on_event(&self, event: &SessionEvent<'_>) {
        match *event {
            SessionEvent::Created {
                session_id,
                username,
            } => info!(session = short_id(session_id), username, "session created"),
            SessionEvent::Destroyed {
                session_id,
                username,
            } => info!(session = short_id(session_id), username, "session destroyed"),
            SessionEvent::IdChanged {
                old_id,
                new_id,
                username,
            } => info!(
                old_session = short_id(old_id),
                new_session = short_id(new_id),
                username,
                "session id changed"
            ),
            SessionEvent::Expired {
                session_id,
                username,
            } => info!(session = short_id(session_id), username, "session expired"),
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("abcdefghijkl"), "abcdefgh");
        assert_eq!(short_id("abc"), "abc");
    }
}
