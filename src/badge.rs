//! Delivery boundary between the monitor and the native badge.
//!
//! Values arriving here are untrusted: they are range-checked before any
//! renderer sees them, and none/zero both mean "clear the badge".

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{BadgeError, BadgeResult};
use crate::signal::UnreadSignal;

/// Name of the one-way channel the page side sends unread signals on.
pub const UPDATE_BADGE_CHANNEL: &str = "update-badge";

pub const MAX_BADGE_COUNT: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeState {
    Cleared,
    /// Always within `1..=MAX_BADGE_COUNT`.
    Count(u32),
}

impl BadgeState {
    fn from_count(count: u64) -> BadgeResult<Self> {
        match count {
            0 => Ok(BadgeState::Cleared),
            n if n <= u64::from(MAX_BADGE_COUNT) => Ok(BadgeState::Count(n as u32)),
            n => Err(BadgeError::OutOfRange(n.to_string())),
        }
    }

    pub fn from_signal(signal: &UnreadSignal) -> BadgeResult<Self> {
        match signal.count() {
            None => Ok(BadgeState::Cleared),
            Some(count) => count
                .as_str()
                .parse::<u64>()
                .map_err(|_| BadgeError::OutOfRange(count.to_string()))
                .and_then(Self::from_count),
        }
    }

    /// Validate an untyped payload: a digit string, a non-negative integer,
    /// or `null`.
    pub fn from_payload(payload: &Value) -> BadgeResult<Self> {
        match payload {
            Value::Null => Ok(BadgeState::Cleared),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| BadgeError::InvalidPayload(n.to_string()))
                .and_then(Self::from_count),
            Value::String(_) => {
                let signal: UnreadSignal = serde_json::from_value(payload.clone())
                    .map_err(|e| BadgeError::InvalidPayload(e.to_string()))?;
                Self::from_signal(&signal)
            }
            other => Err(BadgeError::InvalidPayload(other.to_string())),
        }
    }

    /// Text for a dock-style badge label; empty clears it.
    pub fn label(&self) -> String {
        match self {
            BadgeState::Cleared => String::new(),
            BadgeState::Count(n) => n.to_string(),
        }
    }
}

/// Platform side that actually shows the badge.
pub trait BadgeRenderer: Send {
    fn render(&mut self, state: BadgeState) -> BadgeResult<()>;
}

/// Validates incoming values and forwards changes to a renderer.
pub struct BadgeDispatcher<R> {
    renderer: R,
    current: BadgeState,
}

impl<R: BadgeRenderer> BadgeDispatcher<R> {
    pub fn new(renderer: R) -> Self {
        BadgeDispatcher {
            renderer,
            current: BadgeState::Cleared,
        }
    }

    pub fn current(&self) -> BadgeState {
        self.current
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn dispatch(&mut self, signal: &UnreadSignal) {
        let state = BadgeState::from_signal(signal);
        self.apply(state);
    }

    pub fn dispatch_payload(&mut self, payload: &Value) {
        let state = BadgeState::from_payload(payload);
        self.apply(state);
    }

    fn apply(&mut self, state: BadgeResult<BadgeState>) {
        let state = match state {
            Ok(s) => s,
            Err(e) => {
                log::warn!("[badge] ignoring update: {}", e);
                return;
            }
        };
        if state == self.current {
            return;
        }
        // A failed render leaves `current` alone so the next update retries.
        match self.renderer.render(state) {
            Ok(()) => self.current = state,
            Err(e) => log::warn!("[badge] render failed: {}", e),
        }
    }
}

/// A sender usable as the monitor callback, paired with its receiver.
pub fn channel() -> (
    impl FnMut(UnreadSignal) + Send + 'static,
    mpsc::UnboundedReceiver<UnreadSignal>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let send = move |signal: UnreadSignal| {
        if tx.send(signal).is_err() {
            log::debug!("[badge] {} receiver dropped", UPDATE_BADGE_CHANNEL);
        }
    };
    (send, rx)
}

/// Drain `rx` into `dispatcher` until every sender is gone.
pub async fn forward<R: BadgeRenderer>(
    mut rx: mpsc::UnboundedReceiver<UnreadSignal>,
    mut dispatcher: BadgeDispatcher<R>,
) -> BadgeDispatcher<R> {
    while let Some(signal) = rx.recv().await {
        dispatcher.dispatch(&signal);
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::UnreadCount;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        rendered: Vec<BadgeState>,
        fail: bool,
    }

    impl BadgeRenderer for Recorder {
        fn render(&mut self, state: BadgeState) -> BadgeResult<()> {
            if self.fail {
                return Err(BadgeError::Other("dock unavailable".into()));
            }
            self.rendered.push(state);
            Ok(())
        }
    }

    fn count(s: &str) -> UnreadSignal {
        UnreadSignal::Count(UnreadCount::parse(s).unwrap())
    }

    #[test]
    fn signal_to_state() {
        assert_eq!(BadgeState::from_signal(&count("5")).unwrap(), BadgeState::Count(5));
        assert_eq!(BadgeState::from_signal(&count("0")).unwrap(), BadgeState::Cleared);
        assert_eq!(BadgeState::from_signal(&count("0009")).unwrap(), BadgeState::Count(9));
        assert_eq!(
            BadgeState::from_signal(&UnreadSignal::Absent).unwrap(),
            BadgeState::Cleared
        );
        assert!(BadgeState::from_signal(&count("10000")).is_err());
        assert!(BadgeState::from_signal(&count("123456789012345678901234")).is_err());
    }

    #[test]
    fn payload_validation() {
        assert_eq!(BadgeState::from_payload(&json!("12")).unwrap(), BadgeState::Count(12));
        assert_eq!(BadgeState::from_payload(&json!(9999)).unwrap(), BadgeState::Count(9999));
        assert_eq!(BadgeState::from_payload(&json!(null)).unwrap(), BadgeState::Cleared);
        assert_eq!(BadgeState::from_payload(&json!(0)).unwrap(), BadgeState::Cleared);

        assert!(matches!(
            BadgeState::from_payload(&json!(-1)),
            Err(BadgeError::InvalidPayload(_))
        ));
        assert!(matches!(
            BadgeState::from_payload(&json!(2.5)),
            Err(BadgeError::InvalidPayload(_))
        ));
        assert!(matches!(
            BadgeState::from_payload(&json!("five")),
            Err(BadgeError::InvalidPayload(_))
        ));
        assert!(matches!(
            BadgeState::from_payload(&json!({"count": 1})),
            Err(BadgeError::InvalidPayload(_))
        ));
        assert!(matches!(
            BadgeState::from_payload(&json!(10000)),
            Err(BadgeError::OutOfRange(_))
        ));
    }

    #[test]
    fn labels() {
        assert_eq!(BadgeState::Count(3).label(), "3");
        assert_eq!(BadgeState::Cleared.label(), "");
    }

    #[test]
    fn dispatcher_skips_repeats_and_invalid_values() {
        let mut dispatcher = BadgeDispatcher::new(Recorder::default());

        dispatcher.dispatch(&count("3"));
        dispatcher.dispatch(&count("3"));
        dispatcher.dispatch_payload(&json!("lots"));
        dispatcher.dispatch(&count("0"));
        dispatcher.dispatch(&UnreadSignal::Absent);

        assert_eq!(
            dispatcher.renderer().rendered,
            vec![BadgeState::Count(3), BadgeState::Cleared]
        );
        assert_eq!(dispatcher.current(), BadgeState::Cleared);
    }

    #[test]
    fn failed_render_is_retried_on_next_update() {
        let mut dispatcher = BadgeDispatcher::new(Recorder {
            fail: true,
            ..Default::default()
        });
        dispatcher.dispatch(&count("4"));
        assert_eq!(dispatcher.current(), BadgeState::Cleared);

        dispatcher.renderer.fail = false;
        dispatcher.dispatch(&count("4"));
        assert_eq!(dispatcher.current(), BadgeState::Count(4));
    }

    #[tokio::test]
    async fn forward_drains_channel() {
        let (mut send, rx) = channel();
        send(count("2"));
        send(count("7"));
        send(UnreadSignal::Absent);
        drop(send);

        let dispatcher = forward(rx, BadgeDispatcher::new(Recorder::default())).await;

        assert_eq!(
            dispatcher.renderer().rendered,
            vec![BadgeState::Count(2), BadgeState::Count(7), BadgeState::Cleared]
        );
    }
}
