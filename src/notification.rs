//! Cross-platform native OS notifications via notify-rust.
//!
//! - macOS: NSUserNotificationCenter (via mac-notification-sys)
//! - Windows: WinRT toast notifications
//! - Linux: freedesktop D-Bus notifications

use crate::badge::{BadgeRenderer, BadgeState};
use crate::config::{DetectorConfig, APP_ID, APP_NAME};
use crate::error::{BadgeError, BadgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationData {
    pub title: String,
    pub body: String,
    pub count: u32,
}

/// Set the application identity for notifications. Call once at app startup.
pub fn init() {
    #[cfg(target_os = "macos")]
    {
        // Post as our bundle ID so notifications are grouped under the app,
        // not "Terminal".
        if let Err(e) = notify_rust::set_application(APP_ID) {
            log::warn!("[notification] failed to set application identity: {e}");
        }
    }
    #[cfg(not(target_os = "macos"))]
    log::debug!("[notification] using default identity for {}", APP_ID);
}

/// Show a notification. A refusal by the OS (e.g. permission denied) is
/// logged and returned; callers treat it as non-fatal.
pub fn show(data: &NotificationData) -> BadgeResult<()> {
    notify_rust::Notification::new()
        .summary(&data.title)
        .body(&data.body)
        .appname(APP_NAME)
        .show()
        .map(|_| ())
        .map_err(|e| {
            log::warn!("[notification] failed to show (may be blocked by user): {e}");
            BadgeError::Notification(e.to_string())
        })
}

/// Notification to post when the badge moves from `previous` to `next`.
/// Only increases are announced.
pub fn increase_notice(previous: BadgeState, next: BadgeState) -> Option<NotificationData> {
    let before = match previous {
        BadgeState::Cleared => 0,
        BadgeState::Count(n) => n,
    };
    let BadgeState::Count(count) = next else {
        return None;
    };
    if count <= before {
        return None;
    }
    let body = if count == 1 {
        "1 unread message".to_string()
    } else {
        format!("{count} unread messages")
    };
    Some(NotificationData {
        title: APP_NAME.to_string(),
        body,
        count,
    })
}

/// Renderer that posts a desktop notification whenever the count rises.
pub struct NotificationRenderer {
    last: BadgeState,
    enabled: bool,
}

impl NotificationRenderer {
    pub fn new(enabled: bool) -> Self {
        NotificationRenderer {
            last: BadgeState::Cleared,
            enabled,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.notify_on_increase)
    }
}

impl BadgeRenderer for NotificationRenderer {
    fn render(&mut self, state: BadgeState) -> BadgeResult<()> {
        let notice = increase_notice(self.last, state);
        self.last = state;
        match notice {
            Some(data) if self.enabled => show(&data),
            _ => Ok(()),
        }
    }
}
