// Boundary calls into the host platform: alerts, page navigation, desktop notifications

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Shown when a key-value write is rejected for lack of space
pub const QUOTA_ALERT: &str =
    "Storage is full (local storage quota reached).\nDelete old data or back it up before continuing.";

/// Icon attached to notifications shown with permission already granted
pub const NOTIFICATION_ICON: &str = "https://cdn-icons-png.flaticon.com/512/2921/2921222.png";

/// A blocking, user-visible warning
pub trait UserAlert: Send + Sync {
    fn alert(&self, message: &str);
}

/// Alerts go to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlert;

impl UserAlert for TracingAlert {
    fn alert(&self, message: &str) {
        warn!(message, "User alert");
    }
}

/// Keeps every alert in memory
#[derive(Debug, Default)]
pub struct RecordingAlert {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl UserAlert for RecordingAlert {
    fn alert(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Message a framed page posts to its parent to switch pages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigateMessage {
    pub action: &'static str,
    pub page: String,
    pub title: String,
}

impl NavigateMessage {
    pub fn new(page: &str, title: &str) -> Self {
        Self {
            action: "navigate",
            page: page.to_string(),
            title: title.to_string(),
        }
    }
}

/// The window a page runs in
pub trait FrameHost: Send + Sync {
    /// Whether the page is embedded in a parent frame
    fn is_framed(&self) -> bool;

    fn post_to_parent(&self, message: &Value);

    fn set_location(&self, page: &str);
}

/// Ask the parent frame to show `page`, or go there directly when not framed
pub fn navigate(host: &dyn FrameHost, page: &str, title: &str) {
    if host.is_framed() {
        match serde_json::to_value(NavigateMessage::new(page, title)) {
            Ok(message) => {
                debug!(page, title, "Posting navigate message to parent frame");
                host.post_to_parent(&message);
            }
            Err(e) => warn!(page, error = %e, "Failed to build navigate message"),
        }
    } else {
        debug!(page, "Navigating directly");
        host.set_location(page);
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    /// Not asked yet
    Default,
    Denied,
}

pub trait NotificationHost: Send + Sync {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> NotificationPermission;

    /// Prompt the user and return their answer
    fn request_permission(&self) -> NotificationPermission;

    fn show(&self, title: &str, body: &str, icon: Option<&str>);
}

/// Show a desktop notification if the user allows it.
///
/// Asks for permission first when it has never been asked. Returns whether a
/// notification was shown.
pub fn notify(host: &dyn NotificationHost, title: &str, body: &str) -> bool {
    if !host.is_supported() {
        warn!("Desktop notifications are not supported on this host");
        return false;
    }

    match host.permission() {
        NotificationPermission::Granted => {
            host.show(title, body, Some(NOTIFICATION_ICON));
            true
        }
        NotificationPermission::Denied => false,
        NotificationPermission::Default => {
            if host.request_permission() == NotificationPermission::Granted {
                info!(title, "Notification permission granted");
                host.show(title, body, None);
                true
            } else {
                false
            }
        }
    }
}
