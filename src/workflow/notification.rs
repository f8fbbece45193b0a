use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default auto-dismiss interval.
pub const DEFAULT_TTL_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Success,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Error => write!(f, "error"),
        }
    }
}

/// A transient status message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Holds at most one notification. A new one replaces the old and restarts
/// the dismiss timer; expiry is evaluated lazily on read.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    ttl: Duration,
    current: Option<Notification>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}

impl NotificationCenter {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX)),
            current: None,
        }
    }

    pub fn success(&mut self, message: impl Into<String>) -> &Notification {
        self.push_at(NotificationKind::Success, message, Utc::now())
    }

    pub fn error(&mut self, message: impl Into<String>) -> &Notification {
        self.push_at(NotificationKind::Error, message, Utc::now())
    }

    pub fn push_at(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &Notification {
        let message = message.into();
        tracing::debug!(%kind, %message, "notification raised");
        self.current.insert(Notification {
            kind,
            message,
            expires_at: now + self.ttl,
        })
    }

    /// The notification still on screen, if any.
    pub fn active(&self) -> Option<&Notification> {
        self.active_at(Utc::now())
    }

    pub fn active_at(&self, now: DateTime<Utc>) -> Option<&Notification> {
        self.current.as_ref().filter(|n| !n.is_expired_at(now))
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
impl NotificationCenter {
    /// Most recent notification regardless of expiry.
    pub(crate) fn latest(&self) -> Option<&Notification> {
        self.current.as_ref()
    }
}
