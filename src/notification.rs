//! Toasts shown over the panes while background work reports back

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    /// Failures stay up longer than progress messages
    pub fn lifetime(self) -> Duration {
        match self {
            Self::Info | Self::Success => Duration::from_secs(3),
            Self::Warning => Duration::from_secs(4),
            Self::Error => Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    /// How many times the same toast was raised in a row
    pub repeats: u32,
    shown_until: Instant,
}

impl Notification {
    /// Message with a repeat counter when it was raised more than once
    pub fn text(&self) -> String {
        if self.repeats > 1 {
            format!("{} (×{})", self.message, self.repeats)
        } else {
            self.message.clone()
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.shown_until
    }
}

/// Newest first. A toast equal to the newest one bumps its counter and
/// lifetime instead of stacking.
#[derive(Debug, Default)]
pub struct NotificationManager {
    toasts: VecDeque<Notification>,
}

impl NotificationManager {
    pub const MAX_VISIBLE: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&mut self, message: impl Into<String>, level: NotificationLevel) {
        self.notify_at(Instant::now(), message.into(), level);
    }

    pub fn notify_at(&mut self, now: Instant, message: String, level: NotificationLevel) {
        let shown_until = now + level.lifetime();
        if let Some(newest) = self.toasts.front_mut() {
            if newest.level == level && newest.message == message {
                newest.repeats += 1;
                newest.shown_until = shown_until;
                return;
            }
        }
        self.toasts.push_front(Notification {
            message,
            level,
            repeats: 1,
            shown_until,
        });
        self.toasts.truncate(Self::MAX_VISIBLE);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Info);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Success);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Error);
    }

    pub fn update(&mut self) -> bool {
        self.update_at(Instant::now())
    }

    /// Drop expired toasts, true when anything went away
    pub fn update_at(&mut self, now: Instant) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|toast| !toast.is_expired_at(now));
        self.toasts.len() != before
    }

    pub fn current(&self) -> Option<&Notification> {
        self.toasts.front()
    }

    pub fn all(&self) -> impl ExactSizeIterator<Item = &Notification> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_outlive_progress_messages() {
        let mut manager = NotificationManager::new();
        let now = Instant::now();
        manager.notify_at(now, "Opening paper".to_string(), NotificationLevel::Info);
        manager.notify_at(now, "Upload failed".to_string(), NotificationLevel::Error);

        assert!(manager.update_at(now + Duration::from_secs(4)));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().map(|n| n.level), Some(NotificationLevel::Error));
        assert!(manager.update_at(now + Duration::from_secs(6)));
        assert!(manager.is_empty());
    }

    #[test]
    fn repeated_toast_is_counted_not_stacked() {
        let mut manager = NotificationManager::new();
        let now = Instant::now();
        for _ in 0..3 {
            manager.notify_at(now, "A reply is still streaming".to_string(), NotificationLevel::Warning);
        }
        manager.notify_at(now, "Message deleted".to_string(), NotificationLevel::Info);

        let texts: Vec<String> = manager.all().map(Notification::text).collect();
        assert_eq!(
            texts,
            vec!["Message deleted", "A reply is still streaming (×3)"]
        );
    }

    #[test]
    fn repeat_extends_the_lifetime() {
        let mut manager = NotificationManager::new();
        let start = Instant::now();
        manager.notify_at(start, "Copied".to_string(), NotificationLevel::Success);
        manager.notify_at(start + Duration::from_secs(2), "Copied".to_string(), NotificationLevel::Success);

        assert!(!manager.update_at(start + Duration::from_secs(4)));
        assert!(manager.update_at(start + Duration::from_secs(5)));
    }

    #[test]
    fn only_the_newest_few_are_kept() {
        let mut manager = NotificationManager::new();
        for i in 0..10 {
            manager.warn(format!("toast {i}"));
        }
        assert_eq!(manager.len(), NotificationManager::MAX_VISIBLE);
        assert_eq!(manager.current().map(|n| n.message.as_str()), Some("toast 9"));
    }
}
