use chrono::{DateTime, Utc};

/// A fact emitted after a state change has been accepted.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "auth.special_role.assigned").
    fn event_type(&self) -> &'static str;

    /// When the change was accepted.
    fn occurred_at(&self) -> DateTime<Utc>;
}
