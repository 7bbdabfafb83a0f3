use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Events are immutable once appended. `event_type` is a stable dotted name
/// (`"orders.order.placed"`) used for routing and for the realtime feed, so it
/// must never be reused for a different payload shape.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version for `event_type`.
    fn version(&self) -> u32;

    /// Business time at which the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
