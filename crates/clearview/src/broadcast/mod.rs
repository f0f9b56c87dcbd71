//! Broadcasting of queue changes to presentation layers.

pub mod item_events;

pub use item_events::{ItemEvent, ItemEventBroadcaster, ItemEventKind};
