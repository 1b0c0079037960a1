//! Bounded display buffer
//!
//! Holds the ordered, display-ready transcript items for one session and
//! fans changes out to subscribers (one writer, many readers). Items are
//! append-only; the oldest are evicted once the buffer is full.

mod content;
mod item;

pub use content::{BufferStatistics, BufferSubscription, ContentBuffer};
pub use item::{DisplayItem, ItemType, MathFragment, Speaker, WordTiming};
