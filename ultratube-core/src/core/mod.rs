pub mod events;
pub mod format_selector;
pub mod formatting;
pub mod progress;
pub mod schedule;
