pub mod core;
pub mod due_items;
pub mod outbox;
pub mod reminders;
pub mod roster;
pub mod setup;
