use serde::Serialize;
use serde_json::Value;

use crate::reminders::dispatch::OutboundMessage;
use crate::reminders::model::{NotificationRecord, Override, Recipient};
use crate::reminders::{DueItem, Expansion, RunSummary};

/// Types the host may receive as JSON in IPC results.
pub trait Exportable: Serialize {
    fn export(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Exportable for DueItem {}
impl Exportable for Recipient {}
impl Exportable for NotificationRecord {}
impl Exportable for RunSummary {}
impl Exportable for OutboundMessage {}
impl Exportable for Expansion {}
impl Exportable for Override {}

pub fn export_all<T: Exportable>(items: &[T]) -> Value {
    Value::Array(items.iter().map(Exportable::export).collect())
}
