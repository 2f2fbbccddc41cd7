use crate::db;
use chrono::format::{Item, StrftimeItems};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_DATE_FORMAT: &str = "%A, %-d %B %Y, %H:%M UTC";
const HOUR: i64 = 3600;
pub const MAX_OVERDUE_LOOKBACK_HOURS: i64 = 48;
pub const MAX_OVERDUE_LOOKBACK_SECS: i64 = MAX_OVERDUE_LOOKBACK_HOURS * HOUR;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Reminders,
    Messages,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Reminders, SetupSection::Messages];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reminders" => Some(Self::Reminders),
            "messages" => Some(Self::Messages),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reminders => "reminders",
            Self::Messages => "messages",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Reminders => "setup.reminders",
            Self::Messages => "setup.messages",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Reminders => json!({
            "horizonHours": 48,
            "overdueEnabled": false,
            "overdueLookbackHours": 2,
            "retentionDays": 30
        }),
        SetupSection::Messages => json!({
            "siteUrl": "",
            "dateFormat": DEFAULT_DATE_FORMAT,
            "subjectPrefix": ""
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

pub fn is_valid_date_format(fmt: &str) -> bool {
    !fmt.is_empty() && !StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Reminders => match k.as_str() {
                "horizonHours" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 720)?));
                }
                "overdueEnabled" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "overdueLookbackHours" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, MAX_OVERDUE_LOOKBACK_HOURS)?),
                    );
                }
                "retentionDays" => {
                    // 0 keeps records forever.
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 3650)?));
                }
                _ => return Err(format!("unknown reminders field: {}", k)),
            },
            SetupSection::Messages => match k.as_str() {
                "siteUrl" => {
                    let url = parse_string_max(v, k, 300)?;
                    if !url.is_empty()
                        && !url.starts_with("http://")
                        && !url.starts_with("https://")
                    {
                        return Err("siteUrl must start with http:// or https://".into());
                    }
                    obj.insert(
                        k.clone(),
                        Value::String(url.trim_end_matches('/').to_string()),
                    );
                }
                "dateFormat" => {
                    let fmt = parse_string_max(v, k, 80)?;
                    if !is_valid_date_format(&fmt) {
                        return Err("dateFormat is not a valid strftime pattern".into());
                    }
                    obj.insert(k.clone(), Value::String(fmt));
                }
                "subjectPrefix" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 80)?));
                }
                _ => return Err(format!("unknown messages field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed saved value must not block runs.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring invalid saved settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    pub horizon_secs: i64,
    pub overdue_enabled: bool,
    pub overdue_lookback_secs: i64,
    pub retention_days: i64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self::from_section(&default_section(SetupSection::Reminders))
    }
}

impl ReminderSettings {
    fn from_section(v: &Value) -> Self {
        let int = |key: &str, fallback: i64| v.get(key).and_then(Value::as_i64).unwrap_or(fallback);
        Self {
            horizon_secs: int("horizonHours", 48) * HOUR,
            overdue_enabled: v
                .get("overdueEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            overdue_lookback_secs: int("overdueLookbackHours", 2) * HOUR,
            retention_days: int("retentionDays", 30),
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self::from_section(&load_section(conn, SetupSection::Reminders)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
    pub site_url: String,
    pub date_format: String,
    pub subject_prefix: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self::from_section(&default_section(SetupSection::Messages))
    }
}

impl MessageSettings {
    fn from_section(v: &Value) -> Self {
        let text = |key: &str| {
            v.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let date_format = text("dateFormat");
        Self {
            site_url: text("siteUrl"),
            date_format: if is_valid_date_format(&date_format) {
                date_format
            } else {
                DEFAULT_DATE_FORMAT.to_string()
            },
            subject_prefix: text("subjectPrefix"),
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self::from_section(&load_section(conn, SetupSection::Messages)?))
    }
}
