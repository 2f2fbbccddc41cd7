/// Source of "now" for reminder runs, in Unix seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Pinned clock used when the host passes an explicit `now`.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Resolve the clock for a request: an explicit `params.now` wins.
pub fn from_params(params: &serde_json::Value) -> Result<Box<dyn Clock>, String> {
    match params.get("now") {
        None | Some(serde_json::Value::Null) => Ok(Box::new(SystemClock)),
        Some(v) => v
            .as_i64()
            .map(|t| Box::new(FixedClock(t)) as Box<dyn Clock>)
            .ok_or_else(|| "now must be an integer unix timestamp".to_string()),
    }
}
