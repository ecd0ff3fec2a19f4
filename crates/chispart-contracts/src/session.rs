use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub jobs_total: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_pending: u64,
    pub batches: u64,
    pub refinements: u64,
    pub refinements_failed: u64,
    pub exports: u64,
}

pub fn write_summary(path: &Path, summary: &SessionSummary) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{write_summary, SessionSummary};

    #[test]
    fn write_summary_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session").join("summary.json");

        let summary = SessionSummary {
            session_id: "session-123".to_string(),
            started_at: "2026-02-19T00:00:00+00:00".to_string(),
            finished_at: "2026-02-19T00:10:00+00:00".to_string(),
            jobs_total: 3,
            jobs_completed: 2,
            jobs_failed: 1,
            batches: 1,
            refinements: 1,
            ..SessionSummary::default()
        };
        write_summary(&path, &summary)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["session_id"], json!("session-123"));
        assert_eq!(parsed["jobs_completed"], json!(2));
        assert_eq!(parsed["exports"], json!(0));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());
        Ok(())
    }
}
