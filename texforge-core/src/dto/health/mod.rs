//! Health DTOs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub running_jobs: usize,
    pub max_concurrent: usize,
    /// Per-job timeout, e.g. `15s` or `1m30s`
    pub compilation_timeout: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthStatus {
    pub fn healthy(running_jobs: usize, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            status: "healthy".to_string(),
            running_jobs,
            max_concurrent,
            compilation_timeout: format_duration(timeout),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Renders a duration compactly, e.g. `15s`, `1m30s` or `500ms`
///
/// Sub-second values use `ms`; anything else is `[<h>h][<m>m]<s>s` with
/// fractional seconds trimmed of trailing zeros.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        let ms = d.as_secs_f64() * 1000.0;
        return format!("{}ms", trim_fraction(ms));
    }

    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = (total % 60) as f64 + f64::from(d.subsec_nanos()) / 1e9;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", trim_fraction(seconds)));
    out
}

fn trim_fraction(value: f64) -> String {
    let formatted = format!("{:.9}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(15)), "15s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_healthy_body() {
        let health = HealthStatus::healthy(2, 5, Duration::from_secs(15));
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["running_jobs"], 2);
        assert_eq!(value["max_concurrent"], 5);
        assert_eq!(value["compilation_timeout"], "15s");
        assert!(value["timestamp"].as_str().is_some());
    }
}
