use crate::client::{Api, ApiResponse};
use log::debug;
use std::time::{Duration, Instant};

/// `status` values the backend reports while serving traffic. An absent
/// status field is treated as healthy; only an explicit unexpected value
/// marks the probe unhealthy.
pub const UP_TOKENS: &[&str] = &["healthy", "ok", "running"];

pub const HEALTH_PATH: &str = "/health";

/// Interpret one `/health` response. Returns the reason when unhealthy.
pub fn interpret(response: &ApiResponse) -> Result<(), String> {
    if !response.ok {
        if response.error.is_empty() {
            return Err("health request failed".to_string());
        }
        return Err(response.error.clone());
    }
    if let Some(map) = response.payload.as_object() {
        if let Some(status) = map.get("status").and_then(|v| v.as_str()) {
            let status = status.trim().to_lowercase();
            if !status.is_empty() && !UP_TOKENS.contains(&status.as_str()) {
                return Err(format!("unexpected health status={}", status));
            }
        }
    }
    Ok(())
}

/// Single health probe.
pub async fn health_once(api: &dyn Api, call_timeout: Duration) -> Result<(), String> {
    let response = api.get_json(HEALTH_PATH, call_timeout).await;
    interpret(&response)
}

/// Poll `/health` until it passes or `timeout` elapses. Always probes at
/// least once. Returns (healthy, elapsed, last detail).
pub async fn wait_healthy(
    api: &dyn Api,
    timeout: Duration,
    poll: Duration,
    call_timeout: Duration,
) -> (bool, Duration, String) {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut last = String::from("not probed");
    loop {
        match health_once(api, call_timeout).await {
            Ok(()) => return (true, started.elapsed(), "healthy".to_string()),
            Err(detail) => {
                debug!("health probe failed: {}", detail);
                last = detail;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(poll).await;
    }
    (false, started.elapsed(), last)
}
