use crate::client::{Api, ApiResponse};
use crate::harness::types::{CheckResult, CheckStatus};
use log::warn;
use std::time::{Duration, Instant};

pub const PRIMARY_PATH: &str = "/api/universe/list";
pub const FALLBACK_PATH: &str = "/api/universe";

/// Why a failed listing call is worth retrying on the fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The route does not exist on this backend build.
    NotFound,
    /// The route is shadowed by a conflicting registration.
    RouteCollision,
}

/// Decide whether a primary-listing failure should trigger the fallback
/// path. Anything that is not clearly a routing problem gets no retry.
pub fn classify_listing_error(status: Option<u16>, error: &str) -> Option<FallbackReason> {
    if status == Some(404) {
        return Some(FallbackReason::NotFound);
    }
    let text = error.to_lowercase();
    if text.contains("not found") || text.contains("404") {
        return Some(FallbackReason::NotFound);
    }
    if text.contains("collision") || text.contains("conflict") {
        return Some(FallbackReason::RouteCollision);
    }
    None
}

fn describe(response: &ApiResponse) -> String {
    if response.error.is_empty() {
        "request failed".to_string()
    } else {
        response.error.clone()
    }
}

/// Advisory capability probe. Never reports worse than WARN, so it cannot
/// flip an otherwise passing run to FAIL.
pub async fn check(api: &dyn Api, call_timeout: Duration) -> CheckResult {
    let started = Instant::now();
    let primary = api.get_json(PRIMARY_PATH, call_timeout).await;
    if primary.ok {
        return CheckResult::new(
            "universe",
            CheckStatus::Pass,
            &format!("GET {}", PRIMARY_PATH),
            "ok",
            started.elapsed().as_millis() as u64,
        );
    }

    match classify_listing_error(primary.status, &primary.error) {
        Some(reason) => {
            warn!(
                "universe listing failed on {} ({:?}), retrying {}",
                PRIMARY_PATH, reason, FALLBACK_PATH
            );
            let fallback = api.get_json(FALLBACK_PATH, call_timeout).await;
            if fallback.ok {
                CheckResult::new(
                    "universe",
                    CheckStatus::Pass,
                    &format!("GET {}", FALLBACK_PATH),
                    format!("ok via fallback ({:?} on primary)", reason),
                    started.elapsed().as_millis() as u64,
                )
            } else {
                CheckResult::new(
                    "universe",
                    CheckStatus::Warn,
                    &format!("GET {}", PRIMARY_PATH),
                    format!(
                        "primary failed ({}), fallback failed ({})",
                        describe(&primary),
                        describe(&fallback)
                    ),
                    started.elapsed().as_millis() as u64,
                )
            }
        }
        None => CheckResult::new(
            "universe",
            CheckStatus::Warn,
            &format!("GET {}", PRIMARY_PATH),
            describe(&primary),
            started.elapsed().as_millis() as u64,
        ),
    }
}
