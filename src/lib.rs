pub mod client;
pub mod config;
pub mod harness;
pub mod logging;
pub mod report;
pub mod supervisor;

// Re-export common items
pub use client::{Api, ApiClient, ApiResponse};
pub use config::OpsConfig;
pub use harness::{SmokeHarness, SmokeOptions};
pub use supervisor::Supervisor;
