use jobbot_shared::WorkerId;
use std::env;
use std::time::Duration;

use crate::runtime::RuntimeOptions;

/// Worker replica configuration, read from the environment
#[derive(Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub nats_urls: Vec<String>,
    pub database_url: Option<String>,
    pub step_timeout: Duration,
    pub pause_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            worker_id: env::var("JOBBOT_WORKER_ID")
                .ok()
                .and_then(|s| WorkerId::from_string(&s))
                .unwrap_or_default(),
            worker_name: env::var("JOBBOT_WORKER_NAME")
                .unwrap_or_else(|_| format!("jobbot-worker on {}", host)),
            nats_urls: env::var("JOBBOT_NATS_URLS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_else(|_| vec!["nats://localhost:4222".to_string()]),
            database_url: env::var("JOBBOT_DATABASE_URL").ok(),
            step_timeout: Duration::from_secs(
                env::var("JOBBOT_STEP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            pause_poll_interval: Duration::from_millis(
                env::var("JOBBOT_PAUSE_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

impl WorkerConfig {
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            step_timeout: self.step_timeout,
            pause_poll_interval: self.pause_poll_interval,
            ..Default::default()
        }
    }
}
