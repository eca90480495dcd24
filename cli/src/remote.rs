//! Timeout and bounded retry around remote console calls.

use dropkeeper_core::config::RetryConfig;
use dropkeeper_core::rcon::failure_text;
use dropkeeper_core::{DropkeeperError, RconClient, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Run `command`, retrying transient failures. Rejected credentials are
/// returned immediately.
pub async fn execute(client: &RconClient, command: &str, policy: &RetryPolicy) -> Result<String> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, client.execute(command)).await {
            Ok(result) => result,
            Err(_) => Err(DropkeeperError::Timeout(format!(
                "{} did not answer within {:?}",
                client.address(),
                policy.timeout
            ))),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                tracing::warn!(
                    server = client.name(),
                    attempt,
                    attempts = policy.attempts,
                    error = %e,
                    "Retrying remote console command"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`execute`], rendering failures as chat text.
pub async fn run_command(client: &RconClient, command: &str, policy: &RetryPolicy) -> String {
    match execute(client, command, policy).await {
        Ok(response) => response,
        Err(e) => failure_text(client.name(), &e),
    }
}
