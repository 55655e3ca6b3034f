//! Blocking GET with a bounded timeout and at most one retry.

use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use sweatbox_core::ExternalSourceError;

pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    use anyhow::Context;
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sweatbox/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Fetch `url` with `params` and decode the body as JSON.
pub fn get_json(client: &Client, url: &str, params: &[(&str, String)], retries: u8) -> Result<Value, ExternalSourceError> {
    let mut last = ExternalSourceError::Transport("no attempt made".into());
    for attempt in 0..=retries.min(1) {
        match get_once(client, url, params) {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt < retries.min(1) => {
                tracing::debug!("GET {} failed ({}), retrying once", url, err);
                last = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last)
}

fn get_once(client: &Client, url: &str, params: &[(&str, String)]) -> Result<Value, ExternalSourceError> {
    let response = client.get(url).query(params).send().map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExternalSourceError::Http(status.as_u16()));
    }
    response
        .json::<Value>()
        .map_err(|err| ExternalSourceError::Decode(err.to_string()))
}

fn classify(err: reqwest::Error) -> ExternalSourceError {
    if err.is_timeout() {
        ExternalSourceError::Timeout
    } else {
        ExternalSourceError::Transport(err.to_string())
    }
}

fn is_retryable(err: &ExternalSourceError) -> bool {
    match err {
        ExternalSourceError::Timeout | ExternalSourceError::Transport(_) => true,
        ExternalSourceError::Http(code) => *code >= 500 || *code == 429,
        ExternalSourceError::Decode(_) | ExternalSourceError::Disabled => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(is_retryable(&ExternalSourceError::Timeout));
        assert!(is_retryable(&ExternalSourceError::Http(503)));
        assert!(!is_retryable(&ExternalSourceError::Http(404)));
        assert!(!is_retryable(&ExternalSourceError::Decode("x".into())));
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let client = build_client(Duration::from_millis(200)).unwrap();
        let err = get_json(&client, "http://127.0.0.1:9/none", &[], 0).unwrap_err();
        assert!(matches!(err, ExternalSourceError::Transport(_) | ExternalSourceError::Timeout));
    }
}
