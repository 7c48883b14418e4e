//! ============================================================================
//! Gate Actuator - HTTP client for the gate microcontroller
//! ============================================================================
//! The microcontroller drives the barrier motor and answers `200 OK` once the
//! command was accepted. Anything else is a rejection; transport errors and
//! timeouts mean the device is unreachable. No retries.
//! ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::types::{ControlAction, GateError};

/// Default request timeout for actuator calls
pub const DEFAULT_ACTUATOR_TIMEOUT_SECS: u64 = 3;

/// Answer from the actuator for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorResponse {
    /// Physical transition confirmed
    Success,
    /// Device answered, but not with success
    Rejected(String),
    /// No answer (connection error or timeout)
    Unreachable(String),
}

impl ActuatorResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ActuatorResponse::Success)
    }

    /// Failure as a [`GateError`], `None` on success
    pub fn into_error(self) -> Option<GateError> {
        match self {
            ActuatorResponse::Success => None,
            ActuatorResponse::Rejected(msg) => Some(GateError::ActuatorRejected(msg)),
            ActuatorResponse::Unreachable(msg) => Some(GateError::ActuatorUnreachable(msg)),
        }
    }
}

/// Something that can physically open or close the gate
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn send(&self, action: ControlAction) -> ActuatorResponse;
}

/// Actuator reached over plain HTTP GET requests
pub struct HttpActuator {
    client: reqwest::Client,
    base_url: String,
    open_path: String,
    close_path: String,
}

impl HttpActuator {
    pub fn new(base_url: &str, open_path: &str, close_path: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build actuator HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            open_path: open_path.to_string(),
            close_path: close_path.to_string(),
        })
    }

    pub fn from_config(config: &GateConfig) -> Result<Self> {
        Self::new(
            &config.actuator_url,
            &config.open_path,
            &config.close_path,
            config.actuator_timeout,
        )
    }

    /// Full URL for an action
    pub fn url_for(&self, action: ControlAction) -> String {
        let path = match action {
            ControlAction::Open => &self.open_path,
            ControlAction::Close => &self.close_path,
        };
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn send(&self, action: ControlAction) -> ActuatorResponse {
        let url = self.url_for(action);
        debug!("Sending '{}' to actuator: {}", action, url);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                info!("Actuator confirmed '{}'", action);
                ActuatorResponse::Success
            }
            Ok(resp) => {
                warn!("Actuator rejected '{}': HTTP {}", action, resp.status());
                ActuatorResponse::Rejected(format!("HTTP {}", resp.status()))
            }
            Err(e) => {
                warn!("Actuator unreachable for '{}': {}", action, e);
                ActuatorResponse::Unreachable(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let actuator = HttpActuator::new(
            "http://10.0.0.5/",
            "/gate/open",
            "/gate/close",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(actuator.url_for(ControlAction::Open), "http://10.0.0.5/gate/open");
        assert_eq!(actuator.url_for(ControlAction::Close), "http://10.0.0.5/gate/close");
    }

    #[test]
    fn test_response_errors() {
        assert!(ActuatorResponse::Success.into_error().is_none());
        assert!(matches!(
            ActuatorResponse::Rejected("HTTP 500".into()).into_error(),
            Some(GateError::ActuatorRejected(_))
        ));
        assert!(matches!(
            ActuatorResponse::Unreachable("timeout".into()).into_error(),
            Some(GateError::ActuatorUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        // Port 1 on loopback refuses connections
        let actuator = HttpActuator::new(
            "http://127.0.0.1:1",
            "/gate/open",
            "/gate/close",
            Duration::from_millis(500),
        )
        .unwrap();
        let resp = actuator.send(ControlAction::Open).await;
        assert!(matches!(resp, ActuatorResponse::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        // Accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let actuator = HttpActuator::new(
            &format!("http://{}", addr),
            "/gate/open",
            "/gate/close",
            Duration::from_millis(200),
        )
        .unwrap();
        let started = std::time::Instant::now();
        let resp = actuator.send(ControlAction::Open).await;
        assert!(matches!(resp, ActuatorResponse::Unreachable(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        hold.abort();
    }
}
