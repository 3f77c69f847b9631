//! Command dispatcher: raw request bytes -> parsed `!send` -> one forwarding call.

use crate::command;
use crate::config::{self, Config};
use crate::forward::{ForwardError, Forwarder, GatewayClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key of the inbound request that carries the chat line.
pub const MESSAGE_KEY: &str = "message";

/// Why a request was rejected. Forwarding failures are never reported here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unsupported command: {0:?}")]
    UnsupportedCommand(String),
}

/// Turns an inbound request into at most one gateway call. Stateless; share behind `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
    forwarder: Arc<dyn Forwarder>,
}

impl Dispatcher {
    pub fn new(forwarder: Arc<dyn Forwarder>) -> Self {
        Self { forwarder }
    }

    /// Dispatcher that forwards to the configured gateway (env overrides applied).
    pub fn from_config(config: &Config) -> Result<Self, ForwardError> {
        let base_url = config::resolve_gateway_base_url(config);
        Self::with_base_url(&base_url, config.gateway.timeout())
    }

    /// Dispatcher that forwards to a gateway base URL the caller already resolved.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ForwardError> {
        let client = GatewayClient::new(base_url, timeout)?;
        log::debug!("forwarding to gateway at {}", client.base_url());
        Ok(Self::new(Arc::new(client)))
    }

    /// Dispatch one request. `raw` must be a JSON object of string values; only `"message"` is read.
    ///
    /// On a valid `!send` the payload is forwarded and the call is awaited, but its
    /// outcome is only logged: the result is `Ok("")` whether or not delivery worked.
    pub async fn dispatch(&self, raw: &[u8]) -> Result<String, DispatchError> {
        let message = read_message(raw)?;
        let cmd = command::parse(&message)?;
        log::debug!(
            "dispatching !send to {} ({} bytes)",
            cmd.target,
            cmd.body.len()
        );
        if let Err(e) = self.forwarder.forward(&cmd.target, &cmd.body).await {
            log::warn!("forward to connection {} failed: {}", cmd.target, e);
        }
        Ok(String::new())
    }
}

/// Deserialize the request map and take `"message"` (empty when absent).
fn read_message(raw: &[u8]) -> Result<String, DispatchError> {
    let mut request: HashMap<String, String> =
        serde_json::from_slice(raw).map_err(|e| DispatchError::MalformedInput(e.to_string()))?;
    Ok(request.remove(MESSAGE_KEY).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Forwarder for Recording {
        async fn forward(&self, target: &str, body: &str) -> Result<(), ForwardError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Forwarder for Failing {
        async fn forward(&self, _target: &str, _body: &str) -> Result<(), ForwardError> {
            Err(ForwardError::Status(reqwest::StatusCode::BAD_GATEWAY))
        }
    }

    fn recording() -> (Arc<Recording>, Dispatcher) {
        let rec = Arc::new(Recording::default());
        (rec.clone(), Dispatcher::new(rec))
    }

    #[tokio::test]
    async fn send_forwards_target_and_body() {
        let (rec, d) = recording();
        let out = d
            .dispatch(br#"{"message":"!send alice hello world"}"#)
            .await
            .unwrap();
        assert_eq!(out, "");
        assert_eq!(
            *rec.calls.lock().unwrap(),
            vec![("alice".to_string(), "hello world".to_string())]
        );
    }

    #[tokio::test]
    async fn other_keys_are_ignored() {
        let (rec, d) = recording();
        d.dispatch(br#"{"user":"bob","message":"!send alice hi","room":"x"}"#)
            .await
            .unwrap();
        assert_eq!(rec.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_verb_makes_no_call() {
        let (rec, d) = recording();
        let err = d
            .dispatch(br#"{"message":"!shout alice hi"}"#)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::UnsupportedCommand("!shout".to_string()));
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_unsupported() {
        let (rec, d) = recording();
        let err = d.dispatch(b"{}").await.unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedCommand(_)));
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let (rec, d) = recording();
        let inputs: [&[u8]; 4] = [b"not json", b"[1,2]", br#"{"message":42}"#, b""];
        for raw in inputs {
            let err = d.dispatch(raw).await.unwrap_err();
            assert!(matches!(err, DispatchError::MalformedInput(_)), "{:?}", err);
        }
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_without_target_is_malformed() {
        let (rec, d) = recording();
        let err = d.dispatch(br#"{"message":"!send"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedInput(_)));
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_fields_forward_empty_body() {
        let (rec, d) = recording();
        d.dispatch(br#"{"message":"!send alice"}"#).await.unwrap();
        assert_eq!(
            *rec.calls.lock().unwrap(),
            vec![("alice".to_string(), String::new())]
        );
    }

    #[tokio::test]
    async fn forward_failure_is_not_surfaced() {
        let d = Dispatcher::new(Arc::new(Failing));
        let out = d.dispatch(br#"{"message":"!send alice hi"}"#).await;
        assert_eq!(out, Ok(String::new()));
    }

    #[tokio::test]
    async fn repeated_dispatch_forwards_each_time() {
        let (rec, d) = recording();
        let raw = br#"{"message":"!send alice hi"}"#;
        d.dispatch(raw).await.unwrap();
        d.dispatch(raw).await.unwrap();
        let calls = rec.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn with_base_url_rejects_unusable_url() {
        let timeout = Duration::from_secs(1);
        assert!(Dispatcher::with_base_url("http://[::1]:8080", timeout).is_ok());
        let err = Dispatcher::with_base_url("not a url", timeout).err().unwrap();
        assert!(matches!(err, ForwardError::Url(_)), "{:?}", err);
    }
}
