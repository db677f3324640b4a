//! Service transport
//!
//! Sends [`ServiceRequest`]s to the blocklist service and returns the raw
//! body. Decoding stays in the engine.

use std::time::Duration;

use reqwest::Client;

use bb_core::url::join_endpoint;
use bb_core::{Method, ServiceError, ServiceRequest};

/// Abstract transport for swapping the HTTP client out in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ServiceRequest) -> Result<String, ServiceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// reqwest-backed transport. GET params go in the query string, POST
/// params are form encoded.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("bb-runtime/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<String, ServiceError> {
        let url = join_endpoint(&self.base_url, request.path());
        log::debug!("{} {} {:?}", request.method().as_str(), url, request.params);

        let builder = match request.method() {
            Method::Get => self.client.get(&url).query(&request.params),
            Method::Post => self.client.post(&url).form(&request.params),
        };
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Transport(format!("HTTP {} from {}", status, url)));
        }
        response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

/// Liveness check against `GET /ok`.
pub async fn ping<T: Transport + ?Sized>(transport: &T) -> Result<(), ServiceError> {
    let body = transport.send(&bb_core::wire::alive_request()).await?;
    if body.trim() == "OK" {
        Ok(())
    } else {
        Err(ServiceError::Transport(format!("unexpected liveness reply: {}", body.trim())))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Transport answering from a closure and recording every request.
    pub struct FnTransport<F> {
        reply: F,
        pub calls: Mutex<Vec<ServiceRequest>>,
    }

    impl<F> FnTransport<F>
    where
        F: Fn(&ServiceRequest) -> Result<String, ServiceError> + Send + Sync,
    {
        pub fn new(reply: F) -> Self {
            Self {
                reply,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl<F> Transport for FnTransport<F>
    where
        F: Fn(&ServiceRequest) -> Result<String, ServiceError> + Send + Sync,
    {
        async fn send(&self, request: &ServiceRequest) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push(request.clone());
            (self.reply)(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FnTransport;
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        let up = FnTransport::new(|_: &ServiceRequest| Ok("OK".to_string()));
        assert!(ping(&up).await.is_ok());
        assert_eq!(up.calls.lock().unwrap()[0].path(), "/ok");

        let down = FnTransport::new(|_: &ServiceRequest| Err(ServiceError::Transport("refused".into())));
        assert!(ping(&down).await.is_err());

        let wrong = FnTransport::new(|_: &ServiceRequest| Ok("<html>".to_string()));
        assert!(ping(&wrong).await.is_err());
    }

    #[test]
    fn test_http_transport_builds() {
        let transport = HttpTransport::new("http://127.0.0.1:22332", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:22332");
    }
}
