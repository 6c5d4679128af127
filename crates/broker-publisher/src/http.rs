//! Publisher backed by the broker's HTTP management API.
//!
//! `open` checks that the virtual host is reachable with the configured
//! credentials. Each record is then a
//! `POST /api/exchanges/{vhost}/{exchange}/publish`.

use crate::{PublishError, PublishResult, Publisher, PublisherSession};
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use relay_config_and_utils::Config;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Content type attached to every message.
const CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode for persistent messages.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Connection settings for [`HttpPublisher`].
#[derive(Clone)]
pub struct HttpPublisherConfig {
    /// Root of the HTTP API, e.g. `http://localhost:15672/`.
    pub base_url: Url,
    pub virtual_host: String,
    pub exchange: String,
    pub routing_key: String,
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,
}

impl HttpPublisherConfig {
    pub fn from_config(config: &Config) -> PublishResult<Self> {
        let base_url = config
            .broker_api_url()
            .map_err(|e| PublishError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            virtual_host: config.amqp_virtual_host.clone(),
            exchange: config.amqp_exchange_name.clone(),
            routing_key: config.amqp_routing_key.clone(),
            username: config.amqp_auth_username.clone(),
            password: config.amqp_auth_password.clone(),
            request_timeout: Duration::from_millis(config.amqp_request_timeout_ms),
        })
    }

    /// Build an API URL from raw path segments.
    ///
    /// Segments are percent-encoded, so the default vhost `/` becomes `%2F`.
    fn api_url(&self, segments: &[&str]) -> PublishResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PublishError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .clear()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn vhost_url(&self) -> PublishResult<Url> {
        self.api_url(&["vhosts", &self.virtual_host])
    }

    fn publish_url(&self) -> PublishResult<Url> {
        self.api_url(&["exchanges", &self.virtual_host, &self.exchange, "publish"])
    }
}

#[derive(Debug, Serialize)]
struct MessageProperties {
    content_type: &'static str,
    delivery_mode: u8,
}

/// Body of a publish request.
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: MessageProperties,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

impl<'a> PublishRequest<'a> {
    fn new(routing_key: &'a str, payload: &[u8]) -> Self {
        let (payload, payload_encoding) = match std::str::from_utf8(payload) {
            Ok(text) => (text.to_string(), "string"),
            Err(_) => (BASE64_STANDARD.encode(payload), "base64"),
        };

        Self {
            properties: MessageProperties {
                content_type: CONTENT_TYPE,
                delivery_mode: DELIVERY_MODE_PERSISTENT,
            },
            routing_key,
            payload,
            payload_encoding,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

/// Publishes through the broker's HTTP API.
pub struct HttpPublisher {
    config: Arc<HttpPublisherConfig>,
    client: Client,
}

impl HttpPublisher {
    /// Create a new HTTP publisher.
    pub fn new(config: HttpPublisherConfig) -> PublishResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PublishError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self) -> PublishResult<Box<dyn PublisherSession>> {
        let url = self.config.vhost_url()?;
        debug!(url = %url, "opening broker session");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::SessionRefused {
                status: status.as_u16(),
                body: body_text(response).await,
            });
        }

        Ok(Box::new(HttpSession {
            publish_url: self.config.publish_url()?,
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            closed: false,
        }))
    }
}

/// A session is a pooled client plus the resolved publish URL.
struct HttpSession {
    config: Arc<HttpPublisherConfig>,
    client: Client,
    publish_url: Url,
    closed: bool,
}

#[async_trait]
impl PublisherSession for HttpSession {
    async fn publish_one(&mut self, payload: &[u8]) -> PublishResult<()> {
        if self.closed {
            return Err(PublishError::Closed);
        }

        let request = PublishRequest::new(&self.config.routing_key, payload);

        let response = self
            .client
            .post(self.publish_url.clone())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(publish_failure(status, body_text(response).await));
        }

        let result: PublishResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        if result.routed {
            Ok(())
        } else {
            Err(PublishError::Unroutable)
        }
    }

    async fn close(&mut self) -> PublishResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Classify a non-2xx publish reply.
///
/// Server errors, auth failures, throttling and a missing exchange would hit
/// every record alike and are session-level. Anything else is about this
/// message.
fn publish_failure(status: StatusCode, body: String) -> PublishError {
    let status_code = status.as_u16();
    let broker_side = status.is_server_error()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::NOT_FOUND
                | StatusCode::TOO_MANY_REQUESTS
        );

    if broker_side {
        PublishError::Unavailable {
            status: status_code,
            body,
        }
    } else {
        PublishError::Rejected {
            status: status_code,
            body,
        }
    }
}

async fn body_text(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn config_for(base_url: &str) -> HttpPublisherConfig {
        HttpPublisherConfig {
            base_url: Url::parse(base_url).unwrap(),
            virtual_host: "/".to_string(),
            exchange: "amq.topic".to_string(),
            routing_key: "dns.querylog".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Serves one canned `(status, body)` per connection and returns the
    /// raw requests it received.
    async fn canned_broker(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut socket).await);

                let reply = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            seen
        });

        (base, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn default_vhost_is_percent_encoded() {
        let config = config_for("http://localhost:15672/");
        assert_eq!(
            config.vhost_url().unwrap().as_str(),
            "http://localhost:15672/api/vhosts/%2F"
        );
        assert_eq!(
            config.publish_url().unwrap().as_str(),
            "http://localhost:15672/api/exchanges/%2F/amq.topic/publish"
        );
    }

    #[test]
    fn config_from_relay_config_uses_tls_flag() {
        let relay = Config {
            amqps_enabled: true,
            amqp_port: 15671,
            amqp_virtual_host: "dns".to_string(),
            ..Config::default()
        };
        let config = HttpPublisherConfig::from_config(&relay).unwrap();
        assert_eq!(
            config.publish_url().unwrap().as_str(),
            "https://localhost:15671/api/exchanges/dns/amq.topic/publish"
        );
    }

    #[test]
    fn publish_request_body_shape() {
        let request = PublishRequest::new("dns.querylog", br#"{"qName":"example.com"}"#);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["routing_key"], "dns.querylog");
        assert_eq!(value["payload_encoding"], "string");
        assert_eq!(value["payload"], r#"{"qName":"example.com"}"#);
        assert_eq!(value["properties"]["content_type"], "application/json");
        assert_eq!(value["properties"]["delivery_mode"], 2);
    }

    #[test]
    fn non_utf8_payload_is_base64() {
        let request = PublishRequest::new("k", &[0xff, 0xfe]);
        assert_eq!(request.payload_encoding, "base64");
        assert_eq!(request.payload, "//4=");
    }

    #[test]
    fn broker_side_statuses_are_session_level() {
        for status in [401, 403, 404, 429, 500, 502, 503] {
            let err = publish_failure(StatusCode::from_u16(status).unwrap(), String::new());
            assert!(err.is_session_level(), "HTTP {} should be session-level", status);
        }
        for status in [400, 413, 415, 422] {
            let err = publish_failure(StatusCode::from_u16(status).unwrap(), String::new());
            assert!(matches!(err, PublishError::Rejected { .. }));
            assert!(!err.is_session_level(), "HTTP {} should be record-level", status);
        }
    }

    #[tokio::test]
    async fn open_fails_session_level_when_broker_down() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let publisher =
            HttpPublisher::new(config_for(&format!("http://127.0.0.1:{}/", port))).unwrap();

        let err = publisher.open().await.err().unwrap();
        assert!(matches!(err, PublishError::Connect(_)));
        assert!(err.is_session_level());
    }

    #[tokio::test]
    async fn open_refused_on_bad_credentials() {
        let (base, server) = canned_broker(vec![(401, r#"{"error":"not_authorised"}"#)]).await;
        let publisher = HttpPublisher::new(config_for(&base)).unwrap();

        let err = publisher.open().await.err().unwrap();
        assert!(matches!(err, PublishError::SessionRefused { status: 401, .. }));
        assert!(err.is_session_level());

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /api/vhosts/%2F "));
        assert!(requests[0].to_ascii_lowercase().contains("authorization: basic "));
    }

    #[tokio::test]
    async fn publish_outcomes_are_classified() {
        let (base, server) = canned_broker(vec![
            (200, r#"{"name":"/"}"#),
            (200, r#"{"routed":true}"#),
            (200, r#"{"routed":false}"#),
            (400, r#"{"error":"bad_request"}"#),
            (503, r#"{"error":"unavailable"}"#),
        ])
        .await;
        let publisher = HttpPublisher::new(config_for(&base)).unwrap();

        let mut session = publisher.open().await.unwrap();
        session.publish_one(b"{\"a\":1}").await.unwrap();

        let err = session.publish_one(b"{\"a\":2}").await.unwrap_err();
        assert!(matches!(err, PublishError::Unroutable));
        assert!(!err.is_session_level());

        let err = session.publish_one(b"{\"a\":3}").await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 400, .. }));
        assert!(!err.is_session_level());

        let err = session.publish_one(b"{\"a\":4}").await.unwrap_err();
        assert!(matches!(err, PublishError::Unavailable { status: 503, .. }));
        assert!(err.is_session_level());

        session.close().await.unwrap();
        let err = session.publish_one(b"{}").await.unwrap_err();
        assert!(matches!(err, PublishError::Closed));

        let requests = server.await.unwrap();
        assert!(requests[1].starts_with("POST /api/exchanges/%2F/amq.topic/publish "));
        assert!(requests[1].contains(r#""routing_key":"dns.querylog""#));
    }
}
