//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Telemetry message types and publish channels."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::{PublishError, Publisher, QoS, Result};

/// Bridges telemetry onto an HTTP data-plane: `POST {base}/topics/{topic}?qos=N`.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    base: Url,
}

/// Applied when no explicit timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpPublisher {
    /// Create a publisher rooted at `base` using [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new(base: Url) -> Result<Self> {
        Self::with_timeout(base, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request, including connect, fails with a timeout error after `timeout`.
    pub fn with_timeout(base: Url, timeout: Duration) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(PublishError::InvalidEndpoint(base.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// URL a message for `topic` is posted to. The topic becomes a single
    /// percent-encoded path segment.
    pub fn topic_url(&self, topic: &str, qos: QoS) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PublishError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .push("topics")
            .push(topic);
        url.query_pairs_mut()
            .append_pair("qos", &qos.level().to_string());
        Ok(url)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<()> {
        let url = self.topic_url(topic, qos)?;
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        response.error_for_status()?;
        debug!(topic, url = %url, "telemetry posted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_url_encodes_topic_as_segment() {
        let publisher = HttpPublisher::new(Url::parse("http://broker.local/api/").unwrap()).unwrap();
        let url = publisher
            .topic_url("fleet/trucks/telemetry", QoS::AtMostOnce)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://broker.local/api/topics/fleet%2Ftrucks%2Ftelemetry?qos=0"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        let url = Url::parse("mailto:ops@example.com").unwrap();
        assert!(matches!(
            HttpPublisher::new(url),
            Err(PublishError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn unresponsive_broker_times_out() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let publisher = HttpPublisher::with_timeout(base, Duration::from_millis(200)).unwrap();

        let err = publisher
            .publish("fleet/a", "{}".into(), QoS::AtMostOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Http(ref source) if source.is_timeout()), "{err}");
        drop(listener);
    }
}
