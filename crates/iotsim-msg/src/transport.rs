//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Telemetry message types and publish channels."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{PublishError, QoS, Result};

/// Channel abstraction every telemetry backend implements.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish an already serialized JSON payload to `topic`.
    async fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<()>;
    /// Human-readable channel name for logging.
    fn name(&self) -> &'static str;
}

/// Message captured by [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Serialized payload exactly as published.
    pub payload: String,
    /// Requested delivery quality.
    pub qos: QoS,
}

impl PublishedMessage {
    /// Decode the payload back into JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.payload).map_err(PublishError::from)
    }
}

#[derive(Debug, Default)]
struct Recorder {
    messages: Vec<PublishedMessage>,
    fail_after: Option<usize>,
}

/// In-memory recorder, primarily for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    inner: Arc<Mutex<Recorder>>,
}

impl InMemoryPublisher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish once `accepted` messages have been recorded.
    pub fn fail_after(accepted: usize) -> Self {
        let publisher = Self::default();
        publisher.inner.lock().fail_after = Some(accepted);
        publisher
    }

    /// Snapshot of everything published so far.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.inner.lock().messages.clone()
    }

    /// Messages whose payload carries `_id_ == device_id`.
    pub fn messages_for_device(&self, device_id: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|message| {
                message
                    .json()
                    .ok()
                    .and_then(|value| value.get("_id_").and_then(|id| id.as_str().map(str::to_owned)))
                    .as_deref()
                    == Some(device_id)
            })
            .collect()
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<()> {
        let mut guard = self.inner.lock();
        if let Some(limit) = guard.fail_after {
            if guard.messages.len() >= limit {
                return Err(PublishError::Rejected {
                    topic: topic.to_owned(),
                    reason: format!("recorder limit of {limit} messages reached"),
                });
            }
        }
        guard.messages.push(PublishedMessage {
            topic: topic.to_owned(),
            payload,
            qos,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

type SharedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Serialize)]
struct JsonLine<'a> {
    topic: &'a str,
    qos: u8,
    payload: &'a RawValue,
}

/// Writes one JSON object per message: `{"topic", "qos", "payload"}`.
pub struct JsonLinesPublisher {
    writer: tokio::sync::Mutex<SharedWriter>,
    name: &'static str,
}

impl JsonLinesPublisher {
    /// Publish to the process' stdout.
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(tokio::io::stdout()), "stdout")
    }

    /// Append to `path`, creating it when missing.
    pub async fn append_to(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self::from_writer(Box::new(file), "file"))
    }

    /// Wrap an arbitrary async writer.
    pub fn from_writer(writer: SharedWriter, name: &'static str) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            name,
        }
    }
}

#[async_trait]
impl Publisher for JsonLinesPublisher {
    async fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<()> {
        let payload = RawValue::from_string(payload)?;
        let mut line = serde_json::to_string(&JsonLine {
            topic,
            qos: qos.level(),
            payload: &payload,
        })?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        trace!(topic, bytes = line.len(), channel = self.name, "telemetry line written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn in_memory_publisher_records_messages() -> Result<()> {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish("fleet/a", r#"{"_id_":"dev0","v":1}"#.into(), QoS::AtMostOnce)
            .await?;
        publisher
            .publish("fleet/a", r#"{"_id_":"dev1","v":2}"#.into(), QoS::AtMostOnce)
            .await?;
        assert_eq!(publisher.len(), 2);
        assert_eq!(publisher.messages_for_device("dev1").len(), 1);
        assert_eq!(publisher.messages()[0].json()?["v"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn fail_after_rejects_further_messages() {
        let publisher = InMemoryPublisher::fail_after(1);
        assert!(publisher
            .publish("t", "{}".into(), QoS::AtMostOnce)
            .await
            .is_ok());
        let err = publisher
            .publish("t", "{}".into(), QoS::AtMostOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected { .. }));
        assert_eq!(publisher.len(), 1);
    }

    #[tokio::test]
    async fn json_lines_publisher_appends_to_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("telemetry.jsonl");
        let publisher = JsonLinesPublisher::append_to(&path).await?;
        publisher
            .publish("fleet/\"quoted\"", r#"{"v":1}"#.into(), QoS::AtMostOnce)
            .await?;
        publisher
            .publish("fleet/b", r#"{"v":2}"#.into(), QoS::AtLeastOnce)
            .await?;

        let contents = std::fs::read_to_string(&path)?;
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["topic"], "fleet/\"quoted\"");
        assert_eq!(lines[0]["payload"]["v"], 1);
        assert_eq!(lines[1]["qos"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn json_lines_publisher_rejects_non_json_payloads() {
        let publisher = JsonLinesPublisher::from_writer(Box::new(tokio::io::sink()), "sink");
        let err = publisher
            .publish("fleet/a", "not json".into(), QoS::AtMostOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Json(_)));
    }

    #[tokio::test]
    async fn stdout_publisher_writes_lines() -> Result<()> {
        let publisher = JsonLinesPublisher::stdout();
        assert_eq!(publisher.name(), "stdout");
        publisher
            .publish("fleet/a", r#"{"v":1}"#.into(), QoS::AtMostOnce)
            .await?;
        Ok(())
    }
}
