//! ---
//! iotsim_section: "03-logging"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Metrics collection and export utilities."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Shared registry type used across the engine crates.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every metric family in the registry using the Prometheus text format.
pub fn render_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .map_err(|err| {
            error!(error = %err, "failed to encode metrics");
            err
        })
        .context("metrics encoding error")
}

/// Outcome label recorded for every finished device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcomeLabel {
    Complete,
    Checkpoint,
    Stopped,
    Skipped,
}

impl DeviceOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceOutcomeLabel::Complete => "complete",
            DeviceOutcomeLabel::Checkpoint => "checkpoint",
            DeviceOutcomeLabel::Stopped => "stopped",
            DeviceOutcomeLabel::Skipped => "skipped",
        }
    }
}

/// Metrics recorded by the simulation engine and its device runners.
#[derive(Clone, Debug)]
pub struct EngineMetrics {
    registry: SharedRegistry,
    messages_published: IntCounterVec,
    publish_failures: IntCounterVec,
    devices_active: IntGaugeVec,
    device_outcomes: IntCounterVec,
    stage_polls: IntCounterVec,
}

impl EngineMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let messages_published = IntCounterVec::new(
            Opts::new(
                "iotsim_messages_published_total",
                "Telemetry messages published by device type",
            ),
            &["device_type"],
        )?;
        registry.register(Box::new(messages_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new(
                "iotsim_publish_failures_total",
                "Publish attempts that failed and aborted a device",
            ),
            &["device_type"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let devices_active = IntGaugeVec::new(
            Opts::new(
                "iotsim_devices_active",
                "Device runners currently ticking, by device type",
            ),
            &["device_type"],
        )?;
        registry.register(Box::new(devices_active.clone()))?;

        let device_outcomes = IntCounterVec::new(
            Opts::new(
                "iotsim_device_outcomes_total",
                "Finished device instances by device type and outcome",
            ),
            &["device_type", "outcome"],
        )?;
        registry.register(Box::new(device_outcomes.clone()))?;

        let stage_polls = IntCounterVec::new(
            Opts::new(
                "iotsim_stage_polls_total",
                "External stage polls by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(stage_polls.clone()))?;

        Ok(Self {
            registry,
            messages_published,
            publish_failures,
            devices_active,
            device_outcomes,
            stage_polls,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_published(&self, device_type: &str, count: usize) {
        self.messages_published
            .with_label_values(&[device_type])
            .inc_by(count as u64);
    }

    pub fn record_publish_failure(&self, device_type: &str) {
        self.publish_failures.with_label_values(&[device_type]).inc();
    }

    pub fn device_started(&self, device_type: &str) {
        self.devices_active.with_label_values(&[device_type]).inc();
    }

    pub fn device_finished(&self, device_type: &str, outcome: DeviceOutcomeLabel) {
        self.devices_active.with_label_values(&[device_type]).dec();
        self.record_outcome(device_type, outcome);
    }

    /// Runner ended with an error; only the active gauge moves.
    pub fn device_aborted(&self, device_type: &str) {
        self.devices_active.with_label_values(&[device_type]).dec();
    }

    pub fn record_outcome(&self, device_type: &str, outcome: DeviceOutcomeLabel) {
        self.device_outcomes
            .with_label_values(&[device_type, outcome.as_str()])
            .inc();
    }

    pub fn record_stage_poll(&self, result: &str) {
        self.stage_polls.with_label_values(&[result]).inc();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_metrics_render_as_text() {
        let registry = new_registry();
        let metrics = EngineMetrics::new(registry.clone()).expect("metrics register");
        metrics.device_started("truck");
        metrics.record_published("truck", 3);
        metrics.device_finished("truck", DeviceOutcomeLabel::Checkpoint);
        metrics.record_stage_poll("running");

        let text = render_text(&registry).expect("metrics encode");
        assert!(text.contains("iotsim_messages_published_total{device_type=\"truck\"} 3"));
        assert!(text.contains("iotsim_devices_active{device_type=\"truck\"} 0"));
        assert!(text.contains("outcome=\"checkpoint\""));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = new_registry();
        EngineMetrics::new(registry.clone()).expect("first registration");
        assert!(EngineMetrics::new(registry).is_err());
    }
}
