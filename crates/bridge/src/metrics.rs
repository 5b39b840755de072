use crate::command::FunctionId;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Protocol instruments on the global meter. No-ops until a meter provider
/// is installed.
#[derive(Clone)]
pub struct BridgeMetrics {
    commands: Counter<u64>,
    command_latency: Histogram<f64>,
    ticks: Counter<u64>,
    handshakes: Counter<u64>,
    resends: Counter<u64>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        let meter = global::meter("bridge");
        let latency_buckets = [
            0.0001, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
        ];

        Self {
            commands: meter
                .u64_counter("bridge_commands_total")
                .with_description("Fire-and-track calls issued")
                .build(),
            command_latency: meter
                .f64_histogram("bridge_command_duration_seconds")
                .with_description("Time from issuing a call to the peer clearing it")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            ticks: meter
                .u64_counter("bridge_ticks_total")
                .with_description("Simulation ticks observed after a step")
                .build(),
            handshakes: meter
                .u64_counter("bridge_handshakes_total")
                .with_description("Handshake attempts by outcome")
                .build(),
            resends: meter
                .u64_counter("bridge_handshake_resends_total")
                .with_description("Hyper-parameter payloads rewritten while awaiting acknowledgement")
                .build(),
        }
    }

    pub fn command_issued(&self, id: FunctionId) {
        self.commands
            .add(1, &[KeyValue::new("function", id.as_str())]);
    }

    pub fn command_completed(&self, id: FunctionId, elapsed: Duration) {
        self.command_latency.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("function", id.as_str())],
        );
    }

    pub fn tick_observed(&self) {
        self.ticks.add(1, &[]);
    }

    pub fn handshake_finished(&self, outcome: &'static str) {
        self.handshakes
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn resends(&self, count: u64) {
        if count > 0 {
            self.resends.add(count, &[]);
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
