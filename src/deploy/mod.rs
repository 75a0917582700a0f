//! Deployment pipeline
//!
//! Drives one queued job to a terminal outcome: clone, detect and build,
//! health-gated release, finalize. Every step streams log lines to the
//! deployment topic and the full text is persisted on the row at
//! termination.

use std::sync::Mutex;

use uuid::Uuid;

use crate::events::{Event, EventPublisher};

pub mod git;
pub mod image;
pub mod pipeline;

pub use pipeline::{
    plan_strategy, run_deployment, run_rollback, DeploymentOutcome, PipelineContext, RunStrategy,
};

/// Per-deployment log sink: accumulates the full text for the row and
/// streams each line as a `deployment:log` event.
pub struct DeployLogger {
    deployment_id: Uuid,
    publisher: EventPublisher,
    buffer: Mutex<String>,
}

impl DeployLogger {
    pub fn new(deployment_id: Uuid, publisher: EventPublisher) -> Self {
        Self {
            deployment_id,
            publisher,
            buffer: Mutex::new(String::new()),
        }
    }

    /// Append one line and fan it out. Event delivery is best-effort; the
    /// buffer is the durable record.
    pub async fn log(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        {
            let mut buffer = self.buffer.lock().expect("log buffer lock poisoned");
            buffer.push_str(line);
            buffer.push('\n');
        }
        self.publisher
            .publish_best_effort(&Event::deployment_log(self.deployment_id, line))
            .await;
    }

    /// Full accumulated log text.
    pub fn contents(&self) -> String {
        self.buffer.lock().expect("log buffer lock poisoned").clone()
    }
}
