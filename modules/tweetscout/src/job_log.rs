//! Job-scoped log.
//!
//! One `JobLog` is created per job and handed to every component that needs
//! to report. Each entry is emitted as a tracing event (inside the job's
//! span, so it carries `job_id` and `tracer_id`) and appended to the job's
//! human-readable message trail, which ends up in the `JobOutcome`.

use std::sync::Mutex;

use tracing::{error, info, warn};

#[derive(Debug)]
pub struct JobLog {
    job_id: u64,
    messages: Mutex<Vec<String>>,
}

impl JobLog {
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(job_id = self.job_id, "{message}");
        self.record(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(job_id = self.job_id, "{message}");
        self.record(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(job_id = self.job_id, "{message}");
        self.record(message);
    }

    /// Append to the trail without emitting an event. For callers that
    /// already logged with their own structured fields.
    pub fn record(&self, message: impl Into<String>) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.into());
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages.into_inner().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_keeps_order() {
        let log = JobLog::new(3);
        log.info("starting");
        log.warn("retrying page 1");
        log.record("page 1 fetched");
        log.error("giving up");
        assert_eq!(
            log.into_messages(),
            vec!["starting", "retrying page 1", "page 1 fetched", "giving up"]
        );
    }
}
