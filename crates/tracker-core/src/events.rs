// events.rs — Post-save notification dispatch.
//
// Every audited save cycle ends with one AuditLogGenerated event carrying
// the headers it produced. Subscribers (a JSONL log, a closure, ...) receive
// it synchronously. A failing sink is logged and never fails the save.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracker_audit::AuditLog;

use crate::error::TrackerError;

/// Raised once per audited save cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogGenerated {
    /// Headers in emission order: modifications and deletions, then additions.
    pub logs: Vec<AuditLog>,

    /// Row count reported by the primary commit.
    pub rows_affected: usize,

    pub timestamp: DateTime<Utc>,
}

impl AuditLogGenerated {
    pub fn new(logs: Vec<AuditLog>, rows_affected: usize) -> Self {
        Self {
            logs,
            rows_affected,
            timestamp: Utc::now(),
        }
    }
}

/// Receives audit events.
pub trait NotificationSink: Send + Sync {
    /// Handle an event. Errors are logged but don't fail the save.
    fn send(&self, event: &AuditLogGenerated) -> Result<(), TrackerError>;
}

/// Appends each event as one JSON line to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationSink for JsonlSink {
    fn send(&self, event: &AuditLogGenerated) -> Result<(), TrackerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| TrackerError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| TrackerError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| TrackerError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&AuditLogGenerated) + Send + Sync,
{
    fn send(&self, event: &AuditLogGenerated) -> Result<(), TrackerError> {
        (self.0)(event);
        Ok(())
    }
}

/// Identifies a subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

/// Fans events out to subscribed sinks, in subscription order.
pub struct EventDispatcher {
    sinks: Vec<(SinkId, Box<dyn NotificationSink>)>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, sink: Box<dyn NotificationSink>) -> SinkId {
        let id = SinkId(self.next_id);
        self.next_id += 1;
        self.sinks.push((id, sink));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SinkId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    pub fn dispatch(&self, event: &AuditLogGenerated) {
        for (_, sink) in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("notification sink error: {}", e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tracker_audit::EventType;

    fn event() -> AuditLogGenerated {
        AuditLogGenerated::new(vec![AuditLog::new("shop::Order", EventType::Added, "7")], 2)
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let sink = JsonlSink::new(&path);

        sink.send(&event()).unwrap();
        sink.send(&event()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let restored: AuditLogGenerated = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(restored.rows_affected, 2);
        assert_eq!(restored.logs[0].record_id, "7");
    }

    #[test]
    fn unsubscribed_sinks_stop_receiving() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        let counter = calls.clone();
        let id = dispatcher.subscribe(Box::new(FnSink(move |_: &AuditLogGenerated| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        dispatcher.dispatch(&event());
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch(&event());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_empty());
    }

    struct Broken;

    impl NotificationSink for Broken {
        fn send(&self, _event: &AuditLogGenerated) -> Result<(), TrackerError> {
            Err(TrackerError::Cancelled)
        }
    }

    #[test]
    fn failing_sink_does_not_starve_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Box::new(Broken));
        dispatcher.subscribe(Box::new(FnSink(move |_: &AuditLogGenerated| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        dispatcher.dispatch(&event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.len(), 2);
    }
}
