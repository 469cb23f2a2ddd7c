use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::language::Language;

/// Execution states a submission moves through. Terminal states freeze the
/// record: no further mutation of `output`, `status`, or `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

/// A single user request to execute code.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: String,
    pub language: Language,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub status: Status,
    #[serde(rename = "queuedAt", skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Submission {
    pub fn new(language: Language, code: String, input: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            language,
            code,
            input,
            status: Status::Pending,
            queued_at: None,
            started_at: None,
            completed_at: None,
            output: String::new(),
            error: None,
        }
    }

    pub fn mark_queued(&mut self) {
        self.status = Status::Queued;
        self.queued_at = Some(Utc::now());
    }

    pub fn mark_running(&mut self) {
        self.status = Status::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = Status::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = Status::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Append a chunk of process output. Terminal records are frozen; with a
    /// non-zero cap, overflow is dropped and marked visibly exactly once.
    pub fn append_output(&mut self, chunk: &str, cap: usize) {
        if self.status.is_terminal() {
            return;
        }
        if cap == 0 {
            self.output.push_str(chunk);
            return;
        }
        if self.output.len() >= cap {
            return;
        }
        let room = cap - self.output.len();
        if chunk.len() <= room {
            self.output.push_str(chunk);
        } else {
            let mut end = room;
            while !chunk.is_char_boundary(end) {
                end -= 1;
            }
            self.output.push_str(&chunk[..end]);
            self.output.push_str("\n[System] output truncated\n");
        }
    }

    /// Execution time in milliseconds, once both endpoints are known.
    pub fn execution_time_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("submission {0} already exists")]
pub struct DuplicateSubmission(pub String);

/// Process-local store mapping submission id to its record.
///
/// The outer map is only touched on insert and lookup; all record mutation
/// happens under the per-record mutex, so a `get` during a `mutate` observes
/// either the pre-state or the post-state, never a torn read.
#[derive(Default)]
pub struct SubmissionRegistry {
    records: RwLock<HashMap<String, Arc<Mutex<Submission>>>>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, submission: Submission) -> Result<(), DuplicateSubmission> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&submission.id) {
            return Err(DuplicateSubmission(submission.id));
        }
        records.insert(submission.id.clone(), Arc::new(Mutex::new(submission)));
        Ok(())
    }

    /// Cloned snapshot of the record, or `None` for an unknown id.
    pub fn get(&self, id: &str) -> Option<Submission> {
        let record = self.records.read().unwrap().get(id).cloned()?;
        let snapshot = record.lock().unwrap().clone();
        Some(snapshot)
    }

    /// Apply `f` to the record under its lock. Returns false for unknown ids.
    pub fn mutate<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Submission),
    {
        let Some(record) = self.records.read().unwrap().get(id).cloned() else {
            return false;
        };
        f(&mut record.lock().unwrap());
        true
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission::new(Language::Python, "print(1)".to_string(), None)
    }

    #[test]
    fn test_ids_are_unique_hex() {
        let a = submission();
        let b = submission();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let mut sub = submission();
        sub.mark_running();
        sub.append_output("before", 0);
        sub.mark_failed("boom");
        let completed_at = sub.completed_at;

        sub.append_output("after", 0);
        sub.mark_completed();
        sub.mark_failed("again");

        assert_eq!(sub.output, "before");
        assert_eq!(sub.status, Status::Failed);
        assert_eq!(sub.error.as_deref(), Some("boom"));
        assert_eq!(sub.completed_at, completed_at);
    }

    #[test]
    fn test_timestamps_are_ordered() {
        let mut sub = submission();
        sub.mark_queued();
        sub.mark_running();
        sub.mark_completed();
        assert!(sub.queued_at.unwrap() <= sub.started_at.unwrap());
        assert!(sub.started_at.unwrap() <= sub.completed_at.unwrap());
    }

    #[test]
    fn test_output_cap_is_marked() {
        let mut sub = submission();
        sub.mark_running();
        sub.append_output("0123456789", 4);
        assert!(sub.output.starts_with("0123"));
        assert!(sub.output.contains("[System] output truncated"));

        // Further appends after the cap are dropped without a second marker
        let len = sub.output.len();
        sub.append_output("more", 4);
        assert_eq!(sub.output.len(), len);
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let registry = SubmissionRegistry::new();
        let mut sub = submission();
        sub.id = "fixed".to_string();
        registry.create(sub.clone()).unwrap();
        assert!(registry.create(sub).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_get_sees_mutations() {
        let registry = SubmissionRegistry::new();
        let sub = submission();
        let id = sub.id.clone();
        registry.create(sub).unwrap();

        assert!(registry.mutate(&id, |s| s.mark_queued()));
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, Status::Queued);
        assert!(snapshot.queued_at.is_some());

        assert!(!registry.mutate("missing", |_| unreachable!()));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_output_grows_by_prefix() {
        let registry = SubmissionRegistry::new();
        let sub = submission();
        let id = sub.id.clone();
        registry.create(sub).unwrap();
        registry.mutate(&id, |s| s.mark_running());

        let mut previous = String::new();
        for chunk in ["a", "bc", "def"] {
            registry.mutate(&id, |s| s.append_output(chunk, 0));
            let current = registry.get(&id).unwrap().output;
            assert!(current.starts_with(&previous));
            assert!(current.len() >= previous.len());
            previous = current;
        }
        assert_eq!(previous, "abcdef");
    }
}
