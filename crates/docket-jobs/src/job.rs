//! Job records and the job state machine.
//!
//! ```text
//! NOT_STARTED → IN_PROGRESS → COMPLETED | FAILED   (terminal: file deleted)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Separator between method name and id in a job key.
pub const KEY_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How a job's params are handed to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamsKind {
    /// `params` is an array; each element is one argument.
    Positional,
    /// `params` is passed as a single value.
    Named,
}

impl ParamsKind {
    fn infer(params: &Value) -> Self {
        if params.is_array() {
            Self::Positional
        } else {
            Self::Named
        }
    }
}

/// Arguments delivered to a [`JobHandler`](crate::JobHandler).
#[derive(Debug, Clone, PartialEq)]
pub enum JobArgs {
    Positional(Vec<Value>),
    Named(Value),
}

impl JobArgs {
    /// Positional argument `index`, if the job was scheduled positionally.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(args) => args.get(index),
            Self::Named(_) => None,
        }
    }

    /// The single params value, if the job was scheduled with named params.
    pub fn named(&self) -> Option<&Value> {
        match self {
            Self::Named(value) => Some(value),
            Self::Positional(_) => None,
        }
    }
}

/// Params supplied when scheduling.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum JobParams {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Value),
}

impl JobParams {
    fn into_parts(self) -> (Value, ParamsKind) {
        match self {
            Self::None => (Value::Null, ParamsKind::Named),
            Self::Positional(args) => (Value::Array(args), ParamsKind::Positional),
            Self::Named(value) => (value, ParamsKind::Named),
        }
    }
}

/// When a scheduled job becomes eligible to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobTiming {
    #[default]
    Now,
    /// Absolute epoch milliseconds.
    At(i64),
    /// Relative to the moment of scheduling.
    After(Duration),
}

/// A request to schedule one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub method_name: String,
    pub params: JobParams,
    pub timing: JobTiming,
}

impl JobSpec {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            params: JobParams::None,
            timing: JobTiming::Now,
        }
    }

    pub fn positional(mut self, args: Vec<Value>) -> Self {
        self.params = JobParams::Positional(args);
        self
    }

    pub fn named(mut self, params: Value) -> Self {
        self.params = JobParams::Named(params);
        self
    }

    pub fn at(mut self, execution_date_ms: i64) -> Self {
        self.timing = JobTiming::At(execution_date_ms);
        self
    }

    pub fn after(mut self, wait: Duration) -> Self {
        self.timing = JobTiming::After(wait);
        self
    }

    /// Resolve the requested execution date against `now_ms`.
    pub fn execution_date(&self, now_ms: i64) -> i64 {
        match self.timing {
            JobTiming::Now => now_ms,
            JobTiming::At(at) => at,
            JobTiming::After(wait) => {
                now_ms.saturating_add(i64::try_from(wait.as_millis()).unwrap_or(i64::MAX))
            }
        }
    }
}

/// One unit of deferred work, persisted as `<method>__<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "JobRecord")]
pub struct Job {
    pub id: String,
    pub key: String,
    /// Epoch milliseconds at or after which the job may run.
    pub execution_date: i64,
    pub method_name: String,
    pub params: Value,
    pub params_kind: ParamsKind,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Build a fresh job. An execution date earlier than `now_ms` is
    /// clamped to `now_ms`.
    pub fn new(
        id: impl Into<String>,
        method_name: impl Into<String>,
        params: JobParams,
        execution_date: i64,
        now_ms: i64,
    ) -> Self {
        let id = id.into();
        let method_name = method_name.into();
        let (params, params_kind) = params.into_parts();
        Self {
            key: job_key(&method_name, &id),
            id,
            execution_date: execution_date.max(now_ms),
            method_name,
            params,
            params_kind,
            state: JobState::NotStarted,
            error: None,
        }
    }

    /// Eligible to start: not yet started and due.
    pub fn is_ready(&self, now_ms: i64) -> bool {
        self.state == JobState::NotStarted && now_ms >= self.execution_date
    }

    /// Handler arguments according to `params_kind`.
    pub fn args(&self) -> JobArgs {
        match (self.params_kind, &self.params) {
            (ParamsKind::Positional, Value::Array(args)) => JobArgs::Positional(args.clone()),
            (ParamsKind::Positional, Value::Null) => JobArgs::Positional(Vec::new()),
            (ParamsKind::Positional, other) => JobArgs::Positional(vec![other.clone()]),
            (ParamsKind::Named, value) => JobArgs::Named(value.clone()),
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.state = JobState::InProgress;
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.error = Some(error.into());
    }
}

pub fn job_key(method_name: &str, id: &str) -> String {
    format!("{method_name}{KEY_SEPARATOR}{id}")
}

/// On-disk shape. Older files may omit `paramsKind`, `params` or `key`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRecord {
    id: String,
    #[serde(default)]
    key: Option<String>,
    execution_date: i64,
    method_name: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    params_kind: Option<ParamsKind>,
    state: JobState,
    #[serde(default)]
    error: Option<String>,
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        let params_kind = record
            .params_kind
            .unwrap_or_else(|| ParamsKind::infer(&record.params));
        Self {
            key: record
                .key
                .unwrap_or_else(|| job_key(&record.method_name, &record.id)),
            id: record.id,
            execution_date: record.execution_date,
            method_name: record.method_name,
            params: record.params,
            params_kind,
            state: record.state,
            error: record.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn past_execution_date_is_clamped_to_now() {
        let job = Job::new("1", "send", JobParams::None, 500, 1_000);
        assert_eq!(job.execution_date, 1_000);
        assert_eq!(job.key, "send__1");
        assert!(job.is_ready(1_000));
    }

    #[test]
    fn future_job_is_not_ready_until_due() {
        let job = Job::new("1", "send", JobParams::None, 2_000, 1_000);
        assert!(!job.is_ready(1_999));
        assert!(job.is_ready(2_000));
    }

    #[test]
    fn only_not_started_jobs_are_ready() {
        let mut job = Job::new("1", "send", JobParams::None, 0, 0);
        job.mark_in_progress();
        assert!(!job.is_ready(10));
        job.mark_failed("boom");
        assert!(job.state.is_terminal());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn args_follow_params_kind() {
        let positional = Job::new(
            "1",
            "add",
            JobParams::Positional(vec![json!(1), json!(2)]),
            0,
            0,
        );
        assert_eq!(positional.args(), JobArgs::Positional(vec![json!(1), json!(2)]));
        assert_eq!(positional.args().arg(1), Some(&json!(2)));

        let named = Job::new("2", "mail", JobParams::Named(json!({"to": "a@b"})), 0, 0);
        assert_eq!(named.args().named(), Some(&json!({"to": "a@b"})));

        // An array passed as named params stays a single argument.
        let array_named = Job::new("3", "mail", JobParams::Named(json!([1, 2])), 0, 0);
        assert_eq!(array_named.args(), JobArgs::Named(json!([1, 2])));
    }

    #[test]
    fn persisted_shape_uses_camel_case_and_screaming_states() {
        let job = Job::new("17-3-0", "sendEmail", JobParams::Named(json!({"to": "x"})), 5, 5);
        let value = serde_json::to_value(&job).expect("job should serialize");
        assert_eq!(
            value,
            json!({
                "id": "17-3-0",
                "key": "sendEmail__17-3-0",
                "executionDate": 5,
                "methodName": "sendEmail",
                "params": {"to": "x"},
                "paramsKind": "named",
                "state": "NOT_STARTED"
            })
        );
    }

    #[test]
    fn legacy_records_infer_params_kind_and_key() {
        let job: Job = serde_json::from_value(json!({
            "id": "9",
            "executionDate": 1,
            "methodName": "resize",
            "params": ["a.png", 64],
            "state": "IN_PROGRESS"
        }))
        .expect("legacy record should parse");
        assert_eq!(job.key, "resize__9");
        assert_eq!(job.params_kind, ParamsKind::Positional);
        assert_eq!(job.state, JobState::InProgress);
    }

    #[test]
    fn spec_resolves_relative_and_absolute_dates() {
        assert_eq!(JobSpec::new("m").execution_date(100), 100);
        assert_eq!(JobSpec::new("m").at(42).execution_date(100), 42);
        assert_eq!(
            JobSpec::new("m")
                .after(Duration::from_millis(250))
                .execution_date(100),
            350
        );
    }
}
