//! Job queue configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 1;

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobQueueOptions {
    /// Directory holding one file per pending job.
    pub directory: PathBuf,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Delay before the first dispatch after `start`.
    #[serde(default)]
    pub start_delay_ms: Option<u64>,
}

impl JobQueueOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            start_delay_ms: None,
        }
    }

    pub fn max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn start_delay_duration(&self) -> Option<Duration> {
        self.start_delay_ms.map(Duration::from_millis)
    }
}

/// Per-call overrides for [`JobQueue::start`](crate::JobQueue::start).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub start_delay: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_options_fill_defaults() {
        let options: JobQueueOptions =
            toml::from_str("directory = \"/var/lib/docket/jobs\"").expect("options parse");
        assert_eq!(options.max_concurrent_jobs, 1);
        assert_eq!(options.start_delay_duration(), None);

        let tuned: JobQueueOptions = toml::from_str(
            "directory = \"jobs\"\nmax_concurrent_jobs = 4\nstart_delay_ms = 1500\n",
        )
        .expect("options parse");
        assert_eq!(tuned.max_concurrent_jobs, 4);
        assert_eq!(tuned.start_delay_duration(), Some(Duration::from_millis(1500)));
    }
}
