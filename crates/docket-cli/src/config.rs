//! `docket.toml` loading.
//!
//! ```toml
//! [datastore]
//! directory = "data/docs"
//!
//! [jobs]
//! directory = "data/jobs"
//! max_concurrent_jobs = 4
//! ```
//!
//! Relative directories resolve against the config file's location.

use crate::cli::Common;
use crate::error::CliError;
use docket_jobs::JobQueueOptions;
use docket_store::DatastoreOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "docket.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocketConfig {
    #[serde(default)]
    pub datastore: Option<DatastoreOptions>,
    #[serde(default)]
    pub jobs: Option<JobQueueOptions>,
}

impl DocketConfig {
    /// Load the config named by `--config`, or `docket.toml` when present.
    ///
    /// A missing default file yields an empty config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path).map_err(|source| CliError::ReadConfig {
            path: path.clone(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| CliError::ParseConfig {
            path: path.clone(),
            source,
        })?;
        config.resolve_relative_to(path.parent().unwrap_or(Path::new("")));
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(datastore) = self.datastore.as_mut() {
            datastore.directory = join_relative(base, &datastore.directory);
        }
        if let Some(jobs) = self.jobs.as_mut() {
            jobs.directory = join_relative(base, &jobs.directory);
        }
    }

    /// Datastore options with `--dir` applied.
    pub fn datastore_options(&self, common: &Common) -> Result<DatastoreOptions, CliError> {
        match (&common.dir, &self.datastore) {
            (Some(dir), _) => Ok(DatastoreOptions {
                directory: dir.clone(),
            }),
            (None, Some(options)) => Ok(options.clone()),
            (None, None) => Err(CliError::MissingDirectory {
                section: "datastore",
            }),
        }
    }

    /// Job queue options with `--dir` applied.
    pub fn job_options(&self, common: &Common) -> Result<JobQueueOptions, CliError> {
        match (&common.dir, &self.jobs) {
            (Some(dir), Some(options)) => Ok(JobQueueOptions {
                directory: dir.clone(),
                ..options.clone()
            }),
            (Some(dir), None) => Ok(JobQueueOptions::new(dir)),
            (None, Some(options)) => Ok(options.clone()),
            (None, None) => Err(CliError::MissingDirectory { section: "jobs" }),
        }
    }
}

fn join_relative(base: &Path, directory: &Path) -> PathBuf {
    if directory.is_absolute() {
        directory.to_path_buf()
    } else {
        base.join(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(dir: Option<&str>) -> Common {
        Common {
            config: None,
            dir: dir.map(PathBuf::from),
            json: false,
        }
    }

    #[test]
    fn tables_resolve_against_the_config_location() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("docket.toml");
        fs::write(
            &path,
            "[datastore]\ndirectory = \"docs\"\n\n[jobs]\ndirectory = \"/srv/jobs\"\nmax_concurrent_jobs = 3\n",
        )
        .expect("config should write");

        let config = DocketConfig::load(Some(&path)).expect("config should load");
        let store = config.datastore_options(&common(None)).expect("datastore");
        assert_eq!(store.directory, dir.path().join("docs"));

        let jobs = config.job_options(&common(None)).expect("jobs");
        assert_eq!(jobs.directory, PathBuf::from("/srv/jobs"));
        assert_eq!(jobs.max_concurrent_jobs, 3);
    }

    #[test]
    fn dir_flag_overrides_the_file() {
        let config = DocketConfig {
            datastore: Some(DatastoreOptions {
                directory: PathBuf::from("a"),
            }),
            jobs: Some(JobQueueOptions::new("b").max_concurrent_jobs(2)),
        };
        let flags = common(Some("override"));

        let store = config.datastore_options(&flags).expect("datastore");
        assert_eq!(store.directory, PathBuf::from("override"));
        let jobs = config.job_options(&flags).expect("jobs");
        assert_eq!(jobs.directory, PathBuf::from("override"));
        assert_eq!(jobs.max_concurrent_jobs, 2);
    }

    #[test]
    fn missing_sections_need_a_dir_flag() {
        let err = DocketConfig::default()
            .datastore_options(&common(None))
            .expect_err("no directory anywhere");
        assert!(err.to_string().contains("--dir"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = DocketConfig::load(Some(&dir.path().join("nope.toml")))
            .expect_err("missing explicit config");
        assert!(matches!(err, CliError::ReadConfig { .. }));
    }

    #[test]
    fn unknown_tables_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("docket.toml");
        fs::write(&path, "[datastor]\ndirectory = \"x\"\n").expect("config should write");
        let err = DocketConfig::load(Some(&path)).expect_err("typo should fail");
        assert!(matches!(err, CliError::ParseConfig { .. }));
    }
}
