//! Read-only inspection and pruning of a job directory.
//!
//! These commands open the job files directly and never dispatch, so no
//! handler runs. Do not point them at a directory a live queue is using.

use crate::cli::Common;
use crate::commands::print_json;
use crate::config::DocketConfig;
use crate::error::CliError;
use chrono::{DateTime, SecondsFormat};
use docket_jobs::Job;
use docket_store::StorageEngine;
use serde_json::json;

async fn open_jobs(common: &Common) -> Result<StorageEngine<Job>, CliError> {
    let config = DocketConfig::load(common.config.as_deref())?;
    let options = config.job_options(common)?;
    let store = StorageEngine::<Job>::open(options.directory)?;
    store.load().await?;
    Ok(store)
}

fn due_at(job: &Job) -> String {
    DateTime::from_timestamp_millis(job.execution_date)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| job.execution_date.to_string())
}

pub async fn run_list(common: Common) -> Result<(), CliError> {
    let store = open_jobs(&common).await?;
    let mut jobs: Vec<Job> = store.records().into_iter().map(|(_, job)| job).collect();
    jobs.sort_by(|a, b| {
        a.execution_date
            .cmp(&b.execution_date)
            .then_with(|| a.key.cmp(&b.key))
    });

    if common.json {
        print_json(&json!({
            "action": "jobs.list",
            "directory": store.directory().display().to_string(),
            "count": jobs.len(),
            "items": jobs,
        }));
        return Ok(());
    }
    println!(
        "docket jobs list\n  Directory: {}\n  Count: {}",
        store.directory().display(),
        jobs.len()
    );
    for job in &jobs {
        let state = serde_json::to_value(job.state)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        println!("  - {} [{state}] due {}", job.key, due_at(job));
    }
    Ok(())
}

pub async fn run_clear(method: String, common: Common) -> Result<(), CliError> {
    let store = open_jobs(&common).await?;
    let victims = store.filter(|job| job.method_name == method);
    for job in &victims {
        store.delete(&job.key).await?;
    }
    tracing::info!(method = %method, removed = victims.len(), "cleared jobs");

    if common.json {
        print_json(&json!({
            "action": "jobs.clear",
            "method": method,
            "removed": victims.len(),
        }));
    } else {
        println!(
            "docket jobs clear\n  Method: {method}\n  Removed: {}",
            victims.len()
        );
    }
    Ok(())
}
