// Orchestrator: drives one upload run. The release is resolved once and
// its upload URL reused for every file; each file is then processed in
// input order, printing one status line per file. Stdout is a contract
// consumed by a log scraper, so only the lines below are ever printed
// there; diagnostics go to stderr via `tracing`.

use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::api::{asset_filename, ReleaseClient, GITHUB_API_BASE};
use crate::report::{RunReport, MAPPING_END, MAPPING_START};
use crate::retry::RetryPolicy;

/// Everything one run needs: credentials, the release coordinates and
/// the files to upload, in order.
#[derive(Debug)]
pub struct UploadJob {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub files: Vec<PathBuf>,
}

/// Run against the hosted GitHub API.
pub fn run(job: &UploadJob) -> Result<RunReport> {
    run_with_base(GITHUB_API_BASE, job)
}

/// Run against an explicit API base. Split out so tests can point the
/// whole flow at a local fixture server.
pub fn run_with_base(api_base: &str, job: &UploadJob) -> Result<RunReport> {
    let client = ReleaseClient::new(api_base, &job.token, RetryPolicy::default())?;

    // Single resolution per run. On failure the error text is kept and
    // reported once per file below, so the log volume per input file
    // stays the same as if each file had failed its own lookup.
    let upload_url = client
        .resolve_upload_url(&job.owner, &job.repo, &job.tag)
        .map_err(|e| format!("{e:#}"));

    let mut report = RunReport::new();
    for (index, path) in job.files.iter().enumerate() {
        if !path.exists() {
            println!("❌ File not found: {}", path.display());
            report.record_failure();
            continue;
        }

        let filename = match asset_filename(path) {
            Ok(name) => name,
            Err(e) => {
                println!("❌ Failed to upload {}: {:#}", path.display(), e);
                report.record_failure();
                continue;
            }
        };

        match &upload_url {
            Ok(url) => match client.upload_asset(url, path) {
                Ok(asset) => {
                    println!("✅ Successfully uploaded: {}", filename);
                    report.record_success(index, filename, asset.id);
                }
                Err(e) => {
                    println!("❌ Failed to upload {}: {:#}", filename, e);
                    report.record_failure();
                }
            },
            Err(resolve_err) => {
                println!("❌ Failed to upload {}: {}", filename, resolve_err);
                report.record_failure();
            }
        }
    }

    println!(
        "\n📊 Results: {} succeeded, {} failed",
        report.success_count, report.fail_count
    );

    if let Some(payload) = report.mapping_payload()? {
        println!("\n{}", MAPPING_START);
        println!("{}", payload);
        println!("{}", MAPPING_END);
    }

    debug!(
        success = report.success_count,
        failed = report.fail_count,
        "run finished"
    );
    Ok(report)
}
