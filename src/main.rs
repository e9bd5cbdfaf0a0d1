// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, install the stderr log layer,
//   run one upload job and map the report to the exit code.
// - Stdout is reserved for the scraper-facing status lines printed by
//   `run`; everything diagnostic goes to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use release_upload::run::{run, UploadJob};

/// Upload local files as assets to an existing GitHub release.
#[derive(Parser, Debug)]
#[command(name = "release-upload")]
struct Cli {
    /// GitHub token with permission to upload release assets.
    token: String,
    /// Repository owner (user or organization).
    owner: String,
    /// Repository name.
    repo: String,
    /// Tag name of the release to attach assets to.
    tag_name: String,
    /// Files to upload, in order. The mapping output indexes into this list.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Malformed invocations print usage and exit 1, same as any run
    // failure; --help/--version still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let job = UploadJob {
        token: cli.token,
        owner: cli.owner,
        repo: cli.repo,
        tag: cli.tag_name,
        files: cli.files,
    };

    match run(&job) {
        Ok(report) if report.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
