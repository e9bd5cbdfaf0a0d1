// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) parses arguments and delegates to these modules.
//
// Module responsibilities:
// - `retry`: Retry policy configuration and the retrying request sender
//   used for every HTTP call the tool makes.
// - `api`: Encapsulates HTTP interactions with the GitHub API (resolve a
//   release by tag, upload a single asset).
// - `report`: Per-run accumulation of outcomes and the Base64/JSON
//   mapping payload printed for downstream log scrapers.
// - `run`: The sequential orchestrator that drives one upload run and
//   prints the stdout contract.
//
// Keeping this separation makes it easy to test the API logic against a
// local fixture server without going through the binary.
pub mod api;
pub mod report;
pub mod retry;
pub mod run;
