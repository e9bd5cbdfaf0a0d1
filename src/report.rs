// Run report: the per-run accumulation of upload outcomes and the
// machine-readable mapping payload. The payload is JSON restricted to
// the ASCII range and then Base64-encoded so it survives as one opaque
// token inside arbitrary log streams, bracketed by fixed sentinel lines
// a downstream scraper can search for.

use std::io::{self, Write};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

/// Sentinel line printed before the mapping payload.
pub const MAPPING_START: &str = "===FILENAME_MAPPING_START===";
/// Sentinel line printed after the mapping payload.
pub const MAPPING_END: &str = "===FILENAME_MAPPING_END===";

/// One successful upload: the zero-based position of the file in the
/// input list, its original (un-encoded) filename, and the asset id the
/// server assigned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub index: usize,
    pub original_name: String,
    pub asset_id: u64,
}

/// Accumulated outcome of one run. Counters plus the success records,
/// touched only by the single control thread.
#[derive(Debug, Default)]
pub struct RunReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub records: Vec<AssetRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, index: usize, original_name: String, asset_id: u64) {
        self.success_count += 1;
        self.records.push(AssetRecord {
            index,
            original_name,
            asset_id,
        });
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
    }

    /// True when every input file succeeded; drives the exit code.
    pub fn is_clean(&self) -> bool {
        self.fail_count == 0
    }

    /// The Base64 payload for the success records, or `None` when no
    /// upload succeeded (the mapping block is omitted entirely then).
    pub fn mapping_payload(&self) -> Result<Option<String>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let json = to_ascii_json(&self.records)?;
        Ok(Some(BASE64.encode(json)))
    }
}

/// Serialize `value` to compact JSON with every non-ASCII character
/// escaped as `\uXXXX` (surrogate pairs above the BMP), so the result
/// contains only ASCII bytes.
pub fn to_ascii_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter::new());
    value
        .serialize(&mut ser)
        .context("Serializing mapping records to JSON")?;
    // The formatter only ever emits ASCII bytes.
    String::from_utf8(buf).context("ASCII JSON output was not valid UTF-8")
}

/// JSON formatter that escapes non-ASCII characters in string values.
/// Everything else keeps the compact formatter's default behavior.
struct AsciiFormatter;

impl AsciiFormatter {
    fn new() -> Self {
        AsciiFormatter
    }
}

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                let mut utf8 = [0u8; 4];
                writer.write_all(ch.encode_utf8(&mut utf8).as_bytes())?;
            } else {
                let mut utf16 = [0u16; 2];
                for unit in ch.encode_utf16(&mut utf16) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
