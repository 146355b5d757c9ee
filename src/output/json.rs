//! JSON lines output
//!
//! One compact JSON object per poll, newline terminated, so the stream can be
//! tailed and fed to `jq` or a log shipper. Operation columns always use the
//! long names; peak times carry both epoch seconds and RFC 3339.

use super::{PollReport, Reporter};
use crate::Result;
use anyhow::Context;
use std::io::Write;

/// Writes one JSON object per report
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn emit(&mut self, report: &PollReport) -> Result<()> {
        serde_json::to_writer(&mut self.out, report).context("Failed to serialize report")?;
        self.out
            .write_all(b"\n")
            .and_then(|_| self.out.flush())
            .context("Failed to write report")
    }
}
