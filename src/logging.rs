//! Optional JSON Lines sink appending one timestamped snapshot per tick.

use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// A snapshot stamped with wall-clock time for offline correlation. Unlike
/// the stdout export, logged records also carry which domains went stale.
#[derive(Serialize)]
struct Record<'a> {
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stale_domains: Vec<&'static str>,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

/// Appends snapshots to a JSON Lines file.
pub struct SnapshotLogger {
    writer: BufWriter<File>,
    samples_written: u64,
}

impl SnapshotLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())
            .context("Failed to create snapshot log file")?;

        Ok(Self {
            writer: BufWriter::new(file),
            samples_written: 0,
        })
    }

    /// Append one snapshot to the log file.
    pub fn log(&mut self, snapshot: &Snapshot) -> Result<()> {
        let record = Record {
            timestamp: Utc::now(),
            stale_domains: snapshot.stale.domains(),
            snapshot,
        };
        let json = serde_json::to_string(&record)?;
        writeln!(self.writer, "{}", json)?;
        self.samples_written += 1;

        // Flush every 10 samples to avoid losing data on crash
        if self.samples_written % 10 == 0 {
            self.writer.flush()?;
        }

        Ok(())
    }
}
