use chrono::{DateTime, Utc};
use clap::ValueEnum;
use regscan_core::{BlobRecord, ReconcileOperationResult, ReconcileStats, ReconciliationResult};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    bucket: &'a str,
    scanned_at: DateTime<Utc>,
    total_blobs: usize,
    referenced_blobs: usize,
    orphan_blobs: usize,
    blobs: Vec<&'a BlobRecord>,
    stats: &'a ReconcileStats,
}

fn selected_blobs(
    blobs: &ReconciliationResult,
    orphans_only: bool,
) -> impl Iterator<Item = &BlobRecord> {
    blobs
        .iter()
        .filter(move |record| !orphans_only || !record.referenced)
}

/// One `<digest> <referenced>` line per blob, then the two summary counts.
///
/// `orphans_only` narrows the per-blob lines; the counts always cover every blob.
pub fn write_text<W: Write>(
    out: &mut W,
    blobs: &ReconciliationResult,
    orphans_only: bool,
) -> io::Result<()> {
    for record in selected_blobs(blobs, orphans_only) {
        writeln!(out, "{} {}", record.digest, record.referenced)?;
    }
    writeln!(out, "Total blobs found: {}", blobs.total_blobs())?;
    writeln!(out, "Blobs used by manifests: {}", blobs.referenced_blobs())?;
    Ok(())
}

pub fn write_json<W: Write>(
    out: &mut W,
    bucket: &str,
    result: &ReconcileOperationResult,
    orphans_only: bool,
) -> io::Result<()> {
    let report = ScanReport {
        bucket,
        scanned_at: Utc::now(),
        total_blobs: result.blobs.total_blobs(),
        referenced_blobs: result.blobs.referenced_blobs(),
        orphan_blobs: result.blobs.orphan_blobs(),
        blobs: selected_blobs(&result.blobs, orphans_only).collect(),
        stats: &result.stats,
    };

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regscan_core::Digest;

    fn sample() -> ReconciliationResult {
        let blobs = ["a", "b", "c"].map(Digest::from);
        let links = ["a", "a", "d"].map(Digest::from);
        ReconciliationResult::merge(blobs, links)
    }

    #[test]
    fn test_write_text() {
        let mut out = Vec::new();
        write_text(&mut out, &sample(), false).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "a true\nb false\nc false\nTotal blobs found: 3\nBlobs used by manifests: 1\n"
        );
    }

    #[test]
    fn test_write_text_orphans_only_keeps_totals() {
        let mut out = Vec::new();
        write_text(&mut out, &sample(), true).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "b false\nc false\nTotal blobs found: 3\nBlobs used by manifests: 1\n"
        );
    }

    #[test]
    fn test_write_json() {
        let result = ReconcileOperationResult {
            blobs: sample(),
            stats: ReconcileStats {
                dangling_links: 1,
                ..ReconcileStats::default()
            },
        };

        let mut out = Vec::new();
        write_json(&mut out, "registry", &result, true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["bucket"], "registry");
        assert_eq!(value["total_blobs"], 3);
        assert_eq!(value["referenced_blobs"], 1);
        assert_eq!(value["orphan_blobs"], 2);
        assert_eq!(value["blobs"].as_array().unwrap().len(), 2);
        assert_eq!(value["blobs"][0]["digest"], "b");
        assert_eq!(value["blobs"][0]["referenced"], false);
        assert_eq!(value["stats"]["dangling_links"], 1);
    }
}
