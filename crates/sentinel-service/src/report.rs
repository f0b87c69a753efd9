//! Text and JSON renderings for `status`, `show` and `log`.

use anyhow::Result;
use sentinel_core::models::{
    ForensicChecksumRecord, ForensicMetadataRecord, LogEntry, MismatchKind, TrackedFile,
};
use sentinel_core::BaselineStore;
use serde::Serialize;
use std::fmt::Write;

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub fn render_status(files: &[TrackedFile]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<8} {:<8} {:<8} PATH", "RESTORE", "EMAIL", "DEGRADED");
    for file in files {
        let _ = writeln!(
            out,
            "{:<8} {:<8} {:<8} {}",
            flag(file.policy.auto_restore),
            flag(file.policy.auto_email),
            flag(file.degraded),
            file.path
        );
    }
    let degraded = files.iter().filter(|f| f.degraded).count();
    let _ = writeln!(out, "{} tracked, {} degraded", files.len(), degraded);
    out
}

/// A log entry with the forensic record written alongside it, if any
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    #[serde(flatten)]
    pub entry: LogEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ForensicChecksumRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ForensicMetadataRecord>,
}

pub fn collect_log(store: &BaselineStore, entries: Vec<LogEntry>, forensic: bool) -> Result<Vec<LogLine>> {
    entries
        .into_iter()
        .map(|entry| -> Result<LogLine> {
            let (checksum, metadata) = if forensic {
                match entry.mismatch {
                    MismatchKind::Checksum => (store.checksum_record(entry.id)?, None),
                    MismatchKind::Metadata => (None, store.metadata_record(entry.id)?),
                    _ => (None, None),
                }
            } else {
                (None, None)
            };
            Ok(LogLine {
                entry,
                checksum,
                metadata,
            })
        })
        .collect()
}

pub fn render_log(lines: &[LogLine]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<25} {:<11} PATH", "TIMESTAMP", "MISMATCH");
    for line in lines {
        let _ = writeln!(
            out,
            "{:<25} {:<11} {}",
            line.entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            line.entry.mismatch.as_str(),
            line.entry.path
        );
        if let Some(record) = &line.checksum {
            let _ = writeln!(
                out,
                "    bad digest {} ({} bytes captured)",
                record.bad_digest, record.bad_size
            );
        }
        if let Some(record) = &line.metadata {
            let _ = writeln!(
                out,
                "    bad owner {} group {} mode {:o}",
                record.bad_owner, record.bad_group, record.bad_permission
            );
        }
    }
    out
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    #[serde(flatten)]
    pub file: TrackedFile,
    pub log: Vec<LogLine>,
}

pub fn render_show(details: &FileDetails) -> String {
    let file = &details.file;
    let mut out = String::new();
    let _ = writeln!(out, "path:          {}", file.path);
    let _ = writeln!(out, "digest:        {}", file.good_digest);
    let _ = writeln!(out, "owner:group:   {}:{}", file.baseline.owner, file.baseline.group);
    let _ = writeln!(out, "mode:          {:o}", file.baseline.permission);
    let _ = writeln!(
        out,
        "modified:      {}",
        file.baseline.mod_time().format("%Y-%m-%d %H:%M:%S%.9f UTC")
    );
    let _ = writeln!(out, "snapshot:      {} bytes", file.snapshot_size);
    let _ = writeln!(out, "auto-restore:  {}", flag(file.policy.auto_restore));
    let _ = writeln!(out, "auto-email:    {}", flag(file.policy.auto_email));
    let _ = writeln!(out, "degraded:      {}", flag(file.degraded));
    let _ = writeln!(out, "checks:        {}", details.log.len());
    if !details.log.is_empty() {
        out.push('\n');
        out.push_str(&render_log(&details.log));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::models::{FileMetadata, Policy};

    fn tracked(path: &str, degraded: bool) -> TrackedFile {
        TrackedFile {
            id: 1,
            path: path.into(),
            good_digest: "abc".into(),
            degraded,
            policy: Policy::default(),
            baseline: FileMetadata {
                permission: 0o644,
                owner: 0,
                group: 0,
                mod_time_ns: 0,
            },
            snapshot_size: 3,
        }
    }

    #[test]
    fn status_counts_degraded() {
        let text = render_status(&[tracked("/etc/a", false), tracked("/etc/b", true)]);
        assert!(text.contains("/etc/a"));
        assert!(text.ends_with("2 tracked, 1 degraded\n"));
    }

    #[test]
    fn show_includes_mode_in_octal() {
        let details = FileDetails {
            file: tracked("/etc/a", false),
            log: Vec::new(),
        };
        let text = render_show(&details);
        assert!(text.contains("mode:          644"));
        assert!(text.contains("checks:        0"));
    }

    #[test]
    fn show_serializes_flat() {
        let details = FileDetails {
            file: tracked("/etc/a", false),
            log: Vec::new(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["path"], "/etc/a");
        assert_eq!(json["baseline"]["permission"], 0o644);
        assert!(json["log"].as_array().unwrap().is_empty());
    }
}
