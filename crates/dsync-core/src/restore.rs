//! Restore script rendering

use crate::snapshot::{BackupRecord, CapturedPolicy};
use std::fmt::Write;

/// Quote `value` for a POSIX shell
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell script that puts both buckets of `record` back into their captured state
///
/// The script resolves policy files relative to its own directory.
#[must_use]
pub fn render_restore_script(record: &BackupRecord) -> String {
    let mut script = String::from("#!/usr/bin/env bash\n");
    let _ = writeln!(
        script,
        "# Restores bucket policies captured for migration {} at {}",
        record.index,
        record.timestamp.to_rfc3339()
    );
    script.push_str("set -euo pipefail\n");
    script.push_str("cd \"$(dirname \"$0\")\"\n\n");

    for capture in [&record.source, &record.destination] {
        script.push_str(&restore_command(capture));
        script.push('\n');
    }

    script.push_str("\necho \"Bucket policies restored\"\n");
    script
}

fn restore_command(capture: &CapturedPolicy) -> String {
    let bucket = shell_quote(&capture.bucket);
    let profile = shell_quote(&capture.profile);
    match &capture.file {
        Some(file) => format!(
            "aws s3api put-bucket-policy --bucket {bucket} --policy {} --profile {profile}",
            shell_quote(&format!("file://{file}"))
        ),
        None => format!("aws s3api delete-bucket-policy --bucket {bucket} --profile {profile}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::path::PathBuf;

    fn capture(bucket: &str, profile: &str, file: Option<&str>) -> CapturedPolicy {
        CapturedPolicy {
            bucket: bucket.to_string(),
            profile: profile.to_string(),
            file: file.map(str::to_string),
            policy: file.map(|_| "{}".to_string()),
        }
    }

    fn record(source: CapturedPolicy, destination: CapturedPolicy) -> BackupRecord {
        BackupRecord {
            index: 1,
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            directory: PathBuf::from("/backups/mig1-20240309-140507"),
            source,
            destination,
        }
    }

    #[test]
    fn quotes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn captured_policies_are_put_back() {
        let script = render_restore_script(&record(
            capture("legacy-assets", "legacy", Some("source-bucket-policy.json")),
            capture("platform-assets", "platform", Some("dest-bucket-policy.json")),
        ));

        assert!(script.starts_with("#!/usr/bin/env bash\n"));
        assert!(script.contains(
            "aws s3api put-bucket-policy --bucket 'legacy-assets' --policy 'file://source-bucket-policy.json' --profile 'legacy'"
        ));
        assert!(script.contains(
            "aws s3api put-bucket-policy --bucket 'platform-assets' --policy 'file://dest-bucket-policy.json' --profile 'platform'"
        ));
        assert!(!script.contains("delete-bucket-policy"));
    }

    #[test]
    fn absent_policy_is_deleted() {
        let script = render_restore_script(&record(
            capture("legacy-assets", "legacy", Some("source-bucket-policy.json")),
            capture("platform-assets", "platform", None),
        ));

        assert!(script.contains(
            "aws s3api delete-bucket-policy --bucket 'platform-assets' --profile 'platform'"
        ));
        assert_eq!(script.matches("aws s3api").count(), 2);
    }
}
