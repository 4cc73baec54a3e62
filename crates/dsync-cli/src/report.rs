//! Final run report

use dsync_core::{MigrationConfig, MigrationError, RollbackOutcome, RunMode, RunReport};
use std::fmt::Write;

const RULE: &str = "============================================================";

pub(crate) fn banner(mode: RunMode) -> String {
    let suffix = if mode.is_dry_run() { " (DRY RUN)" } else { "" };
    format!("{RULE}\nDataSync Setup{suffix}\n{RULE}")
}

/// Command that starts one task
pub(crate) fn start_command(task_arn: &str, region: &str, profile: &str) -> String {
    format!(
        "aws datasync start-task-execution --task-arn {task_arn} --region {region} --profile {profile}"
    )
}

fn headline(report: &RunReport) -> String {
    let done = report.results.len();
    let total = report.total;
    let suffix = if report.mode.is_dry_run() { " (DRY RUN)" } else { "" };
    match &report.failure {
        None if report.mode.is_dry_run() => "✅ DRY RUN COMPLETE".to_string(),
        None => format!("✅ {done} migration(s) configured"),
        Some(_) if report.is_success() => {
            format!("⚠️  {done} of {total} migration(s) configured{suffix}")
        }
        Some(_) => format!("❌ Run aborted: {done} of {total} migration(s) configured{suffix}"),
    }
}

/// Human-readable summary of a run
pub(crate) fn render(report: &RunReport, config: &MigrationConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{RULE}\n{}\n{RULE}\n", headline(report));

    for result in &report.results {
        let _ = writeln!(
            out,
            "Migration {}: {} → {}",
            result.index, result.spec.source_bucket, result.spec.destination_bucket
        );
        let _ = writeln!(out, "  Task: {}", result.task_arn);
        if let Some(backup) = &result.backup {
            let _ = writeln!(out, "  Backup: {}", backup.directory.display());
            let _ = writeln!(out, "  Restore: {}", backup.restore_script().display());
        }
        out.push('\n');
    }

    if let Some(failure) = &report.failure {
        let _ = writeln!(
            out,
            "❌ Migration {} failed: {} → {}",
            failure.index, failure.spec.source_bucket, failure.spec.destination_bucket
        );
        let _ = writeln!(out, "  Error: {}", failure.error);
        if let MigrationError::Provisioning(build) = &failure.error {
            for entry in build.rollback.entries() {
                match &entry.outcome {
                    RollbackOutcome::Deleted => {
                        let _ = writeln!(
                            out,
                            "  Rolled back {}: {}",
                            entry.resource.kind, entry.resource.arn
                        );
                    }
                    RollbackOutcome::Failed(err) => {
                        let _ = writeln!(
                            out,
                            "  NOT rolled back {}: {} ({err})",
                            entry.resource.kind, entry.resource.arn
                        );
                    }
                }
            }
        }
        let skipped = report.skipped();
        if skipped > 0 {
            let _ = writeln!(out, "  {skipped} later migration(s) not attempted");
        }
        out.push('\n');
    }

    if !report.mode.is_dry_run() && !report.results.is_empty() {
        out.push_str("▶️  Start migration(s):\n");
        for result in &report.results {
            let _ = writeln!(
                out,
                "   {}",
                start_command(&result.task_arn, &config.aws_region, &config.profiles.source)
            );
        }
    }
    out
}
