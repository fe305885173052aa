use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::{DatabaseManager, PgPurgeStore};
use crate::purge::{LegacyUserPurger, PurgeError, PurgeSummary};

pub async fn handle(user_id: i64, dry_run: bool, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    if !config.purge.enabled && !dry_run {
        anyhow::bail!("Legacy user purge is disabled (PURGE_ENABLED=false)");
    }

    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the campus database")?;
    let store = PgPurgeStore::new(pool).with_query_logging(config.database.enable_query_logging);
    let purger = LegacyUserPurger::new(Arc::new(store)).with_timeout(config.purge.timeout());

    let result = if dry_run {
        purger.preview_legacy_user(user_id).await
    } else {
        purger.delete_legacy_user(user_id).await
    };

    match result {
        Ok(summary) => match output_format {
            OutputFormat::Json => output_success(
                &output_format,
                summary.message(),
                Some(json!({ "summary": serde_json::to_value(&summary)? })),
            ),
            OutputFormat::Text => {
                for line in summary_lines(&summary) {
                    println!("{}", line);
                }
                Ok(())
            }
        },
        Err(e) => {
            if let OutputFormat::Json = output_format {
                output_error(&output_format, &e.to_string(), Some(error_code(&e)))?;
            }
            Err(e.into())
        }
    }
}

fn error_code(error: &PurgeError) -> &'static str {
    match error {
        PurgeError::NotFound(_) => "NOT_FOUND",
        PurgeError::InProgress(_) => "CONFLICT",
        PurgeError::Fatal { .. } => "PURGE_FAILED",
    }
}

/// Text rendering: headline, tables with rows removed, then failed steps
fn summary_lines(summary: &PurgeSummary) -> Vec<String> {
    let mut lines = vec![format!("✓ {}", summary.message())];

    let touched: Vec<_> = summary.tables().iter().filter(|(_, rows)| **rows > 0).collect();
    if !touched.is_empty() {
        lines.push(format!("  {:<24} {:>8}", "TABLE", "ROWS"));
        for (table, rows) in touched {
            lines.push(format!("  {:<24} {:>8}", table, rows));
        }
    }

    if !summary.failed_steps().is_empty() {
        lines.push("Failed steps (skipped):".to_string());
        for failure in summary.failed_steps() {
            lines.push(format!("  {}: {}", failure.table, failure.message));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purge::summary::{PurgeReport, StepOutcome};

    #[test]
    fn text_summary_lists_touched_tables_and_failures() {
        let mut report = PurgeReport::new(500);
        report.record("payments", &StepOutcome::Deleted { rows: 3 });
        report.record("grades", &StepOutcome::Skipped);
        report.record(
            "login_history",
            &StepOutcome::Failed {
                message: "relation \"login_history\" does not exist".to_string(),
            },
        );
        report.record("users", &StepOutcome::Deleted { rows: 1 });

        let lines = summary_lines(&report.summary(false));

        assert_eq!(
            lines[0],
            "✓ Deleted legacy user 500: 4 rows across 2 tables removed (1 step skipped after errors)"
        );
        assert!(lines.iter().any(|l| l.contains("payments") && l.ends_with('3')));
        assert!(!lines.iter().any(|l| l.contains("grades")));
        assert!(lines.iter().any(|l| l.starts_with("  login_history: relation")));
    }

    #[test]
    fn error_codes_follow_http_mapping() {
        assert_eq!(error_code(&PurgeError::NotFound(1)), "NOT_FOUND");
        assert_eq!(error_code(&PurgeError::InProgress(1)), "CONFLICT");
    }
}
