use anyhow::Context;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::purge::{plan, validate_graph, PlanStep, DELETION_GRAPH};

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    validate_graph(&DELETION_GRAPH).context("deletion graph is inconsistent")?;
    let steps = plan(&DELETION_GRAPH);

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "valid": true, "steps": steps }))?);
        }
        OutputFormat::Text => {
            for line in plan_lines(&steps) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn plan_lines(steps: &[PlanStep]) -> Vec<String> {
    let mut lines = vec![
        format!("{:>3} {:<20} {:<15} {:<12} {}", "#", "TABLE", "MATCH COLUMN", "REFERENCE", "ACCESS"),
        "-".repeat(62),
    ];
    for step in steps {
        lines.push(format!(
            "{:>3} {:<20} {:<15} {:<12} {}",
            step.position, step.table, step.match_column, step.reference, step.access
        ));
    }
    lines
}
