//! Text rendering of command results

use colored::Colorize;

use crate::deploy::attempt::DeploymentAttempt;
use crate::deploy::pipeline::DeployPlan;
use crate::fleet::orchestrator::StatusRow;
use crate::ledger::{Notification, RecordOutcome};
use crate::models::history::DeployHistoryEntry;

/// Message printed when a history query matches nothing
pub const NO_HISTORY: &str = "No deployments recorded";

/// Header plus exactly one line per service
pub fn status_table(rows: &[StatusRow]) -> String {
    let service_width = column_width(rows.iter().map(|r| r.service.as_str()), "SERVICE");
    let host_width = column_width(rows.iter().map(|r| r.host.as_str()), "HOST");
    let manager_width = column_width(rows.iter().map(|r| r.manager.as_str()), "MANAGER");

    let mut out = format!(
        "{:<service_width$}  {:<host_width$}  {:<manager_width$}  {}\n",
        "SERVICE", "HOST", "MANAGER", "STATUS"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<service_width$}  {:<host_width$}  {:<manager_width$}  {}\n",
            row.service,
            row.host,
            row.manager,
            paint_status(&row.status)
        ));
    }
    out
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values.map(str::len).chain([header.len()]).max().unwrap_or(0)
}

fn paint_status(status: &str) -> String {
    match status {
        "active" | "running" => status.green().to_string(),
        "activating" | "pending" | "reloading" => status.yellow().to_string(),
        _ => status.red().to_string(),
    }
}

/// Ledger rows, most recent first
pub fn history(entries: &[DeployHistoryEntry]) -> String {
    if entries.is_empty() {
        return format!("{NO_HISTORY}\n");
    }

    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{} {} {} {}",
            entry.deployed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.service_name.bold(),
            entry.commit.yellow(),
            entry.version.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("  by {}", entry.deployed_by));
        if let Some(previous) = &entry.previous_commit {
            out.push_str(&format!("  (from {previous})"));
        }
        out.push('\n');
        for line in entry.changes.lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("    {line}\n"));
        }
    }
    out
}

pub fn recorded(outcome: &RecordOutcome) -> String {
    let entry = &outcome.entry;
    let notification = match &outcome.notification {
        Notification::Sent => "sent".green().to_string(),
        Notification::Disabled => "disabled".to_string(),
        Notification::NotConfigured => "not configured".yellow().to_string(),
        Notification::Failed(e) => format!("{} ({e})", "failed".yellow()),
    };
    format!(
        "Recorded deployment #{} of {} @ {}\n  Version:      {}\n  Deployed by:  {}\n  Notification: {}\n",
        entry.id,
        entry.service_name,
        entry.commit,
        entry.version.as_deref().unwrap_or("-"),
        entry.deployed_by,
        notification
    )
}

pub fn plans(plans: &[DeployPlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        out.push_str(&format!("{} -> {} ({})\n", plan.service.bold(), plan.host, plan.target));
        out.push_str(&format!("  build:    {}\n", plan.artifact.display()));
        out.push_str(&format!("  upload:   {}\n", plan.upload_to));
        out.push_str(&format!("  activate: {}\n", plan.activation));
        out.push_str(&format!("  verify:   {}\n", plan.verification));
    }
    out
}

pub fn deployed(attempts: &[DeploymentAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} {} @ {}\n", "deployed".green(), a.service(), a.expected_commit()))
        .collect()
}
