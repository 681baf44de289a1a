//! Prompt assembly: turns project rows into a plain-text digest the model
//! can reason over.

use crate::baseline::storage::BaselineComparison;
use crate::budget::model::BudgetSummary;
use crate::procurement::model::ProcurementItem;
use crate::projects::model::Project;
use crate::tasks::model::Task;

use super::client::Message;

pub const REPORT_TYPES: [&str; 4] = ["status", "weekly", "variance", "procurement"];

pub fn valid_report_type(report_type: &str) -> bool {
    REPORT_TYPES.contains(&report_type)
}

fn system_prompt(report_type: &str) -> String {
    let focus = match report_type {
        "weekly" => "Summarize the last week of activity and what is planned next.",
        "variance" => {
            "Focus on schedule and cost variance against the baseline: call out slipped tasks, \
             SPI/CPI below 1.0, and recommended corrective actions."
        }
        "procurement" => {
            "Focus on the procurement pipeline: items stuck in early stages, late deliveries \
             and cost exposure by category."
        }
        _ => "Give a concise overall status: schedule, budget, risks and next steps.",
    };
    format!(
        "You are a project controls assistant for interior fit-out projects. \
         Write a clear, factual report in markdown from the data provided. \
         Do not invent numbers. {focus}"
    )
}

fn cents(v: i64) -> String {
    format!("{:.2}", v as f64 / 100.0)
}

fn digest_project(out: &mut String, project: &Project) {
    out.push_str(&format!(
        "# Project: {}\nstatus: {} | progress: {}% | budget: {} {}\n",
        project.name,
        project.status,
        project.progress,
        cents(project.budget_total_cents),
        project.currency,
    ));
    if let (Some(start), Some(end)) = (&project.start_date, &project.end_date) {
        out.push_str(&format!("schedule: {start} to {end}\n"));
    }
}

fn digest_tasks(out: &mut String, tasks: &[Task]) {
    out.push_str(&format!("\n## Tasks ({})\n", tasks.len()));
    for t in tasks {
        out.push_str(&format!(
            "- {} [{} / {} / {}%] planned {} to {}",
            t.title,
            t.status,
            t.priority,
            t.progress,
            t.planned_start.as_deref().unwrap_or("?"),
            t.planned_end.as_deref().unwrap_or("?"),
        ));
        if let Some(end) = &t.actual_end {
            out.push_str(&format!(", finished {end}"));
        }
        out.push('\n');
    }
}

fn digest_budget(out: &mut String, summary: &BudgetSummary) {
    out.push_str(&format!(
        "\n## Budget\nspent: {} of {} (remaining {})\n",
        cents(summary.spent_cents),
        cents(summary.budget_total_cents),
        cents(summary.remaining_cents),
    ));
    for line in &summary.by_category {
        out.push_str(&format!("- {}: {}\n", line.category, cents(line.spent_cents)));
    }
}

fn digest_procurement(out: &mut String, items: &[ProcurementItem]) {
    out.push_str(&format!("\n## Procurement ({} items)\n", items.len()));
    for i in items {
        out.push_str(&format!(
            "- {} x{} [{}] {} each, expected {}\n",
            i.name,
            i.quantity,
            i.status,
            cents(i.unit_cost_cents),
            i.expected_delivery.as_deref().unwrap_or("?"),
        ));
    }
}

fn digest_comparison(out: &mut String, cmp: &BaselineComparison) {
    out.push_str("\n## Baseline comparison\n");
    out.push_str(&format!(
        "project SPI: {} | CPI: {}\n",
        cmp.project
            .spi
            .map_or("n/a".to_string(), |v| format!("{v:.2}")),
        cmp.project
            .cpi
            .map_or("n/a".to_string(), |v| format!("{v:.2}")),
    ));
    for line in &cmp.tasks {
        out.push_str(&format!(
            "- {}: start {:+}d, end {:+}d, progress {:+} pts, impact {}\n",
            line.task_title,
            line.variance.start_variance_days.unwrap_or(0),
            line.variance.end_variance_days.unwrap_or(0),
            line.variance.progress_variance,
            line.variance.impact.as_str(),
        ));
    }
}

/// Assemble the message pair for one report request.
pub fn build_messages(
    report_type: &str,
    project: &Project,
    tasks: &[Task],
    budget: &BudgetSummary,
    procurement: &[ProcurementItem],
    comparison: Option<&BaselineComparison>,
) -> Vec<Message> {
    let mut digest = String::new();
    digest_project(&mut digest, project);
    digest_tasks(&mut digest, tasks);
    digest_budget(&mut digest, budget);
    digest_procurement(&mut digest, procurement);
    if let Some(cmp) = comparison {
        digest_comparison(&mut digest, cmp);
    }

    vec![
        Message::system(system_prompt(report_type)),
        Message::user(digest),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_types() {
        assert!(valid_report_type("status"));
        assert!(valid_report_type("variance"));
        assert!(!valid_report_type("monthly"));
    }

    #[test]
    fn test_digest_contains_key_figures() {
        let project = Project {
            id: "p1".to_string(),
            name: "Harbor Cafe".to_string(),
            client_name: None,
            site_address: None,
            status: "in_progress".to_string(),
            start_date: Some("2026-01-05".to_string()),
            end_date: Some("2026-06-30".to_string()),
            budget_total_cents: 12_500_000,
            currency: "USD".to_string(),
            owner_id: "u1".to_string(),
            progress: 40,
            created_at: String::new(),
            updated_at: String::new(),
            deleted_at: None,
        };
        let budget = crate::budget::model::BudgetSummary {
            project_id: "p1".to_string(),
            budget_total_cents: 12_500_000,
            spent_cents: 4_000_000,
            remaining_cents: 8_500_000,
            percent_consumed: Some(32.0),
            by_category: vec![],
        };
        let messages = build_messages("status", &project, &[], &budget, &[], None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("Harbor Cafe"));
        assert!(messages[1].content.contains("125000.00"));
        assert!(messages[1].content.contains("2026-01-05 to 2026-06-30"));
    }
}
