//! Pure schedule/cost variance math over baseline snapshots.
//!
//! Sign convention is actual minus planned: positive day variances mean
//! late, positive progress variance means ahead of plan.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

/// Computed variance for one snapshotted task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskVariance {
    pub task_id: String,
    pub start_variance_days: Option<i64>,
    pub end_variance_days: Option<i64>,
    pub progress_variance: i64,
    pub impact: Impact,
}

/// Earned-value figures for one snapshotted task, in cents.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarnedValue {
    pub ev: f64,
    pub pv: f64,
    pub ac: f64,
}

/// Project-level earned-value roll-up.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectIndices {
    pub spi: Option<f64>,
    pub cpi: Option<f64>,
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Actual minus planned, in whole days. None when either side is missing
/// or unparseable.
pub fn date_variance_days(planned: Option<&str>, actual: Option<&str>) -> Option<i64> {
    let planned = parse_date(planned?)?;
    let actual = parse_date(actual?)?;
    Some((actual - planned).num_days())
}

fn date_impact(days: Option<i64>) -> Impact {
    match days.map(i64::abs) {
        Some(d) if d >= 14 => Impact::High,
        Some(d) if d >= 7 => Impact::Medium,
        _ => Impact::Low,
    }
}

fn progress_impact(variance: i64) -> Impact {
    // Only a shortfall against plan escalates
    let shortfall = -variance;
    if shortfall >= 25 {
        Impact::High
    } else if shortfall >= 10 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

/// Worst-of classification across start, end and progress variances.
pub fn classify_impact(
    start_days: Option<i64>,
    end_days: Option<i64>,
    progress_variance: i64,
) -> Impact {
    date_impact(start_days)
        .max(date_impact(end_days))
        .max(progress_impact(progress_variance))
}

pub fn task_variance(
    task_id: &str,
    planned_start: Option<&str>,
    planned_end: Option<&str>,
    actual_start: Option<&str>,
    actual_end: Option<&str>,
    planned_progress: i64,
    actual_progress: i64,
) -> TaskVariance {
    let start_variance_days = date_variance_days(planned_start, actual_start);
    let end_variance_days = date_variance_days(planned_end, actual_end);
    let progress_variance = actual_progress - planned_progress;
    TaskVariance {
        task_id: task_id.to_string(),
        start_variance_days,
        end_variance_days,
        progress_variance,
        impact: classify_impact(start_variance_days, end_variance_days, progress_variance),
    }
}

/// EV/PV/AC for one snapshot against the task's current state.
pub fn earned_value(planned_cost_cents: i64, planned_progress: i64, actual_progress: i64, actual_cost_cents: i64) -> EarnedValue {
    let planned_cost = planned_cost_cents as f64;
    EarnedValue {
        ev: planned_cost * actual_progress as f64 / 100.0,
        pv: planned_cost * planned_progress as f64 / 100.0,
        ac: actual_cost_cents as f64,
    }
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

pub fn spi(ev: &EarnedValue) -> Option<f64> {
    ratio(ev.ev, ev.pv)
}

pub fn cpi(ev: &EarnedValue) -> Option<f64> {
    ratio(ev.ev, ev.ac)
}

/// ΣEV/ΣPV and ΣEV/ΣAC across all snapshots.
pub fn project_indices(values: &[EarnedValue]) -> ProjectIndices {
    let ev: f64 = values.iter().map(|v| v.ev).sum();
    let pv: f64 = values.iter().map(|v| v.pv).sum();
    let ac: f64 = values.iter().map(|v| v.ac).sum();
    ProjectIndices {
        spi: ratio(ev, pv),
        cpi: ratio(ev, ac),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_variance_sign() {
        // Late start: actual after planned
        assert_eq!(
            date_variance_days(Some("2026-01-10"), Some("2026-01-15")),
            Some(5)
        );
        // Early finish
        assert_eq!(
            date_variance_days(Some("2026-02-01"), Some("2026-01-29")),
            Some(-3)
        );
        assert_eq!(date_variance_days(None, Some("2026-01-01")), None);
        assert_eq!(date_variance_days(Some("2026-01-01"), None), None);
        assert_eq!(date_variance_days(Some("not-a-date"), Some("2026-01-01")), None);
    }

    #[test]
    fn test_impact_thresholds() {
        assert_eq!(classify_impact(Some(0), Some(0), 0), Impact::Low);
        assert_eq!(classify_impact(Some(6), None, 0), Impact::Low);
        assert_eq!(classify_impact(Some(7), None, 0), Impact::Medium);
        assert_eq!(classify_impact(Some(13), None, 0), Impact::Medium);
        assert_eq!(classify_impact(Some(14), None, 0), Impact::High);
        // Early by two weeks is as notable as late by two weeks
        assert_eq!(classify_impact(Some(-14), None, 0), Impact::High);
    }

    #[test]
    fn test_progress_impact() {
        assert_eq!(classify_impact(None, None, -9), Impact::Low);
        assert_eq!(classify_impact(None, None, -10), Impact::Medium);
        assert_eq!(classify_impact(None, None, -25), Impact::High);
        // Being ahead of plan never escalates
        assert_eq!(classify_impact(None, None, 40), Impact::Low);
    }

    #[test]
    fn test_worst_of_wins() {
        assert_eq!(classify_impact(Some(2), Some(8), -30), Impact::High);
        assert_eq!(classify_impact(Some(8), None, -5), Impact::Medium);
    }

    #[test]
    fn test_task_variance_missing_dates() {
        let v = task_variance("t1", Some("2026-01-01"), None, None, None, 50, 20);
        assert_eq!(v.start_variance_days, None);
        assert_eq!(v.end_variance_days, None);
        assert_eq!(v.progress_variance, -30);
        assert_eq!(v.impact, Impact::High);
    }

    #[test]
    fn test_earned_value_math() {
        let ev = earned_value(100_000, 50, 40, 45_000);
        assert_eq!(ev.ev, 40_000.0);
        assert_eq!(ev.pv, 50_000.0);
        assert_eq!(ev.ac, 45_000.0);
        assert_eq!(spi(&ev), Some(0.8));
        assert!((cpi(&ev).unwrap() - 40_000.0 / 45_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominators() {
        let ev = earned_value(100_000, 0, 30, 0);
        assert_eq!(spi(&ev), None);
        assert_eq!(cpi(&ev), None);
    }

    #[test]
    fn test_project_rollup() {
        let values = vec![
            earned_value(100_000, 50, 40, 45_000),
            earned_value(200_000, 25, 50, 80_000),
        ];
        let idx = project_indices(&values);
        // ΣEV = 40k + 100k, ΣPV = 50k + 50k, ΣAC = 45k + 80k
        assert_eq!(idx.spi, Some(140_000.0 / 100_000.0));
        assert_eq!(idx.cpi, Some(140_000.0 / 125_000.0));
    }

    #[test]
    fn test_project_rollup_empty() {
        let idx = project_indices(&[]);
        assert_eq!(idx.spi, None);
        assert_eq!(idx.cpi, None);
    }
}
