//! Golden-result regression report.
//!
//! A `RegressionReport` can be:
//! - Serialized to JSON (`golden_check.json`)
//! - Rendered as plain text for the terminal, one line per failure
//! - Rendered to Markdown for CI comments

use serde::{Deserialize, Serialize};

use crate::MAX_EXIT_CODE;
use crate::core::TripleKey;
use crate::storage::ResultTable;

use super::pass_requirements::PassRequirements;

/// Schema version for RegressionReport
pub const REGRESSION_REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub version: u32,
    pub metadata: ReportMetadata,
    pub triples: Vec<TripleRegression>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Golden table path
    pub golden_id: String,
    /// Current table path
    pub current_id: String,
    /// Pass-requirements file, empty when every metric was checked exactly
    pub requirements_file: String,
    /// RFC 3339 timestamp
    pub generated_at: String,
}

/// Comparison of one triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleRegression {
    pub key: TripleKey,
    pub metrics: Vec<MetricCheck>,
    pub status: RegressionStatus,
}

/// Comparison of one metric of one triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCheck {
    pub metric: String,
    pub golden: Option<String>,
    pub current: Option<String>,
    /// Requirement as written in the requirements file
    pub requirement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    pub status: RegressionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionStatus {
    /// Within requirement
    Ok,
    /// Numeric value outside its ratio range
    OutOfRange,
    /// Values differ where they must be equal, or are not comparable
    Mismatch,
    /// Present in the current table only
    MissingGolden,
    /// Present in the golden table only
    MissingCurrent,
}

impl RegressionStatus {
    /// Get emoji representation for markdown.
    pub fn emoji(&self) -> &'static str {
        match self {
            RegressionStatus::Ok => "⚪",
            RegressionStatus::OutOfRange => "🔴",
            RegressionStatus::Mismatch => "❌",
            RegressionStatus::MissingGolden | RegressionStatus::MissingCurrent => "⚠️",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RegressionStatus::Ok => "OK",
            RegressionStatus::OutOfRange => "OUT_OF_RANGE",
            RegressionStatus::Mismatch => "MISMATCH",
            RegressionStatus::MissingGolden => "NO_GOLDEN",
            RegressionStatus::MissingCurrent => "NO_RESULT",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, RegressionStatus::Ok)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_triples: usize,
    /// Triples with at least one failing metric, or missing on one side
    pub failing_triples: usize,
    /// Triples present on only one side
    pub missing_triples: usize,
    pub total_metrics: usize,
    pub failing_metrics: usize,
    /// Failures (metrics plus missing triples), capped at `MAX_EXIT_CODE`
    pub exit_code: i32,
}

impl RegressionReport {
    pub fn new(golden_id: impl Into<String>, current_id: impl Into<String>) -> Self {
        RegressionReport {
            version: REGRESSION_REPORT_VERSION,
            metadata: ReportMetadata {
                golden_id: golden_id.into(),
                current_id: current_id.into(),
                requirements_file: String::new(),
                generated_at: crate::now_string(),
            },
            triples: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub fn add_triple(&mut self, triple: TripleRegression) {
        self.summary.total_triples += 1;
        if triple.status.is_failure() {
            self.summary.failing_triples += 1;
        }
        if matches!(
            triple.status,
            RegressionStatus::MissingGolden | RegressionStatus::MissingCurrent
        ) {
            self.summary.missing_triples += 1;
        }
        for metric in &triple.metrics {
            self.summary.total_metrics += 1;
            if metric.status.is_failure() {
                self.summary.failing_metrics += 1;
            }
        }
        self.triples.push(triple);
    }

    /// Compute the exit code.
    pub fn finalize(&mut self) {
        let failures = self.summary.failing_metrics + self.summary.missing_triples;
        self.summary.exit_code = failures.min(MAX_EXIT_CODE as usize) as i32;
    }

    pub fn passed(&self) -> bool {
        self.summary.failing_metrics == 0 && self.summary.missing_triples == 0
    }

    /// `(triple, metric)` pairs that failed; missing triples use `*`.
    pub fn failures(&self) -> Vec<(&TripleKey, &str, RegressionStatus)> {
        let mut out = Vec::new();
        for triple in &self.triples {
            if triple.metrics.is_empty() && triple.status.is_failure() {
                out.push((&triple.key, "*", triple.status));
            }
            for metric in triple.metrics.iter().filter(|m| m.status.is_failure()) {
                out.push((&triple.key, metric.metric.as_str(), metric.status));
            }
        }
        out
    }
}

/// Compare `current` against `golden` under `requirements`.
///
/// Golden rows are visited in order, then current rows with no golden
/// counterpart. Only metrics named in `requirements` are checked; a checked
/// metric absent from either table fails.
pub fn compare_tables(
    golden: &ResultTable,
    current: &ResultTable,
    requirements: &PassRequirements,
    golden_id: impl Into<String>,
    current_id: impl Into<String>,
) -> RegressionReport {
    let mut report = RegressionReport::new(golden_id, current_id);
    report.metadata.requirements_file = requirements.source.display().to_string();

    for golden_row in &golden.rows {
        let Some(current_row) = current.get(&golden_row.key) else {
            report.add_triple(TripleRegression {
                key: golden_row.key.clone(),
                metrics: Vec::new(),
                status: RegressionStatus::MissingCurrent,
            });
            continue;
        };

        let metrics: Vec<MetricCheck> = requirements
            .requirements
            .iter()
            .map(|(metric, requirement)| {
                let golden_value = golden_row.get(metric).map(String::from);
                let current_value = current_row.get(metric).map(String::from);
                let (status, ratio, detail) = match (&golden_value, &current_value) {
                    (None, _) => (
                        RegressionStatus::MissingGolden,
                        None,
                        Some("metric not in golden results".to_string()),
                    ),
                    (_, None) => (
                        RegressionStatus::MissingCurrent,
                        None,
                        Some("metric not in current results".to_string()),
                    ),
                    (Some(g), Some(c)) => {
                        let verdict = requirement.check(g, c);
                        let status = match (verdict.pass, verdict.ratio) {
                            (true, _) => RegressionStatus::Ok,
                            (false, Some(_)) => RegressionStatus::OutOfRange,
                            (false, None) => RegressionStatus::Mismatch,
                        };
                        (status, verdict.ratio, verdict.reason)
                    }
                };
                MetricCheck {
                    metric: metric.clone(),
                    golden: golden_value,
                    current: current_value,
                    requirement: requirement.to_string(),
                    ratio,
                    status,
                    detail,
                }
            })
            .collect();

        let status = metrics
            .iter()
            .map(|m| m.status)
            .find(RegressionStatus::is_failure)
            .unwrap_or(RegressionStatus::Ok);
        report.add_triple(TripleRegression {
            key: golden_row.key.clone(),
            metrics,
            status,
        });
    }

    for current_row in &current.rows {
        if golden.get(&current_row.key).is_none() {
            report.add_triple(TripleRegression {
                key: current_row.key.clone(),
                metrics: Vec::new(),
                status: RegressionStatus::MissingGolden,
            });
        }
    }

    report.finalize();
    report
}

/// One line per failure, then a summary line.
pub fn render_text(report: &RegressionReport) -> String {
    let mut out = String::new();
    for triple in &report.triples {
        if triple.metrics.is_empty() && triple.status.is_failure() {
            out.push_str(&format!("{}: {}\n", triple.key, triple.status.label()));
        }
        for m in triple.metrics.iter().filter(|m| m.status.is_failure()) {
            out.push_str(&format!(
                "{} {}: {} golden={} current={} requirement={}{}\n",
                triple.key,
                m.metric,
                m.status.label(),
                m.golden.as_deref().unwrap_or("-"),
                m.current.as_deref().unwrap_or("-"),
                m.requirement,
                m.detail
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default(),
            ));
        }
    }
    if report.passed() {
        out.push_str(&format!(
            "golden check passed: {} triples, {} metrics\n",
            report.summary.total_triples, report.summary.total_metrics
        ));
    } else {
        out.push_str(&format!(
            "golden check failed: {} failing metrics, {} missing triples\n",
            report.summary.failing_metrics, report.summary.missing_triples
        ));
    }
    out
}

/// Render regression report as Markdown for CI comments.
pub fn render_markdown(report: &RegressionReport) -> String {
    let mut out = String::new();

    let status_emoji = if report.passed() { "✅" } else { "❌" };
    out.push_str(&format!("## {} VTR Golden Check\n\n", status_emoji));

    out.push_str(&format!(
        "| | |\n|---|---|\n\
         | **Golden** | `{}` |\n\
         | **Current** | `{}` |\n\
         | **Requirements** | `{}` |\n\
         | **Generated** | {} |\n\n",
        report.metadata.golden_id,
        report.metadata.current_id,
        report.metadata.requirements_file,
        report.metadata.generated_at.replace('T', " ")
    ));

    out.push_str("### Summary\n\n");
    out.push_str(&format!(
        "| Metric | Count |\n|--------|-------|\n\
         | Triples | {} |\n\
         | Failing triples | {} |\n\
         | Missing triples | {} |\n\
         | Failing metrics | {} |\n\n",
        report.summary.total_triples,
        report.summary.failing_triples,
        report.summary.missing_triples,
        report.summary.failing_metrics
    ));

    if !report.passed() {
        out.push_str("### Failures\n\n");
        out.push_str("| Triple | Metric | Golden | Current | Requirement | Status |\n");
        out.push_str("|--------|--------|--------|---------|-------------|--------|\n");
        for triple in &report.triples {
            if triple.metrics.is_empty() && triple.status.is_failure() {
                out.push_str(&format!(
                    "| {} | * | | | | {} {} |\n",
                    triple.key,
                    triple.status.emoji(),
                    triple.status.label()
                ));
            }
            for m in triple.metrics.iter().filter(|m| m.status.is_failure()) {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} {} |\n",
                    triple.key,
                    m.metric,
                    m.golden.as_deref().unwrap_or("-"),
                    m.current.as_deref().unwrap_or("-"),
                    m.requirement,
                    m.status.emoji(),
                    m.status.label()
                ));
            }
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::pass_requirements::Requirement;
    use crate::storage::ResultRow;
    use indexmap::IndexMap;

    fn key(circuit: &str) -> TripleKey {
        TripleKey {
            arch: "k6.xml".into(),
            circuit: circuit.into(),
            script_params: "common".into(),
        }
    }

    fn table(rows: &[(&str, &[(&str, &str)])]) -> ResultTable {
        let mut t = ResultTable::new(vec!["crit".into(), "status".into()]);
        for (circuit, metrics) in rows {
            t.push(ResultRow::new(
                key(circuit),
                metrics
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
        }
        t
    }

    fn requirements() -> PassRequirements {
        let mut requirements = IndexMap::new();
        requirements.insert(
            "crit".to_string(),
            Requirement::Range {
                min_ratio: 0.95,
                max_ratio: 1.05,
            },
        );
        requirements.insert("status".to_string(), Requirement::Equal);
        PassRequirements {
            source: "pass.txt".into(),
            requirements,
        }
    }

    #[test]
    fn test_regression_status_is_failure() {
        assert!(!RegressionStatus::Ok.is_failure());
        assert!(RegressionStatus::OutOfRange.is_failure());
        assert!(RegressionStatus::MissingGolden.is_failure());
        assert_eq!(RegressionStatus::MissingCurrent.label(), "NO_RESULT");
    }

    #[test]
    fn test_identical_tables_pass() {
        let golden = table(&[("a.v", &[("crit", "4.2"), ("status", "success")])]);
        let report = compare_tables(&golden, &golden.clone(), &requirements(), "g", "c");
        assert!(report.passed());
        assert_eq!(report.summary.exit_code, 0);
        assert_eq!(report.summary.total_metrics, 2);
    }

    #[test]
    fn test_drift_outside_tolerance() {
        let golden = table(&[
            ("a.v", &[("crit", "100"), ("status", "success")]),
            ("b.v", &[("crit", "50"), ("status", "success")]),
        ]);
        let current = table(&[
            ("a.v", &[("crit", "110"), ("status", "success")]),
            ("b.v", &[("crit", "51"), ("status", "success")]),
        ]);
        let report = compare_tables(&golden, &current, &requirements(), "g", "c");
        assert_eq!(report.summary.failing_metrics, 1);
        assert_eq!(report.summary.failing_triples, 1);
        assert_eq!(report.summary.exit_code, 1);

        let failures = report.failures();
        assert_eq!(failures, vec![(&key("a.v"), "crit", RegressionStatus::OutOfRange)]);

        let text = render_text(&report);
        assert!(text.contains("k6.xml/a.v/common crit: OUT_OF_RANGE golden=100 current=110"));
        assert!(text.contains("golden check failed"));
    }

    #[test]
    fn test_missing_triples_both_sides() {
        let golden = table(&[
            ("a.v", &[("crit", "1"), ("status", "ok")]),
            ("gone.v", &[("crit", "1"), ("status", "ok")]),
        ]);
        let current = table(&[
            ("a.v", &[("crit", "1"), ("status", "ok")]),
            ("new.v", &[("crit", "1"), ("status", "ok")]),
        ]);
        let report = compare_tables(&golden, &current, &requirements(), "g", "c");
        assert_eq!(report.summary.missing_triples, 2);
        assert_eq!(report.summary.exit_code, 2);
        let statuses: Vec<_> = report.failures().into_iter().map(|f| f.2).collect();
        assert_eq!(
            statuses,
            vec![RegressionStatus::MissingCurrent, RegressionStatus::MissingGolden]
        );
    }

    #[test]
    fn test_missing_metric_and_mismatch() {
        let golden = table(&[("a.v", &[("crit", "1")])]);
        let current = table(&[("a.v", &[("crit", "oops"), ("status", "ok")])]);
        let report = compare_tables(&golden, &current, &requirements(), "g", "c");
        let statuses: Vec<_> = report.triples[0].metrics.iter().map(|m| m.status).collect();
        assert_eq!(
            statuses,
            vec![RegressionStatus::Mismatch, RegressionStatus::MissingGolden]
        );
        assert_eq!(report.summary.exit_code, 2);
    }

    #[test]
    fn test_exit_code_is_capped() {
        let rows: Vec<(String, [(&str, &str); 2])> = (0..150)
            .map(|i| (format!("c{i}.v"), [("crit", "1"), ("status", "ok")]))
            .collect();
        let mut golden = ResultTable::new(vec!["crit".into(), "status".into()]);
        for (c, m) in &rows {
            golden.push(ResultRow::new(
                key(c),
                m.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ));
        }
        let current = ResultTable::new(golden.metrics.clone());
        let report = compare_tables(&golden, &current, &requirements(), "g", "c");
        assert_eq!(report.summary.missing_triples, 150);
        assert_eq!(report.summary.exit_code, MAX_EXIT_CODE);
    }

    #[test]
    fn test_report_serialization() {
        let golden = table(&[("a.v", &[("crit", "1"), ("status", "ok")])]);
        let report = compare_tables(&golden, &golden.clone(), &requirements(), "g", "c");
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"circuit\": \"a.v\""));
        let back: RegressionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.total_triples, 1);
        assert_eq!(back.triples[0].metrics[0].requirement, "Range(0.95,1.05)");
    }

    #[test]
    fn test_render_markdown_shows_failures() {
        let golden = table(&[("slow.v", &[("crit", "100"), ("status", "ok")])]);
        let current = table(&[("slow.v", &[("crit", "150"), ("status", "ok")])]);
        let report = compare_tables(&golden, &current, &requirements(), "golden.txt", "run001");
        let md = render_markdown(&report);
        assert!(md.contains("VTR Golden Check"));
        assert!(md.contains("Failures"));
        assert!(md.contains("slow.v"));
        assert!(md.contains("🔴"));
    }
}
