// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::Write;

use serde_json::Value;

use crate::report::{StageDetail, StageStatus, SubjectReport};
use crate::traits::ReportRenderer;

/// Machine-readable report: the whole [`SubjectReport`] as pretty JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn file_name(&self) -> &'static str {
        "report.json"
    }

    fn render(&self, report: &SubjectReport) -> Result<String, String> {
        serde_json::to_string_pretty(report).map_err(|e| e.to_string())
    }
}

/// Plain-text report for people.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl TextRenderer {
    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn marker(status: StageStatus) -> &'static str {
        match status {
            StageStatus::Success => "[ok]     ",
            StageStatus::Failed => "[FAILED] ",
            StageStatus::Skipped => "[skipped]",
        }
    }

    fn detail(detail: &StageDetail, attempts: u32, retries: u32) -> String {
        match detail {
            StageDetail::Executed if retries > 0 => {
                format!("executed, {} attempts ({} retries)", attempts, retries)
            }
            StageDetail::Executed => "executed".to_string(),
            StageDetail::Cached => "cached".to_string(),
            StageDetail::UpstreamFailure { upstream } => format!("upstream '{}' failed", upstream),
            StageDetail::Cancelled => "cancelled".to_string(),
            StageDetail::NotRun => "not run".to_string(),
        }
    }
}

impl ReportRenderer for TextRenderer {
    fn file_name(&self) -> &'static str {
        "report.txt"
    }

    fn render(&self, report: &SubjectReport) -> Result<String, String> {
        let mut out = String::new();
        let mut emit = || -> std::fmt::Result {
            writeln!(out, "Subject sub-{}", report.subject)?;
            writeln!(out, "  run:       {}", report.run_id)?;
            writeln!(out, "  outcome:   {}", report.outcome)?;
            writeln!(out, "  generated: {}", report.generated_at.to_rfc3339())?;

            writeln!(out)?;
            writeln!(out, "Summary")?;
            let modalities: Vec<String> = report
                .summary
                .modalities
                .iter()
                .map(|(modality, count)| format!("{}={}", modality, count))
                .collect();
            writeln!(out, "  modalities: {}", modalities.join(", "))?;
            for (key, value) in &report.summary.metadata {
                writeln!(out, "  {}: {}", key, Self::scalar(value))?;
            }
            for (key, value) in &report.summary.options {
                writeln!(out, "  option {}: {}", key, Self::scalar(value))?;
            }

            if let Some(error) = &report.error {
                writeln!(out)?;
                writeln!(out, "Error")?;
                writeln!(out, "  {}", error)?;
            }

            if !report.stages.is_empty() {
                writeln!(out)?;
                writeln!(out, "Stages")?;
            }
            for stage in &report.stages {
                writeln!(
                    out,
                    "  {} {} ({}, {}): {}",
                    Self::marker(stage.status),
                    stage.node_id,
                    stage.stage,
                    stage.rule_id,
                    Self::detail(&stage.detail, stage.attempts, stage.retries)
                )?;
                for (name, path) in &stage.artifacts {
                    writeln!(out, "      {}: {}", name, path.display())?;
                }
                if let Some(error) = &stage.error {
                    for line in error.lines() {
                        writeln!(out, "      ! {}", line)?;
                    }
                }
            }
            Ok(())
        };
        emit().map_err(|e| e.to_string())?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Outcome;
    use crate::report::{ReportSummary, StageReport};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn report() -> SubjectReport {
        let stage = |id: &str, status, detail, error: Option<&str>| StageReport {
            stage: "motion_correction".into(),
            node_id: id.into(),
            capability: "pet_hmc".into(),
            rule_id: "pet_hmc_mcflirt".into(),
            tool: "mcflirt".into(),
            rank: 0,
            status,
            detail,
            artifacts: if status == StageStatus::Success {
                [("xforms".to_string(), "/work/sub-01/nodes/x/xforms.txt".into())].into()
            } else {
                BTreeMap::new()
            },
            error: error.map(String::from),
            attempts: 2,
            retries: 1,
            duration_seconds: Some(1.5),
        };
        SubjectReport {
            subject: "01".into(),
            run_id: "20250101-120000_abc".into(),
            outcome: Outcome::Partial,
            generated_at: chrono::Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            summary: ReportSummary {
                modalities: [("pet".to_string(), 2), ("t1w".to_string(), 1)].into(),
                metadata: [("TracerName".to_string(), Value::from("FDG"))].into(),
                options: [("sloppy".to_string(), Value::Bool(false))].into(),
            },
            stages: vec![
                stage("pet_hmc.trc-FDG", StageStatus::Success, StageDetail::Executed, None),
                stage(
                    "pet_hmc.trc-PIB",
                    StageStatus::Failed,
                    StageDetail::Executed,
                    Some("timeout: exceeded 30s"),
                ),
                stage(
                    "pet_coreg.trc-PIB",
                    StageStatus::Skipped,
                    StageDetail::UpstreamFailure {
                        upstream: "pet_hmc.trc-PIB".into(),
                    },
                    None,
                ),
            ],
            error: None,
        }
    }

    #[test]
    fn test_json_renderer_round_trips() {
        let report = report();
        let json = JsonRenderer.render(&report).unwrap();

        let parsed: SubjectReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert!(json.contains("\"reason\": \"upstream_failure\""));
        assert_eq!(JsonRenderer.file_name(), "report.json");
    }

    #[test]
    fn test_text_renderer_lists_every_stage() {
        let text = TextRenderer.render(&report()).unwrap();

        assert!(text.starts_with("Subject sub-01\n"));
        assert!(text.contains("  outcome:   partial"));
        assert!(text.contains("  modalities: pet=2, t1w=1"));
        assert!(text.contains("  TracerName: FDG"));
        assert!(text.contains("[ok]      pet_hmc.trc-FDG (motion_correction, pet_hmc_mcflirt): executed, 2 attempts (1 retries)"));
        assert!(text.contains("      xforms: /work/sub-01/nodes/x/xforms.txt"));
        assert!(text.contains("[FAILED]  pet_hmc.trc-PIB"));
        assert!(text.contains("      ! timeout: exceeded 30s"));
        assert!(text.contains("[skipped] pet_coreg.trc-PIB (motion_correction, pet_hmc_mcflirt): upstream 'pet_hmc.trc-PIB' failed"));
        assert!(!text.contains("Error\n"));
    }

    #[test]
    fn test_text_renderer_prerequisite_failure() {
        let mut report = report();
        report.stages.clear();
        report.outcome = Outcome::Failed;
        report.error = Some("sub-01: no rule for mandatory capability 'anat_reference'".into());

        let text = TextRenderer.render(&report).unwrap();

        assert!(text.contains("Error\n  sub-01: no rule for mandatory capability 'anat_reference'\n"));
        assert!(!text.contains("Stages"));
    }
}
