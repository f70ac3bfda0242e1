use crate::{
    backend::BackendId,
    router::{TaskConfig, SCIENTIFIC, STYLE, SYNTHESIS},
    stats::{RunStatistics, RunSummary, UnitResult},
    structure::AnalysisMode,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: RunSummary,
    pub units: Vec<UnitResult>,
    pub outline_review: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub source_file: String,
    pub mode: AnalysisMode,
    pub task_backends: BTreeMap<String, BackendId>,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    Html,
    Latex,
    All,
}

impl ReportFormat {
    fn includes(self, other: ReportFormat) -> bool {
        self == ReportFormat::All || self == other
    }
}

/// Section headings used for the per-unit task outputs, in display order.
const SECTIONS: [(&str, &str); 3] = [
    (SCIENTIFIC, "Scientific analysis"),
    (STYLE, "Style review"),
    (SYNTHESIS, "Synthesis"),
];

#[derive(Default)]
pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_report(
        &self,
        stats: &RunStatistics,
        source_file: &Path,
        mode: AnalysisMode,
        tasks: &TaskConfig,
    ) -> Report {
        let metadata = ReportMetadata {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_file: source_file.display().to_string(),
            mode,
            task_backends: tasks
                .iter()
                .map(|(task, backend)| (task.to_string(), backend))
                .collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Report {
            metadata,
            summary: stats.summary(),
            units: stats.unit_results.clone(),
            outline_review: stats.outline_review.clone(),
        }
    }

    pub fn export_report(
        &self,
        report: &Report,
        output_dir: &Path,
        format: ReportFormat,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut exported_files = Vec::new();

        if format.includes(ReportFormat::Json) {
            let json_path = output_dir.join(format!("analysis_report_{}.json", stamp));
            fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
            exported_files.push(json_path);
        }

        if format.includes(ReportFormat::Html) {
            let html_path = output_dir.join(format!("analysis_report_{}.html", stamp));
            fs::write(&html_path, self.generate_html_report(report))?;
            exported_files.push(html_path);
        }

        if format.includes(ReportFormat::Latex) {
            let tex_path = output_dir.join(format!("analysis_report_{}.tex", stamp));
            fs::write(&tex_path, self.generate_latex_report(report))?;
            exported_files.push(tex_path);
        }

        Ok(exported_files)
    }

    fn generate_html_report(&self, report: &Report) -> String {
        let summary = &report.summary;
        let mut html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Thesis Analysis Report - {source}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; line-height: 1.6; }}
        .header {{ border-bottom: 2px solid #333; padding-bottom: 20px; }}
        .section {{ margin: 30px 0; }}
        .metric {{ display: inline-block; margin: 10px 20px 10px 0; padding: 10px; background: #f5f5f5; border-radius: 5px; }}
        .unit {{ margin: 20px 0; padding: 20px; background: #f8f9fa; border-radius: 8px; }}
        .unit-level {{ color: #7f8c8d; font-size: 0.9em; text-transform: uppercase; }}
        .analysis-type {{ font-weight: bold; color: #495057; margin: 15px 0 5px 0; }}
        .analysis-text {{ padding: 15px; background: #fff; border-radius: 5px; white-space: pre-wrap; }}
        table {{ border-collapse: collapse; margin: 10px 0; }}
        th, td {{ border: 1px solid #ddd; padding: 8px 12px; text-align: left; }}
        th {{ background-color: #f2f2f2; }}
    </style>
</head>
<body>
    <div class="header">
        <h1>Thesis Analysis Report</h1>
        <p><strong>Source:</strong> {source}<br>
        <strong>Mode:</strong> {mode}<br>
        <strong>Generated:</strong> {generated}</p>
    </div>
    <div class="section">
        <h2>Summary</h2>
        <div class="metric">Units analysed: {units}</div>
        <div class="metric">Calls: {calls}</div>
        <div class="metric">Errors: {errors}</div>
        <div class="metric">Fallbacks: {fallbacks}</div>
        <div class="metric">Success rate: {rate:.1}%</div>
        <div class="metric">Duration: {minutes:.2} min</div>
"#,
            source = escape_html(&report.metadata.source_file),
            mode = report.metadata.mode,
            generated = escape_html(&report.metadata.generated_at),
            units = summary.units_analyzed,
            calls = summary.total_calls,
            errors = summary.total_errors,
            fallbacks = summary.total_fallbacks,
            rate = summary.success_rate,
            minutes = summary.elapsed_minutes,
        );

        if !summary.backends.is_empty() {
            html.push_str(
                "        <table>\n            <tr><th>Backend</th><th>Successful calls</th><th>Errors</th><th>Mean latency (s)</th></tr>\n",
            );
            for backend in &summary.backends {
                html.push_str(&format!(
                    "            <tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n",
                    backend.backend, backend.successful_calls, backend.errors, backend.mean_latency_secs
                ));
            }
            html.push_str("        </table>\n");
        }
        html.push_str("    </div>\n");

        html.push_str("    <div class=\"section\">\n        <h2>Structural Units</h2>\n");
        for unit in &report.units {
            html.push_str(&format!(
                "        <div class=\"unit\">\n            <div class=\"unit-level\">{} &middot; {} words</div>\n            <h3>{}</h3>\n",
                unit.level,
                unit.word_count,
                escape_html(&unit.title)
            ));
            for (task, heading) in SECTIONS {
                if let Some(text) = unit.output(task) {
                    html.push_str(&format!(
                        "            <div class=\"analysis-type\">{}</div>\n            <div class=\"analysis-text\">{}</div>\n",
                        heading,
                        escape_html(text)
                    ));
                }
            }
            html.push_str("        </div>\n");
        }
        html.push_str("    </div>\n");

        if let Some(review) = &report.outline_review {
            html.push_str(&format!(
                "    <div class=\"section\">\n        <h2>Outline Review</h2>\n        <div class=\"analysis-text\">{}</div>\n    </div>\n",
                escape_html(review)
            ));
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn generate_latex_report(&self, report: &Report) -> String {
        let summary = &report.summary;
        let mut tex = String::from(
            "\\documentclass[11pt]{report}\n\\usepackage[utf8]{inputenc}\n\\usepackage[T1]{fontenc}\n\\begin{document}\n\n",
        );
        tex.push_str("\\title{Thesis Analysis Report}\n");
        tex.push_str(&format!(
            "\\author{{{}}}\n\\date{{{}}}\n\\maketitle\n\n",
            escape_latex(&report.metadata.source_file),
            escape_latex(&report.metadata.generated_at)
        ));

        tex.push_str("\\chapter*{Summary}\n\\begin{itemize}\n");
        tex.push_str(&format!("  \\item Mode: {}\n", report.metadata.mode));
        tex.push_str(&format!("  \\item Units analysed: {}\n", summary.units_analyzed));
        tex.push_str(&format!(
            "  \\item Calls: {} (errors: {}, fallbacks: {})\n",
            summary.total_calls, summary.total_errors, summary.total_fallbacks
        ));
        tex.push_str(&format!("  \\item Success rate: {:.1}\\%\n", summary.success_rate));
        tex.push_str(&format!("  \\item Duration: {:.2} min\n", summary.elapsed_minutes));
        tex.push_str("\\end{itemize}\n\n");

        for unit in &report.units {
            tex.push_str(&format!(
                "\\chapter*{{{}}}\n\\textit{{{}, {} words}}\n\n",
                escape_latex(&unit.title),
                unit.level,
                unit.word_count
            ));
            for (task, heading) in SECTIONS {
                if let Some(text) = unit.output(task) {
                    tex.push_str(&format!("\\section*{{{}}}\n{}\n\n", heading, escape_latex(text)));
                }
            }
        }

        if let Some(review) = &report.outline_review {
            tex.push_str(&format!("\\chapter*{{Outline Review}}\n{}\n\n", escape_latex(review)));
        }

        tex.push_str("\\end{document}\n");
        tex
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_latex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '~' => escaped.push_str("\\textasciitilde{}"),
            '^' => escaped.push_str("\\textasciicircum{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Level;

    fn sample_stats() -> RunStatistics {
        let mut stats = RunStatistics::new();
        stats.total_calls = 3;
        stats.record_unit(UnitResult {
            title: "Introduction <draft>".to_string(),
            level: Level::Top,
            word_count: 120,
            outputs: BTreeMap::from([
                (SCIENTIFIC.to_string(), "Sound & rigorous.".to_string()),
                (STYLE.to_string(), "Use 50% fewer commas.".to_string()),
                (SYNTHESIS.to_string(), "Fine.".to_string()),
            ]),
        });
        stats.outline_review = Some("Merge chapters 2_3.".to_string());
        stats
    }

    fn sample_report() -> Report {
        let tasks = TaskConfig::new()
            .with(SCIENTIFIC, BackendId::Claude)
            .with(STYLE, BackendId::Gemini);
        Reporter::new().generate_report(
            &sample_stats(),
            Path::new("thesis.tex"),
            AnalysisMode::Normal,
            &tasks,
        )
    }

    #[test]
    fn report_carries_run_results() {
        let report = sample_report();
        assert_eq!(report.metadata.source_file, "thesis.tex");
        assert_eq!(report.metadata.task_backends.get(STYLE), Some(&BackendId::Gemini));
        assert_eq!(report.summary.units_analyzed, 1);
        assert_eq!(report.units[0].output(SCIENTIFIC), Some("Sound & rigorous."));
        assert!(report.outline_review.is_some());
    }

    #[test]
    fn html_escapes_untrusted_text() {
        let html = Reporter::new().generate_html_report(&sample_report());
        assert!(html.contains("Introduction &lt;draft&gt;"));
        assert!(html.contains("Sound &amp; rigorous."));
        assert!(!html.contains("<draft>"));
    }

    #[test]
    fn latex_escapes_special_characters() {
        assert_eq!(escape_latex("50% of $x_1$"), "50\\% of \\$x\\_1\\$");
        assert_eq!(escape_latex("a\\b"), "a\\textbackslash{}b");
        assert_eq!(escape_latex("~^"), "\\textasciitilde{}\\textasciicircum{}");

        let tex = Reporter::new().generate_latex_report(&sample_report());
        assert!(tex.contains("Use 50\\% fewer commas."));
        assert!(tex.contains("Merge chapters 2\\_3."));
        assert!(tex.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn exports_requested_formats() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new();
        let report = sample_report();

        let html_only = reporter
            .export_report(&report, dir.path(), ReportFormat::Html)
            .unwrap();
        assert_eq!(html_only.len(), 1);
        assert!(html_only[0].extension().is_some_and(|ext| ext == "html"));

        let all = reporter
            .export_report(&report, &dir.path().join("nested"), ReportFormat::All)
            .unwrap();
        let extensions: Vec<_> = all
            .iter()
            .filter_map(|p| p.extension().and_then(|e| e.to_str()))
            .collect();
        assert_eq!(extensions, vec!["json", "html", "tex"]);

        let json = fs::read_to_string(&all[0]).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.units, report.units);
        assert!(all[0]
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("analysis_report_")));
    }
}
