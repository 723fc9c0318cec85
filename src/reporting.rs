// Reporting and output for pocscan
// Supports CSV, Markdown and JSON export of scan results

use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::verdict::{ExecutionResult, Outcome};

/// Escape CSV field to prevent formula injection attacks
/// Cells starting with =, +, -, @, or tab are prefixed with single quote
fn escape_csv_field(field: &str) -> String {
    let Some(first_char) = field.chars().next() else {
        return String::new();
    };
    let needs_escaping = matches!(first_char, '=' | '+' | '-' | '@' | '\t');

    if needs_escaping {
        format!("\"'{}\"", field.replace('"', "\"\""))
    } else if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn report_path(dir: &Path, ext: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("pocscan_report_{}.{}", timestamp, ext))
}

pub fn render_csv(results: &[ExecutionResult]) -> String {
    let mut out = String::from("VulId,Target,Result,Detail\n");
    for r in results {
        out.push_str(&format!(
            "{},{},{},{}\n",
            escape_csv_field(&r.vul_id),
            escape_csv_field(&r.target),
            r.outcome.label(),
            escape_csv_field(r.detail.as_deref().unwrap_or_default())
        ));
    }
    out
}

pub fn render_markdown(results: &[ExecutionResult]) -> String {
    let matched: Vec<&ExecutionResult> = results.iter().filter(|r| r.matched()).collect();
    let errors = results.iter().filter(|r| r.outcome == Outcome::Error).count();

    let mut out = String::from("# pocscan Report\n\n");
    out.push_str(&format!(
        "Generated {}. {} checks, {} vulnerable, {} errors.\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        results.len(),
        matched.len(),
        errors
    ));
    out.push_str("| Rule | Target | Result |\n|---|---|---|\n");
    for r in results {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            r.vul_id.replace('|', "\\|"),
            r.target.replace('|', "\\|"),
            r.outcome
        ));
    }

    for r in matched {
        out.push_str(&format!("\n## {} on {}\n", r.vul_id, r.target));
        if let Some(raw) = &r.raw_request {
            out.push_str(&format!("\n### Request\n\n```http\n{}\n```\n", raw.trim_end()));
        }
        if let Some(raw) = &r.raw_response {
            out.push_str(&format!("\n### Response\n\n```http\n{}\n```\n", raw.trim_end()));
        }
    }
    out
}

/// Write a CSV report into `dir` and return its path.
pub fn export_csv(results: &[ExecutionResult], dir: &Path) -> Result<PathBuf, io::Error> {
    let path = report_path(dir, "csv");
    let mut file = File::create(&path)?;
    file.write_all(render_csv(results).as_bytes())?;
    Ok(path)
}

pub fn export_markdown(results: &[ExecutionResult], dir: &Path) -> Result<PathBuf, io::Error> {
    let path = report_path(dir, "md");
    let mut file = File::create(&path)?;
    file.write_all(render_markdown(results).as_bytes())?;
    Ok(path)
}

pub fn export_json(results: &[ExecutionResult], dir: &Path) -> Result<PathBuf, io::Error> {
    let path = report_path(dir, "json");
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_prefixes_are_neutralised() {
        assert_eq!(escape_csv_field("=1+1"), "\"'=1+1\"");
        assert_eq!(escape_csv_field("@SUM(\"a\")"), "\"'@SUM(\"\"a\"\")\"");
        assert_eq!(escape_csv_field("plain"), "plain");
        assert_eq!(escape_csv_field(""), "");
        assert_eq!(escape_csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn markdown_shows_raw_text_for_matches_only() {
        let mut hit = ExecutionResult::new("poc-1", "http://h/", Outcome::Matched);
        hit.raw_request = Some("GET /a HTTP/1.1\r\n".into());
        hit.raw_response = Some("HTTP/1.1 200 OK\r\n".into());
        let mut miss = ExecutionResult::new("poc-2", "http://h/", Outcome::NotMatched);
        miss.raw_request = Some("GET /secret-miss HTTP/1.1".into());

        let md = render_markdown(&[hit, miss]);
        assert!(md.contains("| poc-1 | http://h/ | VULNERABLE |"));
        assert!(md.contains("| poc-2 | http://h/ | SECURE |"));
        assert!(md.contains("## poc-1 on http://h/"));
        assert!(md.contains("GET /a HTTP/1.1"));
        assert!(!md.contains("secret-miss"));
    }
}
