use std::fs;

use pocscan::reporting::{export_csv, export_json, export_markdown};
use pocscan::verdict::{ExecutionResult, Outcome};

fn sample() -> Vec<ExecutionResult> {
    let mut hit = ExecutionResult::new("poc-db-001", "http://10.0.0.5:8080/", Outcome::Matched);
    hit.raw_request = Some("GET /console HTTP/1.1\r\nHost: 10.0.0.5:8080\r\n\r\n".into());
    hit.raw_response = Some("HTTP/1.1 200 OK\r\n\r\nwelcome".into());
    hit.steps_run = 2;
    vec![
        hit,
        ExecutionResult::new("poc-db-002", "http://10.0.0.5:8080/", Outcome::NotMatched),
        ExecutionResult::error("poc-db-003", "http://10.0.0.5:8080/", "step 0: request timed out"),
    ]
}

#[test]
fn reporting_exports_create_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let results = sample();

    let csv = export_csv(&results, dir.path()).expect("CSV export should succeed");
    let md = export_markdown(&results, dir.path()).expect("Markdown export should succeed");
    let json = export_json(&results, dir.path()).expect("JSON export should succeed");

    for (path, ext) in [(&csv, "csv"), (&md, "md"), (&json, "json")] {
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("pocscan_report_"), "unexpected name {}", name);
        assert!(name.ends_with(ext));
        assert!(fs::metadata(path).is_ok());
    }

    let csv_content = fs::read_to_string(&csv).unwrap();
    assert_eq!(csv_content.lines().count(), 4, "Should have header + 3 data rows");
    assert!(csv_content.contains("poc-db-003,http://10.0.0.5:8080/,ERROR,step 0: request timed out"));
}

#[test]
fn markdown_report_structure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let md = export_markdown(&sample(), dir.path()).unwrap();
    let content = fs::read_to_string(md).unwrap();

    assert!(content.starts_with("# pocscan Report\n"));
    assert!(content.contains("3 checks, 1 vulnerable, 1 errors."));
    assert!(content.contains("| poc-db-001 | http://10.0.0.5:8080/ | VULNERABLE |"));
    assert!(content.contains("| poc-db-003 | http://10.0.0.5:8080/ | ERROR |"));
    assert!(content.contains("GET /console HTTP/1.1"));
}

#[test]
fn json_report_round_trips_through_serde() {
    let dir = tempfile::tempdir().expect("temp dir");
    let json = export_json(&sample(), dir.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();

    let rows = value.as_array().expect("array of results");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["vul_id"], "poc-db-001");
    assert_eq!(rows[0]["outcome"], "Matched");
    assert_eq!(rows[0]["steps_run"], 2);
    assert_eq!(rows[2]["outcome"], "Error");
    assert_eq!(rows[2]["detail"], "step 0: request timed out");
}
