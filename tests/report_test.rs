use panelmail::batch::{FetchResult, RenderRequest};
use panelmail::error::{Error, FetchError};
use panelmail::options::parse_mailbox;
use panelmail::report::{InlineImage, Report, RunContext, build_message};
use panelmail::window::TimeWindow;
use reqwest::StatusCode;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

fn success(dir: &Path, slug: &str, panel: &str) -> FetchResult {
    let stem = format!("img_{slug}-{panel}");
    let path = dir.join(format!("{stem}.png"));
    std::fs::write(&path, format!("image {panel}")).unwrap();
    FetchResult {
        request: RenderRequest::panel("1", Some(slug), panel),
        stem,
        outcome: Ok(path),
    }
}

fn failure(slug: &str, panel: &str, status: StatusCode) -> FetchResult {
    FetchResult {
        request: RenderRequest::panel("1", Some(slug), panel),
        stem: format!("img_{slug}-{panel}"),
        outcome: Err(FetchError::Status(status)),
    }
}

fn context() -> RunContext {
    RunContext::new(
        parse_mailbox("grafana@example.com").unwrap(),
        "Daily Report",
        "Hello team,\nhere are <the> graphs.",
    )
}

fn report(results: &[FetchResult]) -> Report {
    Report::new(
        results,
        TimeWindow::new(1_000, 2_000).unwrap(),
        Some(2),
        Duration::from_millis(1500),
    )
}

#[test]
fn test_html_references_images_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = context();
    context.add_results(&[success(dir.path(), "ops", "2"), success(dir.path(), "ops", "1")]);

    let html = context.html();
    assert!(html.starts_with("<h3>Daily Report</h3>\n"));
    assert!(html.contains("Hello team,<br />\nhere are &lt;the&gt; graphs.<br />\n"));
    let first = html.find("cid:img_ops-2").expect("first image referenced");
    let second = html.find("cid:img_ops-1").expect("second image referenced");
    assert!(first < second);
    assert!(!html.contains("could not be rendered"));
}

#[test]
fn test_missing_panels_are_listed_not_referenced() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = context();
    context.add_results(&[
        success(dir.path(), "ops", "1"),
        failure("ops", "2", StatusCode::INTERNAL_SERVER_ERROR),
    ]);

    let html = context.html();
    assert!(html.contains("cid:img_ops-1"));
    assert!(!html.contains("cid:img_ops-2"));
    assert!(html.contains(
        "<li>ops panel 2: render endpoint returned 500 Internal Server Error</li>"
    ));
    assert!(context.text().contains("  - ops panel 2: render endpoint returned 500"));
}

#[test]
fn test_build_message_structure() {
    let dir = tempfile::tempdir().unwrap();
    let results = vec![success(dir.path(), "ops", "1"), success(dir.path(), "ops", "2")];
    let mut context = context();
    context.add_results(&results);
    let images = InlineImage::load_all(&results).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].data, b"image 1");

    let recipient = parse_mailbox("ops@example.com").unwrap();
    let message = build_message(&context, &recipient, &images).expect("Message should build");
    let raw = String::from_utf8_lossy(&message.formatted()).to_string();

    assert!(raw.contains("From: grafana@example.com"));
    assert!(raw.contains("To: ops@example.com"));
    assert!(raw.contains("Subject: Daily Report"));
    assert!(raw.contains("Message-ID: <"));
    assert!(raw.contains("@example.com>"));
    assert!(raw.contains("Date: "));
    assert!(raw.contains("multipart/related"));
    assert!(raw.contains("multipart/alternative"));
    assert!(raw.contains("Content-ID: <img_ops-1>"));
    assert!(raw.contains("Content-ID: <img_ops-2>"));
    assert!(raw.contains("image/png"));
    assert!(raw.contains("Content-Disposition: attachment; filename=\"img_ops-1.png\""));
    assert!(raw.contains("Content-Disposition: attachment; filename=\"img_ops-2.png\""));
}

#[test]
fn test_load_all_skips_failures() {
    let dir = tempfile::tempdir().unwrap();
    let results = vec![
        failure("ops", "1", StatusCode::BAD_GATEWAY),
        success(dir.path(), "ops", "2"),
    ];
    let images = InlineImage::load_all(&results).unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].content_id, "img_ops-2");
}

#[test]
fn test_load_all_reports_vanished_files() {
    let dir = tempfile::tempdir().unwrap();
    let result = success(dir.path(), "ops", "1");
    std::fs::remove_file(result.local_path().unwrap()).unwrap();
    assert!(matches!(InlineImage::load_all(&[result]), Err(Error::Io(_))));
}

#[test]
fn test_exit_code_0_when_all_panels_rendered() {
    let dir = tempfile::tempdir().unwrap();
    let report = report(&[success(dir.path(), "a", "1"), success(dir.path(), "a", "2")]);
    assert_eq!(report.exit_code(), ExitCode::SUCCESS);
    assert_eq!(report.success_count(), 2);
}

#[test]
fn test_exit_code_2_when_panels_missing() {
    let dir = tempfile::tempdir().unwrap();
    let report = report(&[
        success(dir.path(), "a", "1"),
        failure("a", "2", StatusCode::NOT_FOUND),
    ]);
    assert_eq!(report.exit_code(), ExitCode::from(2));
}

#[test]
fn test_partial_batch_is_deliverable_unless_strict() {
    let dir = tempfile::tempdir().unwrap();
    let report = report(&[
        success(dir.path(), "a", "1"),
        failure("a", "2", StatusCode::NOT_FOUND),
    ]);

    assert!(report.ensure_deliverable(false).is_ok());
    match report.ensure_deliverable(true) {
        Err(Error::FetchFailed { failed, total, first }) => {
            assert_eq!((failed, total), (1, 2));
            assert!(first.contains("a panel 2"));
        }
        other => panic!("Expected FetchFailed, got {:?}", other),
    }
}

#[test]
fn test_nothing_rendered_is_never_deliverable() {
    let report = report(&[failure("a", "1", StatusCode::INTERNAL_SERVER_ERROR)]);
    assert!(matches!(
        report.ensure_deliverable(false),
        Err(Error::FetchFailed { failed: 1, total: 1, .. })
    ));
}

#[test]
fn test_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let report = report(&[
        success(dir.path(), "a", "1"),
        failure("a", "2", StatusCode::INTERNAL_SERVER_ERROR),
    ]);

    let json: serde_json::Value = serde_json::from_str(&report.to_json_string().unwrap()).unwrap();
    assert_eq!(json["summary"]["rendered"], 1);
    assert_eq!(json["summary"]["missing"], 1);
    assert_eq!(json["summary"]["concurrencyLimit"], 2);
    assert_eq!(json["summary"]["window"]["from"], 1000);
    assert_eq!(json["summary"]["imageBytes"], 7);
    assert_eq!(json["panels"][0]["contentId"], "img_a-1");
    assert_eq!(json["panels"][0]["statusCode"], 200);
    assert_eq!(json["panels"][1]["statusCode"], 500);
    assert!(json["panels"][1]["error"].as_str().unwrap().contains("500"));
}
