//! End-to-end pipeline tests: upload → validate → store → enqueue →
//! worker → verdict → notification.

mod helpers;

use axum_test::multipart::{MultipartForm, Part};
use casefile_core::models::{FileStatusEvent, ScanStatus};
use helpers::{api_path, spawn_app, spawn_app_with_storage, spawn_clamd_stub, wait_for_file};
use uuid::Uuid;

fn pdf_part(name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(b"%PDF-1.7 test document body".to_vec())
            .file_name(name)
            .mime_type("application/pdf"),
    )
}

#[tokio::test]
async fn clean_pdf_reaches_ready_and_events_fire_in_order() {
    let clamd = spawn_clamd_stub(b"stream: OK\0").await;
    let app = spawn_app(Some(clamd)).await;

    // Subscribe before uploading so no transition is missed.
    let mut events = app.state.notifier.subscribe_all();

    let response = app
        .client()
        .post(&api_path("/files"))
        .multipart(pdf_part("quarterly report.pdf"))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["content_type"], "application/pdf");
    assert_eq!(body["filename"], "quarterly_report.pdf");
    let file_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let settled = wait_for_file(&app, file_id, |body| body["status"] == "ready").await;
    assert_eq!(settled["scan_status"], "clean");
    assert_eq!(settled["sanitize_status"], "safe");
    assert!(settled["safe_path"].as_str().unwrap().contains("safe"));

    // Scanning must be announced before the clean verdict.
    let mut scan_transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        let event: FileStatusEvent = event;
        if event.file_id == file_id {
            scan_transitions.push(event.scan_status);
        }
    }
    let scanning_pos = scan_transitions
        .iter()
        .position(|s| *s == ScanStatus::Scanning)
        .expect("no scanning event");
    let clean_pos = scan_transitions
        .iter()
        .position(|s| *s == ScanStatus::Clean)
        .expect("no clean event");
    assert!(scanning_pos < clean_pos);
}

#[tokio::test]
async fn infected_upload_is_rejected_and_never_safe() {
    let clamd = spawn_clamd_stub(b"stream: Eicar-Signature FOUND\0").await;
    let app = spawn_app(Some(clamd)).await;

    let response = app
        .client()
        .post(&api_path("/files"))
        .multipart(pdf_part("invoice.pdf"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let file_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let settled = wait_for_file(&app, file_id, |body| body["status"] == "rejected").await;
    assert_eq!(settled["scan_status"], "infected");
    assert_eq!(settled["sanitize_status"], "none");
    assert!(settled["safe_path"].is_null());

    let file = app
        .state
        .files
        .get_by_id(file_id)
        .await
        .unwrap()
        .expect("file row missing");
    assert_eq!(file.detected_threats, vec!["Eicar-Signature".to_string()]);
    // The stored message is operator-readable, not protocol output.
    assert!(!file.processing_error.unwrap().contains("FOUND"));
}

#[tokio::test]
async fn unconfigured_scanner_yields_error_state_not_clean() {
    let app = spawn_app(None).await;

    let response = app
        .client()
        .post(&api_path("/files"))
        .multipart(pdf_part("note.pdf"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let file_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let settled = wait_for_file(&app, file_id, |body| body["status"] == "error").await;
    assert_eq!(settled["scan_status"], "error");
    assert!(settled["processing_error"]
        .as_str()
        .unwrap()
        .contains("not been checked"));

    // The failure lands in the scan-pipeline feed for later rescan. The
    // tracker write commits just after the status update, so poll briefly.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let failures = loop {
        let failures = app.state.scan_failures.list_unresolved(10).await.unwrap();
        if !failures.is_empty() {
            break failures;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no failure record appeared"
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subject_id, file_id.to_string());
    assert_eq!(failures[0].kind, "scanner_unavailable");
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_nothing_persisted() {
    let app = spawn_app(None).await;

    // Config caps test uploads at 1 MiB.
    let mut data = b"%PDF-1.7 ".to_vec();
    data.resize(2 * 1024 * 1024, 0x20);
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(data)
            .file_name("big.pdf")
            .mime_type("application/pdf"),
    );

    let response = app.client().post(&api_path("/files")).multipart(form).await;
    response.assert_status(http::StatusCode::PAYLOAD_TOO_LARGE);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM case_files")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn unsupported_type_is_rejected_with_detected_type_in_message() {
    let app = spawn_app(None).await;

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![0x00, 0x01, 0x02, 0x03])
            .file_name("firmware.bin")
            .mime_type("application/pdf"),
    );

    let response = app.client().post(&api_path("/files")).multipart(form).await;
    response.assert_status(http::StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Unsupported"));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM case_files")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn persist_failure_rolls_back_storage_and_surfaces_original_error() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let (storage, delete_calls) = helpers::RollbackProbeStorage::new(temp_dir.path()).await;
    let app = spawn_app_with_storage(None, Some(storage)).await;

    // Sever the database so the record insert fails after the blob lands.
    app.pool.close().await;

    let response = app
        .client()
        .post(&api_path("/files"))
        .multipart(pdf_part("doomed.pdf"))
        .await;
    response.assert_status(http::StatusCode::INTERNAL_SERVER_ERROR);

    // Rollback was attempted exactly once, and its (deliberate) failure
    // did not mask the database error.
    assert_eq!(delete_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "DATABASE_ERROR");
}

#[tokio::test]
async fn status_endpoint_returns_404_for_unknown_file() {
    let app = spawn_app(None).await;

    let response = app
        .client()
        .get(&api_path(&format!("/files/{}", Uuid::new_v4())))
        .await;
    response.assert_status(http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_scanner_configuration() {
    let app = spawn_app(None).await;

    let response = app.client().get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["database"], true);
    assert_eq!(body["scanner"]["configured"], false);
    assert_eq!(body["storage_backend"], "local");
}
