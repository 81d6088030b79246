//! Results pipeline end-to-end: filtering, pagination, and deterministic
//! NDJSON through the orchestrator.

use crate::prelude::*;
use std::collections::BTreeMap;
use sw_api::{ApiError, ResultsRequest};
use sw_core::TaskState;
use sw_results::sample;

/// 145 non-info findings; exactly 100 have severity >= 3.
fn large_artifact() -> Vec<u8> {
    let mut items = Vec::new();
    for i in 0..70 {
        items.push(sample::item(100_000 + i, 3));
    }
    for i in 0..30 {
        items.push(sample::item(200_000 + i, 4));
    }
    for i in 0..45 {
        items.push(sample::item(300_000 + i, if i % 2 == 0 { 2 } else { 1 }));
    }
    sample::render("quarterly", &[("10.0.0.1", items)]).into_bytes()
}

async fn completed_scan(spec: &Spec) -> sw_core::TaskId {
    let backend = spec.backend("default", "a");
    backend.set_export(large_artifact());
    let receipt = spec.submit("quarterly");
    spec.wait_state(&receipt.task_id, TaskState::Completed).await;
    receipt.task_id
}

#[tokio::test]
async fn filtered_page_two_with_pagination_trailer() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let task_id = completed_scan(&spec).await;

    let request = ResultsRequest {
        page: 2,
        page_size: Some(40),
        profile: Some("brief".to_string()),
        custom_fields: None,
        filters: BTreeMap::from([("severity".to_string(), ">=3".to_string())]),
    };
    let output = spec.orchestrator.get_task_results(&task_id, &request).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 43, "schema + metadata + 40 rows + pagination");
    assert_eq!(lines[0]["type"], "schema");
    assert_eq!(lines[0]["total_vulnerabilities"], 100);
    assert_eq!(lines[0]["total_pages"], 3);
    assert_eq!(lines[0]["filters_applied"]["severity"], ">=3");
    assert_eq!(lines[1]["type"], "scan_metadata");

    let pagination = lines.last().unwrap();
    assert_eq!(pagination["page"], 2);
    assert_eq!(pagination["page_size"], 40);
    assert_eq!(pagination["total_pages"], 3);
    assert_eq!(pagination["has_next"], true);
    assert_eq!(pagination["next_page"], 3);

    // Identical arguments give byte-identical output.
    let repeat = spec.orchestrator.get_task_results(&task_id, &request).unwrap();
    assert_eq!(output, repeat);
    spec.stop();
}

#[tokio::test]
async fn page_zero_streams_all_rows() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let task_id = completed_scan(&spec).await;

    let request = ResultsRequest {
        page: 0,
        ..Default::default()
    };
    let output = spec.orchestrator.get_task_results(&task_id, &request).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2 + 145);
    assert!(lines.iter().all(|line| line["type"] != "pagination"));
    spec.stop();
}

#[tokio::test]
async fn caller_errors_are_rejected_without_output() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let task_id = completed_scan(&spec).await;

    // page_size out of bounds
    let request = ResultsRequest {
        page: 1,
        page_size: Some(500),
        ..Default::default()
    };
    assert!(matches!(
        spec.orchestrator.get_task_results(&task_id, &request),
        Err(ApiError::InvalidArgument(_))
    ));

    // profile + custom_fields conflict
    let request = ResultsRequest {
        page: 1,
        profile: Some("minimal".to_string()),
        custom_fields: Some(vec!["host".to_string()]),
        ..Default::default()
    };
    assert!(matches!(
        spec.orchestrator.get_task_results(&task_id, &request),
        Err(ApiError::InvalidArgument(_))
    ));
    spec.stop();
}
