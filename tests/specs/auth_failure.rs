//! Authentication-failure classification: an authenticated scan whose
//! report says credentialed checks did not run must fail, with a
//! troubleshooting block in the status response.

use crate::prelude::*;
use sw_core::{AuthenticationStatus, CredentialMethod, Credentials, ScanType, TaskState};
use sw_results::sample;

fn uncredentialed_artifact() -> Vec<u8> {
    // Plugin 19506 reports "Credentialed checks : no" and there are fewer
    // than five auth-only plugin hits.
    sample::render(
        "auth scan",
        &[(
            "10.0.0.1",
            vec![
                sample::scan_info_item("no"),
                sample::item(10394, 0),
                sample::item(11219, 2),
            ],
        )],
    )
    .into_bytes()
}

#[tokio::test]
async fn failed_authentication_fails_the_task_with_troubleshooting() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let backend = spec.backend("default", "a");
    backend.push_status("running", Some(60));
    backend.set_export(uncredentialed_artifact());

    let mut submission = spec.submission("auth scan", None);
    submission.scan_type = ScanType::Authenticated;
    submission.request.credentials = Some(Credentials {
        username: "svc-scan".to_string(),
        password: "wrong-password".to_string(),
        method: CredentialMethod::Password,
    });
    let receipt = spec.orchestrator.submit_scan(submission).unwrap();

    spec.wait_state(&receipt.task_id, TaskState::Failed).await;

    let status = spec.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(
        status.authentication_status,
        Some(AuthenticationStatus::Failed)
    );
    let error = status.error_message.unwrap();
    assert!(error.contains("authentication failed"));

    let troubleshooting = status.troubleshooting.unwrap().join(" ");
    assert!(troubleshooting.contains("credentials"));
    assert!(troubleshooting.contains("reachable"));
    assert!(troubleshooting.contains("privileges"));

    // Scan-logical failure: nothing for the operator to retry in the DLQ.
    assert_eq!(spec.queue.dlq_depth("default"), 0);
    spec.stop();
}

#[tokio::test]
async fn successful_authentication_completes() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let backend = spec.backend("default", "a");
    backend.set_export(
        sample::render(
            "auth scan",
            &[(
                "10.0.0.1",
                vec![sample::scan_info_item("yes (as 'root' via ssh)"), sample::item(11219, 2)],
            )],
        )
        .into_bytes(),
    );

    let mut submission = spec.submission("auth scan", None);
    submission.scan_type = ScanType::Authenticated;
    submission.request.credentials = Some(Credentials {
        username: "svc-scan".to_string(),
        password: "correct".to_string(),
        method: CredentialMethod::Password,
    });
    let receipt = spec.orchestrator.submit_scan(submission).unwrap();

    spec.wait_state(&receipt.task_id, TaskState::Completed).await;
    let status = spec.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(
        status.authentication_status,
        Some(AuthenticationStatus::Success)
    );
    spec.stop();
}
