// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nessus HTTP adapter.
//!
//! Session-token authentication, template selection by scan type, and
//! the three-step export dance (request, poll ready, download). One
//! adapter instance owns one HTTP session against one appliance.

use crate::{BackendError, BackendFactory, ScanSpec, ScannerBackend, StatusView, TracedBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;
use sw_core::{CredentialMethod, Credentials, InstanceConfig, ScanType};

/// Per-HTTP-call deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Export readiness poll: interval and attempt bound.
const EXPORT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const EXPORT_POLL_ATTEMPTS: u32 = 90;

/// Scan editor template for uncredentialed network scans.
const TEMPLATE_BASIC: &str = "731a8e52-3ea6-a291-ec0a-d2ff0619c19d7bd788d6";
/// Scan editor template for credentialed patch audits.
const TEMPLATE_CREDENTIALED: &str = "0625147c-30fe-d79f-e54c-ce0e9fa3a16b0d44f09d";

pub struct NessusBackend {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl NessusBackend {
    pub fn new(config: &InstanceConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| BackendError::Fatal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_header(&self) -> Result<String, BackendError> {
        self.token
            .lock()
            .clone()
            .map(|token| format!("token={token}"))
            .ok_or_else(|| BackendError::Fatal("not authenticated".to_string()))
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, BackendError> {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("X-Cookie", self.session_header()?)
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(transport_error)?;
        check_status(path, response)
    }

    async fn json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BackendError> {
        self.request(method, path, body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Retryable(format!("{path}: invalid response body: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    BackendError::Retryable(format!("transport: {e}"))
}

/// 2xx passes through; 5xx and 429 are retryable; everything else is
/// fatal for this scan.
fn check_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::Retryable(format!("{path}: HTTP {status}")));
    }
    Err(BackendError::Fatal(format!("{path}: HTTP {status}")))
}

/// Nested credential payload in the scanner's wire shape, built just in
/// time for create and dropped with the request body.
fn credentials_payload(credentials: &Credentials) -> Value {
    match credentials.method {
        CredentialMethod::Password => json!({
            "add": {
                "Host": {
                    "SSH": [{
                        "auth_method": "password",
                        "username": credentials.username,
                        "password": credentials.password,
                        "elevate_privileges_with": "Nothing",
                    }]
                }
            }
        }),
        CredentialMethod::SshKey => json!({
            "add": {
                "Host": {
                    "SSH": [{
                        "auth_method": "public key",
                        "username": credentials.username,
                        "private_key": credentials.password,
                        "elevate_privileges_with": "Nothing",
                    }]
                }
            }
        }),
    }
}

fn template_for(scan_type: ScanType) -> &'static str {
    match scan_type {
        ScanType::Untrusted => TEMPLATE_BASIC,
        ScanType::Authenticated | ScanType::AuthenticatedPrivileged => TEMPLATE_CREDENTIALED,
    }
}

#[async_trait]
impl ScannerBackend for NessusBackend {
    async fn authenticate(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/session"))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(transport_error)?;
        let body: Value = check_status("/session", response)?
            .json()
            .await
            .map_err(|e| BackendError::Retryable(format!("/session: invalid body: {e}")))?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Fatal("/session: no token in response".to_string()))?;
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    async fn create(&self, spec: &ScanSpec) -> Result<i64, BackendError> {
        let mut body = json!({
            "uuid": template_for(spec.scan_type),
            "settings": {
                "name": spec.name,
                "description": spec.description.clone().unwrap_or_default(),
                "text_targets": spec.targets,
                "launch_now": false,
            }
        });
        if let Some(credentials) = &spec.credentials {
            body["credentials"] = credentials_payload(credentials);
        }
        let response = self
            .json(reqwest::Method::POST, "/scans", Some(body))
            .await?;
        response
            .pointer("/scan/id")
            .and_then(Value::as_i64)
            .ok_or_else(|| BackendError::Fatal("/scans: no scan id in response".to_string()))
    }

    async fn launch(&self, scan_id: i64) -> Result<String, BackendError> {
        let response = self
            .json(
                reqwest::Method::POST,
                &format!("/scans/{scan_id}/launch"),
                None,
            )
            .await?;
        response
            .get("scan_uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Fatal("launch: no scan_uuid in response".to_string()))
    }

    async fn status(&self, scan_id: i64) -> Result<StatusView, BackendError> {
        let response = self
            .json(reqwest::Method::GET, &format!("/scans/{scan_id}"), None)
            .await?;
        let status = response
            .pointer("/info/status")
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string();
        let progress = response
            .pointer("/info/progress")
            .and_then(Value::as_u64)
            .map(|p| p.min(100) as u8);
        Ok(StatusView { status, progress })
    }

    async fn export(&self, scan_id: i64, format: &str) -> Result<Vec<u8>, BackendError> {
        let requested = self
            .json(
                reqwest::Method::POST,
                &format!("/scans/{scan_id}/export"),
                Some(json!({ "format": format })),
            )
            .await?;
        let file_id = requested
            .get("file")
            .and_then(Value::as_i64)
            .ok_or_else(|| BackendError::Fatal("export: no file id in response".to_string()))?;

        let status_path = format!("/scans/{scan_id}/export/{file_id}/status");
        let mut ready = false;
        for _ in 0..EXPORT_POLL_ATTEMPTS {
            let status = self
                .json(reqwest::Method::GET, &status_path, None)
                .await?;
            if status.get("status").and_then(Value::as_str) == Some("ready") {
                ready = true;
                break;
            }
            tokio::time::sleep(EXPORT_POLL_INTERVAL).await;
        }
        if !ready {
            return Err(BackendError::Retryable(format!(
                "export of scan {scan_id} never became ready"
            )));
        }

        let download = self
            .request(
                reqwest::Method::GET,
                &format!("/scans/{scan_id}/export/{file_id}/download"),
                None,
            )
            .await?;
        Ok(download
            .bytes()
            .await
            .map_err(|e| BackendError::Retryable(format!("export download: {e}")))?
            .to_vec())
    }

    async fn stop(&self, scan_id: i64) -> Result<(), BackendError> {
        let path = format!("/scans/{scan_id}/stop");
        let result = self.request(reqwest::Method::POST, &path, None).await;
        match result {
            Ok(_) => Ok(()),
            // Already stopped counts as stopped.
            Err(BackendError::Fatal(message)) if message.contains("409") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, scan_id: i64) -> Result<(), BackendError> {
        // First delete trashes the scan, the second removes it for good.
        let path = format!("/scans/{scan_id}");
        self.request(reqwest::Method::DELETE, &path, None).await?;
        let _ = self.request(reqwest::Method::DELETE, &path, None).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        if self.token.lock().is_none() {
            return Ok(());
        }
        let _ = self
            .request(reqwest::Method::DELETE, "/session", None)
            .await;
        *self.token.lock() = None;
        Ok(())
    }
}

/// Factory for traced Nessus adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NessusBackendFactory;

impl NessusBackendFactory {
    pub fn new() -> Self {
        Self
    }
}

impl BackendFactory for NessusBackendFactory {
    type Backend = TracedBackend<NessusBackend>;

    fn connect(
        &self,
        pool: &str,
        instance_id: &str,
        config: &InstanceConfig,
    ) -> Result<Self::Backend, BackendError> {
        Ok(TracedBackend::new(
            NessusBackend::new(config)?,
            format!("{pool}/{instance_id}"),
        ))
    }
}
