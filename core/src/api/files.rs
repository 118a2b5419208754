//! File upload and download.
//!
//! Downloads take two steps: the API hands out a short-lived URL, and the
//! bytes are then fetched from that URL without the workspace token.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;
use ureq::unversioned::multipart::{Form, Part};

use super::{FILES, FILE_URL};
use crate::client::{into_object, require, str_field, OpsBeaconClient};
use crate::error::{OpsBeaconError, Result};
use crate::executor::{decode_json, segment, ApiCall};
use crate::http::HttpMethod;
use crate::transport::Transport;
use crate::types::FileUpload;

fn file_error(message: String, file_name: &str, operation: &str) -> OpsBeaconError {
    OpsBeaconError::FileOperation {
        message,
        file_name: Some(file_name.to_string()),
        operation: Some(operation.to_string()),
    }
}

impl<T: Transport> OpsBeaconClient<T> {
    /// Upload in-memory content or a local file to the workspace.
    pub fn file_upload(&self, upload: FileUpload) -> Result<bool> {
        let (file_name, content, content_type) = match upload {
            FileUpload::Content { file_name, content } => {
                if file_name.trim().is_empty() {
                    return Err(OpsBeaconError::validation(
                        "file_name is required when uploading content",
                        Some("file_name"),
                    ));
                }
                (file_name, content, "text/csv")
            }
            FileUpload::Path { path, file_name } => {
                let file_name = match file_name.filter(|n| !n.trim().is_empty()) {
                    Some(name) => name,
                    None => path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| OpsBeaconError::required("file_name"))?,
                };
                let content = fs::read(&path).map_err(|e| {
                    let shown = path.display().to_string();
                    let message = if e.kind() == io::ErrorKind::NotFound {
                        format!("File not found: {shown}")
                    } else {
                        format!("Failed to read {shown}: {e}")
                    };
                    file_error(message, &shown, "upload")
                })?;
                (file_name, content, "application/octet-stream")
            }
        };

        let (form_type, body) = encode_form(&file_name, &content, content_type)
            .map_err(|e| file_error(format!("Failed to encode upload: {e}"), &file_name, "upload"))?;
        let response = self
            .executor()
            .execute(ApiCall::post(FILES).encoded(form_type, body).resource("File", &file_name))
            .map_err(|err| match err {
                err @ (OpsBeaconError::Api { .. } | OpsBeaconError::RateLimit { .. }) => {
                    file_error(format!("Failed to upload file: {err}"), &file_name, "upload")
                }
                other => other,
            })?;

        // Some deployments answer 200 with `{"success": false, "err": ...}`.
        if let Ok(Value::Object(body)) = decode_json(&response) {
            if body.get("success") == Some(&Value::Bool(false)) {
                let reason = str_field(&body, "err").unwrap_or("upload rejected");
                return Err(file_error(
                    format!("Failed to upload file: {reason}"),
                    &file_name,
                    "upload",
                ));
            }
        }
        Ok(true)
    }

    /// Ask the API for a temporary download URL for `file_id`.
    pub fn get_file_download_url(&self, file_id: &str) -> Result<String> {
        require(file_id, "file_id")?;
        let body = into_object(self.executor().json(
            ApiCall::get(format!("{FILE_URL}/{}", segment(file_id))).resource("File", file_id),
        )?);

        if body.get("success") != Some(&Value::Bool(true)) {
            let reason = str_field(&body, "err").unwrap_or("Unknown error");
            return Err(file_error(reason.to_string(), file_id, "get_download_url"));
        }
        let url = str_field(&body, "url").ok_or_else(|| {
            file_error("download URL missing from response".to_string(), file_id, "get_download_url")
        })?;
        // A path-only URL is served by the API host itself.
        if url.starts_with('/') {
            Ok(format!("{}{url}", self.base_url()))
        } else {
            Ok(url.to_string())
        }
    }

    /// Download `file_name` to `destination_path`, or to `./{file_name}`.
    ///
    /// Nothing is written unless the download itself succeeded.
    pub fn file_download(&self, file_name: &str, destination_path: Option<&Path>) -> Result<bool> {
        require(file_name, "file_name")?;
        let url = self.get_file_download_url(file_name)?;

        let response = self
            .executor()
            .external(HttpMethod::Get, &url, None, None)
            .map_err(|e| file_error(format!("Failed to download file: {e}"), file_name, "download"))?;
        if !response.is_success() {
            return Err(file_error(
                format!("Failed to download file: HTTP {}", response.status),
                file_name,
                "download",
            ));
        }

        let destination = destination_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(file_name));
        write_file(&destination, &response.body).map_err(|e| {
            file_error(
                format!("Failed to write {}: {e}", destination.display()),
                file_name,
                "download",
            )
        })?;
        if self.debug() {
            debug!(file_name, bytes = response.body.len(), destination = %destination.display(), "file downloaded");
        }
        Ok(true)
    }
}

/// `(content type, body)` of a form with a `filename` text part and a
/// `file` part.
fn encode_form(file_name: &str, content: &[u8], content_type: &str) -> io::Result<(String, Vec<u8>)> {
    let part = Part::bytes(content)
        .file_name(file_name)
        .mime_str(content_type)
        .map_err(io::Error::other)?;
    let mut form = Form::new().text("filename", file_name).part("file", part);
    let form_type = format!("multipart/form-data; boundary={}", form.boundary());
    let mut body = Vec::with_capacity(content.len() + 512);
    form.read_to_end(&mut body)?;
    Ok((form_type, body))
}

/// Write `bytes` to a sibling temp file and move it over `path`, so a failed
/// write never leaves a truncated destination behind.
fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
