//! Multipart uploads and downloads
//!
//! # API Endpoints
//!
//! ## POST /upload
//!
//! `multipart/form-data` body. The first field that carries a filename (or
//! is named `file`) is stored; other fields are skipped. Returns
//! `201 Created` with the stored [`UploadArtifact`].
//!
//! ## GET /files
//!
//! All stored artifacts, newest first.
//!
//! ## GET /files/{id}
//!
//! The content of one artifact as an attachment.
//!
//! # On Disk
//!
//! ```text
//! <dir>/.<rand>.part  content while it is being received
//! <dir>/<id>          content once complete
//! <dir>/<id>.json     the UploadArtifact record
//! ```
//!
//! Content is written chunk by chunk as it arrives and is never held in
//! memory as a whole.

use crate::error::{ApiError, UploadError};
use crate::transport::http::AppState;
use crate::types::UploadArtifact;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Allowance for multipart boundaries and part headers on top of the
/// artifact size limit
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

const DEFAULT_FILENAME: &str = "upload.bin";
const MAX_FILENAME_LEN: usize = 255;

/// Directory-backed artifact storage
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: u64,
    require_session: bool,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, require_session: bool) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            require_session,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Largest request body accepted on the upload route
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_bytes.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
    }

    fn content_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Stream `chunks` to disk as a new artifact
    ///
    /// Stops reading as soon as the running size passes the limit. Content
    /// goes to an anonymous temporary file that is deleted on every error
    /// path, including when this future is dropped before it completes.
    pub async fn save<S>(&self, filename: &str, chunks: S) -> Result<UploadArtifact, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>>,
    {
        let content = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        let mut file = File::from_std(content.as_file().try_clone()?);

        let mut chunks = std::pin::pin!(chunks);
        let mut size = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(UploadError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if size == 0 {
            return Err(UploadError::Empty);
        }

        let artifact = UploadArtifact {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            size,
            uploaded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.commit(&artifact, content)?;

        tracing::info!(
            id = %artifact.id,
            filename = %artifact.filename,
            size = artifact.size,
            "Upload stored"
        );
        Ok(artifact)
    }

    /// Move the received content and its record into place
    ///
    /// Runs without suspending, so the pair is published together or not
    /// at all.
    fn commit(&self, artifact: &UploadArtifact, content: NamedTempFile) -> Result<(), UploadError> {
        let mut record = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        serde_json::to_writer_pretty(record.as_file_mut(), artifact)
            .map_err(|e| UploadError::Io(std::io::Error::other(e)))?;
        record.as_file_mut().flush()?;

        let content_path = self.content_path(artifact.id);
        content
            .persist(&content_path)
            .map_err(|e| UploadError::Io(e.error))?;
        if let Err(e) = record.persist(self.record_path(artifact.id)) {
            let _ = std::fs::remove_file(&content_path);
            return Err(UploadError::Io(e.error));
        }
        Ok(())
    }

    /// Record and content path of a stored artifact
    pub async fn find(&self, id: Uuid) -> Result<Option<(UploadArtifact, PathBuf)>, UploadError> {
        let record = match fs::read(self.record_path(id)).await {
            Ok(record) => record,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact: UploadArtifact = match serde_json::from_slice(&record) {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!("Skipping unreadable upload record for {}: {}", id, e);
                return Ok(None);
            }
        };

        let content = self.content_path(id);
        if !fs::try_exists(&content).await? {
            return Ok(None);
        }

        Ok(Some((artifact, content)))
    }

    /// All stored artifacts, newest first
    pub async fn list(&self) -> Result<Vec<UploadArtifact>, UploadError> {
        let mut artifacts = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| Uuid::parse_str(n).ok())
            else {
                continue;
            };

            if let Some((artifact, _)) = self.find(id).await? {
                artifacts.push(artifact);
            }
        }

        artifacts.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(artifacts)
    }
}

/// Reduce a client-supplied filename to a safe basename
///
/// Only `[A-Za-z0-9._-]` survive and leading dots are dropped, so the
/// result can never name a directory or a hidden file.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");

    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.chars().take(MAX_FILENAME_LEN).collect()
    }
}

fn multipart_error(limit: u64) -> impl Fn(MultipartError) -> UploadError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge { limit }
        } else {
            UploadError::Malformed(e.body_text())
        }
    }
}

async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadArtifact, UploadError> {
    let uploads = &state.uploads;

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(declared) = declared {
        if declared > uploads.max_bytes.saturating_add(MULTIPART_OVERHEAD) {
            return Err(UploadError::TooLarge {
                limit: uploads.max_bytes,
            });
        }
    }

    let mut multipart = multipart.map_err(|e| UploadError::Malformed(e.body_text()))?;
    let to_upload_error = multipart_error(uploads.max_bytes);

    while let Some(field) = multipart.next_field().await.map_err(&to_upload_error)? {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        return uploads
            .save(&filename, field.map_err(&to_upload_error))
            .await;
    }

    Err(UploadError::MissingFile)
}

/// `POST /upload`
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadArtifact>), ApiError> {
    if state.uploads.require_session {
        state.accounts.require_session(&headers).await?;
    }

    match receive(&state, &headers, multipart).await {
        Ok(artifact) => {
            state.metrics.record_upload(artifact.size);
            Ok((StatusCode::CREATED, Json(artifact)))
        }
        Err(e) => {
            state.metrics.record_upload_rejected();
            Err(e.into())
        }
    }
}

/// `GET /files`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UploadArtifact>>, ApiError> {
    if state.uploads.require_session {
        state.accounts.require_session(&headers).await?;
    }

    Ok(Json(state.uploads.list().await?))
}

/// `GET /files/{id}`
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if state.uploads.require_session {
        state.accounts.require_session(&headers).await?;
    }

    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    let (artifact, path) = state.uploads.find(id).await?.ok_or(ApiError::NotFound)?;

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(e) => return Err(UploadError::Io(e).into()),
    };

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.filename
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(artifact.size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
