//! Google Drive v3 REST client.
//!
//! Only the handful of calls the uploader needs are covered: folder lookup,
//! creation and listing, moving a file to trash, and resumable uploads.
//! Every request is authorized through the shared [`TokenSource`], which
//! refreshes the credential before it expires.

pub mod auth;

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use indicatif::ProgressBar;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode, header};
use serde_json::json;
use tokio::{sync::Mutex, time::sleep};
use tokio_util::io::ReaderStream;

use crate::{
    config,
    error::{Error, Result},
    management::{FolderTree, TokenSource},
    types::{CreatedFile, DriveFolder, FolderListResponse, UploadedFile},
    warning,
};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const PAGE_SIZE: u32 = 100;
const MAX_ATTEMPTS: u32 = 3;
const MAX_RETRY_AFTER_SECS: u64 = 120;

/// Folder and file operations on the remote drive.
#[async_trait]
pub trait DriveService: FolderTree {
    /// Id of the non-trashed folder `name` directly under `parent_id`.
    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>>;

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    async fn find_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        match self.find_folder(name, parent_id).await? {
            Some(id) => Ok(id),
            None => self.create_folder(name, parent_id).await,
        }
    }

    async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        parent_id: &str,
        progress: &ProgressBar,
    ) -> Result<UploadedFile>;
}

pub struct DriveClient {
    http: Client,
    tokens: Arc<Mutex<TokenSource>>,
    api_url: String,
    upload_url: String,
    retry_delay: Duration,
}

impl DriveClient {
    pub fn new(tokens: TokenSource) -> Self {
        DriveClient::with_endpoints(tokens, config::drive_api_url(), config::drive_upload_url())
    }

    pub fn with_endpoints(
        tokens: TokenSource,
        api_url: impl Into<String>,
        upload_url: impl Into<String>,
    ) -> Self {
        DriveClient {
            http: Client::new(),
            tokens: Arc::new(Mutex::new(tokens)),
            api_url: api_url.into(),
            upload_url: upload_url.into(),
            retry_delay: Duration::from_secs(10),
        }
    }

    /// Delay before retrying a 502/503, or a 429 without `Retry-After`.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn access_token(&self) -> Result<String> {
        self.tokens.lock().await.access_token().await
    }

    /// Sends the request built by `build`, retrying rate limits and gateway
    /// errors. Non-success responses become [`Error::RemoteCallFailed`].
    async fn send<F>(&self, operation: &'static str, target: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let token = self.access_token().await?;
            let response = build(&self.http)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| Error::remote(operation, target, e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retryable = matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
            );
            if retryable && attempt < MAX_ATTEMPTS {
                let delay = retry_after(&response).unwrap_or(self.retry_delay);
                warning!(
                    "{} for '{}' returned {}, retrying in {}s",
                    operation,
                    target,
                    status,
                    delay.as_secs()
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                operation,
                target,
                format!("status {}: {}", status, body.trim()),
            ));
        }
    }

    async fn list_page(&self, query: &str, page_token: Option<&str>) -> Result<FolderListResponse> {
        let url = format!("{}/files", self.api_url);
        let page_size = PAGE_SIZE.to_string();

        let response = self
            .send("list folders", query, |http| {
                let mut params = vec![
                    ("q", query),
                    ("pageSize", page_size.as_str()),
                    ("fields", "nextPageToken, files(id, name)"),
                ];
                if let Some(token) = page_token {
                    params.push(("pageToken", token));
                }
                http.get(&url).query(&params)
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| Error::remote("list folders", query, e))
    }

    async fn start_upload(&self, name: &str, parent_id: &str, size: u64) -> Result<String> {
        let url = format!("{}/files", self.upload_url);
        let metadata = json!({ "name": name, "parents": [parent_id] });

        let response = self
            .send("start upload", name, |http| {
                http.post(&url)
                    .query(&[("uploadType", "resumable"), ("fields", "id,name,size")])
                    .header("X-Upload-Content-Length", size)
                    .json(&metadata)
            })
            .await?;

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::remote("start upload", name, "no upload session location"))
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs <= MAX_RETRY_AFTER_SECS)
        .map(Duration::from_secs)
}

/// Quotes `value` for use inside a Drive query string literal.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn child_folders_query(parent_id: &str) -> String {
    format!(
        "mimeType = '{}' and '{}' in parents and trashed = false",
        FOLDER_MIME_TYPE,
        escape_query(parent_id)
    )
}

#[async_trait]
impl FolderTree for DriveClient {
    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<DriveFolder>> {
        let query = child_folders_query(parent_id);
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(&query, page_token.as_deref()).await?;
            folders.extend(page.files);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(folders)
    }

    async fn trash(&self, file_id: &str) -> Result<()> {
        let url = format!("{}/files/{}", self.api_url, file_id);
        self.send("trash", file_id, |http| {
            http.patch(&url).json(&json!({ "trashed": true }))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DriveService for DriveClient {
    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>> {
        let query = format!(
            "{} and name = '{}'",
            child_folders_query(parent_id),
            escape_query(name)
        );

        let page = self.list_page(&query, None).await?;
        Ok(page.files.into_iter().next().map(|folder| folder.id))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let url = format!("{}/files", self.api_url);
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let response = self
            .send("create folder", name, |http| {
                http.post(&url).query(&[("fields", "id")]).json(&metadata)
            })
            .await?;

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| Error::remote("create folder", name, e))?;
        Ok(created.id)
    }

    async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        parent_id: &str,
        progress: &ProgressBar,
    ) -> Result<UploadedFile> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        progress.set_length(size);

        let location = self.start_upload(name, parent_id, size).await?;
        let token = self.access_token().await?;

        let body = Body::wrap_stream(ReaderStream::new(progress.wrap_async_read(file)));
        let response = self
            .http
            .put(&location)
            .bearer_auth(token)
            .header(header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::remote("upload", name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                "upload",
                name,
                format!("status {}: {}", status, body.trim()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::remote("upload", name, e))
    }
}
