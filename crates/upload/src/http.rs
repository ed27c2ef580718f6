//! Storage server client over HTTP.
//!
//! Multipart requests with Bearer token authentication, matching the
//! storage server's `/upload` routes.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};

use ledger_protocol::constants::{CHUNK_PART_NAME, CHUNK_UPLOAD_ROUTE, CREATE_UPLOAD_ROUTE};
use ledger_protocol::{ChunkUploadRequest, CreateUploadRequest, CreateUploadResponse};
use tracing::{debug, warn};

use crate::client::{ClientFuture, UploadSessionClient};
use crate::error::UploadError;
use crate::types::SessionInfo;

/// [`UploadSessionClient`] talking to the storage server.
pub struct HttpSessionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSessionClient {
    /// Creates a client for `server` (e.g. `https://files.example.com`),
    /// authenticating with `token` when given.
    pub fn new(server: &str, token: Option<&str>) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| UploadError::Config("token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self::with_client(http, server))
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, server: &str) -> Self {
        Self {
            http,
            base_url: server.trim_end_matches('/').to_string(),
        }
    }

    pub fn create_url(&self) -> String {
        format!("{}{}", self.base_url, CREATE_UPLOAD_ROUTE)
    }

    pub fn chunk_url(&self, file_id: &str) -> String {
        format!("{}{}/{}", self.base_url, CHUNK_UPLOAD_ROUTE, file_id)
    }

    async fn create(&self, request: &CreateUploadRequest) -> Result<SessionInfo, UploadError> {
        let form = text_form(request.form_fields());
        let resp = self.http.post(self.create_url()).multipart(form).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Session(format!(
                "{} {}: {}",
                status.as_u16(),
                request.file_name,
                body.trim()
            )));
        }

        let created: CreateUploadResponse = resp.json().await?;
        debug!(file = %request.file_name, file_id = %created.file_id, "upload created");
        Ok(created.into())
    }

    async fn send_chunk(
        &self,
        request: &ChunkUploadRequest,
        data: &[u8],
    ) -> Result<bool, UploadError> {
        let part = Part::bytes(data.to_vec()).file_name(format!("chunk-{}", request.chunk_number));
        let form = text_form(request.form_fields()).part(CHUNK_PART_NAME, part);

        let resp = self
            .http
            .post(self.chunk_url(&request.file_id))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        let accepted = chunk_accepted(status.as_u16(), &body);
        if !accepted {
            warn!(
                file_id = %request.file_id,
                chunk = request.chunk_number,
                status = status.as_u16(),
                body = %body.trim(),
                "chunk rejected"
            );
        }
        Ok(accepted)
    }
}

impl UploadSessionClient for HttpSessionClient {
    fn begin_session<'a>(
        &'a self,
        request: &'a CreateUploadRequest,
    ) -> ClientFuture<'a, SessionInfo> {
        Box::pin(self.create(request))
    }

    fn upload_chunk<'a>(
        &'a self,
        request: &'a ChunkUploadRequest,
        data: &'a [u8],
    ) -> ClientFuture<'a, bool> {
        Box::pin(self.send_chunk(request, data))
    }
}

fn text_form(fields: Vec<(&'static str, String)>) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
}

/// The server answers chunk errors with a 200 and a plain-text body that
/// starts with `Failed` or `Missing`.
fn chunk_accepted(status: u16, body: &str) -> bool {
    if !(200..300).contains(&status) {
        return false;
    }
    let body = body.trim_start();
    !(body.starts_with("Failed") || body.starts_with("Missing"))
}
