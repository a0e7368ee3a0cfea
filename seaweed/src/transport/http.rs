//! HTTP transport based on reqwest.
//!
//! One `reqwest::Client` is shared by every call, so connections to each
//! volume server are pooled and reused across uploads.

use super::{
    DeleteFailure, Download, Transport, Upload, UploadBody, UploadResult, is_delete_success,
    parse_content_disposition,
};
use crate::config::SeaweedConfig;
use crate::error::{Result, SeaweedError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_ENCODING, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use tracing::debug;
use url::Url;

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &SeaweedConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SeaweedError::http("<client builder>", e))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn read_body(url: &Url, resp: Response) -> Result<Bytes> {
        resp.bytes().await.map_err(|e| SeaweedError::http(url, e))
    }

    async fn expect_ok(url: &Url, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(resp);
        }
        let body = resp.text().await.map_err(|e| SeaweedError::http(url, e))?;
        Err(SeaweedError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> Result<Bytes> {
        debug!(%url, "post form");
        let resp = self
            .client
            .post(url.clone())
            .form(form)
            .send()
            .await
            .map_err(|e| SeaweedError::http(url, e))?;
        Self::read_body(url, resp).await
    }

    async fn get(&self, url: &Url) -> Result<Bytes> {
        debug!(%url, "get");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SeaweedError::http(url, e))?;
        let resp = Self::expect_ok(url, resp).await?;
        Self::read_body(url, resp).await
    }

    async fn upload(&self, url: &Url, upload: Upload) -> Result<UploadResult> {
        let size = upload.body.len();
        let body = match upload.body {
            UploadBody::Full(data) => Body::from(data),
            UploadBody::Stream { stream, .. } => Body::wrap_stream(stream),
        };
        let mut part = Part::stream_with_length(body, size).file_name(upload.file_name);
        if let Some(mime) = upload.mime_type.as_deref() {
            part = part.mime_str(mime).map_err(|e| SeaweedError::http(url, e))?;
        }
        if upload.is_gzipped {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            part = part.headers(headers);
        }
        let form = Form::new().part("file", part);

        debug!(%url, size, "upload");
        let resp = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SeaweedError::http(url, e))?;
        let status = resp.status();
        let body = Self::read_body(url, resp).await?;

        let ret: UploadResult = match serde_json::from_slice(&body) {
            Ok(ret) => ret,
            Err(_) if !status.is_success() => {
                return Err(SeaweedError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Err(e) => {
                return Err(SeaweedError::json(
                    format!(
                        "failed to read upload response from {url}: {}",
                        String::from_utf8_lossy(&body)
                    ),
                    e,
                ));
            }
        };
        if !ret.error.is_empty() {
            return Err(SeaweedError::remote(url, ret.error));
        }
        Ok(ret)
    }

    async fn delete(&self, url: &Url) -> Result<()> {
        debug!(%url, "delete");
        let resp = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| SeaweedError::http(url, e))?;
        let status = resp.status().as_u16();
        let body = Self::read_body(url, resp).await?;
        if is_delete_success(status) {
            return Ok(());
        }
        Err(SeaweedError::remote(
            url,
            DeleteFailure::from_body(&body).message(),
        ))
    }

    async fn download(&self, url: &Url) -> Result<Download> {
        debug!(%url, "download");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SeaweedError::http(url, e))?;
        let resp = Self::expect_ok(url, resp).await?;

        let headers = resp.headers();
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);
        let is_gzipped = headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        let data = Self::read_body(url, resp).await?;
        Ok(Download {
            file_name,
            is_gzipped,
            data,
        })
    }
}
