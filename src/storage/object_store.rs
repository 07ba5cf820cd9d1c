//! S3-compatible object store backend over the REST API.
//!
//! Path-style addressing (`{endpoint}/{bucket}/{key}`) so the same client
//! works against AWS and self-hosted stores such as MinIO. Requests are
//! signed with SigV4 (see `sigv4.rs`).

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use reqwest::{Method, Url};

use super::sigv4::{self, CanonicalRequest, Credentials, Signer};
use super::{join_lines, LineReader, ObjectRef, StorageBackend, StorageError, TextLines};
use crate::config::{ObjectStoreConfig, StorageType};

const SERVICE: &str = "s3";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Stop following continuation tokens after this many pages.
const MAX_LIST_PAGES: usize = 10_000;

pub struct ObjectStorage {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    bucket: String,
    region: String,
    credentials: Credentials,
}

impl ObjectStorage {
    /// Build a client for `config`, reading credentials from `AWS_*` variables.
    pub fn from_env(config: &ObjectStoreConfig) -> Result<Self, StorageError> {
        Self::new(config, Credentials::from_env()?)
    }

    pub fn new(config: &ObjectStoreConfig, credentials: Credentials) -> Result<Self, StorageError> {
        let endpoint = Url::parse(&config.endpoint_url())
            .map_err(|e| StorageError::Request(format!("invalid endpoint: {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(StorageError::Request(format!(
                    "endpoint has no host: {endpoint}"
                )))
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            host,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            credentials,
        })
    }

    /// Encoded request path for `key` (or the bucket itself).
    fn object_path(&self, key: Option<&str>) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        let bucket = sigv4::uri_encode(&self.bucket, false);
        match key {
            Some(key) => format!("{base}/{bucket}/{}", sigv4::uri_encode(key, true)),
            None => format!("{base}/{bucket}"),
        }
    }

    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(&str, &str)],
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, StorageError> {
        let path = self.object_path(key);
        let payload_hash = sigv4::sha256_hex(&body);
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let mut signed: Vec<(&str, &str)> = vec![
            ("host", self.host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token", token.as_str()));
        }

        let canonical = CanonicalRequest::new(method.as_str(), &path, query, &signed, &payload_hash);
        let authorization =
            Signer::new(&self.credentials, &self.region, SERVICE).authorization(&amz_date, &canonical);

        let mut url = format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.host,
            path
        );
        if !canonical.query().is_empty() {
            url.push('?');
            url.push_str(canonical.query());
        }

        let mut request = self
            .client
            .request(method, url)
            .header("authorization", authorization);
        for (name, value) in signed.iter().filter(|(name, _)| *name != "host") {
            request = request.header(*name, *value);
        }
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }

        request
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))
    }

    async fn expect_success(
        response: reqwest::Response,
        key: &str,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let response = self
            .send(Method::PUT, Some(key), &[], body, Some(content_type))
            .await?;
        Self::expect_success(response, key).await?;
        tracing::debug!(bucket = %self.bucket, key, "Object written");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::S3
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut query = vec![("list-type", "2"), ("prefix", prefix)];
            if let Some(token) = continuation.as_deref() {
                query.push(("continuation-token", token));
            }
            let response = self.send(Method::GET, None, &query, Vec::new(), None).await?;
            let response = Self::expect_success(response, prefix).await?;
            let xml = response
                .text()
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?;

            let page = parse_list_page(&xml)?;
            objects.extend(page.objects);
            match page.next_token {
                Some(token) if page.truncated => continuation = Some(token),
                _ => break,
            }
        }

        objects.retain(|o| !o.key.ends_with('/'));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn open_text(&self, key: &str) -> Result<TextLines, StorageError> {
        let response = self.send(Method::GET, Some(key), &[], Vec::new(), None).await?;
        let response = Self::expect_success(response, key).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(Box::new(LineReader::new(Cursor::new(bytes.to_vec()))))
    }

    async fn write_json(&self, key: &str, data: &serde_json::Value) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(data)?;
        self.put(key, body, "application/json").await
    }

    async fn write_text_lines(&self, key: &str, lines: &[String]) -> Result<(), StorageError> {
        self.put(key, join_lines(lines).into_bytes(), "application/x-ndjson")
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let response = self.send(Method::HEAD, Some(key), &[], Vec::new(), None).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(StorageError::Status {
                status: s.as_u16(),
                body: String::new(),
            }),
        }
    }
}

// ═══════════════════════════════════════════
// ListObjectsV2 response parsing
// ═══════════════════════════════════════════

#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<ObjectRef>,
    truncated: bool,
    next_token: Option<String>,
}

#[derive(Default)]
struct PartialObject {
    key: Option<String>,
    size: u64,
    last_modified: Option<String>,
}

fn parse_list_page(xml: &str) -> Result<ListPage, StorageError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut page = ListPage::default();
    let mut current: Option<PartialObject> = None;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                element = e.local_name().as_ref().to_vec();
                if element == b"Contents" {
                    current = Some(PartialObject::default());
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    if let Some(obj) = current.take() {
                        let key = obj.key.ok_or_else(|| {
                            StorageError::MalformedResponse("Contents without Key".into())
                        })?;
                        page.objects.push(ObjectRef {
                            key,
                            size: obj.size,
                            last_modified: obj.last_modified,
                        });
                    }
                }
                element.clear();
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| StorageError::MalformedResponse(err.to_string()))?;
                let text = text.trim();
                match (element.as_slice(), current.as_mut()) {
                    (b"Key", Some(obj)) => obj.key = Some(text.to_string()),
                    (b"Size", Some(obj)) => {
                        obj.size = text.parse().map_err(|_| {
                            StorageError::MalformedResponse(format!("bad Size '{text}'"))
                        })?
                    }
                    (b"LastModified", Some(obj)) => obj.last_modified = Some(text.to_string()),
                    (b"IsTruncated", None) => page.truncated = text == "true",
                    (b"NextContinuationToken", None) => page.next_token = Some(text.to_string()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StorageError::MalformedResponse(e.to_string())),
            _ => {}
        }
    }

    Ok(page)
}
