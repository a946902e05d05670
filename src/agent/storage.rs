// ManimGen Object Storage
// Copyright (c) 2026 ManimGen
//
// Where finished videos end up. `SpacesStorage` speaks the S3 REST API to a
// DigitalOcean Spaces (or any S3-compatible) bucket using SigV4 signed
// requests. `LocalStorage` leaves files in the media dir, served by the
// HTTP layer under /videos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::SpacesConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const VIDEO_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Object key for a task's rendered video.
pub fn video_key(task_id: &str) -> String {
    format!("videos/{}/animation.mp4", task_id)
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the file and return the public URL.
    async fn upload_video(&self, video_path: &Path, task_id: &str) -> Result<String>;

    async fn video_url(&self, task_id: &str) -> Result<Option<String>>;

    async fn delete_video(&self, task_id: &str) -> Result<bool>;

    /// Local stores serve straight from the media dir, so the render output
    /// must survive the pipeline.
    fn keeps_local_copy(&self) -> bool;
}

// ─── Local ──────────────────────────────────────────────────────────────────

pub struct LocalStorage {
    media_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(media_dir: &Path) -> Self {
        Self {
            media_dir: media_dir.to_path_buf(),
        }
    }

    fn url_for(task_id: &str) -> String {
        format!("/{}", video_key(task_id))
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.media_dir.join(task_id).join("animation.mp4")
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn upload_video(&self, video_path: &Path, task_id: &str) -> Result<String> {
        let target = self.path_for(task_id);
        if video_path != target {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(video_path, &target).await?;
        }
        Ok(Self::url_for(task_id))
    }

    async fn video_url(&self, task_id: &str) -> Result<Option<String>> {
        Ok(tokio::fs::try_exists(self.path_for(task_id))
            .await?
            .then(|| Self::url_for(task_id)))
    }

    async fn delete_video(&self, task_id: &str) -> Result<bool> {
        let dir = self.media_dir.join(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keeps_local_copy(&self) -> bool {
        true
    }
}

// ─── Spaces / S3 ────────────────────────────────────────────────────────────

pub struct SpacesStorage {
    client: reqwest::Client,
    config: SpacesConfig,
}

impl SpacesStorage {
    pub fn new(config: SpacesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Public URL for a key: CDN when configured, bucket subdomain otherwise.
    pub fn public_url(&self, key: &str) -> String {
        match &self.config.cdn_domain {
            Some(cdn) => format!("https://{}/{}", cdn.trim_end_matches('/'), key),
            None => format!(
                "https://{}.{}.digitaloceanspaces.com/{}",
                self.config.bucket, self.config.region, key
            ),
        }
    }

    // Path-style addressing: {endpoint}/{bucket}/{key}.
    fn object_url(&self, key: &str) -> Result<url::Url> {
        let raw = format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            key
        );
        url::Url::parse(&raw).map_err(|e| Error::Config(format!("bad Spaces endpoint: {}", e)))
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        extra_headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let url = self.object_url(key)?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(Error::Config("Spaces endpoint has no host".into())),
        };

        let signer = SigV4 {
            access_key: &self.config.key,
            secret_key: &self.config.secret,
            region: &self.config.region,
            service: "s3",
        };
        let signed = signer.sign(
            method.as_str(),
            &host,
            url.path(),
            extra_headers,
            &body,
            Utc::now(),
        );

        let mut req = self.client.request(method, url);
        for (name, value) in &signed {
            // reqwest sets Host itself.
            if name != "host" {
                req = req.header(name.as_str(), value.as_str());
            }
        }
        Ok(req.body(body).send().await?)
    }
}

#[async_trait]
impl ObjectStore for SpacesStorage {
    async fn upload_video(&self, video_path: &Path, task_id: &str) -> Result<String> {
        let key = video_key(task_id);
        let body = tokio::fs::read(video_path).await?;
        info!(
            "[STORAGE] Uploading {:?} ({:.2} MB) to {}/{}",
            video_path,
            body.len() as f64 / 1_048_576.0,
            self.config.bucket,
            key
        );

        let resp = self
            .send(
                Method::PUT,
                &key,
                &[
                    ("x-amz-acl", "public-read"),
                    ("content-type", VIDEO_CONTENT_TYPE),
                    ("cache-control", VIDEO_CACHE_CONTROL),
                ],
                body,
            )
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("[STORAGE] Upload failed: {} {}", status, text);
            return Err(Error::Storage(format!("upload returned {}: {}", status, text)));
        }

        Ok(self.public_url(&key))
    }

    async fn video_url(&self, task_id: &str) -> Result<Option<String>> {
        let key = video_key(task_id);
        let resp = self.send(Method::HEAD, &key, &[], Vec::new()).await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(self.public_url(&key))),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            s => Err(Error::Storage(format!("head returned {}", s))),
        }
    }

    async fn delete_video(&self, task_id: &str) -> Result<bool> {
        let key = video_key(task_id);
        let resp = self.send(Method::DELETE, &key, &[], Vec::new()).await?;
        if resp.status().is_success() {
            Ok(true)
        } else {
            warn!("[STORAGE] Delete of {} returned {}", key, resp.status());
            Ok(false)
        }
    }

    fn keeps_local_copy(&self) -> bool {
        false
    }
}

// ─── SigV4 ──────────────────────────────────────────────────────────────────

struct SigV4<'a> {
    access_key: &'a str,
    secret_key: &'a str,
    region: &'a str,
    service: &'a str,
}

impl SigV4<'_> {
    /// Returns the full header set (lowercase names) to send, including
    /// `authorization`.
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        extra_headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(body));

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        for (k, v) in extra_headers {
            headers.push((k.to_lowercase(), v.trim().to_string()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method,
            canonical_uri(path),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(self.secret_key, &date, self.region, self.service);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        headers.push((
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                self.access_key, scope, signed_headers, signature
            ),
        ));
        headers
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC takes any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

// Each path segment URI-encoded, slashes kept.
fn canonical_uri(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
