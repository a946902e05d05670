// ManimGen YouTube Metadata
// Copyright (c) 2026 ManimGen
//
// YouTube Data API v3 client. Lists every upload of a channel (or every item
// of a playlist) and resolves full snippets in batches of 50.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{watch_url, VideoMeta};

pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
/// 3Blue1Brown.
pub const DEFAULT_CHANNEL_ID: &str = "UCYO_jab_esuFRV4b17AJtAw";
const PAGE_SIZE: &str = "50";

pub struct YouTubeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, API_BASE)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("request to {} failed", endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("YouTube API {} returned {}: {}", endpoint, status, body));
        }
        Ok(resp.json().await?)
    }

    /// All videos uploaded by a channel, newest first.
    pub async fn channel_videos(&self, channel_id: &str) -> Result<Vec<VideoMeta>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", PAGE_SIZE),
                ("order", "date"),
                ("type", "video"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page = self.get("search", &params).await?;
            let found = search_video_ids(&page);
            debug!("[DATASET] search page: {} videos", found.len());
            ids.extend(found);

            page_token = next_page_token(&page);
            if page_token.is_none() {
                break;
            }
        }

        info!("[DATASET] Channel {} has {} videos", channel_id, ids.len());
        self.video_details(&ids).await
    }

    /// All videos in a playlist, in playlist order.
    pub async fn playlist_videos(&self, playlist_id: &str) -> Result<Vec<VideoMeta>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            info!(
                "[DATASET] Fetching playlist items (page token: {})",
                page_token.as_deref().unwrap_or("None")
            );
            let mut params = vec![
                ("part", "contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page = self.get("playlistItems", &params).await?;
            ids.extend(playlist_video_ids(&page));

            page_token = next_page_token(&page);
            if page_token.is_none() {
                break;
            }
        }

        info!("[DATASET] Playlist {} has {} videos", playlist_id, ids.len());
        self.video_details(&ids).await
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoMeta>> {
        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(50) {
            let joined = chunk.join(",");
            let resp = self
                .get("videos", &[("part", "snippet,contentDetails"), ("id", joined.as_str())])
                .await?;
            videos.extend(parse_video_details(&resp));
        }
        Ok(videos)
    }
}

pub fn next_page_token(page: &Value) -> Option<String> {
    page["nextPageToken"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(String::from)
}

pub fn search_video_ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["id"]["videoId"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

pub fn playlist_video_ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["contentDetails"]["videoId"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Turn a `videos.list` response into metadata rows. Items with an
/// unparseable publish date are skipped.
pub fn parse_video_details(resp: &Value) -> Vec<VideoMeta> {
    let Some(items) = resp["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let video_id = item["id"].as_str()?.to_string();
            let snippet = &item["snippet"];
            let published_at = snippet["publishedAt"].as_str()?.to_string();
            let year = match year_from_published(&published_at) {
                Some(y) => y,
                None => {
                    warn!("[DATASET] Skipping {}: bad publishedAt {:?}", video_id, published_at);
                    return None;
                }
            };

            Some(VideoMeta {
                url: watch_url(&video_id),
                title: snippet["title"].as_str().unwrap_or_default().to_string(),
                description: snippet["description"].as_str().unwrap_or_default().to_string(),
                duration: item["contentDetails"]["duration"].as_str().map(String::from),
                published_at,
                year,
                video_id,
                ..Default::default()
            })
        })
        .collect()
}

pub fn year_from_published(published_at: &str) -> Option<i32> {
    DateTime::parse_from_rfc3339(published_at)
        .ok()
        .map(|dt| dt.year())
}
