//! Map-portal source (Saxony-Anhalt).
//!
//! The portal embeds its tile index as a JavaScript literal in the download
//! page, together with a prepare endpoint that cuts a zip per tile on
//! request. Aerial imagery currency comes from a separate per-tile metadata
//! service reporting epoch-millisecond flight dates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::{fill, SourceAdapter};
use crate::config::DatasetConfig;

pub struct PortalAdapter {
    region: String,
    data_type: String,
    page_url: String,
    metadata_url: Option<String>,
    client: Client,
    prepare_url: String,
    ids: HashMap<String, String>,
    timestamps: HashMap<String, NaiveDate>,
}

impl PortalAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        client: Client,
    ) -> HarvestResult<Self> {
        Ok(Self {
            region: region.to_string(),
            data_type: data_type.to_string(),
            page_url: dataset.download_url.clone(),
            metadata_url: dataset.metadata_url.clone(),
            client,
            prepare_url: String::new(),
            ids: HashMap::new(),
            timestamps: HashMap::new(),
        })
    }

    async fn fetch_tile_date(&self, url: &str, compact: &str) -> Option<NaiveDate> {
        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let document: Value = response.json().await.ok()?;
        let attributes = &document["features"][0]["attributes"];
        if attributes["NAME"].as_str() != Some(compact) {
            return None;
        }
        let millis = attributes["BFDATUM"].as_i64()?;
        Some(DateTime::from_timestamp_millis(millis)?.date_naive())
    }
}

/// Extract the tile selector JSON literal from the portal page.
fn parse_selector_features(page: &str) -> HarvestResult<Vec<(String, String)>> {
    let marker = "gc.mod.MapDownloadSelector(";
    let start = page
        .find(marker)
        .ok_or_else(|| HarvestError::Metadata("portal page has no tile selector".to_string()))?;
    let after = &page[start + marker.len()..];
    let comma = after
        .find(',')
        .ok_or_else(|| HarvestError::Metadata("malformed tile selector".to_string()))?;
    let rest = &after[comma + 1..];
    let open = rest
        .find('\'')
        .ok_or_else(|| HarvestError::Metadata("malformed tile selector".to_string()))?;
    let literal = &rest[open + 1..];
    let close = literal
        .find('\'')
        .ok_or_else(|| HarvestError::Metadata("malformed tile selector".to_string()))?;

    let document: Value = serde_json::from_str(&literal[..close])
        .map_err(|e| HarvestError::Metadata(format!("invalid selector JSON: {e}")))?;

    let mut pairs = Vec::new();
    for feature in document["features"].as_array().into_iter().flatten() {
        let properties = &feature["properties"];
        let Some(label) = properties["label"].as_str() else {
            continue;
        };
        let id = match &properties["id"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if label.len() > 5 && label.is_char_boundary(2) && label.is_char_boundary(5) {
            pairs.push((format!("{}_{}_{}", &label[..2], &label[2..5], &label[5..]), id));
        }
    }
    Ok(pairs)
}

/// Find the prepare endpoint url embedded in the page.
fn parse_prepare_link(page: &str) -> HarvestResult<String> {
    let hit = page
        .match_indices("http")
        .map(|(idx, _)| {
            let tail = &page[idx..];
            let end = tail
                .find(|c: char| c.is_whitespace() || c == '\'' || c == '"')
                .unwrap_or(tail.len());
            &tail[..end]
        })
        .find(|candidate| candidate.contains("prepare"))
        .ok_or_else(|| {
            HarvestError::Metadata("portal page has no prepare endpoint".to_string())
        })?;
    Ok(hit.to_string())
}

#[async_trait]
impl SourceAdapter for PortalAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        let response = self
            .client
            .get(&self.page_url)
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("portal request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HarvestError::Metadata(format!(
                "portal returned HTTP {}",
                response.status()
            )));
        }
        let page = response
            .text()
            .await
            .map_err(|e| HarvestError::Metadata(format!("error reading portal page: {e}")))?;

        self.prepare_url = parse_prepare_link(&page)?;
        self.ids = parse_selector_features(&page)?.into_iter().collect();
        info!(
            region = %self.region,
            tiles = self.ids.len(),
            "Scraped portal tile index"
        );

        // Elevation tiles have no metadata service; their dates come from
        // the .meta file inside the payload, when present at all.
        let Some(metadata_url) = self.metadata_url.clone() else {
            debug!(region = %self.region, data_type = %self.data_type, "No metadata endpoint configured");
            return Ok(());
        };
        for tile in tiles {
            let compact = tile.id.replace('_', "");
            let url = fill(&metadata_url, &[("tile", &compact)]);
            match self.fetch_tile_date(&url, &compact).await {
                Some(date) => {
                    self.timestamps.insert(tile.id.clone(), date);
                }
                None => warn!(tile = %tile.id, "No flight date for tile"),
            }
        }
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        let id = self.ids.get(&tile.id).ok_or_else(|| {
            HarvestError::Metadata(format!("portal index has no entry for tile {}", tile.id))
        })?;
        let prepare = format!("{}items={id}&format=zip", self.prepare_url);

        let response = self
            .client
            .get(&prepare)
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("prepare request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HarvestError::Metadata(format!(
                "prepare returned HTTP {}",
                response.status()
            )));
        }
        let url = response
            .text()
            .await
            .map_err(|e| HarvestError::Metadata(format!("error reading prepare reply: {e}")))?;
        Ok(url.trim().to_string())
    }
}
