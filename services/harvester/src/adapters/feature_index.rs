//! Single feature-collection catalog source (Lower Saxony).
//!
//! One JSON document lists every tile with its currency date and direct
//! per-product download links, so metadata and payload resolution both come
//! from the same fetch.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::adapters::{metadata_url, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

/// Catalog property holding the download link for a data type.
fn link_property(data_type: &str) -> HarvestResult<&'static str> {
    match data_type {
        "dop" => Ok("rgbi"),
        "dsm" => Ok("bdom"),
        "dtm" => Ok("dgm1"),
        other => Err(HarvestError::Configuration(format!(
            "no catalog link property for data type '{other}'"
        ))),
    }
}

pub struct FeatureIndexAdapter {
    region: String,
    data_type: String,
    metadata_url: String,
    client: Client,
    timestamps: HashMap<String, NaiveDate>,
    links: HashMap<String, String>,
}

impl FeatureIndexAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        client: Client,
    ) -> HarvestResult<Self> {
        link_property(data_type)?;
        Ok(Self {
            region: region.to_string(),
            data_type: data_type.to_string(),
            metadata_url: metadata_url(dataset, region)?.to_string(),
            client,
            timestamps: HashMap::new(),
            links: HashMap::new(),
        })
    }
}

#[async_trait]
impl SourceAdapter for FeatureIndexAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        let link_prop = link_property(&self.data_type)?;
        let response = self
            .client
            .get(&self.metadata_url)
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("catalog request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HarvestError::Metadata(format!(
                "catalog returned HTTP {}",
                response.status()
            )));
        }
        let document: Value = response
            .json()
            .await
            .map_err(|e| HarvestError::Metadata(format!("invalid catalog document: {e}")))?;

        let mut dates = HashMap::new();
        let mut links = HashMap::new();
        for feature in document["features"].as_array().into_iter().flatten() {
            let properties = &feature["properties"];
            let Some(tile_id) = properties["tile_id"].as_str() else {
                continue;
            };
            if let Some(date) = properties["Aktualitaet"].as_str() {
                dates.insert(tile_id.to_string(), date.to_string());
            }
            if let Some(link) = properties[link_prop].as_str() {
                links.insert(tile_id.to_string(), link.to_string());
            }
        }

        for tile in tiles {
            let key = tile.id.replace('_', "");
            if let Some(date) = dates.get(&key).and_then(|d| parse_upstream_date(d)) {
                self.timestamps.insert(tile.id.clone(), date);
            }
            if let Some(link) = links.get(&key) {
                self.links.insert(tile.id.clone(), link.clone());
            }
        }
        info!(
            region = %self.region,
            matched = self.links.len(),
            "Loaded feature catalog"
        );
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        self.links.get(&tile.id).cloned().ok_or_else(|| {
            HarvestError::Metadata(format!(
                "catalog has no {} link for tile {}",
                self.data_type, tile.id
            ))
        })
    }
}
