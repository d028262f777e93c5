//! WFS GetFeature catalog source (Baden-Wuerttemberg).
//!
//! Tile currency comes from a WFS layer queried as JSON; the layer and
//! attribute names differ per data type.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::adapters::{fill, metadata_url, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

struct WfsLayer {
    type_name: &'static str,
    tile_attribute: &'static str,
    date_attribute: &'static str,
    version: &'static str,
}

fn layer_for(data_type: &str) -> HarvestResult<WfsLayer> {
    match data_type {
        "dtm" => Ok(WfsLayer {
            type_name: "verm:v_dgm_kacheln_als_2_2016_2021",
            tile_attribute: "dgm_kachel",
            date_attribute: "fortfuehrungsdatum",
            version: "2.0.0",
        }),
        "dop" | "dsm" => Ok(WfsLayer {
            type_name: "verm:v_dop_20_bildflugkacheln",
            tile_attribute: "dop_kachel",
            date_attribute: "befliegungsdatum",
            version: "1.1.0",
        }),
        other => Err(HarvestError::Configuration(format!(
            "no WFS layer mapping for data type '{other}'"
        ))),
    }
}

pub struct WfsAdapter {
    region: String,
    data_type: String,
    metadata_url: String,
    download_url: String,
    client: Client,
    timestamps: HashMap<String, NaiveDate>,
}

impl WfsAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        client: Client,
    ) -> HarvestResult<Self> {
        // Fail on an unmapped data type before any tile work starts.
        layer_for(data_type)?;
        Ok(Self {
            region: region.to_string(),
            data_type: data_type.to_string(),
            metadata_url: metadata_url(dataset, region)?.to_string(),
            download_url: dataset.download_url.clone(),
            client,
            timestamps: HashMap::new(),
        })
    }
}

#[async_trait]
impl SourceAdapter for WfsAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        let layer = layer_for(&self.data_type)?;
        let response = self
            .client
            .get(&self.metadata_url)
            .query(&[
                ("service", "WFS"),
                ("version", layer.version),
                ("request", "GetFeature"),
                ("typeName", layer.type_name),
                ("outputFormat", "json"),
            ])
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("WFS request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HarvestError::Metadata(format!(
                "WFS returned HTTP {}",
                response.status()
            )));
        }
        let document: Value = response
            .json()
            .await
            .map_err(|e| HarvestError::Metadata(format!("invalid WFS response: {e}")))?;

        // WFS keys tiles by the fully compacted id (all separators removed).
        let mut index = HashMap::new();
        for feature in document["features"].as_array().into_iter().flatten() {
            let properties = &feature["properties"];
            if let (Some(kachel), Some(date)) = (
                properties[layer.tile_attribute].as_str(),
                properties[layer.date_attribute].as_str(),
            ) {
                index.insert(kachel.to_string(), date.to_string());
            }
        }

        for tile in tiles {
            let key = tile.id.replace('_', "");
            if let Some(date) = index.get(&key).and_then(|d| parse_upstream_date(d)) {
                self.timestamps.insert(tile.id.clone(), date);
            }
        }
        info!(
            region = %self.region,
            layer = layer.type_name,
            matched = self.timestamps.len(),
            "Loaded WFS catalog"
        );
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        Ok(fill(&self.download_url, &[("tile", &tile.id)]))
    }
}
