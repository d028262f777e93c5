//! CSV sheet-index sources (Brandenburg, Berlin).
//!
//! The catalog is one flat `;`-separated CSV mapping dashed sheet numbers to
//! creation dates; payloads are addressed by the dashed sheet number.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use tracing::info;

use crate::adapters::{fill, metadata_url, parse_semicolon_csv, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

pub struct CsvIndexAdapter {
    region: String,
    metadata_url: String,
    download_url: String,
    client: Client,
    timestamps: HashMap<String, NaiveDate>,
}

impl CsvIndexAdapter {
    pub fn new(region: &str, dataset: &DatasetConfig, client: Client) -> HarvestResult<Self> {
        Ok(Self {
            region: region.to_string(),
            metadata_url: metadata_url(dataset, region)?.to_string(),
            download_url: dataset.download_url.clone(),
            client,
            timestamps: HashMap::new(),
        })
    }
}

#[async_trait]
impl SourceAdapter for CsvIndexAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        let response = self
            .client
            .get(&self.metadata_url)
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("index request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HarvestError::Metadata(format!(
                "index returned HTTP {}",
                response.status()
            )));
        }
        let content = response
            .text()
            .await
            .map_err(|e| HarvestError::Metadata(format!("error reading index: {e}")))?;

        let index = parse_semicolon_csv(&content, "sheetnr", "creationdate", 0)?;
        for tile in tiles {
            if let Some(date) = index.get(&tile.id_dashed()).and_then(|d| parse_upstream_date(d))
            {
                self.timestamps.insert(tile.id.clone(), date);
            }
        }
        info!(
            region = %self.region,
            matched = self.timestamps.len(),
            "Loaded sheet index"
        );
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        Ok(fill(&self.download_url, &[("tile", &tile.id_dashed())]))
    }
}
