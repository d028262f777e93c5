//! Zipped CSV catalog source (North Rhine-Westphalia).
//!
//! The index arrives as a zip holding one CSV with a five line preamble. Tile
//! rows are matched by substring since the catalog prefixes ids with the
//! product name. Elevation tiles only carry a year-month, pinned to the 15th.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use tracing::info;

use crate::adapters::{fill, metadata_url, parse_semicolon_csv, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

pub struct ZippedCsvAdapter {
    region: String,
    data_type: String,
    metadata_url: String,
    download_url: String,
    client: Client,
    timestamps: HashMap<String, NaiveDate>,
}

impl ZippedCsvAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        client: Client,
    ) -> HarvestResult<Self> {
        Ok(Self {
            region: region.to_string(),
            data_type: data_type.to_string(),
            metadata_url: metadata_url(dataset, region)?.to_string(),
            download_url: dataset.download_url.clone(),
            client,
            timestamps: HashMap::new(),
        })
    }

    /// Catalog key for a tile: surface tiles are keyed by the compact id.
    fn catalog_key(&self, tile: &Tile) -> String {
        if self.data_type == "dsm" {
            tile.id_compact()
        } else {
            tile.id.clone()
        }
    }
}

#[async_trait]
impl SourceAdapter for ZippedCsvAdapter {
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
        let body = response
            .bytes()
            .await
            .map_err(|e| HarvestError::Metadata(format!("error reading index: {e}")))?;

        let mut archive = zip::ZipArchive::new(Cursor::new(body.as_ref()))
            .map_err(|e| HarvestError::Metadata(format!("index is not a zip archive: {e}")))?;
        let mut entry = archive
            .by_index(0)
            .map_err(|e| HarvestError::Metadata(format!("empty index archive: {e}")))?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| HarvestError::Metadata(format!("index CSV is not UTF-8: {e}")))?;

        let index = parse_semicolon_csv(&content, "Kachelname", "Aktualitaet", 5)?;
        for tile in tiles {
            let key = self.catalog_key(tile);
            let raw = index
                .iter()
                .find(|(name, _)| name.contains(&key))
                .map(|(_, date)| date.clone());
            if let Some(mut raw) = raw {
                // Elevation index only records YYYY-MM
                if self.data_type == "dtm" && raw.len() == 7 {
                    raw.push_str("-15");
                }
                if let Some(date) = parse_upstream_date(&raw) {
                    self.timestamps.insert(tile.id.clone(), date);
                }
            }
        }
        info!(
            region = %self.region,
            matched = self.timestamps.len(),
            "Loaded zipped catalog index"
        );
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        let year = self
            .resolve_timestamp(tile)
            .or(tile.timestamp)
            .map(|d| d.format("%Y").to_string())
            .ok_or_else(|| {
                HarvestError::Metadata(format!(
                    "tile {} has no timestamp to derive the vintage year from",
                    tile.id
                ))
            })?;
        Ok(fill(
            &self.download_url,
            &[("tile", &self.catalog_key(tile)), ("year", &year)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(data_type: &str) -> ZippedCsvAdapter {
        ZippedCsvAdapter {
            region: "nw".to_string(),
            data_type: data_type.to_string(),
            metadata_url: "https://example.test/index.zip".to_string(),
            download_url: "https://example.test/{tile}_{year}.zip".to_string(),
            client: Client::new(),
            timestamps: HashMap::new(),
        }
    }

    #[test]
    fn test_surface_tiles_use_compact_key() {
        let tile = Tile::new("32_488_5478", vec![]);
        assert_eq!(adapter("dsm").catalog_key(&tile), "32488_5478");
        assert_eq!(adapter("dop").catalog_key(&tile), "32_488_5478");
    }

    #[test]
    fn test_download_url_carries_vintage_year() {
        let mut tile = Tile::new("32_488_5478", vec![]);
        tile.timestamp = NaiveDate::from_ymd_opt(2021, 6, 15);
        let url = tokio_test::block_on(adapter("dop").resolve_download(&tile)).unwrap();
        assert_eq!(url, "https://example.test/32_488_5478_2021.zip");
    }

    #[test]
    fn test_download_without_timestamp_is_metadata_error() {
        let tile = Tile::new("32_488_5478", vec![]);
        let err = tokio_test::block_on(adapter("dop").resolve_download(&tile)).unwrap_err();
        assert!(matches!(err, HarvestError::Metadata(_)));
    }
}
