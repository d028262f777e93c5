//! Incremental-id probing sources (Mecklenburg-Vorpommern, Thuringia).
//!
//! These catalogs expose per-tile metadata records under opaque numeric ids
//! with no listing endpoint. The full id range is probed once and the
//! discovered tile-to-id mapping is cached as a CSV beside the registry, so
//! later runs only fetch the records they need.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::{fill, metadata_url, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

/// Field naming of the probed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDialect {
    /// `kachel_nr` carries the full tile id, date in `aktualitaet`.
    KachelNr,
    /// `bildnr` carries the compact id, date in `datum`.
    BildNr,
    /// `title` carries the fully compacted id, date in `e_datum`.
    Title,
}

impl ProbeDialect {
    fn tile_field(&self) -> &'static str {
        match self {
            Self::KachelNr => "kachel_nr",
            Self::BildNr => "bildnr",
            Self::Title => "title",
        }
    }

    fn date_field(&self) -> &'static str {
        match self {
            Self::KachelNr => "aktualitaet",
            Self::BildNr => "datum",
            Self::Title => "e_datum",
        }
    }

    /// Normalise the record's tile reference back to the canonical id.
    /// References that are not plain ASCII digit runs pass through untouched.
    fn canonical_id(&self, raw: &str) -> String {
        let splittable =
            |at: usize| raw.len() > at && raw.is_char_boundary(2) && raw.is_char_boundary(at);
        match self {
            Self::KachelNr => raw.to_string(),
            Self::BildNr if splittable(2) => format!("{}_{}", &raw[..2], &raw[2..]),
            Self::Title if splittable(5) => {
                format!("{}_{}_{}", &raw[..2], &raw[2..5], &raw[5..])
            }
            _ => raw.to_string(),
        }
    }
}

pub struct ProbeAdapter {
    region: String,
    metadata_url: String,
    download_url: String,
    cache_path: PathBuf,
    client: Client,
    dialect: ProbeDialect,
    id_range: RangeInclusive<u32>,
    ids: HashMap<String, u32>,
    timestamps: HashMap<String, NaiveDate>,
}

impl ProbeAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        helper_dir: &Path,
        client: Client,
        dialect: ProbeDialect,
        id_range: RangeInclusive<u32>,
    ) -> HarvestResult<Self> {
        Ok(Self {
            region: region.to_string(),
            metadata_url: metadata_url(dataset, region)?.to_string(),
            download_url: dataset.download_url.clone(),
            cache_path: helper_dir.join(format!("{region}_{data_type}_ids.csv")),
            client,
            dialect,
            id_range,
            ids: HashMap::new(),
            timestamps: HashMap::new(),
        })
    }

    /// Fetch one probe record; `None` for missing ids or malformed records.
    async fn probe(&self, id: u32) -> Option<(String, Option<NaiveDate>)> {
        let url = fill(&self.metadata_url, &[("id", &id.to_string())]);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(_) => return None,
            Err(e) => {
                warn!(id, error = %e, "Probe request failed");
                return None;
            }
        };
        let document: Value = response.json().await.ok()?;
        if document["success"].as_str() != Some("true") {
            return None;
        }
        let object = &document["object"];
        let raw_id = object[self.dialect.tile_field()].as_str()?;
        let date = object[self.dialect.date_field()]
            .as_str()
            .and_then(parse_upstream_date);
        Some((self.dialect.canonical_id(raw_id), date))
    }

    fn read_cache(&self) -> HarvestResult<HashMap<String, u32>> {
        let content = std::fs::read_to_string(&self.cache_path)?;
        let mut ids = HashMap::new();
        for line in content.lines().skip(1) {
            let mut fields = line.split(';');
            if let (Some(tile_nr), Some(id)) = (fields.next(), fields.next()) {
                if let Ok(id) = id.trim().parse() {
                    ids.insert(tile_nr.trim().to_string(), id);
                }
            }
        }
        Ok(ids)
    }

    /// Probe id of a tile, once discovered or cached.
    pub(crate) fn probe_id(&self, tile: &Tile) -> Option<u32> {
        self.ids.get(&tile.id).copied()
    }

    fn write_cache(&self) -> HarvestResult<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut rows: Vec<_> = self.ids.iter().collect();
        rows.sort();
        let mut content = String::from("tile_nr;id\n");
        for (tile_nr, id) in rows {
            content.push_str(&format!("{tile_nr};{id}\n"));
        }
        std::fs::write(&self.cache_path, content)?;
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for ProbeAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        if self.cache_path.exists() {
            self.ids = self.read_cache()?;
            info!(
                region = %self.region,
                cached = self.ids.len(),
                "Loaded probe id cache"
            );
            for tile in tiles {
                let Some(&id) = self.ids.get(&tile.id) else {
                    debug!(tile = %tile.id, "Tile not present in probe id cache");
                    continue;
                };
                if let Some((tile_id, Some(date))) = self.probe(id).await {
                    if tile_id == tile.id {
                        self.timestamps.insert(tile.id.clone(), date);
                    }
                }
            }
        } else {
            info!(
                region = %self.region,
                from = *self.id_range.start(),
                to = *self.id_range.end(),
                "No probe id cache, scanning the full id range"
            );
            for id in self.id_range.clone() {
                if let Some((tile_id, date)) = self.probe(id).await {
                    self.ids.insert(tile_id.clone(), id);
                    if let Some(date) = date {
                        if tiles.iter().any(|t| t.id == tile_id) {
                            self.timestamps.insert(tile_id, date);
                        }
                    }
                }
            }
            self.write_cache()?;
            info!(
                region = %self.region,
                discovered = self.ids.len(),
                cache = %self.cache_path.display(),
                "Probe scan complete"
            );
        }
        Ok(())
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.timestamps.get(&tile.id).copied()
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        let id = self
            .ids
            .get(&tile.id)
            .map(|id| id.to_string())
            .unwrap_or_default();
        Ok(fill(
            &self.download_url,
            &[("tile", &tile.id), ("id", &id)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_canonical_ids() {
        assert_eq!(
            ProbeDialect::KachelNr.canonical_id("33_401_5802"),
            "33_401_5802"
        );
        assert_eq!(ProbeDialect::BildNr.canonical_id("32488_5478"), "32_488_5478");
        assert_eq!(ProbeDialect::Title.canonical_id("324885478"), "32_488_5478");
    }

    #[test]
    fn test_dialect_passes_through_non_ascii_references() {
        assert_eq!(ProbeDialect::BildNr.canonical_id("3ä25478"), "3ä25478");
        assert_eq!(ProbeDialect::Title.canonical_id("3248ä5478"), "3248ä5478");
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = ProbeAdapter {
            region: "mv".to_string(),
            metadata_url: "https://example.test/record?id={id}".to_string(),
            download_url: "https://example.test/tile?kachel={tile}".to_string(),
            cache_path: dir.path().join("mv_dop_ids.csv"),
            client: Client::new(),
            dialect: ProbeDialect::KachelNr,
            id_range: 1..=10,
            ids: HashMap::new(),
            timestamps: HashMap::new(),
        };
        adapter.ids.insert("33_401_5802".to_string(), 42);
        adapter.ids.insert("33_402_5802".to_string(), 43);
        adapter.write_cache().unwrap();

        let loaded = adapter.read_cache().unwrap();
        assert_eq!(loaded.get("33_401_5802"), Some(&42));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_download_url_fills_tile_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = ProbeAdapter {
            region: "th".to_string(),
            metadata_url: "https://example.test/record?id={id}".to_string(),
            download_url: "https://example.test/dl?tile={tile}&id={id}".to_string(),
            cache_path: dir.path().join("th_dop_ids.csv"),
            client: Client::new(),
            dialect: ProbeDialect::BildNr,
            id_range: 1..=10,
            ids: HashMap::new(),
            timestamps: HashMap::new(),
        };
        adapter.ids.insert("32_488_5478".to_string(), 530_500);
        let tile = Tile::new("32_488_5478", vec![]);
        let url = tokio_test::block_on(adapter.resolve_download(&tile)).unwrap();
        assert_eq!(url, "https://example.test/dl?tile=32_488_5478&id=530500");
    }
}
