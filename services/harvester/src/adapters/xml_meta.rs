//! Per-tile XML metadata source (Rhineland-Palatinate).
//!
//! Each tile has its own metadata document; the acquisition date sits in a
//! `gco:DateTime` element for elevation tiles and a plain `Date` element for
//! imagery. Payload urls are plain templates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{HarvestError, HarvestResult, Tile};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use tracing::{info, warn};

use crate::adapters::{fill, metadata_url, parse_upstream_date, SourceAdapter};
use crate::config::DatasetConfig;

pub struct XmlMetaAdapter {
    region: String,
    data_type: String,
    metadata_url: String,
    download_url: String,
    client: Client,
    timestamps: HashMap<String, NaiveDate>,
}

impl XmlMetaAdapter {
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

    fn date_element(&self) -> &'static str {
        if self.data_type == "dtm" {
            "gco:DateTime"
        } else {
            "Date"
        }
    }

    /// Metadata key for a tile: elevation keeps the km separator, imagery
    /// concatenates the km indices.
    fn metadata_key(&self, tile: &Tile) -> String {
        let mut parts = tile.id.splitn(2, '_');
        let _zone = parts.next();
        let rest = parts.next().unwrap_or("");
        if self.data_type == "dtm" {
            rest.to_string()
        } else {
            rest.replace('_', "")
        }
    }
}

/// Pull the text content of the first `element` out of an XML document.
fn extract_element_text(xml: &str, element: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) if start.name().as_ref() == element.as_bytes() => {
                inside = true;
            }
            Ok(Event::Text(text)) if inside => {
                return text.unescape().ok().map(|t| t.into_owned());
            }
            Ok(Event::End(_)) if inside => return None,
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

#[async_trait]
impl SourceAdapter for XmlMetaAdapter {
    fn region(&self) -> &str {
        &self.region
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        let element = self.date_element();
        for tile in tiles {
            let url = fill(&self.metadata_url, &[("tile", &self.metadata_key(tile))]);
            let response = match self.client.get(&url).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    warn!(tile = %tile.id, status = %r.status(), "Metadata document unavailable");
                    continue;
                }
                Err(e) => {
                    warn!(tile = %tile.id, error = %e, "Metadata request failed");
                    continue;
                }
            };
            let Ok(xml) = response.text().await else {
                continue;
            };
            match extract_element_text(&xml, element).as_deref().and_then(parse_upstream_date) {
                Some(date) => {
                    self.timestamps.insert(tile.id.clone(), date);
                }
                None => warn!(tile = %tile.id, "Date element not found in metadata document"),
            }
        }
        info!(
            region = %self.region,
            matched = self.timestamps.len(),
            "Loaded per-tile metadata documents"
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

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(data_type: &str) -> XmlMetaAdapter {
        XmlMetaAdapter {
            region: "rp".to_string(),
            data_type: data_type.to_string(),
            metadata_url: "https://example.test/meta/{tile}.xml".to_string(),
            download_url: "https://example.test/dl/{tile}.zip".to_string(),
            client: Client::new(),
            timestamps: HashMap::new(),
        }
    }

    #[test]
    fn test_metadata_key_per_data_type() {
        let tile = Tile::new("32_488_5478", vec![]);
        assert_eq!(adapter("dtm").metadata_key(&tile), "488_5478");
        assert_eq!(adapter("dop").metadata_key(&tile), "4885478");
    }

    #[test]
    fn test_extract_date_element() {
        let xml = r#"<metadata><info><Date>2022-04-11</Date></info></metadata>"#;
        assert_eq!(
            extract_element_text(xml, "Date").as_deref(),
            Some("2022-04-11")
        );

        let xml = r#"<md><gco:DateTime>2021-09-30T00:00:00</gco:DateTime></md>"#;
        let raw = extract_element_text(xml, "gco:DateTime").unwrap();
        assert_eq!(
            parse_upstream_date(&raw),
            NaiveDate::from_ymd_opt(2021, 9, 30)
        );
    }

    #[test]
    fn test_extract_missing_element() {
        assert_eq!(extract_element_text("<a><b>x</b></a>", "Date"), None);
    }
}
