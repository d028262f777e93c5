//! Extraction-job source (Schleswig-Holstein).
//!
//! Tile metadata is discovered by id probing like the other probe-style
//! catalogs, but payloads are cut on demand: a job request returns a ticket
//! whose status is polled until the server hands out a download url.

use std::ops::RangeInclusive;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use harvest_common::{HarvestResult, Tile};
use reqwest::Client;
use tokio::sync::{broadcast, Mutex};

use crate::adapters::probe::{ProbeAdapter, ProbeDialect};
use crate::adapters::{fill, poll_job, SourceAdapter};
use crate::config::DatasetConfig;

pub struct JobQueueAdapter {
    probe: ProbeAdapter,
    request_url: String,
    client: Client,
    // Subscribed at construction time so an interrupt raised at any point
    // of the run cuts the job polling short.
    shutdown: Mutex<broadcast::Receiver<()>>,
}

impl JobQueueAdapter {
    pub fn new(
        region: &str,
        dataset: &DatasetConfig,
        data_type: &str,
        helper_dir: &Path,
        client: Client,
        id_range: RangeInclusive<u32>,
        shutdown: &broadcast::Sender<()>,
    ) -> HarvestResult<Self> {
        Ok(Self {
            probe: ProbeAdapter::new(
                region,
                dataset,
                data_type,
                helper_dir,
                client.clone(),
                ProbeDialect::Title,
                id_range,
            )?,
            request_url: dataset.download_url.clone(),
            client,
            shutdown: Mutex::new(shutdown.subscribe()),
        })
    }
}

/// 10km block id of a compact 1km tile id: `32488_5478` -> `32480_5470`.
fn block_10km(compact: &str) -> String {
    if compact.len() < 5 {
        return compact.to_string();
    }
    let tail_start = compact.len() - 4;
    format!("{}0_{}0", &compact[..4], &compact[tail_start..compact.len() - 1])
}

#[async_trait]
impl SourceAdapter for JobQueueAdapter {
    fn region(&self) -> &str {
        self.probe.region()
    }

    async fn load_metadata(&mut self, tiles: &[Tile]) -> HarvestResult<()> {
        self.probe.load_metadata(tiles).await
    }

    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate> {
        self.probe.resolve_timestamp(tile)
    }

    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
        let compact = tile.id_compact();
        let year = self
            .resolve_timestamp(tile)
            .or(tile.timestamp)
            .map(|d| d.year().to_string())
            .unwrap_or_default();
        let id = self
            .probe
            .probe_id(tile)
            .map(|id| id.to_string())
            .unwrap_or_default();

        let request_url = fill(
            &self.request_url,
            &[
                ("tile", &tile.id),
                ("tile_1km", &compact),
                ("tile_10km", &block_10km(&compact)),
                ("year", &year),
                ("id", &id),
            ],
        );
        let mut shutdown = self.shutdown.lock().await;
        poll_job(&self.client, &request_url, &mut shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::HarvestError;

    #[test]
    fn test_block_10km() {
        assert_eq!(block_10km("32488_5478"), "32480_5470");
        assert_eq!(block_10km("32530_6021"), "32530_6020");
    }

    #[tokio::test]
    async fn test_resolve_download_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetConfig {
            tile_size: 1000.0,
            origin_x: 0.0,
            origin_y: 0.0,
            metadata_url: Some("https://example.test/details?id={id}".to_string()),
            download_url: "https://example.test/dl?tile={tile}&id={id}".to_string(),
            storage_prefix: None,
        };
        let (tx, _rx) = broadcast::channel(1);
        let adapter = JobQueueAdapter::new(
            "sh",
            &dataset,
            "dop",
            dir.path(),
            Client::new(),
            1..=10,
            &tx,
        )
        .unwrap();
        tx.send(()).unwrap();

        let tile = Tile::new("32_488_5478", vec![]);
        let err = adapter.resolve_download(&tile).await.unwrap_err();
        assert!(matches!(err, HarvestError::Interrupted));
    }
}
