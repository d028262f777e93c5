//! Source adapters: one per upstream catalog protocol.
//!
//! Every region publishes its tiles through one of a handful of protocol
//! families. An adapter answers two questions for the orchestrator: what is
//! the acquisition date of a tile, and where is its payload. Adapters are
//! side-effect free on failure so a tile-scoped error never poisons the rest
//! of the run.

pub mod csv_index;
pub mod feature_index;
pub mod job_queue;
pub mod portal;
pub mod probe;
pub mod wfs;
pub mod xml_meta;
pub mod zipped_csv;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use harvest_common::{parse_flexible_date, HarvestError, HarvestResult, Tile};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::DatasetConfig;

/// A region's metadata and payload source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Region id this adapter serves.
    fn region(&self) -> &str;

    /// One-shot metadata load before the tile loop. Adapters that resolve
    /// metadata per tile do nothing here.
    async fn load_metadata(&mut self, _tiles: &[Tile]) -> HarvestResult<()> {
        Ok(())
    }

    /// Acquisition date of a tile, if the source knows one.
    fn resolve_timestamp(&self, tile: &Tile) -> Option<NaiveDate>;

    /// Resolve the payload URL for a tile. May involve further requests
    /// (job queues, per-tile lookups).
    async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String>;
}

/// Build the adapter for a region, or an error for an unknown region id.
pub fn adapter_for(
    region_id: &str,
    dataset: &DatasetConfig,
    data_type: &str,
    helper_dir: &Path,
    client: Client,
    shutdown: &broadcast::Sender<()>,
) -> HarvestResult<Box<dyn SourceAdapter>> {
    let adapter: Box<dyn SourceAdapter> = match region_id {
        "bb" | "be" => Box::new(csv_index::CsvIndexAdapter::new(
            region_id, dataset, client,
        )?),
        "bw" => Box::new(wfs::WfsAdapter::new(region_id, dataset, data_type, client)?),
        "mv" => Box::new(probe::ProbeAdapter::new(
            region_id,
            dataset,
            data_type,
            helper_dir,
            client,
            probe::ProbeDialect::KachelNr,
            1..=6_616,
        )?),
        "ni" => Box::new(feature_index::FeatureIndexAdapter::new(
            region_id, dataset, data_type, client,
        )?),
        "nw" => Box::new(zipped_csv::ZippedCsvAdapter::new(
            region_id, dataset, data_type, client,
        )?),
        "rp" => Box::new(xml_meta::XmlMetaAdapter::new(
            region_id, dataset, data_type, client,
        )?),
        "sh" => Box::new(job_queue::JobQueueAdapter::new(
            region_id,
            dataset,
            data_type,
            helper_dir,
            client,
            1..=22_000,
            shutdown,
        )?),
        "st" => Box::new(portal::PortalAdapter::new(
            region_id, dataset, data_type, client,
        )?),
        "th" => Box::new(probe::ProbeAdapter::new(
            region_id,
            dataset,
            data_type,
            helper_dir,
            client,
            probe::ProbeDialect::BildNr,
            530_448..=549_479,
        )?),
        other => {
            return Err(HarvestError::Configuration(format!(
                "no source adapter for region '{other}'"
            )))
        }
    };
    Ok(adapter)
}

/// Fill `{key}` placeholders in an endpoint template.
pub(crate) fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Metadata endpoint of an adapter; its absence is a configuration error
/// because the orchestrator only builds adapters for configured datasets.
pub(crate) fn metadata_url<'a>(
    dataset: &'a DatasetConfig,
    region_id: &str,
) -> HarvestResult<&'a str> {
    dataset.metadata_url.as_deref().ok_or_else(|| {
        HarvestError::Configuration(format!("region '{region_id}' requires a metadata_url"))
    })
}

/// Parse upstream date strings: truncate to the date part first, since some
/// catalogs append a time component. Truncation counts characters, so stray
/// multi-byte input fails the parse instead of slicing mid-character.
pub(crate) fn parse_upstream_date(raw: &str) -> Option<NaiveDate> {
    let date_part: String = raw.chars().take(10).collect();
    parse_flexible_date(&date_part).ok()
}

/// Parse a two-column `;`-separated index into a key -> value map.
///
/// `skip_rows` drops preamble lines before the header row.
pub(crate) fn parse_semicolon_csv(
    content: &str,
    key_column: &str,
    value_column: &str,
    skip_rows: usize,
) -> HarvestResult<HashMap<String, String>> {
    let mut lines = content.lines().skip(skip_rows);
    let header = lines
        .next()
        .ok_or_else(|| HarvestError::Metadata("metadata index is empty".to_string()))?;
    let columns: Vec<&str> = header.split(';').map(str::trim).collect();
    let key_idx = columns
        .iter()
        .position(|c| *c == key_column)
        .ok_or_else(|| {
            HarvestError::Metadata(format!("index has no '{key_column}' column"))
        })?;
    let value_idx = columns
        .iter()
        .position(|c| *c == value_column)
        .ok_or_else(|| {
            HarvestError::Metadata(format!("index has no '{value_column}' column"))
        })?;

    let mut map = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if let (Some(key), Some(value)) = (fields.get(key_idx), fields.get(value_idx)) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
struct JobTicket {
    id: serde_json::Value,
    #[serde(rename = "statusUrl")]
    status_url: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
}

/// Submit an extraction job and poll until the source reports it done.
///
/// The job endpoint answers with a ticket (`id`, `statusUrl`); status is
/// polled every 5 seconds with a 300 second deadline. A shutdown signal
/// aborts the wait immediately instead of riding out the deadline.
pub(crate) async fn poll_job(
    client: &Client,
    request_url: &str,
    shutdown: &mut broadcast::Receiver<()>,
) -> HarvestResult<String> {
    if shutdown.try_recv().is_ok() {
        return Err(HarvestError::Interrupted);
    }

    let ticket: JobTicket = client
        .get(request_url)
        .send()
        .await
        .map_err(|e| HarvestError::Metadata(format!("job request failed: {e}")))?
        .json()
        .await
        .map_err(|e| HarvestError::Metadata(format!("invalid job ticket: {e}")))?;

    let job_id = match &ticket.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let status_url = format!("{}?action=status&job={job_id}", ticket.status_url);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    loop {
        let status: JobStatus = client
            .get(&status_url)
            .send()
            .await
            .map_err(|e| HarvestError::Metadata(format!("job status request failed: {e}")))?
            .json()
            .await
            .map_err(|e| HarvestError::Metadata(format!("invalid job status: {e}")))?;

        debug!(job = %job_id, status = ?status.status, "Extraction job status");

        if status.status.as_deref() == Some("done") {
            return status.download_url.ok_or_else(|| {
                HarvestError::Metadata("job finished without a download url".to_string())
            });
        }
        if status.success == Some(false) {
            return Err(HarvestError::Metadata(format!(
                "extraction job {job_id} failed upstream"
            )));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarvestError::Metadata(format!(
                "extraction job {job_id} did not finish within 300s"
            )));
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            received = shutdown.recv() => {
                if received.is_ok() {
                    return Err(HarvestError::Interrupted);
                }
            }
        }
    }
}
