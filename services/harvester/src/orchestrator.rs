//! The acquisition loop: walk the registry tile by tile, resolve metadata,
//! fetch payloads and persist progress after every tile.

use std::path::PathBuf;

use harvest_common::{DateWindow, HarvestError, HarvestResult, TileStatus};
use registry::TileRegistry;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapters::SourceAdapter;
use crate::download::DownloadEngine;
use crate::upload::UploadSink;

/// Per-run behaviour switches.
pub struct RunOptions {
    /// `false` runs metadata resolution only and leaves every payload alone.
    pub download: bool,
    /// Remove the local tile directory after a successful upload.
    pub delete_local: bool,
    pub landing_dir: PathBuf,
    pub window: DateWindow,
    pub registry_path: PathBuf,
}

/// One region's worth of work, assembled by the caller.
pub struct RegionJob {
    /// Boundary-catalog name, also the registry key.
    pub region_name: String,
    pub region_id: String,
    pub data_type: String,
    pub storage_prefix: Option<String>,
    pub adapter: Box<dyn SourceAdapter>,
}

/// Run every region job sequentially. A region whose metadata source is down
/// is logged and skipped; an interrupt stops the whole run after the current
/// tile has been persisted.
pub async fn run(
    registry: &mut TileRegistry,
    jobs: Vec<RegionJob>,
    engine: &DownloadEngine,
    sink: Option<&UploadSink>,
    options: &RunOptions,
    shutdown: &mut broadcast::Receiver<()>,
) -> HarvestResult<()> {
    for mut job in jobs {
        match run_region(registry, &mut job, engine, sink, options, shutdown).await {
            Ok(()) => {}
            Err(HarvestError::Interrupted) => return Err(HarvestError::Interrupted),
            Err(e) => {
                warn!(region = %job.region_name, error = %e, "Region failed, moving on");
            }
        }
    }

    for (region, retrieved, total) in registry.counts() {
        info!(region = %region, retrieved, total, "Region summary");
    }
    info!(tiles = registry.total(), "Acquisition run complete");
    Ok(())
}

/// Process one region's tiles.
pub async fn run_region(
    registry: &mut TileRegistry,
    job: &mut RegionJob,
    engine: &DownloadEngine,
    sink: Option<&UploadSink>,
    options: &RunOptions,
    shutdown: &mut broadcast::Receiver<()>,
) -> HarvestResult<()> {
    let Some(region_tiles) = registry.regions.get(&job.region_name) else {
        return Ok(());
    };
    let snapshot = region_tiles.tile_list.clone();
    let total = snapshot.len();
    if total == 0 {
        return Ok(());
    }

    info!(region = %job.region_name, tiles = total, "Starting region");
    job.adapter.load_metadata(&snapshot).await?;

    for index in 0..total {
        if shutdown.try_recv().is_ok() {
            registry.save(&options.registry_path)?;
            return Err(HarvestError::Interrupted);
        }

        let mut tile = match registry.regions.get(&job.region_name) {
            Some(region) => region.tile_list[index].clone(),
            None => break,
        };
        let label = format!("[{} of {}]", index + 1, total);

        if tile.is_retrieved() {
            info!(tile = %tile.id, "Tile already retrieved {label}");
            continue;
        }

        if tile.timestamp.is_none() {
            tile.timestamp = job.adapter.resolve_timestamp(&tile);
        }

        if !options.window.admits(tile.timestamp) {
            info!(tile = %tile.id, timestamp = ?tile.timestamp, "Tile outside date window");
            tile.status = TileStatus::Skipped;
            write_back(registry, job, index, tile, options)?;
            continue;
        }

        if !options.download {
            write_back(registry, job, index, tile, options)?;
            continue;
        }

        match acquire(&tile, job, engine, sink, options).await {
            Ok((location, format, status)) => {
                tile.location = Some(location);
                tile.format = format;
                tile.status = status;
                info!(tile = %tile.id, "Tile retrieved {label}");
            }
            Err(e) => {
                warn!(tile = %tile.id, error = %e, "Tile failed {label}");
                tile.status = TileStatus::Failed;
                // location stays empty so the next run retries the tile
            }
        }
        write_back(registry, job, index, tile, options)?;
    }
    Ok(())
}

/// Fetch, unpack and optionally upload one tile. Returns the recorded
/// location, payload format and resulting status.
async fn acquire(
    tile: &harvest_common::Tile,
    job: &RegionJob,
    engine: &DownloadEngine,
    sink: Option<&UploadSink>,
    options: &RunOptions,
) -> HarvestResult<(String, Option<String>, TileStatus)> {
    let url = job.adapter.resolve_download(tile).await?;
    let tile_dir = options
        .landing_dir
        .join(&job.region_id)
        .join(format!("{}_{}", job.data_type, tile.id));

    let artifact = match engine.fetch(&url, &tile_dir).await {
        Ok(artifact) => artifact,
        Err(e) => {
            // Drop the partial directory so a retry starts clean.
            let _ = tokio::fs::remove_dir_all(&tile_dir).await;
            return Err(e);
        }
    };
    let format = artifact.format();

    if let Some(sink) = sink {
        let prefix = match &job.storage_prefix {
            Some(prefix) => format!("{prefix}/{}_{}", job.data_type, tile.id),
            None => format!(
                "{}/{}/{}_{}",
                job.region_id, job.data_type, job.data_type, tile.id
            ),
        };
        let uri = sink.upload_dir(&artifact.dir, &prefix).await?;
        if options.delete_local {
            tokio::fs::remove_dir_all(&artifact.dir).await?;
        }
        Ok((uri, format, TileStatus::Uploaded))
    } else {
        Ok((
            artifact.dir.to_string_lossy().into_owned(),
            format,
            TileStatus::Fetched,
        ))
    }
}

fn write_back(
    registry: &mut TileRegistry,
    job: &RegionJob,
    index: usize,
    tile: harvest_common::Tile,
    options: &RunOptions,
) -> HarvestResult<()> {
    if let Some(region) = registry.regions.get_mut(&job.region_name) {
        region.tile_list[index] = tile;
    }
    registry.save(&options.registry_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use harvest_common::Tile;
    use registry::RegionTiles;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ScriptedAdapter {
        timestamp: Option<NaiveDate>,
        resolve_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn region(&self) -> &str {
            "zz"
        }

        fn resolve_timestamp(&self, _tile: &Tile) -> Option<NaiveDate> {
            self.timestamp
        }

        async fn resolve_download(&self, tile: &Tile) -> HarvestResult<String> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(HarvestError::Metadata(format!("no record for {}", tile.id)))
            } else {
                Ok(format!("https://example.test/{}.zip", tile.id))
            }
        }
    }

    fn test_registry(dir: &std::path::Path) -> (TileRegistry, PathBuf) {
        let mut regions = BTreeMap::new();
        regions.insert(
            "Teststaat".to_string(),
            RegionTiles {
                data_type: "dop".to_string(),
                tile_list: vec![
                    Tile::new("32_488_5478", vec![]),
                    Tile::new("32_489_5478", vec![]),
                ],
            },
        );
        let registry = TileRegistry {
            aoi_name: "survey".to_string(),
            data_type: "dop".to_string(),
            regions,
        };
        (registry, dir.join("registry.json"))
    }

    fn options(dir: &std::path::Path, registry_path: PathBuf, download: bool) -> RunOptions {
        RunOptions {
            download,
            delete_local: false,
            landing_dir: dir.join("landing"),
            window: DateWindow::open(),
            registry_path,
        }
    }

    fn job(adapter: ScriptedAdapter) -> RegionJob {
        RegionJob {
            region_name: "Teststaat".to_string(),
            region_id: "zz".to_string(),
            data_type: "dop".to_string(),
            storage_prefix: None,
            adapter: Box::new(adapter),
        }
    }

    #[tokio::test]
    async fn test_retrieved_tiles_are_never_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());
        registry.regions.get_mut("Teststaat").unwrap().tile_list[0].location =
            Some("s3://bucket/dop_32_488_5478".to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut job = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2022, 5, 1),
            resolve_calls: calls.clone(),
            fail: true,
        });
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();
        let opts = options(dir.path(), path, true);
        let (_tx, mut rx) = broadcast::channel(1);

        run_region(&mut registry, &mut job, &engine, None, &opts, &mut rx)
            .await
            .unwrap();

        // Only the unretrieved tile reached download resolution.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let tiles = &registry.regions["Teststaat"].tile_list;
        assert!(tiles[0].is_retrieved());
        assert_eq!(tiles[1].status, TileStatus::Failed);
        assert!(tiles[1].location.is_none());
    }

    #[tokio::test]
    async fn test_failed_tile_does_not_stop_the_region() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut job = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2022, 5, 1),
            resolve_calls: calls.clone(),
            fail: true,
        });
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();
        let opts = options(dir.path(), path.clone(), true);
        let (_tx, mut rx) = broadcast::channel(1);

        run_region(&mut registry, &mut job, &engine, None, &opts, &mut rx)
            .await
            .unwrap();

        // Both tiles were attempted and persisted as failed but retryable.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let reloaded = TileRegistry::load(&path).unwrap().unwrap();
        for tile in &reloaded.regions["Teststaat"].tile_list {
            assert_eq!(tile.status, TileStatus::Failed);
            assert!(tile.location.is_none());
        }
    }

    #[tokio::test]
    async fn test_date_window_skips_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut job = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2010, 1, 1),
            resolve_calls: calls.clone(),
            fail: false,
        });
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();
        let mut opts = options(dir.path(), path, true);
        opts.window = DateWindow {
            begin: NaiveDate::from_ymd_opt(2020, 1, 1),
            end: None,
            yearly_end: None,
        };
        let (_tx, mut rx) = broadcast::channel(1);

        run_region(&mut registry, &mut job, &engine, None, &opts, &mut rx)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        for tile in &registry.regions["Teststaat"].tile_list {
            assert_eq!(tile.status, TileStatus::Skipped);
            assert!(tile.location.is_none());
            assert!(tile.timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn test_skipped_tiles_are_reconsidered_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();

        // First run with a window that rejects every tile.
        let calls = Arc::new(AtomicUsize::new(0));
        let mut job1 = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2010, 1, 1),
            resolve_calls: calls.clone(),
            fail: true,
        });
        let mut opts = options(dir.path(), path.clone(), true);
        opts.window = DateWindow {
            begin: NaiveDate::from_ymd_opt(2020, 1, 1),
            end: None,
            yearly_end: None,
        };
        let (_tx, mut rx) = broadcast::channel(1);
        run_region(&mut registry, &mut job1, &engine, None, &opts, &mut rx)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Rerun with an open window: the skipped tiles are attempted again.
        let mut job2 = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2010, 1, 1),
            resolve_calls: calls.clone(),
            fail: true,
        });
        opts.window = DateWindow::open();
        run_region(&mut registry, &mut job2, &engine, None, &opts, &mut rx)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metadata_only_mode_records_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut job = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2022, 5, 1),
            resolve_calls: calls.clone(),
            fail: false,
        });
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();
        let opts = options(dir.path(), path.clone(), false);
        let (_tx, mut rx) = broadcast::channel(1);

        run_region(&mut registry, &mut job, &engine, None, &opts, &mut rx)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let reloaded = TileRegistry::load(&path).unwrap().unwrap();
        for tile in &reloaded.regions["Teststaat"].tile_list {
            assert_eq!(tile.status, TileStatus::Pending);
            assert_eq!(tile.timestamp, NaiveDate::from_ymd_opt(2022, 5, 1));
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, path) = test_registry(dir.path());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut job = job(ScriptedAdapter {
            timestamp: NaiveDate::from_ymd_opt(2022, 5, 1),
            resolve_calls: calls.clone(),
            fail: false,
        });
        let engine = DownloadEngine::new(Duration::from_secs(5)).unwrap();
        let opts = options(dir.path(), path.clone(), true);
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let err = run_region(&mut registry, &mut job, &engine, None, &opts, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Interrupted));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(TileRegistry::load(&path).unwrap().is_some());
    }
}
