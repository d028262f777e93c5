//! Geodata tile harvester.
//!
//! Generates a canonical tile grid for an area of interest, then walks the
//! grid region by region: resolve tile metadata, fetch payloads, optionally
//! upload them to object storage. Progress lives in a JSON registry that is
//! rewritten after every tile, so an interrupted run resumes where it
//! stopped.

mod adapters;
mod config;
mod download;
mod orchestrator;
mod seeding;
mod upload;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use harvest_common::{parse_flexible_date, DateWindow, HarvestError};
use registry::TileRegistry;
use tile_grid::{load_tile_list, Aoi, RegionCatalog};
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{load_region_configs, RegionConfig};
use download::DownloadEngine;
use orchestrator::{RegionJob, RunOptions};
use upload::{ObjectStorageConfig, UploadSink};

#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(about = "Tile grid generation and resumable geodata acquisition")]
struct Args {
    /// Area of interest as a GeoJSON polygon file
    #[arg(long, conflicts_with = "tile_list", required_unless_present = "tile_list")]
    aoi: Option<PathBuf>,

    /// Explicit tile id list (one id per line) instead of an AOI polygon
    #[arg(long, requires = "region")]
    tile_list: Option<PathBuf>,

    /// Region id the tile list belongs to
    #[arg(long)]
    region: Option<String>,

    /// Data type to acquire (dop, dtm, dsm)
    #[arg(long, default_value = "dop")]
    data_type: String,

    /// Registry file tracking per-tile progress
    #[arg(long, default_value = "registry.json")]
    registry: PathBuf,

    /// Configuration directory (contains regions/*.yaml)
    #[arg(long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Directory holding the region boundary GeoJSON files
    #[arg(long, default_value = "config/boundaries")]
    boundaries_dir: PathBuf,

    /// Directory for downloaded tile payloads
    #[arg(long, default_value = "landing")]
    landing_dir: PathBuf,

    /// Only process these region ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    regions: Vec<String>,

    /// Resolve metadata only, skip payload downloads
    #[arg(long)]
    no_download: bool,

    /// Upload retrieved tiles to object storage (STORAGE_* environment)
    #[arg(long)]
    upload: bool,

    /// Remove local tile directories after a successful upload
    #[arg(long)]
    delete_local: bool,

    /// Only admit tiles acquired on or after this date
    #[arg(long)]
    date_begin: Option<String>,

    /// Only admit tiles acquired on or before this date
    #[arg(long)]
    date_end: Option<String>,

    /// Recur the window yearly, closing each year at MM-DD
    #[arg(long)]
    yearly_end: Option<String>,

    /// Export the seeded registry as GeoJSON to this path
    #[arg(long)]
    export_geojson: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_window(args: &Args) -> Result<DateWindow> {
    let begin = args
        .date_begin
        .as_deref()
        .map(parse_flexible_date)
        .transpose()
        .context("invalid --date-begin")?;
    let end = args
        .date_end
        .as_deref()
        .map(parse_flexible_date)
        .transpose()
        .context("invalid --date-end")?;
    let yearly_end = args
        .yearly_end
        .as_deref()
        .map(|raw| -> Result<(u32, u32)> {
            let (month, day) = raw
                .split_once('-')
                .context("--yearly-end must be MM-DD")?;
            Ok((month.parse()?, day.parse()?))
        })
        .transpose()?;

    if yearly_end.is_some() && begin.is_none() {
        bail!("--yearly-end requires --date-begin");
    }
    Ok(DateWindow {
        begin,
        end,
        yearly_end,
    })
}

/// Seed (or resume) the registry and pair each populated region with its
/// configuration.
fn seed_registry(
    args: &Args,
    configs: &[RegionConfig],
    catalog: &RegionCatalog,
) -> Result<(TileRegistry, String)> {
    let mut region_tiles = BTreeMap::new();
    let aoi_name;

    if let Some(tile_list) = &args.tile_list {
        let region_id = args
            .region
            .as_deref()
            .context("--tile-list requires --region")?;
        let config = configs
            .iter()
            .find(|c| c.region.id == region_id)
            .with_context(|| format!("no configuration for region '{region_id}'"))?;
        let dataset = config.dataset(&args.data_type)?;

        let ids = load_tile_list(tile_list)?;
        let tiles = seeding::tiles_from_ids(&ids, &dataset.convention())?;
        region_tiles.insert(config.region.name.clone(), tiles);
        aoi_name = tile_list
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("tile-list")
            .to_string();
    } else {
        let aoi_path = args.aoi.as_ref().context("either --aoi or --tile-list is required")?;
        let aoi = Aoi::load(aoi_path)?;
        aoi_name = aoi.name.clone();

        for config in configs {
            if !args.regions.is_empty() && !args.regions.contains(&config.region.id) {
                continue;
            }
            let Some(region) = catalog.get(&config.region.name) else {
                warn!(region = %config.region.name, "Region has no boundary, skipping");
                continue;
            };
            let dataset = config.dataset(&args.data_type)?;
            let tiles = seeding::region_tiles(&aoi, region, &dataset.convention())?;
            if !tiles.is_empty() {
                region_tiles.insert(config.region.name.clone(), tiles);
            }
        }
    }

    if region_tiles.is_empty() {
        bail!("the area of interest does not intersect any configured region");
    }

    let registry = TileRegistry::seed(&args.registry, &aoi_name, &args.data_type, region_tiles)?;
    Ok((registry, aoi_name))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting geodata tile harvester");

    let window = parse_window(&args)?;
    let configs = load_region_configs(&args.config_dir)?;
    if configs.is_empty() {
        bail!("no region configurations found in {}", args.config_dir.display());
    }
    let catalog = RegionCatalog::load(&args.boundaries_dir)?;

    let (mut registry, aoi_name) = seed_registry(&args, &configs, &catalog)?;
    for (region, retrieved, total) in registry.counts() {
        info!(region = %region, retrieved, total, "Seeded region");
    }

    if let Some(path) = &args.export_geojson {
        registry::export::export_geojson(&registry, path)?;
    }

    let engine = DownloadEngine::new(Duration::from_secs(600))?;
    let sink = if args.upload {
        let storage_config = ObjectStorageConfig::from_env()?
            .context("--upload requires the STORAGE_* environment variables")?;
        Some(UploadSink::new(&storage_config)?)
    } else {
        None
    };

    // The probe-style sources cache their id indexes beside the registry.
    let helper_dir = args
        .registry
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let mut jobs = Vec::new();
    for config in &configs {
        if !registry.regions.contains_key(&config.region.name) {
            continue;
        }
        let dataset = config.dataset(&args.data_type)?;
        let adapter = adapters::adapter_for(
            &config.region.id,
            dataset,
            &args.data_type,
            &helper_dir,
            engine.client().clone(),
            &shutdown_tx,
        )?;
        jobs.push(RegionJob {
            region_name: config.region.name.clone(),
            region_id: config.region.id.clone(),
            data_type: args.data_type.clone(),
            storage_prefix: dataset.storage_prefix.clone(),
            adapter,
        });
    }

    let options = RunOptions {
        download: !args.no_download,
        delete_local: args.delete_local,
        landing_dir: args.landing_dir.clone(),
        window,
        registry_path: args.registry.clone(),
    };

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_tx.send(()).ok();
    });

    let outcome = orchestrator::run(
        &mut registry,
        jobs,
        &engine,
        sink.as_ref(),
        &options,
        &mut shutdown_rx,
    )
    .await;

    // The registry is already saved per tile; this catches seeding-only runs
    // and makes the final document reflect the last in-memory state.
    registry.save(&args.registry)?;

    match outcome {
        Ok(()) => {
            info!(aoi = %aoi_name, registry = %args.registry.display(), "Harvest complete");
            Ok(())
        }
        Err(HarvestError::Interrupted) => {
            info!("Interrupted, progress saved; re-run to resume");
            // Exit non-zero so wrappers can tell an interrupted run apart
            // from a completed one.
            std::process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}
