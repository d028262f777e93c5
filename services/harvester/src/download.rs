//! Per-tile artifact download.
//!
//! Streams a payload into the tile's landing directory, sniffs the container
//! format from magic bytes and unpacks zip/gzip archives so the directory
//! ends up holding the raw payload files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::StreamExt;
use harvest_common::{HarvestError, HarvestResult};
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// File extensions recognised as tile payloads.
const PAYLOAD_EXTENSIONS: &[&str] = &["tif", "tiff", "xyz", "laz", "las", "asc", "jp2"];

/// The downloaded and unpacked contents of one tile directory.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    pub dir: PathBuf,
    /// Payload files found after unpacking, sorted.
    pub payloads: Vec<PathBuf>,
}

impl LocalArtifact {
    pub fn primary(&self) -> &Path {
        // find_payloads guarantees at least one entry
        &self.payloads[0]
    }

    /// Lowercase extension of the primary payload.
    pub fn format(&self) -> Option<String> {
        self.primary()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}

/// HTTP download engine shared across tiles.
pub struct DownloadEngine {
    client: Client,
}

impl DownloadEngine {
    pub fn new(request_timeout: Duration) -> HarvestResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| HarvestError::Transfer(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch `url` into `dest_dir`, unpack any archive container and locate
    /// the payload files. On error the caller is expected to remove the
    /// partially populated directory.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> HarvestResult<LocalArtifact> {
        fs::create_dir_all(dest_dir).await?;

        let filename = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download.bin");
        let target = dest_dir.join(filename);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HarvestError::Transfer(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Transfer(format!(
                "{url} returned HTTP {status}"
            )));
        }

        let total_bytes: Option<u64> = response.content_length();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&target)
            .await?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let mut since_log = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| HarvestError::Transfer(format!("error reading body: {e}")))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            since_log += chunk.len() as u64;

            if since_log >= 10_000_000 {
                debug!(downloaded, total = ?total_bytes, "Download progress");
                since_log = 0;
            }
        }
        file.flush().await?;
        drop(file);

        debug!(bytes = downloaded, path = %target.display(), "Download complete");

        unpack(&target)?;
        let payloads = find_payloads(dest_dir)?;

        info!(
            dir = %dest_dir.display(),
            payloads = payloads.len(),
            "Tile artifact ready"
        );
        Ok(LocalArtifact {
            dir: dest_dir.to_path_buf(),
            payloads,
        })
    }
}

/// Unpack an archive in place, judging the container by its magic bytes
/// rather than the URL's extension. Plain payloads are left untouched.
pub fn unpack(path: &Path) -> HarvestResult<()> {
    let mut head = [0u8; 4];
    {
        use std::io::Read;
        let mut file = File::open(path)?;
        let n = file.read(&mut head)?;
        if n < 2 {
            return Ok(());
        }
    }

    if head == ZIP_MAGIC {
        unpack_zip(path)?;
    } else if head[..2] == GZIP_MAGIC {
        unpack_gzip(path)?;
    }
    Ok(())
}

/// Extract every file entry of a zip archive into the archive's directory
/// (flattened to basenames, directory entries dropped), then remove the
/// archive itself.
fn unpack_zip(path: &Path) -> HarvestResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| HarvestError::Format(format!("{} has no parent dir", path.display())))?
        .to_path_buf();

    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| HarvestError::Format(format!("invalid zip {}: {e}", path.display())))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| HarvestError::Format(format!("corrupt zip entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_os_string()))
        else {
            warn!(entry = %entry.name(), "Skipping zip entry with unusable name");
            continue;
        };
        let mut out = File::create(dir.join(&name))?;
        io::copy(&mut entry, &mut out)?;
    }
    drop(archive);

    std::fs::remove_file(path)?;
    debug!(archive = %path.display(), "Unpacked zip archive");
    Ok(())
}

/// Decompress a single gzip member next to the archive, then remove it.
fn unpack_gzip(path: &Path) -> HarvestResult<()> {
    let out_path = match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => path.with_extension(""),
        _ => path.with_extension("unpacked"),
    };

    let mut decoder = GzDecoder::new(File::open(path)?);
    let mut out = File::create(&out_path)?;
    io::copy(&mut decoder, &mut out)?;

    std::fs::remove_file(path)?;
    debug!(archive = %path.display(), "Unpacked gzip archive");
    Ok(())
}

/// Find payload files below a tile directory, sorted for determinism.
///
/// No payload after a successful transfer means the source handed back
/// something unexpected (an HTML error page, an empty archive).
pub fn find_payloads(dir: &Path) -> HarvestResult<Vec<PathBuf>> {
    let mut payloads: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .map_or(false, |ext| PAYLOAD_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect();
    payloads.sort();

    if payloads.is_empty() {
        return Err(HarvestError::Format(
            "no payload file found after fetch".to_string(),
        ));
    }
    Ok(payloads)
}
