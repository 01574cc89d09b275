//! State boundary download
//!
//! The state layer is fetched once from the Census cartographic-boundary
//! endpoint and cached. [`StateBoundaryFetcher::ensure_present`] is
//! idempotent: when the cached shapefile exists no request is made.

use crate::config::InputConfig;
use crate::progress::{create_download_progress, create_spinner, format_bytes};
use futures::StreamExt;
use reqwest::Client;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use zip3_common::checksum::{sha256_file, verify_sha256};
use zip3_common::{Result, Zip3Error};

/// Name of the archive while it sits in the cache directory
pub const ARCHIVE_FILE_NAME: &str = "states.zip";

/// Downloads and unpacks the state boundary shapefile into a cache directory
pub struct StateBoundaryFetcher {
    client: Client,
    url: String,
    cache_dir: PathBuf,
    base_name: String,
    expected_sha256: Option<String>,
}

impl StateBoundaryFetcher {
    pub fn new(config: &InputConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("zip3-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Zip3Error::download(&config.state_url, e))?;

        Ok(Self {
            client,
            url: config.state_url.clone(),
            cache_dir: config.state_cache_dir.clone(),
            base_name: config.state_base_name.clone(),
            expected_sha256: config.state_archive_sha256.clone(),
        })
    }

    /// Path the state shapefile is (or will be) cached at
    pub fn shapefile_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.shp", self.base_name))
    }

    /// Return the cached state shapefile, downloading it first if absent
    pub async fn ensure_present(&self) -> Result<PathBuf> {
        let shp_path = self.shapefile_path();
        if shp_path.exists() {
            info!(path = %shp_path.display(), "State boundary files already present");
            return Ok(shp_path);
        }

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| Zip3Error::write(&self.cache_dir, e))?;

        let archive = self.cache_dir.join(ARCHIVE_FILE_NAME);
        info!(url = %self.url, "Downloading state boundary shapefile");
        let size = self.download(&archive).await?;

        let digest = sha256_file(&archive)?;
        info!(
            size = %format_bytes(size),
            sha256 = %digest.sha256,
            "Downloaded state boundary archive"
        );

        if let Some(expected) = &self.expected_sha256 {
            if let Err(e) = verify_sha256(&archive, expected) {
                remove_quietly(&archive);
                return Err(e);
            }
            debug!("State archive checksum verified");
        }

        info!("Extracting state boundary files");
        let extracted = extract_archive(&archive, &self.cache_dir);
        remove_quietly(&archive);
        let extracted = extracted.map_err(|e| Zip3Error::download(&self.url, e))?;
        info!(files = extracted.len(), "Extracted state boundary files");

        if !shp_path.exists() {
            return Err(Zip3Error::download(
                &self.url,
                format!("archive did not contain {}.shp", self.base_name),
            ));
        }

        Ok(shp_path)
    }

    /// Stream the archive to `dest`, returning the byte count
    async fn download(&self, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Zip3Error::download(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Zip3Error::download(&self.url, format!("HTTP error: {}", status)));
        }

        let pb = match response.content_length() {
            Some(total) => create_download_progress(total, "Downloading state boundaries"),
            None => create_spinner("Downloading state boundaries"),
        };

        let part = dest.with_extension("zip.part");
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| Zip3Error::write(&part, e))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    pb.abandon();
                    drop(file);
                    remove_quietly(&part);
                    return Err(Zip3Error::download(&self.url, e));
                },
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| Zip3Error::write(&part, e))?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await.map_err(|e| Zip3Error::write(&part, e))?;
        drop(file);
        pb.finish_and_clear();

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| Zip3Error::write(dest, e))?;

        Ok(downloaded)
    }
}

/// Unpack every file of a zip archive into `dest_dir`, flattening directories.
///
/// Entries whose names would escape the archive root are skipped.
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| Zip3Error::read(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Zip3Error::read(archive, e))?;
    let mut written = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| Zip3Error::read(archive, e))?;
        if entry.is_dir() {
            continue;
        }

        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
        else {
            warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
            continue;
        };

        let out_path = dest_dir.join(file_name);
        let mut out = File::create(&out_path).map_err(|e| Zip3Error::write(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| Zip3Error::write(&out_path, e))?;
        debug!(path = %out_path.display(), "Extracted");
        written.push(out_path);
    }

    Ok(written)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Could not remove temporary file");
    }
}
