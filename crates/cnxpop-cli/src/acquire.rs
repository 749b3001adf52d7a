//! Complete-zip acquisition
//!
//! Reuses an extracted tree or a previously downloaded zip when present,
//! otherwise fetches `<host>/content/<id>/<version>/complete` and unpacks it.

use anyhow::{anyhow, bail, Context, Result};
use cnxpop_populate::{CompleteZip, IngestConfig};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Make the extracted tree for `collection_id` at `version` available under
/// the configured output directory.
pub fn acquire(config: &IngestConfig, collection_id: &str, version: &str) -> Result<CompleteZip> {
    let archive = CompleteZip::locate(&config.output_dir, collection_id, version);
    if archive.exists() {
        debug!(path = %archive.root().display(), "using extracted directory");
        return Ok(archive);
    }

    let zip_path = config
        .output_dir
        .join(CompleteZip::zip_name(collection_id, version));
    if zip_path.is_file() {
        debug!(path = %zip_path.display(), "using downloaded complete zip");
    } else {
        let url = complete_zip_url(&config.legacy_host, collection_id, version)?;
        download(&url, &zip_path)?;
    }

    unpack(&zip_path, &config.output_dir)?;
    if !archive.exists() {
        bail!(
            "{} did not contain {}",
            zip_path.display(),
            CompleteZip::directory_name(collection_id, version)
        );
    }
    Ok(archive)
}

pub fn complete_zip_url(host: &str, collection_id: &str, version: &str) -> Result<Url> {
    let raw = format!(
        "{}/content/{collection_id}/{version}/complete",
        host.trim_end_matches('/')
    );
    Url::parse(&raw).with_context(|| format!("invalid legacy repository url `{raw}`"))
}

fn download(url: &Url, dest: &Path) -> Result<()> {
    info!(%url, dest = %dest.display(), "downloading complete zip");
    let client = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| anyhow!("failed to build http client: {e}"))?;
    let mut resp = client
        .get(url.clone())
        .send()
        .map_err(|e| anyhow!("failed to reach {url}: {e}"))?;
    if !resp.status().is_success() {
        bail!("{url} returned {}", resp.status());
    }

    // Download beside the destination so a failed transfer never looks complete.
    let partial = dest.with_extension("zip.part");
    let mut file = File::create(&partial)
        .with_context(|| format!("failed to create {}", partial.display()))?;
    let bytes = resp
        .copy_to(&mut file)
        .map_err(|e| anyhow!("failed to download {url}: {e}"))?;
    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download to {}", dest.display()))?;
    debug!(bytes, "download complete");
    Ok(())
}

/// Extract every entry of `zip_path` under `output_dir`.
///
/// Entries whose names would land outside `output_dir` are rejected.
pub fn unpack(zip_path: &Path, output_dir: &Path) -> Result<()> {
    let file =
        File::open(zip_path).with_context(|| format!("failed to open {}", zip_path.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", zip_path.display()))?;
    info!(path = %zip_path.display(), entries = zip.len(), "unpacking complete zip");

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("zip entry `{}` escapes the output directory", entry.name()))?;
        let target = output_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", target.display()))?;
    }
    Ok(())
}
