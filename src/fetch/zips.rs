use anyhow::{Context, Result};
use glob::glob;
use reqwest::Client;
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;
use zip::ZipArchive;

/// Download the given ZIP URL and save it under `dest_dir` using the original filename.
/// Returns the full path of the saved file.
#[instrument(level = "info", skip(client, dest_dir), fields(dest = %dest_dir.as_ref().display()))]
pub async fn download_zip(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let url = Url::parse(url_str).with_context(|| format!("parsing URL {}", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = dest_dir.join(filename);

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;
    info!(bytes = bytes.len(), "downloaded");
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing {}", dest_path.display()))?;

    Ok(dest_path)
}

/// Unpack every entry of `zip_path` under `dest_dir`.
/// Entry names that would escape `dest_dir` are rejected by the archive reader.
pub fn extract_zip(zip_path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<()> {
    let zip_path = zip_path.as_ref();
    let dest_dir = dest_dir.as_ref();
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open ZIP file: {:?}", zip_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {:?}", zip_path))?;
    debug!(entries = archive.len(), "unpacking {}", zip_path.display());
    archive
        .extract(dest_dir)
        .with_context(|| format!("extracting {:?} into {:?}", zip_path, dest_dir))?;
    Ok(())
}

/// Search `root` recursively for a file named `file_name` (glob patterns allowed).
pub fn find_file(root: impl AsRef<Path>, file_name: &str) -> Result<Option<PathBuf>> {
    let pattern = format!("{}/**/{}", root.as_ref().display(), file_name);
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {}", pattern))? {
        if let Ok(path) = entry {
            if path.is_file() {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}
