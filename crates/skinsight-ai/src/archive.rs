//! Optional persistence of successfully classified uploads.
//!
//! Runs after the pipeline has finished and removed its transient file. The
//! archive never sees failed requests.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Copies accepted uploads into a directory as `<unix-millis>-<random>.<ext>`.
#[derive(Debug, Clone)]
pub struct UploadArchive {
    dir: PathBuf,
}

impl UploadArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a new file in the archive and return its path.
    ///
    /// The extension comes from `file_name` when it has a plain one, then from
    /// the image content, and falls back to `bin`.
    pub fn commit(&self, bytes: &[u8], file_name: Option<&str>) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let ext = extension(bytes, file_name);

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{millis}-"))
            .suffix(&format!(".{ext}"))
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "archived upload");
        Ok(path)
    }
}

fn extension(bytes: &[u8], file_name: Option<&str>) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);

    from_name
        .or_else(|| {
            image::guess_format(bytes)
                .ok()
                .and_then(|format| format.extensions_str().first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}
