use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::SourceError;

/// List the image files directly inside `dir`, sorted by name.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    info!("Scanning {} for images...", dir.display());

    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        match ImageFormat::from_path(&path) {
            Ok(ImageFormat::Jpeg | ImageFormat::Png) => found.push(path),
            _ => debug!("Skipping {}", path.display()),
        }
    }

    Ok(found)
}
