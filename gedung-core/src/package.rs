// Output area on disk and the zip built from it

use crate::error::Result;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const BUILDING_DIR: &str = "building";
pub const NOT_BUILDING_DIR: &str = "not_building";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Building,
    NotBuilding,
}

impl Bucket {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Bucket::Building => BUILDING_DIR,
            Bucket::NotBuilding => NOT_BUILDING_DIR,
        }
    }
}

/// Saved images are named after the 1-based row position.
pub fn image_file_name(index: usize) -> String {
    format!("foto_{}.jpg", index + 1)
}

/// The per-run scratch tree. Only ever created through `reset`, so holding
/// one means the tree is fresh.
#[derive(Debug, Clone)]
pub struct OutputArea {
    root: PathBuf,
}

impl OutputArea {
    /// Destroy whatever is at `root` and recreate it with both buckets.
    pub fn reset(root: &Path) -> Result<Self> {
        if root.exists() {
            debug!(root = %root.display(), "Clearing previous output");
            fs::remove_dir_all(root)?;
        }
        fs::create_dir_all(root.join(BUILDING_DIR))?;
        fs::create_dir_all(root.join(NOT_BUILDING_DIR))?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(bucket.dir_name())
    }

    pub fn image_path(&self, bucket: Bucket, index: usize) -> PathBuf {
        self.bucket_dir(bucket).join(image_file_name(index))
    }

    /// Write row `index` as JPEG into `bucket`. A failed write leaves no
    /// file behind.
    pub fn save_image(&self, bucket: Bucket, index: usize, image: &DynamicImage) -> Result<PathBuf> {
        let path = self.image_path(bucket, index);
        if let Err(e) = image.save_with_format(&path, ImageFormat::Jpeg) {
            if path.exists() {
                warn!(path = %path.display(), "Removing partial image");
                fs::remove_file(&path)?;
            }
            return Err(e.into());
        }
        Ok(path)
    }
}

/// Zip everything under `root` into memory. Entry names are relative to
/// `root` with `/` separators; directories get their own entries so empty
/// buckets still show up. Nothing is written to disk.
pub fn build_archive(root: &Path) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0usize;
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = archive_name(root, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut buffer = Vec::new();
            fs::File::open(entry.path())?.read_to_end(&mut buffer)?;
            zip.write_all(&buffer)?;
            files += 1;
        }
    }

    let bytes = zip.finish()?.into_inner();
    info!(files, bytes = bytes.len(), "Archive built");
    Ok(bytes)
}

fn archive_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn test_image_file_name_is_one_based() {
        assert_eq!(image_file_name(0), "foto_1.jpg");
        assert_eq!(image_file_name(41), "foto_42.jpg");
    }

    #[test]
    fn test_reset_wipes_previous_run() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("temp_process");

        let area = OutputArea::reset(&root).unwrap();
        fs::write(area.image_path(Bucket::Building, 0), b"old").unwrap();
        fs::write(root.join("stale.txt"), b"old").unwrap();

        let area = OutputArea::reset(&root).unwrap();

        assert!(area.bucket_dir(Bucket::Building).is_dir());
        assert!(area.bucket_dir(Bucket::NotBuilding).is_dir());
        assert!(!area.image_path(Bucket::Building, 0).exists());
        assert!(!root.join("stale.txt").exists());
    }

    #[test]
    fn test_save_image_lands_in_bucket() {
        let temp = TempDir::new().unwrap();
        let area = OutputArea::reset(&temp.path().join("out")).unwrap();
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));

        let path = area.save_image(Bucket::NotBuilding, 2, &image).unwrap();

        assert_eq!(path, area.image_path(Bucket::NotBuilding, 2));
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_failed_save_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let area = OutputArea::reset(&temp.path().join("out")).unwrap();
        // JPEG cannot encode a zero-width image; the file is created first
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(0, 3));

        assert!(area.save_image(Bucket::Building, 0, &image).is_err());

        assert!(!area.image_path(Bucket::Building, 0).exists());
        assert_eq!(fs::read_dir(area.bucket_dir(Bucket::Building)).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_uses_relative_names() {
        let temp = TempDir::new().unwrap();
        let area = OutputArea::reset(&temp.path().join("out")).unwrap();
        fs::write(area.image_path(Bucket::Building, 2), b"jpeg-ish").unwrap();
        fs::write(area.root().join("report.xlsx"), b"xlsx-ish").unwrap();

        let bytes = build_archive(area.root()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "building/",
                "building/foto_3.jpg",
                "not_building/",
                "report.xlsx",
            ]
        );

        let mut content = String::new();
        archive
            .by_name("building/foto_3.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "jpeg-ish");
    }
}
