//! On-disk archive of classified frames.
//!
//! ```text
//!   archive/
//!     fish_2026-03-01_08-15-02.jpg      positive frames (annotated)
//!     no_fish_2026-03-01_08-16-40.jpg   negatives, only if keep_negatives
//!   last_detected_image.jpg             copy of the newest positive
//! ```
//!
//! The directory is cleared (or created) at startup when configured to.
//! Two frames stamped in the same second get a `_N` suffix instead of
//! overwriting each other.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::adapters::time::file_stamp;
use crate::app::ports::FrameStore;
use crate::config::ArchiveConfig;
use crate::error::{IoError, Result};
use crate::vision::Frame;

pub struct FsArchive {
    directory: PathBuf,
    last_detection: PathBuf,
    keep_negatives: bool,
    clear_on_startup: bool,
    quality: u8,
}

impl FsArchive {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.directory),
            last_detection: PathBuf::from(&config.last_detection_path),
            keep_negatives: config.keep_negatives,
            clear_on_startup: config.clear_on_startup,
            quality: config.jpeg_quality,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn unique_path(&self, prefix: &str, frame: &Frame) -> PathBuf {
        let stamp = file_stamp(frame.captured_at());
        let mut path = self.directory.join(format!("{prefix}_{stamp}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = self.directory.join(format!("{prefix}_{stamp}_{n}.jpg"));
            n += 1;
        }
        path
    }
}

fn archive_err(path: &Path, e: &std::io::Error) -> IoError {
    IoError::Archive(format!("{}: {e}", path.display()))
}

impl FrameStore for FsArchive {
    fn reset(&self) -> Result<()> {
        if self.clear_on_startup {
            match fs::remove_dir_all(&self.directory) {
                Ok(()) => info!("Cleared archive {}", self.directory.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(archive_err(&self.directory, &e).into()),
            }
        }
        fs::create_dir_all(&self.directory).map_err(|e| archive_err(&self.directory, &e))?;
        Ok(())
    }

    fn store(&self, frame: &Frame, positive: bool) -> Result<Option<PathBuf>> {
        if !positive && !self.keep_negatives {
            return Ok(None);
        }
        let jpeg = frame.encode_jpeg(self.quality)?;
        fs::create_dir_all(&self.directory).map_err(|e| archive_err(&self.directory, &e))?;

        let prefix = if positive { "fish" } else { "no_fish" };
        let path = self.unique_path(prefix, frame);
        fs::write(&path, &jpeg).map_err(|e| archive_err(&path, &e))?;
        debug!("Archived {}", path.display());

        if !positive {
            return Ok(None);
        }
        fs::write(&self.last_detection, &jpeg).map_err(|e| archive_err(&self.last_detection, &e))?;
        Ok(Some(self.last_detection.clone()))
    }
}
