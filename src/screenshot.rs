use crate::block_decoder::BinaryBlock;
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Receives screenshots as they are fetched.
pub trait ScreenshotSink {
    fn store(&mut self, image: &BinaryBlock, taken_at: DateTime<Local>) -> io::Result<PathBuf>;
}

/// Writes each screenshot to its own PNG file in a directory.
#[derive(Debug, Clone)]
pub struct ScreenshotDir {
    dir: PathBuf,
}

impl ScreenshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `screenshot.2024-03-01.123005.png`
    pub fn file_name(taken_at: DateTime<Local>) -> String {
        format!("screenshot.{}.png", taken_at.format("%Y-%m-%d.%H%M%S"))
    }
}

impl ScreenshotSink for ScreenshotDir {
    fn store(&mut self, image: &BinaryBlock, taken_at: DateTime<Local>) -> io::Result<PathBuf> {
        let path = self.dir.join(Self::file_name(taken_at));
        let mut file = File::create(&path)?;
        file.write_all(image.as_bytes())?;
        file.flush()?;
        log::info!("Wrote {} byte screenshot to {}", image.len(), path.display());
        Ok(path)
    }
}
