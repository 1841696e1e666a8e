//! Temporary on-disk copies of uploaded images.
//!
//! The verifier reads images by path, so each upload is written to a uniquely
//! named temp file that is removed when its [`StagedImage`] is dropped.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const STAGED_SUFFIX: &str = ".jpg";
const STAGED_PREFIX: &str = "facesim-";

/// An upload written to a temp file. Deleted on drop.
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    /// Write `bytes` to a fresh temp file in the system temp directory.
    pub fn write(bytes: &[u8]) -> std::io::Result<Self> {
        Self::write_in(&std::env::temp_dir(), bytes)
    }

    /// Write `bytes` to a fresh temp file inside `dir`.
    pub fn write_in(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(STAGED_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Both uploads of one request, staged together.
#[derive(Debug)]
pub struct StagedPair {
    pub img1: StagedImage,
    pub img2: StagedImage,
}

impl StagedPair {
    pub fn write(img1: &[u8], img2: &[u8]) -> std::io::Result<Self> {
        Ok(Self {
            img1: StagedImage::write(img1)?,
            img2: StagedImage::write(img2)?,
        })
    }
}
