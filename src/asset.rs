//! Target image resolution
//!
//! The button screenshot may live in several places depending on how the
//! program was launched. Candidate directories are produced lazily in
//! priority order and the first one holding the image wins.

use image::{GrayImage, RgbaImage};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::AutoAxeError;

/// Environment variable pointing at a bundled resource directory
pub const RESOURCE_DIR_ENV: &str = "AUTOAXE_RESOURCE_DIR";

type DirProducer = fn() -> Option<PathBuf>;

/// Candidate directories in priority order
const PRODUCERS: [(&str, DirProducer); 4] = [
    ("bundled resources", resource_dir),
    ("current directory", cwd),
    ("executable directory", exe_dir),
    ("process working directory", shell_pwd),
];

fn resource_dir() -> Option<PathBuf> {
    match env::var_os(RESOURCE_DIR_ENV) {
        Some(dir) => Some(PathBuf::from(dir)),
        None => exe_dir().map(|dir| dir.join("assets")),
    }
}

fn cwd() -> Option<PathBuf> {
    env::current_dir().ok()
}

fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn shell_pwd() -> Option<PathBuf> {
    env::var_os("PWD").map(PathBuf::from)
}

/// Build the ordered list of absolute candidate paths for `file_name`
pub fn candidate_paths(file_name: &str) -> Vec<PathBuf> {
    PRODUCERS
        .iter()
        .filter_map(|(label, produce)| {
            let dir = produce()?;
            let path = dir.join(file_name);
            info!("Candidate ({}): {}", label, path.display());
            Some(path)
        })
        .collect()
}

/// Return the first candidate that exists as a file
pub fn resolve_first_existing(candidates: &[PathBuf]) -> Result<PathBuf, AutoAxeError> {
    for path in candidates {
        let exists = path.is_file();
        info!("Checking {} (exists: {})", path.display(), exists);
        if exists {
            return Ok(path.clone());
        }
    }

    for dir in candidates.iter().filter_map(|p| p.parent()) {
        log_directory_listing(dir);
    }

    Err(AutoAxeError::AssetNotFound {
        candidates: candidates.to_vec(),
    })
}

fn log_directory_listing(dir: &Path) {
    match fs::read_dir(dir) {
        Ok(entries) => {
            let names: Vec<String> = entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            info!("Contents of {}: {:?}", dir.display(), names);
        }
        Err(e) => error!("Cannot list {}: {}", dir.display(), e),
    }
}

/// Resolve and load the target image named `file_name`
pub fn resolve_target_image(file_name: &str) -> Result<TargetImage, AutoAxeError> {
    let path = resolve_first_existing(&candidate_paths(file_name))?;
    info!("Found button image: {}", path.display());
    TargetImage::load(path)
}

/// Reference bitmap of the button, decoded once
#[derive(Debug, Clone)]
pub struct TargetImage {
    path: PathBuf,
    rgba: RgbaImage,
    gray: GrayImage,
}

impl TargetImage {
    /// Decode the image at `path`
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AutoAxeError> {
        let path = path.into();
        let decoded = image::open(&path)
            .map_err(|e| AutoAxeError::Image(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_rgba(path, decoded.to_rgba8()))
    }

    /// Wrap an already decoded bitmap
    pub fn from_rgba(path: impl Into<PathBuf>, rgba: RgbaImage) -> Self {
        let gray = image::imageops::grayscale(&rgba);
        Self {
            path: path.into(),
            rgba,
            gray,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgba.dimensions()
    }
}
