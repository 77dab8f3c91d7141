//! Decoder and library configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buffer::OutputMode;
use crate::error::{DecoderError, Result};
use crate::format::Format;

/// Environment variable holding a path list of native library candidates.
pub const LIBRARY_ENV_VAR: &str = "FFCODECS_LIBRARY";

// ============================================================================
// Library Path Detection
// ============================================================================

#[cfg(target_os = "windows")]
fn default_library_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("ffcodecs.dll")]
}

#[cfg(target_os = "linux")]
fn default_library_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = [
        "/usr/lib/x86_64-linux-gnu/libffcodecs.so",
        "/usr/lib/libffcodecs.so",
        "/usr/local/lib/libffcodecs.so",
    ]
    .iter()
    .map(PathBuf::from)
    .filter(|p| p.exists())
    .collect();
    paths.push(PathBuf::from("libffcodecs.so"));
    paths
}

#[cfg(target_os = "macos")]
fn default_library_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/lib/libffcodecs.dylib"),
        PathBuf::from("/opt/homebrew/lib/libffcodecs.dylib"),
        PathBuf::from("libffcodecs.dylib"),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn default_library_paths() -> Vec<PathBuf> {
    Vec::new()
}

// ============================================================================
// Library Configuration
// ============================================================================

/// Where to look for the native codec library. Candidates are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub library_paths: Vec<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            library_paths: default_library_paths(),
        }
    }
}

impl LibraryConfig {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self {
            library_paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
        }
    }

    /// Defaults, with `FFCODECS_LIBRARY` entries taking precedence when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = std::env::var_os(LIBRARY_ENV_VAR) {
            let mut paths: Vec<PathBuf> = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            paths.extend(config.library_paths);
            config.library_paths = paths;
        }
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DecoderError::Config(e.to_string()))
    }
}

// ============================================================================
// Audio Decoder Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDecoderConfig {
    pub num_input_buffers: usize,
    pub num_output_buffers: usize,
    /// Initial input buffer size in bytes, unless the format declares
    /// a maximum input size.
    pub initial_input_buffer_size: usize,
    /// Request 32-bit float PCM instead of 16-bit integer PCM.
    pub output_float: bool,
}

impl Default for AudioDecoderConfig {
    fn default() -> Self {
        Self {
            num_input_buffers: 16,
            num_output_buffers: 16,
            initial_input_buffer_size: 960 * 6,
            output_float: false,
        }
    }
}

impl AudioDecoderConfig {
    pub fn input_buffer_size(&self, format: &Format) -> usize {
        format.max_input_size.unwrap_or(self.initial_input_buffer_size)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DecoderError::Config(e.to_string()))
    }
}

// ============================================================================
// Video Decoder Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDecoderConfig {
    pub num_input_buffers: usize,
    pub num_output_buffers: usize,
    pub initial_input_buffer_size: usize,
    /// Native decoder thread count.
    pub threads: u32,
    pub output_mode: OutputMode,
}

impl Default for VideoDecoderConfig {
    fn default() -> Self {
        Self {
            num_input_buffers: 4,
            num_output_buffers: 4,
            // 720p worth of 64x64 superblocks at 4:2:0, halved.
            initial_input_buffer_size: 1280_usize.div_ceil(64) * 720_usize.div_ceil(64) * (64 * 64 * 3 / 2) / 2,
            threads: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            output_mode: OutputMode::None,
        }
    }
}

impl VideoDecoderConfig {
    pub fn input_buffer_size(&self, format: &Format) -> usize {
        format.max_input_size.unwrap_or(self.initial_input_buffer_size)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DecoderError::Config(e.to_string()))
    }
}
