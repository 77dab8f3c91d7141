//! # Codec Registry
//!
//! Maps sample MIME types to native codec names and answers the
//! process-level questions about the native library: is it loaded, which
//! version is it, how much input padding does it need, does this build
//! carry a given decoder.
//!
//! Loading happens at most once per registry and never panics. A missing
//! library is a normal state: every query then reports "unsupported".

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::LibraryConfig;
use crate::error::{DecoderError, Result};
use crate::ffi::DynamicEngine;
use crate::mime;
use crate::native::{CodecEngine, LENGTH_UNSET};

// ============================================================================
// Codec Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub mime_type: &'static str,
    pub codec_name: &'static str,
}

const fn codec(mime_type: &'static str, codec_name: &'static str) -> CodecDescriptor {
    CodecDescriptor { mime_type, codec_name }
}

static CODECS: &[CodecDescriptor] = &[
    codec(mime::AUDIO_AAC, "aac"),
    codec(mime::AUDIO_MPEG, "mp3"),
    codec(mime::AUDIO_MPEG_L1, "mp3"),
    codec(mime::AUDIO_MPEG_L2, "mp3"),
    codec(mime::AUDIO_AC3, "ac3"),
    codec(mime::AUDIO_E_AC3, "eac3"),
    codec(mime::AUDIO_E_AC3_JOC, "eac3"),
    codec(mime::AUDIO_TRUEHD, "truehd"),
    codec(mime::AUDIO_DTS, "dca"),
    codec(mime::AUDIO_DTS_HD, "dca"),
    codec(mime::AUDIO_VORBIS, "vorbis"),
    codec(mime::AUDIO_OPUS, "opus"),
    codec(mime::AUDIO_AMR_NB, "amrnb"),
    codec(mime::AUDIO_AMR_WB, "amrwb"),
    codec(mime::AUDIO_FLAC, "flac"),
    codec(mime::AUDIO_ALAC, "alac"),
    codec(mime::AUDIO_MLAW, "pcm_mulaw"),
    codec(mime::AUDIO_ALAW, "pcm_alaw"),
    codec(mime::AUDIO_X_MS_WMAV1, "wmav1"),
    codec(mime::AUDIO_X_MS_WMAV2, "wmav2"),
    codec(mime::AUDIO_X_MS_WMAPRO, "wmapro"),
    codec(mime::AUDIO_X_MS_WMALOSSLESS, "wmalossless"),
    codec(mime::VIDEO_H264, "h264"),
    codec(mime::VIDEO_H265, "hevc"),
    codec(mime::VIDEO_MPEG, "mpegvideo"),
    codec(mime::VIDEO_MPEG2, "mpeg2video"),
    codec(mime::VIDEO_VP8, "libvpx"),
    codec(mime::VIDEO_VP9, "libvpx-vp9"),
    codec(mime::VIDEO_VC1, "vc1"),
    codec(mime::VIDEO_X_MS_WMV3, "wmv3"),
    codec(mime::VIDEO_X_MS_WMV2, "wmv2"),
    codec(mime::VIDEO_X_MS_MSMPEG4V3, "msmpeg4v3"),
];

impl CodecDescriptor {
    pub fn lookup(mime_type: &str) -> Option<&'static CodecDescriptor> {
        CODECS.iter().find(|c| c.mime_type == mime_type)
    }

    /// Every MIME type with a native codec mapping.
    pub fn all() -> &'static [CodecDescriptor] {
        CODECS
    }
}

/// Native codec name for `mime_type`, or `None` if there is no mapping.
pub fn resolve_codec_name(mime_type: &str) -> Option<&'static str> {
    CodecDescriptor::lookup(mime_type).map(|c| c.codec_name)
}

// ============================================================================
// Registry
// ============================================================================

pub type EngineLoader = Box<dyn FnOnce() -> Result<Arc<dyn CodecEngine>> + Send>;

pub struct CodecRegistry {
    loader: Mutex<Option<EngineLoader>>,
    engine: OnceLock<Option<Arc<dyn CodecEngine>>>,
    load_error: Mutex<Option<DecoderError>>,
    version: OnceLock<Option<String>>,
    input_padding_size: OnceLock<i32>,
}

/// Library paths for the global registry, and whether it has claimed them.
struct GlobalSetup {
    config: Option<LibraryConfig>,
    claimed: bool,
}

static GLOBAL_SETUP: Mutex<GlobalSetup> = parking_lot::const_mutex(GlobalSetup {
    config: None,
    claimed: false,
});
static GLOBAL: OnceLock<CodecRegistry> = OnceLock::new();

/// Sets the library search paths used by [`CodecRegistry::global`].
/// Fails once the global registry has been created, or if paths were
/// already configured.
pub fn configure_global(config: LibraryConfig) -> Result<()> {
    let mut setup = GLOBAL_SETUP.lock();
    if setup.claimed {
        return Err(DecoderError::Config("global codec registry already initialized".into()));
    }
    if setup.config.is_some() {
        return Err(DecoderError::Config("global library paths already configured".into()));
    }
    setup.config = Some(config);
    Ok(())
}

impl CodecRegistry {
    /// The process-wide registry, backed by the dynamically loaded library.
    pub fn global() -> &'static CodecRegistry {
        GLOBAL.get_or_init(|| {
            let config = {
                let mut setup = GLOBAL_SETUP.lock();
                setup.claimed = true;
                setup.config.take()
            };
            CodecRegistry::with_config(config.unwrap_or_else(LibraryConfig::from_env))
        })
    }

    pub fn with_config(config: LibraryConfig) -> Self {
        Self::with_loader(move || {
            let engine = DynamicEngine::load(&config)?;
            Ok(Arc::new(engine) as Arc<dyn CodecEngine>)
        })
    }

    /// A registry whose engine is produced by `loader` on first use.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn CodecEngine>> + Send + 'static,
    {
        Self {
            loader: Mutex::new(Some(Box::new(loader))),
            engine: OnceLock::new(),
            load_error: Mutex::new(None),
            version: OnceLock::new(),
            input_padding_size: OnceLock::new(),
        }
    }

    /// A registry around an engine that is already loaded.
    pub fn with_engine(engine: Arc<dyn CodecEngine>) -> Self {
        Self::with_loader(move || Ok(engine))
    }

    fn loaded(&self) -> Option<&Arc<dyn CodecEngine>> {
        self.engine
            .get_or_init(|| {
                let loader = self.loader.lock().take()?;
                match loader() {
                    Ok(engine) => Some(engine),
                    Err(e) => {
                        tracing::warn!("Native codec engine unavailable: {}", e);
                        *self.load_error.lock() = Some(e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Loads the native library on first call. Later calls return the
    /// cached answer.
    pub fn is_available(&self) -> bool {
        self.loaded().is_some()
    }

    pub fn engine(&self) -> Result<Arc<dyn CodecEngine>> {
        match self.loaded() {
            Some(engine) => Ok(engine.clone()),
            None => Err(self
                .load_error
                .lock()
                .clone()
                .unwrap_or_else(|| DecoderError::Unavailable("native codec library not loaded".into()))),
        }
    }

    /// Native library version, or `None` if the library is unavailable.
    pub fn version(&self) -> Option<String> {
        self.version
            .get_or_init(|| self.loaded().map(|engine| engine.version()))
            .clone()
    }

    /// Zeroed bytes required after every input payload, or
    /// [`LENGTH_UNSET`] if the library is unavailable.
    pub fn input_padding_size(&self) -> i32 {
        *self.input_padding_size.get_or_init(|| {
            self.loaded()
                .map(|engine| engine.input_padding_size())
                .unwrap_or(LENGTH_UNSET)
        })
    }

    /// Input padding as a buffer length.
    pub fn input_padding_len(&self) -> usize {
        usize::try_from(self.input_padding_size()).unwrap_or(0)
    }

    pub fn supports_format(&self, mime_type: &str) -> bool {
        let Some(engine) = self.loaded() else {
            return false;
        };
        let Some(codec_name) = resolve_codec_name(mime_type) else {
            return false;
        };
        if !engine.has_decoder(codec_name) {
            tracing::warn!(
                "No {} decoder available. Check the native library build configuration.",
                codec_name
            );
            return false;
        }
        true
    }

    /// Human-readable decoder name, e.g. `ffmpeg6.0-h264`.
    pub fn decoder_name(&self, codec_name: &str) -> String {
        format!("ffmpeg{}-{}", self.version().unwrap_or_default(), codec_name)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("loaded", &self.engine.get().map(|e| e.is_some()))
            .field("version", &self.version.get())
            .finish()
    }
}
