// MIME types for elementary streams handed to the decoders.
//
// Values match the identifiers the host pipeline uses for sample MIME types,
// plus the ASF/WMV family that the host's own extractor emits.

// ============================================================================
// Audio
// ============================================================================

pub const AUDIO_AAC: &str = "audio/mp4a-latm";
pub const AUDIO_MPEG: &str = "audio/mpeg";
pub const AUDIO_MPEG_L1: &str = "audio/mpeg-L1";
pub const AUDIO_MPEG_L2: &str = "audio/mpeg-L2";
pub const AUDIO_AC3: &str = "audio/ac3";
pub const AUDIO_E_AC3: &str = "audio/eac3";
pub const AUDIO_E_AC3_JOC: &str = "audio/eac3-joc";
pub const AUDIO_TRUEHD: &str = "audio/true-hd";
pub const AUDIO_DTS: &str = "audio/vnd.dts";
pub const AUDIO_DTS_HD: &str = "audio/vnd.dts.hd";
pub const AUDIO_VORBIS: &str = "audio/vorbis";
pub const AUDIO_OPUS: &str = "audio/opus";
pub const AUDIO_AMR_NB: &str = "audio/3gpp";
pub const AUDIO_AMR_WB: &str = "audio/amr-wb";
pub const AUDIO_FLAC: &str = "audio/flac";
pub const AUDIO_ALAC: &str = "audio/alac";
pub const AUDIO_MLAW: &str = "audio/g711-mlaw";
pub const AUDIO_ALAW: &str = "audio/g711-alaw";

pub const AUDIO_X_MS_WMAV1: &str = "audio/x-ms-wmav1";
pub const AUDIO_X_MS_WMAV2: &str = "audio/x-ms-wmav2";
pub const AUDIO_X_MS_WMAPRO: &str = "audio/x-ms-wmapro";
pub const AUDIO_X_MS_WMALOSSLESS: &str = "audio/x-ms-wmalossless";

// ============================================================================
// Video
// ============================================================================

pub const VIDEO_H264: &str = "video/avc";
pub const VIDEO_H265: &str = "video/hevc";
pub const VIDEO_MPEG: &str = "video/mpeg";
pub const VIDEO_MPEG2: &str = "video/mpeg2";
pub const VIDEO_VP8: &str = "video/x-vnd.on2.vp8";
pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";
pub const VIDEO_VC1: &str = "video/wvc1";

pub const VIDEO_X_MS_WMV3: &str = "video/x-ms-wmv3";
pub const VIDEO_X_MS_WMV2: &str = "video/x-ms-wmv2";
pub const VIDEO_X_MS_MSMPEG4V3: &str = "video/x-ms-msmpeg4v3";

/// Returns `true` for `audio/*` MIME types.
pub fn is_audio(mime_type: &str) -> bool {
    mime_type.starts_with("audio/")
}

/// Returns `true` for `video/*` MIME types.
pub fn is_video(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

/// Returns `true` for the Windows Media Audio family.
pub fn is_wma(mime_type: &str) -> bool {
    matches!(
        mime_type,
        AUDIO_X_MS_WMAV1 | AUDIO_X_MS_WMAV2 | AUDIO_X_MS_WMAPRO | AUDIO_X_MS_WMALOSSLESS
    )
}
