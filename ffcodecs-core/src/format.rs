//! Stream format descriptor supplied by the host at decoder construction.
//!
//! This is a plain data record. The demuxer that fills it in lives outside
//! this crate.

use serde::{Deserialize, Serialize};

/// Host-side description of an elementary stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Compression identifier, e.g. `audio/alac` or `video/avc`.
    pub sample_mime_type: Option<String>,
    /// Container-level initialization records (codec private data,
    /// parameter sets, magic cookies), in container order.
    #[serde(default)]
    pub initialization_data: Vec<Vec<u8>>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u32>,
    /// Largest packet the container declares, used to size input buffers.
    pub max_input_size: Option<usize>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Format {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            sample_mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    pub fn with_initialization_data(mut self, records: Vec<Vec<u8>>) -> Self {
        self.initialization_data = records;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channel_count: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self.channel_count = Some(channel_count);
        self
    }

    pub fn with_video_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = Some(size);
        self
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.sample_mime_type.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    #[test]
    fn test_builder() {
        let format = Format::new(mime::AUDIO_OPUS)
            .with_audio(48_000, 2)
            .with_initialization_data(vec![vec![1, 2, 3]]);
        assert_eq!(format.mime_type(), Some(mime::AUDIO_OPUS));
        assert_eq!(format.sample_rate, Some(48_000));
        assert_eq!(format.initialization_data.len(), 1);
        assert_eq!(format.max_input_size, None);
    }

    #[test]
    fn test_json_defaults() {
        let format: Format =
            serde_json::from_str(r#"{"sample_mime_type":"video/avc","sample_rate":null,"channel_count":null,"max_input_size":null,"width":1920,"height":1080}"#)
                .unwrap();
        assert!(format.initialization_data.is_empty());
        assert_eq!(format.width, Some(1920));
    }
}
