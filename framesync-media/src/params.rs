//! Stream parameters fixed at session open

use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};

/// Video stream geometry and rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoParams {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Nominal frames per second
    pub fps: u32,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Audio stream format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    /// Number of channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample (raw input only)
    pub bits_per_sample: u16,
    /// Bitrate in bits per second
    pub bitrate: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            bitrate: 64_000,
        }
    }
}

/// Parameters of one recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaStreamParams {
    /// Video stream parameters
    pub video: VideoParams,
    /// Format of the incoming audio
    pub audio_in: AudioParams,
    /// Format of the audio written to the sink
    pub audio_out: AudioParams,
    /// Whether incoming audio is raw and gets encoded by the sink
    pub need_encode: bool,
}

impl MediaStreamParams {
    /// Create parameters with the given video geometry and default audio
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            video: VideoParams { width, height, fps },
            ..Default::default()
        }
    }

    /// Set whether incoming audio needs encoding
    pub fn with_need_encode(mut self, need_encode: bool) -> Self {
        self.need_encode = need_encode;
        self
    }

    /// Set the incoming audio format
    pub fn with_audio_in(mut self, audio_in: AudioParams) -> Self {
        self.audio_in = audio_in;
        self
    }

    /// Set the output audio format
    pub fn with_audio_out(mut self, audio_out: AudioParams) -> Self {
        self.audio_out = audio_out;
        self
    }

    /// Check that the parameters describe a usable stream
    pub fn validate(&self) -> MediaResult<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(invalid(format!(
                "video dimensions must be non-zero, got {}x{}",
                self.video.width, self.video.height
            )));
        }
        if self.video.fps == 0 {
            return Err(invalid("video fps must be positive".to_string()));
        }
        for (name, audio) in [("audio_in", &self.audio_in), ("audio_out", &self.audio_out)] {
            if audio.channels == 0 || audio.sample_rate == 0 {
                return Err(invalid(format!(
                    "{} needs at least one channel and a non-zero sample rate",
                    name
                )));
            }
        }
        if self.need_encode && self.audio_in.bits_per_sample == 0 {
            return Err(invalid(
                "raw audio input needs a non-zero bits_per_sample".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> MediaError {
    MediaError::InvalidConfiguration { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(MediaStreamParams::default().validate().is_ok());
        assert!(MediaStreamParams::new(640, 480, 25)
            .with_need_encode(true)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let zero_fps = MediaStreamParams::new(640, 480, 0);
        assert!(matches!(
            zero_fps.validate(),
            Err(MediaError::InvalidConfiguration { .. })
        ));

        let silent = MediaStreamParams::default().with_audio_out(AudioParams {
            channels: 0,
            ..Default::default()
        });
        assert!(silent.validate().is_err());
    }

    #[test]
    fn test_params_serde() {
        let params = MediaStreamParams::new(1920, 1080, 60).with_need_encode(true);
        let json = serde_json::to_string(&params).unwrap();
        let back: MediaStreamParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
