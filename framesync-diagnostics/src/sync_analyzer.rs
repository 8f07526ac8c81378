//! A/V synchronization analysis
//!
//! Compares the counts in a [`SyncReport`] against what the video clock
//! implies and grades the session.

use crate::error::DiagnosticsError;
use framesync_core::format_duration_ms;
use framesync_media::SyncReport;
use serde::{Deserialize, Serialize};

/// Overall grade of a session's synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealth {
    /// Counts within the drifting threshold
    Healthy,
    /// Noticeable drift on at least one track
    Drifting,
    /// Drift beyond the broken threshold, or a track missing entirely
    Broken,
}

/// Drift ratio limits (absolute drift divided by expected count)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncThresholds {
    /// Ratio at which a session counts as drifting
    pub drifting_ratio: f64,
    /// Ratio at which a session counts as broken
    pub broken_ratio: f64,
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            drifting_ratio: 0.05, // 5%
            broken_ratio: 0.20,   // 20%
        }
    }
}

/// Result of analyzing one [`SyncReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAssessment {
    /// Overall grade
    pub health: SyncHealth,
    /// Presentation duration covered by the report (`HH:MM:SS.mmm`)
    pub duration: String,
    /// Emitted minus expected video frames
    pub video_drift: i64,
    /// Emitted minus expected audio units
    pub audio_drift: i64,
    /// Video drift relative to the expected frame count
    pub video_drift_ratio: f64,
    /// Audio drift relative to the expected unit count
    pub audio_drift_ratio: f64,
    /// Share of audio units that were inserted silence
    pub silence_ratio: f64,
    /// Remote minus local video clock at the last frame
    pub clock_skew_ms: i64,
    /// Human readable observations
    pub findings: Vec<String>,
}

impl SyncAssessment {
    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, DiagnosticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Grades sync reports against thresholds
#[derive(Debug, Clone, Default)]
pub struct SyncAnalyzer {
    thresholds: SyncThresholds,
}

impl SyncAnalyzer {
    /// Create new analyzer with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new analyzer with custom thresholds
    pub fn with_thresholds(thresholds: SyncThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &SyncThresholds {
        &self.thresholds
    }

    /// Analyze one report
    pub fn analyze(&self, report: &SyncReport) -> SyncAssessment {
        let video_drift = report.video_drift();
        let audio_drift = report.audio_drift();
        let video_drift_ratio = ratio(video_drift, report.expected_video_frames);
        let audio_drift_ratio = ratio(audio_drift, report.expected_audio_samples);
        let silence_ratio = if report.audio_sample_count == 0 {
            0.0
        } else {
            report.silence_unit_count as f64 / report.audio_sample_count as f64
        };

        let mut findings = Vec::new();
        let mut health = SyncHealth::Healthy;

        for (track, drift, drift_ratio) in [
            ("video", video_drift, video_drift_ratio),
            ("audio", audio_drift, audio_drift_ratio),
        ] {
            let grade = self.grade(drift_ratio);
            if grade != SyncHealth::Healthy {
                findings.push(format!(
                    "{} drift of {} units ({:.1}%)",
                    track,
                    drift,
                    drift_ratio * 100.0
                ));
            }
            health = health.max_severity(grade);
        }

        if report.video_frame_count == 0 && report.audio_sample_count > 0 {
            findings.push("audio without any video".to_string());
            health = SyncHealth::Broken;
        }
        if report.audio_chunk_count == 0 && report.video_frame_count > 0 {
            findings.push("no audio received".to_string());
        }
        if silence_ratio > self.thresholds.drifting_ratio {
            findings.push(format!(
                "{:.1}% of audio units are inserted silence",
                silence_ratio * 100.0
            ));
        }

        tracing::debug!(
            "Sync assessment: {:?} (video drift {}, audio drift {})",
            health,
            video_drift,
            audio_drift
        );

        SyncAssessment {
            health,
            duration: format_duration_ms(report.last_video_remote_ms),
            video_drift,
            audio_drift,
            video_drift_ratio,
            audio_drift_ratio,
            silence_ratio,
            clock_skew_ms: report.clock_skew_ms(),
            findings,
        }
    }

    fn grade(&self, drift_ratio: f64) -> SyncHealth {
        let magnitude = drift_ratio.abs();
        if magnitude >= self.thresholds.broken_ratio {
            SyncHealth::Broken
        } else if magnitude >= self.thresholds.drifting_ratio {
            SyncHealth::Drifting
        } else {
            SyncHealth::Healthy
        }
    }
}

impl SyncHealth {
    fn severity(self) -> u8 {
        match self {
            SyncHealth::Healthy => 0,
            SyncHealth::Drifting => 1,
            SyncHealth::Broken => 2,
        }
    }

    fn max_severity(self, other: SyncHealth) -> SyncHealth {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

fn ratio(drift: i64, expected: u64) -> f64 {
    if expected == 0 {
        0.0
    } else {
        drift as f64 / expected as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(video: u64, expected_video: u64, audio: u64, expected_audio: u64) -> SyncReport {
        SyncReport {
            elapsed_secs: 10,
            fps: 30,
            audio_unit_ms: 125,
            video_frame_count: video,
            expected_video_frames: expected_video,
            audio_sample_count: audio,
            expected_audio_samples: expected_audio,
            silence_unit_count: 0,
            audio_chunk_count: audio,
            format_update_count: 1,
            video_stream_start_ms: Some(0),
            audio_stream_start_ms: Some(5),
            last_video_remote_ms: 10_000,
            last_video_local_ms: 10_020,
            pending_audio_bytes: 0,
        }
    }

    #[test]
    fn test_healthy_session() {
        let assessment = SyncAnalyzer::new().analyze(&report(301, 300, 80, 80));
        assert_eq!(assessment.health, SyncHealth::Healthy);
        assert_eq!(assessment.duration, "00:00:10.000");
        assert_eq!(assessment.clock_skew_ms, -20);
        assert!(assessment.findings.is_empty());
    }

    #[test]
    fn test_drifting_and_broken() {
        let analyzer = SyncAnalyzer::new();
        assert_eq!(
            analyzer.analyze(&report(270, 300, 80, 80)).health,
            SyncHealth::Drifting
        );
        assert_eq!(
            analyzer.analyze(&report(300, 300, 40, 80)).health,
            SyncHealth::Broken
        );
    }

    #[test]
    fn test_audio_without_video_is_broken() {
        let assessment = SyncAnalyzer::new().analyze(&report(0, 0, 10, 0));
        assert_eq!(assessment.health, SyncHealth::Broken);
        assert!(assessment
            .findings
            .iter()
            .any(|f| f == "audio without any video"));
    }

    #[test]
    fn test_assessment_json() {
        let json = SyncAnalyzer::new()
            .analyze(&report(300, 300, 80, 80))
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["health"], "healthy");
        assert_eq!(value["video_drift"], 0);
    }
}
