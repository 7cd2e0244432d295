//! Performance monitoring.
//!
//! A bounded ring of per-request samples plus cumulative totals. RTF is
//! generation wall time divided by produced audio duration; below 1.0 means
//! faster than real time.

use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    path::Path,
    sync::Mutex,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crate::audio::AudioFormat;

/// Ring capacity; old samples fall off the back.
const RING_CAPACITY: usize = 1_000;

/// One synthesis observation.
#[derive(Debug, Clone, Serialize)]
pub struct PerfSample {
    /// Seconds since the epoch at record time.
    pub timestamp: u64,
    pub rtf: f64,
    pub latency_ms: f64,
    pub audio_duration: f64,
    pub cache_hit: bool,
    pub voice: String,
    pub text_length: usize,
    pub format: AudioFormat,
    pub speed: f32,
    #[serde(skip)]
    recorded: Instant,
}

impl PerfSample {
    pub fn new(
        rtf: f64,
        latency_ms: f64,
        audio_duration: f64,
        cache_hit: bool,
        voice: &str,
        text_length: usize,
        format: AudioFormat,
        speed: f32,
    ) -> Self {
        Self {
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
            rtf,
            latency_ms,
            audio_duration,
            cache_hit,
            voice: voice.to_string(),
            text_length,
            format,
            speed,
            recorded: Instant::now(),
        }
    }
}

/// Aggregate view over the ring and lifetime counters.
#[derive(Debug, Clone, Serialize, Default)]
pub struct PerfSummary {
    pub total_requests: u64,
    pub total_cache_hits: u64,
    pub total_audio_seconds: f64,
    pub cache_hit_rate_percent: f64,
    /// Rolling mean RTF over non-cache-hit samples in the ring.
    pub avg_rtf: f64,
    pub avg_latency_ms: f64,
    pub per_voice: HashMap<String, VoiceStats>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct VoiceStats {
    pub requests: u64,
    pub avg_rtf: f64,
    pub avg_latency_ms: f64,
}

struct Inner {
    ring: VecDeque<PerfSample>,
    total_requests: u64,
    total_cache_hits: u64,
    total_audio_seconds: f64,
}

/// Thread-safe monitor; the critical section only touches counters.
pub struct PerformanceMonitor {
    inner: Mutex<Inner>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(RING_CAPACITY),
                total_requests: 0,
                total_cache_hits: 0,
                total_audio_seconds: 0.0,
            }),
        }
    }

    pub fn record(&self, sample: PerfSample) {
        let mut inner = self.inner.lock().expect("perf monitor lock poisoned");
        inner.total_requests += 1;
        if sample.cache_hit {
            inner.total_cache_hits += 1;
        }
        inner.total_audio_seconds += sample.audio_duration;
        if inner.ring.len() == RING_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(sample);
    }

    pub fn summary(&self) -> PerfSummary {
        let inner = self.inner.lock().expect("perf monitor lock poisoned");

        let mut summary = PerfSummary {
            total_requests: inner.total_requests,
            total_cache_hits: inner.total_cache_hits,
            total_audio_seconds: inner.total_audio_seconds,
            cache_hit_rate_percent: if inner.total_requests == 0 {
                0.0
            } else {
                inner.total_cache_hits as f64 / inner.total_requests as f64 * 100.0
            },
            ..Default::default()
        };

        let generated: Vec<&PerfSample> = inner.ring.iter().filter(|s| !s.cache_hit).collect();
        if !generated.is_empty() {
            summary.avg_rtf =
                generated.iter().map(|s| s.rtf).sum::<f64>() / generated.len() as f64;
        }
        if !inner.ring.is_empty() {
            summary.avg_latency_ms =
                inner.ring.iter().map(|s| s.latency_ms).sum::<f64>() / inner.ring.len() as f64;
        }

        let mut per_voice: HashMap<String, (u64, f64, f64, u64)> = HashMap::new();
        for s in inner.ring.iter() {
            let slot = per_voice.entry(s.voice.clone()).or_default();
            slot.0 += 1;
            slot.2 += s.latency_ms;
            if !s.cache_hit {
                slot.1 += s.rtf;
                slot.3 += 1;
            }
        }
        summary.per_voice = per_voice
            .into_iter()
            .map(|(voice, (requests, rtf_sum, latency_sum, generated))| {
                (
                    voice,
                    VoiceStats {
                        requests,
                        avg_rtf: if generated == 0 { 0.0 } else { rtf_sum / generated as f64 },
                        avg_latency_ms: latency_sum / requests as f64,
                    },
                )
            })
            .collect();

        summary
    }

    /// Mean RTF over generated samples recorded within the trailing window.
    pub fn rtf_trend(&self, window: Duration) -> Option<f64> {
        let inner = self.inner.lock().expect("perf monitor lock poisoned");
        let recent: Vec<f64> = inner
            .ring
            .iter()
            .filter(|s| !s.cache_hit && s.recorded.elapsed() <= window)
            .map(|s| s.rtf)
            .collect();
        if recent.is_empty() {
            None
        } else {
            Some(recent.iter().sum::<f64>() / recent.len() as f64)
        }
    }

    /// Append the current ring as JSON lines to `path`.
    pub fn export_json(&self, path: &Path) -> std::io::Result<usize> {
        let inner = self.inner.lock().expect("perf monitor lock poisoned");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        for sample in inner.ring.iter() {
            let line = serde_json::to_string(sample)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{line}")?;
        }
        Ok(inner.ring.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(voice: &str, rtf: f64, cache_hit: bool) -> PerfSample {
        PerfSample::new(rtf, 120.0, 2.0, cache_hit, voice, 40, AudioFormat::Mp3, 1.0)
    }

    #[test]
    fn totals_and_hit_rate() {
        let monitor = PerformanceMonitor::new();
        monitor.record(sample("af_heart", 0.4, false));
        monitor.record(sample("af_heart", 0.0, true));
        monitor.record(sample("am_puck", 0.6, false));

        let s = monitor.summary();
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.total_cache_hits, 1);
        assert!((s.cache_hit_rate_percent - 100.0 / 3.0).abs() < 1e-9);
        assert!((s.avg_rtf - 0.5).abs() < 1e-9);
    }

    #[test]
    fn per_voice_breakdown() {
        let monitor = PerformanceMonitor::new();
        monitor.record(sample("af_heart", 0.4, false));
        monitor.record(sample("am_puck", 0.8, false));

        let s = monitor.summary();
        assert_eq!(s.per_voice.len(), 2);
        assert!((s.per_voice["af_heart"].avg_rtf - 0.4).abs() < 1e-9);
        assert!((s.per_voice["am_puck"].avg_rtf - 0.8).abs() < 1e-9);
    }

    #[test]
    fn ring_is_bounded() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..(RING_CAPACITY + 50) {
            monitor.record(sample("af_heart", 0.3, false));
        }
        let s = monitor.summary();
        assert_eq!(s.total_requests, (RING_CAPACITY + 50) as u64);
        // Averages draw from at most RING_CAPACITY samples.
        assert!((s.avg_rtf - 0.3).abs() < 1e-9);
    }

    #[test]
    fn trend_over_recent_window() {
        let monitor = PerformanceMonitor::new();
        assert!(monitor.rtf_trend(Duration::from_secs(300)).is_none());
        monitor.record(sample("af_heart", 0.5, false));
        let trend = monitor.rtf_trend(Duration::from_secs(300)).expect("trend");
        assert!((trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn export_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("perf.jsonl");
        let monitor = PerformanceMonitor::new();
        monitor.record(sample("af_heart", 0.4, false));
        let written = monitor.export_json(&path).expect("export");
        assert_eq!(written, 1);
        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.contains("af_heart"));
    }
}
