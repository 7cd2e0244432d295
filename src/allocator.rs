//! Dynamic CPU allocation.
//!
//! Watches system CPU utilization and recommends inference thread counts:
//! sustained headroom below the low threshold raises the recommendation,
//! sustained pressure above the high threshold lowers it (when the thermal
//! guard permits). Changes are debounced by a cooldown and are advisory —
//! the orchestrator reads `recommended_threads()` before each synthesis.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::config::AllocatorConfig;

/// Consecutive out-of-band readings required before a change.
const SUSTAIN_READINGS: usize = 3;

/// Source of CPU utilization readings, pluggable for tests and platforms.
pub trait CpuSampler: Send + Sync {
    /// Current whole-system utilization in `[0, 1]`, or `None` when the
    /// platform offers no reading.
    fn utilization(&self) -> Option<f64>;
}

/// `/proc/stat`-backed sampler. Utilization is the busy share of the delta
/// between consecutive calls; the first call primes the baseline.
#[derive(Default)]
pub struct ProcStatSampler {
    last: Mutex<Option<(u64, u64)>>,
}

impl ProcStatSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_counters() -> Option<(u64, u64)> {
        let stat = std::fs::read_to_string("/proc/stat").ok()?;
        let line = stat.lines().next()?;
        let fields: Vec<u64> =
            line.split_whitespace().skip(1).filter_map(|f| f.parse().ok()).collect();
        if fields.len() < 4 {
            return None;
        }
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total: u64 = fields.iter().sum();
        Some((total - idle, total))
    }
}

impl CpuSampler for ProcStatSampler {
    fn utilization(&self) -> Option<f64> {
        let current = Self::read_counters()?;
        let mut last = self.last.lock().expect("sampler lock poisoned");
        let previous = last.replace(current);
        let (busy_now, total_now) = current;
        let (busy_then, total_then) = previous?;
        let total_delta = total_now.saturating_sub(total_then);
        if total_delta == 0 {
            return None;
        }
        Some(busy_now.saturating_sub(busy_then) as f64 / total_delta as f64)
    }
}

/// Fixed-value sampler for tests.
pub struct FixedSampler(pub f64);

impl CpuSampler for FixedSampler {
    fn utilization(&self) -> Option<f64> {
        Some(self.0)
    }
}

struct State {
    current_threads: usize,
    last_change: Instant,
    readings: VecDeque<f64>,
}

/// The allocator itself. One instance per process.
pub struct DynamicCpuAllocator {
    config: AllocatorConfig,
    max_cores: usize,
    sampler: Box<dyn CpuSampler>,
    /// When false, the high-utilization path never lowers threads.
    thermal_guard_open: std::sync::atomic::AtomicBool,
    state: Mutex<State>,
}

impl DynamicCpuAllocator {
    pub fn new(config: AllocatorConfig, sampler: Box<dyn CpuSampler>) -> Self {
        let detected = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let max_cores = if config.max_cores == 0 { detected } else { config.max_cores };
        let initial = (max_cores / 2).max(1);

        info!(max_cores, initial, "dynamic CPU allocator ready");
        Self {
            config,
            max_cores,
            sampler,
            thermal_guard_open: std::sync::atomic::AtomicBool::new(true),
            state: Mutex::new(State {
                current_threads: initial,
                last_change: Instant::now(),
                readings: VecDeque::with_capacity(SUSTAIN_READINGS),
            }),
        }
    }

    /// Platform-default allocator.
    pub fn with_defaults(config: AllocatorConfig) -> Self {
        Self::new(config, Box::new(ProcStatSampler::new()))
    }

    /// Advisory thread count for the next synthesis.
    pub fn recommended_threads(&self) -> usize {
        self.state.lock().expect("allocator lock poisoned").current_threads
    }

    /// Open or close the thermal guard (closed = never scale down).
    pub fn set_thermal_guard(&self, open: bool) {
        self.thermal_guard_open.store(open, std::sync::atomic::Ordering::Relaxed);
    }

    /// Take one utilization reading and adjust if the trend is sustained
    /// and the cooldown has elapsed. Call on a timer.
    pub fn observe(&self) {
        if !self.config.enabled {
            return;
        }
        let Some(utilization) = self.sampler.utilization() else {
            return;
        };

        let mut state = self.state.lock().expect("allocator lock poisoned");
        if state.readings.len() == SUSTAIN_READINGS {
            state.readings.pop_front();
        }
        state.readings.push_back(utilization);
        if state.readings.len() < SUSTAIN_READINGS {
            return;
        }

        let cooldown = Duration::from_secs_f64(self.config.allocation_cooldown.max(0.0));
        if state.last_change.elapsed() < cooldown {
            return;
        }

        let all_low = state.readings.iter().all(|&u| u < self.config.min_threshold);
        let all_high = state.readings.iter().all(|&u| u > self.config.max_threshold);

        if all_low && state.current_threads < self.max_cores {
            state.current_threads += 1;
            state.last_change = Instant::now();
            state.readings.clear();
            info!(threads = state.current_threads, utilization, "scaled inference threads up");
        } else if all_high
            && state.current_threads > 1
            && self.thermal_guard_open.load(std::sync::atomic::Ordering::Relaxed)
        {
            state.current_threads -= 1;
            state.last_change = Instant::now();
            state.readings.clear();
            info!(threads = state.current_threads, utilization, "scaled inference threads down");
        } else {
            debug!(utilization, threads = state.current_threads, "allocator steady");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(cooldown: f64) -> AllocatorConfig {
        AllocatorConfig {
            enabled: true,
            min_threshold: 0.25,
            max_threshold: 0.80,
            allocation_cooldown: cooldown,
            max_cores: 4,
        }
    }

    #[test]
    fn scales_up_on_sustained_headroom() {
        let alloc = DynamicCpuAllocator::new(test_config(0.0), Box::new(FixedSampler(0.05)));
        let before = alloc.recommended_threads();
        for _ in 0..SUSTAIN_READINGS {
            alloc.observe();
        }
        assert_eq!(alloc.recommended_threads(), before + 1);
    }

    #[test]
    fn scales_down_on_sustained_pressure() {
        let alloc = DynamicCpuAllocator::new(test_config(0.0), Box::new(FixedSampler(0.95)));
        let before = alloc.recommended_threads();
        for _ in 0..SUSTAIN_READINGS {
            alloc.observe();
        }
        assert_eq!(alloc.recommended_threads(), before.saturating_sub(1).max(1));
    }

    #[test]
    fn thermal_guard_blocks_scale_down() {
        let alloc = DynamicCpuAllocator::new(test_config(0.0), Box::new(FixedSampler(0.95)));
        alloc.set_thermal_guard(false);
        let before = alloc.recommended_threads();
        for _ in 0..SUSTAIN_READINGS * 2 {
            alloc.observe();
        }
        assert_eq!(alloc.recommended_threads(), before);
    }

    #[test]
    fn single_reading_does_not_move() {
        let alloc = DynamicCpuAllocator::new(test_config(0.0), Box::new(FixedSampler(0.05)));
        let before = alloc.recommended_threads();
        alloc.observe();
        assert_eq!(alloc.recommended_threads(), before);
    }

    #[test]
    fn cooldown_debounces() {
        let alloc = DynamicCpuAllocator::new(test_config(3600.0), Box::new(FixedSampler(0.05)));
        let before = alloc.recommended_threads();
        for _ in 0..SUSTAIN_READINGS * 3 {
            alloc.observe();
        }
        // Allocator was just constructed; the first cooldown has not elapsed.
        assert_eq!(alloc.recommended_threads(), before);
    }

    #[test]
    fn disabled_allocator_never_moves() {
        let mut config = test_config(0.0);
        config.enabled = false;
        let alloc = DynamicCpuAllocator::new(config, Box::new(FixedSampler(0.01)));
        let before = alloc.recommended_threads();
        for _ in 0..10 {
            alloc.observe();
        }
        assert_eq!(alloc.recommended_threads(), before);
    }

    #[test]
    fn capped_at_max_cores() {
        let alloc = DynamicCpuAllocator::new(test_config(0.0), Box::new(FixedSampler(0.01)));
        for _ in 0..50 {
            alloc.observe();
        }
        assert!(alloc.recommended_threads() <= 4);
    }
}
