//! Cache warming.
//!
//! A background worker that synthesizes high-frequency phrases while the
//! server is idle, so the first "Hello" of the day comes out of the cache.
//! Warming never competes with live traffic: the worker only runs after
//! `idle_threshold_seconds` of request silence, and its enqueues never
//! block the request path.

use std::{
    collections::{BinaryHeap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, CacheKey};
use crate::config::PreloaderConfig;
use crate::synth::{SynthesisRequest, Synthesizer};

/// Single words warmed first (priority 1).
const INSTANT_WORDS: &[&str] = &[
    "Hi", "Hello", "Hey", "Yes", "No", "Okay", "Thanks", "Please", "Sorry",
    "Excuse me", "Welcome", "Goodbye", "Bye",
];

/// Short phrases (priority 2).
const COMMON_PHRASES: &[&str] = &[
    "Thank you", "You're welcome", "How are you?", "I'm fine",
    "Nice to meet you", "See you later", "Have a good day", "What's up?",
    "Not much", "How's it going?", "Pretty good", "Take care",
    "Talk to you later", "Catch you later",
];

/// Conversation starters (priority 3).
const CONVERSATION_STARTERS: &[&str] = &[
    "How can I help you?", "What can I do for you?", "How may I assist you?",
    "Is there anything I can help you with?", "What would you like to know?",
    "How are you doing today?", "I'm here to help",
    "Let me know if you need anything",
];

/// Assistant acknowledgements (priority 3).
const SYSTEM_RESPONSES: &[&str] = &[
    "I understand", "That makes sense", "I see", "Got it",
    "Let me think about that", "That's interesting", "I agree", "You're right",
    "That's a good point", "Absolutely",
];

/// Requests of the same phrase before it earns a dynamic warming slot.
const DYNAMIC_WARM_THRESHOLD: u64 = 3;
/// Dynamic warming only covers short phrases; long texts rarely repeat.
const DYNAMIC_WARM_MAX_CHARS: usize = 80;

/// One queued warming job.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WarmingTask {
    text: String,
    voice: String,
    /// 1 = warmed first, 5 = last.
    priority: u8,
    seq: u64,
    attempts: u32,
    max_attempts: u32,
}

impl Ord for WarmingTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; lowest priority number and earliest
        // sequence must compare greatest.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for WarmingTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Counters exposed on the stats surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmingStats {
    pub total_warmed: u64,
    pub cache_hits_from_warming: u64,
    pub warming_seconds_spent: f64,
    pub queue_size: usize,
    pub is_warming: bool,
    pub top_phrases: Vec<(String, u64)>,
    pub voice_usage: HashMap<String, u64>,
}

struct Shared {
    config: PreloaderConfig,
    synth: Arc<Synthesizer>,
    queue: Mutex<BinaryHeap<WarmingTask>>,
    warmed: Mutex<HashSet<CacheKey>>,
    last_request: Mutex<Instant>,
    seq: Mutex<u64>,
    is_warming: AtomicBool,
    stop: AtomicBool,
    total_warmed: Mutex<u64>,
    warming_seconds: Mutex<f64>,
    warmed_hits: Mutex<u64>,
    phrase_usage: Mutex<HashMap<String, u64>>,
    voice_usage: Mutex<HashMap<String, u64>>,
}

/// The cache warmer. Owns a background worker thread once started.
pub struct Preloader {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Preloader {
    pub fn new(config: PreloaderConfig, synth: Arc<Synthesizer>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                synth,
                queue: Mutex::new(BinaryHeap::new()),
                warmed: Mutex::new(HashSet::new()),
                last_request: Mutex::new(Instant::now()),
                seq: Mutex::new(0),
                is_warming: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                total_warmed: Mutex::new(0),
                warming_seconds: Mutex::new(0.0),
                warmed_hits: Mutex::new(0),
                phrase_usage: Mutex::new(HashMap::new()),
                voice_usage: Mutex::new(HashMap::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Queue the startup buckets and launch the worker thread.
    /// Warming stays dormant unless `warm_on_startup` was opted into.
    pub fn start(&self) {
        if !self.shared.config.warm_on_startup {
            info!("cache warming disabled (warm_on_startup = false)");
            return;
        }
        let mut worker = self.worker.lock().expect("preloader worker lock poisoned");
        if worker.is_some() {
            warn!("preloader already running");
            return;
        }

        self.schedule_startup_tasks();
        let shared = self.shared.clone();
        *worker = Some(std::thread::spawn(move || warming_worker(shared)));
        info!("cache warmer started");
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().expect("preloader worker lock poisoned").take() {
            let _ = handle.join();
        }
    }

    /// Production-request observation hook: refreshes the idle clock,
    /// counts usage, attributes warmed-cache hits, and promotes phrases
    /// that keep recurring into the dynamic warming bucket.
    pub fn on_request_received(&self, text: &str, voice: &str) {
        *self.shared.last_request.lock().expect("preloader clock lock poisoned") = Instant::now();

        let uses = {
            let mut phrases =
                self.shared.phrase_usage.lock().expect("preloader usage lock poisoned");
            let slot = phrases.entry(text.to_string()).or_insert(0);
            *slot += 1;
            *slot
        };
        if uses == DYNAMIC_WARM_THRESHOLD && text.chars().count() <= DYNAMIC_WARM_MAX_CHARS {
            self.add_dynamic_task(text, voice, 4);
        }
        {
            let mut voices =
                self.shared.voice_usage.lock().expect("preloader usage lock poisoned");
            *voices.entry(voice.to_string()).or_insert(0) += 1;
        }

        let key = self.shared.warm_key(text, voice);
        if self.shared.warmed.lock().expect("preloader warmed lock poisoned").contains(&key) {
            *self.shared.warmed_hits.lock().expect("preloader hits lock poisoned") += 1;
            let preview: String = text.chars().take(30).collect();
            debug!(text = %preview, "cache hit attributable to warming");
        }
    }

    /// Queue a usage-driven warming task (priorities 4–5).
    pub fn add_dynamic_task(&self, text: &str, voice: &str, priority: u8) {
        let key = self.shared.warm_key(text, voice);
        if self.shared.warmed.lock().expect("preloader warmed lock poisoned").contains(&key) {
            return;
        }
        let mut queue = self.shared.queue.lock().expect("preloader queue lock poisoned");
        if queue.iter().any(|t| t.text == text && t.voice == voice) {
            return;
        }
        let task = self.shared.task(text, voice, priority.clamp(1, 5));
        queue.push(task);
        debug!(text, voice, priority, "dynamic warming task queued");
    }

    pub fn stats(&self) -> WarmingStats {
        let phrases = self.shared.phrase_usage.lock().expect("preloader usage lock poisoned");
        let mut top: Vec<(String, u64)> =
            phrases.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(10);

        WarmingStats {
            total_warmed: *self.shared.total_warmed.lock().expect("lock poisoned"),
            cache_hits_from_warming: *self.shared.warmed_hits.lock().expect("lock poisoned"),
            warming_seconds_spent: *self.shared.warming_seconds.lock().expect("lock poisoned"),
            queue_size: self.shared.queue.lock().expect("lock poisoned").len(),
            is_warming: self.shared.is_warming.load(Ordering::SeqCst),
            top_phrases: top,
            voice_usage: self
                .shared
                .voice_usage
                .lock()
                .expect("lock poisoned")
                .clone(),
        }
    }

    fn schedule_startup_tasks(&self) {
        let mut queue = self.shared.queue.lock().expect("preloader queue lock poisoned");
        let voices = self.shared.config.primary_voices.clone();
        for voice in &voices {
            for word in INSTANT_WORDS {
                queue.push(self.shared.task(word, voice, 1));
            }
            for phrase in COMMON_PHRASES {
                queue.push(self.shared.task(phrase, voice, 2));
            }
            for text in CONVERSATION_STARTERS.iter().chain(SYSTEM_RESPONSES) {
                queue.push(self.shared.task(text, voice, 3));
            }
        }
        info!(tasks = queue.len(), "startup warming tasks scheduled");
    }
}

impl Shared {
    fn task(&self, text: &str, voice: &str, priority: u8) -> WarmingTask {
        let mut seq = self.seq.lock().expect("preloader seq lock poisoned");
        *seq += 1;
        WarmingTask {
            text: text.to_string(),
            voice: voice.to_string(),
            priority,
            seq: *seq,
            attempts: 0,
            max_attempts: 3,
        }
    }

    fn warm_key(&self, text: &str, voice: &str) -> CacheKey {
        // Warming always runs at speed 1.0 in the default format.
        cache_key(text, voice, 1.0, crate::audio::AudioFormat::default())
    }

    fn idle(&self) -> bool {
        self.last_request.lock().expect("preloader clock lock poisoned").elapsed()
            >= Duration::from_secs_f64(self.config.idle_threshold_seconds.max(0.0))
    }

    fn pop_batch(&self) -> Vec<WarmingTask> {
        let mut queue = self.queue.lock().expect("preloader queue lock poisoned");
        let count = self.config.warming_batch_size.max(1).min(queue.len());
        (0..count).filter_map(|_| queue.pop()).collect()
    }
}

fn warming_worker(shared: Arc<Shared>) {
    info!("cache warming worker running");
    while !shared.stop.load(Ordering::SeqCst) {
        if shared.is_warming.load(Ordering::SeqCst) || !shared.idle() {
            std::thread::sleep(Duration::from_secs(1));
            continue;
        }

        let batch = shared.pop_batch();
        if batch.is_empty() {
            std::thread::sleep(Duration::from_secs(2));
            continue;
        }

        shared.is_warming.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let mut warmed = 0usize;

        for mut task in batch {
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
            let key = shared.warm_key(&task.text, &task.voice);
            if shared.warmed.lock().expect("preloader warmed lock poisoned").contains(&key) {
                continue;
            }

            let request = SynthesisRequest {
                text: task.text.clone(),
                voice: task.voice.clone(),
                format: crate::audio::AudioFormat::default(),
                speed: 1.0,
            };
            match shared.synth.synthesize(&request) {
                Ok(_) => {
                    shared.warmed.lock().expect("preloader warmed lock poisoned").insert(key);
                    *shared.total_warmed.lock().expect("lock poisoned") += 1;
                    warmed += 1;
                }
                Err(e) => {
                    // Never surfaced to users; retried until attempts run out.
                    warn!(text = %task.text, voice = %task.voice, error = %e, "warming failed");
                    task.attempts += 1;
                    if task.attempts < task.max_attempts {
                        shared
                            .queue
                            .lock()
                            .expect("preloader queue lock poisoned")
                            .push(task);
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        *shared.warming_seconds.lock().expect("lock poisoned") += elapsed;
        shared.is_warming.store(false, Ordering::SeqCst);
        debug!(warmed, elapsed_s = elapsed, "warming batch complete");
    }
    info!("cache warming worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_pops_instant_words_first() {
        let mut heap = BinaryHeap::new();
        let mk = |text: &str, priority: u8, seq: u64| WarmingTask {
            text: text.into(),
            voice: "af_heart".into(),
            priority,
            seq,
            attempts: 0,
            max_attempts: 3,
        };
        heap.push(mk("starter", 3, 1));
        heap.push(mk("hello", 1, 2));
        heap.push(mk("phrase", 2, 3));
        heap.push(mk("hi", 1, 4));

        assert_eq!(heap.pop().unwrap().text, "hello");
        assert_eq!(heap.pop().unwrap().text, "hi");
        assert_eq!(heap.pop().unwrap().text, "phrase");
        assert_eq!(heap.pop().unwrap().text, "starter");
    }

    #[test]
    fn same_priority_is_fifo() {
        let mut heap = BinaryHeap::new();
        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            heap.push(WarmingTask {
                text: (*text).into(),
                voice: "v".into(),
                priority: 2,
                seq: i as u64,
                attempts: 0,
                max_attempts: 3,
            });
        }
        assert_eq!(heap.pop().unwrap().text, "first");
        assert_eq!(heap.pop().unwrap().text, "second");
        assert_eq!(heap.pop().unwrap().text, "third");
    }

    #[test]
    fn phrase_buckets_are_nonempty() {
        assert!(!INSTANT_WORDS.is_empty());
        assert!(!COMMON_PHRASES.is_empty());
        assert!(!CONVERSATION_STARTERS.is_empty());
        assert!(!SYSTEM_RESPONSES.is_empty());
    }
}
