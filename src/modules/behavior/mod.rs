//! Human-like pacing primitives.
//!
//! Bounded random delays, per-character typing cadence, reading-time
//! estimation, and segment-based video-watch plans. All randomized branches
//! run through one seedable `StdRng` and probability knobs in
//! [`BehaviorConfig`], so tests can pin or disable any of them.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Probability and scaling knobs for the pacing generators.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// Average typing speed used as the per-character baseline.
    pub words_per_minute: f64,
    /// Per-character random perturbation, as a fraction (0.4 = ±40%).
    pub typing_jitter: f64,
    /// Chance of a 3x "thinking" pause on any keystroke.
    pub thinking_chance: f64,
    /// Chance of an extra-long pause appended to a human delay.
    pub distraction_chance: f64,
    /// Chance of an extra pause attached to a watch segment.
    pub segment_pause_chance: f64,
    /// Scales every produced duration; 0.0 collapses all waits for tests.
    pub time_dilation: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 40.0,
            typing_jitter: 0.4,
            thinking_chance: 0.05,
            distraction_chance: 0.1,
            segment_pause_chance: 0.15,
            time_dilation: 1.0,
        }
    }
}

/// What the simulated viewer does during one 10-second segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchAction {
    Watch,
    Pause,
    Seek,
    VolumeChange,
    FullscreenToggle,
}

// Weighted so plain watching dominates.
const WATCH_ACTIONS: &[WatchAction] = &[
    WatchAction::Watch,
    WatchAction::Watch,
    WatchAction::Watch,
    WatchAction::Watch,
    WatchAction::Watch,
    WatchAction::Pause,
    WatchAction::Seek,
    WatchAction::VolumeChange,
    WatchAction::FullscreenToggle,
];

/// One segment of a watch plan; `start`/`end` are offsets in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct WatchSegment {
    pub start: u64,
    pub end: u64,
    pub action: WatchAction,
    pub extra_pause: Option<Duration>,
}

/// One keystroke of a typing plan.
#[derive(Debug, Clone)]
pub struct Keystroke {
    pub ch: char,
    pub delay: Duration,
}

/// Pure per-character cadence multiplier: spaces, sentence punctuation,
/// capitals, and digits all slow a typist down by a fixed factor.
pub fn char_multiplier(ch: char) -> f64 {
    let mut multiplier = 1.0;
    if ch == ' ' {
        multiplier *= 1.5;
    }
    if matches!(ch, '.' | '!' | '?') {
        multiplier *= 3.0;
    }
    if ch.is_ascii_uppercase() {
        multiplier *= 1.2;
    }
    if ch.is_ascii_digit() {
        multiplier *= 1.1;
    }
    multiplier
}

/// Generates human-like pacing from a seedable random source.
#[derive(Debug)]
pub struct BehaviorSimulator {
    config: BehaviorConfig,
    rng: StdRng,
}

impl BehaviorSimulator {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(config: BehaviorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Bounded random delay with an occasional extra-long distraction pause.
    pub fn human_delay(&mut self, min: Duration, max: Duration) -> Duration {
        let lo = min.min(max).as_millis() as u64;
        let hi = max.max(min).as_millis() as u64;
        let base = if lo >= hi {
            Duration::from_millis(lo)
        } else {
            Duration::from_millis(self.rng.gen_range(lo..hi))
        };
        let distraction = if self.rng.gen_bool(self.config.distraction_chance.clamp(0.0, 1.0)) {
            Duration::from_millis(self.rng.gen_range(0..2000))
        } else {
            Duration::ZERO
        };
        self.dilate(base + distraction)
    }

    /// Per-character delays for `text`, scaled by the WPM baseline, the
    /// character-class multiplier, jitter, and an occasional thinking pause.
    pub fn typing_pattern(&mut self, text: &str) -> Vec<Keystroke> {
        // WPM to ms per character, assuming 5-character words.
        let base_ms = 60_000.0 / (self.config.words_per_minute * 5.0);
        let jitter = self.config.typing_jitter.clamp(0.0, 1.0);

        text.chars()
            .map(|ch| {
                let mut delay = base_ms * char_multiplier(ch);
                if jitter > 0.0 {
                    delay *= self.rng.gen_range(1.0 - jitter..1.0 + jitter);
                }
                if self.rng.gen_bool(self.config.thinking_chance.clamp(0.0, 1.0)) {
                    delay *= 3.0;
                }
                Keystroke {
                    ch,
                    delay: self.dilate(Duration::from_millis(delay.round() as u64)),
                }
            })
            .collect()
    }

    /// Reading-time estimate for a body of text: WPM-based with ±30%
    /// variation and a one-second floor.
    pub fn reading_time(&mut self, text: &str, words_per_minute: f64) -> Duration {
        let words = text.split_whitespace().count().max(1) as f64;
        let base_ms = words / words_per_minute * 60_000.0;
        let variation = base_ms * 0.3 * (self.rng.gen_range(0.0..1.0) - 0.5);
        let total = (base_ms + variation).max(1000.0);
        self.dilate(Duration::from_millis(total as u64))
    }

    /// Divide `duration_secs` into 10-second segments, each tagged with a
    /// weighted random action and possibly an extra pause of up to 5 s.
    pub fn watch_plan(&mut self, duration_secs: u64) -> Vec<WatchSegment> {
        let mut plan = Vec::new();
        let mut start = 0u64;
        while start < duration_secs {
            let end = (start + 10).min(duration_secs);
            let extra_pause = if self
                .rng
                .gen_bool(self.config.segment_pause_chance.clamp(0.0, 1.0))
            {
                let pause_ms = self.rng.gen_range(0..5000);
                Some(self.dilate(Duration::from_millis(pause_ms)))
            } else {
                None
            };
            plan.push(WatchSegment {
                start,
                end,
                action: *WATCH_ACTIONS.choose(&mut self.rng).expect("action table"),
                extra_pause,
            });
            start = end;
        }
        plan
    }

    /// Scale a segment's watch time; honors `time_dilation`.
    pub fn segment_watch_time(&self, segment: &WatchSegment) -> Duration {
        self.dilate(Duration::from_secs(segment.end - segment.start))
    }

    fn dilate(&self, duration: Duration) -> Duration {
        duration.mul_f64(self.config.time_dilation.max(0.0))
    }
}

impl Default for BehaviorSimulator {
    fn default() -> Self {
        Self::new(BehaviorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> BehaviorConfig {
        BehaviorConfig {
            typing_jitter: 0.0,
            thinking_chance: 0.0,
            distraction_chance: 0.0,
            segment_pause_chance: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn punctuation_slows_typing_more_than_capitals() {
        assert!(char_multiplier('!') > char_multiplier('H'));
        assert_eq!(char_multiplier(' '), 1.5);
        assert_eq!(char_multiplier('a'), 1.0);
    }

    #[test]
    fn typing_pattern_covers_every_character() {
        let mut sim = BehaviorSimulator::with_seed(deterministic(), 1);
        let pattern = sim.typing_pattern("Hi!");
        assert_eq!(pattern.len(), 3);
        // With jitter and thinking disabled the cadence is exactly the
        // class multiplier, so '!' must outlast 'H'.
        assert!(pattern[2].delay > pattern[0].delay);
    }

    #[test]
    fn watch_plan_segments_align_to_duration() {
        let mut sim = BehaviorSimulator::with_seed(deterministic(), 2);
        let plan = sim.watch_plan(25);
        assert_eq!(plan.len(), 3);
        let ends: Vec<u64> = plan.iter().map(|s| s.end).collect();
        assert_eq!(ends, vec![10, 20, 25]);
        assert_eq!(plan[0].start, 0);
        assert_eq!(plan[2].start, 20);
    }

    #[test]
    fn forced_segment_pause_branch() {
        let config = BehaviorConfig {
            segment_pause_chance: 1.0,
            ..deterministic()
        };
        let mut sim = BehaviorSimulator::with_seed(config, 3);
        let plan = sim.watch_plan(30);
        assert!(plan.iter().all(|s| s.extra_pause.is_some()));
        assert!(plan
            .iter()
            .all(|s| s.extra_pause.unwrap() < Duration::from_secs(5)));
    }

    #[test]
    fn human_delay_stays_in_bounds_without_distraction() {
        let mut sim = BehaviorSimulator::with_seed(deterministic(), 4);
        for _ in 0..100 {
            let delay = sim.human_delay(Duration::from_millis(500), Duration::from_millis(2000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay < Duration::from_millis(2000));
        }
    }

    #[test]
    fn time_dilation_collapses_waits() {
        let config = BehaviorConfig {
            time_dilation: 0.0,
            ..Default::default()
        };
        let mut sim = BehaviorSimulator::with_seed(config, 5);
        assert_eq!(
            sim.human_delay(Duration::from_secs(1), Duration::from_secs(2)),
            Duration::ZERO
        );
        let plan = sim.watch_plan(25);
        assert!(plan
            .iter()
            .all(|s| sim.segment_watch_time(s) == Duration::ZERO));
    }

    #[test]
    fn reading_time_has_floor() {
        let mut sim = BehaviorSimulator::with_seed(deterministic(), 6);
        let time = sim.reading_time("hi", 200.0);
        assert!(time >= Duration::from_secs(1));
    }
}
