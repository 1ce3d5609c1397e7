//! Splits a raw job description into candidate responsibility segments.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?\n]+").unwrap());

/// Verbs that mark a sentence as a responsibility statement.
pub const DEFAULT_RESPONSIBILITY_VERBS: &[&str] = &[
    "develop",
    "manage",
    "create",
    "implement",
    "design",
    "coordinate",
    "lead",
    "supervise",
    "analyze",
    "maintain",
    "ensure",
    "provide",
    "support",
    "review",
    "prepare",
    "conduct",
    "monitor",
    "plan",
    "organize",
    "direct",
    "control",
    "evaluate",
    "establish",
    "perform",
];

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Segments shorter than this after trimming are dropped.
    pub min_chars: usize,
    /// Hard cap on the number of segments handed to the matcher.
    pub max_segments: usize,
    /// Responsibility vocabulary, matched case-insensitively as substrings.
    pub verbs: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_chars: 10,
            max_segments: 20,
            verbs: DEFAULT_RESPONSIBILITY_VERBS
                .iter()
                .map(|verb| verb.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Extracts an ordered, de-duplicated list of responsibility-like
    /// segments, capped at `max_segments`.
    ///
    /// A segment is kept when it contains a responsibility verb, or when
    /// it starts with an uppercase letter or a bullet marker. When that
    /// filter keeps nothing, every non-trivial segment is kept instead,
    /// so a non-trivial description always produces at least one segment.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let sentences: Vec<&str> = SENTENCE_SPLIT.split(text).collect();

        let mut segments = Vec::new();
        let mut seen = HashSet::new();

        for raw in &sentences {
            let sentence = raw.trim();
            if sentence.chars().count() < self.config.min_chars {
                continue;
            }

            let lowered = sentence.to_lowercase();
            if self.config.verbs.iter().any(|verb| lowered.contains(verb.as_str())) {
                push_unique(&mut segments, &mut seen, sentence.to_string());
            } else if starts_like_duty(sentence) {
                push_unique(&mut segments, &mut seen, strip_bullet(sentence));
            }
        }

        if segments.is_empty() {
            for raw in &sentences {
                let sentence = raw.trim();
                if sentence.chars().count() > self.config.min_chars {
                    push_unique(&mut segments, &mut seen, sentence.to_string());
                }
            }
        }

        segments.truncate(self.config.max_segments);
        segments
    }
}

fn push_unique(segments: &mut Vec<String>, seen: &mut HashSet<String>, segment: String) {
    if seen.insert(segment.clone()) {
        segments.push(segment);
    }
}

fn starts_like_duty(sentence: &str) -> bool {
    match sentence.chars().next() {
        Some(first) => first.is_uppercase() || first == '-' || first == '•',
        None => false,
    }
}

fn strip_bullet(sentence: &str) -> String {
    sentence.trim_start_matches(['-', '•', ' ']).to_string()
}
