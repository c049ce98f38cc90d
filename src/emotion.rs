//! Keyword emotion classifier for the avatar's facial expression.
//!
//! Maps reply text to exactly one [`EmotionLabel`] by walking an ordered rule
//! table: the first rule with a cue contained in the lower-cased text wins.
//! Matching is plain substring containment, so the cue `"no"` also fires on
//! `"know"` or `"not"`. That behaviour is part of the contract.
//!
//! Two presets ship with the binary:
//!
//! - [`EmotionPreset::Festival`] — the full table, default `neutral`.
//! - [`EmotionPreset::Simple`] — a shorter table, default `happy`.
//!
//! Both can be replaced or tweaked through the `[emotion]` config section.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression shown by the avatar alongside a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Excited,
    Thinking,
    Concerned,
    Sad,
    Happy,
    Neutral,
}

impl EmotionLabel {
    /// Wire name of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excited => "excited",
            Self::Thinking => "thinking",
            Self::Concerned => "concerned",
            Self::Sad => "sad",
            Self::Happy => "happy",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the rule table: a label and the cues that trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionRule {
    pub label: EmotionLabel,
    pub cues: Vec<String>,
}

impl EmotionRule {
    /// Build a rule from static cue strings.
    pub fn new(label: EmotionLabel, cues: &[&str]) -> Self {
        Self {
            label,
            cues: cues.iter().map(|c| (*c).to_owned()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.cues.iter().any(|cue| lowered.contains(cue.as_str()))
    }
}

/// Built-in rule tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionPreset {
    /// Six-label table used by the festival food bot.
    #[default]
    Festival,
    /// Three-label table; unmatched text is `happy`.
    Simple,
}

// ── Preset tables ───────────────────────────────────────────────────────

const FESTIVAL_TABLE: &[(EmotionLabel, &[&str])] = &[
    (
        EmotionLabel::Excited,
        &[
            "delicious",
            "yummy",
            "tasty",
            "sweet",
            "amazing",
            "love",
            "!",
            "celebrate",
            "festival",
            "pongal",
        ],
    ),
    (
        EmotionLabel::Thinking,
        &[
            "made with",
            "prepared",
            "ingredients",
            "recipe",
            "how",
            "traditional",
            "cultural",
        ],
    ),
    (
        EmotionLabel::Concerned,
        &["to be confirmed", "maybe", "uncertain", "check"],
    ),
    (
        EmotionLabel::Sad,
        &["sorry", "not available", "don't have", "unfortunately", "no"],
    ),
    (
        EmotionLabel::Happy,
        &["hello", "hi", "welcome", "yes", "available", "sure"],
    ),
];

const SIMPLE_TABLE: &[(EmotionLabel, &[&str])] = &[
    (
        EmotionLabel::Excited,
        &["delicious", "amazing", "love", "!"],
    ),
    (
        EmotionLabel::Thinking,
        &["made with", "prepared", "ingredients", "how"],
    ),
    (
        EmotionLabel::Sad,
        &["sorry", "not available", "unfortunately"],
    ),
];

impl EmotionPreset {
    /// Rules of this preset in priority order.
    pub fn rules(self) -> Vec<EmotionRule> {
        let table = match self {
            Self::Festival => FESTIVAL_TABLE,
            Self::Simple => SIMPLE_TABLE,
        };
        table
            .iter()
            .map(|&(label, cues)| EmotionRule::new(label, cues))
            .collect()
    }

    /// Label returned when no rule fires.
    pub fn default_label(self) -> EmotionLabel {
        match self {
            Self::Festival => EmotionLabel::Neutral,
            Self::Simple => EmotionLabel::Happy,
        }
    }
}

/// Ordered rule table plus fallback label.
///
/// Immutable once built and safe to share across concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionTable {
    rules: Vec<EmotionRule>,
    default: EmotionLabel,
}

impl Default for EmotionTable {
    fn default() -> Self {
        Self::from_preset(EmotionPreset::default())
    }
}

impl EmotionTable {
    /// Create a table from explicit rules (highest priority first).
    ///
    /// Cues are lower-cased here so matching only has to fold the input.
    pub fn new(rules: Vec<EmotionRule>, default: EmotionLabel) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| EmotionRule {
                label: rule.label,
                cues: rule.cues.iter().map(|c| c.to_lowercase()).collect(),
            })
            .collect();
        Self { rules, default }
    }

    /// Create a table from one of the built-in presets.
    pub fn from_preset(preset: EmotionPreset) -> Self {
        Self::new(preset.rules(), preset.default_label())
    }

    /// Rules in priority order.
    pub fn rules(&self) -> &[EmotionRule] {
        &self.rules
    }

    /// Fallback label.
    pub fn default_label(&self) -> EmotionLabel {
        self.default
    }

    /// Classify reply text. Total: every input yields exactly one label.
    pub fn classify(&self, text: &str) -> EmotionLabel {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.label)
            .unwrap_or(self.default)
    }
}

/// Classify with the festival table.
pub fn classify(text: &str) -> EmotionLabel {
    EmotionTable::default().classify(text)
}

// ── Tests ───────────────────────────────────────────────────────────────
