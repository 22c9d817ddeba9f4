// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Timeline model: visemes, per-morph viseme sequences, weights and keyframes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Symbolic mouth shape for a vowel sound or silence.
///
/// Closed set; never extended at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Viseme {
    /// Silence / mouth closed. Always targets weight 0.
    Closed,
    /// "a" vowel. Its duration defines one timeline unit.
    A,
    /// "i" vowel.
    I,
    /// "u" vowel.
    U,
    /// "e" vowel.
    E,
    /// "o" vowel.
    O,
}

impl Viseme {
    /// All visemes in declaration order.
    pub const ALL: [Viseme; 6] = [
        Viseme::Closed,
        Viseme::A,
        Viseme::I,
        Viseme::U,
        Viseme::E,
        Viseme::O,
    ];

    /// Short lowercase name ("closed", "a", "i", ...).
    pub fn name(self) -> &'static str {
        match self {
            Viseme::Closed => "closed",
            Viseme::A => "a",
            Viseme::I => "i",
            Viseme::U => "u",
            Viseme::E => "e",
            Viseme::O => "o",
        }
    }
}

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default target weight per open viseme. `Closed` is pinned to 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VisemeWeights {
    /// Target weight for [`Viseme::A`].
    pub a: f32,
    /// Target weight for [`Viseme::I`].
    pub i: f32,
    /// Target weight for [`Viseme::U`].
    pub u: f32,
    /// Target weight for [`Viseme::E`].
    pub e: f32,
    /// Target weight for [`Viseme::O`].
    pub o: f32,
}

impl Default for VisemeWeights {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl VisemeWeights {
    /// Same target weight for every open viseme.
    pub fn uniform(weight: f32) -> Self {
        Self {
            a: weight,
            i: weight,
            u: weight,
            e: weight,
            o: weight,
        }
    }

    /// Target weight for `viseme`.
    pub fn target(&self, viseme: Viseme) -> f32 {
        match viseme {
            Viseme::Closed => 0.0,
            Viseme::A => self.a,
            Viseme::I => self.i,
            Viseme::U => self.u,
            Viseme::E => self.e,
            Viseme::O => self.o,
        }
    }
}

/// One step of a morph timeline: a viseme held for `units` timeline units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VisemeKey {
    /// Mouth shape reached at the start of this step.
    pub viseme: Viseme,
    /// Relative duration in units (1 unit = length of viseme A).
    pub units: f64,
    /// Authored target weight; falls back to [`VisemeWeights`] when absent.
    /// Ignored for [`Viseme::Closed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

impl VisemeKey {
    /// Key using the default weight for `viseme`.
    pub fn new(viseme: Viseme, units: f64) -> Self {
        Self {
            viseme,
            units,
            weight: None,
        }
    }

    /// Key with an explicit authored weight.
    pub fn weighted(viseme: Viseme, units: f64, weight: f32) -> Self {
        Self {
            viseme,
            units,
            weight: Some(weight),
        }
    }

    /// Resolved target weight for this key.
    pub fn target_weight(&self, defaults: &VisemeWeights) -> f32 {
        match self.viseme {
            Viseme::Closed => 0.0,
            v => self.weight.unwrap_or_else(|| defaults.target(v)),
        }
    }
}

/// Ordered viseme sequence for a single morph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    /// Steps in playback order.
    pub keys: Vec<VisemeKey>,
}

impl TimelineEntry {
    /// Empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step using the default viseme weight.
    pub fn push(&mut self, viseme: Viseme, units: f64) -> &mut Self {
        self.keys.push(VisemeKey::new(viseme, units));
        self
    }

    /// Total length of the entry in units.
    pub fn total_units(&self) -> f64 {
        self.keys.iter().map(|k| k.units).sum()
    }

    /// Whether the entry has no steps.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<VisemeKey> for TimelineEntry {
    fn from_iter<T: IntoIterator<Item = VisemeKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Morph name → timeline. Iterates sorted by morph name.
pub type MorphTimelineTable = BTreeMap<String, TimelineEntry>;

/// A morph name paired with a weight, as sent in weight snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MorphWeight {
    /// Morph (blend shape) name on the target model.
    pub morph: String,
    /// Weight to apply.
    pub weight: f32,
}

impl MorphWeight {
    /// Construct a morph weight.
    pub fn new(morph: impl Into<String>, weight: f32) -> Self {
        Self {
            morph: morph.into(),
            weight,
        }
    }

    /// False when the morph name is empty or whitespace only.
    pub fn is_valid(&self) -> bool {
        !self.morph.trim().is_empty()
    }
}

/// A concrete keyframe on a morph track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    /// Morph the keyframe belongs to.
    pub morph: String,
    /// Absolute frame number. May be negative if the caller scheduled
    /// before frame 0; hosts decide whether to clamp or reject.
    pub frame: i64,
    /// Weight held at this frame.
    pub weight: f32,
}

/// Inclusive frame interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FrameRange {
    /// First frame (inclusive).
    pub start: i64,
    /// Last frame (inclusive).
    pub end: i64,
}

impl FrameRange {
    /// Range covering both endpoints regardless of argument order.
    pub fn new(a: i64, b: i64) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Whether `frame` lies inside the range.
    pub fn contains(&self, frame: i64) -> bool {
        self.start <= frame && frame <= self.end
    }

    /// Smallest range containing every frame, or `None` for an empty input.
    pub fn spanning<I>(frames: I) -> Option<Self>
    where
        I: IntoIterator<Item = i64>,
    {
        frames.into_iter().fold(None, |acc, f| match acc {
            None => Some(Self { start: f, end: f }),
            Some(r) => Some(Self {
                start: r.start.min(f),
                end: r.end.max(f),
            }),
        })
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
