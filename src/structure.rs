use crate::word_count::WordCounter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nesting level of a sectioning command. Lower depth is shallower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "chapter")]
    Top,
    #[serde(rename = "section")]
    Mid,
    #[serde(rename = "subsection")]
    Leaf,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Top, Level::Mid, Level::Leaf];

    pub fn depth(self) -> u8 {
        match self {
            Level::Top => 1,
            Level::Mid => 2,
            Level::Leaf => 3,
        }
    }

    /// The LaTeX command name that opens a unit at this level.
    pub fn command(self) -> &'static str {
        match self {
            Level::Top => "chapter",
            Level::Mid => "section",
            Level::Leaf => "subsection",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chapter" | "top" => Ok(Level::Top),
            "section" | "mid" => Ok(Level::Mid),
            "subsection" | "leaf" => Ok(Level::Leaf),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

/// Segmentation presets trading coverage for run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Rapid,
    #[default]
    Normal,
    Detailed,
}

impl AnalysisMode {
    pub fn levels(self) -> Vec<Level> {
        match self {
            AnalysisMode::Rapid => vec![Level::Top],
            AnalysisMode::Normal => vec![Level::Top, Level::Mid],
            AnalysisMode::Detailed => Level::ALL.to_vec(),
        }
    }

    pub fn min_words(self) -> usize {
        match self {
            AnalysisMode::Rapid => 100,
            AnalysisMode::Normal => 50,
            AnalysisMode::Detailed => 20,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AnalysisMode::Rapid => "chapters only",
            AnalysisMode::Normal => "chapters and sections",
            AnalysisMode::Detailed => "chapters, sections and subsections",
        }
    }

    pub fn params(self) -> SegmentationParams {
        SegmentationParams {
            allowed_levels: self.levels(),
            min_words: self.min_words(),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisMode::Rapid => "rapid",
            AnalysisMode::Normal => "normal",
            AnalysisMode::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

/// Which levels are emitted and how short a unit may be before it is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationParams {
    pub allowed_levels: Vec<Level>,
    pub min_words: usize,
}

impl SegmentationParams {
    pub fn allows(&self, level: Level) -> bool {
        self.allowed_levels.contains(&level)
    }
}

/// A titled span of the source document, from its sectioning command up to the next
/// command of the same or a shallower level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralUnit {
    pub level: Level,
    pub title: String,
    /// Byte offset of the sectioning command.
    pub start: usize,
    /// Exclusive byte offset where the unit ends.
    pub end: usize,
    pub word_count: usize,
}

impl StructuralUnit {
    /// The unit's text within `source`, or an empty string when the span does not fit
    /// `source` (a different document than the one it was extracted from).
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
struct Boundary {
    offset: usize,
    level: Level,
    title: String,
}

pub struct StructureExtractor {
    boundary_pattern: Regex,
    counter: WordCounter,
}

impl StructureExtractor {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            boundary_pattern: Regex::new(r"\\(chapter|section|subsection)\s*\{([^}]*)\}")?,
            counter: WordCounter::new()?,
        })
    }

    pub fn count_words(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Splits `document` into units at the allowed levels, in source order.
    ///
    /// A unit runs until the next boundary whose depth is less than or equal to its own,
    /// so deeper boundaries (emitted or not) stay inside their parent's span and count
    /// toward its words. Units shorter than `params.min_words` are dropped.
    pub fn extract(&self, document: &str, params: &SegmentationParams) -> Vec<StructuralUnit> {
        let boundaries = self.scan_boundaries(document);
        let mut units = Vec::new();

        for (i, boundary) in boundaries.iter().enumerate() {
            if !params.allows(boundary.level) {
                continue;
            }

            let end = boundaries[i + 1..]
                .iter()
                .find(|next| next.level.depth() <= boundary.level.depth())
                .map(|next| next.offset)
                .unwrap_or(document.len());

            let word_count = self.counter.count(&document[boundary.offset..end]);
            if word_count < params.min_words {
                continue;
            }

            units.push(StructuralUnit {
                level: boundary.level,
                title: boundary.title.clone(),
                start: boundary.offset,
                end,
                word_count,
            });
        }

        units
    }

    fn scan_boundaries(&self, document: &str) -> Vec<Boundary> {
        self.boundary_pattern
            .captures_iter(document)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let level = caps.get(1)?.as_str().parse().ok()?;
                let title = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
                Some(Boundary {
                    offset: whole.start(),
                    level,
                    title,
                })
            })
            .collect()
    }
}

/// One line per unit, used as the input of the outline review.
pub fn outline(units: &[StructuralUnit]) -> String {
    units
        .iter()
        .map(|u| format!("{}: {} ({} words)", u.level, u.title, u.word_count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rough wall-clock estimate for reviewing `unit_count` units, in minutes.
pub fn estimate_minutes(unit_count: usize) -> (usize, usize) {
    (unit_count, unit_count * 2)
}
