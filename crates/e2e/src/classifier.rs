//! Detects whether a snapshot contains converted (target-script) text

use serde::{Deserialize, Serialize};

/// Inclusive code point range of the target script's Unicode block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRange {
    pub start: char,
    pub end: char,
}

impl ScriptRange {
    /// Tamil block, U+0B80..=U+0BFF
    pub const TAMIL: ScriptRange = ScriptRange {
        start: '\u{0B80}',
        end: '\u{0BFF}',
    };

    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&c)
    }
}

impl Default for ScriptRange {
    fn default() -> Self {
        Self::TAMIL
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputClassifier {
    range: ScriptRange,
}

impl OutputClassifier {
    pub fn new(range: ScriptRange) -> Self {
        Self { range }
    }

    /// True iff `text` holds at least one code point of the target script
    pub fn classify(&self, text: &str) -> bool {
        text.chars().any(|c| self.range.contains(c))
    }

    pub fn range(&self) -> ScriptRange {
        self.range
    }
}
