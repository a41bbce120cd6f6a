//! Located title recurrences.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::geometry::RelativeBox;

/// How a word of a matched window differs from the word at the same
/// position in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Equal once non-word characters are stripped.
    SpecialCharacterOnly,
    /// Equal ignoring case.
    CaseOnly,
    /// Both numeric, absolute difference below 10.
    MinorNumericDifference,
    /// Both numeric, otherwise.
    DifferentNumbers,
    /// Same lemma, different part of speech.
    MorphologicalForm,
    /// Same lemma and part of speech, different surface form.
    SameLemmaDifferentForm,
    /// Within two edits.
    PossibleTypo,
    /// None of the above.
    DifferentWord,
    /// Word appears in the window but nowhere in the target.
    WordOnlyInWindow,
    /// Word appears in the target but nowhere in the window.
    WordOnlyInTarget,
}

/// One approximate recurrence of the title on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// 1-indexed page number.
    pub page: u32,
    /// The best word window of the containing block.
    pub window_text: String,
    /// Untrimmed text of the block containing the window.
    pub raw_text: String,
    /// Relative box of the containing block.
    pub coordinates: RelativeBox,
    /// Edit distance normalized by target length (see `ThresholdMode`).
    pub normalized_distance: f64,
    /// Advisory word-level difference tags.
    pub diff_classification: BTreeSet<DiffKind>,
}

impl MatchResult {
    /// Whether the window reproduces the target exactly.
    pub fn is_exact(&self) -> bool {
        self.normalized_distance == 0.0
    }
}
