//! Word-level classification of how a matched window differs from the target.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;

use crate::model::DiffKind;

use super::lemma::Lemmatizer;

/// Classifies word differences between two strings.
pub struct DiffClassifier {
    non_word: Regex,
}

impl DiffClassifier {
    pub fn new() -> Self {
        Self {
            non_word: Regex::new(r"\W").expect("valid regex"),
        }
    }

    /// Classify one positional word pair. `None` when the words are identical.
    pub fn word_difference(
        &self,
        window_word: &str,
        target_word: &str,
        lemmatizer: &dyn Lemmatizer,
    ) -> Option<DiffKind> {
        if window_word == target_word {
            return None;
        }
        if self.non_word.replace_all(window_word, "") == self.non_word.replace_all(target_word, "") {
            return Some(DiffKind::SpecialCharacterOnly);
        }
        if window_word.to_lowercase() == target_word.to_lowercase() {
            return Some(DiffKind::CaseOnly);
        }
        if is_number(window_word) && is_number(target_word) {
            return Some(if differ_by_less_than_ten(window_word, target_word) {
                DiffKind::MinorNumericDifference
            } else {
                DiffKind::DifferentNumbers
            });
        }

        let a = lemmatizer.analyze(window_word);
        let b = lemmatizer.analyze(target_word);
        if a.lemma == b.lemma {
            return Some(if a.pos != b.pos {
                DiffKind::MorphologicalForm
            } else {
                DiffKind::SameLemmaDifferentForm
            });
        }

        if strsim::levenshtein(window_word, target_word) <= 2 {
            Some(DiffKind::PossibleTypo)
        } else {
            Some(DiffKind::DifferentWord)
        }
    }

    /// All difference kinds between a window and the target.
    ///
    /// Words are compared position by position up to the shorter length, and
    /// words present on only one side are tagged as such.
    pub fn classify(&self, window: &str, target: &str, lemmatizer: &dyn Lemmatizer) -> BTreeSet<DiffKind> {
        let window_words: Vec<&str> = window.split_whitespace().collect();
        let target_words: Vec<&str> = target.split_whitespace().collect();

        let mut kinds: BTreeSet<DiffKind> = window_words
            .iter()
            .zip(&target_words)
            .filter_map(|(w, t)| self.word_difference(w, t, lemmatizer))
            .collect();

        let window_set: HashSet<&str> = window_words.iter().copied().collect();
        let target_set: HashSet<&str> = target_words.iter().copied().collect();
        if window_set.difference(&target_set).next().is_some() {
            kinds.insert(DiffKind::WordOnlyInWindow);
        }
        if target_set.difference(&window_set).next().is_some() {
            kinds.insert(DiffKind::WordOnlyInTarget);
        }
        kinds
    }
}

impl Default for DiffClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_numeric())
}

/// Exact `|a - b| < 10` for decimal numerals of any length.
///
/// Numerals with non-ASCII digits are never close.
fn differ_by_less_than_ten(a: &str, b: &str) -> bool {
    let digits = |s: &str| -> Option<Vec<u8>> {
        let digits: Vec<u8> = s
            .chars()
            .map(|c| c.is_ascii_digit().then(|| c as u8 - b'0'))
            .collect::<Option<_>>()?;
        let start = digits.iter().position(|d| *d != 0).unwrap_or(digits.len());
        Some(digits[start..].to_vec())
    };
    let (Some(a), Some(b)) = (digits(a), digits(b)) else {
        return false;
    };
    let (high, low) = if (a.len(), &a) >= (b.len(), &b) { (a, b) } else { (b, a) };

    // schoolbook subtraction, least significant digit first
    let mut diff = Vec::with_capacity(high.len());
    let mut borrow = 0i8;
    let offset = high.len() - low.len();
    for i in (0..high.len()).rev() {
        let subtrahend = if i >= offset { low[i - offset] as i8 } else { 0 };
        let mut d = high[i] as i8 - subtrahend - borrow;
        borrow = if d < 0 {
            d += 10;
            1
        } else {
            0
        };
        diff.push(d);
    }
    diff.iter().skip(1).all(|d| *d == 0)
}
