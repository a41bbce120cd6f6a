//! Fuzzy search for recurrences of the title across all pages.
//!
//! Every text block of a page is scanned with a word window as wide as the
//! target. Windows are scored by character edit distance normalized by the
//! target length; promising windows trigger a dense re-scan of their
//! neighbourhood, and each block contributes at most its best window.

mod diff;
mod lemma;

pub use diff::DiffClassifier;
pub use lemma::{Analysis, Language, Lemmatizer, PartOfSpeech, SnowballLemmatizer};

use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::model::{MatchResult, RelativeBox};
use crate::parser::{LayoutExtractor, PageLayout, PdfBackend};

/// How the acceptance threshold is applied to a window's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdMode {
    /// `distance / len(target) * 100 / len(target) < accept_threshold`.
    ///
    /// The normalized score is divided by the target length a second time,
    /// which makes long titles much stricter. Kept as the default so results
    /// agree with previously processed documents.
    #[default]
    Compatible,
    /// `distance / len(target) < accept_threshold`.
    Normalized,
}

/// Options for the window search.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Window stride as a fraction of the target word count (rounded up).
    pub stride_fraction: f64,
    /// Windows scoring below this trigger a neighbourhood re-scan.
    pub rescan_threshold: f64,
    /// Acceptance threshold, applied according to `threshold_mode`.
    pub accept_threshold: f64,
    /// Blocks must be strictly longer than this many characters.
    pub min_candidate_len: usize,
    pub threshold_mode: ThresholdMode,
    /// Language of the lemmatizer used for diff tags.
    pub language: Language,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold_mode(mut self, mode: ThresholdMode) -> Self {
        self.threshold_mode = mode;
        self
    }

    pub fn with_accept_threshold(mut self, threshold: f64) -> Self {
        self.accept_threshold = threshold;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            stride_fraction: 0.25,
            rescan_threshold: 0.3,
            accept_threshold: 0.2,
            min_candidate_len: 3,
            threshold_mode: ThresholdMode::Compatible,
            language: Language::Russian,
        }
    }
}

/// A page block eligible for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Whitespace-collapsed block text.
    pub text: String,
    /// Block text as extracted.
    pub raw_text: String,
    pub coordinates: RelativeBox,
}

/// Best window of one candidate string.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScore {
    pub window: String,
    /// Edit distance over target length.
    pub distance: f64,
}

/// Windowed edit-distance matcher.
pub struct FuzzyMatcher {
    options: MatchOptions,
    lemmatizer: Box<dyn Lemmatizer>,
    diff: DiffClassifier,
    space_run: Regex,
}

impl FuzzyMatcher {
    pub fn new(options: MatchOptions) -> Self {
        let lemmatizer = Box::new(SnowballLemmatizer::new(options.language));
        Self {
            options,
            lemmatizer,
            diff: DiffClassifier::new(),
            space_run: Regex::new(" +").expect("valid regex"),
        }
    }

    /// Replace the lemmatizer used for diff classification.
    pub fn with_lemmatizer(mut self, lemmatizer: Box<dyn Lemmatizer>) -> Self {
        self.lemmatizer = lemmatizer;
        self
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// NFC-normalize a target string and collapse its runs of spaces.
    pub fn normalize_target(&self, target: &str) -> String {
        let composed: String = target.nfc().collect();
        self.space_run.replace_all(&composed, " ").into_owned()
    }

    /// Blocks of a page long enough to be matched against.
    pub fn candidates(&self, layout: &PageLayout) -> Vec<Candidate> {
        layout
            .text_blocks()
            .into_iter()
            .filter_map(|block| {
                let text: String = block.collapsed_text().nfc().collect();
                (text.chars().count() > self.options.min_candidate_len).then(|| Candidate {
                    text,
                    raw_text: block.raw_text,
                    coordinates: block.relative_box,
                })
            })
            .collect()
    }

    /// Best window per string; strings with no window under the re-scan
    /// threshold yield `None`.
    pub fn window_scores(&self, target: &str, strings: &[String]) -> Result<Vec<Option<WindowScore>>> {
        let target_len = target.chars().count();
        let target_words = target.split_whitespace().count();
        if target_words == 0 || target_len == 0 {
            return Err(Error::Matching("empty target".to_string()));
        }
        let stride = ((target_words as f64 * self.options.stride_fraction).ceil() as usize).max(1);
        let score = |window: &str| strsim::levenshtein(target, window) as f64 / target_len as f64;

        Ok(strings
            .iter()
            .map(|string| {
                let words: Vec<&str> = string.split_whitespace().collect();
                let mut scored: Vec<WindowScore> = Vec::new();

                if words.len() > target_words {
                    let last_start = words.len() - target_words;
                    let mut i = 0;
                    while i <= last_start {
                        let window = words[i..i + target_words].join(" ");
                        if score(&window) < self.options.rescan_threshold {
                            let from = i.saturating_sub(target_words);
                            let to = (i + target_words).min(last_start + 1);
                            for j in from..to {
                                let window = words[j..j + target_words].join(" ");
                                let distance = score(&window);
                                scored.push(WindowScore { window, distance });
                            }
                        }
                        i += stride;
                    }
                } else {
                    scored.push(WindowScore {
                        window: string.clone(),
                        distance: score(string),
                    });
                }

                // First minimum wins.
                scored.into_iter().reduce(|best, next| {
                    if next.distance < best.distance {
                        next
                    } else {
                        best
                    }
                })
            })
            .collect())
    }

    fn accepts(&self, distance: f64, target_len: usize) -> bool {
        match self.options.threshold_mode {
            ThresholdMode::Compatible => {
                distance * 100.0 / (target_len as f64) < self.options.accept_threshold
            }
            ThresholdMode::Normalized => distance < self.options.accept_threshold,
        }
    }

    /// Match a target against the candidates of one page.
    pub fn match_page(&self, page: u32, target: &str, candidates: &[Candidate]) -> Result<Vec<MatchResult>> {
        let target = self.normalize_target(target);
        let target_len = target.chars().count();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        let mut results = Vec::new();
        for best in self.window_scores(&target, &texts)?.into_iter().flatten() {
            if !self.accepts(best.distance, target_len) {
                continue;
            }
            let container = candidates
                .iter()
                .find(|c| c.text.contains(&best.window))
                .ok_or_else(|| {
                    Error::Matching(format!("no block on page {} contains {:?}", page, best.window))
                })?;

            results.push(MatchResult {
                page,
                diff_classification: self.diff.classify(&best.window, &target, self.lemmatizer.as_ref()),
                window_text: best.window,
                raw_text: container.raw_text.clone(),
                coordinates: container.coordinates,
                normalized_distance: best.distance,
            });
        }

        if !results.is_empty() {
            log::debug!("Page {}: {} matches", page, results.len());
        }
        Ok(results)
    }

    /// Match a target on every page of an opened document, in page order.
    ///
    /// Layouts are extracted sequentially; the window search runs in parallel.
    pub fn locate_in<B: PdfBackend>(&self, extractor: &LayoutExtractor<B>, target: &str) -> Result<Vec<MatchResult>> {
        let layouts = (1..=extractor.page_count())
            .map(|page| extractor.page_layout(page))
            .collect::<Result<Vec<PageLayout>>>()?;

        let pages: Vec<Vec<MatchResult>> = layouts
            .par_iter()
            .map(|layout| self.match_page(layout.page, target, &self.candidates(layout)))
            .collect::<Result<_>>()?;

        let results: Vec<MatchResult> = pages.into_iter().flatten().collect();
        log::info!("Located {} occurrences of {:?}", results.len(), target);
        Ok(results)
    }

    /// Match a target on every page of a PDF file.
    pub fn locate<P: AsRef<Path>>(&self, path: P, target: &str) -> Result<Vec<MatchResult>> {
        let extractor = LayoutExtractor::open(path)?;
        self.locate_in(&extractor, target)
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(MatchOptions::default())
    }
}
