//! Word normalisation used by the diff classifier.

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

/// Language of the documents being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Russian,
    English,
}

impl Language {
    fn algorithm(self) -> Algorithm {
        match self {
            Language::Russian => Algorithm::Russian,
            Language::English => Algorithm::English,
        }
    }
}

/// Coarse part-of-speech tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Numeral,
    Other,
}

/// Lemma and part of speech of a single word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub lemma: String,
    pub pos: PartOfSpeech,
}

/// Maps a word to its dictionary form.
pub trait Lemmatizer: Send + Sync {
    fn analyze(&self, word: &str) -> Analysis;
}

const RU_ADJECTIVE: &[&str] = &[
    "ый", "ий", "ой", "ая", "яя", "ое", "ее", "ые", "ие", "ого", "его", "ому", "ему", "ым",
    "им", "ых", "их", "ую", "юю",
];
const RU_VERB: &[&str] = &[
    "ться", "тся", "ть", "ти", "чь", "ешь", "ет", "ит", "ют", "ут", "ат", "ят", "ал", "ил",
    "ла", "ли", "ло",
];
const RU_ADVERB: &[&str] = &["ски", "енно", "онно"];

const EN_ADVERB: &[&str] = &["ly"];
const EN_VERB: &[&str] = &["ing", "ed", "ize", "ise", "ate"];
const EN_ADJECTIVE: &[&str] = &["ous", "ful", "ive", "able", "ible", "al", "ic", "less"];

/// Snowball stemmer with a suffix-based part-of-speech guess.
pub struct SnowballLemmatizer {
    stemmer: Stemmer,
    language: Language,
}

impl SnowballLemmatizer {
    pub fn new(language: Language) -> Self {
        Self {
            stemmer: Stemmer::create(language.algorithm()),
            language,
        }
    }

    fn guess_pos(&self, word: &str) -> PartOfSpeech {
        if word.chars().all(|c| c.is_ascii_digit()) {
            return PartOfSpeech::Numeral;
        }
        if !word.chars().any(char::is_alphabetic) {
            return PartOfSpeech::Other;
        }
        let tables: [(&[&str], PartOfSpeech); 3] = match self.language {
            Language::Russian => [
                (RU_ADVERB, PartOfSpeech::Adverb),
                (RU_ADJECTIVE, PartOfSpeech::Adjective),
                (RU_VERB, PartOfSpeech::Verb),
            ],
            Language::English => [
                (EN_ADVERB, PartOfSpeech::Adverb),
                (EN_VERB, PartOfSpeech::Verb),
                (EN_ADJECTIVE, PartOfSpeech::Adjective),
            ],
        };
        tables
            .iter()
            .find(|(suffixes, _)| suffixes.iter().any(|s| word.ends_with(s)))
            .map(|(_, pos)| *pos)
            .unwrap_or(PartOfSpeech::Noun)
    }
}

impl Default for SnowballLemmatizer {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl Lemmatizer for SnowballLemmatizer {
    fn analyze(&self, word: &str) -> Analysis {
        let lower = word.to_lowercase();
        Analysis {
            lemma: self.stemmer.stem(&lower).into_owned(),
            pos: self.guess_pos(&lower),
        }
    }
}
