//! Annotation actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What to do with each located occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationAction {
    #[default]
    Highlight,
    Squiggly,
    Underline,
    Strikeout,
    /// Rectangle border around the occurrence.
    Frame,
    /// Remove the text and paint over it. Irreversible.
    Redact,
}

impl AnnotationAction {
    pub const ALL: [AnnotationAction; 6] = [
        AnnotationAction::Highlight,
        AnnotationAction::Squiggly,
        AnnotationAction::Underline,
        AnnotationAction::Strikeout,
        AnnotationAction::Frame,
        AnnotationAction::Redact,
    ];

    /// Parse an action name, falling back to `Highlight` for unknown names.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!("Unknown annotation action {:?}, using highlight", name);
            AnnotationAction::Highlight
        })
    }

    /// Annotation subtype for text markup actions.
    pub(crate) fn markup_subtype(self) -> Option<&'static str> {
        match self {
            AnnotationAction::Highlight => Some("Highlight"),
            AnnotationAction::Squiggly => Some("Squiggly"),
            AnnotationAction::Underline => Some("Underline"),
            AnnotationAction::Strikeout => Some("StrikeOut"),
            AnnotationAction::Frame | AnnotationAction::Redact => None,
        }
    }

    /// RGB colour of the annotation.
    pub(crate) fn color(self) -> [f32; 3] {
        match self {
            AnnotationAction::Highlight => [1.0, 1.0, 0.0],
            AnnotationAction::Squiggly | AnnotationAction::Frame => [1.0, 0.0, 0.0],
            AnnotationAction::Underline => [0.0, 0.0, 1.0],
            AnnotationAction::Strikeout => [1.0, 0.0, 0.0],
            AnnotationAction::Redact => [0.0, 0.0, 0.0],
        }
    }
}

impl FromStr for AnnotationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "highlight" => Ok(AnnotationAction::Highlight),
            "squiggly" => Ok(AnnotationAction::Squiggly),
            "underline" => Ok(AnnotationAction::Underline),
            "strikeout" => Ok(AnnotationAction::Strikeout),
            "frame" => Ok(AnnotationAction::Frame),
            "redact" => Ok(AnnotationAction::Redact),
            other => Err(Error::Other(format!("unknown annotation action: {}", other))),
        }
    }
}

impl fmt::Display for AnnotationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnnotationAction::Highlight => "highlight",
            AnnotationAction::Squiggly => "squiggly",
            AnnotationAction::Underline => "underline",
            AnnotationAction::Strikeout => "strikeout",
            AnnotationAction::Frame => "frame",
            AnnotationAction::Redact => "redact",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for action in AnnotationAction::ALL {
            assert_eq!(action.to_string().parse::<AnnotationAction>().unwrap(), action);
        }
        assert_eq!("  Redact ".parse::<AnnotationAction>().unwrap(), AnnotationAction::Redact);
    }

    #[test]
    fn test_unknown_falls_back_to_highlight() {
        assert!("blur".parse::<AnnotationAction>().is_err());
        assert_eq!(AnnotationAction::parse_lenient("blur"), AnnotationAction::Highlight);
        assert_eq!(AnnotationAction::parse_lenient("frame"), AnnotationAction::Frame);
    }
}
