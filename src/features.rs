//! Numeric features derived from the first-page blocks of one document.
//!
//! Ranks and percentages are relative to the whole block set, so the table is
//! always computed in one pass over every block.

use serde::{Deserialize, Serialize};

use crate::model::{FontStyle, TextBlock};

/// Number of model input columns.
pub const FEATURE_COUNT: usize = 5;

/// Column names, in the order the classifier consumes them.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "font",
    "lengthRank",
    "areaRank",
    "boldPercentage",
    "idPercentage",
];

/// Features of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub length_rank: u32,
    pub area_rank: u32,
    pub bold_percentage: u32,
    pub id_percentage: u32,
    pub font_style: FontStyle,
}

impl FeatureVector {
    /// Model input row in [`FEATURE_COLUMNS`] order.
    pub fn as_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.font_style.code(),
            self.length_rank as f64,
            self.area_rank as f64,
            self.bold_percentage as f64,
            self.id_percentage as f64,
        ]
    }
}

/// Feature vectors for all blocks of a document, in block order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub rows: Vec<FeatureVector>,
}

impl FeatureTable {
    /// Compute the features of every block.
    pub fn from_blocks(blocks: &[TextBlock]) -> Self {
        if blocks.is_empty() {
            return Self::default();
        }

        let lengths: Vec<i64> = blocks
            .iter()
            .map(|b| b.flat_text().chars().count() as i64)
            .collect();
        let areas: Vec<i64> = blocks
            .iter()
            .map(|b| b.bounding_box.truncated_area())
            .collect();
        let length_ranks = rank_descending(&lengths);
        let area_ranks = rank_descending(&areas);

        let bold = blocks.iter().filter(|b| b.font_style.is_bold()).count();
        let bold_percentage = (bold as f64 / blocks.len() as f64 * 100.0) as u32;

        let max_id = blocks.iter().filter_map(|b| b.group_id).max().unwrap_or(0);

        let rows = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| FeatureVector {
                length_rank: length_ranks[i],
                area_rank: area_ranks[i],
                bold_percentage,
                id_percentage: id_percentage(block.group_id, max_id),
                font_style: block.font_style,
            })
            .collect();

        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Model input matrix, one row per block.
    pub fn matrix(&self) -> Vec<[f64; FEATURE_COUNT]> {
        self.rows.iter().map(FeatureVector::as_row).collect()
    }
}

/// Descending rank where tied values all take the smallest rank of their group.
pub fn rank_descending(values: &[i64]) -> Vec<u32> {
    values
        .iter()
        .map(|v| 1 + values.iter().filter(|other| *other > v).count() as u32)
        .collect()
}

fn id_percentage(group_id: Option<u32>, max_id: u32) -> u32 {
    match group_id {
        Some(id) if max_id > 0 => (id as f64 / max_id as f64 * 100.0) as u32,
        _ => 0,
    }
}
