//! Line chunking, distance and ranking.

use crate::error::{MemoryError, Result};
use std::cmp::Ordering;

/// A chunk of a stored record together with its score against a query.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f32,
    /// Position of the source record in the store listing.
    pub record: usize,
    pub chunk: usize,
}

/// Splits record text into line chunks. Blank lines carry no signal and are dropped.
pub fn split_chunks(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Squared Euclidean distance between two vectors of equal length, the
/// quantity a flat L2 index reports.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(MemoryError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>())
}

/// Maps a distance onto (0, 1]; identical vectors score 1.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Sorts by descending score. Ties keep record order, then chunk order.
pub fn rank_chunks(chunks: &mut [ScoredChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.record.cmp(&b.record))
            .then(a.chunk.cmp(&b.chunk))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(record: usize, chunk: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: format!("r{record}c{chunk}"),
            score,
            record,
            chunk,
        }
    }

    #[test]
    fn blank_lines_are_not_chunks() {
        let chunks = split_chunks("User: hi\n\n   \nAssistant: hello\n");
        assert_eq!(chunks, vec!["User: hi", "Assistant: hello"]);
        assert!(split_chunks("").is_empty());
    }

    #[test]
    fn identical_vectors_score_one() {
        let d = l2_distance(&[0.5, 0.5], &[0.5, 0.5]).unwrap();
        assert_eq!(similarity_from_distance(d), 1.0);
    }

    #[test]
    fn distance_is_squared_euclidean() {
        let d = l2_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 25.0).abs() < 1e-6);
        assert!((similarity_from_distance(d) - 1.0 / 26.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_dimensions_are_an_error() {
        let err = l2_distance(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: 1, got: 2 }
        ));
    }

    #[test]
    fn ranking_breaks_ties_by_position() {
        let mut chunks = vec![
            chunk(1, 0, 0.5),
            chunk(0, 2, 0.5),
            chunk(0, 1, 0.9),
            chunk(0, 0, 0.5),
        ];
        rank_chunks(&mut chunks);
        let order: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(order, vec!["r0c1", "r0c0", "r0c2", "r1c0"]);
    }
}
