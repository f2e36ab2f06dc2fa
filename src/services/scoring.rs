//! Similarity and recency scoring.
//!
//! Pure functions over pre-normalized vectors and publication years.

use crate::config::ScoringConfig;
use crate::{Error, Result};

/// Dot product of two pre-normalized vectors.
///
/// For unit vectors this is the cosine similarity. Vectors that are not
/// normalized still yield their dot product.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the lengths differ.
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum())
}

/// `exp(-λ · (reference_year − publication_year))`.
///
/// Equals 1.0 for a publication from the reference year. Future years give
/// weights above 1.0 unless `clamp_future_years` is set.
#[must_use]
pub fn recency_weight(publication_year: i32, reference_year: i32, config: &ScoringConfig) -> f64 {
    let age = f64::from(reference_year) - f64::from(publication_year);
    let weight = (-config.decay_lambda * age).exp();
    if config.clamp_future_years {
        weight.min(1.0)
    } else {
        weight
    }
}

/// `α · similarity + β · recency_weight(publication_year)` against the current year.
#[must_use]
pub fn combined_score(similarity: f64, publication_year: i32, config: &ScoringConfig) -> f64 {
    combined_score_at(similarity, publication_year, crate::current_year(), config)
}

/// [`combined_score`] against an explicit reference year.
#[must_use]
pub fn combined_score_at(
    similarity: f64,
    publication_year: i32,
    reference_year: i32,
    config: &ScoringConfig,
) -> f64 {
    config.alpha.mul_add(
        similarity,
        config.beta * recency_weight(publication_year, reference_year, config),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_similarity_of_unit_vector_with_itself() {
        let v = [0.6_f32, 0.8];
        assert!((similarity(&v, &v).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal_and_opposite() {
        assert!(similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < EPS);
        assert!((similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < EPS);
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        let result = similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test_case(2024, 2024, 1.0 ; "same year")]
    #[test_case(2014, 2024, (-1.0_f64).exp() ; "ten years old")]
    #[test_case(2026, 2024, 0.2_f64.exp() ; "future year unclamped")]
    fn test_recency_weight(year: i32, reference: i32, expected: f64) {
        let weight = recency_weight(year, reference, &ScoringConfig::default());
        assert!((weight - expected).abs() < EPS, "got {weight}");
    }

    #[test]
    fn test_recency_weight_clamped() {
        let config = ScoringConfig {
            clamp_future_years: true,
            ..ScoringConfig::default()
        };
        assert!((recency_weight(2030, 2024, &config) - 1.0).abs() < EPS);
        assert!(recency_weight(2000, 2024, &config) < 1.0);
    }

    #[test]
    fn test_recency_weight_strictly_decreasing() {
        let config = ScoringConfig::default();
        let weights: Vec<f64> = (0..5)
            .map(|age| recency_weight(2024 - age, 2024, &config))
            .collect();
        assert!(weights.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_combined_score_current_year() {
        let config = ScoringConfig::default();
        let score = combined_score(1.0, crate::current_year(), &config);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_combined_score_blend() {
        let config = ScoringConfig::default();
        let score = combined_score_at(0.5, 2014, 2024, &config);
        let expected = 0.7f64.mul_add(0.5, 0.3 * (-1.0_f64).exp());
        assert!((score - expected).abs() < EPS);
    }
}
