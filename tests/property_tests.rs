//! Property-based tests for scoring, retrieval and output recovery.
//!
//! Uses proptest to verify invariants across random inputs:
//! - A normalized vector has similarity 1.0 with itself
//! - Recency weight is 1.0 at the reference year and strictly decreasing with age
//! - Index search results are score-descending and bounded by `k`
//! - `Type:` prefixes are stripped, other values pass through

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use patient_kg::config::ScoringConfig;
use patient_kg::embedding::normalize;
use patient_kg::models::EntityType;
use patient_kg::services::scoring::{combined_score_at, recency_weight, similarity};
use patient_kg::services::triple_extraction::{locate_json_array, strip_type_prefix};
use patient_kg::storage::{FlatIndex, VectorIndex};
use patient_kg::Error;
use proptest::prelude::*;

fn unit_vector(dimensions: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, dimensions).prop_filter_map("zero vector", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-3 {
            return None;
        }
        normalize(&mut v);
        Some(v)
    })
}

proptest! {
    #[test]
    fn prop_self_similarity_is_one(v in unit_vector(16)) {
        let s = similarity(&v, &v).unwrap();
        prop_assert!((s - 1.0).abs() < 1e-5, "similarity was {}", s);
    }

    #[test]
    fn prop_similarity_is_symmetric(a in unit_vector(8), b in unit_vector(8)) {
        let ab = similarity(&a, &b).unwrap();
        let ba = similarity(&b, &a).unwrap();
        prop_assert!((ab - ba).abs() < 1e-9);
        prop_assert!(ab <= 1.0 + 1e-5 && ab >= -1.0 - 1e-5);
    }

    #[test]
    fn prop_recency_is_one_at_reference_year(year in 1900i32..2100, lambda in 0.001f64..2.0) {
        let config = ScoringConfig { decay_lambda: lambda, ..ScoringConfig::default() };
        prop_assert!((recency_weight(year, year, &config) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prop_recency_strictly_decreasing(
        reference in 1950i32..2100,
        age in 0i32..50,
        lambda in 0.01f64..1.0,
    ) {
        let config = ScoringConfig { decay_lambda: lambda, ..ScoringConfig::default() };
        let newer = recency_weight(reference - age, reference, &config);
        let older = recency_weight(reference - age - 1, reference, &config);
        prop_assert!(older < newer);
    }

    #[test]
    fn prop_clamped_recency_never_exceeds_one(offset in -50i32..50) {
        let config = ScoringConfig { clamp_future_years: true, ..ScoringConfig::default() };
        prop_assert!(recency_weight(2024 + offset, 2024, &config) <= 1.0);
    }

    #[test]
    fn prop_combined_score_at_reference_year(sim in -1.0f64..1.0) {
        let config = ScoringConfig::default();
        let score = combined_score_at(sim, 2024, 2024, &config);
        prop_assert!((score - (config.alpha * sim + config.beta)).abs() < 1e-9);
    }

    #[test]
    fn prop_flat_search_sorted_and_bounded(
        vectors in prop::collection::vec(unit_vector(4), 0..40),
        query in unit_vector(4),
        k in 0usize..50,
    ) {
        let mut index = FlatIndex::with_dimensions(4).unwrap();
        index.build(&vectors).unwrap();
        let results = index.search(&query, k).unwrap();

        prop_assert_eq!(results.len(), k.min(vectors.len()));
        prop_assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
        prop_assert!(results.iter().all(|(position, _)| *position < vectors.len()));
    }

    #[test]
    fn prop_type_prefix_stripped(
        entity_type in prop::sample::select(EntityType::ALL.to_vec()),
        lowercase in any::<bool>(),
        id in "[A-Za-z0-9][A-Za-z0-9=./-]{0,15}",
    ) {
        let label = if lowercase {
            entity_type.as_str().to_lowercase()
        } else {
            entity_type.as_str().to_string()
        };
        prop_assert_eq!(strip_type_prefix(&format!("{label}:{id}")), id);
    }

    #[test]
    fn prop_values_without_colon_unchanged(value in "[^:]{0,30}") {
        prop_assert_eq!(strip_type_prefix(&value), value);
    }

    #[test]
    fn prop_text_without_brackets_is_malformed(text in "[^\\[\\]]{0,80}") {
        let is_malformed = matches!(locate_json_array(&text), Err(Error::MalformedOutput { .. }));
        prop_assert!(is_malformed);
    }
}
