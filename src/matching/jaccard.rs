// src/matching/jaccard.rs
use crate::cache::PairScore;
use crate::core::types::RowId;

/// Size of the intersection of two ascending, duplicate-free row lists.
/// Linear merge, O(|a| + |b|).
pub fn intersection_count(a: &[RowId], b: &[RowId]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// `|a ∩ b| / |a ∪ b|`, 0 when both are empty.
pub fn jaccard(a: &[RowId], b: &[RowId]) -> f64 {
    pair_score(a, b).jaccard_similarity
}

pub fn pair_score(a: &[RowId], b: &[RowId]) -> PairScore {
    let common = intersection_count(a, b);
    let union = a.len() + b.len() - common;
    let jaccard_similarity = if union == 0 { 0.0 } else { common as f64 / union as f64 };
    PairScore { jaccard_similarity, count: common as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn overlapping_sets() {
        let score = pair_score(&[1, 2, 3], &[2, 3, 4]);
        assert_eq!(score.count, 2);
        assert_eq!(score.jaccard_similarity, 0.5);
    }

    #[test]
    fn empty_union_scores_zero() {
        assert_eq!(jaccard(&[], &[]), 0.0);
        assert_eq!(jaccard(&[7], &[]), 0.0);
    }

    #[test]
    fn identical_sets_score_one() {
        assert_eq!(jaccard(&[0, 5, 9], &[0, 5, 9]), 1.0);
    }

    fn row_set() -> impl Strategy<Value = Vec<RowId>> {
        proptest::collection::btree_set(0u32..64, 0..20)
            .prop_map(|s: BTreeSet<RowId>| s.into_iter().collect())
    }

    proptest! {
        #[test]
        fn jaccard_is_symmetric(a in row_set(), b in row_set()) {
            prop_assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
            prop_assert_eq!(intersection_count(&a, &b), intersection_count(&b, &a));
        }

        #[test]
        fn jaccard_stays_in_unit_interval(a in row_set(), b in row_set()) {
            let j = jaccard(&a, &b);
            prop_assert!((0.0..=1.0).contains(&j));
        }
    }
}
