use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::Catalog;
use crate::models::{BundleState, CategoryMap, ContentItem, DiagnosticResult, DrillSession, UsageCategory};
use crate::srs::due_bundle_ids;
use crate::weakness::{combined_scores, BlendWeights};

/// Upper bound of the random jitter added to each item's weakness weight.
pub const WEIGHT_JITTER: f64 = 0.3;

/// A single category may fill at most `ceil(count / 3)` slots in the
/// first pass.
pub const CATEGORY_CAP_DIVISOR: usize = 3;

pub struct AdaptiveRequest<'a> {
    pub count: usize,
    pub diagnostic: Option<&'a DiagnosticResult>,
    pub recent_sessions: &'a [DrillSession],
    pub bundle_states: &'a [BundleState],
    pub used_item_ids: &'a HashSet<String>,
    pub now: DateTime<Utc>,
    pub weights: BlendWeights,
}

/// Weakness-weighted batch with due bundles first and a per-category cap.
/// The returned order is shuffled.
pub fn select_adaptive<R: Rng + ?Sized>(
    catalog: &Catalog,
    request: &AdaptiveRequest<'_>,
    rng: &mut R,
) -> Vec<ContentItem> {
    if request.count == 0 {
        return Vec::new();
    }

    let weakness = combined_scores(request.diagnostic, request.recent_sessions, request.weights);
    let due = due_bundle_ids(request.bundle_states, request.now);

    let mut ranked: Vec<(&ContentItem, f64)> = catalog
        .items()
        .filter(|item| !request.used_item_ids.contains(&item.id))
        .map(|item| {
            let jitter = rng.gen_range(0.0..WEIGHT_JITTER);
            (item, weakness.get(item.category) + jitter)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    // Stable partition: due bundle items first, weight order kept on both sides.
    let (due_items, rest): (Vec<_>, Vec<_>) = ranked.into_iter().partition(|(item, _)| {
        catalog
            .bundle_of(&item.id)
            .is_some_and(|bundle| due.contains(&bundle.id))
    });
    let ordered: Vec<&ContentItem> = due_items
        .into_iter()
        .chain(rest)
        .map(|(item, _)| item)
        .collect();

    let mut selected = fill_with_cap(&ordered, request.count);
    log::debug!(
        "adaptive selection: {} of {} requested from {} candidates ({} due bundles)",
        selected.len(),
        request.count,
        ordered.len(),
        due.len()
    );

    selected.shuffle(rng);
    selected
}

fn fill_with_cap(ordered: &[&ContentItem], count: usize) -> Vec<ContentItem> {
    let cap = count.div_ceil(CATEGORY_CAP_DIVISOR);
    let mut per_category: CategoryMap<usize> = CategoryMap::default();
    let mut admitted = vec![false; ordered.len()];
    let mut taken = 0;

    for (idx, item) in ordered.iter().enumerate() {
        if taken >= count {
            break;
        }
        let n = per_category.get_mut(item.category);
        if *n < cap {
            *n += 1;
            admitted[idx] = true;
            taken += 1;
        }
    }

    // Cap too tight for what is left: top up in the same order, cap ignored.
    if taken < count {
        for flag in admitted.iter_mut() {
            if taken >= count {
                break;
            }
            if !*flag {
                *flag = true;
                taken += 1;
            }
        }
    }

    ordered
        .iter()
        .zip(admitted)
        .filter(|(_, keep)| *keep)
        .map(|(item, _)| (*item).clone())
        .collect()
}

/// Unweighted batch drawn from one category.
pub fn select_focused<R: Rng + ?Sized>(
    catalog: &Catalog,
    category: UsageCategory,
    count: usize,
    used_item_ids: &HashSet<String>,
    rng: &mut R,
) -> Vec<ContentItem> {
    let mut items: Vec<ContentItem> = catalog
        .items_in(category)
        .filter(|item| !used_item_ids.contains(&item.id))
        .cloned()
        .collect();

    items.shuffle(rng);
    items.truncate(count);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{flat_catalog, item};
    use crate::models::{Bundle, CategoryScores, Tally};
    use crate::weakness::tests::diagnostic_with;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request<'a>(count: usize, used: &'a HashSet<String>) -> AdaptiveRequest<'a> {
        AdaptiveRequest {
            count,
            diagnostic: None,
            recent_sessions: &[],
            bundle_states: &[],
            used_item_ids: used,
            now: Utc::now(),
            weights: BlendWeights::default(),
        }
    }

    fn count_in(items: &[ContentItem], category: UsageCategory) -> usize {
        items.iter().filter(|i| i.category == category).count()
    }

    #[test]
    fn test_six_from_balanced_catalog_respects_cap() {
        let catalog = flat_catalog(4);
        let used = HashSet::new();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let batch = select_adaptive(&catalog, &request(6, &used), &mut rng);
            assert_eq!(batch.len(), 6);
            for category in UsageCategory::ALL {
                assert!(count_in(&batch, category) <= 2);
            }
        }
    }

    #[test]
    fn test_no_duplicates_and_no_used_items() {
        let catalog = flat_catalog(4);
        let used: HashSet<String> = ["collocations-0", "register-1", "word_forms-3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for count in [1, 5, 10, 17, 30] {
            let mut rng = StdRng::seed_from_u64(count as u64);
            let batch = select_adaptive(&catalog, &request(count, &used), &mut rng);
            assert!(batch.len() <= count);
            assert_eq!(batch.len(), count.min(catalog.len() - used.len()));

            let ids: HashSet<&str> = batch.iter().map(|i| i.id.as_str()).collect();
            assert_eq!(ids.len(), batch.len());
            assert!(batch.iter().all(|i| !used.contains(&i.id)));
        }
    }

    #[test]
    fn test_zero_count_and_empty_catalog_are_empty() {
        let used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_adaptive(&flat_catalog(4), &request(0, &used), &mut rng).is_empty());
        assert!(select_adaptive(&Catalog::default(), &request(6, &used), &mut rng).is_empty());
    }

    #[test]
    fn test_weakest_category_is_capped() {
        let catalog = flat_catalog(4);
        let mut scores = CategoryScores::default();
        for category in UsageCategory::ALL {
            *scores.get_mut(category) = Tally { correct: 10, total: 10 };
        }
        scores.collocations = Tally { correct: 0, total: 10 };
        let diag = diagnostic_with(scores, 0.5);
        let used = HashSet::new();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let req = AdaptiveRequest {
                diagnostic: Some(&diag),
                ..request(5, &used)
            };
            let batch = select_adaptive(&catalog, &req, &mut rng);
            assert_eq!(batch.len(), 5);
            // collocations outrank everything but cannot exceed ceil(5/3)
            assert_eq!(count_in(&batch, UsageCategory::Collocations), 2);
        }
    }

    #[test]
    fn test_fallback_pass_ignores_cap_when_short() {
        let items = (0..5).map(|i| item(&format!("p-{}", i), UsageCategory::Prepositions)).collect();
        let catalog = Catalog::new(Vec::new(), items).unwrap();
        let used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(7);

        let batch = select_adaptive(&catalog, &request(4, &used), &mut rng);
        assert_eq!(batch.len(), 4);
        assert_eq!(count_in(&batch, UsageCategory::Prepositions), 4);

        let batch = select_adaptive(&catalog, &request(10, &used), &mut rng);
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn test_due_bundle_items_outrank_weakness() {
        let mut standalone = Vec::new();
        for category in UsageCategory::ALL {
            if category == UsageCategory::Register {
                continue;
            }
            for i in 0..4 {
                standalone.push(item(&format!("{}-{}", category, i), category));
            }
        }
        let bundle = Bundle {
            id: "formal-verbs".to_string(),
            headword: "address".to_string(),
            tags: Vec::new(),
            items: vec![
                item("reg-a", UsageCategory::Register),
                item("reg-b", UsageCategory::Register),
            ],
        };
        let catalog = Catalog::new(vec![bundle], standalone).unwrap();

        let mut scores = CategoryScores::from_fn(|_| Tally { correct: 0, total: 4 });
        scores.register = Tally { correct: 4, total: 4 };
        let diag = diagnostic_with(scores, 0.5);

        let now = Utc::now();
        let due = vec![BundleState::new("formal-verbs".to_string(), now - Duration::days(1))];
        let not_due = vec![BundleState::new("formal-verbs".to_string(), now + Duration::days(1))];
        let used = HashSet::new();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let req = AdaptiveRequest {
                diagnostic: Some(&diag),
                bundle_states: &due,
                now,
                ..request(3, &used)
            };
            let batch = select_adaptive(&catalog, &req, &mut rng);
            assert_eq!(batch.len(), 3);
            assert_eq!(count_in(&batch, UsageCategory::Register), 1);

            let req = AdaptiveRequest {
                diagnostic: Some(&diag),
                bundle_states: &not_due,
                now,
                ..request(3, &used)
            };
            let batch = select_adaptive(&catalog, &req, &mut rng);
            assert_eq!(count_in(&batch, UsageCategory::Register), 0);
        }
    }

    #[test]
    fn test_same_seed_same_batch() {
        let catalog = flat_catalog(4);
        let used = HashSet::new();
        let a = select_adaptive(&catalog, &request(8, &used), &mut StdRng::seed_from_u64(42));
        let b = select_adaptive(&catalog, &request(8, &used), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_focused_returns_only_requested_category() {
        let catalog = flat_catalog(4);
        let used: HashSet<String> = ["grammar_frames-0".to_string()].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(3);

        let batch = select_focused(&catalog, UsageCategory::GrammarFrames, 10, &used, &mut rng);
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|i| i.category == UsageCategory::GrammarFrames));
        assert!(batch.iter().all(|i| i.id != "grammar_frames-0"));

        let batch = select_focused(&catalog, UsageCategory::Register, 2, &HashSet::new(), &mut rng);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_focused_on_small_category_returns_all_shuffled() {
        let mut items: Vec<_> = (0..5)
            .map(|i| item(&format!("prep-{}", i), UsageCategory::Prepositions))
            .collect();
        items.push(item("coll-0", UsageCategory::Collocations));
        let catalog = Catalog::new(Vec::new(), items).unwrap();
        let catalog_order: Vec<String> = catalog
            .items_in(UsageCategory::Prepositions)
            .map(|i| i.id.clone())
            .collect();

        let mut reordered = false;
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let batch = select_focused(&catalog, UsageCategory::Prepositions, 20, &HashSet::new(), &mut rng);
            assert_eq!(batch.len(), 5);
            let ids: Vec<String> = batch.iter().map(|i| i.id.clone()).collect();
            reordered |= ids != catalog_order;
        }
        assert!(reordered);
    }

    #[test]
    fn test_focused_on_missing_category_is_empty() {
        let items = vec![item("coll-0", UsageCategory::Collocations)];
        let catalog = Catalog::new(Vec::new(), items).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_focused(&catalog, UsageCategory::WordForms, 5, &HashSet::new(), &mut rng).is_empty());
    }
}
