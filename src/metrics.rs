use std::cmp::Ordering;

use crate::models::{
    AnsweredItem, CategoryScores, DiagnosticResult, DrillSession, SessionResults, Tally,
    UsageCategory,
};
use crate::weakness::{combined_scores, BlendWeights};

/// Readiness before any diagnostic has been completed.
const BASE_READINESS: f64 = 50.0;
const DIAGNOSTIC_FLOOR: f64 = 40.0;
const COMPONENT_POINTS: f64 = 30.0;
const SESSION_SHARE: f64 = 0.3;

/// Number of categories reported as a diagnostic's weaknesses.
pub const DIAGNOSTIC_WEAKNESS_COUNT: usize = 3;

/// Exam readiness in [0, 100].
///
/// A finished diagnostic contributes 40 points plus up to 30 for reading
/// accuracy and up to 30 for usage accuracy (15 when no usage items were
/// answered). Recent sessions then pull the score toward their mean
/// accuracy with a 30% share.
pub fn exam_readiness(diagnostic: Option<&DiagnosticResult>, sessions: &[DrillSession]) -> u8 {
    let mut score = BASE_READINESS;

    if let Some(d) = diagnostic.filter(|d| d.completed_at.is_some()) {
        let reading = d.reading.accuracy * COMPONENT_POINTS;

        let mut usage_total = Tally::default();
        for (_, tally) in d.usage.category_scores.iter() {
            usage_total.add(tally);
        }
        let usage = usage_total
            .accuracy()
            .map(|accuracy| accuracy * COMPONENT_POINTS)
            .unwrap_or(COMPONENT_POINTS / 2.0);

        score = DIAGNOSTIC_FLOOR + reading + usage;
    }

    if !sessions.is_empty() {
        let mean = sessions.iter().map(|s| s.results.accuracy).sum::<f64>() / sessions.len() as f64;
        score = score * (1.0 - SESSION_SHARE) + mean * 100.0 * SESSION_SHARE;
    }

    score.clamp(0.0, 100.0).round() as u8
}

/// Up to `n` categories by combined weakness, weakest first. Ties keep
/// canonical category order.
pub fn top_weaknesses(
    diagnostic: Option<&DiagnosticResult>,
    sessions: &[DrillSession],
    n: usize,
    weights: BlendWeights,
) -> Vec<UsageCategory> {
    let combined = combined_scores(diagnostic, sessions, weights);
    let mut ranked: Vec<(UsageCategory, f64)> = combined.iter().map(|(c, s)| (c, *s)).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.into_iter().take(n).map(|(c, _)| c).collect()
}

/// The weakest answered categories of a diagnostic, lowest accuracy first.
pub fn diagnostic_weaknesses(scores: &CategoryScores) -> Vec<UsageCategory> {
    let mut answered: Vec<(UsageCategory, f64)> = scores
        .iter()
        .filter_map(|(c, tally)| tally.accuracy().map(|a| (c, a)))
        .collect();
    answered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    answered
        .into_iter()
        .take(DIAGNOSTIC_WEAKNESS_COUNT)
        .map(|(c, _)| c)
        .collect()
}

pub fn summarize(items: &[AnsweredItem]) -> SessionResults {
    let mut breakdown = CategoryScores::default();
    let mut overall = Tally::default();
    for answered in items {
        breakdown.get_mut(answered.item.category).record(answered.correct);
        overall.record(answered.correct);
    }

    SessionResults {
        total_items: overall.total,
        correct: overall.correct,
        accuracy: overall.accuracy().unwrap_or(0.0),
        category_breakdown: breakdown,
    }
}
