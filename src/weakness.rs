use serde::{Deserialize, Serialize};

use crate::models::{CategoryScores, DiagnosticResult, DrillSession, Tally, WeaknessScores};

/// Score for a category nobody has answered yet.
pub const NEUTRAL_WEAKNESS: f64 = 0.5;

/// How much the diagnostic and the recent sessions each contribute to the
/// combined weakness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub diagnostic: f64,
    pub sessions: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            diagnostic: 0.3,
            sessions: 0.7,
        }
    }
}

fn weakness_of(tally: &Tally) -> f64 {
    tally
        .accuracy()
        .map(|accuracy| 1.0 - accuracy)
        .unwrap_or(NEUTRAL_WEAKNESS)
}

fn from_tallies(tallies: &CategoryScores) -> WeaknessScores {
    WeaknessScores::from_fn(|category| weakness_of(tallies.get(category)))
}

pub fn score_from_diagnostic(diagnostic: Option<&DiagnosticResult>) -> WeaknessScores {
    match diagnostic {
        Some(d) => from_tallies(&d.usage.category_scores),
        None => WeaknessScores::splat(NEUTRAL_WEAKNESS),
    }
}

/// Sums the per-category tallies of every session before scoring, so a
/// session with many items in a category outweighs a short one.
pub fn score_from_sessions(sessions: &[DrillSession]) -> WeaknessScores {
    let mut totals = CategoryScores::default();
    for session in sessions {
        for (category, tally) in session.results.category_breakdown.iter() {
            totals.get_mut(category).add(tally);
        }
    }
    from_tallies(&totals)
}

pub fn combine(
    diagnostic: &WeaknessScores,
    sessions: &WeaknessScores,
    weights: BlendWeights,
) -> WeaknessScores {
    WeaknessScores::from_fn(|category| {
        diagnostic.get(category) * weights.diagnostic + sessions.get(category) * weights.sessions
    })
}

pub fn combined_scores(
    diagnostic: Option<&DiagnosticResult>,
    sessions: &[DrillSession],
    weights: BlendWeights,
) -> WeaknessScores {
    combine(
        &score_from_diagnostic(diagnostic),
        &score_from_sessions(sessions),
        weights,
    )
}
