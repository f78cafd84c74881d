use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::{Db, Snapshot};
use crate::feedback::{self, Feedback};
use crate::metrics;
use crate::models::{
    AccuracyPoint, Answer, AnsweredItem, BundleState, ContentItem, DiagnosticResult, DrillSession,
    ProfileUpdate, ReadingPoint, SessionMode, UsageCategory, UserProfile, UserProgress,
};
use crate::selector::{self, AdaptiveRequest};
use crate::srs;

/// Accuracy history entries kept per category.
const ACCURACY_HISTORY_LEN: usize = 30;
const DASHBOARD_SESSIONS: usize = 5;
const DASHBOARD_WEAKNESSES: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishSession {
    pub mode: SessionMode,
    pub duration_sec: u64,
    pub items: Vec<AnsweredItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub exam_readiness: u8,
    pub top_weaknesses: Vec<UsageCategory>,
    /// Newest first.
    pub recent_sessions: Vec<DrillSession>,
    pub recent_accuracy: Option<f64>,
    pub latest_diagnostic: Option<DiagnosticResult>,
    pub progress: Option<UserProgress>,
    pub profile: Option<UserProfile>,
    /// A completed diagnostic or at least one finished drill.
    pub meaningful_engagement: bool,
}

pub struct App {
    pub db: Db,
    pub catalog: Arc<Catalog>,
    pub config: Config,
    rng: StdRng,
}

impl App {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::seed()?,
        };
        log::info!("loaded catalog with {} items", catalog.len());

        let db = Db::connect(&config.database_url).await?;
        Ok(Self::with_parts(config, Arc::new(catalog), db))
    }

    pub fn with_parts(config: Config, catalog: Arc<Catalog>, db: Db) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            db,
            catalog,
            config,
            rng,
        }
    }

    /// Focused drill when a category is given, adaptive drill otherwise.
    pub async fn next_batch(
        &mut self,
        count: Option<usize>,
        focus: Option<UsageCategory>,
        used: &HashSet<String>,
    ) -> anyhow::Result<Vec<ContentItem>> {
        let count = count.unwrap_or(self.config.batch_size);

        if let Some(category) = focus {
            return Ok(selector::select_focused(
                &self.catalog,
                category,
                count,
                used,
                &mut self.rng,
            ));
        }

        let diagnostic = self.db.latest_diagnostic().await?;
        let sessions = self.db.recent_sessions(self.config.drill_history).await?;
        let states = self.db.bundle_states().await?;

        let request = AdaptiveRequest {
            count,
            diagnostic: diagnostic.as_ref(),
            recent_sessions: &sessions,
            bundle_states: &states,
            used_item_ids: used,
            now: Utc::now(),
            weights: self.config.weights,
        };
        Ok(selector::select_adaptive(&self.catalog, &request, &mut self.rng))
    }

    pub fn grade(&self, item_id: &str, response: &Answer) -> Option<Feedback> {
        self.catalog
            .items()
            .find(|item| item.id == item_id)
            .map(|item| feedback::grade(item, response))
    }

    /// Stores a diagnostic with its derived weakest categories filled in.
    pub async fn record_diagnostic(&self, mut diagnostic: DiagnosticResult) -> anyhow::Result<DiagnosticResult> {
        diagnostic.weaknesses = metrics::diagnostic_weaknesses(&diagnostic.usage.category_scores);
        self.db.save_diagnostic(&diagnostic).await?;

        if let Some(completed_at) = diagnostic.completed_at {
            let mut progress = self.load_progress(completed_at).await?;
            progress.reading_history.push(ReadingPoint {
                date: completed_at.date_naive(),
                wpm: diagnostic.reading.wpm,
                accuracy: diagnostic.reading.accuracy,
            });
            self.refresh_readiness(&mut progress, completed_at).await?;
            self.db.save_progress(&progress).await?;
        }

        log::info!(
            "stored diagnostic {} (weaknesses: {:?})",
            diagnostic.id,
            diagnostic.weaknesses
        );
        Ok(diagnostic)
    }

    /// Summarizes and stores a finished drill, then updates progress.
    /// Bundle review states are left untouched.
    pub async fn finish_session(&self, finished: FinishSession) -> anyhow::Result<DrillSession> {
        let now = Utc::now();
        let items: Vec<AnsweredItem> = finished
            .items
            .into_iter()
            .map(|answered| self.regrade(answered))
            .collect();

        let session = DrillSession {
            id: format!("session-{}", Uuid::new_v4()),
            created_at: now,
            mode: finished.mode,
            duration_sec: finished.duration_sec,
            results: metrics::summarize(&items),
            items,
        };
        self.db.add_session(&session).await?;

        let mut progress = self.load_progress(now).await?;
        progress.total_drill_time += session.duration_sec;
        progress.drills_completed += 1;
        let today = now.date_naive();
        for (category, tally) in session.results.category_breakdown.iter() {
            if let Some(accuracy) = tally.accuracy() {
                let history = progress.usage_accuracy.get_mut(category);
                history.push(AccuracyPoint { date: today, accuracy });
                if history.len() > ACCURACY_HISTORY_LEN {
                    let excess = history.len() - ACCURACY_HISTORY_LEN;
                    history.drain(..excess);
                }
            }
        }
        self.refresh_readiness(&mut progress, now).await?;
        self.db.save_progress(&progress).await?;

        log::info!(
            "stored {:?} session {}: {}/{} correct",
            session.mode,
            session.id,
            session.results.correct,
            session.results.total_items
        );
        Ok(session)
    }

    // Catalog items replace the client's copy; the catalog answer wins over
    // the client's verdict when the response is known.
    fn regrade(&self, mut answered: AnsweredItem) -> AnsweredItem {
        let Some(item) = self.catalog.items().find(|i| i.id == answered.item.id) else {
            return answered;
        };
        if let Some(response) = &answered.user_answer {
            answered.correct = feedback::grade(item, response).correct;
        }
        answered.item = item.clone();
        answered
    }

    pub async fn dashboard(&self) -> anyhow::Result<Dashboard> {
        let diagnostic = self.db.latest_diagnostic().await?;
        let history = self.db.recent_sessions(self.config.readiness_history).await?;

        let exam_readiness = metrics::exam_readiness(diagnostic.as_ref(), &history);
        let top_weaknesses = metrics::top_weaknesses(
            diagnostic.as_ref(),
            &history,
            DASHBOARD_WEAKNESSES,
            self.config.weights,
        );

        let recent_sessions: Vec<DrillSession> = history
            .iter()
            .rev()
            .take(DASHBOARD_SESSIONS)
            .cloned()
            .collect();
        let recent_accuracy = if recent_sessions.is_empty() {
            None
        } else {
            let sum: f64 = recent_sessions.iter().map(|s| s.results.accuracy).sum();
            Some(sum / recent_sessions.len() as f64)
        };

        Ok(Dashboard {
            exam_readiness,
            top_weaknesses,
            recent_sessions,
            recent_accuracy,
            latest_diagnostic: diagnostic,
            progress: self.db.progress().await?,
            profile: self.db.profile().await?,
            meaningful_engagement: self.db.has_meaningful_engagement().await?,
        })
    }

    pub async fn profile(&self) -> anyhow::Result<Option<UserProfile>> {
        self.db.profile().await
    }

    /// Merges the update into the stored profile, creating it on first use.
    pub async fn update_profile(&self, update: ProfileUpdate) -> anyhow::Result<UserProfile> {
        let now = Utc::now();
        let mut profile = self
            .db
            .profile()
            .await?
            .unwrap_or_else(|| UserProfile::new(now));
        profile.apply(update, now);
        self.db.save_profile(&profile).await?;

        log::info!("profile updated (exam: {:?}, date: {:?})", profile.exam_type, profile.exam_date);
        Ok(profile)
    }

    /// Explicit spaced-repetition update for one bundle. `None` when the
    /// catalog has no such bundle.
    pub async fn review_bundle(&self, bundle_id: &str, correct: bool) -> anyhow::Result<Option<BundleState>> {
        if self.catalog.bundle(bundle_id).is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let current = self
            .db
            .bundle_state(bundle_id)
            .await?
            .unwrap_or_else(|| BundleState::new(bundle_id.to_string(), now));
        let next = srs::review(&current, correct, now);
        self.db.save_bundle_state(&next).await?;

        log::info!(
            "bundle {} reviewed (correct: {}), next due in {} days",
            bundle_id,
            correct,
            next.interval_days
        );
        Ok(Some(next))
    }

    pub async fn export(&self) -> anyhow::Result<Snapshot> {
        self.db.export().await
    }

    pub async fn import(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.db.import(snapshot).await
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.db.clear().await
    }

    async fn load_progress(&self, now: DateTime<Utc>) -> anyhow::Result<UserProgress> {
        Ok(self
            .db
            .progress()
            .await?
            .unwrap_or_else(|| UserProgress::new(now)))
    }

    async fn refresh_readiness(&self, progress: &mut UserProgress, now: DateTime<Utc>) -> anyhow::Result<()> {
        let diagnostic = self.db.latest_diagnostic().await?;
        let history = self.db.recent_sessions(self.config.readiness_history).await?;
        progress.exam_readiness_score = metrics::exam_readiness(diagnostic.as_ref(), &history);
        progress.last_updated = now;
        Ok(())
    }
}
