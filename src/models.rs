use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a drill item teaches. Declaration order is the canonical catalog
/// order and is used to break ties between categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    Collocations,
    Prepositions,
    Register,
    GrammarFrames,
    WordForms,
}

impl UsageCategory {
    pub const ALL: [UsageCategory; 5] = [
        UsageCategory::Collocations,
        UsageCategory::Prepositions,
        UsageCategory::Register,
        UsageCategory::GrammarFrames,
        UsageCategory::WordForms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Collocations => "collocations",
            UsageCategory::Prepositions => "prepositions",
            UsageCategory::Register => "register",
            UsageCategory::GrammarFrames => "grammar_frames",
            UsageCategory::WordForms => "word_forms",
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown usage category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for UsageCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsageCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillType {
    CollocationMcq,
    PrepositionFill,
    RegisterChoice,
    SentenceBuild,
}

/// Expected answer: one string, or an ordered list for multi-blank and
/// token reorder items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Ordered(Vec<String>),
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Single(s) => f.write_str(s),
            Answer::Ordered(tokens) => f.write_str(&tokens.join(" ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: DrillType,
    pub category: UsageCategory,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    pub answer: Answer,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    #[serde(default)]
    pub headword: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub items: Vec<ContentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResult {
    pub correct: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-learner review schedule of one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleState {
    pub bundle_id: String,
    pub ease: f64,
    pub interval_days: u32,
    pub due_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LastResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u32,
    pub total: u32,
}

impl Tally {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn add(&mut self, other: &Tally) {
        self.correct += other.correct;
        self.total += other.total;
    }

    /// `None` when nothing was answered.
    pub fn accuracy(&self) -> Option<f64> {
        if self.total > 0 {
            Some(self.correct as f64 / self.total as f64)
        } else {
            None
        }
    }
}

/// One value for each of the five usage categories. Serialized as a
/// map keyed by the snake_case category tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMap<T> {
    pub collocations: T,
    pub prepositions: T,
    pub register: T,
    pub grammar_frames: T,
    pub word_forms: T,
}

impl<T: Clone> CategoryMap<T> {
    pub fn splat(value: T) -> Self {
        Self {
            collocations: value.clone(),
            prepositions: value.clone(),
            register: value.clone(),
            grammar_frames: value.clone(),
            word_forms: value,
        }
    }
}

impl<T> CategoryMap<T> {
    pub fn from_fn(mut f: impl FnMut(UsageCategory) -> T) -> Self {
        Self {
            collocations: f(UsageCategory::Collocations),
            prepositions: f(UsageCategory::Prepositions),
            register: f(UsageCategory::Register),
            grammar_frames: f(UsageCategory::GrammarFrames),
            word_forms: f(UsageCategory::WordForms),
        }
    }

    pub fn get(&self, category: UsageCategory) -> &T {
        match category {
            UsageCategory::Collocations => &self.collocations,
            UsageCategory::Prepositions => &self.prepositions,
            UsageCategory::Register => &self.register,
            UsageCategory::GrammarFrames => &self.grammar_frames,
            UsageCategory::WordForms => &self.word_forms,
        }
    }

    pub fn get_mut(&mut self, category: UsageCategory) -> &mut T {
        match category {
            UsageCategory::Collocations => &mut self.collocations,
            UsageCategory::Prepositions => &mut self.prepositions,
            UsageCategory::Register => &mut self.register,
            UsageCategory::GrammarFrames => &mut self.grammar_frames,
            UsageCategory::WordForms => &mut self.word_forms,
        }
    }

    /// Entries in canonical category order.
    pub fn iter(&self) -> impl Iterator<Item = (UsageCategory, &T)> + '_ {
        UsageCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

pub type CategoryScores = CategoryMap<Tally>;

/// Category -> weakness in [0, 1], where 1.0 is maximum observed inaccuracy.
pub type WeaknessScores = CategoryMap<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingAnswer {
    pub question_id: String,
    pub selected: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingResult {
    pub passage_id: String,
    pub wpm: u32,
    pub accuracy: f64,
    /// Milliseconds.
    pub time_spent: u64,
    #[serde(default)]
    pub answers: Vec<ReadingAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnswer {
    pub item_id: String,
    pub category: UsageCategory,
    pub correct: bool,
    pub time_spent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResult {
    #[serde(default)]
    pub items: Vec<UsageAnswer>,
    #[serde(default)]
    pub category_scores: CategoryScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResult {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub reading: ReadingResult,
    #[serde(default)]
    pub usage: UsageResult,
    #[serde(default)]
    pub weaknesses: Vec<UsageCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Adaptive,
    Focused,
    Cram,
}

/// A content item as the learner answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredItem {
    #[serde(flatten)]
    pub item: ContentItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<Answer>,
    pub correct: bool,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub total_items: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub category_breakdown: CategoryScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mode: SessionMode,
    pub duration_sec: u64,
    pub items: Vec<AnsweredItem>,
    pub results: SessionResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyPoint {
    pub date: NaiveDate,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPoint {
    pub date: NaiveDate,
    pub wpm: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub total_drill_time: u64,
    pub drills_completed: u32,
    #[serde(default)]
    pub reading_history: Vec<ReadingPoint>,
    #[serde(default)]
    pub usage_accuracy: CategoryMap<Vec<AccuracyPoint>>,
    pub exam_readiness_score: u8,
    pub last_updated: DateTime<Utc>,
}

impl UserProgress {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_drill_time: 0,
            drills_completed: 0,
            reading_history: Vec::new(),
            usage_accuracy: CategoryMap::default(),
            exam_readiness_score: 0,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "IELTS")]
    Ielts,
    #[serde(rename = "TOEFL")]
    Toefl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

/// Who the learner is and what they are preparing for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_type: Option<ExamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_score: Option<String>,
    /// First language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_estimate: Option<Level>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile edit. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub exam_type: Option<ExamType>,
    pub exam_date: Option<NaiveDate>,
    pub target_score: Option<String>,
    pub l1: Option<String>,
    pub level_estimate: Option<Level>,
}

impl UserProfile {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            exam_type: None,
            exam_date: None,
            target_score: None,
            l1: None,
            level_estimate: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        if update.exam_type.is_some() {
            self.exam_type = update.exam_type;
        }
        if update.exam_date.is_some() {
            self.exam_date = update.exam_date;
        }
        if update.target_score.is_some() {
            self.target_score = update.target_score;
        }
        if update.l1.is_some() {
            self.l1 = update.l1;
        }
        if update.level_estimate.is_some() {
            self.level_estimate = update.level_estimate;
        }
        self.updated_at = now;
    }
}
