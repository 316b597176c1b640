//! Request and response contracts of the AI flows.
//!
//! Inputs are validated before any model call; outputs are validated after the
//! model's JSON has been deserialized.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::quiz::{Difficulty, QuestionDetail, QuizQuestion};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InteractiveQuizInput {
    #[validate(length(min = 1, message = "source document is required"))]
    pub source_document: String,
    #[validate(range(min = 1, max = 50))]
    pub question_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InteractiveQuizOutput {
    #[validate(nested)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizReflectionInput {
    #[validate(length(min = 1))]
    pub quiz_name: String,
    #[validate(length(min = 1))]
    pub question_details: Vec<QuestionDetail>,
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizReflectionOutput {
    #[validate(length(min = 1))]
    pub reflection_text: String,
    #[serde(default)]
    pub identified_weaknesses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExamBlueprintInput {
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub topics: Vec<String>,
    pub exam_date: Option<NaiveDate>,
    #[validate(range(min = 0.5, max = 80.0))]
    pub hours_per_week: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExamBlueprintOutput {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1), nested)]
    pub sections: Vec<BlueprintSection>,
    #[serde(default)]
    pub study_schedule: Vec<ScheduleWeek>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BlueprintSection {
    #[validate(length(min = 1))]
    pub topic: String,
    #[validate(range(max = 100))]
    pub weight_percent: u32,
    #[serde(default)]
    pub focus_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWeek {
    pub week: u32,
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudySummaryInput {
    #[validate(length(min = 1, message = "source document is required"))]
    pub source_document: String,
    #[validate(length(max = 200))]
    pub focus: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudySummaryOutput {
    #[validate(length(min = 1))]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Body of the coaching endpoint; the progress snapshot is filled in server-side.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct StudyCoachingRequest {
    #[validate(length(max = 500))]
    pub goals: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudyCoachingInput {
    #[validate(length(max = 500))]
    pub goals: Option<String>,
    pub overall_progress: f64,
    pub level: u32,
    pub login_streak: u32,
    pub weekly_hours_total: f64,
    pub subjects: Vec<SubjectSnapshot>,
    pub recent_scores: Vec<RecentScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub name: String,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentScore {
    pub quiz_name: String,
    pub score: u32,
    pub total_questions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudyCoachingOutput {
    #[validate(length(min = 1))]
    pub advice: String,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WritingFeedbackInput {
    #[validate(length(min = 1, max = 20000))]
    pub text: String,
    #[validate(length(max = 1000))]
    pub assignment_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WritingFeedbackOutput {
    #[validate(length(min = 1))]
    pub overall_feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[validate(range(max = 100))]
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConceptExplainerInput {
    #[validate(length(min = 1, max = 300))]
    pub concept: String,
    #[validate(length(max = 100))]
    pub audience_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConceptExplainerOutput {
    #[validate(length(min = 1))]
    pub explanation: String,
    #[serde(default)]
    pub analogies: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}
