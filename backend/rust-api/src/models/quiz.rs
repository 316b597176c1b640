use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Answer recorded for every slot still open when the countdown reaches zero.
pub const TIME_UP_ANSWER: &str = "Not Answered (Time Up)";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// A generated multiple-choice question with its stored correct answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct QuizQuestion {
    #[validate(length(min = 1))]
    pub question: String,
    #[validate(length(min = 1))]
    pub answer: String,
    #[validate(length(equal = 4))]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionDetail {
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub options: Vec<String>,
    pub is_correct: bool,
    #[serde(default)]
    pub question_type: QuestionType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizTiming {
    pub was_timed: bool,
    pub minutes_per_question: u32,
    pub time_remaining_seconds: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuizEndReason {
    #[default]
    Completed,
    TimeUp,
}

impl QuizEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizEndReason::Completed => "completed",
            QuizEndReason::TimeUp => "time_up",
        }
    }
}

/// Immutable record of one finished quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PastQuiz {
    pub id: String,
    pub name: String,
    pub taken_at: DateTime<Utc>,
    pub score: u32,
    pub total_questions: u32,
    pub questions: Vec<QuestionDetail>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub timing: Option<QuizTiming>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub end_reason: QuizEndReason,
}

impl PastQuiz {
    pub fn is_perfect(&self) -> bool {
        self.total_questions > 0 && self.score == self.total_questions
    }

    /// Timed attempts finished before the countdown ran out.
    pub fn completed_in_time(&self) -> bool {
        matches!(self.timing, Some(t) if t.was_timed) && self.end_reason == QuizEndReason::Completed
    }
}

#[derive(Debug, Deserialize, Default, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateQuizRequest {
    /// Falls back to the name given when the quiz was created.
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub source_document: String,
    pub question_count: u32,
    pub difficulty: Option<Difficulty>,
    /// Enables timed mode when present.
    #[validate(range(min = 1, max = 30))]
    pub minutes_per_question: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SelectOptionRequest {
    pub option: String,
}
