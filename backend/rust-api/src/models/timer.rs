use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quiz::QuizEndReason;

/// Events broadcast by a quiz session and streamed to the browser over SSE.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuizEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
    StateChanged(StateChanged),
    QuizFinished(QuizFinished),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub quiz_id: String,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub quiz_id: String,
    pub unanswered: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateChanged {
    pub quiz_id: String,
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuizFinished {
    pub quiz_id: String,
    pub score: u32,
    pub total_questions: u32,
    pub end_reason: QuizEndReason,
    pub persisted: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QuizEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            QuizEvent::TimerTick(_) => "timer-tick",
            QuizEvent::TimeExpired(_) => "time-expired",
            QuizEvent::StateChanged(_) => "state-changed",
            QuizEvent::QuizFinished(_) => "quiz-finished",
        }
    }
}
