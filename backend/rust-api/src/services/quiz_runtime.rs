//! State machine for a single quiz attempt.
//!
//! `Idle -> Generating -> Active <-> Answered -> Finished`. The runtime is
//! synchronous and owns no timer; the session actor drives `tick` once per
//! second and performs generation and persistence around it.

use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::quiz::{
    QuestionDetail, QuestionType, QuizEndReason, QuizTiming, TIME_UP_ANSWER,
};
use crate::models::{Difficulty, PastQuiz, QuizQuestion};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuizError {
    #[error("question count must be between 1 and {max}, got {requested}")]
    InvalidQuestionCount { requested: u32, max: u32 },
    #[error("source document is required")]
    MissingSource,
    #[error("cannot {action} while the quiz is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("select an option before submitting")]
    NoSelection,
    #[error("'{0}' is not one of the question's options")]
    UnknownOption(String),
    #[error("quiz generation failed: {0}")]
    GenerationFailed(String),
    #[error("quiz {0} not found")]
    NotFound(String),
    #[error("quiz session {0} is closed")]
    Closed(String),
    #[error("at most {0} quiz sessions may be open at once")]
    TooManySessions(usize),
}

impl QuizError {
    pub fn status(&self) -> StatusCode {
        match self {
            QuizError::InvalidQuestionCount { .. }
            | QuizError::MissingSource
            | QuizError::UnknownOption(_) => StatusCode::BAD_REQUEST,
            QuizError::InvalidState { .. } | QuizError::NoSelection => StatusCode::CONFLICT,
            QuizError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            QuizError::NotFound(_) | QuizError::Closed(_) => StatusCode::NOT_FOUND,
            QuizError::TooManySessions(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// What to generate: resolved from the generate request and the quiz's name.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSpec {
    pub name: String,
    pub source_document: String,
    pub question_count: u32,
    pub difficulty: Option<Difficulty>,
    pub minutes_per_question: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub total_seconds: u32,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub id: String,
    pub spec: QuizSpec,
    pub questions: Vec<QuizQuestion>,
    pub index: usize,
    pub answers: Vec<Option<String>>,
    pub selection: Option<String>,
    pub countdown: Option<Countdown>,
}

impl Attempt {
    fn current(&self) -> &QuizQuestion {
        &self.questions[self.index]
    }

    fn unanswered(&self) -> u32 {
        self.answers.iter().filter(|a| a.is_none()).count() as u32
    }

    fn into_past_quiz(self, end_reason: QuizEndReason) -> PastQuiz {
        let questions: Vec<QuestionDetail> = self
            .questions
            .iter()
            .zip(&self.answers)
            .map(|(question, answer)| {
                let user_answer = answer.clone().unwrap_or_else(|| TIME_UP_ANSWER.to_string());
                QuestionDetail {
                    is_correct: user_answer == question.answer,
                    question: question.question.clone(),
                    user_answer,
                    correct_answer: question.answer.clone(),
                    options: question.options.clone(),
                    question_type: QuestionType::MultipleChoice,
                }
            })
            .collect();

        let timing = match (self.spec.minutes_per_question, self.countdown) {
            (Some(minutes), Some(countdown)) => Some(QuizTiming {
                was_timed: true,
                minutes_per_question: minutes,
                time_remaining_seconds: countdown.remaining_seconds,
            }),
            _ => None,
        };

        PastQuiz {
            id: self.id,
            name: self.spec.name,
            taken_at: Utc::now(),
            score: questions.iter().filter(|q| q.is_correct).count() as u32,
            total_questions: questions.len() as u32,
            questions,
            reflection: None,
            timing,
            difficulty: self.spec.difficulty,
            end_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizState {
    Idle { last_error: Option<String> },
    Generating { spec: QuizSpec },
    Active(Attempt),
    Answered(Attempt),
    Finished(PastQuiz),
}

impl QuizState {
    pub fn name(&self) -> &'static str {
        match self {
            QuizState::Idle { .. } => "idle",
            QuizState::Generating { .. } => "generating",
            QuizState::Active(_) => "active",
            QuizState::Answered(_) => "answered",
            QuizState::Finished(_) => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub is_correct: bool,
    pub user_answer: String,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No countdown is running.
    Idle,
    Ticked(Countdown),
    Expired { attempt: PastQuiz, unanswered: u32 },
}

#[derive(Debug, Clone)]
pub struct QuizRuntime {
    state: QuizState,
    max_questions: u32,
}

impl QuizRuntime {
    pub fn new(max_questions: u32) -> Self {
        Self {
            state: QuizState::Idle { last_error: None },
            max_questions,
        }
    }

    pub fn state(&self) -> &QuizState {
        &self.state
    }

    pub fn countdown(&self) -> Option<Countdown> {
        match &self.state {
            QuizState::Active(attempt) | QuizState::Answered(attempt) => attempt.countdown,
            _ => None,
        }
    }

    pub fn begin_generation(&mut self, spec: QuizSpec) -> Result<(), QuizError> {
        if !matches!(self.state, QuizState::Idle { .. }) {
            return Err(self.invalid("generate"));
        }
        if spec.question_count == 0 || spec.question_count > self.max_questions {
            return Err(QuizError::InvalidQuestionCount {
                requested: spec.question_count,
                max: self.max_questions,
            });
        }
        if spec.source_document.trim().is_empty() {
            return Err(QuizError::MissingSource);
        }

        self.state = QuizState::Generating { spec };
        Ok(())
    }

    /// Feeds the generation result back. An empty or failed result returns
    /// the quiz to idle with the error recorded.
    pub fn complete_generation(
        &mut self,
        result: Result<Vec<QuizQuestion>, String>,
    ) -> Result<(), QuizError> {
        let spec = match &self.state {
            QuizState::Generating { spec } => spec.clone(),
            _ => return Err(self.invalid("complete generation")),
        };

        let questions = match result {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => return Err(self.fail_generation("no questions were generated".to_string())),
            Err(reason) => return Err(self.fail_generation(reason)),
        };

        let countdown = spec.minutes_per_question.map(|minutes| {
            let total_seconds = questions.len() as u32 * minutes * 60;
            Countdown {
                total_seconds,
                remaining_seconds: total_seconds,
            }
        });

        self.state = QuizState::Active(Attempt {
            id: Uuid::new_v4().to_string(),
            answers: vec![None; questions.len()],
            questions,
            spec,
            index: 0,
            selection: None,
            countdown,
        });
        Ok(())
    }

    pub fn select(&mut self, option: &str) -> Result<(), QuizError> {
        let state = self.state.name();
        let attempt = match &mut self.state {
            QuizState::Active(attempt) => attempt,
            _ => {
                return Err(QuizError::InvalidState {
                    action: "select an option",
                    state,
                })
            }
        };
        if !attempt.current().options.iter().any(|o| o == option) {
            return Err(QuizError::UnknownOption(option.to_string()));
        }
        attempt.selection = Some(option.to_string());
        Ok(())
    }

    /// Records the pending selection for the visible question. Correctness is
    /// exact string equality with the stored answer.
    pub fn submit(&mut self) -> Result<Feedback, QuizError> {
        let attempt = match &self.state {
            QuizState::Active(attempt) => attempt,
            _ => return Err(self.invalid("submit")),
        };
        let selection = attempt.selection.clone().ok_or(QuizError::NoSelection)?;

        let QuizState::Active(mut attempt) = self.take_state() else {
            unreachable!("state checked above");
        };
        let index = attempt.index;
        attempt.answers[index] = Some(selection.clone());
        attempt.selection = None;

        let correct_answer = attempt.current().answer.clone();
        let feedback = Feedback {
            is_correct: selection == correct_answer,
            user_answer: selection,
            correct_answer,
        };
        self.state = QuizState::Answered(attempt);
        Ok(feedback)
    }

    /// Moves to the next question; after the last one returns the finished attempt.
    pub fn advance(&mut self) -> Result<Option<PastQuiz>, QuizError> {
        if !matches!(self.state, QuizState::Answered(_)) {
            return Err(self.invalid("advance"));
        }
        let QuizState::Answered(mut attempt) = self.take_state() else {
            unreachable!("state checked above");
        };

        if attempt.index + 1 < attempt.questions.len() {
            attempt.index += 1;
            self.state = QuizState::Active(attempt);
            return Ok(None);
        }

        let finished = attempt.into_past_quiz(QuizEndReason::Completed);
        self.state = QuizState::Finished(finished.clone());
        Ok(Some(finished))
    }

    /// One second of countdown. Reaching zero ends the attempt.
    pub fn tick(&mut self) -> TickOutcome {
        let countdown = match &mut self.state {
            QuizState::Active(attempt) | QuizState::Answered(attempt) => match &mut attempt.countdown {
                Some(countdown) => countdown,
                None => return TickOutcome::Idle,
            },
            _ => return TickOutcome::Idle,
        };

        countdown.remaining_seconds = countdown.remaining_seconds.saturating_sub(1);
        if countdown.remaining_seconds > 0 {
            return TickOutcome::Ticked(*countdown);
        }

        match self.time_up() {
            Some((attempt, unanswered)) => TickOutcome::Expired {
                attempt,
                unanswered,
            },
            None => TickOutcome::Idle,
        }
    }

    /// Marks every open slot as timed out and finishes the attempt. No-op once
    /// the quiz is no longer running.
    pub fn time_up(&mut self) -> Option<(PastQuiz, u32)> {
        if !matches!(self.state, QuizState::Active(_) | QuizState::Answered(_)) {
            return None;
        }
        let (QuizState::Active(mut attempt) | QuizState::Answered(mut attempt)) = self.take_state()
        else {
            unreachable!("state checked above");
        };

        let unanswered = attempt.unanswered();
        for slot in attempt.answers.iter_mut().filter(|a| a.is_none()) {
            *slot = Some(TIME_UP_ANSWER.to_string());
        }
        if let Some(countdown) = attempt.countdown.as_mut() {
            countdown.remaining_seconds = 0;
        }
        attempt.selection = None;

        let finished = attempt.into_past_quiz(QuizEndReason::TimeUp);
        self.state = QuizState::Finished(finished.clone());
        Some((finished, unanswered))
    }

    /// Attaches the generated reflection to the finished attempt.
    pub fn set_reflection(&mut self, reflection: String) {
        if let QuizState::Finished(attempt) = &mut self.state {
            attempt.reflection = Some(reflection);
        }
    }

    /// "Try another quiz": back to a fresh idle state.
    pub fn reset(&mut self) -> Result<(), QuizError> {
        match self.state {
            QuizState::Finished(_) | QuizState::Idle { .. } => {
                self.state = QuizState::Idle { last_error: None };
                Ok(())
            }
            _ => Err(self.invalid("reset")),
        }
    }

    pub fn view(&self) -> QuizView {
        let mut view = QuizView {
            state: self.state.name(),
            name: None,
            question_index: None,
            total_questions: None,
            question: None,
            selection: None,
            feedback: None,
            answered: 0,
            countdown: self.countdown(),
            result: None,
            last_error: None,
        };

        match &self.state {
            QuizState::Idle { last_error } => view.last_error = last_error.clone(),
            QuizState::Generating { spec } => view.name = Some(spec.name.clone()),
            QuizState::Active(attempt) | QuizState::Answered(attempt) => {
                let current = attempt.current();
                view.name = Some(attempt.spec.name.clone());
                view.question_index = Some(attempt.index);
                view.total_questions = Some(attempt.questions.len());
                view.question = Some(QuestionView {
                    question: current.question.clone(),
                    options: current.options.clone(),
                });
                view.selection = attempt.selection.clone();
                view.answered = attempt.answers.iter().filter(|a| a.is_some()).count();
                if let (QuizState::Answered(_), Some(answer)) =
                    (&self.state, &attempt.answers[attempt.index])
                {
                    view.feedback = Some(Feedback {
                        is_correct: *answer == current.answer,
                        user_answer: answer.clone(),
                        correct_answer: current.answer.clone(),
                    });
                }
            }
            QuizState::Finished(attempt) => {
                view.name = Some(attempt.name.clone());
                view.total_questions = Some(attempt.total_questions as usize);
                view.answered = attempt.total_questions as usize;
                view.result = Some(attempt.clone());
            }
        }
        view
    }

    fn take_state(&mut self) -> QuizState {
        std::mem::replace(&mut self.state, QuizState::Idle { last_error: None })
    }

    fn fail_generation(&mut self, reason: String) -> QuizError {
        self.state = QuizState::Idle {
            last_error: Some(reason.clone()),
        };
        QuizError::GenerationFailed(reason)
    }

    fn invalid(&self, action: &'static str) -> QuizError {
        QuizError::InvalidState {
            action,
            state: self.state.name(),
        }
    }
}

/// Client-facing snapshot. The correct answer of the visible question is only
/// included once it has been submitted.
#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    pub state: &'static str,
    pub name: Option<String>,
    pub question_index: Option<usize>,
    pub total_questions: Option<usize>,
    pub question: Option<QuestionView>,
    pub selection: Option<String>,
    pub feedback: Option<Feedback>,
    pub answered: usize,
    pub countdown: Option<Countdown>,
    pub result: Option<PastQuiz>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub question: String,
    pub options: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(n: usize) -> QuizQuestion {
        QuizQuestion {
            question: format!("Question {}", n),
            answer: format!("right {}", n),
            options: vec![
                format!("right {}", n),
                format!("wrong a{}", n),
                format!("wrong b{}", n),
                format!("wrong c{}", n),
            ],
        }
    }

    fn spec(count: u32, minutes: Option<u32>) -> QuizSpec {
        QuizSpec {
            name: "Cell Biology".to_string(),
            source_document: "Cells are the basic unit of life.".to_string(),
            question_count: count,
            difficulty: None,
            minutes_per_question: minutes,
        }
    }

    fn active(count: usize, minutes: Option<u32>) -> QuizRuntime {
        let mut runtime = QuizRuntime::new(50);
        runtime.begin_generation(spec(count as u32, minutes)).unwrap();
        runtime
            .complete_generation(Ok((0..count).map(question).collect()))
            .unwrap();
        runtime
    }

    fn answer(runtime: &mut QuizRuntime, option: &str) -> Option<PastQuiz> {
        runtime.select(option).unwrap();
        runtime.submit().unwrap();
        runtime.advance().unwrap()
    }

    #[test]
    fn begin_generation_validates_spec() {
        let mut runtime = QuizRuntime::new(10);
        assert_eq!(
            runtime.begin_generation(spec(0, None)),
            Err(QuizError::InvalidQuestionCount {
                requested: 0,
                max: 10
            })
        );
        assert!(matches!(
            runtime.begin_generation(spec(11, None)),
            Err(QuizError::InvalidQuestionCount { .. })
        ));
        let mut blank = spec(3, None);
        blank.source_document = "   ".to_string();
        assert_eq!(runtime.begin_generation(blank), Err(QuizError::MissingSource));
        assert_eq!(runtime.state().name(), "idle");
    }

    #[test]
    fn failed_generation_returns_to_idle() {
        let mut runtime = QuizRuntime::new(50);
        runtime.begin_generation(spec(3, None)).unwrap();
        assert!(matches!(
            runtime.complete_generation(Ok(Vec::new())),
            Err(QuizError::GenerationFailed(_))
        ));
        assert!(matches!(
            runtime.state(),
            QuizState::Idle {
                last_error: Some(_)
            }
        ));
        // can try again
        runtime.begin_generation(spec(3, None)).unwrap();
    }

    #[test]
    fn submit_without_selection_is_rejected_and_state_kept() {
        let mut runtime = active(2, None);
        let before = runtime.state().clone();
        assert_eq!(runtime.submit(), Err(QuizError::NoSelection));
        assert_eq!(runtime.state(), &before);
    }

    #[test]
    fn selection_must_be_an_option() {
        let mut runtime = active(1, None);
        assert!(matches!(
            runtime.select("made up"),
            Err(QuizError::UnknownOption(_))
        ));
    }

    #[test]
    fn one_submission_per_question() {
        let mut runtime = active(2, None);
        runtime.select("right 0").unwrap();
        runtime.submit().unwrap();
        assert!(matches!(
            runtime.submit(),
            Err(QuizError::InvalidState {
                state: "answered",
                ..
            })
        ));
        assert!(runtime.select("wrong a0").is_err());
    }

    #[test]
    fn feedback_reports_correct_answer() {
        let mut runtime = active(1, None);
        runtime.select("wrong a0").unwrap();
        let feedback = runtime.submit().unwrap();
        assert!(!feedback.is_correct);
        assert_eq!(feedback.correct_answer, "right 0");
        assert_eq!(runtime.view().feedback, Some(feedback));
    }

    #[test]
    fn active_view_hides_answer() {
        let runtime = active(2, None);
        let view = runtime.view();
        assert_eq!(view.state, "active");
        assert!(view.feedback.is_none());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("answer").is_none());
        assert_eq!(json["question"]["options"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn perfect_three_question_quiz() {
        let mut runtime = active(3, None);
        assert!(answer(&mut runtime, "right 0").is_none());
        assert!(answer(&mut runtime, "right 1").is_none());
        let finished = answer(&mut runtime, "right 2").unwrap();

        assert_eq!(finished.score, 3);
        assert_eq!(finished.total_questions, 3);
        assert_eq!(finished.end_reason, QuizEndReason::Completed);
        assert!(finished.timing.is_none());
        assert_eq!(runtime.state().name(), "finished");
    }

    #[test]
    fn score_counts_exact_matches_only() {
        let mut runtime = QuizRuntime::new(50);
        runtime.begin_generation(spec(2, None)).unwrap();
        let mut q = question(0);
        q.options[1] = "Right 0".to_string();
        q.options[2] = "right 0 ".to_string();
        runtime.complete_generation(Ok(vec![q, question(1)])).unwrap();

        answer(&mut runtime, "Right 0");
        let finished = answer(&mut runtime, "right 1").unwrap();
        assert_eq!(finished.score, 1);
        assert!(!finished.questions[0].is_correct);
        assert_eq!(
            finished.score as usize,
            finished.questions.iter().filter(|q| q.is_correct).count()
        );
    }

    #[test]
    fn timed_quiz_expires_and_marks_unanswered() {
        let mut runtime = active(5, Some(1));
        assert_eq!(
            runtime.countdown(),
            Some(Countdown {
                total_seconds: 300,
                remaining_seconds: 300
            })
        );

        answer(&mut runtime, "right 0");
        answer(&mut runtime, "right 1");
        runtime.select("wrong a2").unwrap();
        runtime.submit().unwrap();
        runtime.advance().unwrap();

        let mut expired = None;
        for _ in 0..300 {
            if let TickOutcome::Expired {
                attempt,
                unanswered,
            } = runtime.tick()
            {
                expired = Some((attempt, unanswered));
                break;
            }
        }
        let (finished, unanswered) = expired.expect("countdown should expire");

        assert_eq!(unanswered, 2);
        assert_eq!(finished.score, 2);
        assert_eq!(finished.end_reason, QuizEndReason::TimeUp);
        assert_eq!(
            finished
                .questions
                .iter()
                .filter(|q| q.user_answer == TIME_UP_ANSWER)
                .count(),
            2
        );
        let timing = finished.timing.unwrap();
        assert!(timing.was_timed);
        assert_eq!(timing.time_remaining_seconds, 0);
    }

    #[test]
    fn time_up_is_idempotent() {
        let mut runtime = active(2, Some(1));
        assert!(runtime.time_up().is_some());
        let after_first = runtime.state().clone();
        assert!(runtime.time_up().is_none());
        assert_eq!(runtime.tick(), TickOutcome::Idle);
        assert_eq!(runtime.state(), &after_first);
    }

    #[test]
    fn untimed_quiz_never_ticks() {
        let mut runtime = active(2, None);
        assert_eq!(runtime.tick(), TickOutcome::Idle);
    }

    #[test]
    fn countdown_keeps_running_while_answered() {
        let mut runtime = active(2, Some(1));
        runtime.select("right 0").unwrap();
        runtime.submit().unwrap();
        assert!(matches!(runtime.tick(), TickOutcome::Ticked(c) if c.remaining_seconds == 119));
    }

    #[test]
    fn reset_only_from_finished_or_idle() {
        let mut runtime = active(1, None);
        assert!(runtime.reset().is_err());
        answer(&mut runtime, "right 0");
        runtime.reset().unwrap();
        assert_eq!(runtime.state().name(), "idle");
    }

    #[test]
    fn reflection_attaches_to_finished_attempt() {
        let mut runtime = active(1, None);
        answer(&mut runtime, "right 0");
        runtime.set_reflection("Nice work".to_string());
        let view = runtime.view();
        assert_eq!(view.result.unwrap().reflection.as_deref(), Some("Nice work"));
    }
}
