//! Stateless AI flows: validate input, render a prompt, call the model in
//! JSON mode, validate the reply.

pub mod model;
pub mod prompts;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use validator::Validate;

use self::model::{LanguageModel, ModelError, ModelRequest};
use crate::metrics::track_flow;
use crate::models::flows::{
    ConceptExplainerInput, ConceptExplainerOutput, ExamBlueprintInput, ExamBlueprintOutput,
    InteractiveQuizInput, InteractiveQuizOutput, QuizReflectionInput, QuizReflectionOutput,
    RecentScore, StudyCoachingInput, StudyCoachingOutput, StudyCoachingRequest,
    StudySummaryInput, StudySummaryOutput, SubjectSnapshot, WritingFeedbackInput,
    WritingFeedbackOutput,
};
use crate::models::StudyData;

/// Quizzes fed to the coaching prompt.
const COACHING_RECENT_QUIZZES: usize = 5;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} flow returned no results")]
    EmptyOutput(&'static str),
    #[error("{flow} flow returned an invalid result: {reason}")]
    InvalidOutput { flow: &'static str, reason: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub struct FlowService {
    model: Arc<dyn LanguageModel>,
}

impl FlowService {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn generate_interactive_quiz(
        &self,
        input: &InteractiveQuizInput,
    ) -> Result<InteractiveQuizOutput, FlowError> {
        // Extra questions are dropped before any checks run on them
        let count = input.question_count as usize;
        let output: InteractiveQuizOutput = self
            .run_shaped(
                "quiz",
                input,
                prompts::interactive_quiz(input),
                |output: &mut InteractiveQuizOutput| output.questions.truncate(count),
            )
            .await?;

        if output.questions.is_empty() {
            return Err(FlowError::EmptyOutput("quiz"));
        }
        if let Some(bad) = output
            .questions
            .iter()
            .find(|q| !q.options.contains(&q.answer))
        {
            return Err(FlowError::InvalidOutput {
                flow: "quiz",
                reason: format!("answer of \"{}\" is not one of its options", bad.question),
            });
        }

        Ok(output)
    }

    pub async fn generate_quiz_reflection(
        &self,
        input: &QuizReflectionInput,
    ) -> Result<QuizReflectionOutput, FlowError> {
        self.run("quiz-reflection", input, prompts::quiz_reflection(input))
            .await
    }

    pub async fn generate_exam_blueprint(
        &self,
        input: &ExamBlueprintInput,
    ) -> Result<ExamBlueprintOutput, FlowError> {
        self.run("exam-blueprint", input, prompts::exam_blueprint(input))
            .await
    }

    pub async fn summarize_study_material(
        &self,
        input: &StudySummaryInput,
    ) -> Result<StudySummaryOutput, FlowError> {
        self.run("study-summary", input, prompts::study_summary(input))
            .await
    }

    pub async fn generate_study_coaching(
        &self,
        input: &StudyCoachingInput,
    ) -> Result<StudyCoachingOutput, FlowError> {
        self.run("study-coaching", input, prompts::study_coaching(input))
            .await
    }

    pub async fn review_writing(
        &self,
        input: &WritingFeedbackInput,
    ) -> Result<WritingFeedbackOutput, FlowError> {
        self.run("writing-feedback", input, prompts::writing_feedback(input))
            .await
    }

    pub async fn explain_concept(
        &self,
        input: &ConceptExplainerInput,
    ) -> Result<ConceptExplainerOutput, FlowError> {
        self.run("concept-explainer", input, prompts::concept_explainer(input))
            .await
    }

    async fn run<I, O>(&self, flow: &'static str, input: &I, prompt: String) -> Result<O, FlowError>
    where
        I: Validate,
        O: DeserializeOwned + Validate,
    {
        self.run_shaped(flow, input, prompt, |_: &mut O| {}).await
    }

    /// Like [`FlowService::run`], with `shape` applied to the parsed output
    /// before it is validated.
    async fn run_shaped<I, O>(
        &self,
        flow: &'static str,
        input: &I,
        prompt: String,
        shape: impl FnOnce(&mut O),
    ) -> Result<O, FlowError>
    where
        I: Validate,
        O: DeserializeOwned + Validate,
    {
        input
            .validate()
            .map_err(|e| FlowError::InvalidInput(e.to_string()))?;

        let request = ModelRequest {
            flow,
            system: prompts::SYSTEM_TUTOR.to_string(),
            prompt,
        };

        track_flow(flow, async {
            let reply = self.model.generate_json(&request).await?;
            let mut output: O =
                serde_json::from_value(reply).map_err(|e| FlowError::InvalidOutput {
                    flow,
                    reason: e.to_string(),
                })?;
            shape(&mut output);
            output.validate().map_err(|e| FlowError::InvalidOutput {
                flow,
                reason: e.to_string(),
            })?;
            Ok::<O, FlowError>(output)
        })
        .await
        .inspect_err(|err| tracing::warn!(flow, "Flow failed: {}", err))
    }
}

/// Coaching input built from the caller's own study data.
pub fn coaching_input(request: StudyCoachingRequest, data: &StudyData) -> StudyCoachingInput {
    StudyCoachingInput {
        goals: request.goals,
        overall_progress: data.overall_progress,
        level: data.level,
        login_streak: data.login_streak,
        weekly_hours_total: data.weekly_hours.total(),
        subjects: data
            .subjects
            .iter()
            .map(|s| SubjectSnapshot {
                name: s.name.clone(),
                progress: s.progress,
            })
            .collect(),
        recent_scores: data
            .past_quizzes
            .iter()
            .take(COACHING_RECENT_QUIZZES)
            .map(|q| RecentScore {
                quiz_name: q.name.clone(),
                score: q.score,
                total_questions: q.total_questions,
            })
            .collect(),
    }
}
