//! Prompt templates. Each template states the JSON shape the reply must have.

use crate::models::flows::{
    ConceptExplainerInput, ExamBlueprintInput, InteractiveQuizInput, QuizReflectionInput,
    StudyCoachingInput, StudySummaryInput, WritingFeedbackInput,
};

pub const SYSTEM_TUTOR: &str = "You are a patient study assistant for students. \
Answer only with a single JSON object that matches the requested shape. \
Do not wrap the JSON in Markdown.";

pub fn interactive_quiz(input: &InteractiveQuizInput) -> String {
    format!(
        "Create exactly {count} multiple-choice questions that test understanding of the \
study material below.\n\
Rules:\n\
- every question has exactly 4 distinct options\n\
- \"answer\" is copied verbatim from one of the options\n\
- questions only use facts present in the material\n\n\
Reply shape: {{\"questions\": [{{\"question\": string, \"answer\": string, \"options\": [string, string, string, string]}}]}}\n\n\
Study material:\n\"\"\"\n{document}\n\"\"\"",
        count = input.question_count,
        document = input.source_document,
    )
}

pub fn quiz_reflection(input: &QuizReflectionInput) -> String {
    let answers = input
        .question_details
        .iter()
        .enumerate()
        .map(|(i, detail)| {
            format!(
                "{}. {}\n   student answer: {}\n   correct answer: {}\n   result: {}",
                i + 1,
                detail.question,
                detail.user_answer,
                detail.correct_answer,
                if detail.is_correct { "correct" } else { "incorrect" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let difficulty = input
        .difficulty
        .map(|d| d.as_str())
        .unwrap_or("unspecified");

    format!(
        "A student just finished the quiz \"{name}\" (difficulty: {difficulty}).\n\
Write a short, encouraging reflection addressed to the student: what went well, \
which topics to review, and one concrete next step.\n\n\
Reply shape: {{\"reflection_text\": string, \"identified_weaknesses\": [string]}}\n\n\
Answers:\n{answers}",
        name = input.quiz_name,
    )
}

pub fn exam_blueprint(input: &ExamBlueprintInput) -> String {
    let exam_date = input
        .exam_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "not set".to_string());
    let hours = input
        .hours_per_week
        .map(|h| format!("{:.1}", h))
        .unwrap_or_else(|| "not set".to_string());

    format!(
        "Build an exam preparation blueprint for the subject \"{subject}\".\n\
Topics: {topics}\n\
Exam date: {exam_date}\n\
Available study hours per week: {hours}\n\
Weight each topic by its expected share of the exam (weights add up to 100) and \
plan the weeks until the exam.\n\n\
Reply shape: {{\"title\": string, \"sections\": [{{\"topic\": string, \"weight_percent\": integer, \"focus_points\": [string]}}], \
\"study_schedule\": [{{\"week\": integer, \"goals\": [string]}}]}}",
        subject = input.subject,
        topics = input.topics.join(", "),
    )
}

pub fn study_summary(input: &StudySummaryInput) -> String {
    let focus = input
        .focus
        .as_deref()
        .map(|f| format!("Focus on: {}\n", f))
        .unwrap_or_default();

    format!(
        "Summarize the study material below for revision.\n{focus}\
Reply shape: {{\"summary\": string, \"key_points\": [string]}}\n\n\
Study material:\n\"\"\"\n{document}\n\"\"\"",
        document = input.source_document,
    )
}

pub fn study_coaching(input: &StudyCoachingInput) -> String {
    let subjects = if input.subjects.is_empty() {
        "none yet".to_string()
    } else {
        input
            .subjects
            .iter()
            .map(|s| format!("{} ({}%)", s.name, s.progress))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let scores = if input.recent_scores.is_empty() {
        "no quizzes yet".to_string()
    } else {
        input
            .recent_scores
            .iter()
            .map(|s| format!("{}: {}/{}", s.quiz_name, s.score, s.total_questions))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Coach a student based on their progress.\n\
Goals: {goals}\n\
Overall progress: {progress:.1}%\n\
Level: {level}, login streak: {streak} days\n\
Hours studied this week: {hours:.1}\n\
Subjects: {subjects}\n\
Recent quizzes: {scores}\n\n\
Reply shape: {{\"advice\": string, \"recommended_actions\": [string]}}",
        goals = input.goals.as_deref().unwrap_or("not stated"),
        progress = input.overall_progress,
        level = input.level,
        streak = input.login_streak,
        hours = input.weekly_hours_total,
    )
}

pub fn writing_feedback(input: &WritingFeedbackInput) -> String {
    let assignment = input
        .assignment_prompt
        .as_deref()
        .map(|p| format!("Assignment: {}\n", p))
        .unwrap_or_default();

    format!(
        "Review the student's writing.\n{assignment}\
Score it from 0 to 100 and give specific, actionable feedback.\n\n\
Reply shape: {{\"overall_feedback\": string, \"strengths\": [string], \"improvements\": [string], \"score\": integer}}\n\n\
Text:\n\"\"\"\n{text}\n\"\"\"",
        text = input.text,
    )
}

pub fn concept_explainer(input: &ConceptExplainerInput) -> String {
    format!(
        "Explain the concept \"{concept}\" to a {audience} learner.\n\
Use plain language, then give analogies and worked examples.\n\n\
Reply shape: {{\"explanation\": string, \"analogies\": [string], \"examples\": [string]}}",
        concept = input.concept,
        audience = input.audience_level.as_deref().unwrap_or("high school"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_prompt_carries_count_and_material() {
        let prompt = interactive_quiz(&InteractiveQuizInput {
            source_document: "Mitochondria produce ATP.".to_string(),
            question_count: 3,
        });
        assert!(prompt.contains("exactly 3 multiple-choice"));
        assert!(prompt.contains("Mitochondria produce ATP."));
        assert!(prompt.contains("\"options\""));
    }
}
