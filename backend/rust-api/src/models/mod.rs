pub mod account;
pub mod flows;
pub mod profile;
pub mod quiz;
pub mod timer;
pub mod webhook;

pub use profile::{Achievement, StudyData, UserProfile};
pub use quiz::{Difficulty, PastQuiz, QuestionDetail, QuizQuestion};
