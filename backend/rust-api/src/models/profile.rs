use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::quiz::PastQuiz;

/// Maximum number of quiz attempts kept in a profile, newest first.
pub const PAST_QUIZZES_LIMIT: usize = 50;

/// Per-user document stored in the "profiles" collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
    /// Write counter maintained by the profile store for compare-and-swap updates.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub study_data: StudyData,
}

impl UserProfile {
    /// Fresh profile created on first sign-in.
    pub fn new(uid: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            plan: PlanTier::Free,
            created_at: now,
            version: 0,
            study_data: StudyData::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyData {
    pub overall_progress: f64,
    pub subjects: Vec<SubjectProgress>,
    pub weekly_hours: WeeklyHours,
    pub xp: u64,
    pub level: u32,
    pub coins: u64,
    pub achievements: Vec<Achievement>,
    pub login_streak: u32,
    pub last_login_date: Option<NaiveDate>,
    pub past_quizzes: Vec<PastQuiz>,
}

impl Default for StudyData {
    fn default() -> Self {
        Self {
            overall_progress: 0.0,
            subjects: Vec::new(),
            weekly_hours: WeeklyHours::default(),
            xp: 0,
            level: 1,
            coins: 0,
            achievements: Vec::new(),
            login_streak: 1,
            last_login_date: None,
            past_quizzes: Vec::new(),
        }
    }
}

impl StudyData {
    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }

    /// Mean progress across subjects, 0 when no subject has been studied yet.
    pub fn recompute_overall_progress(&mut self) {
        if self.subjects.is_empty() {
            self.overall_progress = 0.0;
            return;
        }
        let total: f64 = self.subjects.iter().map(|s| f64::from(s.progress)).sum();
        let mean = total / self.subjects.len() as f64;
        self.overall_progress = (mean * 10.0).round() / 10.0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectProgress {
    pub name: String,
    /// 0..=100
    pub progress: u8,
    pub last_studied: Option<DateTime<Utc>>,
}

/// Study hours bucketed by day of week.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeeklyHours {
    pub monday: f64,
    pub tuesday: f64,
    pub wednesday: f64,
    pub thursday: f64,
    pub friday: f64,
    pub saturday: f64,
    pub sunday: f64,
}

impl WeeklyHours {
    pub fn bucket_mut(&mut self, day: Weekday) -> &mut f64 {
        match day {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }

    pub fn total(&self) -> f64 {
        self.monday
            + self.tuesday
            + self.wednesday
            + self.thursday
            + self.friday
            + self.saturday
            + self.sunday
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
    pub icon: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogStudySessionRequest {
    #[validate(length(min = 1, max = 120))]
    pub subject: String,
    #[validate(range(min = 0.0, max = 24.0))]
    pub hours: f64,
    /// New progress for the subject; unchanged when omitted.
    #[validate(range(max = 100))]
    pub progress: Option<u8>,
    /// Calendar day the session happened; today (UTC) when omitted.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub plan: PlanTier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    Unchanged,
    Extended,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub change: StreakChange,
    pub login_streak: u32,
    pub coins_awarded: u64,
    pub unlocked: Vec<Achievement>,
}

/// XP and coins granted for one quiz attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizReward {
    pub xp: u64,
    pub coins: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizRecordOutcome {
    /// False when the attempt id was already present (repeat delivery).
    pub recorded: bool,
    pub reward: QuizReward,
    pub level_before: u32,
    pub level_after: u32,
    pub unlocked: Vec<Achievement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_profile_starts_zeroed() {
        let profile = UserProfile::new("u1", "a@b.c", Utc::now());
        assert_eq!(profile.plan, PlanTier::Free);
        assert_eq!(profile.study_data.level, 1);
        assert_eq!(profile.study_data.login_streak, 1);
        assert_eq!(profile.study_data.xp, 0);
        assert!(profile.study_data.past_quizzes.is_empty());
    }

    #[test]
    fn overall_progress_is_subject_mean() {
        let mut data = StudyData::default();
        data.recompute_overall_progress();
        assert_eq!(data.overall_progress, 0.0);

        for (name, progress) in [("math", 40), ("biology", 80), ("history", 75)] {
            data.subjects.push(SubjectProgress {
                name: name.to_string(),
                progress,
                last_studied: None,
            });
        }
        data.recompute_overall_progress();
        assert_eq!(data.overall_progress, 65.0);
    }

    #[test]
    fn weekly_hours_buckets_by_weekday() {
        let mut hours = WeeklyHours::default();
        *hours.bucket_mut(Weekday::Wed) += 1.5;
        *hours.bucket_mut(Weekday::Sun) += 2.0;
        assert_eq!(hours.wednesday, 1.5);
        assert_eq!(hours.sunday, 2.0);
        assert_eq!(hours.total(), 3.5);
    }
}
