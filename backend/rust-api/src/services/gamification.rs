//! XP, coins, levels, login streaks and achievements.
//!
//! Everything here is a pure transformation of [`StudyData`]; persisting the
//! result is the profile service's job.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::models::profile::{
    LoginOutcome, QuizRecordOutcome, QuizReward, StreakChange, SubjectProgress,
    PAST_QUIZZES_LIMIT,
};
use crate::models::{Achievement, Difficulty, PastQuiz, StudyData};
use crate::utils::{slug::slugify, time::days_between};

pub const XP_PER_LEVEL: u64 = 500;

const QUIZ_BASE_XP: u64 = 50;
const XP_PER_CORRECT: u64 = 10;
const TIMED_XP_BONUS: u64 = 20;
const PERFECT_XP_BONUS: u64 = 50;

const QUIZ_BASE_COINS: u64 = 10;
const COINS_PER_CORRECT: u64 = 1;
const TIMED_COIN_BONUS: u64 = 5;
const PERFECT_COIN_BONUS: u64 = 20;

const STREAK_COINS_PER_DAY: u64 = 5;
const STREAK_MILESTONE_DAYS: u32 = 7;
const STREAK_MILESTONE_COINS: u64 = 50;
const FRESH_STREAK_COINS: u64 = 5;

pub const FIRST_QUIZ_ACHIEVEMENT: &str = "first_quiz_completed";

pub fn difficulty_multiplier(difficulty: Option<Difficulty>) -> f64 {
    match difficulty {
        Some(Difficulty::Medium) => 1.2,
        Some(Difficulty::Hard) => 1.5,
        Some(Difficulty::Easy) | None => 1.0,
    }
}

fn scaled(base: u64, difficulty: Option<Difficulty>) -> u64 {
    (base as f64 * difficulty_multiplier(difficulty)).round() as u64
}

/// XP and coins earned by one attempt.
pub fn quiz_reward(attempt: &PastQuiz) -> QuizReward {
    let score = u64::from(attempt.score.min(attempt.total_questions));

    let mut xp = scaled(QUIZ_BASE_XP + XP_PER_CORRECT * score, attempt.difficulty);
    let mut coins = scaled(QUIZ_BASE_COINS + COINS_PER_CORRECT * score, attempt.difficulty);

    if attempt.completed_in_time() {
        xp += TIMED_XP_BONUS;
        coins += TIMED_COIN_BONUS;
    }
    if attempt.is_perfect() {
        xp += PERFECT_XP_BONUS;
        coins += PERFECT_COIN_BONUS;
    }

    QuizReward { xp, coins }
}

/// Level reached with `xp` points: one level per full `XP_PER_LEVEL`, starting at 1.
pub fn level_for_xp(xp: u64) -> u32 {
    u32::try_from(xp / XP_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Adds an achievement unless one with the same id is already present.
pub fn unlock(data: &mut StudyData, achievement: Achievement) -> bool {
    if data.has_achievement(&achievement.id) {
        return false;
    }
    data.achievements.push(achievement);
    true
}

/// The single additive updater for XP and coins. Recomputes the level (never
/// lowering it) and returns any level-up achievement unlocked on the way.
pub fn apply_grant(
    data: &mut StudyData,
    xp: u64,
    coins: u64,
    now: DateTime<Utc>,
) -> Vec<Achievement> {
    data.xp = data.xp.saturating_add(xp);
    data.coins = data.coins.saturating_add(coins);

    let mut unlocked = Vec::new();
    let reached = level_for_xp(data.xp);
    if reached > data.level {
        data.level = reached;
        let achievement = level_up_achievement(reached, now);
        if unlock(data, achievement.clone()) {
            unlocked.push(achievement);
        }
    }
    unlocked
}

/// Inserts a finished attempt at the front of the history and applies its
/// rewards. Recording the same attempt id twice is a no-op.
pub fn apply_quiz_attempt(
    data: &mut StudyData,
    attempt: PastQuiz,
    now: DateTime<Utc>,
) -> QuizRecordOutcome {
    let level_before = data.level;

    if data.past_quizzes.iter().any(|q| q.id == attempt.id) {
        return QuizRecordOutcome {
            recorded: false,
            reward: QuizReward::default(),
            level_before,
            level_after: level_before,
            unlocked: Vec::new(),
        };
    }

    let reward = quiz_reward(&attempt);
    let first_quiz = data.past_quizzes.is_empty();
    let mut candidates = Vec::new();
    if first_quiz {
        candidates.push(first_quiz_achievement(now));
    }
    if attempt.is_perfect() {
        candidates.push(perfect_quiz_achievement(&attempt.name, now));
    }

    data.past_quizzes.insert(0, attempt);
    data.past_quizzes.truncate(PAST_QUIZZES_LIMIT);

    let mut unlocked: Vec<Achievement> = candidates
        .into_iter()
        .filter(|a| unlock(data, a.clone()))
        .collect();
    unlocked.extend(apply_grant(data, reward.xp, reward.coins, now));

    QuizRecordOutcome {
        recorded: true,
        reward,
        level_before,
        level_after: data.level,
        unlocked,
    }
}

/// Updates the login streak for a sign-in on `today` (UTC calendar day).
pub fn apply_login(data: &mut StudyData, today: NaiveDate, now: DateTime<Utc>) -> LoginOutcome {
    let gap = data.last_login_date.map(|last| days_between(last, today));

    let (change, coins, milestone) = match gap {
        // Same day, or a clock that went backwards: nothing to update
        Some(days) if days <= 0 => {
            return LoginOutcome {
                change: StreakChange::Unchanged,
                login_streak: data.login_streak,
                coins_awarded: 0,
                unlocked: Vec::new(),
            }
        }
        Some(1) => {
            data.login_streak = data.login_streak.saturating_add(1);
            let streak = data.login_streak;
            let mut coins = STREAK_COINS_PER_DAY * u64::from(streak);
            let milestone = streak % STREAK_MILESTONE_DAYS == 0;
            if milestone {
                coins += STREAK_MILESTONE_COINS;
            }
            (StreakChange::Extended, coins, milestone)
        }
        _ => {
            data.login_streak = 1;
            (StreakChange::Reset, FRESH_STREAK_COINS, false)
        }
    };

    data.last_login_date = Some(today);

    let mut unlocked = Vec::new();
    if milestone {
        let achievement = streak_achievement(data.login_streak, now);
        if unlock(data, achievement.clone()) {
            unlocked.push(achievement);
        }
    }
    unlocked.extend(apply_grant(data, 0, coins, now));

    LoginOutcome {
        change,
        login_streak: data.login_streak,
        coins_awarded: coins,
        unlocked,
    }
}

/// Adds study hours to the weekday bucket of `day` and updates subject progress.
pub fn apply_study_session(
    data: &mut StudyData,
    subject: &str,
    hours: f64,
    progress: Option<u8>,
    day: NaiveDate,
    now: DateTime<Utc>,
) {
    *data.weekly_hours.bucket_mut(day.weekday()) += hours.max(0.0);

    match data
        .subjects
        .iter_mut()
        .find(|s| s.name.eq_ignore_ascii_case(subject))
    {
        Some(existing) => {
            if let Some(progress) = progress {
                existing.progress = progress.min(100);
            }
            existing.last_studied = Some(now);
        }
        None => data.subjects.push(SubjectProgress {
            name: subject.to_string(),
            progress: progress.unwrap_or(0).min(100),
            last_studied: Some(now),
        }),
    }

    data.recompute_overall_progress();
}

pub fn first_quiz_achievement(now: DateTime<Utc>) -> Achievement {
    Achievement {
        id: FIRST_QUIZ_ACHIEVEMENT.to_string(),
        name: "First Steps".to_string(),
        description: "Completed your first quiz".to_string(),
        earned_at: now,
        icon: "award".to_string(),
    }
}

pub fn perfect_quiz_achievement(quiz_name: &str, now: DateTime<Utc>) -> Achievement {
    Achievement {
        id: format!("perfect_quiz_{}", slugify(quiz_name)),
        name: format!("Perfect Score: {}", quiz_name),
        description: format!("Answered every question of \"{}\" correctly", quiz_name),
        earned_at: now,
        icon: "star".to_string(),
    }
}

pub fn level_up_achievement(level: u32, now: DateTime<Utc>) -> Achievement {
    Achievement {
        id: format!("level_up_{}", level),
        name: format!("Level {}", level),
        description: format!("Reached level {}", level),
        earned_at: now,
        icon: "trending-up".to_string(),
    }
}

pub fn streak_achievement(days: u32, now: DateTime<Utc>) -> Achievement {
    Achievement {
        id: format!("streak_{}_days", days),
        name: format!("{}-Day Streak", days),
        description: format!("Logged in {} days in a row", days),
        earned_at: now,
        icon: "flame".to_string(),
    }
}

/// Label used by the achievements metric (`level_up`, `streak`, ...).
pub fn achievement_kind(id: &str) -> &'static str {
    if id == FIRST_QUIZ_ACHIEVEMENT {
        "first_quiz"
    } else if id.starts_with("perfect_quiz_") {
        "perfect_quiz"
    } else if id.starts_with("level_up_") {
        "level_up"
    } else if id.starts_with("streak_") {
        "streak"
    } else {
        "other"
    }
}
