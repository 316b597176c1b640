//! Read-modify-write access to profiles.
//!
//! Every logical update reads the whole document, lets the gamification engine
//! compute the new study data, and writes only the fields that changed,
//! guarded by the document version. A concurrent writer makes the store
//! reject the write; the update is then recomputed from a fresh read.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::gamification::{self, achievement_kind};
use super::profile_store::{FieldUpdate, ProfileStore, StoreError};
use crate::metrics::{ACHIEVEMENTS_UNLOCKED_TOTAL, QUIZZES_TOTAL};
use crate::models::profile::{
    LogStudySessionRequest, LoginOutcome, PlanTier, QuizRecordOutcome,
};
use crate::models::{Achievement, PastQuiz, StudyData, UserProfile};
use crate::utils::retry::{retry_async_when, RetryConfig};
use crate::utils::time::calendar_day;

pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    retry: RetryConfig,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            retry: RetryConfig::contention(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the stored profile, creating a zeroed one on first sign-in.
    pub async fn ensure_profile(
        &self,
        uid: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        if let Some(profile) = self.store.get(uid).await? {
            return Ok(profile);
        }

        let created = self
            .store
            .create_if_absent(&UserProfile::new(uid, email, now))
            .await?;
        if created {
            tracing::info!(uid = %uid, "Created profile");
        }

        self.get_profile(uid).await
    }

    pub async fn get_profile(&self, uid: &str) -> Result<UserProfile, StoreError> {
        self.store
            .get(uid)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", uid)))
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    /// Stores a finished attempt and applies its rewards. Repeated delivery of
    /// the same attempt id changes nothing.
    pub async fn record_quiz_attempt(
        &self,
        uid: &str,
        attempt: PastQuiz,
    ) -> Result<QuizRecordOutcome, StoreError> {
        let quiz_id = attempt.id.clone();
        let (outcome, _) = self
            .modify(uid, |profile| {
                gamification::apply_quiz_attempt(
                    &mut profile.study_data,
                    attempt.clone(),
                    Utc::now(),
                )
            })
            .await?;

        if outcome.recorded {
            QUIZZES_TOTAL.with_label_values(&["recorded"]).inc();
            count_unlocked(&outcome.unlocked);
            tracing::info!(
                uid = %uid,
                quiz_id = %quiz_id,
                xp = outcome.reward.xp,
                coins = outcome.reward.coins,
                level = outcome.level_after,
                "Recorded quiz attempt"
            );
        } else {
            tracing::debug!(uid = %uid, quiz_id = %quiz_id, "Quiz attempt already recorded");
        }

        Ok(outcome)
    }

    pub async fn record_login(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, StoreError> {
        let today = calendar_day(now);
        let (outcome, _) = self
            .modify(uid, |profile| {
                gamification::apply_login(&mut profile.study_data, today, now)
            })
            .await?;
        count_unlocked(&outcome.unlocked);
        tracing::debug!(
            uid = %uid,
            streak = outcome.login_streak,
            change = ?outcome.change,
            "Recorded login"
        );
        Ok(outcome)
    }

    pub async fn log_study_session(
        &self,
        uid: &str,
        request: &LogStudySessionRequest,
        now: DateTime<Utc>,
    ) -> Result<StudyData, StoreError> {
        let day = request.date.unwrap_or_else(|| calendar_day(now));
        let (_, profile) = self
            .modify(uid, |profile| {
                gamification::apply_study_session(
                    &mut profile.study_data,
                    &request.subject,
                    request.hours,
                    request.progress,
                    day,
                    now,
                )
            })
            .await?;
        Ok(profile.study_data)
    }

    pub async fn set_plan(&self, uid: &str, plan: PlanTier) -> Result<UserProfile, StoreError> {
        let (_, profile) = self
            .modify(uid, |profile| {
                profile.plan = plan;
            })
            .await?;
        tracing::info!(uid = %uid, plan = plan.as_str(), "Changed plan");
        Ok(profile)
    }

    /// Compare-and-swap loop shared by every update. Only version conflicts
    /// are retried.
    async fn modify<T, F>(&self, uid: &str, mutate: F) -> Result<(T, UserProfile), StoreError>
    where
        F: Fn(&mut UserProfile) -> T + Send + Sync,
        T: Send,
    {
        let mutate = &mutate;
        retry_async_when(
            self.retry.clone(),
            || self.try_modify(uid, mutate),
            |err| {
                let conflict = matches!(err, StoreError::VersionConflict(_));
                if conflict {
                    tracing::debug!(uid = %uid, "Profile version moved, recomputing update");
                }
                conflict
            },
        )
        .await
    }

    async fn try_modify<T, F>(&self, uid: &str, mutate: &F) -> Result<(T, UserProfile), StoreError>
    where
        F: Fn(&mut UserProfile) -> T + Send + Sync,
        T: Send,
    {
        let current = self.get_profile(uid).await?;
        let mut next = current.clone();
        let result = mutate(&mut next);

        let updates = changed_fields(&current, &next)?;
        if updates.is_empty() {
            return Ok((result, current));
        }

        next.version = self
            .store
            .update_fields(uid, current.version, &updates)
            .await?;
        Ok((result, next))
    }
}

fn count_unlocked(unlocked: &[Achievement]) {
    for achievement in unlocked {
        ACHIEVEMENTS_UNLOCKED_TOTAL
            .with_label_values(&[achievement_kind(&achievement.id)])
            .inc();
    }
}

/// Field updates turning `before` into `after`, one per changed field.
fn changed_fields(
    before: &UserProfile,
    after: &UserProfile,
) -> Result<Vec<FieldUpdate>, StoreError> {
    let mut updates = Vec::new();
    if before.plan != after.plan {
        updates.push(FieldUpdate::set("plan", &after.plan)?);
    }

    let (old, new) = (&before.study_data, &after.study_data);
    if old.overall_progress != new.overall_progress {
        updates.push(FieldUpdate::set(
            "study_data.overall_progress",
            &new.overall_progress,
        )?);
    }
    if old.subjects != new.subjects {
        updates.push(FieldUpdate::set("study_data.subjects", &new.subjects)?);
    }
    if old.weekly_hours != new.weekly_hours {
        updates.push(FieldUpdate::set("study_data.weekly_hours", &new.weekly_hours)?);
    }
    if old.xp != new.xp {
        updates.push(FieldUpdate::set("study_data.xp", &new.xp)?);
    }
    if old.level != new.level {
        updates.push(FieldUpdate::set("study_data.level", &new.level)?);
    }
    if old.coins != new.coins {
        updates.push(FieldUpdate::set("study_data.coins", &new.coins)?);
    }
    if old.achievements != new.achievements {
        updates.push(FieldUpdate::set("study_data.achievements", &new.achievements)?);
    }
    if old.login_streak != new.login_streak {
        updates.push(FieldUpdate::set("study_data.login_streak", &new.login_streak)?);
    }
    if old.last_login_date != new.last_login_date {
        updates.push(FieldUpdate::set(
            "study_data.last_login_date",
            &new.last_login_date,
        )?);
    }
    if old.past_quizzes != new.past_quizzes {
        updates.push(FieldUpdate::set("study_data.past_quizzes", &new.past_quizzes)?);
    }
    Ok(updates)
}
