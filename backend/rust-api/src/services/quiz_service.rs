//! Live quiz sessions.
//!
//! Each session is a [`QuizRuntime`] owned by one tokio task. HTTP handlers
//! and the one-second countdown reach it only through the task's command
//! channel, so answer submission and time-up never race. Events go out on a
//! broadcast channel whose sender lives only inside the task: subscribers see
//! the channel close as soon as the session stops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::flows::FlowService;
use super::profile_service::ProfileService;
use super::quiz_runtime::{QuizError, QuizRuntime, QuizSpec, QuizView, TickOutcome};
use crate::config::QuizConfig;
use crate::metrics::{ANSWERS_SUBMITTED_TOTAL, QUIZZES_ACTIVE, QUIZZES_TOTAL};
use crate::models::flows::{InteractiveQuizInput, QuizReflectionInput};
use crate::models::profile::QuizRecordOutcome;
use crate::models::quiz::GenerateQuizRequest;
use crate::models::timer::{QuizEvent, QuizFinished, StateChanged, TimeExpired, TimerTick};
use crate::models::PastQuiz;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;
const DEFAULT_QUIZ_NAME: &str = "Untitled Quiz";

/// Outcome of saving a finished attempt to the profile.
#[derive(Debug, Clone, Serialize)]
pub struct Persistence {
    pub persisted: bool,
    pub outcome: Option<QuizRecordOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSnapshot {
    pub quiz_id: String,
    #[serde(flatten)]
    pub view: QuizView,
    pub persistence: Option<Persistence>,
}

type Reply<T> = oneshot::Sender<Result<T, QuizError>>;
type Sessions = RwLock<HashMap<String, QuizHandle>>;

enum Command {
    View(Reply<QuizSnapshot>),
    Generate(GenerateQuizRequest, Reply<QuizSnapshot>),
    Select(String, Reply<QuizSnapshot>),
    Submit(Reply<QuizSnapshot>),
    Advance(Reply<QuizSnapshot>),
    Reset(Reply<QuizSnapshot>),
    Subscribe(Reply<broadcast::Receiver<QuizEvent>>),
    Close,
}

/// Services a session needs besides its own state.
pub struct QuizDeps {
    pub profiles: Arc<ProfileService>,
    pub flows: Arc<FlowService>,
    pub config: QuizConfig,
}

#[derive(Clone)]
pub struct QuizHandle {
    pub id: String,
    pub owner: String,
    commands: mpsc::Sender<Command>,
}

impl QuizHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, QuizError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| QuizError::Closed(self.id.clone()))?;
        response
            .await
            .map_err(|_| QuizError::Closed(self.id.clone()))?
    }

    pub async fn view(&self) -> Result<QuizSnapshot, QuizError> {
        self.request(Command::View).await
    }

    pub async fn generate(&self, request: GenerateQuizRequest) -> Result<QuizSnapshot, QuizError> {
        self.request(|reply| Command::Generate(request, reply)).await
    }

    pub async fn select(&self, option: String) -> Result<QuizSnapshot, QuizError> {
        self.request(|reply| Command::Select(option, reply)).await
    }

    pub async fn submit(&self) -> Result<QuizSnapshot, QuizError> {
        self.request(Command::Submit).await
    }

    pub async fn advance(&self) -> Result<QuizSnapshot, QuizError> {
        self.request(Command::Advance).await
    }

    pub async fn reset(&self) -> Result<QuizSnapshot, QuizError> {
        self.request(Command::Reset).await
    }

    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<QuizEvent>, QuizError> {
        self.request(Command::Subscribe).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

struct QuizActor {
    id: String,
    owner: String,
    default_name: Option<String>,
    runtime: QuizRuntime,
    persistence: Option<Persistence>,
    deps: Arc<QuizDeps>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<QuizEvent>,
    sessions: Arc<Sessions>,
}

impl QuizActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle_timeout = Duration::from_secs(self.deps.config.idle_timeout_seconds);
        let mut last_activity = Instant::now();

        loop {
            let counting = self.runtime.countdown().is_some();
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, Command::Close) {
                        break;
                    }
                    self.handle(command).await;
                    // The countdown starts on the first entry into the active state
                    if !counting && self.runtime.countdown().is_some() {
                        ticker.reset();
                    }
                    last_activity = Instant::now();
                }
                _ = ticker.tick(), if counting => {
                    if self.on_tick().await {
                        last_activity = Instant::now();
                    }
                }
                _ = tokio::time::sleep_until(last_activity + idle_timeout), if !counting => {
                    tracing::info!(quiz_id = %self.id, "Closing idle quiz session");
                    break;
                }
            }
        }

        self.sessions.write().await.remove(&self.id);
        QUIZZES_ACTIVE.dec();
        QUIZZES_TOTAL.with_label_values(&["closed"]).inc();
        tracing::debug!(quiz_id = %self.id, "Quiz session stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::View(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::Generate(request, reply) => {
                let result = self.generate(request).await.map(|_| self.snapshot());
                let _ = reply.send(result);
            }
            Command::Select(option, reply) => {
                let result = self.runtime.select(&option).map(|_| self.snapshot());
                let _ = reply.send(result);
            }
            Command::Submit(reply) => {
                let result = self.runtime.submit().map(|feedback| {
                    ANSWERS_SUBMITTED_TOTAL
                        .with_label_values(&[if feedback.is_correct { "true" } else { "false" }])
                        .inc();
                    self.emit_state();
                    self.snapshot()
                });
                let _ = reply.send(result);
            }
            Command::Advance(reply) => {
                let result = match self.runtime.advance() {
                    Ok(Some(attempt)) => {
                        self.emit_state();
                        self.finish(attempt).await;
                        Ok(self.snapshot())
                    }
                    Ok(None) => {
                        self.emit_state();
                        Ok(self.snapshot())
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Command::Reset(reply) => {
                let result = self.runtime.reset().map(|_| {
                    self.persistence = None;
                    self.emit_state();
                    self.snapshot()
                });
                let _ = reply.send(result);
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(Ok(self.events.subscribe()));
            }
            Command::Close => {}
        }
    }

    async fn generate(&mut self, request: GenerateQuizRequest) -> Result<(), QuizError> {
        let spec = QuizSpec {
            name: request
                .name
                .or_else(|| self.default_name.clone())
                .unwrap_or_else(|| DEFAULT_QUIZ_NAME.to_string()),
            source_document: request.source_document,
            question_count: request.question_count,
            difficulty: request.difficulty,
            minutes_per_question: request.minutes_per_question,
        };
        let input = InteractiveQuizInput {
            source_document: spec.source_document.clone(),
            question_count: spec.question_count,
        };

        self.runtime.begin_generation(spec)?;
        self.emit_state();

        let generated = self
            .deps
            .flows
            .generate_interactive_quiz(&input)
            .await
            .map(|output| output.questions)
            .map_err(|err| err.to_string());

        let result = self.runtime.complete_generation(generated);
        self.emit_state();
        match &result {
            Ok(()) => {
                QUIZZES_TOTAL.with_label_values(&["started"]).inc();
                tracing::info!(quiz_id = %self.id, owner = %self.owner, "Quiz started");
            }
            Err(err) => {
                QUIZZES_TOTAL.with_label_values(&["generation_failed"]).inc();
                tracing::warn!(quiz_id = %self.id, "Quiz generation failed: {}", err);
            }
        }
        result
    }

    /// Returns true when the countdown finished the attempt.
    async fn on_tick(&mut self) -> bool {
        match self.runtime.tick() {
            TickOutcome::Idle => false,
            TickOutcome::Ticked(countdown) => {
                self.emit(QuizEvent::TimerTick(TimerTick {
                    quiz_id: self.id.clone(),
                    remaining_seconds: countdown.remaining_seconds,
                    total_seconds: countdown.total_seconds,
                    timestamp: Utc::now(),
                }));
                false
            }
            TickOutcome::Expired {
                attempt,
                unanswered,
            } => {
                tracing::info!(quiz_id = %self.id, unanswered, "Quiz time expired");
                self.emit(QuizEvent::TimeExpired(TimeExpired {
                    quiz_id: self.id.clone(),
                    unanswered,
                    timestamp: Utc::now(),
                    message: "Time is up".to_string(),
                }));
                self.emit_state();
                self.finish(attempt).await;
                true
            }
        }
    }

    /// Reflection (optional) and profile write for a finished attempt. Runs
    /// once per attempt: the runtime only yields a finished attempt once.
    async fn finish(&mut self, mut attempt: PastQuiz) {
        if self.deps.config.reflections_enabled {
            let input = QuizReflectionInput {
                quiz_name: attempt.name.clone(),
                question_details: attempt.questions.clone(),
                difficulty: attempt.difficulty,
            };
            match self.deps.flows.generate_quiz_reflection(&input).await {
                Ok(reflection) => {
                    attempt.reflection = Some(reflection.reflection_text.clone());
                    self.runtime.set_reflection(reflection.reflection_text);
                }
                Err(err) => {
                    tracing::warn!(quiz_id = %self.id, "Reflection generation failed: {}", err);
                }
            }
        }

        let (score, total, end_reason) = (
            attempt.score,
            attempt.total_questions,
            attempt.end_reason,
        );
        let persistence = match self
            .deps
            .profiles
            .record_quiz_attempt(&self.owner, attempt)
            .await
        {
            Ok(outcome) => Persistence {
                persisted: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => {
                tracing::error!(
                    quiz_id = %self.id,
                    owner = %self.owner,
                    "Failed to save quiz attempt: {}",
                    err
                );
                Persistence {
                    persisted: false,
                    outcome: None,
                    error: Some(err.to_string()),
                }
            }
        };

        QUIZZES_TOTAL
            .with_label_values(&[end_reason.as_str()])
            .inc();
        self.emit(QuizEvent::QuizFinished(QuizFinished {
            quiz_id: self.id.clone(),
            score,
            total_questions: total,
            end_reason,
            persisted: persistence.persisted,
            error: persistence.error.clone(),
            timestamp: Utc::now(),
        }));
        self.persistence = Some(persistence);
    }

    fn snapshot(&self) -> QuizSnapshot {
        QuizSnapshot {
            quiz_id: self.id.clone(),
            view: self.runtime.view(),
            persistence: self.persistence.clone(),
        }
    }

    fn emit_state(&self) {
        self.emit(QuizEvent::StateChanged(StateChanged {
            quiz_id: self.id.clone(),
            state: self.runtime.state().name().to_string(),
            timestamp: Utc::now(),
        }));
    }

    fn emit(&self, event: QuizEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Maps quiz ids to running sessions.
///
/// A session drops its own entry when its task stops, whether closed
/// explicitly or for being idle.
pub struct QuizRegistry {
    sessions: Arc<Sessions>,
    deps: Arc<QuizDeps>,
}

impl QuizRegistry {
    pub fn new(deps: QuizDeps) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps: Arc::new(deps),
        }
    }

    /// Spawns an idle session owned by `owner`, unless the owner already
    /// holds the configured number of live sessions.
    pub async fn create(
        &self,
        owner: &str,
        name: Option<String>,
    ) -> Result<QuizHandle, QuizError> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| !session.is_closed());
        let limit = self.deps.config.max_sessions_per_owner;
        let open = sessions.values().filter(|s| s.owner == owner).count();
        if open >= limit {
            tracing::warn!(owner = %owner, open, "Quiz session limit reached");
            return Err(QuizError::TooManySessions(limit));
        }

        let id = Uuid::new_v4().to_string();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let actor = QuizActor {
            id: id.clone(),
            owner: owner.to_string(),
            default_name: name,
            runtime: QuizRuntime::new(self.deps.config.max_questions),
            persistence: None,
            deps: self.deps.clone(),
            commands: command_rx,
            events: event_tx,
            sessions: self.sessions.clone(),
        };
        QUIZZES_ACTIVE.inc();
        QUIZZES_TOTAL.with_label_values(&["created"]).inc();
        tokio::spawn(actor.run());

        let handle = QuizHandle {
            id: id.clone(),
            owner: owner.to_string(),
            commands: command_tx,
        };

        sessions.insert(id.clone(), handle.clone());
        tracing::info!(quiz_id = %id, owner = %owner, "Quiz session created");
        Ok(handle)
    }

    /// Looks up a live session. Sessions of other users are reported as
    /// missing.
    pub async fn get(&self, id: &str, owner: &str) -> Result<QuizHandle, QuizError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QuizError::NotFound(id.to_string()))?;

        if handle.owner != owner {
            tracing::warn!(quiz_id = %id, "Quiz requested by a user who does not own it");
            return Err(QuizError::NotFound(id.to_string()));
        }
        if handle.is_closed() {
            self.sessions.write().await.remove(id);
            return Err(QuizError::Closed(id.to_string()));
        }
        Ok(handle)
    }

    /// Tears a session down; its countdown stops with it.
    pub async fn remove(&self, id: &str, owner: &str) -> Result<(), QuizError> {
        let handle = self.get(id, owner).await?;
        handle.close().await;
        self.sessions.write().await.remove(id);
        tracing::info!(quiz_id = %id, "Quiz session removed");
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_closed())
            .count()
    }

    /// Stops every session, used on shutdown.
    pub async fn close_all(&self) {
        let sessions: Vec<QuizHandle> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.close().await;
        }
    }
}
