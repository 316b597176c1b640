use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::AppError,
    metrics::SSE_CONNECTIONS_ACTIVE,
    middlewares::auth::JwtClaims,
    models::timer::QuizEvent,
    services::AppState,
};

/// GET /api/v1/quizzes/{id}/stream
///
/// Countdown ticks, time-up, state changes and the final result of one quiz.
/// The stream ends when the session stops, including on idle timeout.
pub async fn quiz_stream(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    let receiver = handle.subscribe().await?;
    tracing::info!("Client connected to SSE stream: quiz={}", quiz_id);

    let stream = event_stream(quiz_id, receiver);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Decrements the connection gauge when the client goes away.
struct ConnectionGuard {
    quiz_id: String,
}

impl ConnectionGuard {
    fn new(quiz_id: String) -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self { quiz_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
        tracing::debug!("SSE stream closed: quiz={}", self.quiz_id);
    }
}

fn event_stream(
    quiz_id: String,
    receiver: broadcast::Receiver<QuizEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::new(quiz_id);
    stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.event_name())
                        .data(event.to_sse_data());
                    return Some((Ok(sse), (receiver, guard)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "SSE subscriber lagged: quiz={}, skipped={}",
                        guard.quiz_id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timer::TimerTick;
    use chrono::Utc;
    use futures::StreamExt;

    #[tokio::test]
    async fn forwards_events_until_sender_closes() {
        let (sender, receiver) = broadcast::channel(8);
        let mut stream = Box::pin(event_stream("q1".to_string(), receiver));

        sender
            .send(QuizEvent::TimerTick(TimerTick {
                quiz_id: "q1".to_string(),
                remaining_seconds: 59,
                total_seconds: 60,
                timestamp: Utc::now(),
            }))
            .unwrap();
        drop(sender);

        assert!(matches!(stream.next().await, Some(Ok(_))));
        assert!(stream.next().await.is_none());
    }
}
