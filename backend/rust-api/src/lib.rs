use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        .nest(
            "/api/v1/profile",
            profile_routes().route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/quizzes",
            quiz_routes().route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/flows",
            Router::new()
                .route("/{flow}", post(handlers::flows::run_flow))
                .route_layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .nest("/api/webhooks", webhook_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::trace::security_headers_middleware,
        ))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::get_current_user))
        .route("/logout", post(handlers::auth::logout))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn profile_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::profile::get_profile))
        .route("/login", post(handlers::profile::record_login))
        .route(
            "/study-sessions",
            post(handlers::profile::log_study_session),
        )
        .route("/plan", put(handlers::profile::update_plan))
        .route("/quizzes", get(handlers::profile::list_past_quizzes))
        .route("/achievements", get(handlers::profile::list_achievements))
}

fn quiz_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::quizzes::create_quiz))
        .route(
            "/{id}",
            get(handlers::quizzes::get_quiz).delete(handlers::quizzes::delete_quiz),
        )
        .route("/{id}/generate", post(handlers::quizzes::generate_quiz))
        .route("/{id}/selection", post(handlers::quizzes::select_option))
        .route("/{id}/submit", post(handlers::quizzes::submit_answer))
        .route("/{id}/advance", post(handlers::quizzes::advance_quiz))
        .route("/{id}/reset", post(handlers::quizzes::reset_quiz))
        .route("/{id}/stream", get(handlers::sse::quiz_stream))
}

fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/heygen",
            get(handlers::webhooks::webhook_probe).post(handlers::webhooks::heygen_webhook),
        )
        .route(
            "/synthesia",
            get(handlers::webhooks::webhook_probe).post(handlers::webhooks::synthesia_webhook),
        )
}
