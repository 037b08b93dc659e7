use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use courseware_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware, routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    {
        let state = app_state.clone();
        let grace = config.submit_grace_seconds;
        tokio::spawn(async move {
            loop {
                if let Err(e) = state.attempt_service.sweep_overdue(grace).await {
                    tracing::error!(error = ?e, "deadline sweeper error");
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = state
                    .media_service
                    .sweep_deleted_payloads(&state.storage)
                    .await
                {
                    tracing::error!(error = ?e, "media payload sweeper error");
                }
                tokio::time::sleep(Duration::from_secs(300)).await;
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let media_api = Router::new()
        .route("/media", post(routes::media::upload_media))
        .route(
            "/media/:secure_id",
            get(routes::media::serve_media).delete(routes::media::delete_media),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth::resolve_identity,
        ))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state("media", config.public_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let course_api = Router::new()
        .route(
            "/courses/:slug/quizzes/:quiz_id/attempt",
            post(routes::quiz::start_attempt).get(routes::quiz::get_attempt_history),
        )
        .route(
            "/courses/:slug/quizzes/:quiz_id/questions",
            get(routes::quiz::get_questions),
        )
        .route(
            "/courses/:slug/quizzes/:quiz_id/attempt/:attempt_id/answers",
            patch(routes::quiz::save_answers),
        )
        .route(
            "/courses/:slug/quizzes/:quiz_id/attempt/:attempt_id/submit",
            post(routes::quiz::submit_attempt),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth::resolve_identity,
        ))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state("courses", config.api_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let app = base_routes
        .merge(media_api)
        .merge(course_api)
        .with_state(app_state)
        .layer(middleware::cors::permissive_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(512 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
