use std::sync::Arc;

use axum::{Json, Router, routing::get};
use time::Duration;
use tokio::net::TcpListener;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

mod auth;
mod clock;
mod db;
mod deck;
mod error;
mod flashcard;
mod model;
mod problem;
mod review;
mod review_log;
mod scheduler;
mod schema;
mod submission;
mod utils;

/// Shared handler state. The pool and lock map are cheap to clone; the clock
/// is swapped for a fixed one in tests.
#[derive(Clone)]
pub struct AppState {
    pub pool: db::DbPool,
    pub clock: Arc<dyn clock::Clock>,
    pub slug_locks: review::SlugLocks,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    // Database configuration
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://leetrecall.db".into());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into());

    let pool = match db::build_pool(&database_url) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to create DB pool: {}", e);
            std::process::exit(1);
        }
    };

    {
        let mut conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to get DB connection: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = db::run_schema(&mut conn) {
            eprintln!("Failed to apply schema: {}", e);
            std::process::exit(1);
        }
    }

    let state = AppState {
        pool: pool.clone(),
        clock: Arc::new(clock::SystemClock),
        slug_locks: review::SlugLocks::default(),
    };

    // Sessions configuration
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_secure(false);

    // Combined API router
    let api_router = Router::new()
        .nest("/reviews", review::review_router(state.clone()))
        .nest("/flashcards", flashcard::flashcard_router(state.clone()))
        .nest("/decks", deck::deck_router(state.clone()))
        .nest("/problems", problem::problem_router(state.clone()))
        .nest("/submissions", submission::submission_router(state.clone()));

    // Main application router
    let app = Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::auth_router(pool))
        .nest("/api", api_router)
        .layer(session_layer);

    // Start server
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to address: {}", e);
            std::process::exit(1);
        }
    };

    println!("Server running on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
