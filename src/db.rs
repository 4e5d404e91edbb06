use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::{Connection, SqliteConnection};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS problems (
    problem_id INTEGER PRIMARY KEY AUTOINCREMENT,
    frontend_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    title_slug TEXT NOT NULL UNIQUE,
    difficulty TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS submissions (
    id TEXT PRIMARY KEY NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    title TEXT NOT NULL,
    title_slug TEXT NOT NULL,
    submitted_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_submissions_user_slug
    ON submissions (user_id, title_slug, submitted_at);

CREATE TABLE IF NOT EXISTS review_schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id TEXT NOT NULL UNIQUE REFERENCES submissions (id),
    due_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL,
    stability DOUBLE NOT NULL,
    difficulty DOUBLE NOT NULL,
    elapsed_days INTEGER NOT NULL,
    scheduled_days INTEGER NOT NULL,
    reps INTEGER NOT NULL,
    lapses INTEGER NOT NULL,
    state SMALLINT NOT NULL,
    last_review TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_review_schedules_due ON review_schedules (due_at);

CREATE TABLE IF NOT EXISTS review_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schedule_id INTEGER NOT NULL REFERENCES review_schedules (id),
    rating INTEGER NOT NULL,
    review_date TIMESTAMP NOT NULL,
    elapsed_days INTEGER NOT NULL,
    scheduled_days INTEGER NOT NULL,
    state SMALLINT NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    deck_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    deck_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    is_public BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS deck_problems (
    deck_id INTEGER NOT NULL REFERENCES decks (deck_id),
    problem_id INTEGER NOT NULL REFERENCES problems (problem_id),
    PRIMARY KEY (deck_id, problem_id)
);

CREATE TABLE IF NOT EXISTS flashcard_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    deck_id INTEGER NOT NULL REFERENCES decks (deck_id),
    problem_id INTEGER NOT NULL REFERENCES problems (problem_id),
    due_at TIMESTAMP NOT NULL,
    stability DOUBLE NOT NULL,
    difficulty DOUBLE NOT NULL,
    elapsed_days INTEGER NOT NULL,
    scheduled_days INTEGER NOT NULL,
    reps INTEGER NOT NULL,
    lapses INTEGER NOT NULL,
    state SMALLINT NOT NULL,
    last_review TIMESTAMP,
    UNIQUE (user_id, deck_id, problem_id)
);

CREATE TABLE IF NOT EXISTS flashcard_review_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flashcard_review_id INTEGER NOT NULL REFERENCES flashcard_reviews (id),
    rating INTEGER NOT NULL,
    review_date TIMESTAMP NOT NULL,
    elapsed_days INTEGER NOT NULL,
    scheduled_days INTEGER NOT NULL,
    state SMALLINT NOT NULL
);
"#;

/// Applies the schema to a fresh or existing database. Idempotent.
pub fn run_schema(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    conn.batch_execute(SCHEMA_DDL)
}

pub fn build_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder().build(manager)
}

#[cfg(test)]
pub fn test_conn() -> SqliteConnection {
    let mut conn =
        SqliteConnection::establish(":memory:").expect("failed to open in-memory database");
    run_schema(&mut conn).expect("failed to apply schema");
    // The bundled SQLite enforces foreign keys by default, so the users the
    // fixtures reference must exist before any child rows are inserted.
    conn.batch_execute(
        "INSERT INTO users (user_id, email, username, password) VALUES
             (1, 'user1@example.com', 'user1', 'x'),
             (2, 'user2@example.com', 'user2', 'x');",
    )
    .expect("failed to seed fixture users");
    conn
}
