use axum::routing::get;
use axum::{Json, Router, extract::State};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::AppState;
use crate::error::ApiError;
use crate::schema::submissions;
use crate::utils::get_current_user_id;

/// One accepted solve event. Submission IDs are strings tagged by source:
/// `internal-user-<hex>` for internally generated ones, `leetcode-<id>` for
/// externally sourced ones.
#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = submissions)]
pub struct Submission {
    pub id: String,
    pub user_id: i32,
    pub title: String,
    pub title_slug: String,
    pub submitted_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

pub fn create_submission(conn: &mut SqliteConnection, sub: &Submission) -> Result<(), ApiError> {
    diesel::insert_into(submissions::table)
        .values(sub)
        .execute(conn)?;
    Ok(())
}

pub fn submission_exists(conn: &mut SqliteConnection, id: &str) -> Result<bool, ApiError> {
    let found = submissions::table
        .find(id)
        .select(submissions::id)
        .first::<String>(conn)
        .optional()?;
    Ok(found.is_some())
}

pub fn get_submission_by_id(conn: &mut SqliteConnection, id: &str) -> Result<Submission, ApiError> {
    submissions::table
        .find(id)
        .first::<Submission>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Submission with ID {} not found", id)))
}

pub fn get_submissions_by_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Vec<Submission>, ApiError> {
    let subs = submissions::table
        .filter(submissions::user_id.eq(user_id))
        .order(submissions::submitted_at.desc())
        .load::<Submission>(conn)?;
    Ok(subs)
}

pub async fn list_submissions_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    Ok(Json(get_submissions_by_user(&mut conn, user_id)?))
}

pub fn submission_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_submissions_handler))
        .with_state(state)
}
