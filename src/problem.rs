use axum::routing::get;
use axum::{Json, Router, extract::Path, extract::Query, extract::State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::error::ApiError;
use crate::schema::problems;

/// Catalog entry. The scheduling core never mutates these; they are read for
/// deck membership and the flashcard join.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = problems)]
#[diesel(primary_key(problem_id))]
pub struct Problem {
    pub problem_id: i32,
    pub frontend_id: i32,
    pub title: String,
    pub title_slug: String,
    pub difficulty: String,
}

pub fn get_problem_by_slug(
    conn: &mut SqliteConnection,
    title_slug: &str,
) -> Result<Problem, ApiError> {
    problems::table
        .filter(problems::title_slug.eq(title_slug))
        .first::<Problem>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {} not found", title_slug)))
}

pub fn list_problems(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Problem>, i64), ApiError> {
    let total = problems::table.count().get_result::<i64>(conn)?;
    let rows = problems::table
        .order(problems::frontend_id.asc())
        .limit(limit)
        .offset(offset)
        .load::<Problem>(conn)?;
    Ok((rows, total))
}

#[derive(Deserialize)]
pub struct ProblemListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_problems_handler(
    State(state): State<AppState>,
    Query(params): Query<ProblemListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = params.page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = params
        .per_page
        .filter(|p| *p > 0 && *p <= 100)
        .unwrap_or(50);

    let mut conn = state.pool.get()?;
    let (rows, total) = list_problems(&mut conn, per_page, (page - 1) * per_page)?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub async fn get_problem_handler(
    State(state): State<AppState>,
    Path(title_slug): Path<String>,
) -> Result<Json<Problem>, ApiError> {
    let mut conn = state.pool.get()?;
    Ok(Json(get_problem_by_slug(&mut conn, &title_slug)?))
}

pub fn problem_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_problems_handler))
        .route("/{title_slug}", get(get_problem_handler))
        .with_state(state)
}
