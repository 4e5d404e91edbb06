use axum::extract::Path;
use axum::routing::{delete, get, post};
use axum::{Json, Router, extract::State};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::AppState;
use crate::error::ApiError;
use crate::flashcard;
use crate::problem::Problem;
use crate::scheduler;
use crate::schema::{deck_problems, decks, problems};
use crate::utils::get_current_user_id;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = decks)]
#[diesel(primary_key(deck_id))]
pub struct Deck {
    pub deck_id: i32,
    pub user_id: i32,
    pub deck_name: String,
    pub description: String,
    pub is_public: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct DeckWithProblems {
    #[serde(flatten)]
    pub deck: Deck,
    pub problems: Vec<Problem>,
}

#[derive(Deserialize)]
pub struct CreateDeckRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct DeckProblemRequest {
    pub problem_id: i32,
}

#[derive(Deserialize)]
pub struct UpdateDeckRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

pub fn get_deck_by_id(conn: &mut SqliteConnection, deck_id: i32) -> Result<Deck, ApiError> {
    decks::table
        .find(deck_id)
        .first::<Deck>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Deck with ID {} not found", deck_id)))
}

pub async fn list_decks(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Deck>>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    let rows = decks::table
        .filter(decks::user_id.eq(user_id).or(decks::is_public.eq(true)))
        .order(decks::created_at.asc())
        .load::<Deck>(&mut conn)?;

    Ok(Json(rows))
}

pub async fn create_deck(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateDeckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("name", "Deck name is required"));
    }

    let mut conn = state.pool.get()?;
    diesel::insert_into(decks::table)
        .values((
            decks::deck_name.eq(payload.name.trim()),
            decks::description.eq(&payload.description),
            decks::is_public.eq(payload.is_public),
            decks::user_id.eq(user_id),
            decks::created_at.eq(state.clock.now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let deck_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
        .get_result::<i32>(&mut conn)?;

    Ok(Json(serde_json::json!({ "success": true, "id": deck_id })))
}

pub async fn view_deck(
    Path(deck_id): Path<i32>,
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<DeckWithProblems>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    let deck = get_deck_by_id(&mut conn, deck_id)?;
    if !deck.is_public && deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    let problems = deck_problems::table
        .filter(deck_problems::deck_id.eq(deck_id))
        .inner_join(problems::table)
        .order(problems::frontend_id.asc())
        .select(problems::all_columns)
        .load::<Problem>(&mut conn)?;

    Ok(Json(DeckWithProblems { deck, problems }))
}

pub async fn delete_deck(
    State(state): State<AppState>,
    session: Session,
    Path(deck_id): Path<i32>,
) -> Result<Json<ApiResponse>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    let deck = get_deck_by_id(&mut conn, deck_id)?;
    if deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(deck_problems::table.filter(deck_problems::deck_id.eq(deck_id)))
            .execute(conn)?;
        diesel::delete(decks::table.find(deck_id)).execute(conn)
    })?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Deck deleted successfully".to_string(),
    }))
}

/// Applies the provided fields; omitted ones keep their stored values.
pub fn update_deck(
    conn: &mut SqliteConnection,
    deck_id: i32,
    user_id: i32,
    req: &UpdateDeckRequest,
) -> Result<Deck, ApiError> {
    let deck = get_deck_by_id(conn, deck_id)?;
    if deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    let name = match req.name.as_deref() {
        Some(n) if n.trim().is_empty() => {
            return Err(ApiError::validation("name", "Deck name is required"));
        }
        Some(n) => n.trim().to_string(),
        None => deck.deck_name,
    };

    diesel::update(decks::table.find(deck_id))
        .set((
            decks::deck_name.eq(&name),
            decks::description.eq(req.description.as_deref().unwrap_or(&deck.description)),
            decks::is_public.eq(req.is_public.unwrap_or(deck.is_public)),
        ))
        .execute(conn)?;

    get_deck_by_id(conn, deck_id)
}

pub async fn update_deck_handler(
    State(state): State<AppState>,
    session: Session,
    Path(deck_id): Path<i32>,
    Json(payload): Json<UpdateDeckRequest>,
) -> Result<Json<Deck>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    Ok(Json(update_deck(&mut conn, deck_id, user_id, &payload)?))
}

/// Adds the association and instantiates the owner's flashcard for it, due
/// immediately, in one atomic unit. The mirror of `remove_problem_from_deck`.
/// Both writes skip rows that already exist, so re-adding a problem is
/// harmless.
pub fn add_problem_to_deck(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    deck_id: i32,
    problem_id: i32,
    user_id: i32,
) -> Result<(), ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(deck_problems::table)
            .values((
                deck_problems::deck_id.eq(deck_id),
                deck_problems::problem_id.eq(problem_id),
            ))
            .on_conflict((deck_problems::deck_id, deck_problems::problem_id))
            .do_nothing()
            .execute(conn)?;

        flashcard::ensure_flashcard(
            conn,
            user_id,
            deck_id,
            problem_id,
            &scheduler::fresh_card(now),
        )?;
        Ok(())
    })
}

pub async fn add_problem_to_deck_handler(
    State(state): State<AppState>,
    session: Session,
    Path(deck_id): Path<i32>,
    Json(payload): Json<DeckProblemRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    let deck = get_deck_by_id(&mut conn, deck_id)?;
    if deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    add_problem_to_deck(
        &mut conn,
        state.clock.now(),
        deck_id,
        payload.problem_id,
        user_id,
    )?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Problem added to deck successfully".to_string(),
    }))
}

/// Removes the association and the caller's flashcard for it in one atomic
/// unit. A flashcard that was never created (or is already gone) is tolerated;
/// any other failure aborts the whole operation.
pub fn remove_problem_from_deck(
    conn: &mut SqliteConnection,
    deck_id: i32,
    problem_id: i32,
    user_id: i32,
) -> Result<(), ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::delete(
            deck_problems::table
                .filter(deck_problems::deck_id.eq(deck_id))
                .filter(deck_problems::problem_id.eq(problem_id)),
        )
        .execute(conn)?;

        flashcard::delete_flashcard(conn, user_id, deck_id, problem_id)?;
        Ok(())
    })
}

pub async fn remove_problem_from_deck_handler(
    State(state): State<AppState>,
    session: Session,
    Path((deck_id, problem_id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = state.pool.get()?;
    let deck = get_deck_by_id(&mut conn, deck_id)?;
    if deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    remove_problem_from_deck(&mut conn, deck_id, problem_id, user_id)?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Problem removed from deck successfully".to_string(),
    }))
}

pub fn deck_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_decks).post(create_deck))
        .route(
            "/{deck_id}",
            get(view_deck).put(update_deck_handler).delete(delete_deck),
        )
        .route("/{deck_id}/problems", post(add_problem_to_deck_handler))
        .route(
            "/{deck_id}/problems/{problem_id}",
            delete(remove_problem_from_deck_handler),
        )
        .with_state(state)
}
