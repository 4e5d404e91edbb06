use std::collections::HashSet;

use axum::routing::{get, post};
use axum::{Json, Router, extract::Path, extract::Query, extract::State};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::AppState;
use crate::deck;
use crate::error::ApiError;
use crate::problem::Problem;
use crate::review_log;
use crate::scheduler::{self, CardState};
use crate::schema::{deck_problems, flashcard_reviews, problems};
use crate::utils::get_current_user_id;

/// A deck-triggered schedule, keyed directly by (user, deck, problem) with no
/// submission indirection. At most one row per key.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Serialize)]
#[diesel(table_name = flashcard_reviews)]
#[diesel(treat_none_as_null = true)]
pub struct FlashcardReview {
    pub id: i32,
    pub user_id: i32,
    pub deck_id: i32,
    pub problem_id: i32,
    pub due_at: NaiveDateTime,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i16,
    pub last_review: Option<NaiveDateTime>,
}

impl FlashcardReview {
    pub fn card(&self) -> CardState {
        CardState {
            stability: self.stability,
            difficulty: self.difficulty,
            elapsed_days: self.elapsed_days,
            scheduled_days: self.scheduled_days,
            reps: self.reps,
            lapses: self.lapses,
            state: self.state,
            last_review: self.last_review,
            due_at: self.due_at,
        }
    }

    pub fn apply_card(&mut self, card: &CardState) {
        self.stability = card.stability;
        self.difficulty = card.difficulty;
        self.elapsed_days = card.elapsed_days;
        self.scheduled_days = card.scheduled_days;
        self.reps = card.reps;
        self.lapses = card.lapses;
        self.state = card.state;
        self.last_review = card.last_review;
        self.due_at = card.due_at;
    }
}

#[derive(Debug, Serialize)]
pub struct FlashcardRow {
    #[serde(flatten)]
    pub review: FlashcardReview,
    pub problem: Problem,
}

#[derive(Insertable)]
#[diesel(table_name = flashcard_reviews)]
struct NewFlashcardReview {
    user_id: i32,
    deck_id: i32,
    problem_id: i32,
    due_at: NaiveDateTime,
    stability: f64,
    difficulty: f64,
    elapsed_days: i32,
    scheduled_days: i32,
    reps: i32,
    lapses: i32,
    state: i16,
    last_review: Option<NaiveDateTime>,
}

impl NewFlashcardReview {
    fn from_card(user_id: i32, deck_id: i32, problem_id: i32, card: &CardState) -> Self {
        NewFlashcardReview {
            user_id,
            deck_id,
            problem_id,
            due_at: card.due_at,
            stability: card.stability,
            difficulty: card.difficulty,
            elapsed_days: card.elapsed_days,
            scheduled_days: card.scheduled_days,
            reps: card.reps,
            lapses: card.lapses,
            state: card.state,
            last_review: card.last_review,
        }
    }
}

// ---------------------------------------------------------------------------
// Store

pub fn get_flashcard_by_id(
    conn: &mut SqliteConnection,
    id: i32,
) -> Result<FlashcardReview, ApiError> {
    flashcard_reviews::table
        .find(id)
        .first::<FlashcardReview>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Flashcard review with ID {} not found", id)))
}

/// Creates the flashcard row for one (user, deck, problem) unless that key
/// already has one. Returns whether a row was created.
pub fn ensure_flashcard(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    problem_id: i32,
    card: &CardState,
) -> Result<bool, ApiError> {
    let existing = flashcard_reviews::table
        .filter(flashcard_reviews::user_id.eq(user_id))
        .filter(flashcard_reviews::deck_id.eq(deck_id))
        .filter(flashcard_reviews::problem_id.eq(problem_id))
        .select(flashcard_reviews::id)
        .first::<i32>(conn)
        .optional()?;

    if existing.is_some() {
        return Ok(false);
    }

    diesel::insert_into(flashcard_reviews::table)
        .values(&NewFlashcardReview::from_card(
            user_id, deck_id, problem_id, card,
        ))
        .execute(conn)?;
    Ok(true)
}

pub fn create_flashcard(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    problem_id: i32,
    card: &CardState,
) -> Result<(), ApiError> {
    if !ensure_flashcard(conn, user_id, deck_id, problem_id, card)? {
        return Err(ApiError::Conflict(format!(
            "Flashcard for problem {} already exists in deck {}",
            problem_id, deck_id
        )));
    }
    Ok(())
}

pub fn update_flashcard(
    conn: &mut SqliteConnection,
    review: &FlashcardReview,
) -> Result<(), ApiError> {
    let affected = diesel::update(flashcard_reviews::table.find(review.id))
        .set(review)
        .execute(conn)?;

    if affected == 0 {
        return Err(ApiError::NotFound(format!(
            "Flashcard review with ID {} not found",
            review.id
        )));
    }
    Ok(())
}

/// Deletes the flashcard row for one (user, deck, problem). Returns whether a
/// row existed; an already-missing row is not an error.
pub fn delete_flashcard(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    problem_id: i32,
) -> Result<bool, ApiError> {
    let affected = diesel::delete(
        flashcard_reviews::table
            .filter(flashcard_reviews::user_id.eq(user_id))
            .filter(flashcard_reviews::deck_id.eq(deck_id))
            .filter(flashcard_reviews::problem_id.eq(problem_id)),
    )
    .execute(conn)?;
    Ok(affected > 0)
}

/// Due flashcards joined with their problem, optionally scoped to one deck.
/// Count and row queries share the same predicates.
pub fn list_due_flashcards(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: Option<i32>,
    now: NaiveDateTime,
    limit: i64,
    offset: i64,
) -> Result<(Vec<FlashcardRow>, i64), ApiError> {
    let mut count_query = flashcard_reviews::table
        .select(diesel::dsl::count_star())
        .filter(flashcard_reviews::user_id.eq(user_id))
        .filter(flashcard_reviews::due_at.le(now))
        .into_boxed();

    let mut rows_query = flashcard_reviews::table
        .inner_join(problems::table)
        .filter(flashcard_reviews::user_id.eq(user_id))
        .filter(flashcard_reviews::due_at.le(now))
        .select((flashcard_reviews::all_columns, problems::all_columns))
        .into_boxed();

    if let Some(deck_id) = deck_id {
        count_query = count_query.filter(flashcard_reviews::deck_id.eq(deck_id));
        rows_query = rows_query.filter(flashcard_reviews::deck_id.eq(deck_id));
    }

    let total = count_query.get_result::<i64>(conn)?;
    let rows = rows_query
        .order(flashcard_reviews::due_at.asc())
        .limit(limit)
        .offset(offset)
        .load::<(FlashcardReview, Problem)>(conn)?
        .into_iter()
        .map(|(review, problem)| FlashcardRow { review, problem })
        .collect();

    Ok((rows, total))
}

// ---------------------------------------------------------------------------
// Orchestrator

/// Instantiates a default flashcard for every problem in the deck the user
/// does not already have, as one atomic unit. Rows that exist are left
/// untouched, so the operation is idempotent. Returns the number created.
pub fn add_deck_to_user_flashcards(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    user_id: i32,
    deck_id: i32,
) -> Result<usize, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let deck_problem_ids = deck_problems::table
            .filter(deck_problems::deck_id.eq(deck_id))
            .select(deck_problems::problem_id)
            .load::<i32>(conn)?;

        let existing = flashcard_reviews::table
            .filter(flashcard_reviews::user_id.eq(user_id))
            .filter(flashcard_reviews::deck_id.eq(deck_id))
            .select(flashcard_reviews::problem_id)
            .load::<i32>(conn)?
            .into_iter()
            .collect::<HashSet<i32>>();

        let card = scheduler::fresh_card(now);
        let new_rows = deck_problem_ids
            .into_iter()
            .filter(|problem_id| !existing.contains(problem_id))
            .map(|problem_id| NewFlashcardReview::from_card(user_id, deck_id, problem_id, &card))
            .collect::<Vec<_>>();

        if !new_rows.is_empty() {
            diesel::insert_into(flashcard_reviews::table)
                .values(&new_rows)
                .execute(conn)?;
        }

        Ok(new_rows.len())
    })
}

/// Applies a rating to a flashcard the caller owns and appends a log row.
pub fn rate_flashcard(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    user_id: i32,
    review_id: i32,
    rating_value: i32,
) -> Result<FlashcardReview, ApiError> {
    let rating = scheduler::rating_from_value(rating_value)
        .ok_or_else(|| ApiError::validation("rating", "Rating must be between 1 and 4"))?;

    let mut review = get_flashcard_by_id(conn, review_id)?;
    if review.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    let (card, log) = scheduler::advance(&review.card(), now, rating);
    review.apply_card(&card);

    update_flashcard(conn, &review)?;
    review_log::append_flashcard_log(conn, review.id, &log)?;
    Ok(review)
}

// ---------------------------------------------------------------------------
// Handlers

#[derive(Deserialize)]
pub struct FlashcardListParams {
    pub deck_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct RateFlashcardRequest {
    pub review_id: i32,
    pub rating: i32,
}

pub async fn get_due_flashcards_handler(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<FlashcardListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let page = params.page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = params
        .per_page
        .filter(|p| *p > 0 && *p <= 100)
        .unwrap_or(10);

    let now = state.clock.now().naive_utc();
    let mut conn = state.pool.get()?;
    let (rows, total) = list_due_flashcards(
        &mut conn,
        user_id,
        params.deck_id,
        now,
        per_page,
        (page - 1) * per_page,
    )?;

    Ok(Json(json!({
        "reviews": rows,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub async fn rate_flashcard_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RateFlashcardRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let now = state.clock.now();
    let mut conn = state.pool.get()?;
    let review = rate_flashcard(&mut conn, now, user_id, req.review_id, req.rating)?;

    Ok(Json(json!({
        "success": true,
        "next_review_at": review.due_at,
        "days_until_review": review.scheduled_days,
    })))
}

pub async fn attach_deck_handler(
    State(state): State<AppState>,
    session: Session,
    Path(deck_id): Path<i32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let now = state.clock.now();
    let mut conn = state.pool.get()?;

    let deck = deck::get_deck_by_id(&mut conn, deck_id)?;
    if !deck.is_public && deck.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    let created = add_deck_to_user_flashcards(&mut conn, now, user_id, deck_id)?;

    Ok(Json(json!({ "success": true, "created": created })))
}

pub fn flashcard_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_due_flashcards_handler))
        .route("/rate", post(rate_flashcard_handler))
        .route("/decks/{deck_id}", post(attach_deck_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;
    use crate::schema::flashcard_review_logs;
    use chrono::{Duration, TimeZone};

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn seed_problem(conn: &mut SqliteConnection, id: i32, slug: &str) {
        diesel::insert_into(problems::table)
            .values((
                problems::problem_id.eq(id),
                problems::frontend_id.eq(id),
                problems::title.eq(slug.replace('-', " ")),
                problems::title_slug.eq(slug),
                problems::difficulty.eq("Easy"),
            ))
            .execute(conn)
            .unwrap();
    }

    fn seed_deck_with_problems(conn: &mut SqliteConnection, deck_id: i32, problem_ids: &[i32]) {
        diesel::insert_into(crate::schema::decks::table)
            .values((
                crate::schema::decks::deck_id.eq(deck_id),
                crate::schema::decks::user_id.eq(1),
                crate::schema::decks::deck_name.eq("Blind 75"),
                crate::schema::decks::description.eq(""),
                crate::schema::decks::is_public.eq(true),
                crate::schema::decks::created_at.eq(test_now().naive_utc()),
            ))
            .execute(conn)
            .unwrap();

        for &problem_id in problem_ids {
            seed_problem(conn, problem_id, &format!("problem-{}", problem_id));
            diesel::insert_into(deck_problems::table)
                .values((
                    deck_problems::deck_id.eq(deck_id),
                    deck_problems::problem_id.eq(problem_id),
                ))
                .execute(conn)
                .unwrap();
        }
    }

    fn flashcard_count(conn: &mut SqliteConnection) -> i64 {
        flashcard_reviews::table
            .count()
            .get_result::<i64>(conn)
            .unwrap()
    }

    #[test]
    fn bulk_attach_creates_one_row_per_deck_problem() {
        let mut conn = test_conn();
        seed_deck_with_problems(&mut conn, 1, &[10, 11, 12]);

        let created = add_deck_to_user_flashcards(&mut conn, test_now(), 1, 1).unwrap();
        assert_eq!(created, 3);
        assert_eq!(flashcard_count(&mut conn), 3);
    }

    #[test]
    fn bulk_attach_is_idempotent() {
        let mut conn = test_conn();
        seed_deck_with_problems(&mut conn, 1, &[10, 11, 12]);

        add_deck_to_user_flashcards(&mut conn, test_now(), 1, 1).unwrap();
        let second = add_deck_to_user_flashcards(&mut conn, test_now(), 1, 1).unwrap();

        assert_eq!(second, 0);
        assert_eq!(flashcard_count(&mut conn), 3);
    }

    #[test]
    fn bulk_attach_fills_only_missing_rows() {
        let mut conn = test_conn();
        seed_deck_with_problems(&mut conn, 1, &[10, 11, 12]);

        create_flashcard(&mut conn, 1, 1, 11, &scheduler::fresh_card(test_now())).unwrap();
        let created = add_deck_to_user_flashcards(&mut conn, test_now(), 1, 1).unwrap();

        assert_eq!(created, 2);
        assert_eq!(flashcard_count(&mut conn), 3);
    }

    #[test]
    fn attached_cards_are_due_immediately() {
        let mut conn = test_conn();
        let now = test_now();
        seed_deck_with_problems(&mut conn, 1, &[10]);
        add_deck_to_user_flashcards(&mut conn, now, 1, 1).unwrap();

        let (rows, total) =
            list_due_flashcards(&mut conn, 1, Some(1), now.naive_utc(), 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].review.reps, 0);
        assert_eq!(rows[0].problem.problem_id, 10);
    }

    #[test]
    fn rating_advances_card_and_logs() {
        let mut conn = test_conn();
        let now = test_now();
        seed_deck_with_problems(&mut conn, 1, &[10]);
        add_deck_to_user_flashcards(&mut conn, now, 1, 1).unwrap();

        let (rows, _) = list_due_flashcards(&mut conn, 1, None, now.naive_utc(), 10, 0).unwrap();
        let review = rate_flashcard(&mut conn, now, 1, rows[0].review.id, 3).unwrap();

        assert_eq!(review.reps, 1);
        assert!(review.due_at > now.naive_utc());

        let logs = flashcard_review_logs::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(logs, 1);
    }

    #[test]
    fn rating_someone_elses_card_is_forbidden() {
        let mut conn = test_conn();
        let now = test_now();
        seed_deck_with_problems(&mut conn, 1, &[10]);
        add_deck_to_user_flashcards(&mut conn, now, 1, 1).unwrap();

        let (rows, _) = list_due_flashcards(&mut conn, 1, None, now.naive_utc(), 10, 0).unwrap();
        let err = rate_flashcard(&mut conn, now, 2, rows[0].review.id, 3).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn rated_card_leaves_the_due_list() {
        let mut conn = test_conn();
        let now = test_now();
        seed_deck_with_problems(&mut conn, 1, &[10, 11]);
        add_deck_to_user_flashcards(&mut conn, now, 1, 1).unwrap();

        let (rows, _) = list_due_flashcards(&mut conn, 1, None, now.naive_utc(), 10, 0).unwrap();
        rate_flashcard(&mut conn, now, 1, rows[0].review.id, 4).unwrap();

        let (_, total) = list_due_flashcards(&mut conn, 1, None, now.naive_utc(), 10, 0).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn deck_filter_scopes_the_due_list() {
        let mut conn = test_conn();
        let now = test_now();
        seed_deck_with_problems(&mut conn, 1, &[10]);
        seed_deck_with_problems(&mut conn, 2, &[20]);
        add_deck_to_user_flashcards(&mut conn, now, 1, 1).unwrap();
        add_deck_to_user_flashcards(&mut conn, now, 1, 2).unwrap();

        let (_, all) = list_due_flashcards(&mut conn, 1, None, now.naive_utc(), 10, 0).unwrap();
        let (rows, scoped) =
            list_due_flashcards(&mut conn, 1, Some(2), now.naive_utc(), 10, 0).unwrap();

        assert_eq!(all, 2);
        assert_eq!(scoped, 1);
        assert_eq!(rows[0].review.deck_id, 2);
    }

    #[test]
    fn delete_missing_flashcard_is_tolerated() {
        let mut conn = test_conn();
        assert!(!delete_flashcard(&mut conn, 1, 1, 99).unwrap());
    }
}
