use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router, extract::Query, extract::State};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use rs_fsrs::Rating;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::AppState;
use crate::error::ApiError;
use crate::review_log;
use crate::scheduler::{self, CardState};
use crate::schema::{review_schedules, submissions};
use crate::submission::{self, Submission};
use crate::utils::get_current_user_id;

/// A submission-triggered schedule: one live row per (user, problem slug).
///
/// Ownership is resolved through the submission record; `submission_id` is
/// re-pointed to the newest submission whenever the problem is re-solved.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Serialize)]
#[diesel(table_name = review_schedules)]
#[diesel(treat_none_as_null = true)]
pub struct ReviewSchedule {
    pub id: i32,
    pub submission_id: String,
    pub due_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i16,
    pub last_review: Option<NaiveDateTime>,
}

impl ReviewSchedule {
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

/// Schedule row joined with the owning submission's problem identity.
#[derive(Debug, Serialize)]
pub struct ReviewRow {
    #[serde(flatten)]
    pub schedule: ReviewSchedule,
    pub title: String,
    pub title_slug: String,
}

#[derive(Insertable)]
#[diesel(table_name = review_schedules)]
struct NewReviewSchedule<'a> {
    submission_id: &'a str,
    due_at: NaiveDateTime,
    created_at: NaiveDateTime,
    stability: f64,
    difficulty: f64,
    elapsed_days: i32,
    scheduled_days: i32,
    reps: i32,
    lapses: i32,
    state: i16,
    last_review: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Schedule store

pub fn insert_schedule(
    conn: &mut SqliteConnection,
    submission_id: &str,
    created_at: NaiveDateTime,
    card: &CardState,
) -> Result<ReviewSchedule, ApiError> {
    diesel::insert_into(review_schedules::table)
        .values(&NewReviewSchedule {
            submission_id,
            due_at: card.due_at,
            created_at,
            stability: card.stability,
            difficulty: card.difficulty,
            elapsed_days: card.elapsed_days,
            scheduled_days: card.scheduled_days,
            reps: card.reps,
            lapses: card.lapses,
            state: card.state,
            last_review: card.last_review,
        })
        .execute(conn)?;

    let id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
        .get_result::<i32>(conn)?;

    get_schedule_by_id(conn, id)
}

pub fn get_schedule_by_id(
    conn: &mut SqliteConnection,
    id: i32,
) -> Result<ReviewSchedule, ApiError> {
    review_schedules::table
        .find(id)
        .first::<ReviewSchedule>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Review schedule with ID {} not found", id)))
}

/// Resolves the live schedule for (user, slug) through the submission join.
/// The most recent submission wins. `Ok(None)` means the create path applies;
/// any store failure propagates unchanged.
pub fn get_schedule_by_user_and_slug(
    conn: &mut SqliteConnection,
    user_id: i32,
    title_slug: &str,
) -> Result<Option<ReviewSchedule>, ApiError> {
    let schedule = review_schedules::table
        .inner_join(submissions::table)
        .filter(submissions::user_id.eq(user_id))
        .filter(submissions::title_slug.eq(title_slug))
        .order(submissions::submitted_at.desc())
        .select(review_schedules::all_columns)
        .first::<ReviewSchedule>(conn)
        .optional()?;
    Ok(schedule)
}

/// Full-row replace. A vanished row is NotFound, not a generic write failure.
pub fn update_schedule(
    conn: &mut SqliteConnection,
    schedule: &ReviewSchedule,
) -> Result<(), ApiError> {
    let affected = diesel::update(review_schedules::table.find(schedule.id))
        .set(schedule)
        .execute(conn)?;

    if affected == 0 {
        return Err(ApiError::NotFound(format!(
            "Review schedule with ID {} not found",
            schedule.id
        )));
    }
    Ok(())
}

/// Due rows: `due_at <= now`, ordered by due date. Upcoming uses the strict
/// complement, so at any instant a schedule matches exactly one of the two.
pub fn list_due(
    conn: &mut SqliteConnection,
    user_id: i32,
    now: NaiveDateTime,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ReviewRow>, i64), ApiError> {
    let total = review_schedules::table
        .inner_join(submissions::table)
        .filter(submissions::user_id.eq(user_id))
        .filter(review_schedules::due_at.le(now))
        .count()
        .get_result::<i64>(conn)?;

    let rows = review_schedules::table
        .inner_join(submissions::table)
        .filter(submissions::user_id.eq(user_id))
        .filter(review_schedules::due_at.le(now))
        .order(review_schedules::due_at.asc())
        .limit(limit)
        .offset(offset)
        .select((
            review_schedules::all_columns,
            submissions::title,
            submissions::title_slug,
        ))
        .load::<(ReviewSchedule, String, String)>(conn)?
        .into_iter()
        .map(|(schedule, title, title_slug)| ReviewRow {
            schedule,
            title,
            title_slug,
        })
        .collect();

    Ok((rows, total))
}

pub fn list_upcoming(
    conn: &mut SqliteConnection,
    user_id: i32,
    now: NaiveDateTime,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ReviewRow>, i64), ApiError> {
    let total = review_schedules::table
        .inner_join(submissions::table)
        .filter(submissions::user_id.eq(user_id))
        .filter(review_schedules::due_at.gt(now))
        .count()
        .get_result::<i64>(conn)?;

    let rows = review_schedules::table
        .inner_join(submissions::table)
        .filter(submissions::user_id.eq(user_id))
        .filter(review_schedules::due_at.gt(now))
        .order(review_schedules::due_at.asc())
        .limit(limit)
        .offset(offset)
        .select((
            review_schedules::all_columns,
            submissions::title,
            submissions::title_slug,
        ))
        .load::<(ReviewSchedule, String, String)>(conn)?
        .into_iter()
        .map(|(schedule, title, title_slug)| ReviewRow {
            schedule,
            title,
            title_slug,
        })
        .collect();

    Ok((rows, total))
}

// ---------------------------------------------------------------------------
// Orchestrator

/// First solve of a problem: the solve itself counts as the first successful
/// review, so the fresh card is immediately advanced with Good.
pub fn create_review(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    submission_id: &str,
) -> Result<ReviewSchedule, ApiError> {
    let (card, log) = scheduler::advance(&scheduler::fresh_card(now), now, Rating::Good);
    let schedule = insert_schedule(conn, submission_id, now.naive_utc(), &card)?;
    review_log::append_schedule_log(conn, schedule.id, &log)?;
    Ok(schedule)
}

/// Explicit user-driven re-rating of an existing schedule.
pub fn apply_rating(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    review_id: i32,
    rating_value: i32,
) -> Result<ReviewSchedule, ApiError> {
    let rating = scheduler::rating_from_value(rating_value)
        .ok_or_else(|| ApiError::validation("rating", "Rating must be between 1 and 4"))?;

    let mut schedule = get_schedule_by_id(conn, review_id)?;
    let (card, log) = scheduler::advance(&schedule.card(), now, rating);
    schedule.apply_card(&card);

    update_schedule(conn, &schedule)?;
    review_log::append_schedule_log(conn, schedule.id, &log)?;
    Ok(schedule)
}

/// Idempotent re-solve handling: re-attach the existing schedule to the new
/// submission and advance its accumulated card state, or create a fresh
/// schedule tagged with the submission if none exists yet.
///
/// Callers must hold the per-(user, slug) lock around this read-modify-write;
/// the handlers below do.
pub fn update_or_create_for_submission(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    sub: &Submission,
    rating: Rating,
) -> Result<ReviewSchedule, ApiError> {
    match get_schedule_by_user_and_slug(conn, sub.user_id, &sub.title_slug)? {
        Some(mut existing) => {
            let (card, log) = scheduler::advance(&existing.card(), now, rating);
            existing.submission_id = sub.id.clone();
            existing.apply_card(&card);
            update_schedule(conn, &existing)?;
            review_log::append_schedule_log(conn, existing.id, &log)?;
            Ok(existing)
        }
        None => {
            let (card, log) = scheduler::advance(&scheduler::fresh_card(now), now, rating);
            let schedule = insert_schedule(conn, &sub.id, now.naive_utc(), &card)?;
            review_log::append_schedule_log(conn, schedule.id, &log)?;
            Ok(schedule)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessSubmissionRequest {
    #[serde(default)]
    pub is_internal: bool,
    pub leetcode_submission_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub title_slug: String,
    pub submitted_at: String,
    pub rating: Option<i32>,
}

/// Ingestion composite: derive a tagged submission ID, persist the submission
/// and upsert its schedule in one transaction. A failure anywhere rolls the
/// whole unit back, so an orphaned submission cannot be left behind.
pub fn process_submission(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    user_id: i32,
    req: &ProcessSubmissionRequest,
) -> Result<(Submission, ReviewSchedule), ApiError> {
    if req.title_slug.is_empty() {
        return Err(ApiError::validation(
            "title_slug",
            "Problem title slug is required",
        ));
    }

    let rating = match req.rating {
        Some(value) => scheduler::rating_from_value(value)
            .ok_or_else(|| ApiError::validation("rating", "Rating must be between 1 and 4"))?,
        None => Rating::Good,
    };

    let submission_id = if req.is_internal {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("internal-user-{}", &id[..12])
    } else {
        let external = req.leetcode_submission_id.as_deref().ok_or_else(|| {
            ApiError::validation(
                "leetcode_submission_id",
                "LeetcodeSubmissionID is required when IsInternal is false",
            )
        })?;
        format!("leetcode-{}", external)
    };

    let submitted_at = DateTime::parse_from_rfc3339(&req.submitted_at)
        .map_err(|_| ApiError::validation("submitted_at", "Invalid time format (expected RFC3339)"))?
        .naive_utc();

    let sub = Submission {
        id: submission_id,
        user_id,
        title: req.title.clone(),
        title_slug: req.title_slug.clone(),
        submitted_at,
        created_at: now.naive_utc(),
    };

    conn.transaction::<_, ApiError, _>(|conn| {
        if submission::submission_exists(conn, &sub.id)? {
            return Err(ApiError::Conflict(format!(
                "Submission with ID {} already exists",
                sub.id
            )));
        }
        submission::create_submission(conn, &sub)?;
        let schedule = update_or_create_for_submission(conn, now, &sub, rating)?;
        Ok((sub.clone(), schedule))
    })
}

/// Paginated retrieval. For the combined view, a page is filled with due rows
/// first and topped up with upcoming rows; the upcoming offset accounts for
/// rows already consumed by earlier pages, and the total is always
/// `due_total + upcoming_total`.
pub fn get_reviews(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    user_id: i32,
    status: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<(Vec<ReviewRow>, i64), ApiError> {
    let now = now.naive_utc();
    let offset = (page - 1) * per_page;

    match status {
        Some("due") => list_due(conn, user_id, now, per_page, offset),
        Some("upcoming") => list_upcoming(conn, user_id, now, per_page, offset),
        _ => {
            let (mut rows, due_total) = list_due(conn, user_id, now, per_page, offset)?;
            let remaining = per_page - rows.len() as i64;
            let upcoming_offset = (offset - due_total).max(0);
            // limit 0 still computes the upcoming total for the combined count
            let (upcoming_rows, upcoming_total) =
                list_upcoming(conn, user_id, now, remaining.max(0), upcoming_offset)?;
            rows.extend(upcoming_rows);
            Ok((rows, due_total + upcoming_total))
        }
    }
}

// ---------------------------------------------------------------------------
// Per-(user, slug) locking

/// Keyed locks serializing the read-modify-write in
/// `update_or_create_for_submission` against concurrent identical solves.
#[derive(Clone, Default)]
pub struct SlugLocks {
    inner: Arc<Mutex<HashMap<(i32, String), Arc<tokio::sync::Mutex<()>>>>>,
}

impl SlugLocks {
    pub fn lock_for(&self, user_id: i32, title_slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // An entry only the map still references has no holder; dropping it
        // here keeps the map bounded by the number of in-flight requests.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry((user_id, title_slug.to_string()))
            .or_default()
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Handlers

#[derive(Deserialize)]
pub struct CreateReviewRequest {
    pub submission_id: String,
}

#[derive(Deserialize)]
pub struct RateReviewRequest {
    pub review_id: i32,
    pub rating: i32,
}

#[derive(Deserialize)]
pub struct ReviewListParams {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

fn pagination(params: &ReviewListParams) -> (i64, i64) {
    let page = params.page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = params
        .per_page
        .filter(|p| *p > 0 && *p <= 100)
        .unwrap_or(10);
    (page, per_page)
}

pub async fn create_review_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let now = state.clock.now();
    let mut conn = state.pool.get()?;
    let schedule = create_review(&mut conn, now, &req.submission_id)?;

    Ok((StatusCode::CREATED, Json(json!({ "id": schedule.id }))))
}

pub async fn rate_review_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RateReviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let now = state.clock.now();
    let mut conn = state.pool.get()?;
    let schedule = apply_rating(&mut conn, now, req.review_id, req.rating)?;

    Ok(Json(json!({
        "success": true,
        "next_review_at": schedule.due_at,
        "days_until_review": schedule.scheduled_days,
    })))
}

pub async fn sync_review_handler(
    State(state): State<AppState>,
    session: Session,
    Json(mut sub): Json<Submission>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;
    sub.user_id = user_id;

    let now = state.clock.now();
    let lock = state.slug_locks.lock_for(user_id, &sub.title_slug);
    let _guard = lock.lock().await;

    let mut conn = state.pool.get()?;
    let schedule = update_or_create_for_submission(&mut conn, now, &sub, Rating::Good)?;

    Ok(Json(json!({
        "success": true,
        "next_review_at": schedule.due_at,
        "days_until_review": schedule.scheduled_days,
    })))
}

pub async fn process_submission_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<ProcessSubmissionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let now = state.clock.now();
    let lock = state.slug_locks.lock_for(user_id, &req.title_slug);
    let _guard = lock.lock().await;

    let mut conn = state.pool.get()?;
    let (sub, schedule) = process_submission(&mut conn, now, user_id, &req)?;

    Ok(Json(json!({
        "success": true,
        "submission_id": sub.id,
        "next_review_at": schedule.due_at,
        "days_until_review": schedule.scheduled_days,
        "is_due": schedule.due_at <= now.naive_utc(),
        "title": sub.title,
        "title_slug": sub.title_slug,
    })))
}

pub async fn get_reviews_handler(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ReviewListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let (page, per_page) = pagination(&params);
    let now = state.clock.now();
    let mut conn = state.pool.get()?;
    let (rows, total) = get_reviews(
        &mut conn,
        now,
        user_id,
        params.status.as_deref(),
        page,
        per_page,
    )?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub async fn review_logs_handler(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ReviewListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let (page, per_page) = pagination(&params);
    let mut conn = state.pool.get()?;
    let (logs, total) =
        review_log::get_schedule_logs_by_user(&mut conn, user_id, per_page, (page - 1) * per_page)?;

    Ok(Json(json!({
        "data": logs,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub fn review_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_reviews_handler).post(create_review_handler))
        .route("/rate", post(rate_review_handler))
        .route("/sync", post(sync_review_handler))
        .route("/process-submission", post(process_submission_handler))
        .route("/logs", get(review_logs_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;
    use crate::review_log::count_schedule_logs;
    use chrono::{Duration, TimeZone};

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn seed_submission(
        conn: &mut SqliteConnection,
        id: &str,
        user_id: i32,
        slug: &str,
        submitted_at: NaiveDateTime,
    ) -> Submission {
        let sub = Submission {
            id: id.to_string(),
            user_id,
            title: slug.replace('-', " "),
            title_slug: slug.to_string(),
            submitted_at,
            created_at: submitted_at,
        };
        submission::create_submission(conn, &sub).unwrap();
        sub
    }

    /// Seeds a submission plus a schedule pinned to a specific due date.
    fn seed_schedule_due_at(
        conn: &mut SqliteConnection,
        user_id: i32,
        slug: &str,
        due_at: NaiveDateTime,
    ) -> ReviewSchedule {
        let now = test_now();
        let sub_id = format!("leetcode-{}", slug);
        seed_submission(conn, &sub_id, user_id, slug, now.naive_utc());

        let mut card = scheduler::advance(&scheduler::fresh_card(now), now, Rating::Good).0;
        card.due_at = due_at;
        insert_schedule(conn, &sub_id, now.naive_utc(), &card).unwrap()
    }

    fn process_req(slug: &str, external_id: &str, submitted_at: DateTime<Utc>) -> ProcessSubmissionRequest {
        ProcessSubmissionRequest {
            is_internal: false,
            leetcode_submission_id: Some(external_id.to_string()),
            title: slug.replace('-', " "),
            title_slug: slug.to_string(),
            submitted_at: submitted_at.to_rfc3339(),
            rating: None,
        }
    }

    #[test]
    fn first_solve_creates_schedule_with_one_rep() {
        let mut conn = test_conn();
        let now = test_now();

        let (sub, schedule) =
            process_submission(&mut conn, now, 1, &process_req("two-sum", "100", now)).unwrap();

        assert_eq!(sub.id, "leetcode-100");
        assert_eq!(schedule.reps, 1);
        assert!(schedule.due_at > now.naive_utc());
        assert_eq!(count_schedule_logs(&mut conn, schedule.id).unwrap(), 1);
    }

    #[test]
    fn resolve_reattaches_single_schedule() {
        let mut conn = test_conn();
        let now = test_now();

        process_submission(&mut conn, now, 1, &process_req("two-sum", "100", now)).unwrap();

        let later = now + Duration::days(2);
        let (_, schedule) =
            process_submission(&mut conn, later, 1, &process_req("two-sum", "200", later)).unwrap();

        assert_eq!(schedule.submission_id, "leetcode-200");
        assert_eq!(schedule.reps, 2);

        let count = review_schedules::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(count, 1, "exactly one schedule per (user, slug)");
    }

    #[test]
    fn duplicate_submission_id_conflicts_without_orphan() {
        let mut conn = test_conn();
        let now = test_now();
        let req = process_req("two-sum", "100", now);

        process_submission(&mut conn, now, 1, &req).unwrap();
        let err = process_submission(&mut conn, now, 1, &req).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let subs = submission::get_submissions_by_user(&mut conn, 1).unwrap();
        assert_eq!(subs.len(), 1);
        let schedules = review_schedules::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(schedules, 1);
    }

    #[test]
    fn distinct_slugs_get_distinct_schedules() {
        let mut conn = test_conn();
        let now = test_now();

        process_submission(&mut conn, now, 1, &process_req("two-sum", "100", now)).unwrap();
        process_submission(&mut conn, now, 1, &process_req("add-two-numbers", "101", now))
            .unwrap();

        let count = review_schedules::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn missing_slug_is_rejected() {
        let mut conn = test_conn();
        let mut req = process_req("", "100", test_now());
        req.title_slug = String::new();
        let err = process_submission(&mut conn, test_now(), 1, &req).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn rating_outside_range_is_rejected() {
        let mut conn = test_conn();
        let err = apply_rating(&mut conn, test_now(), 1, 5).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = apply_rating(&mut conn, test_now(), 1, 0).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn rating_unknown_schedule_is_not_found() {
        let mut conn = test_conn();
        let err = apply_rating(&mut conn, test_now(), 999, 3).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn rating_updates_schedule_and_appends_log() {
        let mut conn = test_conn();
        let now = test_now();
        let (_, schedule) =
            process_submission(&mut conn, now, 1, &process_req("two-sum", "100", now)).unwrap();

        let later = now + Duration::days(1);
        let updated = apply_rating(&mut conn, later, schedule.id, 3).unwrap();

        assert_eq!(updated.reps, 2);
        assert_eq!(updated.last_review, Some(later.naive_utc()));
        assert_eq!(count_schedule_logs(&mut conn, schedule.id).unwrap(), 2);
    }

    #[test]
    fn due_and_upcoming_partition_schedules() {
        let mut conn = test_conn();
        let now = test_now().naive_utc();

        seed_schedule_due_at(&mut conn, 1, "overdue", now - Duration::days(1));
        seed_schedule_due_at(&mut conn, 1, "future", now + Duration::days(1));

        let (due, due_total) = list_due(&mut conn, 1, now, 10, 0).unwrap();
        let (upcoming, upcoming_total) = list_upcoming(&mut conn, 1, now, 10, 0).unwrap();

        assert_eq!(due_total, 1);
        assert_eq!(upcoming_total, 1);
        assert_eq!(due[0].title_slug, "overdue");
        assert_eq!(upcoming[0].title_slug, "future");
    }

    #[test]
    fn boundary_card_is_due_not_upcoming() {
        let mut conn = test_conn();
        let now = test_now().naive_utc();

        seed_schedule_due_at(&mut conn, 1, "exactly-now", now);

        let (_, due_total) = list_due(&mut conn, 1, now, 10, 0).unwrap();
        let (_, upcoming_total) = list_upcoming(&mut conn, 1, now, 10, 0).unwrap();
        assert_eq!(due_total, 1);
        assert_eq!(upcoming_total, 0);
    }

    #[test]
    fn combined_page_tops_up_with_upcoming() {
        let mut conn = test_conn();
        let now = test_now();
        let naive = now.naive_utc();

        for i in 0..3 {
            seed_schedule_due_at(&mut conn, 1, &format!("due-{}", i), naive - Duration::days(i + 1));
        }
        for i in 0..20 {
            seed_schedule_due_at(
                &mut conn,
                1,
                &format!("up-{:02}", i),
                naive + Duration::days(i + 1),
            );
        }

        let (rows, total) = get_reviews(&mut conn, now, 1, None, 1, 10).unwrap();
        assert_eq!(total, 23);
        assert_eq!(rows.len(), 10);
        assert!(rows[..3].iter().all(|r| r.schedule.due_at <= naive));
        assert!(rows[3..].iter().all(|r| r.schedule.due_at > naive));
    }

    #[test]
    fn combined_pages_do_not_repeat_upcoming_rows() {
        let mut conn = test_conn();
        let now = test_now();
        let naive = now.naive_utc();

        for i in 0..3 {
            seed_schedule_due_at(&mut conn, 1, &format!("due-{}", i), naive - Duration::days(i + 1));
        }
        for i in 0..20 {
            seed_schedule_due_at(
                &mut conn,
                1,
                &format!("up-{:02}", i),
                naive + Duration::days(i + 1),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for page in 1..=3 {
            let (rows, total) = get_reviews(&mut conn, now, 1, None, page, 10).unwrap();
            assert_eq!(total, 23);
            for row in rows {
                assert!(
                    seen.insert(row.schedule.id),
                    "schedule {} repeated on page {}",
                    row.schedule.id,
                    page
                );
            }
        }
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn status_filters_delegate_directly() {
        let mut conn = test_conn();
        let now = test_now();
        let naive = now.naive_utc();

        seed_schedule_due_at(&mut conn, 1, "overdue", naive - Duration::days(1));
        seed_schedule_due_at(&mut conn, 1, "future", naive + Duration::days(1));

        let (due, due_total) = get_reviews(&mut conn, now, 1, Some("due"), 1, 10).unwrap();
        assert_eq!((due.len(), due_total), (1, 1));

        let (up, up_total) = get_reviews(&mut conn, now, 1, Some("upcoming"), 1, 10).unwrap();
        assert_eq!((up.len(), up_total), (1, 1));
    }

    #[test]
    fn schedules_are_scoped_to_their_user() {
        let mut conn = test_conn();
        let now = test_now();
        let naive = now.naive_utc();

        seed_schedule_due_at(&mut conn, 1, "mine", naive - Duration::days(1));
        seed_schedule_due_at(&mut conn, 2, "theirs", naive - Duration::days(1));

        let (rows, total) = list_due(&mut conn, 1, naive, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].title_slug, "mine");
    }

    #[test]
    fn update_vanished_schedule_is_not_found() {
        let mut conn = test_conn();
        let now = test_now();
        let (_, mut schedule) =
            process_submission(&mut conn, now, 1, &process_req("two-sum", "100", now)).unwrap();

        // Clear the schedule's log children first so the FK lets it vanish.
        diesel::delete(
            crate::schema::review_logs::table
                .filter(crate::schema::review_logs::schedule_id.eq(schedule.id)),
        )
        .execute(&mut conn)
        .unwrap();
        diesel::delete(review_schedules::table.find(schedule.id))
            .execute(&mut conn)
            .unwrap();

        schedule.reps += 1;
        let err = update_schedule(&mut conn, &schedule).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn slug_locks_are_shared_while_held_and_pruned_after_release() {
        let locks = SlugLocks::default();

        let first = locks.lock_for(1, "two-sum");
        let again = locks.lock_for(1, "two-sum");
        assert!(Arc::ptr_eq(&first, &again));

        drop(first);
        drop(again);
        locks.lock_for(2, "add-two-numbers");

        let map = locks.inner.lock().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&(2, "add-two-numbers".to_string())));
    }

    #[test]
    fn internal_submissions_get_tagged_ids() {
        let mut conn = test_conn();
        let now = test_now();
        let req = ProcessSubmissionRequest {
            is_internal: true,
            leetcode_submission_id: None,
            title: "Two Sum".into(),
            title_slug: "two-sum".into(),
            submitted_at: now.to_rfc3339(),
            rating: None,
        };

        let (sub, _) = process_submission(&mut conn, now, 1, &req).unwrap();
        assert!(sub.id.starts_with("internal-user-"));
        assert_eq!(sub.id.len(), "internal-user-".len() + 12);
    }
}
