use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::error::ApiError;
use crate::scheduler::RatingLog;
use crate::schema::{flashcard_review_logs, review_logs, review_schedules, submissions};

/// Append-only audit row: one per rating applied to a review schedule.
/// Never updated or deleted; read back only for analytics.
#[derive(Debug, Queryable, Serialize)]
#[diesel(table_name = review_logs)]
pub struct ReviewLog {
    pub id: i32,
    pub schedule_id: i32,
    pub rating: i32,
    pub review_date: NaiveDateTime,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub state: i16,
}

#[derive(Debug, Queryable, Serialize)]
#[diesel(table_name = flashcard_review_logs)]
pub struct FlashcardReviewLog {
    pub id: i32,
    pub flashcard_review_id: i32,
    pub rating: i32,
    pub review_date: NaiveDateTime,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub state: i16,
}

/// Appends a log row for a schedule. Called after the schedule write commits.
pub fn append_schedule_log(
    conn: &mut SqliteConnection,
    schedule_id: i32,
    entry: &RatingLog,
) -> Result<(), ApiError> {
    diesel::insert_into(review_logs::table)
        .values((
            review_logs::schedule_id.eq(schedule_id),
            review_logs::rating.eq(entry.rating),
            review_logs::review_date.eq(entry.review_date),
            review_logs::elapsed_days.eq(entry.elapsed_days),
            review_logs::scheduled_days.eq(entry.scheduled_days),
            review_logs::state.eq(entry.state),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn append_flashcard_log(
    conn: &mut SqliteConnection,
    flashcard_review_id: i32,
    entry: &RatingLog,
) -> Result<(), ApiError> {
    diesel::insert_into(flashcard_review_logs::table)
        .values((
            flashcard_review_logs::flashcard_review_id.eq(flashcard_review_id),
            flashcard_review_logs::rating.eq(entry.rating),
            flashcard_review_logs::review_date.eq(entry.review_date),
            flashcard_review_logs::elapsed_days.eq(entry.elapsed_days),
            flashcard_review_logs::scheduled_days.eq(entry.scheduled_days),
            flashcard_review_logs::state.eq(entry.state),
        ))
        .execute(conn)?;
    Ok(())
}

/// Paginated rating history for a user, newest first, joined through the
/// schedule and its owning submission.
pub fn get_schedule_logs_by_user(
    conn: &mut SqliteConnection,
    user_id: i32,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ReviewLog>, i64), ApiError> {
    let total = review_logs::table
        .inner_join(review_schedules::table.inner_join(submissions::table))
        .filter(submissions::user_id.eq(user_id))
        .count()
        .get_result::<i64>(conn)?;

    let logs = review_logs::table
        .inner_join(review_schedules::table.inner_join(submissions::table))
        .filter(submissions::user_id.eq(user_id))
        .order(review_logs::review_date.desc())
        .limit(limit)
        .offset(offset)
        .select(review_logs::all_columns)
        .load::<ReviewLog>(conn)?;

    Ok((logs, total))
}

pub fn count_schedule_logs(
    conn: &mut SqliteConnection,
    schedule_id: i32,
) -> Result<i64, ApiError> {
    let count = review_logs::table
        .filter(review_logs::schedule_id.eq(schedule_id))
        .count()
        .get_result::<i64>(conn)?;
    Ok(count)
}
