use chrono::{DateTime, NaiveDateTime, Utc};
use rs_fsrs::{Card, FSRS, Parameters, Rating, State};
use serde::{Deserialize, Serialize};

/// Memory parameters for one (user, problem) pair, as persisted.
///
/// Shared by submission-triggered schedules and deck-triggered flashcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardState {
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i16,
    pub last_review: Option<NaiveDateTime>,
    pub due_at: NaiveDateTime,
}

/// One rating application, destined for the append-only review logs.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingLog {
    pub rating: i32,
    pub review_date: NaiveDateTime,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub state: i16,
}

/// A card that has never been rated: reps 0, state New, due immediately.
pub fn fresh_card(now: DateTime<Utc>) -> CardState {
    CardState {
        stability: 0.0,
        difficulty: 0.0,
        elapsed_days: 0,
        scheduled_days: 0,
        reps: 0,
        lapses: 0,
        state: State::New as i16,
        last_review: None,
        due_at: now.naive_utc(),
    }
}

/// Parses a 1-4 rating value (Again/Hard/Good/Easy).
pub fn rating_from_value(value: i32) -> Option<Rating> {
    match value {
        1 => Some(Rating::Again),
        2 => Some(Rating::Hard),
        3 => Some(Rating::Good),
        4 => Some(Rating::Easy),
        _ => None,
    }
}

fn state_from_i16(value: i16) -> State {
    match value {
        1 => State::Learning,
        2 => State::Review,
        3 => State::Relearning,
        _ => State::New,
    }
}

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

fn to_fsrs_card(card: &CardState, now: DateTime<Utc>) -> Card {
    Card {
        due: to_utc(card.due_at),
        stability: card.stability,
        difficulty: card.difficulty,
        elapsed_days: card.elapsed_days as i64,
        scheduled_days: card.scheduled_days as i64,
        reps: card.reps,
        lapses: card.lapses,
        state: state_from_i16(card.state),
        // The scheduler ignores last_review for New cards, so a card that has
        // never been reviewed can safely report "now".
        last_review: card.last_review.map(to_utc).unwrap_or(now),
    }
}

fn from_fsrs_card(card: &Card) -> CardState {
    CardState {
        stability: card.stability,
        difficulty: card.difficulty,
        elapsed_days: card.elapsed_days as i32,
        scheduled_days: card.scheduled_days as i32,
        reps: card.reps,
        lapses: card.lapses,
        state: card.state as i16,
        last_review: Some(card.last_review.naive_utc()),
        due_at: card.due.naive_utc(),
    }
}

/// Applies one rating to a card and returns the advanced state plus the log
/// entry describing the application.
///
/// Pure and deterministic: identical inputs produce identical outputs. Callers
/// must take `due_at`, `last_review` and all counters from the returned state
/// rather than patching fields by hand.
pub fn advance(card: &CardState, now: DateTime<Utc>, rating: Rating) -> (CardState, RatingLog) {
    let fsrs = FSRS::new(Parameters::default());
    let info = fsrs.next(to_fsrs_card(card, now), now, rating);

    let log = RatingLog {
        rating: rating as i32,
        review_date: info.review_log.reviewed_date.naive_utc(),
        elapsed_days: info.review_log.elapsed_days as i32,
        scheduled_days: info.review_log.scheduled_days as i32,
        state: info.review_log.state as i16,
    };

    (from_fsrs_card(&info.card), log)
}
