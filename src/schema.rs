diesel::table! {
    users (user_id) {
        user_id -> Integer,
        email -> Text,
        username -> Text,
        password -> Text,
    }
}

diesel::table! {
    problems (problem_id) {
        problem_id -> Integer,
        frontend_id -> Integer,
        title -> Text,
        title_slug -> Text,
        difficulty -> Text,
    }
}

diesel::table! {
    submissions (id) {
        id -> Text,
        user_id -> Integer,
        title -> Text,
        title_slug -> Text,
        submitted_at -> Timestamp,
        created_at -> Timestamp,
    }
}

diesel::table! {
    review_schedules (id) {
        id -> Integer,
        submission_id -> Text,
        due_at -> Timestamp,
        created_at -> Timestamp,
        stability -> Double,
        difficulty -> Double,
        elapsed_days -> Integer,
        scheduled_days -> Integer,
        reps -> Integer,
        lapses -> Integer,
        state -> SmallInt,
        last_review -> Nullable<Timestamp>,
    }
}

diesel::table! {
    review_logs (id) {
        id -> Integer,
        schedule_id -> Integer,
        rating -> Integer,
        review_date -> Timestamp,
        elapsed_days -> Integer,
        scheduled_days -> Integer,
        state -> SmallInt,
    }
}

diesel::table! {
    decks (deck_id) {
        deck_id -> Integer,
        user_id -> Integer,
        deck_name -> Text,
        description -> Text,
        is_public -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    deck_problems (deck_id, problem_id) {
        deck_id -> Integer,
        problem_id -> Integer,
    }
}

diesel::table! {
    flashcard_reviews (id) {
        id -> Integer,
        user_id -> Integer,
        deck_id -> Integer,
        problem_id -> Integer,
        due_at -> Timestamp,
        stability -> Double,
        difficulty -> Double,
        elapsed_days -> Integer,
        scheduled_days -> Integer,
        reps -> Integer,
        lapses -> Integer,
        state -> SmallInt,
        last_review -> Nullable<Timestamp>,
    }
}

diesel::table! {
    flashcard_review_logs (id) {
        id -> Integer,
        flashcard_review_id -> Integer,
        rating -> Integer,
        review_date -> Timestamp,
        elapsed_days -> Integer,
        scheduled_days -> Integer,
        state -> SmallInt,
    }
}

diesel::joinable!(submissions -> users (user_id));
diesel::joinable!(review_schedules -> submissions (submission_id));
diesel::joinable!(review_logs -> review_schedules (schedule_id));
diesel::joinable!(decks -> users (user_id));
diesel::joinable!(deck_problems -> decks (deck_id));
diesel::joinable!(deck_problems -> problems (problem_id));
diesel::joinable!(flashcard_reviews -> decks (deck_id));
diesel::joinable!(flashcard_reviews -> problems (problem_id));
diesel::joinable!(flashcard_review_logs -> flashcard_reviews (flashcard_review_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    problems,
    submissions,
    review_schedules,
    review_logs,
    decks,
    deck_problems,
    flashcard_reviews,
    flashcard_review_logs,
);
