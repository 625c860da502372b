use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db;
use crate::error::RaterError;
use crate::models::{ReviewRatings, TeacherStats};

/// Derives a teacher's statistics from its full review set. A teacher with
/// no reviews gets all four fields zeroed rather than NULL-ish averages.
pub fn aggregate(ratings: &[ReviewRatings]) -> TeacherStats {
    if ratings.is_empty() {
        return TeacherStats::default();
    }

    let count = ratings.len();
    let overall_sum: i64 = ratings.iter().map(|r| i64::from(r.overall_rating)).sum();
    let difficulty_sum: i64 = ratings.iter().map(|r| i64::from(r.difficulty_rating)).sum();
    let would_take_again = ratings.iter().filter(|r| r.would_take_again).count();

    TeacherStats {
        total_reviews: count as i32,
        average_rating: round2(overall_sum as f64 / count as f64),
        difficulty_rating: round2(difficulty_sum as f64 / count as f64),
        would_take_again_percent: round2(100.0 * would_take_again as f64 / count as f64),
    }
}

/// Rounds half-to-even at two decimals, the precision the store keeps for
/// rating fields.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Recomputes one teacher's statistics inside the caller's transaction.
/// Takes the teacher row lock first so concurrent review writes for the
/// same teacher serialize instead of losing updates.
pub async fn recompute_in(
    conn: &mut PgConnection,
    teacher_id: Uuid,
) -> Result<TeacherStats, RaterError> {
    db::lock_teacher(conn, teacher_id).await?;
    let ratings = db::fetch_review_ratings(conn, teacher_id).await?;
    let stats = aggregate(&ratings);
    db::update_teacher_stats(conn, teacher_id, &stats).await?;
    Ok(stats)
}

/// Standalone recompute for repair and backfill. Idempotent; safe to run
/// again after any failure.
pub async fn recompute(pool: &PgPool, teacher_id: Uuid) -> Result<TeacherStats, RaterError> {
    let mut tx = pool.begin().await?;
    let stats = recompute_in(&mut tx, teacher_id).await?;
    tx.commit().await?;
    Ok(stats)
}
