use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::RaterError;
use crate::models::{NewReview, ReviewRatings, Teacher, TeacherFields, TeacherStats};
use crate::ratings;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const TEACHER_COLUMNS: &str = "id, name, bio, department, subjects, image, detail_url, \
     original_image_url, total_reviews, average_rating, difficulty_rating, \
     would_take_again_percent";

fn teacher_from_row(row: &PgRow) -> Teacher {
    Teacher {
        id: row.get("id"),
        name: row.get("name"),
        bio: row.get("bio"),
        department: row.get("department"),
        subjects: row.get("subjects"),
        image: row.get("image"),
        detail_url: row.get("detail_url"),
        original_image_url: row.get("original_image_url"),
        stats: TeacherStats {
            total_reviews: row.get("total_reviews"),
            average_rating: row.get("average_rating"),
            difficulty_rating: row.get("difficulty_rating"),
            would_take_again_percent: row.get("would_take_again_percent"),
        },
    }
}

pub async fn fetch_all_teachers(pool: &PgPool) -> Result<Vec<Teacher>, RaterError> {
    let rows = sqlx::query(&format!(
        "SELECT {TEACHER_COLUMNS} FROM profrater.teachers ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(teacher_from_row).collect())
}

pub async fn fetch_top_teachers(pool: &PgPool, limit: i64) -> Result<Vec<Teacher>, RaterError> {
    let rows = sqlx::query(&format!(
        "SELECT {TEACHER_COLUMNS} FROM profrater.teachers \
         ORDER BY average_rating DESC, total_reviews DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(teacher_from_row).collect())
}

pub async fn get_teacher_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Option<Teacher>, RaterError> {
    let row = sqlx::query(&format!(
        "SELECT {TEACHER_COLUMNS} FROM profrater.teachers WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(conn)
    .await?;

    Ok(row.as_ref().map(teacher_from_row))
}

pub async fn fetch_teacher_ids(pool: &PgPool) -> Result<Vec<Uuid>, RaterError> {
    let rows = sqlx::query("SELECT id FROM profrater.teachers ORDER BY created_at")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

pub async fn fetch_teacher_name_index(
    conn: &mut PgConnection,
) -> Result<Vec<(String, Uuid)>, RaterError> {
    let rows = sqlx::query("SELECT name, id FROM profrater.teachers")
        .fetch_all(conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("name"), row.get("id")))
        .collect())
}

/// Locks the teacher row for the remainder of the transaction so two
/// concurrent recomputes for the same teacher cannot lose an update.
pub async fn lock_teacher(conn: &mut PgConnection, teacher_id: Uuid) -> Result<(), RaterError> {
    let row = sqlx::query("SELECT id FROM profrater.teachers WHERE id = $1 FOR UPDATE")
        .bind(teacher_id)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(_) => Ok(()),
        None => Err(RaterError::NotFound(teacher_id.to_string())),
    }
}

pub async fn insert_teacher(
    conn: &mut PgConnection,
    name: &str,
    fields: &TeacherFields,
) -> Result<Uuid, RaterError> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO profrater.teachers
        (id, name, bio, department, detail_url, original_image_url, image)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(&fields.bio)
    .bind(&fields.department)
    .bind(&fields.detail_url)
    .bind(&fields.original_image_url)
    .bind(fields.image.as_deref().unwrap_or(""))
    .execute(conn)
    .await?;

    Ok(id)
}

/// Overwrites the non-statistic fields only; the four derived statistics
/// stay whatever the aggregator last wrote. The stored image reference is
/// kept when no new one was prepared.
pub async fn update_teacher_fields(
    conn: &mut PgConnection,
    teacher_id: Uuid,
    fields: &TeacherFields,
) -> Result<(), RaterError> {
    sqlx::query(
        r#"
        UPDATE profrater.teachers
        SET bio = $2,
            department = $3,
            detail_url = $4,
            original_image_url = $5,
            image = COALESCE($6, image),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(teacher_id)
    .bind(&fields.bio)
    .bind(&fields.department)
    .bind(&fields.detail_url)
    .bind(&fields.original_image_url)
    .bind(fields.image.as_deref())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn update_teacher_stats(
    conn: &mut PgConnection,
    teacher_id: Uuid,
    stats: &TeacherStats,
) -> Result<(), RaterError> {
    sqlx::query(
        r#"
        UPDATE profrater.teachers
        SET total_reviews = $2,
            average_rating = $3,
            difficulty_rating = $4,
            would_take_again_percent = $5,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(teacher_id)
    .bind(stats.total_reviews)
    .bind(stats.average_rating)
    .bind(stats.difficulty_rating)
    .bind(stats.would_take_again_percent)
    .execute(conn)
    .await?;

    Ok(())
}

/// Refuses to delete a teacher that still has reviews. Only the reset
/// reconciliation path removes teachers together with their reviews.
pub async fn delete_teacher(pool: &PgPool, teacher_id: Uuid) -> Result<(), RaterError> {
    let count: i64 =
        sqlx::query("SELECT COUNT(*) AS n FROM profrater.reviews WHERE teacher_id = $1")
            .bind(teacher_id)
            .fetch_one(pool)
            .await?
            .get("n");

    if count > 0 {
        return Err(RaterError::Dataset(format!(
            "teacher {teacher_id} still has {count} reviews; delete those first"
        )));
    }

    let result = sqlx::query("DELETE FROM profrater.teachers WHERE id = $1")
        .bind(teacher_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RaterError::NotFound(teacher_id.to_string()));
    }
    Ok(())
}

/// Removes every teacher; reviews go with them via the schema's cascade.
pub async fn delete_all_teachers(conn: &mut PgConnection) -> Result<u64, RaterError> {
    let result = sqlx::query("DELETE FROM profrater.teachers")
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_review_ratings(
    conn: &mut PgConnection,
    teacher_id: Uuid,
) -> Result<Vec<ReviewRatings>, RaterError> {
    let rows = sqlx::query(
        "SELECT overall_rating, difficulty_rating, would_take_again \
         FROM profrater.reviews WHERE teacher_id = $1",
    )
    .bind(teacher_id)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ReviewRatings {
            overall_rating: row.get("overall_rating"),
            difficulty_rating: row.get("difficulty_rating"),
            would_take_again: row.get("would_take_again"),
        })
        .collect())
}

/// Inserts a review and recomputes the owning teacher's statistics in the
/// same transaction.
pub async fn create_review(pool: &PgPool, review: &NewReview) -> Result<Uuid, RaterError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO profrater.reviews
        (id, teacher_id, reviewer_name, overall_rating, difficulty_rating,
         would_take_again, course, semester, title, content, tags, pros, cons)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(id)
    .bind(review.teacher_id)
    .bind(&review.reviewer_name)
    .bind(review.overall_rating)
    .bind(review.difficulty_rating)
    .bind(review.would_take_again)
    .bind(&review.course)
    .bind(&review.semester)
    .bind(&review.title)
    .bind(&review.content)
    .bind(&review.tags)
    .bind(&review.pros)
    .bind(&review.cons)
    .execute(&mut *tx)
    .await?;

    ratings::recompute_in(&mut tx, review.teacher_id).await?;
    tx.commit().await?;
    Ok(id)
}

/// Updates a review's rating fields (absent values keep the stored ones)
/// and recomputes the owning teacher's statistics in the same transaction.
pub async fn update_review_ratings(
    pool: &PgPool,
    review_id: Uuid,
    overall_rating: Option<i32>,
    difficulty_rating: Option<i32>,
    would_take_again: Option<bool>,
) -> Result<(), RaterError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        UPDATE profrater.reviews
        SET overall_rating = COALESCE($2, overall_rating),
            difficulty_rating = COALESCE($3, difficulty_rating),
            would_take_again = COALESCE($4, would_take_again),
            updated_at = now()
        WHERE id = $1
        RETURNING teacher_id
        "#,
    )
    .bind(review_id)
    .bind(overall_rating)
    .bind(difficulty_rating)
    .bind(would_take_again)
    .fetch_optional(&mut *tx)
    .await?;

    let teacher_id: Uuid = match row {
        Some(row) => row.get("teacher_id"),
        None => return Err(RaterError::NotFound(format!("review {review_id}"))),
    };

    ratings::recompute_in(&mut tx, teacher_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Deletes a review and recomputes the owning teacher's statistics in the
/// same transaction.
pub async fn delete_review(pool: &PgPool, review_id: Uuid) -> Result<(), RaterError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("DELETE FROM profrater.reviews WHERE id = $1 RETURNING teacher_id")
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await?;

    let teacher_id: Uuid = match row {
        Some(row) => row.get("teacher_id"),
        None => return Err(RaterError::NotFound(format!("review {review_id}"))),
    };

    ratings::recompute_in(&mut tx, teacher_id).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teachers = vec![
        (
            "Alice Zhang",
            "Teaches object-oriented programming with a focus on design patterns.",
            "OOP,AOOP",
        ),
        (
            "Marcus Webb",
            "Covers software engineering process and project management.",
            "SE,SPM",
        ),
        (
            "Priya Nair",
            "Runs the databases and web application development courses.",
            "DB,WAD",
        ),
    ];

    // Teachers already present keep their data; their sample reviews are
    // not inserted again, so re-running seed does not inflate statistics.
    let mut seeded = Vec::new();
    {
        let mut conn = pool.acquire().await?;
        for (name, bio, subjects) in teachers {
            if get_teacher_by_name(&mut conn, name).await?.is_some() {
                continue;
            }
            let fields = TeacherFields {
                bio: bio.to_string(),
                department: crate::sync::DEFAULT_DEPARTMENT.to_string(),
                detail_url: String::new(),
                original_image_url: String::new(),
                image: None,
            };
            let id = insert_teacher(&mut conn, name, &fields).await?;
            sqlx::query("UPDATE profrater.teachers SET subjects = $2 WHERE id = $1")
                .bind(id)
                .bind(subjects)
                .execute(&mut *conn)
                .await?;
            seeded.push((name, id));
        }
    }

    let reviews = vec![
        (
            "Alice Zhang",
            5,
            3,
            true,
            "OOP",
            "Clear lectures",
            "Explains patterns with real projects.",
        ),
        (
            "Alice Zhang",
            4,
            4,
            true,
            "AOOP",
            "Challenging but fair",
            "Assignments take time but teach a lot.",
        ),
        (
            "Marcus Webb",
            3,
            2,
            false,
            "SE",
            "Dry delivery",
            "Content is fine, lectures read off slides.",
        ),
        (
            "Priya Nair",
            4,
            3,
            true,
            "DB",
            "Hands-on labs",
            "Weekly labs make the material stick.",
        ),
    ];

    for (teacher_name, overall, difficulty, again, course, title, content) in reviews {
        let Some((_, teacher_id)) = seeded.iter().find(|(n, _)| *n == teacher_name) else {
            continue;
        };
        create_review(
            pool,
            &NewReview {
                teacher_id: *teacher_id,
                reviewer_name: "Anonymous".to_string(),
                overall_rating: overall,
                difficulty_rating: difficulty,
                would_take_again: again,
                course: course.to_string(),
                semester: "FALL_2024".to_string(),
                title: title.to_string(),
                content: content.to_string(),
                tags: String::new(),
                pros: String::new(),
                cons: String::new(),
            },
        )
        .await?;
    }

    Ok(())
}
