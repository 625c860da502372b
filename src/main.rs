use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod error;
mod models;
mod ratings;
mod sync;
mod verify;

use models::{NewReview, SyncMode};

#[derive(Parser)]
#[command(name = "profrater-sync")]
#[command(about = "Teacher rating aggregation and dataset reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Reconcile the teacher store against an external JSON dataset
    Sync {
        #[arg(long, default_value = "teachers_data_final.json")]
        json: PathBuf,
        #[arg(long, default_value = "teacher_photos")]
        photos_dir: PathBuf,
        #[arg(long, default_value = "media")]
        media_root: PathBuf,
        #[arg(long, value_enum, default_value_t = SyncMode::Update)]
        mode: SyncMode,
        /// Export the current teachers to a timestamped JSON file first
        #[arg(long)]
        backup: bool,
    },
    /// Check the teacher store against a dataset without writing
    Verify {
        #[arg(long, default_value = "teachers_data_final.json")]
        json: PathBuf,
    },
    /// Export stored teachers in the dataset format
    Export {
        #[arg(long, default_value = "teachers_data_export.json")]
        out: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Recompute rating statistics for one teacher, or for all
    Recompute {
        /// Teacher name; omit to recompute every teacher
        #[arg(long)]
        teacher: Option<String>,
    },
    /// List teachers by average rating
    Top {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Add a review for a teacher (recomputes their statistics)
    AddReview {
        #[arg(long)]
        teacher: String,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=5))]
        overall: i32,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=5))]
        difficulty: i32,
        #[arg(long)]
        would_take_again: bool,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, default_value = "OTHER")]
        course: String,
        #[arg(long, default_value = "OTHER")]
        semester: String,
        #[arg(long, default_value = "Anonymous")]
        reviewer: String,
    },
    /// Change a review's rating fields (recomputes the teacher's statistics)
    #[command(group(
        ArgGroup::new("changes")
            .args(["overall", "difficulty", "would_take_again"])
            .multiple(true)
            .required(true)
    ))]
    EditReview {
        #[arg(long)]
        id: Uuid,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=5))]
        overall: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=5))]
        difficulty: Option<i32>,
        #[arg(long)]
        would_take_again: Option<bool>,
    },
    /// Delete a review (recomputes the teacher's statistics)
    DeleteReview {
        #[arg(long)]
        id: Uuid,
    },
    /// Delete a teacher; refused while reviews still reference them
    DeleteTeacher {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Sync {
            json,
            photos_dir,
            media_root,
            mode,
            backup,
        } => {
            let dataset = sync::load_dataset(&json)?;

            if backup {
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                let backup_path = PathBuf::from(format!("teachers_backup_{stamp}.json"));
                let snapshot = sync::export_dataset(&pool).await?;
                std::fs::write(&backup_path, serde_json::to_string_pretty(&snapshot)?)?;
                println!("Backed up {} teachers to {}.", snapshot.len(), backup_path.display());
            }

            if mode == SyncMode::Reset {
                println!("Reset mode deletes every stored teacher and their reviews.");
            }

            let report = sync::sync(&pool, &dataset, mode, &photos_dir, &media_root).await?;

            if mode == SyncMode::Reset {
                println!("Deleted {} teachers.", report.deleted);
            }
            println!("Created {} teachers.", report.created);
            println!("Updated {} teachers.", report.updated);
            if mode == SyncMode::Merge {
                println!(
                    "Kept {} teachers present only in the store.",
                    report.kept_unchanged
                );
            }
            if report.skipped > 0 {
                println!(
                    "Skipped {} records (missing or duplicate names).",
                    report.skipped
                );
            }
        }
        Commands::Verify { json } => {
            let dataset = sync::load_dataset(&json)?;
            let report = verify::verify(&pool, &dataset).await?;

            println!("Matching: {}", report.matching);
            for name in &report.missing_from_store {
                println!("Missing from store: {name}");
            }
            for name in &report.extra_in_store {
                println!("Only in store: {name}");
            }
            for name in &report.mismatched {
                println!("Fields differ: {name}");
            }
            if report.is_consistent() {
                println!("Store matches the dataset.");
            } else {
                println!("Store and dataset differ; run sync to reconcile.");
            }
        }
        Commands::Export { out, overwrite } => {
            if out.exists() && !overwrite {
                anyhow::bail!(
                    "{} already exists; pass --overwrite to replace it",
                    out.display()
                );
            }
            let snapshot = sync::export_dataset(&pool).await?;
            std::fs::write(&out, serde_json::to_string_pretty(&snapshot)?)?;
            println!("Exported {} teachers to {}.", snapshot.len(), out.display());
        }
        Commands::Recompute { teacher } => match teacher {
            Some(name) => {
                let mut conn = pool.acquire().await?;
                let found = db::get_teacher_by_name(&mut conn, &name)
                    .await?
                    .with_context(|| format!("no teacher named {name}"))?;
                drop(conn);
                let stats = ratings::recompute(&pool, found.id).await?;
                println!(
                    "{name}: {} reviews, rating {:.2}, difficulty {:.2}, would take again {:.2}%",
                    stats.total_reviews,
                    stats.average_rating,
                    stats.difficulty_rating,
                    stats.would_take_again_percent
                );
            }
            None => {
                let ids = db::fetch_teacher_ids(&pool).await?;
                for id in &ids {
                    ratings::recompute(&pool, *id).await?;
                }
                println!("Recomputed statistics for {} teachers.", ids.len());
            }
        },
        Commands::Top { limit } => {
            let teachers = db::fetch_top_teachers(&pool, limit).await?;
            if teachers.is_empty() {
                println!("No teachers in the store.");
                return Ok(());
            }
            for teacher in &teachers {
                let subjects = teacher.subjects_list();
                println!(
                    "- {} ({}) rating {:.2} difficulty {:.2} across {} reviews{}",
                    teacher.name,
                    teacher.department,
                    teacher.stats.average_rating,
                    teacher.stats.difficulty_rating,
                    teacher.stats.total_reviews,
                    if subjects.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", subjects.join(", "))
                    }
                );
            }
        }
        Commands::AddReview {
            teacher,
            overall,
            difficulty,
            would_take_again,
            title,
            content,
            course,
            semester,
            reviewer,
        } => {
            let mut conn = pool.acquire().await?;
            let found = db::get_teacher_by_name(&mut conn, &teacher)
                .await?
                .with_context(|| format!("no teacher named {teacher}"))?;
            drop(conn);

            let id = db::create_review(
                &pool,
                &NewReview {
                    teacher_id: found.id,
                    reviewer_name: reviewer,
                    overall_rating: overall,
                    difficulty_rating: difficulty,
                    would_take_again,
                    course,
                    semester,
                    title,
                    content,
                    tags: String::new(),
                    pros: String::new(),
                    cons: String::new(),
                },
            )
            .await?;
            println!("Review {id} added for {teacher}.");
        }
        Commands::EditReview {
            id,
            overall,
            difficulty,
            would_take_again,
        } => {
            db::update_review_ratings(&pool, id, overall, difficulty, would_take_again).await?;
            println!("Review {id} updated.");
        }
        Commands::DeleteReview { id } => {
            db::delete_review(&pool, id).await?;
            println!("Review {id} deleted.");
        }
        Commands::DeleteTeacher { name } => {
            let mut conn = pool.acquire().await?;
            let found = db::get_teacher_by_name(&mut conn, &name)
                .await?
                .with_context(|| format!("no teacher named {name}"))?;
            drop(conn);
            db::delete_teacher(&pool, found.id).await?;
            println!("Teacher {name} deleted.");
        }
    }

    Ok(())
}
