use std::collections::{HashMap, HashSet};

use sqlx::PgPool;

use crate::db;
use crate::error::RaterError;
use crate::models::{ExternalTeacherRecord, Teacher, VerifyReport};

/// Diffs stored teachers against the dataset by name. Read-only; field
/// comparison covers the fields reconciliation would overwrite.
pub fn diff(teachers: &[Teacher], dataset: &[ExternalTeacherRecord]) -> VerifyReport {
    let by_name: HashMap<&str, &Teacher> =
        teachers.iter().map(|t| (t.name.as_str(), t)).collect();
    let dataset_names: HashSet<&str> = dataset
        .iter()
        .map(|r| r.name.as_str())
        .filter(|n| !n.trim().is_empty())
        .collect();

    let mut report = VerifyReport::default();

    for record in dataset {
        if record.name.trim().is_empty() {
            continue;
        }
        match by_name.get(record.name.as_str()) {
            None => report.missing_from_store.push(record.name.clone()),
            Some(teacher) => {
                if teacher.bio == record.bio && teacher.detail_url == record.detail_url {
                    report.matching += 1;
                } else {
                    report.mismatched.push(record.name.clone());
                }
            }
        }
    }

    for teacher in teachers {
        if !dataset_names.contains(teacher.name.as_str()) {
            report.extra_in_store.push(teacher.name.clone());
        }
    }

    report
}

pub async fn verify(
    pool: &PgPool,
    dataset: &[ExternalTeacherRecord],
) -> Result<VerifyReport, RaterError> {
    let teachers = db::fetch_all_teachers(pool).await?;
    Ok(diff(&teachers, dataset))
}
