use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::RaterError;
use crate::models::{ExternalTeacherRecord, SyncMode, SyncReport, Teacher, TeacherFields};

pub const DEFAULT_DEPARTMENT: &str = "Computer Science & Software Engineering";
pub const PHOTO_SUBDIR: &str = "teacher_photos";

/// Reads and parses the external dataset. Any read or parse failure is
/// fatal and happens before a single store write.
pub fn load_dataset(path: &Path) -> Result<Vec<ExternalTeacherRecord>, RaterError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| RaterError::Dataset(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| RaterError::Dataset(format!("invalid JSON in {}: {e}", path.display())))
}

/// Copies one photo from the source directory into the media root and
/// returns the media-relative reference to store.
fn copy_photo(
    local_image_path: &str,
    photos_dir: &Path,
    media_root: &Path,
) -> Result<Option<String>, RaterError> {
    let Some(file_name) = Path::new(local_image_path).file_name() else {
        return Ok(None);
    };
    let source = photos_dir.join(file_name);
    if !source.exists() {
        return Ok(None);
    }

    let dest_dir = media_root.join(PHOTO_SUBDIR);
    fs::create_dir_all(&dest_dir)?;
    fs::copy(&source, dest_dir.join(file_name))?;
    Ok(Some(format!(
        "{PHOTO_SUBDIR}/{}",
        file_name.to_string_lossy()
    )))
}

/// Maps an external record to the teacher's non-key fields. The photo named
/// by `local_image_path` is looked up in `photos_dir` and copied under
/// `media_root`; a missing or uncopyable photo only costs the image
/// reference, never the record.
pub fn prepare_fields(
    record: &ExternalTeacherRecord,
    photos_dir: &Path,
    media_root: &Path,
) -> TeacherFields {
    let mut image = None;

    if !record.local_image_path.is_empty() {
        match copy_photo(&record.local_image_path, photos_dir, media_root) {
            Ok(copied) => image = copied,
            Err(e) => eprintln!(
                "warning: failed to copy photo for {}: {e}",
                record.local_image_path
            ),
        }
    }

    TeacherFields {
        bio: record.bio.clone(),
        department: DEFAULT_DEPARTMENT.to_string(),
        detail_url: record.detail_url.clone(),
        original_image_url: record.image_url.clone(),
        image,
    }
}

/// What one reconciliation pass will do with one dataset record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Create,
    Update,
    SkipMissingName,
    SkipDuplicateName,
}

/// Decides per-record actions and the count report for a sync run, given
/// the names currently in the store. Pure; the store writes in [`sync`]
/// follow this plan exactly. A name appearing twice in the dataset is
/// written once; later occurrences are skipped like nameless records and
/// never reach the created/updated counts.
pub fn plan(
    dataset: &[ExternalTeacherRecord],
    store_names: &[&str],
    mode: SyncMode,
) -> (Vec<RecordAction>, SyncReport) {
    let store: HashSet<&str> = store_names.iter().copied().collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut report = SyncReport::default();
    let mut actions = Vec::with_capacity(dataset.len());

    for record in dataset {
        let name = record.name.as_str();
        if name.trim().is_empty() {
            report.skipped += 1;
            actions.push(RecordAction::SkipMissingName);
            continue;
        }
        if !seen.insert(name) {
            report.skipped += 1;
            actions.push(RecordAction::SkipDuplicateName);
            continue;
        }

        let exists = mode != SyncMode::Reset && store.contains(name);
        if exists {
            report.updated += 1;
            actions.push(RecordAction::Update);
        } else {
            report.created += 1;
            actions.push(RecordAction::Create);
        }
    }

    if mode == SyncMode::Merge {
        report.kept_unchanged = store_names.iter().filter(|n| !seen.contains(*n)).count();
    }

    (actions, report)
}

/// Reconciles the teacher store against the dataset under the given mode.
/// All record writes for one call happen in a single transaction; photo
/// copies are filesystem side effects outside it.
pub async fn sync(
    pool: &PgPool,
    dataset: &[ExternalTeacherRecord],
    mode: SyncMode,
    photos_dir: &Path,
    media_root: &Path,
) -> Result<SyncReport, RaterError> {
    let mut tx = pool.begin().await?;

    let deleted = if mode == SyncMode::Reset {
        db::delete_all_teachers(&mut tx).await?
    } else {
        0
    };

    // In reset mode the store was just emptied, so the plan sees no names.
    let name_index: HashMap<String, Uuid> = if mode == SyncMode::Reset {
        HashMap::new()
    } else {
        db::fetch_teacher_name_index(&mut tx).await?.into_iter().collect()
    };
    let store_names: Vec<&str> = name_index.keys().map(String::as_str).collect();

    let (actions, mut report) = plan(dataset, &store_names, mode);
    report.deleted = deleted;

    for (record, action) in dataset.iter().zip(&actions) {
        match action {
            RecordAction::SkipMissingName => {
                eprintln!("warning: skipping dataset record without a name");
            }
            RecordAction::SkipDuplicateName => {
                eprintln!(
                    "warning: skipping duplicate dataset record for {}",
                    record.name
                );
            }
            RecordAction::Create => {
                let fields = prepare_fields(record, photos_dir, media_root);
                db::insert_teacher(&mut tx, &record.name, &fields).await?;
            }
            RecordAction::Update => {
                let fields = prepare_fields(record, photos_dir, media_root);
                if let Some(&teacher_id) = name_index.get(record.name.as_str()) {
                    db::update_teacher_fields(&mut tx, teacher_id, &fields).await?;
                }
            }
        }
    }

    tx.commit().await?;
    Ok(report)
}

pub fn teacher_to_record(teacher: &Teacher) -> ExternalTeacherRecord {
    let local_image_path = if teacher.image.is_empty() {
        String::new()
    } else {
        Path::new(&teacher.image)
            .file_name()
            .map(|f| format!("{PHOTO_SUBDIR}/{}", f.to_string_lossy()))
            .unwrap_or_default()
    };

    ExternalTeacherRecord {
        name: teacher.name.clone(),
        bio: teacher.bio.clone(),
        detail_url: teacher.detail_url.clone(),
        image_url: teacher.original_image_url.clone(),
        local_image_path,
    }
}

/// Snapshots the stored teachers back into the dataset format, in creation
/// order. Used for operator exports and pre-sync backups.
pub async fn export_dataset(pool: &PgPool) -> Result<Vec<ExternalTeacherRecord>, RaterError> {
    let teachers = db::fetch_all_teachers(pool).await?;
    Ok(teachers.iter().map(teacher_to_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeacherStats;
    use std::io::Write;
    use uuid::Uuid;

    #[test]
    fn load_dataset_parses_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teachers.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"name": "Alice Zhang", "bio": "OOP", "detail_url": "https://example.com/a"}},
                {{"bio": "no name"}}]"#
        )
        .unwrap();

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset[0].name, "Alice Zhang");
        assert!(dataset[1].name.is_empty());
    }

    #[test]
    fn load_dataset_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "[{not json").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, RaterError::Dataset(_)));
    }

    #[test]
    fn load_dataset_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, RaterError::Dataset(_)));
    }

    fn named(name: &str) -> ExternalTeacherRecord {
        ExternalTeacherRecord {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn update_against_empty_store_creates_one() {
        let dataset = vec![ExternalTeacherRecord {
            name: "Bob".to_string(),
            bio: "x".to_string(),
            ..Default::default()
        }];

        let (actions, report) = plan(&dataset, &[], SyncMode::Update);
        assert_eq!(actions, vec![RecordAction::Create]);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.kept_unchanged, 0);
    }

    #[test]
    fn update_overwrites_matches_and_leaves_store_only_names_alone() {
        let dataset = vec![named("Alice Zhang"), named("New Teacher")];
        let store = ["Alice Zhang", "Store Only"];

        let (actions, report) = plan(&dataset, &store, SyncMode::Update);
        assert_eq!(actions, vec![RecordAction::Update, RecordAction::Create]);
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 1);
        // Update mode does not report store-only teachers.
        assert_eq!(report.kept_unchanged, 0);
    }

    #[test]
    fn merge_counts_store_only_teachers_as_kept() {
        let dataset = vec![named("Alice Zhang"), named("New Teacher")];
        let store = ["Alice Zhang", "Store Only"];

        let (actions, report) = plan(&dataset, &store, SyncMode::Merge);
        assert_eq!(actions, vec![RecordAction::Update, RecordAction::Create]);
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.kept_unchanged, 1);
    }

    #[test]
    fn reset_creates_every_named_record() {
        let dataset = vec![named("Alice Zhang"), named("Marcus Webb")];

        let (actions, report) = plan(&dataset, &[], SyncMode::Reset);
        assert_eq!(actions, vec![RecordAction::Create, RecordAction::Create]);
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
    }

    #[test]
    fn nameless_records_never_reach_counts() {
        let dataset = vec![
            ExternalTeacherRecord {
                bio: "no name".to_string(),
                ..Default::default()
            },
            named("Bob"),
        ];

        let (actions, report) = plan(&dataset, &[], SyncMode::Update);
        assert_eq!(
            actions,
            vec![RecordAction::SkipMissingName, RecordAction::Create]
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn duplicate_names_are_written_once() {
        let dataset = vec![named("Alice Zhang"), named("Alice Zhang")];

        let (actions, report) = plan(&dataset, &[], SyncMode::Reset);
        assert_eq!(
            actions,
            vec![RecordAction::Create, RecordAction::SkipDuplicateName]
        );
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn duplicate_of_existing_teacher_updates_once() {
        let dataset = vec![named("Alice Zhang"), named("Alice Zhang")];
        let store = ["Alice Zhang"];

        let (actions, report) = plan(&dataset, &store, SyncMode::Merge);
        assert_eq!(
            actions,
            vec![RecordAction::Update, RecordAction::SkipDuplicateName]
        );
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.kept_unchanged, 0);
    }

    #[test]
    fn prepare_fields_copies_photo_into_media_root() {
        let photos = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        fs::write(photos.path().join("alice.jpg"), b"jpeg bytes").unwrap();

        let record = ExternalTeacherRecord {
            name: "Alice Zhang".to_string(),
            local_image_path: "photos/alice.jpg".to_string(),
            ..Default::default()
        };

        let fields = prepare_fields(&record, photos.path(), media.path());
        assert_eq!(fields.image.as_deref(), Some("teacher_photos/alice.jpg"));
        assert!(media.path().join("teacher_photos/alice.jpg").exists());
        assert_eq!(fields.department, DEFAULT_DEPARTMENT);
    }

    #[test]
    fn prepare_fields_missing_photo_leaves_image_unset() {
        let photos = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();

        let record = ExternalTeacherRecord {
            name: "Alice Zhang".to_string(),
            bio: "teaches OOP".to_string(),
            local_image_path: "photos/nope.jpg".to_string(),
            ..Default::default()
        };

        let fields = prepare_fields(&record, photos.path(), media.path());
        assert!(fields.image.is_none());
        assert_eq!(fields.bio, "teaches OOP");
    }

    #[test]
    fn prepare_fields_without_photo_path() {
        let photos = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();

        let record = ExternalTeacherRecord {
            name: "Alice Zhang".to_string(),
            image_url: "https://example.com/alice.jpg".to_string(),
            ..Default::default()
        };

        let fields = prepare_fields(&record, photos.path(), media.path());
        assert!(fields.image.is_none());
        assert_eq!(fields.original_image_url, "https://example.com/alice.jpg");
    }

    #[test]
    fn export_record_round_trips_core_fields() {
        let teacher = Teacher {
            id: Uuid::new_v4(),
            name: "Priya Nair".to_string(),
            bio: "databases".to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
            subjects: "DB".to_string(),
            image: "teacher_photos/priya.jpg".to_string(),
            detail_url: "https://example.com/priya".to_string(),
            original_image_url: "https://example.com/img/priya.jpg".to_string(),
            stats: TeacherStats::default(),
        };

        let record = teacher_to_record(&teacher);
        assert_eq!(record.name, "Priya Nair");
        assert_eq!(record.local_image_path, "teacher_photos/priya.jpg");
        assert_eq!(record.image_url, "https://example.com/img/priya.jpg");
    }

    #[test]
    fn export_record_for_teacher_without_photo() {
        let teacher = Teacher {
            id: Uuid::new_v4(),
            name: "Marcus Webb".to_string(),
            bio: String::new(),
            department: DEFAULT_DEPARTMENT.to_string(),
            subjects: String::new(),
            image: String::new(),
            detail_url: String::new(),
            original_image_url: String::new(),
            stats: TeacherStats::default(),
        };

        assert!(teacher_to_record(&teacher).local_image_path.is_empty());
    }
}
