use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Teacher {
    pub id: Uuid,
    pub name: String,
    pub bio: String,
    pub department: String,
    pub subjects: String,
    pub image: String,
    pub detail_url: String,
    pub original_image_url: String,
    pub stats: TeacherStats,
}

impl Teacher {
    pub fn subjects_list(&self) -> Vec<String> {
        self.subjects
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Derived statistics for one teacher. Always a pure function of the
/// teacher's current review set; written only by the rating aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TeacherStats {
    pub total_reviews: i32,
    pub average_rating: f64,
    pub difficulty_rating: f64,
    pub would_take_again_percent: f64,
}

/// The rating fields of one review, the only inputs the aggregator reads.
#[derive(Debug, Clone, Copy)]
pub struct ReviewRatings {
    pub overall_rating: i32,
    pub difficulty_rating: i32,
    pub would_take_again: bool,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub teacher_id: Uuid,
    pub reviewer_name: String,
    pub overall_rating: i32,
    pub difficulty_rating: i32,
    pub would_take_again: bool,
    pub course: String,
    pub semester: String,
    pub title: String,
    pub content: String,
    pub tags: String,
    pub pros: String,
    pub cons: String,
}

/// One entry of the external teacher dataset. `name` is the natural key;
/// an entry with an empty name is skipped during reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalTeacherRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub detail_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub local_image_path: String,
}

/// Non-key teacher fields produced from an external record. `image` is
/// `None` when no photo could be located or copied, in which case any
/// stored image reference is left as-is.
#[derive(Debug, Clone)]
pub struct TeacherFields {
    pub bio: String,
    pub department: String,
    pub detail_url: String,
    pub original_image_url: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// Delete every stored teacher (and their reviews), then re-import.
    Reset,
    /// Upsert by name; teachers absent from the dataset are left alone.
    Update,
    /// Same writes as update, but reports how many stored teachers the
    /// dataset does not cover.
    Merge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub kept_unchanged: usize,
    pub deleted: u64,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub matching: usize,
    pub missing_from_store: Vec<String>,
    pub extra_in_store: Vec<String>,
    pub mismatched: Vec<String>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_store.is_empty()
            && self.extra_in_store.is_empty()
            && self.mismatched.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher_with_subjects(subjects: &str) -> Teacher {
        Teacher {
            id: Uuid::new_v4(),
            name: "Alice Zhang".to_string(),
            bio: String::new(),
            department: "Computer Science & Software Engineering".to_string(),
            subjects: subjects.to_string(),
            image: String::new(),
            detail_url: String::new(),
            original_image_url: String::new(),
            stats: TeacherStats::default(),
        }
    }

    #[test]
    fn subjects_split_and_trimmed() {
        let teacher = teacher_with_subjects("OOP, Software Engineering ,DB");
        assert_eq!(
            teacher.subjects_list(),
            vec!["OOP", "Software Engineering", "DB"]
        );
    }

    #[test]
    fn empty_subjects_give_empty_list() {
        let teacher = teacher_with_subjects("");
        assert!(teacher.subjects_list().is_empty());
    }

    #[test]
    fn external_record_defaults_missing_fields() {
        let record: ExternalTeacherRecord =
            serde_json::from_str(r#"{"name": "Bob Li"}"#).unwrap();
        assert_eq!(record.name, "Bob Li");
        assert!(record.bio.is_empty());
        assert!(record.local_image_path.is_empty());
    }
}
