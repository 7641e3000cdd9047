//! Assignment and solution records
//!
//! Each record has a full stored form, a `New*` form for inserts and an `*Update`
//! form whose `None` fields leave the stored value untouched.

use crate::db::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSIGNMENT_STATUS: &str = "pending";

/// An assignment posted by a student
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: DocumentId,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub files: Vec<String>, // stored-file references, upload order
    pub created_by: String, // creator's username
    pub status: String,     // open set, "pending" until someone moves it on
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub title: String,
    pub description: String,
    pub subject: String,
    pub files: Vec<String>,
    pub created_by: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Replaces the whole list when present
    pub files: Option<Vec<String>>,
}

impl AssignmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.subject.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.files.is_none()
    }

    pub fn apply_to(self, assignment: &mut Assignment) {
        if let Some(title) = self.title {
            assignment.title = title;
        }
        if let Some(description) = self.description {
            assignment.description = description;
        }
        if let Some(subject) = self.subject {
            assignment.subject = subject;
        }
        if let Some(status) = self.status {
            assignment.status = status;
        }
        if let Some(due_date) = self.due_date {
            assignment.due_date = Some(due_date);
        }
        if let Some(files) = self.files {
            assignment.files = files;
        }
    }
}

/// A helper's or admin's answer to an assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub id: DocumentId,
    /// Not enforced as a foreign key
    pub assignment_id: String,
    pub answer_files: Vec<String>,
    pub answered_by: String,
    pub submitted_on: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSolution {
    pub assignment_id: String,
    pub answer_files: Vec<String>,
    pub answered_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct SolutionUpdate {
    pub assignment_id: Option<String>,
    pub answer_files: Option<Vec<String>>,
}

impl SolutionUpdate {
    pub fn is_empty(&self) -> bool {
        self.assignment_id.is_none() && self.answer_files.is_none()
    }

    pub fn apply_to(self, solution: &mut Solution) {
        if let Some(assignment_id) = self.assignment_id {
            solution.assignment_id = assignment_id;
        }
        if let Some(answer_files) = self.answer_files {
            solution.answer_files = answer_files;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment {
            id: DocumentId::generate(),
            title: "Linear algebra".to_string(),
            description: "Problem set 3".to_string(),
            subject: "math".to_string(),
            files: vec!["uploaded_files/a.pdf".to_string()],
            created_by: "bobby_01".to_string(),
            status: DEFAULT_ASSIGNMENT_STATUS.to_string(),
            due_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_assignment_merge_overwrites_only_present_fields() {
        let mut a = assignment();
        let before = a.clone();

        AssignmentUpdate {
            status: Some("in-progress".to_string()),
            ..Default::default()
        }
        .apply_to(&mut a);

        assert_eq!(a.status, "in-progress");
        assert_eq!(a.title, before.title);
        assert_eq!(a.files, before.files);
        assert_eq!(a.due_date, None);
    }

    #[test]
    fn test_assignment_files_replaced_wholesale() {
        let mut a = assignment();
        AssignmentUpdate {
            files: Some(vec!["uploaded_files/b.pdf".to_string(), "uploaded_files/c.pdf".to_string()]),
            ..Default::default()
        }
        .apply_to(&mut a);

        assert_eq!(a.files.len(), 2);
        assert_eq!(a.files[0], "uploaded_files/b.pdf");
    }

    #[test]
    fn test_empty_updates() {
        assert!(AssignmentUpdate::default().is_empty());
        assert!(SolutionUpdate::default().is_empty());
        assert!(!SolutionUpdate {
            answer_files: Some(vec![]),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_solution_json_shape() {
        let s = Solution {
            id: DocumentId::generate(),
            assignment_id: "65a1b2c3d4e5f60718293a4b".to_string(),
            answer_files: vec!["solution_files/x.pdf".to_string()],
            answered_by: "carol_01".to_string(),
            submitted_on: Utc::now(),
        };
        let json = serde_json::to_value(&s).unwrap();

        assert_eq!(json["id"].as_str().unwrap().len(), DocumentId::LEN);
        assert_eq!(json["answer_files"][0], "solution_files/x.pdf");
        assert_eq!(json["answered_by"], "carol_01");
    }
}
