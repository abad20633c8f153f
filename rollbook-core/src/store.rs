//! Persistence seam and the in-memory store used by the CLI and tests

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Exam, Score, ScoreRow, Student, StudentRow};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("record conflicts with an existing row: {0}")]
    Conflict(String),

    #[error("referenced record does not exist: {0}")]
    MissingReference(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Tenant-scoped persistence operations needed by ingestion.
///
/// Lookups return `Ok(None)` for "not found"; `Err` is reserved for storage
/// failures.
pub trait Store: Send + Sync {
    fn exam(&self, tenant_id: &str, exam_id: &str) -> Result<Option<Exam>, StoreError>;

    fn student_by_class_roll(
        &self,
        tenant_id: &str,
        class_label: &str,
        roll_number: u32,
    ) -> Result<Option<Student>, StoreError>;

    fn create_student(&self, row: StudentRow) -> Result<Student, StoreError>;

    /// Persist a whole batch or nothing
    fn create_scores(
        &self,
        tenant_id: &str,
        exam_id: &str,
        rows: Vec<ScoreRow>,
    ) -> Result<Vec<Score>, StoreError>;
}

/// Serializable contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub exams: Vec<Exam>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub scores: Vec<Score>,
}

/// Mutex-guarded store enforcing the (tenant, class, roll) uniqueness rule
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Seed>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        Self {
            state: Mutex::new(seed),
        }
    }

    /// Copy of everything currently stored
    pub fn snapshot(&self) -> Result<Seed, StoreError> {
        Ok(self.lock()?.clone())
    }

    pub fn insert_exam(&self, exam: Exam) -> Result<(), StoreError> {
        self.lock()?.exams.push(exam);
        Ok(())
    }

    pub fn insert_student(&self, student: Student) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if find_student(&state, &student.tenant_id, &student.class_label, student.roll_number)
            .is_some()
        {
            return Err(conflict(&student.class_label, student.roll_number));
        }
        state.students.push(student);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Seed>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn find_student<'a>(
    state: &'a Seed,
    tenant_id: &str,
    class_label: &str,
    roll_number: u32,
) -> Option<&'a Student> {
    state.students.iter().find(|s| {
        s.tenant_id == tenant_id && s.class_label == class_label && s.roll_number == roll_number
    })
}

fn conflict(class_label: &str, roll_number: u32) -> StoreError {
    StoreError::Conflict(format!("class {class_label} roll {roll_number}"))
}

impl Store for MemoryStore {
    fn exam(&self, tenant_id: &str, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .exams
            .iter()
            .find(|e| e.id == exam_id && e.tenant_id == tenant_id)
            .cloned())
    }

    fn student_by_class_roll(
        &self,
        tenant_id: &str,
        class_label: &str,
        roll_number: u32,
    ) -> Result<Option<Student>, StoreError> {
        let state = self.lock()?;
        Ok(find_student(&state, tenant_id, class_label, roll_number).cloned())
    }

    fn create_student(&self, row: StudentRow) -> Result<Student, StoreError> {
        let mut state = self.lock()?;
        if find_student(&state, &row.tenant_id, &row.class_label, row.roll_number).is_some() {
            return Err(conflict(&row.class_label, row.roll_number));
        }

        let student = Student {
            id: Uuid::new_v4().to_string(),
            tenant_id: row.tenant_id,
            full_name: row.full_name,
            class_label: row.class_label,
            roll_number: row.roll_number,
            date_of_birth: row.date_of_birth,
            house: row.house,
            parent_phone: row.parent_phone,
            admission_year: row.admission_year,
            created_at: Utc::now(),
        };
        state.students.push(student.clone());
        Ok(student)
    }

    fn create_scores(
        &self,
        tenant_id: &str,
        exam_id: &str,
        rows: Vec<ScoreRow>,
    ) -> Result<Vec<Score>, StoreError> {
        let mut state = self.lock()?;

        // Check every reference before touching state so the batch stays atomic
        if !state
            .exams
            .iter()
            .any(|e| e.id == exam_id && e.tenant_id == tenant_id)
        {
            return Err(StoreError::MissingReference(format!("exam {exam_id}")));
        }
        for row in &rows {
            let known = state
                .students
                .iter()
                .any(|s| s.id == row.student_id && s.tenant_id == tenant_id);
            if !known {
                return Err(StoreError::MissingReference(format!(
                    "student {}",
                    row.student_id
                )));
            }
        }

        let now = Utc::now();
        let scores: Vec<Score> = rows
            .into_iter()
            .map(|row| Score {
                id: Uuid::new_v4().to_string(),
                exam_id: exam_id.to_string(),
                student_id: row.student_id,
                subject: row.subject,
                score: row.score,
                max_score: row.max_score,
                grade: row.grade,
                created_at: now,
            })
            .collect();
        state.scores.extend(scores.iter().cloned());
        Ok(scores)
    }
}
