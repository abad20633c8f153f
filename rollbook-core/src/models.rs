//! Domain records exchanged with the persistence layer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::validate::convert::deserialize_calendar_date;

/// Role carried by an authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Staff,
    Teacher,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        }
    }
}

/// Already-authenticated caller. Authorization happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    /// Empty when the user is not mapped to any school
    #[serde(default)]
    pub tenant_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            role,
        }
    }
}

/// Persisted student record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub tenant_id: String,
    pub full_name: String,
    pub class_label: String,
    pub roll_number: u32,
    #[serde(deserialize_with = "deserialize_calendar_date")]
    pub date_of_birth: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
    pub admission_year: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A validated student waiting to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub tenant_id: String,
    pub full_name: String,
    pub class_label: String,
    pub roll_number: u32,
    pub date_of_birth: NaiveDate,
    pub house: Option<String>,
    pub parent_phone: Option<String>,
    pub admission_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub tenant_id: String,
    pub class_label: String,
    pub title: String,
    #[serde(default)]
    pub term: String,
    #[serde(deserialize_with = "deserialize_calendar_date")]
    pub date: NaiveDate,
}

/// A validated score waiting to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub exam_id: String,
    pub student_id: String,
    pub subject: String,
    pub score: f64,
    pub max_score: f64,
    pub grade: Option<String>,
}

/// Persisted exam score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub subject: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// One manually entered score, as posted by a form rather than a file
#[derive(Debug, Clone, Deserialize)]
pub struct ManualScore {
    pub student_id: String,
    pub subject: String,
    pub score: f64,
    /// Zero or negative means "out of 100"
    #[serde(default)]
    pub max_score: f64,
    #[serde(default)]
    pub grade: Option<String>,
}
