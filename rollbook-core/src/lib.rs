//! rollbook: bulk spreadsheet ingestion for school rolls and exam scores
//!
//! Uploaded `.csv` or `.xlsx` files are decoded into a header row plus data
//! rows, headers are mapped onto canonical fields through alias tables, and
//! each row is validated against tenant-scoped records held by a [`Store`].

pub mod config;
pub mod error;
pub mod headers;
pub mod models;
pub mod reader;
pub mod store;
pub mod validate;

use anyhow::Result;
use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::info;

pub use config::IngestConfig;
pub use error::{DecodeError, IngestError};
pub use headers::{AliasTable, Target};
pub use models::{Exam, ManualScore, Principal, Role, Score, Student};
pub use reader::{FileKind, RawTable, Upload};
pub use store::{MemoryStore, Seed, Store, StoreError};
pub use validate::{CancelFlag, IngestOutcome, RowError};

use validate::students::StudentIngest;

/// Main ingestion interface
pub struct Ingestor {
    config: IngestConfig,
    score_aliases: AliasTable,
    student_aliases: AliasTable,
    current_year: Option<i32>,
    store: Arc<dyn Store>,
}

impl Ingestor {
    /// Create an ingestor with default configuration
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::build(IngestConfig::default(), store)
    }

    /// Create an ingestor with custom configuration
    pub fn with_config(config: IngestConfig, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, store))
    }

    fn build(config: IngestConfig, store: Arc<dyn Store>) -> Self {
        Self {
            score_aliases: config.alias_table(Target::Scores),
            student_aliases: config.alias_table(Target::Students),
            config,
            current_year: None,
            store,
        }
    }

    /// Pin the year used for rows without an admission year
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn tenant<'p>(&self, principal: &'p Principal) -> Result<&'p str, IngestError> {
        match principal.tenant_id.trim() {
            "" => Err(IngestError::MissingTenant),
            tenant => Ok(tenant),
        }
    }

    fn exam(&self, tenant_id: &str, exam_id: &str) -> Result<Exam, IngestError> {
        self.store
            .exam(tenant_id, exam_id)
            .map_err(|source| IngestError::Store {
                row: None,
                committed: 0,
                source,
            })?
            .ok_or_else(|| IngestError::ExamNotFound(exam_id.to_string()))
    }

    fn decode(&self, target: Target, upload: &Upload) -> Result<RawTable, IngestError> {
        let limit = self.config.max_upload_bytes(target);
        if upload.size() > limit {
            return Err(IngestError::TooLarge {
                size: upload.size(),
                limit,
            });
        }
        let kind = upload.kind()?;
        Ok(reader::read_table(kind, &upload.bytes, limit)?)
    }

    /// Ingest a score file for one exam, all rows or none
    pub fn ingest_scores(
        &self,
        principal: &Principal,
        exam_id: &str,
        upload: &Upload,
    ) -> Result<IngestOutcome<Score>, IngestError> {
        let tenant_id = self.tenant(principal)?;
        let exam = self.exam(tenant_id, exam_id)?;
        let table = self.decode(Target::Scores, upload)?;

        let outcome = validate::scores::ingest_scores_table(
            &table,
            &self.score_aliases,
            &exam,
            self.store.as_ref(),
        )?;

        if let IngestOutcome::Committed { records } = &outcome {
            info!(
                action = "scores.created.bulk",
                tenant_id,
                user_id = %principal.user_id,
                role = principal.role.as_str(),
                exam_id,
                count = records.len(),
                "audit"
            );
        }
        Ok(outcome)
    }

    /// Ingest a student roll file, committing each valid row on its own
    pub fn ingest_students(
        &self,
        principal: &Principal,
        upload: &Upload,
        cancel: CancelFlag,
    ) -> Result<IngestOutcome<Student>, IngestError> {
        let tenant_id = self.tenant(principal)?;
        let table = self.decode(Target::Students, upload)?;

        let settings = StudentIngest::new(tenant_id)
            .with_aliases(self.student_aliases.clone())
            .with_current_year(self.current_year.unwrap_or_else(|| Utc::now().year()))
            .with_phone_country_code(self.config.students.phone_country_code.clone())
            .with_cancel(cancel);

        let outcome =
            validate::students::ingest_students_table(&table, &settings, self.store.as_ref())?;

        info!(
            action = "students.bulk_upload",
            tenant_id,
            user_id = %principal.user_id,
            role = principal.role.as_str(),
            inserted = outcome.inserted(),
            failed = outcome.failed(),
            "audit"
        );
        Ok(outcome)
    }

    /// Record scores entered by hand for one exam, all or none
    pub fn record_manual_scores(
        &self,
        principal: &Principal,
        exam_id: &str,
        entries: &[ManualScore],
    ) -> Result<IngestOutcome<Score>, IngestError> {
        let tenant_id = self.tenant(principal)?;
        let exam = self.exam(tenant_id, exam_id)?;

        let outcome =
            validate::scores::ingest_manual_scores(entries, &exam, self.store.as_ref())?;

        if let IngestOutcome::Committed { records } = &outcome {
            info!(
                action = "scores.created.manual",
                tenant_id,
                user_id = %principal.user_id,
                role = principal.role.as_str(),
                exam_id,
                count = records.len(),
                "audit"
            );
        }
        Ok(outcome)
    }
}
