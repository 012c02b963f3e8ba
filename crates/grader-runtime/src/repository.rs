//! Boundaries to the surrounding system: document text extraction and
//! rubric/evaluation persistence.
//!
//! Both are synchronous; the service treats repository calls as
//! transactional. Reference implementations are provided for the CLI and
//! tests.

use grader_core::{Evaluation, EvaluationId, Rubric, RubricId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures turning an uploaded document into text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("document contains no text")]
    Empty,

    #[error("document is not readable text")]
    NotText,
}

/// Turns document bytes (typically a PDF) into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, document: &[u8]) -> Result<String, ExtractionError>;
}

/// Extractor for documents that already are UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, document: &[u8]) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(document).map_err(|_| ExtractionError::NotText)?;
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(text.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("rubric {0} not found")]
    RubricNotFound(RubricId),

    #[error("evaluation {0} not found")]
    EvaluationNotFound(EvaluationId),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Persistence for rubrics and evaluations.
pub trait RubricRepository: Send + Sync {
    fn persist_rubric(&self, rubric: &Rubric) -> Result<RubricId, RepositoryError>;

    fn load_rubric(&self, id: RubricId) -> Result<Rubric, RepositoryError>;

    /// Replace a stored rubric. Evaluations already scored against it keep their own copies.
    fn update_rubric(&self, id: RubricId, rubric: &Rubric) -> Result<(), RepositoryError>;

    fn persist_evaluation(&self, evaluation: &Evaluation) -> Result<EvaluationId, RepositoryError>;

    fn load_evaluation(&self, id: EvaluationId) -> Result<Evaluation, RepositoryError>;

    fn update_evaluation(&self, id: EvaluationId, evaluation: &Evaluation) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
struct Store {
    rubrics: BTreeMap<RubricId, Rubric>,
    evaluations: BTreeMap<EvaluationId, Evaluation>,
    next_rubric: u64,
    next_evaluation: u64,
}

/// Process-local repository.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rubric_count(&self) -> usize {
        self.store.read().rubrics.len()
    }

    pub fn evaluation_count(&self) -> usize {
        self.store.read().evaluations.len()
    }
}

impl RubricRepository for InMemoryRepository {
    fn persist_rubric(&self, rubric: &Rubric) -> Result<RubricId, RepositoryError> {
        let mut store = self.store.write();
        store.next_rubric += 1;
        let id = RubricId(store.next_rubric);
        store.rubrics.insert(id, rubric.clone());
        Ok(id)
    }

    fn load_rubric(&self, id: RubricId) -> Result<Rubric, RepositoryError> {
        self.store
            .read()
            .rubrics
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::RubricNotFound(id))
    }

    fn update_rubric(&self, id: RubricId, rubric: &Rubric) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        let slot = store
            .rubrics
            .get_mut(&id)
            .ok_or(RepositoryError::RubricNotFound(id))?;
        *slot = rubric.clone();
        Ok(())
    }

    fn persist_evaluation(&self, evaluation: &Evaluation) -> Result<EvaluationId, RepositoryError> {
        let mut store = self.store.write();
        store.next_evaluation += 1;
        let id = EvaluationId(store.next_evaluation);
        store.evaluations.insert(id, evaluation.clone());
        Ok(id)
    }

    fn load_evaluation(&self, id: EvaluationId) -> Result<Evaluation, RepositoryError> {
        self.store
            .read()
            .evaluations
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::EvaluationNotFound(id))
    }

    fn update_evaluation(&self, id: EvaluationId, evaluation: &Evaluation) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        let slot = store
            .evaluations
            .get_mut(&id)
            .ok_or(RepositoryError::EvaluationNotFound(id))?;
        *slot = evaluation.clone();
        Ok(())
    }
}
