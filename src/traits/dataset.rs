use crate::dataset::SubjectData;
use crate::errors::DatasetError;

/// Source of per-subject capability sets.
pub trait DatasetReader: Send + Sync {
    /// Subject labels without the `sub-` prefix, sorted.
    fn subjects(&self) -> Result<Vec<String>, DatasetError>;

    fn subject(&self, subject_id: &str) -> Result<SubjectData, DatasetError>;
}
