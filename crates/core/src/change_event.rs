//! Change events from the experiment-run change subscription
//!
//! Each row-level mutation of the experiment-run table surfaces as one event
//! carrying the storage watermark used for checkpointing. The status carried
//! here may be stale by the time the event is handled; the dispatcher always
//! re-reads the persisted status before acting.

use crate::error::DomainError;
use crate::Result;

/// Row operation kind, decoded from the subscription's numeric `op` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Delete,
    UpdateInsert,
    UpdateDelete,
}

impl ChangeOperation {
    /// RisingWave subscription op codes.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Self::Insert),
            2 => Ok(Self::Delete),
            3 => Ok(Self::UpdateInsert),
            4 => Ok(Self::UpdateDelete),
            other => Err(DomainError::Validation(format!(
                "unknown change operation code: {other}"
            ))),
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert)
    }
}

/// One change event over the experiment-run table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub run_id: String,
    pub operation: ChangeOperation,
    /// Persisted status at mutation time. Informational only; may be stale.
    pub status: String,
    /// Monotonic progress watermark for checkpointing.
    pub watermark: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes() {
        assert_eq!(ChangeOperation::from_code(1).unwrap(), ChangeOperation::Insert);
        assert_eq!(ChangeOperation::from_code(2).unwrap(), ChangeOperation::Delete);
        assert_eq!(
            ChangeOperation::from_code(3).unwrap(),
            ChangeOperation::UpdateInsert
        );
        assert_eq!(
            ChangeOperation::from_code(4).unwrap(),
            ChangeOperation::UpdateDelete
        );
        assert!(ChangeOperation::from_code(0).is_err());
        assert!(ChangeOperation::from_code(5).is_err());
    }

    #[test]
    fn test_only_plain_inserts_count_as_insert() {
        assert!(ChangeOperation::Insert.is_insert());
        assert!(!ChangeOperation::UpdateInsert.is_insert());
        assert!(!ChangeOperation::Delete.is_insert());
    }
}
