use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised while validating a loosely-typed receipt payload into the
/// strict domain model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptParseError {
    #[error("line `{line_id}`: field `{field}` has invalid numeric value `{value}`")]
    InvalidNumericField {
        line_id: String,
        field: &'static str,
        value: String,
    },
    #[error("receipt field `{field}` has invalid numeric value `{value}`")]
    InvalidReceiptField { field: &'static str, value: String },
    #[error("line `{line_id}`: quantity must be positive, got {value}")]
    NonPositiveQuantity { line_id: String, value: Decimal },
}

/// Failures raised by split session mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("participants still pending agreement: {}", pending.join(", "))]
    NotAllAgreed { pending: Vec<String> },
    #[error("split is locked and no longer accepts changes")]
    SplitLocked,
    #[error("every billable line needs at least one assignee before agreement can start")]
    CoverageIncomplete,
    #[error("agreement has not been opened for this split")]
    AgreementNotOpen,
    #[error("unknown participant `{participant}`")]
    UnknownParticipant { participant: String },
}
