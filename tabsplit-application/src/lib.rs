#![warn(clippy::uninlined_format_args)]

pub mod error;
pub mod ledger;
pub mod receipt;
pub mod session;

pub use error::{ReceiptParseError, SplitError};
pub use ledger::AssignmentLedger;
pub use receipt::{RawReceipt, RawReceiptLine};
pub use session::{AgreementTracker, FinalizeCheck, SplitPhase, SplitSession};
