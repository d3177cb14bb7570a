#![warn(clippy::uninlined_format_args)]

pub mod model;
pub mod services;

pub use model::{
    AllocationOutcome, BreakdownEntry, Money, ParticipantCost, Receipt, ReceiptLine,
    DISCOUNT_LINE_ID, DISCOUNT_LINE_NAME,
};
pub use services::{CostAllocator, LineClassifier};
