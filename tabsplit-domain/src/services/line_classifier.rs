use crate::model::{Money, Receipt, ReceiptLine};

const DISCOUNT_CATEGORY: &str = "Discount";
const DISCOUNT_NAME_MARKER: &str = "discount";

/// Decides which receipt lines actually carry a shareable cost.
pub struct LineClassifier;

impl LineClassifier {
    /// Billable lines in receipt order.
    ///
    /// A line is excluded iff it is a discount marker (category `Discount` or
    /// a name containing "discount", case-insensitive) or its usable price is
    /// not positive.
    pub fn billable_lines(receipt: &Receipt) -> Vec<&ReceiptLine> {
        receipt
            .lines
            .iter()
            .filter(|line| Self::is_billable(line))
            .collect()
    }

    pub fn is_billable(line: &ReceiptLine) -> bool {
        let discount_marker = line.category.as_deref() == Some(DISCOUNT_CATEGORY)
            || line.name.to_lowercase().contains(DISCOUNT_NAME_MARKER);
        !discount_marker && line.usable_unit_price() > Money::ZERO
    }
}
