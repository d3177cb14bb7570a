use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
};

use rust_decimal::{Decimal, RoundingStrategy};

/// Synthetic line id used for the proportional discount entry appended to a
/// participant's breakdown.
pub const DISCOUNT_LINE_ID: &str = "discount";
pub const DISCOUNT_LINE_NAME: &str = "Discount";

/// An exact decimal amount of money.
///
/// Allocation math never rounds; [`Money::rounded`] exists for presentation
/// only and must not be applied before discount distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(num: i64, scale: u32) -> Self {
        Self(Decimal::new(num, scale))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Rounds to `scale` decimal places, half away from zero.
    pub fn rounded(self, scale: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Money {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// One parsed line item of a receipt.
///
/// Both price fields are optional because upstream receipt parsers routinely
/// omit one of them; [`ReceiptLine::usable_unit_price`] applies the fallback
/// chain (discounted price, then undiscounted price, then zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLine {
    pub id: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price_with_discount: Option<Money>,
    pub unit_price_without_discount: Option<Money>,
    pub category: Option<String>,
}

impl ReceiptLine {
    pub fn usable_unit_price(&self) -> Money {
        self.unit_price_with_discount
            .or(self.unit_price_without_discount)
            .unwrap_or(Money::ZERO)
    }

    pub fn line_total(&self) -> Money {
        self.usable_unit_price() * self.quantity
    }

    /// Whether the line carries its own markdown (undiscounted price strictly
    /// above the discounted one).
    pub fn has_line_discount(&self) -> bool {
        match (self.unit_price_without_discount, self.unit_price_with_discount) {
            (Some(original), Some(discounted)) => original > discounted,
            _ => false,
        }
    }
}

/// A normalized receipt as handed over by the upstream parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub tip: Money,
    pub total_discount: Money,
    pub total: Money,
    pub currency: String,
}

impl Receipt {
    /// Tolerance for the `total == subtotal + tax + tip - total_discount`
    /// invariant. Receipts come from OCR pipelines, so sub-cent drift is
    /// expected; anything above one cent is surfaced as a gap.
    pub fn reconciliation_tolerance() -> Money {
        Money::new(1, 2)
    }

    pub fn expected_total(&self) -> Money {
        self.subtotal + self.tax + self.tip - self.total_discount
    }

    pub fn reconciliation_gap(&self) -> Money {
        self.total - self.expected_total()
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciliation_gap().abs() <= Self::reconciliation_tolerance()
    }
}

/// One entry of a participant's cost breakdown.
///
/// `line_id` is either a receipt line id or [`DISCOUNT_LINE_ID`] for the
/// trailing proportional discount entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownEntry<'a> {
    pub line_id: &'a str,
    pub name: &'a str,
    pub cost: Money,
}

/// Derived per-participant view of a split. Recomputed on every read; never
/// the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantCost<'a> {
    pub participant: &'a str,
    pub total_cost: Money,
    pub breakdown: Vec<BreakdownEntry<'a>>,
    pub agreed: bool,
}

impl<'a> ParticipantCost<'a> {
    pub fn unassigned(participant: &'a str) -> Self {
        Self {
            participant,
            total_cost: Money::ZERO,
            breakdown: Vec::new(),
            agreed: false,
        }
    }
}

/// Result of one allocation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome<'a> {
    pub per_participant: Vec<ParticipantCost<'a>>,
    /// Billable lines nobody is assigned to. Not fatal, but the caller should
    /// block finalization while this is non-empty.
    pub unassigned_line_ids: Vec<&'a str>,
    /// The part of `total_discount` that could not be apportioned because
    /// nothing was assigned yet.
    pub undistributed_discount: Money,
    /// Sum of all base costs before the discount pass; compare against the
    /// receipt subtotal to detect incomplete assignment.
    pub assigned_total: Money,
}
