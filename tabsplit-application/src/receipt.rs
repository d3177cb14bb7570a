use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use tabsplit_domain::{LineClassifier, Money, Receipt, ReceiptLine};

use crate::error::ReceiptParseError;

/// Loosely-typed receipt payload as produced by the upstream parsing service.
///
/// Every numeric field arrives as a string; empty strings count as absent,
/// matching the upstream payloads where optional prices come through as `""`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReceipt {
    #[serde(default)]
    pub items: Vec<RawReceiptLine>,
    #[serde(default)]
    pub subtotal: Option<String>,
    #[serde(default)]
    pub tax: Option<String>,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub total_discount: Option<String>,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReceiptLine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub price_with_discount: Option<String>,
    #[serde(default)]
    pub price_without_discount: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

const DEFAULT_CURRENCY: &str = "USD";

impl RawReceipt {
    /// Validates the payload into the strict domain [`Receipt`].
    ///
    /// A present but malformed numeric field is an error, never a silent
    /// zero; absent price fields feed the usable-price fallback chain, absent
    /// receipt totals default to zero, and an absent grand total falls back
    /// to the reconciled sum. A reconciliation gap beyond tolerance is logged
    /// but does not fail the parse.
    pub fn parse(&self) -> Result<Receipt, ReceiptParseError> {
        let lines = self
            .items
            .iter()
            .map(RawReceiptLine::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let subtotal = receipt_amount("subtotal", self.subtotal.as_deref())?.unwrap_or(Money::ZERO);
        let tax = receipt_amount("tax", self.tax.as_deref())?.unwrap_or(Money::ZERO);
        let tip = receipt_amount("tip", self.tip.as_deref())?.unwrap_or(Money::ZERO);
        let total_discount =
            receipt_amount("total_discount", self.total_discount.as_deref())?.unwrap_or(Money::ZERO);
        let total = receipt_amount("total", self.total.as_deref())?
            .unwrap_or(subtotal + tax + tip - total_discount);

        let receipt = Receipt {
            lines,
            subtotal,
            tax,
            tip,
            total_discount,
            total,
            currency: self
                .currency
                .clone()
                .filter(|currency| !currency.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
        };

        if !receipt.is_reconciled() {
            tracing::warn!(
                total = %receipt.total,
                expected_total = %receipt.expected_total(),
                gap = %receipt.reconciliation_gap(),
                "parsed receipt totals do not reconcile"
            );
        }

        Ok(receipt)
    }
}

impl RawReceiptLine {
    pub fn parse(&self) -> Result<ReceiptLine, ReceiptParseError> {
        let quantity = line_amount(&self.id, "quantity", self.quantity.as_deref())?
            .unwrap_or(Decimal::ONE);
        let unit_price_with_discount =
            line_amount(&self.id, "price_with_discount", self.price_with_discount.as_deref())?
                .map(Money::from_decimal);
        let unit_price_without_discount = line_amount(
            &self.id,
            "price_without_discount",
            self.price_without_discount.as_deref(),
        )?
        .map(Money::from_decimal);

        let line = ReceiptLine {
            id: self.id.clone(),
            name: self.name.clone(),
            quantity,
            unit_price_with_discount,
            unit_price_without_discount,
            category: self.category.clone(),
        };

        if LineClassifier::is_billable(&line) && line.quantity <= Decimal::ZERO {
            return Err(ReceiptParseError::NonPositiveQuantity {
                line_id: line.id,
                value: quantity,
            });
        }

        Ok(line)
    }
}

/// Normalizes a textual amount: trims, strips well-formed thousands
/// separators, then parses exactly. `None` or an empty string means the
/// field is absent.
fn normalize_amount(raw: Option<&str>) -> Result<Option<Decimal>, ()> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let cleaned = strip_thousands_separators(trimmed).ok_or(())?;
    Decimal::from_str(&cleaned).map(Some).map_err(|_| ())
}

/// Removes `,` separators, accepting them only between three-digit groups
/// in the integer part (`1,234,567.89`). Misplaced separators like `1,2`
/// are invalid rather than silently collapsed.
fn strip_thousands_separators(raw: &str) -> Option<String> {
    if !raw.contains(',') {
        return Some(raw.to_owned());
    }
    let (mantissa, fraction) = match raw.split_once('.') {
        Some((mantissa, fraction)) => (mantissa, Some(fraction)),
        None => (raw, None),
    };
    if fraction.is_some_and(|fraction| fraction.contains(',')) {
        return None;
    }

    let unsigned = mantissa
        .strip_prefix('-')
        .or_else(|| mantissa.strip_prefix('+'))
        .unwrap_or(mantissa);
    let mut groups = unsigned.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 || !first.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    Some(raw.replace(',', ""))
}

fn line_amount(
    line_id: &str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Decimal>, ReceiptParseError> {
    normalize_amount(raw).map_err(|()| ReceiptParseError::InvalidNumericField {
        line_id: line_id.to_owned(),
        field,
        value: raw.unwrap_or_default().to_owned(),
    })
}

fn receipt_amount(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Money>, ReceiptParseError> {
    normalize_amount(raw)
        .map(|amount| amount.map(Money::from_decimal))
        .map_err(|()| ReceiptParseError::InvalidReceiptField {
            field,
            value: raw.unwrap_or_default().to_owned(),
        })
}
