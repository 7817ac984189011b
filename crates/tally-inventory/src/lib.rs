use std::cmp::Ordering;
use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::{AmountIssue, ProductType, check_amount};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StockError {
    #[error("adjustment quantity must not be zero")]
    ZeroAdjustment,
    #[error("quantity must be non-negative")]
    NegativeQuantity,
    #[error("insufficient stock: {on_hand} on hand, {requested} requested")]
    Insufficient { on_hand: Decimal, requested: Decimal },
    #[error("no stock recorded for this product in this warehouse")]
    NothingToRemove,
    #[error("quantities allow at most 4 decimal places")]
    ExcessPrecision,
    #[error("quantity is outside the supported range")]
    OutOfRange,
}

impl From<AmountIssue> for StockError {
    fn from(issue: AmountIssue) -> Self {
        match issue {
            AmountIssue::TooPrecise => Self::ExcessPrecision,
            AmountIssue::OutOfRange => Self::OutOfRange,
        }
    }
}

/// What an adjustment does to the `(product, warehouse)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    Create { quantity_on_hand: Decimal },
    Update { quantity_on_hand: Decimal },
}

impl StockChange {
    pub fn quantity_on_hand(self) -> Decimal {
        match self {
            Self::Create { quantity_on_hand } | Self::Update { quantity_on_hand } => {
                quantity_on_hand
            }
        }
    }
}

/// Applies `delta` to the current on-hand quantity, if a row exists.
///
/// Stock never goes below zero. A missing row can only be created by a
/// positive delta.
pub fn adjust(current: Option<Decimal>, delta: Decimal) -> Result<StockChange, StockError> {
    if delta.is_zero() {
        return Err(StockError::ZeroAdjustment);
    }
    check_amount(delta)?;

    match current {
        None if delta > Decimal::ZERO => Ok(StockChange::Create {
            quantity_on_hand: delta,
        }),
        None => Err(StockError::NothingToRemove),
        Some(on_hand) => {
            let next = check_amount(on_hand + delta)?;
            if next < Decimal::ZERO {
                return Err(StockError::Insufficient {
                    on_hand,
                    requested: -delta,
                });
            }
            Ok(StockChange::Update {
                quantity_on_hand: next,
            })
        }
    }
}

pub fn validate_quantity(quantity: Decimal) -> Result<Decimal, StockError> {
    if quantity < Decimal::ZERO {
        return Err(StockError::NegativeQuantity);
    }
    Ok(check_amount(quantity)?)
}

pub fn is_low_stock(quantity_on_hand: Decimal, reorder_level: Option<Decimal>) -> bool {
    reorder_level.is_some_and(|level| quantity_on_hand <= level)
}

/// On-hand quantity as a fraction of the reorder level. `None` without a
/// positive reorder level.
pub fn stock_ratio(quantity_on_hand: Decimal, reorder_level: Option<Decimal>) -> Option<Decimal> {
    reorder_level
        .filter(|level| *level > Decimal::ZERO)
        .map(|level| quantity_on_hand / level)
}

/// Most urgent first; rows without a ratio sort last.
pub fn compare_urgency(left: Option<Decimal>, right: Option<Decimal>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValuationLine {
    pub product_id: i64,
    pub product_type: ProductType,
    pub purchase_price: Option<Decimal>,
    pub quantity_on_hand: Decimal,
    pub reorder_level: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_value: Decimal,
    pub total_products: usize,
    pub total_quantity: Decimal,
    pub low_stock_count: usize,
}

/// Value, product count and quantity cover `inventory` products only; the
/// low-stock count covers every row.
pub fn summarize<I>(lines: I) -> InventorySummary
where
    I: IntoIterator<Item = ValuationLine>,
{
    let mut summary = InventorySummary::default();
    let mut products = HashSet::new();

    for line in lines {
        if is_low_stock(line.quantity_on_hand, line.reorder_level) {
            summary.low_stock_count += 1;
        }
        if line.product_type != ProductType::Inventory {
            continue;
        }
        products.insert(line.product_id);
        summary.total_quantity += line.quantity_on_hand;
        summary.total_value += line.purchase_price.unwrap_or(Decimal::ZERO) * line.quantity_on_hand;
    }

    summary.total_products = products.len();
    summary
}
