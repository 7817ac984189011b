use rust_decimal::{Decimal, RoundingStrategy};
use tally_core::{AmountIssue, InvoiceItem, check_amount};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("quantity must be positive")]
    NonPositiveQuantity,
    #[error("unit price must be non-negative")]
    NegativeUnitPrice,
    #[error("tax rate must be between 0 and 100")]
    TaxRateOutOfRange,
    #[error("discount percentage must be between 0 and 100")]
    DiscountOutOfRange,
    #[error("discount amount must be between 0 and the line amount")]
    DiscountExceedsLine,
    #[error("amounts allow at most 4 decimal places")]
    ExcessPrecision,
    #[error("amount is outside the supported range")]
    AmountOutOfRange,
}

impl From<AmountIssue> for InvoiceError {
    fn from(issue: AmountIssue) -> Self {
        match issue {
            AmountIssue::TooPrecise => Self::ExcessPrecision,
            AmountIssue::OutOfRange => Self::AmountOutOfRange,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemInput {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAmounts {
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl From<&InvoiceItem> for ItemAmounts {
    fn from(item: &InvoiceItem) -> Self {
        Self {
            gross: money(item.quantity * item.unit_price),
            discount_amount: item.discount_amount.unwrap_or(Decimal::ZERO),
            tax_amount: item.tax_amount.unwrap_or(Decimal::ZERO),
            total_amount: item.total_amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Line arithmetic: discount comes off the gross amount before tax is applied.
/// A discount percentage wins over an explicit discount amount. Inputs and
/// results must fit the stored amount columns.
pub fn compute_item(input: &ItemInput) -> Result<ItemAmounts, InvoiceError> {
    if input.quantity <= Decimal::ZERO {
        return Err(InvoiceError::NonPositiveQuantity);
    }
    if input.unit_price < Decimal::ZERO {
        return Err(InvoiceError::NegativeUnitPrice);
    }
    for value in [
        Some(input.quantity),
        Some(input.unit_price),
        input.tax_rate,
        input.discount_percentage,
        input.discount_amount,
    ]
    .into_iter()
    .flatten()
    {
        check_amount(value)?;
    }

    let hundred = Decimal::ONE_HUNDRED;
    let gross = input
        .quantity
        .checked_mul(input.unit_price)
        .ok_or(InvoiceError::AmountOutOfRange)?;
    let gross = check_amount(money(gross))?;

    let discount_amount = match (input.discount_percentage, input.discount_amount) {
        (Some(pct), _) => {
            if pct < Decimal::ZERO || pct > hundred {
                return Err(InvoiceError::DiscountOutOfRange);
            }
            money(gross * pct / hundred)
        }
        (None, Some(amount)) => {
            if amount < Decimal::ZERO || amount > gross {
                return Err(InvoiceError::DiscountExceedsLine);
            }
            money(amount)
        }
        (None, None) => Decimal::ZERO,
    };

    let tax_rate = input.tax_rate.unwrap_or(Decimal::ZERO);
    if tax_rate < Decimal::ZERO || tax_rate > hundred {
        return Err(InvoiceError::TaxRateOutOfRange);
    }

    let taxable = gross - discount_amount;
    let tax_amount = money(taxable * tax_rate / hundred);

    Ok(ItemAmounts {
        gross,
        discount_amount,
        tax_amount,
        total_amount: check_amount(taxable + tax_amount)?,
    })
}

/// Sums the lines into invoice totals; every total must fit its column.
pub fn summarize_items<I>(items: I) -> Result<InvoiceTotals, InvoiceError>
where
    I: IntoIterator<Item = ItemAmounts>,
{
    let add = |left: Decimal, right: Decimal| {
        left.checked_add(right)
            .ok_or(InvoiceError::AmountOutOfRange)
            .and_then(|sum| check_amount(sum).map_err(InvoiceError::from))
    };

    let mut totals = InvoiceTotals::default();
    for item in items {
        totals.subtotal = add(totals.subtotal, item.gross)?;
        totals.discount_amount = add(totals.discount_amount, item.discount_amount)?;
        totals.tax_amount = add(totals.tax_amount, item.tax_amount)?;
    }
    totals.total_amount = add(totals.subtotal - totals.discount_amount, totals.tax_amount)?;
    Ok(totals)
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn vat_is_applied_after_discount() {
        let amounts = compute_item(&ItemInput {
            quantity: dec("3"),
            unit_price: dec("200"),
            tax_rate: Some(dec("5")),
            discount_percentage: Some(dec("10")),
            discount_amount: None,
        })
        .unwrap();

        assert_eq!(amounts.gross, dec("600"));
        assert_eq!(amounts.discount_amount, dec("60"));
        assert_eq!(amounts.tax_amount, dec("27"));
        assert_eq!(amounts.total_amount, dec("567"));
    }

    #[test]
    fn amounts_round_half_away_from_zero() {
        let amounts = compute_item(&ItemInput {
            quantity: dec("1"),
            unit_price: dec("0.10"),
            tax_rate: Some(dec("5")),
            ..ItemInput::default()
        })
        .unwrap();

        // 0.005 rounds up to 0.01
        assert_eq!(amounts.tax_amount, dec("0.01"));
        assert_eq!(amounts.total_amount, dec("0.11"));
    }

    #[test]
    fn invalid_lines_are_rejected() {
        let base = ItemInput {
            quantity: dec("1"),
            unit_price: dec("10"),
            ..ItemInput::default()
        };

        assert_eq!(
            compute_item(&ItemInput { quantity: Decimal::ZERO, ..base }),
            Err(InvoiceError::NonPositiveQuantity)
        );
        assert_eq!(
            compute_item(&ItemInput { discount_percentage: Some(dec("101")), ..base }),
            Err(InvoiceError::DiscountOutOfRange)
        );
        assert_eq!(
            compute_item(&ItemInput { discount_amount: Some(dec("11")), ..base }),
            Err(InvoiceError::DiscountExceedsLine)
        );
        assert_eq!(
            compute_item(&ItemInput { tax_rate: Some(dec("-1")), ..base }),
            Err(InvoiceError::TaxRateOutOfRange)
        );
    }

    #[test]
    fn unstorable_lines_are_rejected_without_panicking() {
        let base = ItemInput {
            quantity: dec("1"),
            unit_price: dec("10"),
            ..ItemInput::default()
        };

        assert_eq!(
            compute_item(&ItemInput { quantity: Decimal::MAX, unit_price: dec("2"), ..base }),
            Err(InvoiceError::AmountOutOfRange)
        );
        assert_eq!(
            compute_item(&ItemInput {
                quantity: dec("10000000"),
                unit_price: dec("10000000"),
                ..base
            }),
            Err(InvoiceError::AmountOutOfRange)
        );
        assert_eq!(
            compute_item(&ItemInput { unit_price: dec("10.00001"), ..base }),
            Err(InvoiceError::ExcessPrecision)
        );
        assert_eq!(
            compute_item(&ItemInput { quantity: dec("0.12345"), ..base }),
            Err(InvoiceError::ExcessPrecision)
        );
    }

    #[test]
    fn totals_beyond_the_column_range_are_rejected() {
        let big = compute_item(&ItemInput {
            quantity: dec("1"),
            unit_price: dec("60000000000000"),
            ..ItemInput::default()
        })
        .unwrap();

        assert_eq!(
            summarize_items([big, big]),
            Err(InvoiceError::AmountOutOfRange)
        );
    }

    #[test]
    fn totals_sum_every_line() {
        let lines = [
            ItemInput {
                quantity: dec("2"),
                unit_price: dec("50"),
                tax_rate: Some(dec("5")),
                ..ItemInput::default()
            },
            ItemInput {
                quantity: dec("1"),
                unit_price: dec("400"),
                discount_amount: Some(dec("40")),
                ..ItemInput::default()
            },
        ];
        let amounts: Vec<_> = lines.iter().map(|line| compute_item(line).unwrap()).collect();

        let totals = summarize_items(amounts.iter().copied()).unwrap();

        assert_eq!(totals.subtotal, dec("500"));
        assert_eq!(totals.discount_amount, dec("40"));
        assert_eq!(totals.tax_amount, dec("5"));
        assert_eq!(totals.total_amount, dec("465"));
        assert_eq!(
            totals.total_amount,
            amounts.iter().map(|amount| amount.total_amount).sum::<Decimal>()
        );
    }
}
