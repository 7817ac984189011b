use rust_decimal::Decimal;

/// Decimal places kept by the `NUMERIC(18, 4)` amount columns.
pub const AMOUNT_SCALE: u32 = 4;

/// Why a value cannot be stored in an amount column unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountIssue {
    TooPrecise,
    OutOfRange,
}

/// Largest magnitude an amount column holds: fourteen integer digits.
pub fn amount_limit() -> Decimal {
    Decimal::new(99_999_999_999_999_9999, AMOUNT_SCALE)
}

/// Accepts a value only if the store keeps it exactly. Trailing zeros beyond
/// the fourth place are not precision.
pub fn check_amount(value: Decimal) -> Result<Decimal, AmountIssue> {
    if value.normalize().scale() > AMOUNT_SCALE {
        return Err(AmountIssue::TooPrecise);
    }
    if value.abs() > amount_limit() {
        return Err(AmountIssue::OutOfRange);
    }
    Ok(value)
}
