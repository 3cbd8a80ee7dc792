//! Amount rules shared by deposits, purchases and payouts.
//!
//! Amounts are held in naira as `BigDecimal`; the gateway speaks kobo (1/100 naira).

use bigdecimal::{BigDecimal, ToPrimitive};

/// Smallest deposit accepted through the gateway, in naira.
pub const MIN_DEPOSIT: i64 = 100;
/// Smallest withdrawal a wallet may request, in naira.
pub const MIN_WITHDRAWAL: i64 = 1_000;

/// Transfer fee charged on a payout, by amount tier.
///
/// Up to 5 000 costs 10, up to 50 000 costs 25, anything larger costs 50.
pub fn withdrawal_fee(amount: &BigDecimal) -> BigDecimal {
    if *amount <= BigDecimal::from(5_000) {
        BigDecimal::from(10)
    } else if *amount <= BigDecimal::from(50_000) {
        BigDecimal::from(25)
    } else {
        BigDecimal::from(50)
    }
}

/// Converts a naira amount into kobo, rounding half-up to the nearest kobo.
pub fn to_kobo(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100)).round(0).to_i64()
}

pub fn from_kobo(kobo: i64) -> BigDecimal {
    BigDecimal::from(kobo) / BigDecimal::from(100)
}

pub fn is_positive(amount: &BigDecimal) -> bool {
    *amount > BigDecimal::from(0)
}
