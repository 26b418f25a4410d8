//! Largest-remainder apportionment
//!
//! Splits a whole number of cents across weighted shares so the parts sum
//! to the whole exactly. Each share first gets the floor of its exact
//! quota; leftover cents go to the shares with the largest fractional
//! remainders, earlier shares winning ties.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tabsplit_ledger::Cents;

/// Split `total` across `weights`.
///
/// Negative weights count as zero. When every weight is zero, every share
/// is zero. A negative total is split by magnitude and negated.
pub fn apportion(total: Cents, weights: &[Decimal]) -> Vec<Cents> {
    let mut weights: Vec<Decimal> = weights.iter().map(|w| (*w).max(Decimal::ZERO)).collect();
    let weight_sum = match checked_sum(&weights) {
        Some(sum) => sum,
        None => {
            // Scale down until the sum fits
            let count = Decimal::from(weights.len());
            for weight in &mut weights {
                *weight /= count;
            }
            checked_sum(&weights).unwrap_or(Decimal::MAX)
        }
    };

    if weights.is_empty() || weight_sum.is_zero() || total.is_zero() {
        return vec![Cents::ZERO; weights.len()];
    }

    let negative = total.is_negative();
    let magnitude = total.as_i64().unsigned_abs();
    let whole = Decimal::from(magnitude);

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned: u64 = 0;

    for (index, weight) in weights.iter().enumerate() {
        let quota = whole
            .checked_mul(*weight)
            .and_then(|scaled| scaled.checked_div(weight_sum))
            .unwrap_or_else(|| whole * (*weight / weight_sum));
        let floor = quota.floor();
        let share = floor.to_u64().unwrap_or(0);
        assigned = assigned.saturating_add(share);
        shares.push(share);
        remainders.push((quota - floor, index));
    }

    // Largest fraction first, input order on ties
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut leftover = magnitude.saturating_sub(assigned);
    let eligible: Vec<usize> = remainders
        .iter()
        .filter(|(_, index)| !weights[*index].is_zero())
        .map(|(_, index)| *index)
        .collect();

    let mut cursor = 0;
    while leftover > 0 && !eligible.is_empty() {
        shares[eligible[cursor % eligible.len()]] += 1;
        leftover -= 1;
        cursor += 1;
    }

    shares
        .into_iter()
        .map(|share| {
            let cents = i64::try_from(share).unwrap_or(i64::MAX);
            Cents::new(if negative { -cents } else { cents })
        })
        .collect()
}

fn checked_sum(weights: &[Decimal]) -> Option<Decimal> {
    weights
        .iter()
        .try_fold(Decimal::ZERO, |sum, weight| sum.checked_add(*weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn sum(parts: &[Cents]) -> i64 {
        parts.iter().map(|c| c.as_i64()).sum()
    }

    #[test]
    fn test_proportional_split() {
        let parts = apportion(Cents::new(150), &[d(2000), d(500)]);
        assert_eq!(parts, vec![Cents::new(120), Cents::new(30)]);
    }

    #[test]
    fn test_three_way_penny() {
        let parts = apportion(Cents::new(100), &[d(1), d(1), d(1)]);
        assert_eq!(parts, vec![Cents::new(34), Cents::new(33), Cents::new(33)]);
    }

    #[test]
    fn test_largest_remainder_wins() {
        // Quotas 1.5, 3.3, 5.2: floors give 9, the 0.5 remainder takes the cent
        let parts = apportion(Cents::new(10), &[d(15), d(33), d(52)]);
        assert_eq!(parts, vec![Cents::new(2), Cents::new(3), Cents::new(5)]);
    }

    #[test]
    fn test_zero_weights() {
        let parts = apportion(Cents::new(999), &[Decimal::ZERO, Decimal::ZERO]);
        assert_eq!(parts, vec![Cents::ZERO, Cents::ZERO]);
        assert!(apportion(Cents::new(5), &[]).is_empty());
    }

    #[test]
    fn test_zero_weight_share_gets_nothing() {
        let parts = apportion(Cents::new(7), &[d(1), Decimal::ZERO, d(1)]);
        assert_eq!(parts[1], Cents::ZERO);
        assert_eq!(sum(&parts), 7);
    }

    #[test]
    fn test_negative_total() {
        let parts = apportion(Cents::new(-100), &[d(1), d(1), d(1)]);
        assert_eq!(sum(&parts), -100);
        assert_eq!(parts[0], Cents::new(-34));
    }

    #[test]
    fn test_large_total_and_weights() {
        let total = Cents::new(1_000_000_000_000_000);
        let parts = apportion(total, &[d(100_000_000_000_000), d(1)]);
        assert_eq!(sum(&parts), total.as_i64());
        assert!(parts[0] > parts[1]);

        let parts = apportion(Cents::new(i64::MAX), &[d(2000), d(500)]);
        assert_eq!(sum(&parts), i64::MAX);
    }

    #[test]
    fn test_weights_overflowing_their_sum() {
        let parts = apportion(Cents::new(101), &[Decimal::MAX, Decimal::MAX, d(0)]);
        assert_eq!(parts[2], Cents::ZERO);
        assert_eq!(sum(&parts), 101);
        assert_eq!(parts[0], Cents::new(51));
    }

    #[test]
    fn test_fractional_weights_conserve() {
        let weights = [Decimal::new(5, 1), Decimal::new(25, 2), Decimal::new(125, 3)];
        for total in [1, 7, 99, 1234, 100_001] {
            assert_eq!(sum(&apportion(Cents::new(total), &weights)), total);
        }
    }
}
