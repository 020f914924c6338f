use chrono::{DateTime, Duration, Utc};

/// Refund tiers on time-to-departure, most restrictive first. Each row
/// is (threshold in minutes, refund percent); the first row whose
/// threshold the remaining time is strictly below wins, so a
/// cancellation at exactly a boundary falls through to the more
/// generous tier.
const REFUND_TIERS: &[(i64, u32)] = &[(2 * 60, 50), (24 * 60, 80)];

const FULL_REFUND_PERCENT: u32 = 100;

pub fn refund_percent(departure_time: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let remaining = departure_time - now;

    for (threshold_minutes, percent) in REFUND_TIERS {
        if remaining < Duration::minutes(*threshold_minutes) {
            return *percent;
        }
    }

    FULL_REFUND_PERCENT
}

/// Refund owed for a cancellation, in minor currency units, rounded
/// half away from zero.
pub fn refund_amount(total_price: i64, percent: u32) -> i64 {
    let numerator = total_price * percent as i64;
    let quotient = numerator / 100;
    let remainder = numerator % 100;

    if remainder.abs() * 2 >= 100 {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_percent_tiers() {
        let now = Utc::now();

        assert_eq!(refund_percent(now + Duration::hours(1), now), 50);
        assert_eq!(refund_percent(now + Duration::hours(10), now), 80);
        assert_eq!(refund_percent(now + Duration::hours(48), now), 100);
    }

    #[test]
    fn refund_percent_boundaries_resolve_to_generous_tier() {
        let now = Utc::now();

        assert_eq!(refund_percent(now + Duration::hours(2), now), 80);
        assert_eq!(refund_percent(now + Duration::hours(24), now), 100);
    }

    #[test]
    fn refund_percent_past_departure() {
        let now = Utc::now();

        assert_eq!(refund_percent(now - Duration::minutes(5), now), 50);
    }

    #[test]
    fn refund_amount_tiers() {
        assert_eq!(refund_amount(1000, 50), 500);
        assert_eq!(refund_amount(1000, 80), 800);
        assert_eq!(refund_amount(1000, 100), 1000);
    }

    #[test]
    fn refund_amount_rounds_half_away_from_zero() {
        assert_eq!(refund_amount(1001, 50), 501);
        assert_eq!(refund_amount(999, 50), 500);
        assert_eq!(refund_amount(1249, 80), 999);
        assert_eq!(refund_amount(5, 50), 3);
    }
}
