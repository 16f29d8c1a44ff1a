//! Billing of a time span at a daily rate.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

const SECONDS_PER_DAY: i64 = 86_400;

/// Number of days billed for `[start, end)`.
///
/// Any started day is billed in full, down to the nanosecond. Callers
/// guarantee `end > start`.
pub fn billable_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let span = end - start;
    let seconds = span.num_seconds() + i64::from(span.subsec_nanos() > 0);
    (seconds + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY)
}

/// Cost of `[start, end)` at `daily_rate`, rounded to the currency minor unit.
pub fn rental_cost(start: DateTime<Utc>, end: DateTime<Utc>, daily_rate: Decimal) -> Decimal {
    (Decimal::from(billable_days(start, end)) * daily_rate).round_dp(2)
}

/// Whether `[start, end)` is longer than `max_days`.
pub fn span_exceeds(start: DateTime<Utc>, end: DateTime<Utc>, max_days: u32) -> bool {
    end - start > Duration::days(i64::from(max_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const MICROS_PER_DAY: i64 = SECONDS_PER_DAY * 1_000_000;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_whole_days_are_not_rounded_up() {
        let start = day0();
        assert_eq!(billable_days(start, start + Duration::hours(48)), 2);
        assert_eq!(rental_cost(start, start + Duration::hours(48), dec!(40)), dec!(80));
    }

    #[test]
    fn test_partial_day_is_billed_in_full() {
        let start = day0();
        assert_eq!(rental_cost(start, start + Duration::hours(25), dec!(50)), dec!(100));
        assert_eq!(
            billable_days(start, start + Duration::days(1) + Duration::seconds(1)),
            2
        );
        assert_eq!(billable_days(start, start + Duration::minutes(5)), 1);
    }

    #[test]
    fn test_sub_millisecond_overage_starts_a_new_day() {
        let start = day0();
        let end = start + Duration::days(1) + Duration::microseconds(500);
        assert_eq!(billable_days(start, end), 2);
        assert_eq!(rental_cost(start, end, dec!(40)), dec!(80));
        assert_eq!(billable_days(start, start + Duration::nanoseconds(1)), 1);
    }

    #[test]
    fn test_decimal_rates_stay_exact() {
        let start = day0();
        assert_eq!(
            rental_cost(start, start + Duration::days(3), dec!(19.99)),
            dec!(59.97)
        );
    }

    #[test]
    fn test_span_policy() {
        let start = day0();
        assert!(!span_exceeds(start, start + Duration::days(90), 90));
        assert!(span_exceeds(start, start + Duration::days(90) + Duration::seconds(1), 90));
    }

    proptest! {
        #[test]
        fn cost_is_ceiling_of_days_times_rate(
            micros in 1i64..(400 * MICROS_PER_DAY),
            rate_cents in 0i64..100_000,
        ) {
            let start = day0();
            let end = start + Duration::microseconds(micros);
            let rate = Decimal::new(rate_cents, 2);

            let days = billable_days(start, end);
            prop_assert!(days >= 1);
            prop_assert!(days * MICROS_PER_DAY >= micros);
            prop_assert!((days - 1) * MICROS_PER_DAY < micros);
            prop_assert_eq!(rental_cost(start, end, rate), Decimal::from(days) * rate);
        }
    }
}
