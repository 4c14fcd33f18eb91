use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use super::models::BillingFrequency;

/// Currency scale applied to every generated charge.
pub const AMOUNT_SCALE: u32 = 2;

impl BillingFrequency {
    /// Length of one billing period. `one_time` is treated as a yearly period.
    pub fn period_months(&self) -> u32 {
        match self {
            BillingFrequency::Monthly => 1,
            BillingFrequency::Quarterly => 3,
            BillingFrequency::Semiannual => 6,
            BillingFrequency::Annual | BillingFrequency::OneTime => 12,
        }
    }

    pub fn periods_per_year(&self) -> u32 {
        match self {
            BillingFrequency::Monthly => 12,
            BillingFrequency::Quarterly => 4,
            BillingFrequency::Semiannual => 2,
            BillingFrequency::Annual | BillingFrequency::OneTime => 1,
        }
    }
}

/// Adds calendar months, clamping to the last day of shorter months
/// (Jan 31 + 1 month is Feb 28/29).
pub fn add_months(from: NaiveDate, months: u32) -> NaiveDate {
    from.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// key: billing-calendar -> next billing date
pub fn next_billing_date(from: NaiveDate, frequency: BillingFrequency) -> NaiveDate {
    add_months(from, frequency.period_months())
}

/// key: billing-calendar -> per-period charge
pub fn period_amount(base_price: Decimal, frequency: BillingFrequency) -> Decimal {
    match frequency {
        BillingFrequency::OneTime => base_price,
        other => (base_price / Decimal::from(other.periods_per_year())).round_dp(AMOUNT_SCALE),
    }
}

pub fn format_period(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} - {}", start.format("%b %Y"), end.format("%b %Y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn next_date_is_strictly_later_for_every_frequency() {
        let starts = [
            date(2025, 1, 1),
            date(2025, 1, 31),
            date(2024, 2, 29),
            date(2025, 8, 31),
            date(2025, 12, 31),
        ];
        for frequency in BillingFrequency::ALL {
            for start in starts {
                assert!(
                    next_billing_date(start, frequency) > start,
                    "{frequency} from {start}"
                );
            }
        }
    }

    #[test]
    fn month_end_clamps_instead_of_overflowing() {
        assert_eq!(
            next_billing_date(date(2025, 1, 31), BillingFrequency::Monthly),
            date(2025, 2, 28)
        );
        assert_eq!(
            next_billing_date(date(2024, 1, 31), BillingFrequency::Monthly),
            date(2024, 2, 29)
        );
        assert_eq!(
            next_billing_date(date(2025, 8, 31), BillingFrequency::Semiannual),
            date(2026, 2, 28)
        );
        assert_eq!(
            next_billing_date(date(2024, 2, 29), BillingFrequency::Annual),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn repeated_monthly_steps_never_move_backwards() {
        let mut current = date(2025, 1, 31);
        for _ in 0..36 {
            let next = next_billing_date(current, BillingFrequency::Monthly);
            assert!(next > current);
            current = next;
        }
    }

    #[test]
    fn one_time_advances_a_year() {
        assert_eq!(
            next_billing_date(date(2025, 3, 15), BillingFrequency::OneTime),
            date(2026, 3, 15)
        );
    }

    #[test]
    fn period_amounts_partition_the_base_price() {
        let tolerance = Decimal::new(5, 2);
        for base in [
            Decimal::new(1200, 0),
            Decimal::new(1000, 0),
            Decimal::new(99999, 2),
            Decimal::new(550, 0),
        ] {
            for frequency in [
                BillingFrequency::Monthly,
                BillingFrequency::Quarterly,
                BillingFrequency::Semiannual,
                BillingFrequency::Annual,
            ] {
                let total = period_amount(base, frequency)
                    * Decimal::from(frequency.periods_per_year());
                assert!(
                    (total - base).abs() <= tolerance,
                    "{frequency}: {total} vs {base}"
                );
            }
        }
    }

    #[test]
    fn period_amount_examples() {
        assert_eq!(
            period_amount(Decimal::new(120, 0), BillingFrequency::Monthly),
            Decimal::new(10, 0)
        );
        assert_eq!(
            period_amount(Decimal::new(1200, 0), BillingFrequency::Quarterly),
            Decimal::new(300, 0)
        );
        assert_eq!(
            period_amount(Decimal::new(1200, 0), BillingFrequency::OneTime),
            Decimal::new(1200, 0)
        );
        assert_eq!(
            period_amount(Decimal::new(1000, 0), BillingFrequency::Monthly),
            Decimal::new(8333, 2)
        );
    }

    #[test]
    fn period_label_uses_month_and_year() {
        assert_eq!(
            format_period(date(2025, 1, 1), date(2026, 1, 1)),
            "Jan 2025 - Jan 2026"
        );
    }
}
