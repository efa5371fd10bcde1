//! Sales report rows and the calendar arithmetic behind the report windows.
//!
//! All windows are computed in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopProduct {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlySales {
    /// `HH:00`
    pub hour: String,
    pub total: Decimal,
    pub orders: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySales {
    /// `YYYY-MM-DD`
    pub date: String,
    pub total: Decimal,
    pub orders: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSales {
    pub product_id: i64,
    pub product_name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCustomer {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub order_count: i64,
    pub total_quantity: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// Unknown values fall back to `Week`.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("day") => Period::Day,
            Some("month") => Period::Month,
            _ => Period::Week,
        }
    }

    /// Start of the period containing `now`: midnight today, Monday of this
    /// week, or the first of this month.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let day = match self {
            Period::Day => today,
            Period::Week => today - Duration::days(today.weekday().num_days_from_monday() as i64),
            Period::Month => today.with_day(1).unwrap_or(today),
        };
        midnight(day)
    }
}

pub fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Parse a `YYYY-MM-DD` query value.
pub fn parse_date(value: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidInput(format!("invalid date format: {}", value)))
}

/// Half-open `[start, end)` window from optional inclusive day bounds.
pub fn day_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (
        start.map(midnight),
        end.map(|d| midnight(d) + Duration::days(1)),
    )
}

pub fn hour_label(hour: u32) -> String {
    format!("{:02}:00", hour)
}

/// Expand sparse hourly rows to all 24 hours, zero-filling the gaps.
pub fn fill_hours(rows: Vec<HourlySales>) -> Vec<HourlySales> {
    (0..24)
        .map(|h| {
            let label = hour_label(h);
            rows.iter()
                .find(|r| r.hour == label)
                .cloned()
                .unwrap_or(HourlySales {
                    hour: label,
                    total: Decimal::ZERO,
                    orders: 0,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_week_starts_on_monday() {
        // 2024-05-16 is a Thursday
        let start = Period::Week.start(at(2024, 5, 16, 15));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap());

        // Sunday belongs to the week that started the previous Monday
        let start = Period::Week.start(at(2024, 5, 19, 8));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_and_month_start() {
        let now = at(2024, 5, 16, 15);
        assert_eq!(Period::Day.start(now), Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap());
        assert_eq!(Period::Month.start(now), Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_period_is_week() {
        assert_eq!(Period::parse(Some("year")), Period::Week);
        assert_eq!(Period::parse(None), Period::Week);
    }

    #[test]
    fn test_fill_hours_zero_fills() {
        let rows = vec![HourlySales {
            hour: "09:00".to_string(),
            total: Decimal::from(120),
            orders: 2,
        }];
        let full = fill_hours(rows);
        assert_eq!(full.len(), 24);
        assert_eq!(full[0].hour, "00:00");
        assert_eq!(full[9].orders, 2);
        assert_eq!(full[23].hour, "23:00");
        assert_eq!(full[23].total, Decimal::ZERO);
    }

    #[test]
    fn test_day_window_includes_end_day() {
        let (start, end) = day_window(
            Some(parse_date("2024-01-01").unwrap()),
            Some(parse_date("2024-01-31").unwrap()),
        );
        assert_eq!(start, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(end, Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(matches!(parse_date("16/05/2024"), Err(CoreError::InvalidInput(_))));
    }
}
