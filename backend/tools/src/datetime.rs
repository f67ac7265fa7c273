//! Current date and time in US Pacific time.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use serde_json::{json, Value};
use sonicdesk_core::{Tool, ToolOutput};

const PST_OFFSET_SECS: i32 = -8 * 3600;
const PDT_OFFSET_SECS: i32 = -7 * 3600;

/// Whether US daylight saving time is in effect at `utc`.
///
/// DST runs from 02:00 local on the second Sunday of March to 02:00 local on
/// the first Sunday of November.
pub fn pacific_dst_active(utc: DateTime<Utc>) -> bool {
    let year = utc.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(10, 0, 0));
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0));
    match (start, end) {
        (Some(start), Some(end)) => {
            let naive = utc.naive_utc();
            naive >= start && naive < end
        }
        _ => false,
    }
}

/// Convert a UTC instant to Pacific local time.
pub fn to_pacific(utc: DateTime<Utc>) -> (DateTime<FixedOffset>, &'static str) {
    let (secs, label) = if pacific_dst_active(utc) {
        (PDT_OFFSET_SECS, "PDT")
    } else {
        (PST_OFFSET_SECS, "PST")
    };
    let local = match FixedOffset::east_opt(secs) {
        Some(offset) => utc.with_timezone(&offset),
        None => utc.fixed_offset(),
    };
    (local, label)
}

pub struct DateAndTimeTool;

impl DateAndTimeTool {
    fn output_at(&self, utc: DateTime<Utc>) -> ToolOutput {
        let (local, zone) = to_pacific(utc);

        let model_result = json!({
            "formattedTime": local.format("%I:%M %p").to_string(),
            "date": local.format("%Y-%m-%d").to_string(),
            "year": local.year(),
            "month": local.month(),
            "day": local.day(),
            "dayOfWeek": local.format("%A").to_string().to_uppercase(),
            "timezone": zone,
        });

        let ui_result = json!({
            "type": "card",
            "content": {
                "title": "Current Date & Time",
                "description": "Current time in Pacific Time Zone",
                "details": {
                    "Date": local.format("%A, %B %d, %Y").to_string(),
                    "Time": local.format("%I:%M %p").to_string(),
                    "Time Zone": "Pacific Time (PST/PDT)",
                    "Day of Week": local.format("%A").to_string(),
                    "Month": local.format("%B").to_string(),
                    "Year": local.year().to_string(),
                },
                "imageAlt": "Sundial representing time",
                "footer": {
                    "text": format!("Last updated: {}", local.format("%I:%M:%S %p")),
                    "action": { "text": "Refresh", "url": "#" }
                }
            }
        });

        ToolOutput::new(model_result, ui_result)
    }
}

#[async_trait]
impl Tool for DateAndTimeTool {
    fn name(&self) -> &str {
        "getDateAndTimeTool"
    }

    fn description(&self) -> &str {
        "Get information about the current date and time"
    }

    fn short_description(&self) -> &str {
        "Getting date and time information"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _content: Value) -> anyhow::Result<ToolOutput> {
        Ok(self.output_at(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn dst_boundaries_2025() {
        // 2025-03-09 02:00 PST == 10:00 UTC
        assert!(!pacific_dst_active(utc(2025, 3, 9, 9, 59)));
        assert!(pacific_dst_active(utc(2025, 3, 9, 10, 0)));
        // 2025-11-02 02:00 PDT == 09:00 UTC
        assert!(pacific_dst_active(utc(2025, 11, 2, 8, 59)));
        assert!(!pacific_dst_active(utc(2025, 11, 2, 9, 0)));
        assert!(!pacific_dst_active(utc(2025, 1, 15, 12, 0)));
        assert!(pacific_dst_active(utc(2025, 7, 4, 12, 0)));
    }

    #[test]
    fn winter_and_summer_offsets() {
        let (winter, zone) = to_pacific(utc(2025, 1, 15, 20, 30));
        assert_eq!(zone, "PST");
        assert_eq!(winter.format("%H:%M").to_string(), "12:30");

        let (summer, zone) = to_pacific(utc(2025, 7, 1, 3, 0));
        assert_eq!(zone, "PDT");
        assert_eq!(summer.format("%Y-%m-%d %H:%M").to_string(), "2025-06-30 20:00");
    }

    #[test]
    fn model_and_ui_results() {
        let out = DateAndTimeTool.output_at(utc(2025, 1, 15, 20, 30));
        assert_eq!(out.model_result["date"], "2025-01-15");
        assert_eq!(out.model_result["formattedTime"], "12:30 PM");
        assert_eq!(out.model_result["dayOfWeek"], "WEDNESDAY");
        assert_eq!(out.model_result["timezone"], "PST");
        let ui = out.ui_result.unwrap();
        assert_eq!(ui["type"], "card");
        assert_eq!(ui["content"]["details"]["Year"], "2025");
    }

    #[tokio::test]
    async fn execute_returns_card() {
        let out = DateAndTimeTool.execute(json!({})).await.unwrap();
        assert!(!out.is_error());
        assert!(out.ui_result.is_some());
    }
}
