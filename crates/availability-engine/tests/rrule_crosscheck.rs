//! Cross-check plain weekly expansion against an RFC 5545 RRULE engine.

use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;
use rrule::RRuleSet;

use availability_engine::calendar::weekday_index;
use availability_engine::{expand, sort_chronologically, AvailabilityTemplate, RecurrenceRule};

const BYDAY: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

fn rrule_dates(anchor: NaiveDate, end: NaiveDate, weekdays: &[u8]) -> Vec<NaiveDate> {
    let byday: Vec<&str> = weekdays.iter().map(|w| BYDAY[*w as usize]).collect();
    let text = format!(
        "DTSTART:{}T000000Z\nRRULE:FREQ=WEEKLY;BYDAY={};UNTIL={}T235959Z",
        anchor.format("%Y%m%d"),
        byday.join(","),
        end.format("%Y%m%d"),
    );
    let set: RRuleSet = text.parse().unwrap();
    set.all(u16::MAX)
        .dates
        .into_iter()
        .map(|dt| dt.date_naive())
        // DTSTART is always emitted by some engines even off-pattern.
        .filter(|d| weekdays.contains(&weekday_index(*d)))
        .collect()
}

fn engine_dates(anchor: NaiveDate, end: NaiveDate, weekdays: &[u8]) -> Vec<NaiveDate> {
    let template = AvailabilityTemplate {
        date: anchor,
        ..AvailabilityTemplate::parse("ff-1", "2025-01-01", "08:00", "18:00", "available").unwrap()
    };
    let rule = RecurrenceRule::weekly(weekdays.iter().copied(), end);
    let mut drafts: Vec<_> = expand(&template, Some(&rule)).unwrap().collect();
    sort_chronologically(&mut drafts);
    drafts.into_iter().map(|d| d.date).collect()
}

#[test]
fn mondays_and_thursdays_match_rrule() {
    let anchor = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
    let end = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
    assert_eq!(engine_dates(anchor, end, &[1, 4]), rrule_dates(anchor, end, &[1, 4]));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn weekly_expansion_matches_rrule(
        year in 2020i32..2030,
        ordinal in 1u32..=365,
        span in 0i64..200,
        weekdays in prop::collection::btree_set(0u8..7, 1..7),
    ) {
        let anchor = NaiveDate::from_yo_opt(year, ordinal).unwrap();
        let end = anchor + chrono::Duration::days(span);
        let weekdays: Vec<u8> = weekdays.into_iter().collect();

        let ours = engine_dates(anchor, end, &weekdays);
        prop_assert!(ours.iter().all(|d| d.year() >= year));
        prop_assert_eq!(ours, rrule_dates(anchor, end, &weekdays));
    }
}
