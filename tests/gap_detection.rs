mod common;

use chart_viewport_wasm::domain::chart::{GapDetector, GapKind, GapPriority, Viewport};
use chart_viewport_wasm::domain::market_data::{TimeInterval, TimeSeries, Timestamp};
use common::{bar, minute_series};

const TEN: i64 = 10 * 3600;
const ELEVEN: i64 = 11 * 3600;

fn viewport(start: i64, end: i64) -> Viewport {
    Viewport::new(Timestamp::new(start), Timestamp::new(end))
}

#[test]
fn edge_gaps_are_padded_outward() {
    // one bar per minute from 10:00 to 11:00 inclusive
    let series = minute_series(TEN, 61, 60);
    let gaps = GapDetector::default()
        .detect(&viewport(9 * 3600, 11 * 3600 + 1800), &series, TimeInterval::OneMinute)
        .unwrap();

    assert_eq!(gaps.len(), 2);
    assert_eq!(gaps[0].kind, GapKind::Before);
    assert_eq!(gaps[0].end.value(), TEN);
    assert_eq!(gaps[0].start.value(), 9 * 3600 - 1800);
    assert_eq!(gaps[1].kind, GapKind::After);
    assert_eq!(gaps[1].start.value(), ELEVEN);
    assert_eq!(gaps[1].end.value(), 11 * 3600 + 3600);
    assert!(gaps.iter().all(|g| g.priority == GapPriority::High));

    insta::assert_json_snapshot!("boundary_gaps", gaps);
}

#[test]
fn covered_viewport_has_no_gaps() {
    let series = minute_series(TEN, 61, 60);
    let detector = GapDetector::default();
    assert!(detector.detect(&viewport(TEN + 600, ELEVEN - 600), &series, TimeInterval::OneMinute).is_none());
    assert!(detector.detect(&viewport(TEN, ELEVEN), &series, TimeInterval::OneMinute).is_none());
}

#[test]
fn empty_store_reports_nothing() {
    let detector = GapDetector::default();
    assert!(detector.detect(&viewport(0, 10_000), &TimeSeries::empty(), TimeInterval::OneHour).is_none());
}

#[test]
fn internal_gap_beyond_three_intervals() {
    let series = TimeSeries::from(vec![
        bar(TEN, 1.0, 1.0),
        bar(TEN + 300, 1.0, 1.0),
        // 15 minutes: exactly 3 intervals, not a gap
        bar(TEN + 1200, 1.0, 1.0),
        // 20 minutes: a gap
        bar(TEN + 2400, 1.0, 1.0),
    ]);

    let gaps = GapDetector::default()
        .detect(&viewport(TEN, TEN + 2400), &series, TimeInterval::FiveMinutes)
        .unwrap();

    assert_eq!(gaps.len(), 1);
    let gap = gaps[0];
    assert_eq!(gap.kind, GapKind::Internal);
    assert_eq!(gap.priority, GapPriority::Medium);
    assert_eq!(gap.start.value(), TEN + 1200 + 300);
    assert_eq!(gap.end.value(), TEN + 2400 - 300);
}

#[test]
fn custom_buffer_and_factor() {
    let series = TimeSeries::from(vec![bar(TEN, 1.0, 1.0), bar(TEN + 180, 1.0, 1.0)]);
    let detector = GapDetector::new(60, 2);

    let gaps = detector.detect(&viewport(TEN - 10, TEN + 180), &series, TimeInterval::OneMinute).unwrap();

    let kinds: Vec<GapKind> = gaps.iter().map(|g| g.kind).collect();
    assert_eq!(kinds, vec![GapKind::Before, GapKind::Internal]);
    assert_eq!(gaps[0].start.value(), TEN - 70);
}
