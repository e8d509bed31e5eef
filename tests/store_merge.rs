mod common;

use chart_viewport_wasm::domain::market_data::{
    InstrumentId, TimeInterval, TimeSeries, TimeSeriesStore, TradingHours, merge,
};
use common::{SESSION_10AM, bar};
use quickcheck_macros::quickcheck;

fn from_pairs(points: &[(u16, u8)]) -> TimeSeries {
    TimeSeries::from(points.iter().map(|(ts, v)| bar(i64::from(*ts) * 60, 100.0, f64::from(*v))).collect::<Vec<_>>())
}

#[quickcheck]
fn merge_with_nothing_is_identity(points: Vec<(u16, u8)>) -> bool {
    let series = from_pairs(&points);
    merge(&series, &[]) == series
}

#[quickcheck]
fn merge_with_itself_is_identity(points: Vec<(u16, u8)>) -> bool {
    let series = from_pairs(&points);
    merge(&series, series.candles()) == series
}

#[quickcheck]
fn merge_is_sorted_and_unique(a: Vec<(u16, u8)>, b: Vec<(u16, u8)>) -> bool {
    let incoming: Vec<_> = b.iter().map(|(ts, v)| bar(i64::from(*ts) * 60, 50.0, f64::from(*v))).collect();
    let merged = merge(&from_pairs(&a), &incoming);
    merged.candles().windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

#[test]
fn non_zero_volume_wins_either_direction() {
    let provisional = bar(600, 10.0, 0.0);
    let confirmed = bar(600, 11.0, 250.0);

    let a = merge(&TimeSeries::from(vec![provisional]), &[confirmed]);
    assert_eq!(a.candles(), &[confirmed]);

    let b = merge(&TimeSeries::from(vec![confirmed]), &[provisional]);
    assert_eq!(b.candles(), &[confirmed]);
}

#[test]
fn unsorted_incoming_is_reordered() {
    let existing = TimeSeries::from(vec![bar(300, 1.0, 1.0)]);
    let merged = merge(&existing, &[bar(900, 3.0, 1.0), bar(60, 0.5, 1.0), bar(600, 2.0, 1.0)]);
    let stamps: Vec<i64> = merged.candles().iter().map(|c| c.timestamp.value()).collect();
    assert_eq!(stamps, vec![60, 300, 600, 900]);
}

#[test]
fn store_applies_session_filter_on_ingest() {
    let mut store = TimeSeriesStore::new(TimeInterval::OneMinute, TradingHours::nse());
    store.reset(InstrumentId::from("INFY"), TimeInterval::OneMinute);

    // 10:00 IST is in session, 16:00 IST is not
    let accepted = store.ingest(vec![bar(SESSION_10AM, 100.0, 5.0), bar(SESSION_10AM + 6 * 3600, 101.0, 5.0)]);

    assert_eq!(accepted, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(store.first().map(|c| c.timestamp.value()), Some(SESSION_10AM));
}

#[test]
fn series_handles_are_stable_until_change() {
    let mut store = TimeSeriesStore::new(TimeInterval::OneMinute, TradingHours::always_open());
    store.ingest(vec![bar(60, 1.0, 1.0)]);
    let before = store.series();
    assert!(before.ptr_eq(&store.series()));

    store.ingest(vec![bar(120, 2.0, 1.0)]);
    assert!(!before.ptr_eq(&store.series()));
    assert_eq!(before.len(), 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn reset_clears_points_and_rebinds() {
    let mut store = TimeSeriesStore::new(TimeInterval::OneMinute, TradingHours::always_open());
    store.reset(InstrumentId::from("TCS"), TimeInterval::OneMinute);
    store.ingest(vec![bar(60, 1.0, 1.0), bar(120, 2.0, 1.0)]);
    assert_eq!(store.coverage().map(|r| r.duration_secs()), Some(60));

    store.reset(InstrumentId::from("WIPRO"), TimeInterval::OneHour);

    assert!(store.is_empty());
    assert_eq!(store.instrument().map(|i| i.value()), Some("WIPRO"));
    assert_eq!(store.interval(), TimeInterval::OneHour);
    assert!(store.coverage().is_none());
}
