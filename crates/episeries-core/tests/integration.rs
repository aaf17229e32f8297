//! End-to-end engine tests against the SQLite storage.

use std::sync::Arc;

use episeries_core::{
    EngineOptions, Error, FilterParams, Indicator, QuerySpec, SeriesService, ValidationError,
};
use episeries_store::{NewRecord, SqliteStorage};
use episeries_types::{Granularity, LocationEntry, ReferenceEntity, SplitTotal};
use time::macros::date;
use tokio_util::sync::CancellationToken;

async fn engine() -> SeriesService<SqliteStorage> {
    let storage = SqliteStorage::open_in_memory().unwrap();
    {
        let store = storage.store().lock().await;
        let daily = |d| NewRecord::new("cases", d, Granularity::Daily);
        let records = [
            daily(date!(2024 - 01 - 01))
                .at("DE-BY")
                .source("rki")
                .date_total()
                .attr("value", 6),
            daily(date!(2024 - 01 - 01))
                .at("DE-BE")
                .source("rki")
                .date_total()
                .attr("value", 4),
            daily(date!(2024 - 01 - 03))
                .at("DE-BY")
                .source("lgl")
                .date_total()
                .attr("value", 4),
            daily(date!(2024 - 01 - 01))
                .at("DE-BY")
                .attr("gender", "male")
                .attr("value", 3),
            daily(date!(2024 - 01 - 01))
                .at("DE-BY")
                .attr("gender", "female")
                .attr("value", 3),
            daily(date!(2024 - 01 - 01))
                .at("DE-BE")
                .attr("gender", "female")
                .attr("value", 4),
        ];
        for record in &records {
            store.insert_record(record).unwrap();
        }

        let weekly = |d| NewRecord::new("variants", d, Granularity::Weekly).at("DE");
        let variants = [
            weekly(date!(2024 - 01 - 02))
                .attr("variant_id", "XBB")
                .attr("value", 5),
            weekly(date!(2024 - 01 - 02))
                .attr("variant_id", "BA.2")
                .attr("value", 2),
            weekly(date!(2024 - 01 - 16))
                .attr("variant_id", "XBB")
                .attr("value", 7),
            weekly(date!(2024 - 01 - 16)).date_total().attr("value", 7),
        ];
        for record in &variants {
            store.insert_record(record).unwrap();
        }

        for (id, name) in [("XBB", "Omicron XBB"), ("BA.2", "Omicron BA.2")] {
            store
                .upsert_reference_entity(&ReferenceEntity {
                    id: id.to_string(),
                    kind: "variant".to_string(),
                    name: name.to_string(),
                    attributes: None,
                })
                .unwrap();
        }
    }
    SeriesService::new(Arc::new(storage), EngineOptions::default())
}

fn spec(name: &str, params: FilterParams) -> QuerySpec {
    QuerySpec::build(Indicator::by_name(name).unwrap(), &params).unwrap()
}

fn split(total: f64, value: &str) -> SplitTotal {
    SplitTotal {
        total,
        split_value: value.to_string(),
    }
}

#[tokio::test]
async fn test_daily_series_from_date_totals() {
    let engine = engine().await;
    let params = FilterParams::new()
        .start_date("2024-01-01")
        .end_date("2024-01-04");

    let response = engine
        .get_series(&spec("cases", params), &CancellationToken::new())
        .await
        .unwrap();

    let totals: Vec<(&str, f64)> = response
        .data
        .iter()
        .map(|e| (e.date.as_str(), e.total))
        .collect();
    assert_eq!(
        totals,
        vec![
            ("2024-01-01", 10.0),
            ("2024-01-02", 0.0),
            ("2024-01-03", 4.0),
            ("2024-01-04", 0.0)
        ]
    );
    assert_eq!(response.metadata.granularity, Granularity::Daily);
    assert_eq!(
        response.metadata.sources,
        Some(vec!["lgl".to_string(), "rki".to_string()])
    );
}

#[tokio::test]
async fn test_split_series_uses_detail_rows() {
    let engine = engine().await;
    let params = FilterParams::new()
        .split("gender")
        .start_date("2024-01-01")
        .end_date("2024-01-02");

    let response = engine
        .get_series(&spec("cases", params), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0].total, 10.0);
    assert_eq!(
        response.data[0].split,
        vec![split(7.0, "female"), split(3.0, "male")]
    );
    assert!(response.data[1].split.is_empty());
}

#[tokio::test]
async fn test_location_series_is_dense() {
    let engine = engine().await;
    let params = FilterParams::new()
        .location(vec!["DE-BY", "DE-BE", "DE-HH"])
        .start_date("2024-01-01")
        .end_date("2024-01-03");
    let query = spec("cases", params);

    let response = engine
        .get_location_series(&query, &query.locations(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.data.len(), 3);
    let day1: Vec<(&str, f64)> = response.data[0]
        .locations
        .iter()
        .map(|l| (l.code.as_str(), l.total))
        .collect();
    assert_eq!(day1, vec![("DE-BY", 6.0), ("DE-BE", 4.0), ("DE-HH", 0.0)]);

    let day2: Vec<&str> = response.data[1]
        .locations
        .iter()
        .map(|l| l.code.as_str())
        .collect();
    assert_eq!(day2, vec!["DE-BY", "DE-BE", "DE-HH"]);

    assert_eq!(response.data[2].locations[0].total, 4.0);
    assert_eq!(response.data[2].locations[1], LocationEntry::zero("DE-BE"));
}

#[tokio::test]
async fn test_location_series_with_split_zero_fills_pairs() {
    let engine = engine().await;
    let params = FilterParams::new()
        .location(vec!["DE-BY", "DE-BE", "DE-HH"])
        .split("gender")
        .start_date("2024-01-01")
        .end_date("2024-01-01");
    let query = spec("cases", params);

    let response = engine
        .get_location_series(&query, &query.locations(), &CancellationToken::new())
        .await
        .unwrap();

    let day = &response.data[0];
    assert_eq!(day.locations[0].code, "DE-BY");
    assert_eq!(day.locations[0].total, 6.0);
    assert_eq!(
        day.locations[1].split,
        vec![split(4.0, "female"), split(0.0, "male")]
    );
    assert_eq!(day.locations[2], LocationEntry::zero("DE-HH"));
}

#[tokio::test]
async fn test_weekly_only_indicator_falls_back() {
    let engine = engine().await;
    let query = spec("variants", FilterParams::new().split("variant_id"));

    let response = engine
        .get_series(&query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.metadata.granularity, Granularity::Weekly);
    let totals: Vec<(&str, f64)> = response
        .data
        .iter()
        .map(|e| (e.date.as_str(), e.total))
        .collect();
    assert_eq!(
        totals,
        vec![("2024-01-02", 7.0), ("2024-01-09", 0.0), ("2024-01-16", 7.0)]
    );
    assert_eq!(
        response.data[0].split,
        vec![split(2.0, "BA.2"), split(5.0, "XBB")]
    );

    let mut names: Vec<String> = response
        .metadata
        .split_references
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Omicron BA.2", "Omicron XBB"]);
}

#[tokio::test]
async fn test_explicit_daily_does_not_fall_back() {
    let engine = engine().await;
    let query = spec(
        "variants",
        FilterParams::new().split("variant_id").period_type("Daily"),
    );

    let response = engine
        .get_series(&query, &CancellationToken::new())
        .await
        .unwrap();
    assert!(response.data.is_empty());
    assert_eq!(response.metadata.granularity, Granularity::Daily);
}

#[tokio::test]
async fn test_date_interval() {
    let engine = engine().await;
    let interval = engine
        .get_date_interval(&spec("cases", FilterParams::new()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(interval.start_date.as_deref(), Some("2024-01-01"));
    assert_eq!(interval.end_date.as_deref(), Some("2024-01-03"));

    let weekly = engine
        .get_date_interval(
            &spec("cases", FilterParams::new().period_type("Weekly")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(weekly.start_date.is_none());
    assert!(weekly.end_date.is_none());
}

#[tokio::test]
async fn test_range_limit_applies_to_resolved_range() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    {
        let store = storage.store().lock().await;
        for d in [date!(2020 - 01 - 01), date!(2024 - 01 - 01)] {
            store
                .insert_record(
                    &NewRecord::new("cases", d, Granularity::Daily)
                        .date_total()
                        .attr("value", 1),
                )
                .unwrap();
        }
    }
    let engine = SeriesService::new(
        Arc::new(storage),
        EngineOptions {
            max_range_days: 365,
            ..Default::default()
        },
    );

    let result = engine
        .get_series(&spec("cases", FilterParams::new()), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::RangeTooLong { max: 365, .. }))
    ));
}

#[tokio::test]
async fn test_series_total_matches_location_breakout() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    {
        let store = storage.store().lock().await;
        for (location, occupied) in [("A", 100), ("A", 80), ("B", 50)] {
            store
                .insert_record(
                    &NewRecord::new("icu_beds", date!(2024 - 01 - 01), Granularity::Daily)
                        .at(location)
                        .date_total()
                        .attr("occupied", occupied),
                )
                .unwrap();
        }
    }
    let engine = SeriesService::new(Arc::new(storage), EngineOptions::default());
    let query = spec("icu_beds", FilterParams::new().location(vec!["A", "B"]));
    let cancel = CancellationToken::new();

    let series = engine.get_series(&query, &cancel).await.unwrap();
    let breakout = engine
        .get_location_series(&query, &query.locations(), &cancel)
        .await
        .unwrap();

    let per_location: Vec<(&str, f64)> = breakout.data[0]
        .locations
        .iter()
        .map(|l| (l.code.as_str(), l.total))
        .collect();
    assert_eq!(per_location, vec![("A", 100.0), ("B", 50.0)]);
    assert_eq!(series.data[0].total, 150.0);
}

#[tokio::test]
async fn test_location_sources_limited_to_requested_locations() {
    let engine = engine().await;
    let query = spec(
        "cases",
        FilterParams::new()
            .start_date("2024-01-01")
            .end_date("2024-01-03"),
    );

    let response = engine
        .get_location_series(&query, &["DE-BE".to_string()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.data.len(), 3);
    assert_eq!(response.data[0].locations[0].total, 4.0);
    assert_eq!(response.metadata.sources, Some(vec!["rki".to_string()]));
}
