use chrono::{DateTime, TimeZone, Utc};
use floodscout::config::SelectionConfig;
use floodscout::core::QueryPlanner;
use floodscout::types::{
    BoundingBox, EventTime, RegionGeometry, SensorType, SpatialFilter, TimeWindow,
};
use geo::{polygon, MultiPolygon};

fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

fn region() -> RegionGeometry {
    let boundary = MultiPolygon(vec![polygon![
        (x: -60.0, y: -35.0),
        (x: -58.0, y: -35.0),
        (x: -58.0, y: -33.0),
        (x: -60.0, y: -33.0),
    ]]);
    let bbox = BoundingBox::from_geometry(&boundary).unwrap();
    RegionGeometry { boundary, bbox }
}

#[test]
fn test_one_query_per_sensor_with_cloud_hint_only_on_optical() {
    let planner = QueryPlanner::new(SelectionConfig::default());
    let queries = planner.plan(
        &region(),
        &EventTime::Instant(utc(2023, 3, 12, 0)),
        &[SensorType::S1, SensorType::S2],
        true,
    );

    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].sensors, vec![SensorType::S1]);
    assert_eq!(queries[0].max_cloud_pct, None);
    assert_eq!(queries[1].sensors, vec![SensorType::S2]);
    assert_eq!(queries[1].max_cloud_pct, Some(30.0));
    for query in &queries {
        // Default delta is two days either side of the instant
        assert_eq!(query.window.start, utc(2023, 3, 10, 0));
        assert_eq!(query.window.end, utc(2023, 3, 14, 0));
        assert!(matches!(query.spatial, SpatialFilter::Intersects(_)));
    }
}

#[test]
fn test_long_interval_is_tiled_into_page_sized_chunks() {
    let _ = env_logger::try_init();

    // Ten event days plus two days either side is a 14-day window; at the
    // S1 revisit density that overflows a page limit of 8 into 7 chunks
    let config = SelectionConfig {
        page_limit: 8,
        ..Default::default()
    };
    let planner = QueryPlanner::new(config);
    let queries = planner.plan(
        &region(),
        &EventTime::interval(utc(2023, 3, 1, 0), utc(2023, 3, 11, 0)),
        &[SensorType::S1],
        true,
    );

    println!("Planned {} chunked queries", queries.len());
    assert_eq!(queries.len(), 7);
    assert_eq!(queries[0].window.start, utc(2023, 2, 27, 0));
    assert_eq!(queries[6].window.end, utc(2023, 3, 13, 0));
    for pair in queries.windows(2) {
        assert_eq!(pair[0].window.end, pair[1].window.start);
    }
    for query in &queries {
        assert_eq!(query.limit, 8);
        assert_eq!(query.sensors, vec![SensorType::S1]);
    }
}

#[test]
fn test_overlapping_report_windows_are_merged_before_querying() {
    let planner = QueryPlanner::new(SelectionConfig::default());
    // Two overlapping reports of the same flood wave plus a distinct later
    // event, deliberately out of order
    let windows = vec![
        TimeWindow { start: utc(2023, 3, 4, 0), end: utc(2023, 3, 8, 0) },
        TimeWindow { start: utc(2023, 3, 1, 0), end: utc(2023, 3, 5, 0) },
        TimeWindow { start: utc(2023, 3, 20, 0), end: utc(2023, 3, 22, 0) },
    ];
    let queries = planner.plan_windows(&region(), &windows, &[SensorType::S1], true);

    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].window.start, utc(2023, 3, 1, 0));
    assert_eq!(queries[0].window.end, utc(2023, 3, 8, 0));
    assert_eq!(queries[1].window.start, utc(2023, 3, 20, 0));
    assert_eq!(queries[1].window.end, utc(2023, 3, 22, 0));
}

#[test]
fn test_bbox_fallback_when_catalog_lacks_polygon_search() {
    let planner = QueryPlanner::new(SelectionConfig::default());
    let queries = planner.plan(
        &region(),
        &EventTime::Instant(utc(2023, 3, 12, 0)),
        &[SensorType::S1, SensorType::S2],
        false,
    );

    for query in &queries {
        assert!(query.spatial.is_coarse());
        match &query.spatial {
            SpatialFilter::Bbox(bbox) => {
                assert_eq!(bbox.to_stac_array(), [-60.0, -35.0, -58.0, -33.0]);
            }
            SpatialFilter::Intersects(_) => panic!("expected bbox fallback"),
        }
    }
}

#[test]
fn test_plan_order_is_deterministic_and_sensor_list_deduplicated() {
    let planner = QueryPlanner::new(SelectionConfig::default());
    let time = EventTime::Instant(utc(2023, 3, 12, 0));
    // Duplicates and reversed order in the request must not show up in
    // the plan
    let sensors = [SensorType::S2, SensorType::S1, SensorType::S2];

    let first = planner.plan(&region(), &time, &sensors, true);
    let second = planner.plan(&region(), &time, &sensors, true);

    assert_eq!(first.len(), 2);
    assert_eq!(first[0].sensors, vec![SensorType::S1]);
    assert_eq!(first[1].sensors, vec![SensorType::S2]);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
