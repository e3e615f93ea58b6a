use crate::types::{
    AssetRecord, CatalogQuery, FloodError, FloodResult, SensorType, SpatialFilter,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use geo::{Area, BooleanOps, MultiPolygon};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Earth Search hosts both Sentinel collections behind one STAC endpoint
const DEFAULT_STAC_API: &str = "https://earth-search.aws.element84.com/v1";

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
/// Upper bound on followed pagination links per query
const MAX_PAGES: usize = 10;

/// Narrow interface the engine depends on; any conforming catalog client is
/// interchangeable.
pub trait CatalogClient: Send + Sync {
    /// Execute one planned query. Zero results is a valid answer;
    /// `CatalogTimeout` is a failure and must never be mapped onto an empty
    /// list.
    fn query(&self, query: &CatalogQuery) -> FloodResult<Vec<AssetRecord>>;

    /// Whether the catalog accepts polygon-intersection filters. Planners
    /// fall back to bounding-box queries when it does not.
    fn supports_intersects(&self) -> bool {
        true
    }
}

/// STAC collection id for a sensor (Earth Search naming)
pub fn collection_id(sensor: SensorType) -> &'static str {
    match sensor {
        SensorType::S1 => "sentinel-1-grd",
        SensorType::S2 => "sentinel-2-l2a",
    }
}

fn sensor_for_collection(collection: &str) -> Option<SensorType> {
    if collection.starts_with("sentinel-1") {
        Some(SensorType::S1)
    } else if collection.starts_with("sentinel-2") {
        Some(SensorType::S2)
    } else {
        None
    }
}

/// Sentinel scene ids start with the platform prefix (S1A_, S2B_, ...)
fn sensor_from_id(id: &str) -> Option<SensorType> {
    if id.starts_with("S1") {
        Some(SensorType::S1)
    } else if id.starts_with("S2") {
        Some(SensorType::S2)
    } else {
        None
    }
}

/// Sentinel scene ids embed acquisition times as YYYYMMDDTHHMMSS
fn scene_id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(r"\d{8}T\d{6}").ok()?;
    let matched = re.find(id)?;
    NaiveDateTime::parse_from_str(matched.as_str(), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

/// CatalogClient implementation for STAC-API search endpoints.
///
/// POSTs `/search` with collection, datetime and spatial filters, follows
/// `rel=next` pagination, and tolerates heterogeneous item metadata: a
/// missing item datetime is recovered from the scene id, unparseable items
/// are skipped with a log line rather than failing the query.
pub struct StacApiClient {
    client: reqwest::blocking::Client,
    search_url: String,
    max_retries: u32,
    intersects_supported: bool,
}

impl StacApiClient {
    pub fn new() -> FloodResult<Self> {
        Self::with_api_root(DEFAULT_STAC_API)
    }

    pub fn with_api_root(api_root: &str) -> FloodResult<Self> {
        Self::with_timeout(api_root, REQUEST_TIMEOUT)
    }

    /// Bounded-wait client; expiry of the timeout surfaces `CatalogTimeout`
    pub fn with_timeout(api_root: &str, timeout: std::time::Duration) -> FloodResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FloodError::CatalogUnavailable {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            search_url: format!("{}/search", api_root.trim_end_matches('/')),
            max_retries: MAX_RETRIES,
            intersects_supported: true,
        })
    }

    /// Force bounding-box queries for deployments that reject `intersects`
    pub fn bbox_only(mut self) -> Self {
        self.intersects_supported = false;
        self
    }

    fn search_body(&self, query: &CatalogQuery) -> FloodResult<Value> {
        let collections: Vec<&str> = query.sensors.iter().map(|s| collection_id(*s)).collect();
        let datetime = format!(
            "{}/{}",
            query.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            query.window.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let mut body = json!({
            "collections": collections,
            "datetime": datetime,
            "limit": query.limit,
        });
        match &query.spatial {
            SpatialFilter::Intersects(boundary) => {
                let geometry = geojson::Geometry::new(geojson::Value::from(boundary));
                body["intersects"] = serde_json::to_value(geometry).map_err(|e| {
                    FloodError::CatalogUnavailable {
                        message: format!("failed to encode intersects geometry: {}", e),
                    }
                })?;
            }
            SpatialFilter::Bbox(bbox) => {
                body["bbox"] = json!(bbox.to_stac_array());
            }
        }
        if let Some(ceiling) = query.max_cloud_pct {
            // Radar items carry no eo:cloud_cover; the server-side hint
            // would drop them, so it only goes out on all-optical queries
            if query.sensors.iter().all(|s| s.is_optical()) {
                body["query"] = json!({ "eo:cloud_cover": { "lte": ceiling } });
            }
        }
        Ok(body)
    }

    /// POST with retry on transient upstream failures (5xx, connection
    /// drops). Timeouts and client errors are surfaced immediately.
    fn post_with_retry(&self, url: &str, body: &Value) -> FloodResult<Value> {
        let mut last_error = FloodError::CatalogUnavailable {
            message: "no request attempted".to_string(),
        };
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay_secs = 1u64 << attempt; // 2s, 4s
                log::warn!(
                    "Catalog retry {}/{} in {}s: {}",
                    attempt,
                    self.max_retries - 1,
                    delay_secs,
                    last_error
                );
                std::thread::sleep(std::time::Duration::from_secs(delay_secs));
            }

            let response = match self.client.post(url).json(body).send() {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(FloodError::CatalogTimeout {
                        message: format!("{} did not answer within the bounded wait: {}", url, e),
                    });
                }
                Err(e) => {
                    last_error = FloodError::CatalogUnavailable {
                        message: format!("request to {} failed: {}", url, e),
                    };
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                last_error = FloodError::CatalogUnavailable {
                    message: format!("{} returned status {}", url, status),
                };
                continue;
            }
            if !status.is_success() {
                // 4xx will not improve on retry
                return Err(FloodError::CatalogUnavailable {
                    message: format!("{} returned status {}", url, status),
                });
            }

            return response
                .json::<Value>()
                .map_err(|e| FloodError::CatalogUnavailable {
                    message: format!("invalid JSON from {}: {}", url, e),
                });
        }
        Err(last_error)
    }
}

impl CatalogClient for StacApiClient {
    fn query(&self, query: &CatalogQuery) -> FloodResult<Vec<AssetRecord>> {
        let region = match &query.spatial {
            SpatialFilter::Intersects(boundary) => Some(boundary),
            SpatialFilter::Bbox(_) => None,
        };

        let body = self.search_body(query)?;
        let (records, skipped, truncated) =
            collect_pages(&self.search_url, body, region, |url, body| {
                self.post_with_retry(url, body)
            })?;

        if truncated {
            log::warn!(
                "Catalog query [{}] still reported a next page after {} page(s); remaining results were not fetched",
                query_label(query),
                MAX_PAGES
            );
        }
        log::info!(
            "Catalog query [{}] matched {} record(s), {} skipped",
            query_label(query),
            records.len(),
            skipped
        );
        Ok(records)
    }

    fn supports_intersects(&self) -> bool {
        self.intersects_supported
    }
}

/// Short `sensors | start .. end` label for log lines
fn query_label(query: &CatalogQuery) -> String {
    format!(
        "{} | {} .. {}",
        query
            .sensors
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(","),
        query.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        query.window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Walk `rel=next` pagination up to `MAX_PAGES` responses, parsing items
/// as they arrive. Returns the records, the count of skipped items, and
/// whether the page budget ran out with a next page still advertised.
fn collect_pages<F>(
    start_url: &str,
    start_body: Value,
    region: Option<&MultiPolygon<f64>>,
    mut fetch: F,
) -> FloodResult<(Vec<AssetRecord>, usize, bool)>
where
    F: FnMut(&str, &Value) -> FloodResult<Value>,
{
    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut url = start_url.to_string();
    let mut body = start_body;
    let mut truncated = false;

    for page in 0..MAX_PAGES {
        let response = fetch(&url, &body)?;
        let items = response
            .get("features")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        log::debug!("Catalog page {} returned {} item(s)", page + 1, items.len());

        for item in &items {
            match parse_item(item, region) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    let item_id = item.get("id").and_then(|v| v.as_str()).unwrap_or("<no id>");
                    log::warn!("Skipping catalog item with unusable metadata: {}", item_id);
                }
            }
        }

        match next_link(&response) {
            Some((next_url, next_body)) => {
                truncated = page + 1 == MAX_PAGES;
                url = next_url;
                if let Some(next_body) = next_body {
                    body = next_body;
                }
            }
            None => break,
        }
    }

    Ok((records, skipped, truncated))
}

/// `rel=next` pagination link; the replacement body carries the page token
fn next_link(response: &Value) -> Option<(String, Option<Value>)> {
    let links = response.get("links")?.as_array()?;
    let next = links
        .iter()
        .find(|link| link.get("rel").and_then(|r| r.as_str()) == Some("next"))?;
    let href = next.get("href")?.as_str()?.to_string();
    Some((href, next.get("body").cloned()))
}

/// One STAC item to an asset record; `None` when the essentials (id,
/// sensor, acquisition time) cannot be established.
fn parse_item(item: &Value, region: Option<&MultiPolygon<f64>>) -> Option<AssetRecord> {
    let id = item.get("id")?.as_str()?.to_string();
    let collection = item
        .get("collection")
        .and_then(|c| c.as_str())
        .unwrap_or("");
    let properties = item.get("properties").and_then(|p| p.as_object());

    let sensor = sensor_for_collection(collection).or_else(|| sensor_from_id(&id))?;

    let acquired = properties
        .and_then(|props| props.get("datetime"))
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| scene_id_timestamp(&id))?;

    let cloud_cover = properties
        .and_then(|props| props.get("eo:cloud_cover"))
        .and_then(|v| v.as_f64());

    let footprint = item.get("geometry").and_then(item_footprint);
    let coverage_fraction = match (&footprint, region) {
        (Some(footprint), Some(region)) => coverage_fraction(footprint, region),
        _ => None,
    };

    let mut extra = BTreeMap::new();
    if let Some(props) = properties {
        for (key, value) in props {
            if key != "datetime" && key != "eo:cloud_cover" {
                extra.insert(key.clone(), value.clone());
            }
        }
    }

    Some(AssetRecord {
        id,
        sensor,
        acquired,
        cloud_cover,
        footprint,
        coverage_fraction,
        extra,
    })
}

fn item_footprint(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let geometry: geojson::Geometry = serde_json::from_value(geometry.clone()).ok()?;
    match geo::Geometry::<f64>::try_from(geometry.value).ok()? {
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

/// Fraction of the queried region covered by a scene footprint
fn coverage_fraction(footprint: &MultiPolygon<f64>, region: &MultiPolygon<f64>) -> Option<f64> {
    let region_area = region.unsigned_area();
    if region_area <= 0.0 {
        return None;
    }
    let overlap = footprint.intersection(region).unsigned_area();
    Some((overlap / region_area).clamp(0.0, 1.0))
}
