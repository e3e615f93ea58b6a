use chrono::{DateTime, Duration, Utc};
use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sensor families eligible for flood-mask derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Sentinel-1 C-band radar (cloud-penetrating)
    S1,
    /// Sentinel-2 multispectral optical
    S2,
}

impl SensorType {
    /// True for sensors whose scenes can be obscured by cloud
    pub fn is_optical(&self) -> bool {
        matches!(self, SensorType::S2)
    }

    pub fn is_radar(&self) -> bool {
        matches!(self, SensorType::S1)
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorType::S1 => write!(f, "S1"),
            SensorType::S2 => write!(f, "S2"),
        }
    }
}

/// Flood categories as reported by event registries (open set)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloodType {
    Riverine,
    Flash,
    Coastal,
    /// Registry label with no dedicated relevance entry
    Other(String),
}

impl FloodType {
    /// Map a free-form registry label onto a known category.
    ///
    /// Labels are matched case-insensitively on their distinguishing token
    /// ("Riverine flood", "flash_flood", "Coastal"). Anything else is kept
    /// verbatim as `Other`.
    pub fn parse(label: &str) -> Self {
        let norm = label.to_lowercase();
        if norm.contains("riverine") || norm.contains("fluvial") {
            FloodType::Riverine
        } else if norm.contains("flash") {
            FloodType::Flash
        } else if norm.contains("coastal") || norm.contains("storm surge") {
            FloodType::Coastal
        } else {
            FloodType::Other(label.to_string())
        }
    }
}

impl std::fmt::Display for FloodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloodType::Riverine => write!(f, "riverine"),
            FloodType::Flash => write!(f, "flash"),
            FloodType::Coastal => write!(f, "coastal"),
            FloodType::Other(label) => write!(f, "other({})", label),
        }
    }
}

/// Event timing: a single instant or an inclusive interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    Instant(DateTime<Utc>),
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl EventTime {
    /// Build an interval, normalizing reversed endpoints.
    pub fn interval(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            EventTime::Interval { start: a, end: b }
        } else {
            EventTime::Interval { start: b, end: a }
        }
    }

    /// The inclusive query window anchored to the event time ± delta.
    pub fn window(&self, delta: Duration) -> TimeWindow {
        match *self {
            EventTime::Instant(t) => TimeWindow {
                start: t - delta,
                end: t + delta,
            },
            EventTime::Interval { start, end } => TimeWindow {
                start: start - delta,
                end: end + delta,
            },
        }
    }

    /// Temporal distance from an acquisition to the event.
    ///
    /// Zero inside an interval event; always non-negative.
    pub fn distance_from(&self, t: DateTime<Utc>) -> Duration {
        match *self {
            EventTime::Instant(anchor) => {
                if t >= anchor {
                    t - anchor
                } else {
                    anchor - t
                }
            }
            EventTime::Interval { start, end } => {
                if t < start {
                    start - t
                } else if t > end {
                    t - end
                } else {
                    Duration::zero()
                }
            }
        }
    }
}

/// Inclusive temporal window for catalog queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Window length in fractional days
    pub fn days(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 86_400_000.0
    }

    /// True when two windows overlap or share a boundary instant
    pub fn touches(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest window covering both inputs
    pub fn merge(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Split into `parts` adjacent chunks of equal length.
    ///
    /// Chunks share their boundary instants, so an asset acquired exactly on
    /// a boundary may be returned by two queries; deduplication downstream
    /// resolves that.
    pub fn split_even(&self, parts: usize) -> Vec<TimeWindow> {
        if parts <= 1 {
            return vec![*self];
        }
        let total_ms = (self.end - self.start).num_milliseconds();
        let step = total_ms / parts as i64;
        let mut chunks = Vec::with_capacity(parts);
        for i in 0..parts {
            let start = self.start + Duration::milliseconds(step * i as i64);
            let end = if i + 1 == parts {
                self.end
            } else {
                self.start + Duration::milliseconds(step * (i as i64 + 1))
            };
            chunks.push(TimeWindow { start, end });
        }
        chunks
    }
}

/// geoBoundaries administrative level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdmLevel {
    Adm0,
    Adm1,
    Adm2,
    Adm3,
    Adm4,
    Adm5,
}

impl AdmLevel {
    /// Walk order for discovering the deepest level a country publishes
    pub const DEEPEST_FIRST: [AdmLevel; 6] = [
        AdmLevel::Adm5,
        AdmLevel::Adm4,
        AdmLevel::Adm3,
        AdmLevel::Adm2,
        AdmLevel::Adm1,
        AdmLevel::Adm0,
    ];

    pub fn as_number(&self) -> u8 {
        match self {
            AdmLevel::Adm0 => 0,
            AdmLevel::Adm1 => 1,
            AdmLevel::Adm2 => 2,
            AdmLevel::Adm3 => 3,
            AdmLevel::Adm4 => 4,
            AdmLevel::Adm5 => 5,
        }
    }
}

impl std::fmt::Display for AdmLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ADM{}", self.as_number())
    }
}

/// Which administrative units of a level make up the region of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitSelector {
    /// Every feature of the level (e.g. a whole country at ADM0)
    All,
    /// Match on the `shapeName` property, exact first then case-insensitive
    Names(Vec<String>),
    /// Match on shapeID-like numeric codes
    Codes(Vec<i64>),
}

/// How an event names its region of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionReference {
    /// Administrative units resolved through a boundary source
    Admin {
        /// ISO 3166-1 alpha-3 country code, e.g. "ARG"
        iso3: String,
        /// `None` asks the source for the deepest level the country publishes
        #[serde(default)]
        level: Option<AdmLevel>,
        units: UnitSelector,
    },
    /// Caller-supplied boundary, used as-is after validation
    Geometry(Polygon<f64>),
}

impl std::fmt::Display for RegionReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionReference::Admin { iso3, level, units } => {
                let sel = match units {
                    UnitSelector::All => "all units".to_string(),
                    UnitSelector::Names(names) => format!("names: {}", names.join(", ")),
                    UnitSelector::Codes(codes) => format!(
                        "codes: {}",
                        codes
                            .iter()
                            .map(|c| c.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                };
                match level {
                    Some(level) => write!(f, "{}/{} ({})", iso3, level, sel),
                    None => write!(f, "{}/deepest-available ({})", iso3, sel),
                }
            }
            RegionReference::Geometry(polygon) => {
                write!(f, "explicit polygon ({} vertices)", polygon.exterior().0.len())
            }
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Tightest box containing the geometry; `None` for empty geometry.
    pub fn from_geometry(boundary: &MultiPolygon<f64>) -> Option<BoundingBox> {
        use geo::BoundingRect;
        boundary.bounding_rect().map(|rect| BoundingBox {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        })
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// STAC ordering: `[min_lon, min_lat, max_lon, max_lat]`
    pub fn to_stac_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Validated region of interest: boundary plus its tightest bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionGeometry {
    /// Admin units can be multi-part (islands, exclaves)
    pub boundary: MultiPolygon<f64>,
    pub bbox: BoundingBox,
}

/// A flood event as received from an external registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodEvent {
    pub id: String,
    pub time: EventTime,
    pub flood_type: FloodType,
    pub region: RegionReference,
    pub severity: Option<String>,
}

/// Spatial constraint of a catalog query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialFilter {
    /// Precise polygon intersection
    Intersects(MultiPolygon<f64>),
    /// Bounding-box fallback; results need a precise re-check
    Bbox(BoundingBox),
}

impl SpatialFilter {
    /// Coarse filters admit assets outside the true region of interest
    pub fn is_coarse(&self) -> bool {
        matches!(self, SpatialFilter::Bbox(_))
    }
}

/// One query against the remote asset catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub sensors: Vec<SensorType>,
    pub spatial: SpatialFilter,
    /// Inclusive window anchored to the event time ± the proximity delta
    pub window: TimeWindow,
    /// Passed to catalogs that can pre-filter optical scenes server-side
    pub max_cloud_pct: Option<f64>,
    /// Result page limit the query was planned against
    pub limit: usize,
}

/// Raw asset metadata as returned by a catalog client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Unique per catalog
    pub id: String,
    pub sensor: SensorType,
    pub acquired: DateTime<Utc>,
    /// Percent 0-100; absent for radar scenes
    pub cloud_cover: Option<f64>,
    /// Scene outline as reported by the catalog
    pub footprint: Option<MultiPolygon<f64>>,
    /// Intersection fraction vs the queried geometry, when the client
    /// could compute it
    pub coverage_fraction: Option<f64>,
    /// Opaque pass-through catalog metadata
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AssetRecord {
    /// Completeness weight used when deduplicating records with equal ids:
    /// presence of the typed fields first, pass-through size second.
    pub fn metadata_completeness(&self) -> (u8, usize) {
        let present = u8::from(self.cloud_cover.is_some())
            + u8::from(self.footprint.is_some())
            + u8::from(self.coverage_fraction.is_some());
        (present, self.extra.len())
    }
}

/// Independent scoring axes; every score is in [0, 1], higher is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreAxis {
    /// 1 - cloud_cover/100 for optical; neutral 1.0 for radar
    Cloud,
    /// Fraction of the region covered by the scene footprint
    Completeness,
    /// Linear decay with temporal distance from the event
    Proximity,
    /// Static (sensor, flood type) relevance weight
    Relevance,
}

impl ScoreAxis {
    pub const ALL: [ScoreAxis; 4] = [
        ScoreAxis::Cloud,
        ScoreAxis::Completeness,
        ScoreAxis::Proximity,
        ScoreAxis::Relevance,
    ];
}

impl std::fmt::Display for ScoreAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreAxis::Cloud => write!(f, "cloud"),
            ScoreAxis::Completeness => write!(f, "completeness"),
            ScoreAxis::Proximity => write!(f, "proximity"),
            ScoreAxis::Relevance => write!(f, "relevance"),
        }
    }
}

/// An accepted asset with its per-axis scores, aggregate rank and tags.
/// Never mutated; re-scoring produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAsset {
    pub record: AssetRecord,
    pub scores: BTreeMap<ScoreAxis, f64>,
    /// Weighted mean of the axis scores
    pub rank_score: f64,
    /// Qualitative labels derived from axis-score cut points
    pub tags: BTreeSet<String>,
}

impl ScoredAsset {
    pub fn score(&self, axis: ScoreAxis) -> f64 {
        self.scores.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Ranked, deduplicated output of one selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub event_id: String,
    /// Rank order; ties broken by acquisition time ascending, then asset id
    pub candidates: Vec<ScoredAsset>,
    /// The catalog queries actually issued, for auditability
    pub queries: Vec<CatalogQuery>,
}

impl SelectionResult {
    pub fn best(&self) -> Option<&ScoredAsset> {
        self.candidates.first()
    }

    pub fn asset_ids(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(|c| c.record.id.as_str())
            .collect()
    }
}

/// Error types for flood-scene selection
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no boundary found for region reference: {reference}")]
    GeometryNotFound { reference: String },

    #[error("invalid region geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("boundary source error: {message}")]
    BoundarySource { message: String },

    #[error("catalog unavailable: {message}")]
    CatalogUnavailable { message: String },

    #[error("catalog query timed out: {message}")]
    CatalogTimeout { message: String },

    #[error("no eligible imagery for event {event_id}")]
    NoCandidates { event_id: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("unknown mask job: {job_id}")]
    UnknownMaskJob { job_id: String },

    #[error("mask generation failed: {message}")]
    MaskGeneration { message: String },
}

/// Result type for selection operations
pub type FloodResult<T> = Result<T, FloodError>;
