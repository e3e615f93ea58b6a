use crate::types::{
    AdmLevel, BoundingBox, FloodError, FloodResult, RegionGeometry, RegionReference, UnitSelector,
};
use geo::{Area, MultiPolygon, Polygon, Validation};
use geojson::{Feature, GeoJson};
use std::path::PathBuf;

const GEOBOUNDARIES_API: &str = "https://www.geoboundaries.org/api/current/gbOpen";

/// geoBoundaries releases change rarely; a week of reuse keeps repeated
/// lookups for the same country offline
const CACHE_MAX_AGE: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 3600);

/// External provider of raw administrative boundaries.
///
/// `lookup` returns the boundary exactly as the source knows it, without
/// validation; `GeometryNotFound` when the reference matches nothing,
/// `BoundarySource` for transport or payload failures.
pub trait GeometrySource: Send + Sync {
    fn lookup(&self, reference: &RegionReference) -> FloodResult<MultiPolygon<f64>>;
}

/// Resolves event region references into validated query geometries
pub struct GeometryResolver {
    source: Box<dyn GeometrySource>,
}

impl GeometryResolver {
    pub fn new(source: Box<dyn GeometrySource>) -> Self {
        Self { source }
    }

    /// Resolve a region reference to its boundary and tightest bounding box.
    ///
    /// Explicit geometries skip the source but go through the same
    /// validation. The geometry is never widened beyond the reference.
    pub fn resolve(&self, reference: &RegionReference) -> FloodResult<RegionGeometry> {
        let boundary = match reference {
            RegionReference::Geometry(polygon) => MultiPolygon(vec![polygon.clone()]),
            RegionReference::Admin { .. } => self.source.lookup(reference)?,
        };
        let geometry = validate_boundary(boundary)?;
        log::info!(
            "Resolved region {} to {} polygon(s), bbox {:?}",
            reference,
            geometry.boundary.0.len(),
            geometry.bbox.to_stac_array()
        );
        Ok(geometry)
    }
}

/// Reject degenerate boundaries and derive the bounding box
fn validate_boundary(boundary: MultiPolygon<f64>) -> FloodResult<RegionGeometry> {
    if boundary.0.is_empty() {
        return Err(FloodError::InvalidGeometry {
            reason: "boundary contains no polygons".to_string(),
        });
    }
    if !boundary.is_valid() {
        return Err(FloodError::InvalidGeometry {
            reason: "boundary has self-intersecting or malformed rings".to_string(),
        });
    }
    if boundary.unsigned_area() <= 0.0 {
        return Err(FloodError::InvalidGeometry {
            reason: "boundary has zero area".to_string(),
        });
    }
    let bbox = BoundingBox::from_geometry(&boundary).ok_or_else(|| FloodError::InvalidGeometry {
        reason: "boundary has no spatial extent".to_string(),
    })?;
    Ok(RegionGeometry { boundary, bbox })
}

/// Disk cache for geoBoundaries responses, keyed by request URL
pub struct BoundaryCache {
    cache_dir: PathBuf,
}

impl BoundaryCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Platform cache directory, falling back to the working directory
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("floodscout")
            .join("boundaries")
    }

    fn key_path(&self, url: &str) -> PathBuf {
        // Readable keys: drop the scheme, flatten everything non-filename
        let key: String = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{}.json", key))
    }

    pub fn get(&self, url: &str) -> Option<String> {
        let path = self.key_path(url);
        let age = std::fs::metadata(&path).ok()?.modified().ok()?.elapsed().ok()?;
        if age > CACHE_MAX_AGE {
            log::debug!("Boundary cache entry expired: {}", path.display());
            return None;
        }
        std::fs::read_to_string(&path).ok()
    }

    pub fn put(&self, url: &str, body: &str) -> FloodResult<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.key_path(url);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// Boundary source backed by the public geoBoundaries API.
///
/// Resolution takes two requests: the ADM-level metadata document
/// (`{base}/{ISO3}/{ADM}/`), then the simplified-geometry GeoJSON it points
/// at. Both responses are cached on disk.
pub struct GeoBoundariesSource {
    client: reqwest::blocking::Client,
    cache: BoundaryCache,
    base_url: String,
}

impl GeoBoundariesSource {
    pub fn new(cache_dir: Option<PathBuf>) -> FloodResult<Self> {
        Self::with_base_url(GEOBOUNDARIES_API, cache_dir)
    }

    /// Point at a different API root (mirrors, test servers)
    pub fn with_base_url(base_url: &str, cache_dir: Option<PathBuf>) -> FloodResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FloodError::BoundarySource {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            cache: BoundaryCache::new(cache_dir.unwrap_or_else(BoundaryCache::default_dir)),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Cached GET; `Ok(None)` on HTTP 404 so callers can distinguish
    /// "reference unknown" from transport failures.
    fn fetch(&self, url: &str) -> FloodResult<Option<String>> {
        if let Some(body) = self.cache.get(url) {
            log::debug!("Boundary cache hit: {}", url);
            return Ok(Some(body));
        }

        log::info!("Fetching boundary data from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FloodError::BoundarySource {
                message: format!("request to {} failed: {}", url, e),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FloodError::BoundarySource {
                message: format!("{} returned status {}", url, response.status()),
            });
        }

        let body = response.text().map_err(|e| FloodError::BoundarySource {
            message: format!("failed to read response from {}: {}", url, e),
        })?;
        if let Err(e) = self.cache.put(url, &body) {
            log::warn!("Failed to cache boundary response: {}", e);
        }
        Ok(Some(body))
    }

    /// Deepest administrative level the country publishes, walking ADM5
    /// down to ADM0 against the per-level metadata endpoints
    pub fn smallest_adm(&self, iso3: &str) -> FloodResult<AdmLevel> {
        let found = deepest_published_level(|level| {
            let url = format!("{}/{}/{}/", self.base_url, iso3.to_uppercase(), level);
            Ok(self.fetch(&url)?.is_some())
        })?;
        match found {
            Some(level) => {
                log::info!("Deepest ADM level published for {}: {}", iso3, level);
                Ok(level)
            }
            None => Err(FloodError::GeometryNotFound {
                reference: format!("no ADM level published for '{}'", iso3),
            }),
        }
    }

    fn resolve_admin(
        &self,
        reference: &RegionReference,
        iso3: &str,
        level: Option<AdmLevel>,
        units: &UnitSelector,
    ) -> FloodResult<MultiPolygon<f64>> {
        if iso3.len() != 3 || !iso3.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FloodError::GeometryNotFound {
                reference: format!("'{}' is not an ISO 3166-1 alpha-3 code", iso3),
            });
        }
        let level = match level {
            Some(level) => level,
            None => self.smallest_adm(iso3)?,
        };

        let metadata_url = format!("{}/{}/{}/", self.base_url, iso3.to_uppercase(), level);
        let metadata_body =
            self.fetch(&metadata_url)?
                .ok_or_else(|| FloodError::GeometryNotFound {
                    reference: reference.to_string(),
                })?;

        let metadata: serde_json::Value =
            serde_json::from_str(&metadata_body).map_err(|e| FloodError::BoundarySource {
                message: format!("invalid metadata JSON from {}: {}", metadata_url, e),
            })?;
        // The API answers with an object for a single level, an array for ALL
        let metadata = match metadata {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.remove(0),
            other => other,
        };
        let geojson_url = metadata
            .get("simplifiedGeometryGeoJSON")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FloodError::BoundarySource {
                message: format!(
                    "metadata for {}/{} lacks simplifiedGeometryGeoJSON",
                    iso3, level
                ),
            })?;

        let geojson_body =
            self.fetch(geojson_url)?
                .ok_or_else(|| FloodError::BoundarySource {
                    message: format!("geometry file missing upstream: {}", geojson_url),
                })?;
        let collection = match geojson_body.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(fc)) => fc,
            Ok(_) => {
                return Err(FloodError::BoundarySource {
                    message: format!("{} is not a FeatureCollection", geojson_url),
                })
            }
            Err(e) => {
                return Err(FloodError::BoundarySource {
                    message: format!("invalid GeoJSON from {}: {}", geojson_url, e),
                })
            }
        };

        let selected = select_features(&collection.features, units, level);
        log::info!(
            "{}/{}: {} of {} features match unit selector",
            iso3,
            level,
            selected.len(),
            collection.features.len()
        );
        if selected.is_empty() {
            return Err(FloodError::GeometryNotFound {
                reference: reference.to_string(),
            });
        }

        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for feature in &selected {
            polygons.extend(feature_polygons(feature));
        }
        if polygons.is_empty() {
            return Err(FloodError::BoundarySource {
                message: format!(
                    "{} matching feature(s) for {} carried no polygon geometry",
                    selected.len(),
                    reference
                ),
            });
        }
        Ok(MultiPolygon(polygons))
    }
}

impl GeometrySource for GeoBoundariesSource {
    fn lookup(&self, reference: &RegionReference) -> FloodResult<MultiPolygon<f64>> {
        match reference {
            RegionReference::Geometry(polygon) => Ok(MultiPolygon(vec![polygon.clone()])),
            RegionReference::Admin { iso3, level, units } => {
                self.resolve_admin(reference, iso3, *level, units)
            }
        }
    }
}

/// Walk ADM5 down to ADM0, returning the first level `exists` confirms.
/// Transport failures propagate so an upstream outage is not read as a
/// country with no published levels.
fn deepest_published_level<F>(mut exists: F) -> FloodResult<Option<AdmLevel>>
where
    F: FnMut(AdmLevel) -> FloodResult<bool>,
{
    for level in AdmLevel::DEEPEST_FIRST {
        if exists(level)? {
            return Ok(Some(level));
        }
    }
    Ok(None)
}

/// Pick the features a unit selector names.
///
/// Names match `shapeName` exactly first, then case-insensitively. Codes
/// match the shapeID-like numeric properties geoBoundaries files carry.
fn select_features<'a>(
    features: &'a [Feature],
    units: &UnitSelector,
    level: AdmLevel,
) -> Vec<&'a Feature> {
    match units {
        UnitSelector::All => features.iter().collect(),
        UnitSelector::Names(names) => {
            let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
            features
                .iter()
                .filter(|feature| {
                    let Some(name) = feature_name(feature) else {
                        return false;
                    };
                    if names.iter().any(|n| n == name) {
                        return true;
                    }
                    let name_lower = name.to_lowercase();
                    if lowered.contains(&name_lower) {
                        log::debug!("Case-insensitive unit name match: {}", name);
                        return true;
                    }
                    false
                })
                .collect()
        }
        UnitSelector::Codes(codes) => features
            .iter()
            .filter(|feature| {
                feature_code(feature, level).is_some_and(|code| codes.contains(&code))
            })
            .collect(),
    }
}

fn feature_name(feature: &Feature) -> Option<&str> {
    feature.properties.as_ref()?.get("shapeName")?.as_str()
}

/// Numeric unit code from the property names geoBoundaries files use
fn feature_code(feature: &Feature, level: AdmLevel) -> Option<i64> {
    let props = feature.properties.as_ref()?;
    let candidates = [
        "shapeID".to_string(),
        format!("adm{}code", level.as_number()),
        format!("adm{}_code", level.as_number()),
    ];
    for key in &candidates {
        let Some(value) = props.get(key.as_str()) else {
            continue;
        };
        if let Some(n) = value.as_i64() {
            return Some(n);
        }
        if let Some(n) = value.as_str().and_then(|s| s.parse::<i64>().ok()) {
            return Some(n);
        }
    }
    None
}

/// Polygons of one feature; non-polygonal or unparseable geometry is skipped
fn feature_polygons(feature: &Feature) -> Vec<Polygon<f64>> {
    let Some(geometry) = feature.geometry.as_ref() else {
        return Vec::new();
    };
    match geo::Geometry::<f64>::try_from(geometry.value.clone()) {
        Ok(geo::Geometry::Polygon(p)) => vec![p],
        Ok(geo::Geometry::MultiPolygon(mp)) => mp.0,
        Ok(_) => {
            log::warn!("Skipping non-polygonal boundary feature");
            Vec::new()
        }
        Err(e) => {
            log::warn!("Skipping unparseable boundary feature: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn feature_collection(json: &str) -> Vec<Feature> {
        match json.parse::<GeoJson>().unwrap() {
            GeoJson::FeatureCollection(fc) => fc.features,
            _ => panic!("fixture must be a FeatureCollection"),
        }
    }

    const ARG_ADM2_FIXTURE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "shapeName": "La Plata", "shapeID": "4386" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-58.2, -35.1], [-57.8, -35.1], [-57.8, -34.8], [-58.2, -34.8], [-58.2, -35.1]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "shapeName": "Ensenada", "shapeID": "4395" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-58.0, -34.9], [-57.9, -34.9], [-57.9, -34.8], [-58.0, -34.8], [-58.0, -34.9]]]
                }
            }
        ]
    }"#;

    #[test]
    fn names_match_exact_then_case_insensitive() {
        let features = feature_collection(ARG_ADM2_FIXTURE);

        let exact = select_features(
            &features,
            &UnitSelector::Names(vec!["La Plata".to_string()]),
            AdmLevel::Adm2,
        );
        assert_eq!(exact.len(), 1);
        assert_eq!(feature_name(exact[0]), Some("La Plata"));

        let insensitive = select_features(
            &features,
            &UnitSelector::Names(vec!["la plata".to_string(), "ENSENADA".to_string()]),
            AdmLevel::Adm2,
        );
        assert_eq!(insensitive.len(), 2);
    }

    #[test]
    fn codes_match_numeric_shape_ids() {
        let features = feature_collection(ARG_ADM2_FIXTURE);
        let selected = select_features(&features, &UnitSelector::Codes(vec![4395]), AdmLevel::Adm2);
        assert_eq!(selected.len(), 1);
        assert_eq!(feature_name(selected[0]), Some("Ensenada"));
    }

    #[test]
    fn all_selector_keeps_every_feature() {
        let features = feature_collection(ARG_ADM2_FIXTURE);
        assert_eq!(
            select_features(&features, &UnitSelector::All, AdmLevel::Adm2).len(),
            2
        );
    }

    #[test]
    fn validate_rejects_empty_boundary() {
        let result = validate_boundary(MultiPolygon(vec![]));
        assert!(matches!(result, Err(FloodError::InvalidGeometry { .. })));
    }

    #[test]
    fn validate_rejects_zero_area() {
        let degenerate = polygon![
            (x: -58.0, y: -34.0),
            (x: -58.0, y: -34.0),
            (x: -58.0, y: -34.0),
        ];
        let result = validate_boundary(MultiPolygon(vec![degenerate]));
        assert!(matches!(result, Err(FloodError::InvalidGeometry { .. })));
    }

    #[test]
    fn validate_accepts_simple_boundary_with_tight_bbox() {
        let square = polygon![
            (x: -58.2, y: -35.1),
            (x: -57.8, y: -35.1),
            (x: -57.8, y: -34.8),
            (x: -58.2, y: -34.8),
        ];
        let geometry = validate_boundary(MultiPolygon(vec![square])).unwrap();
        assert_eq!(geometry.bbox.min_lon, -58.2);
        assert_eq!(geometry.bbox.max_lat, -34.8);
    }

    #[test]
    fn resolver_validates_explicit_geometry_without_source() {
        struct NoSource;
        impl GeometrySource for NoSource {
            fn lookup(&self, _: &RegionReference) -> FloodResult<MultiPolygon<f64>> {
                panic!("explicit geometry must not hit the source");
            }
        }

        let resolver = GeometryResolver::new(Box::new(NoSource));
        let square = polygon![
            (x: -58.2, y: -35.1),
            (x: -57.8, y: -35.1),
            (x: -57.8, y: -34.8),
            (x: -58.2, y: -34.8),
        ];
        let geometry = resolver
            .resolve(&RegionReference::Geometry(square))
            .unwrap();
        assert_eq!(geometry.boundary.0.len(), 1);
    }

    #[test]
    fn cache_roundtrip_and_key_flattening() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = BoundaryCache::new(dir.path().to_path_buf());
        let url = "https://www.geoboundaries.org/api/current/gbOpen/ARG/ADM2/";

        assert!(cache.get(url).is_none());
        let path = cache.put(url, "{\"ok\":true}").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(cache.get(url).as_deref(), Some("{\"ok\":true}"));
    }

    #[test]
    fn deepest_level_walk_stops_at_the_first_published_level() {
        let mut checked = Vec::new();
        let found = deepest_published_level(|level| {
            checked.push(level);
            Ok(level == AdmLevel::Adm2)
        })
        .unwrap();

        assert_eq!(found, Some(AdmLevel::Adm2));
        assert_eq!(
            checked,
            vec![AdmLevel::Adm5, AdmLevel::Adm4, AdmLevel::Adm3, AdmLevel::Adm2]
        );
    }

    #[test]
    fn deepest_level_walk_reports_countries_with_no_levels() {
        let found = deepest_published_level(|_| Ok(false)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn deepest_level_walk_propagates_lookup_failures() {
        let result = deepest_published_level(|_| {
            Err(FloodError::BoundarySource {
                message: "503 from upstream".to_string(),
            })
        });
        assert!(matches!(result, Err(FloodError::BoundarySource { .. })));
    }
}
