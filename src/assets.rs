//! Decoding of the bundled bus stop and route GeoJSON files
use std::path::{Path, PathBuf};

use geojson::{Feature, GeoJson};
use tracing::{Instrument, error, info, info_span};

use crate::model::{Accessibility, BusRoute, BusStop, LatLon};

/// Parses the bus stop collection.
///
/// Every feature needs `BUSSTOPID`, `LOCATION` and `ACCESSIBLE` properties and a Point geometry.
/// A single malformed feature fails the whole file.
pub fn parse_bus_stops(geojson: &str) -> Result<Vec<BusStop>, AssetError> {
    features(geojson)?
        .iter()
        .enumerate()
        .map(|(index, feature)| bus_stop_from_feature(index, feature))
        .collect()
}

/// Parses the route collection.
///
/// Features without a `ROUTE_NUM` key aren't routes and are skipped. A `null` value still
/// counts as present. Any other malformed feature
/// fails the whole file.
pub fn parse_bus_routes(geojson: &str) -> Result<Vec<BusRoute>, AssetError> {
    features(geojson)?
        .iter()
        .enumerate()
        .filter(|(_, feature)| feature.contains_property("ROUTE_NUM"))
        .map(|(index, feature)| bus_route_from_feature(index, feature))
        .collect()
}

/// Loads the bus stops, logging and returning nothing if the file can't be used
pub async fn load_bus_stops(path: &Path) -> Vec<BusStop> {
    try_load_bus_stops(path).await.unwrap_or_else(|e| {
        error!("Error loading bus stops: {e}");
        vec![]
    })
}

/// Loads the routes, logging and returning nothing if the file can't be used
pub async fn load_bus_routes(path: &Path) -> Vec<BusRoute> {
    try_load_bus_routes(path).await.unwrap_or_else(|e| {
        error!("Error loading bus routes: {e}");
        vec![]
    })
}

#[tracing::instrument(err)]
pub async fn try_load_bus_stops(path: &Path) -> Result<Vec<BusStop>, AssetError> {
    let contents = read_asset(path).await?;
    let stops = parse_bus_stops(&contents)?;

    info!("got {} bus stops", stops.len());

    Ok(stops)
}

#[tracing::instrument(err)]
pub async fn try_load_bus_routes(path: &Path) -> Result<Vec<BusRoute>, AssetError> {
    let contents = read_asset(path).await?;
    let routes = parse_bus_routes(&contents)?;

    info!("got {} bus routes", routes.len());

    Ok(routes)
}

async fn read_asset(path: &Path) -> Result<String, AssetError> {
    tokio::fs::read_to_string(path)
        .instrument(info_span!("Reading asset"))
        .await
        .map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn features(geojson: &str) -> Result<Vec<Feature>, AssetError> {
    match geojson.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(_) => Err(AssetError::NotAFeatureCollection("Feature")),
        GeoJson::Geometry(_) => Err(AssetError::NotAFeatureCollection("Geometry")),
    }
}

fn bus_stop_from_feature(index: usize, feature: &Feature) -> Result<BusStop, AssetError> {
    let id = string_property(index, feature, "BUSSTOPID")?;
    let name = string_property(index, feature, "LOCATION")?;
    let accessibility = Accessibility::from(string_property(index, feature, "ACCESSIBLE")?.as_str());

    let point = match &geometry(index, feature)?.value {
        geojson::Value::Point(point) => point,
        other => {
            return Err(AssetError::UnexpectedGeometry {
                index,
                expected: "Point",
                found: geometry_name(other),
            });
        }
    };
    let position = lat_lon(index, point)?;

    Ok(BusStop {
        id,
        name,
        accessibility,
        latitude: position.latitude,
        longitude: position.longitude,
    })
}

fn bus_route_from_feature(index: usize, feature: &Feature) -> Result<BusRoute, AssetError> {
    let route_num = string_property(index, feature, "ROUTE_NUM")?;
    let title = string_property(index, feature, "TITLE")?;

    let lines: Vec<&Vec<Vec<f64>>> = match &geometry(index, feature)?.value {
        geojson::Value::MultiLineString(lines) => lines.iter().collect(),
        geojson::Value::LineString(line) => vec![line],
        other => {
            return Err(AssetError::UnexpectedGeometry {
                index,
                expected: "MultiLineString",
                found: geometry_name(other),
            });
        }
    };

    let segments: Vec<Vec<LatLon>> = lines
        .into_iter()
        .map(|line| {
            line.iter()
                .map(|point| lat_lon(index, point))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    Ok(BusRoute {
        route_num,
        title,
        segments,
    })
}

/// Strings are taken as is. Numbers, booleans and `null` are rendered.
fn string_property(index: usize, feature: &Feature, key: &'static str) -> Result<String, AssetError> {
    match feature.property(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Ok(b.to_string()),
        Some(serde_json::Value::Null) => Ok("null".to_string()),
        _ => Err(AssetError::MissingProperty { index, key }),
    }
}

fn geometry(index: usize, feature: &Feature) -> Result<&geojson::Geometry, AssetError> {
    feature
        .geometry
        .as_ref()
        .ok_or(AssetError::MissingGeometry { index })
}

/// GeoJSON positions are `[longitude, latitude]`
fn lat_lon(index: usize, position: &[f64]) -> Result<LatLon, AssetError> {
    match position {
        [longitude, latitude, ..] => Ok(LatLon {
            latitude: *latitude,
            longitude: *longitude,
        }),
        _ => Err(AssetError::BadPosition {
            index,
            len: position.len(),
        }),
    }
}

fn geometry_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("expected a FeatureCollection but found a single {0}")]
    NotAFeatureCollection(&'static str),

    #[error("feature {index} is missing property {key}")]
    MissingProperty { index: usize, key: &'static str },

    #[error("feature {index} has no geometry")]
    MissingGeometry { index: usize },

    #[error("feature {index} has a {found} geometry, expected {expected}")]
    UnexpectedGeometry {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("feature {index} has a position with {len} coordinates")]
    BadPosition { index: usize, len: usize },
}
