use serde::Serialize;

/// A live vehicle position. Rebuilt from scratch on every feed fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bus {
    pub bus_id: String,
    /// Vehicle label painted on the bus. Usually equal to the id.
    pub label: String,
    /// Feed route code like "7A-in". Starts with the numeric route prefix.
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
}
