use serde::Serialize;

use crate::utils::leading_digits;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusRoute {
    /// `ROUTE_NUM`, e.g. "7a"
    pub route_num: String,
    /// `TITLE`
    pub title: String,
    /// One entry per line of the MultiLineString, in file order
    pub segments: Vec<Vec<LatLon>>,
}

impl BusRoute {
    /// Leading digits of the route number. Shared by all variants of a route ("7" for 7a, 7b).
    pub fn prefix(&self) -> &str {
        leading_digits(&self.route_num)
    }
}
