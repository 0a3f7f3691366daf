//! Joins buses to routes and filters the route picker
use itertools::Itertools;
use serde::Serialize;

use crate::{
    model::{Bus, BusRoute},
    utils::contains_ignore_case,
};

/// What the map shows after a route is picked
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RouteSelection {
    pub displayed_routes: Vec<BusRoute>,
    pub displayed_buses: Vec<Bus>,
}

/// Shows the route and every bus whose route id starts with the route's numeric prefix.
///
/// All variants of a route share a prefix, so picking 7a also shows the 7b buses.
/// A route number without leading digits has an empty prefix and matches every bus
/// with a non-empty route id.
pub fn select_route(route: &BusRoute, all_buses: &[Bus]) -> RouteSelection {
    RouteSelection {
        displayed_buses: buses_on_route(route, all_buses),
        displayed_routes: vec![route.clone()],
    }
}

pub fn buses_on_route(route: &BusRoute, all_buses: &[Bus]) -> Vec<Bus> {
    let prefix = route.prefix();

    all_buses
        .iter()
        .filter(|bus| !bus.route_id.is_empty() && bus.route_id.starts_with(prefix))
        .cloned()
        .collect_vec()
}

/// Keeps routes whose number or title contains the query, ignoring case
pub fn filter_routes(routes: &[BusRoute], query: &str) -> Vec<BusRoute> {
    routes
        .iter()
        .filter(|route| {
            contains_ignore_case(&route.route_num, query) || contains_ignore_case(&route.title, query)
        })
        .cloned()
        .collect_vec()
}

/// Resolves a saved route number back to its route
pub fn find_route<'a>(routes: &'a [BusRoute], route_num: &str) -> Option<&'a BusRoute> {
    routes.iter().find(|route| route.route_num == route_num)
}
