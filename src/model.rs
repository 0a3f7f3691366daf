pub mod bus;
pub mod bus_route;
pub mod bus_stop;
pub mod db_model;
pub mod hrm_api_model;

pub use bus::Bus;
pub use bus_route::{BusRoute, LatLon};
pub use bus_stop::{Accessibility, BusStop};
pub use db_model::SavedRouteDb;
