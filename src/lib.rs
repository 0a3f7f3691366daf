//! Core of a Halifax Transit tracker: bundled stop and route geometry, live bus positions,
//! route matching and the refreshing map screen.
pub mod app_context;
pub mod assets;
pub mod background_services;
pub mod config;
pub mod dal;
pub mod model;
pub mod route_matcher;
pub mod utils;
