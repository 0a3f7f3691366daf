pub mod bus_fetcher;
pub mod map_screen;

pub use bus_fetcher::{BusFeed, FetchBusesError, HttpBusFeed, fetch_buses_or_empty};
pub use map_screen::{
    FetchStatus, MapScreen, ScreenClosed, ScreenData, ScreenSnapshot,
    ZeroRefreshInterval,
};
