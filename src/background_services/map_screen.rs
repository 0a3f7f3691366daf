//! The map screen: owns what is displayed and keeps the buses fresh.
//!
//! All screen state lives in one spawned task. Route selection, search changes and refresh
//! ticks are handled one after another by that task, and every change is published as a
//! [`ScreenSnapshot`] through a watch channel.
use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    select, spawn,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{Instrument, error, info, info_span, warn};

use super::bus_fetcher::{BusFeed, FetchBusesError};
use crate::{
    assets::{load_bus_routes, load_bus_stops},
    model::{Bus, BusRoute, BusStop},
    route_matcher::{RouteSelection, filter_routes, find_route, select_route},
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(7);

/// Static data the screen is opened with
#[derive(Clone, Debug, Default)]
pub struct ScreenData {
    pub bus_stops: Vec<BusStop>,
    pub routes: Vec<BusRoute>,
}

impl ScreenData {
    /// Loads both assets concurrently. A broken asset is logged and comes back empty.
    pub async fn load(bus_stops_path: &Path, routes_path: &Path) -> Self {
        let (bus_stops, routes) =
            tokio::join!(load_bus_stops(bus_stops_path), load_bus_routes(routes_path));

        ScreenData { bus_stops, routes }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchStatus {
    Succeeded { at: DateTime<Utc>, bus_count: usize },
    Failed { at: DateTime<Utc>, reason: String },
}

/// Everything the presentation layer draws
#[derive(Clone, Debug)]
pub struct ScreenSnapshot {
    pub bus_stops: Arc<[BusStop]>,
    /// Route list after the search filter
    pub route_picker: Vec<BusRoute>,
    pub search_query: String,
    pub selected_route: Option<String>,
    pub displayed: RouteSelection,
    /// `None` until the first fetch finishes
    pub last_fetch: Option<FetchStatus>,
}

#[derive(Clone, Debug, PartialEq)]
enum ScreenState {
    /// Only bus stops are shown
    Idle,
    Filtered(BusRoute),
}

/// The screen state machine, without any I/O
#[derive(Debug)]
pub(crate) struct ScreenModel {
    bus_stops: Arc<[BusStop]>,
    routes: Vec<BusRoute>,
    buses: Vec<Bus>,
    state: ScreenState,
    search_query: String,
    route_picker: Vec<BusRoute>,
    displayed: RouteSelection,
    last_fetch: Option<FetchStatus>,
}

impl ScreenModel {
    pub(crate) fn new(data: ScreenData) -> Self {
        ScreenModel {
            bus_stops: data.bus_stops.into(),
            route_picker: data.routes.clone(),
            routes: data.routes,
            buses: vec![],
            state: ScreenState::Idle,
            search_query: String::new(),
            displayed: RouteSelection::default(),
            last_fetch: None,
        }
    }

    pub(crate) fn select_route(&mut self, route: BusRoute) {
        info!(route_num = %route.route_num, "route selected");
        self.state = ScreenState::Filtered(route);
        self.recompute_displayed();
    }

    /// Returns false if no route has that number
    pub(crate) fn select_route_num(&mut self, route_num: &str) -> bool {
        match find_route(&self.routes, route_num) {
            Some(route) => {
                let route = route.clone();
                self.select_route(route);
                true
            }
            None => {
                warn!(route_num, "can't select unknown route");
                false
            }
        }
    }

    pub(crate) fn clear_selection(&mut self) {
        self.state = ScreenState::Idle;
        self.recompute_displayed();
    }

    pub(crate) fn set_search_query(&mut self, query: String) {
        self.route_picker = filter_routes(&self.routes, &query);
        self.search_query = query;
    }

    /// The bus list is replaced wholesale. A failed fetch leaves no buses.
    pub(crate) fn replace_buses(&mut self, fetched: Result<Vec<Bus>, FetchBusesError>) {
        let at = Utc::now();

        match fetched {
            Ok(buses) => {
                self.last_fetch = Some(FetchStatus::Succeeded {
                    at,
                    bus_count: buses.len(),
                });
                self.buses = buses;
            }
            Err(e) => {
                error!("Error fetching buses: {e}");
                self.last_fetch = Some(FetchStatus::Failed {
                    at,
                    reason: e.to_string(),
                });
                self.buses = vec![];
            }
        }

        self.recompute_displayed();
    }

    fn recompute_displayed(&mut self) {
        self.displayed = match &self.state {
            ScreenState::Idle => RouteSelection::default(),
            ScreenState::Filtered(route) => select_route(route, &self.buses),
        };
    }

    pub(crate) fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            bus_stops: self.bus_stops.clone(),
            route_picker: self.route_picker.clone(),
            search_query: self.search_query.clone(),
            selected_route: match &self.state {
                ScreenState::Idle => None,
                ScreenState::Filtered(route) => Some(route.route_num.clone()),
            },
            displayed: self.displayed.clone(),
            last_fetch: self.last_fetch.clone(),
        }
    }
}

#[derive(Debug)]
enum ScreenCommand {
    SelectRoute(BusRoute),
    SelectRouteNum(String),
    ClearSelection,
    SetSearchQuery(String),
    Close,
}

/// Handle to a running map screen.
///
/// The refresh task stops when [`MapScreen::close`] is awaited or the handle is dropped.
#[derive(Debug)]
pub struct MapScreen {
    commands: mpsc::Sender<ScreenCommand>,
    snapshots: watch::Receiver<ScreenSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl MapScreen {
    /// Fetches the buses once and starts refreshing them every `refresh_interval`
    pub async fn open<F: BusFeed>(
        feed: F,
        data: ScreenData,
        refresh_interval: Duration,
    ) -> Result<Self, ZeroRefreshInterval> {
        if refresh_interval.is_zero() {
            return Err(ZeroRefreshInterval);
        }

        let mut model = ScreenModel::new(data);
        model.replace_buses(
            feed.fetch_buses()
                .instrument(info_span!("Initial bus fetch"))
                .await,
        );

        let (snapshot_sender, snapshots) = watch::channel(model.snapshot());
        let (commands, command_receiver) = mpsc::channel(32);

        let task = spawn(
            run_screen(model, feed, command_receiver, snapshot_sender, refresh_interval)
                .instrument(info_span!("map_screen")),
        );

        Ok(MapScreen {
            commands,
            snapshots,
            task: Some(task),
        })
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenSnapshot> {
        self.snapshots.clone()
    }

    pub async fn select_route(&self, route: BusRoute) -> Result<(), ScreenClosed> {
        self.send(ScreenCommand::SelectRoute(route)).await
    }

    /// Selects by route number, e.g. from a saved route. Unknown numbers are ignored.
    pub async fn select_route_num(&self, route_num: impl Into<String>) -> Result<(), ScreenClosed> {
        self.send(ScreenCommand::SelectRouteNum(route_num.into()))
            .await
    }

    pub async fn clear_selection(&self) -> Result<(), ScreenClosed> {
        self.send(ScreenCommand::ClearSelection).await
    }

    pub async fn set_search_query(&self, query: impl Into<String>) -> Result<(), ScreenClosed> {
        self.send(ScreenCommand::SetSearchQuery(query.into())).await
    }

    /// Stops the refresh task and waits for it to finish. No fetch starts after this returns.
    pub async fn close(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if self.commands.send(ScreenCommand::Close).await.is_err() {
            task.abort();
        }

        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!("map screen task failed: {e}");
            }
        }
    }

    async fn send(&self, command: ScreenCommand) -> Result<(), ScreenClosed> {
        self.commands.send(command).await.map_err(|_| ScreenClosed)
    }
}

impl Drop for MapScreen {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_screen<F: BusFeed>(
    mut model: ScreenModel,
    feed: F,
    mut commands: mpsc::Receiver<ScreenCommand>,
    snapshots: watch::Sender<ScreenSnapshot>,
    refresh_interval: Duration,
) {
    let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            command = commands.recv() => match command {
                Some(ScreenCommand::SelectRoute(route)) => model.select_route(route),
                Some(ScreenCommand::SelectRouteNum(route_num)) => {
                    model.select_route_num(&route_num);
                }
                Some(ScreenCommand::ClearSelection) => model.clear_selection(),
                Some(ScreenCommand::SetSearchQuery(query)) => model.set_search_query(query),
                Some(ScreenCommand::Close) | None => break,
            },
            _ = ticker.tick() => {
                let fetched = feed
                    .fetch_buses()
                    .instrument(info_span!("Refreshing buses"))
                    .await;
                model.replace_buses(fetched);
                info!(
                    displayed_buses = model.displayed.displayed_buses.len(),
                    "buses refreshed"
                );
            }
        }

        snapshots.send_replace(model.snapshot());
    }

    info!("map screen closed");
}

#[derive(thiserror::Error, Debug)]
#[error("the map screen is closed")]
pub struct ScreenClosed;

#[derive(thiserror::Error, Debug)]
#[error("the refresh interval must be longer than zero")]
pub struct ZeroRefreshInterval;

#[cfg(test)]
mod tests {
    use super::{FetchStatus, MapScreen, ScreenData, ScreenModel, ScreenSnapshot};
    use crate::{
        background_services::bus_fetcher::{BusFeed, FetchBusesError},
        model::{Accessibility, Bus, BusRoute, BusStop, hrm_api_model::HrmBusResponse},
    };
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use itertools::Itertools;
    use tokio::time::Instant;

    type Fetch = Result<Vec<Bus>, FetchBusesError>;

    /// Plays back fetch results in order, then returns no buses
    #[derive(Clone, Default)]
    struct ScriptedFeed {
        script: Arc<Mutex<VecDeque<Fetch>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Fetch>) -> Self {
            ScriptedFeed {
                script: Arc::new(Mutex::new(script.into())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BusFeed for ScriptedFeed {
        async fn fetch_buses(&self) -> Fetch {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(vec![]))
        }
    }

    fn parse_failure() -> FetchBusesError {
        let body = "<html>502 Bad Gateway</html>".to_string();
        FetchBusesError::ParsingError {
            source: serde_json::from_str::<HrmBusResponse>(&body).unwrap_err(),
            body,
        }
    }

    fn displayed_bus_ids(snapshot: &ScreenSnapshot) -> Vec<&str> {
        snapshot
            .displayed
            .displayed_buses
            .iter()
            .map(|bus| bus.bus_id.as_str())
            .collect_vec()
    }

    fn bus(bus_id: &str, route_id: &str) -> Bus {
        Bus {
            bus_id: bus_id.to_string(),
            label: bus_id.to_string(),
            route_id: route_id.to_string(),
            latitude: 44.65,
            longitude: -63.58,
        }
    }

    fn route(route_num: &str, title: &str) -> BusRoute {
        BusRoute {
            route_num: route_num.to_string(),
            title: title.to_string(),
            segments: vec![],
        }
    }

    fn data() -> ScreenData {
        ScreenData {
            bus_stops: vec![BusStop {
                id: "8301".to_string(),
                name: "Barrington St".to_string(),
                accessibility: Accessibility::Accessible,
                latitude: 44.6426,
                longitude: -63.5734,
            }],
            routes: vec![route("7a", "Robie"), route("7b", "Robie via Gottingen"), route("10", "Dalhousie")],
        }
    }

    #[test]
    fn test_idle_shows_only_stops() {
        let mut model = ScreenModel::new(data());
        model.replace_buses(Ok(vec![bus("1", "7a-in"), bus("2", "10-out")]));

        let snapshot = model.snapshot();

        assert_eq!(snapshot.bus_stops.len(), 1);
        assert!(snapshot.displayed.displayed_buses.is_empty());
        assert!(snapshot.displayed.displayed_routes.is_empty());
        assert_eq!(snapshot.selected_route, None);
        assert_eq!(snapshot.route_picker.len(), 3);
    }

    #[test]
    fn test_selection_uses_current_buses() {
        let mut model = ScreenModel::new(data());
        model.replace_buses(Ok(vec![bus("1", "7a-in"), bus("2", "7b-out"), bus("3", "10-out")]));

        model.select_route(route("7b", "Robie via Gottingen"));
        let snapshot = model.snapshot();
        assert_eq!(displayed_bus_ids(&snapshot), vec!["1", "2"]);
        assert_eq!(snapshot.selected_route.as_deref(), Some("7b"));

        assert!(model.select_route_num("10"));
        assert_eq!(displayed_bus_ids(&model.snapshot()), vec!["3"]);

        assert!(!model.select_route_num("99"));
        assert_eq!(model.snapshot().selected_route.as_deref(), Some("10"));

        model.clear_selection();
        assert!(model.snapshot().displayed.displayed_buses.is_empty());
    }

    #[test]
    fn test_search_does_not_touch_the_map() {
        let mut model = ScreenModel::new(data());
        model.replace_buses(Ok(vec![bus("1", "7a-in"), bus("3", "10-out")]));
        model.select_route_num("10");

        model.set_search_query("ROBIE".to_string());
        let snapshot = model.snapshot();

        assert_eq!(
            snapshot
                .route_picker
                .iter()
                .map(|r| r.route_num.as_str())
                .collect::<Vec<_>>(),
            vec!["7a", "7b"]
        );
        assert_eq!(displayed_bus_ids(&snapshot), vec!["3"]);
    }

    #[test]
    fn test_failed_fetch_clears_buses_and_reports() {
        let mut model = ScreenModel::new(data());
        model.select_route_num("7a");
        model.replace_buses(Ok(vec![bus("1", "7a-in")]));

        model.replace_buses(Err(parse_failure()));
        let snapshot = model.snapshot();

        assert!(snapshot.displayed.displayed_buses.is_empty());
        assert!(matches!(snapshot.last_fetch, Some(FetchStatus::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_survives_failed_fetch() -> Result<(), anyhow::Error> {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![bus("1", "7a-in"), bus("2", "12x")]),
            Err(parse_failure()),
            Ok(vec![bus("4", "7b-out"), bus("5", "7a-in"), bus("6", "10-out")]),
        ]);
        let opened = Instant::now();

        let screen = MapScreen::open(feed.clone(), data(), Duration::from_secs(7)).await?;
        assert_eq!(feed.calls(), 1);

        screen.select_route_num("7a").await?;
        let mut snapshots = screen.subscribe();
        snapshots
            .wait_for(|s| s.selected_route.as_deref() == Some("7a"))
            .await?;
        assert_eq!(displayed_bus_ids(&screen.snapshot()), vec!["1"]);

        snapshots
            .wait_for(|s| matches!(s.last_fetch, Some(FetchStatus::Failed { .. })))
            .await?;
        let failed_after = opened.elapsed();
        assert!(failed_after >= Duration::from_secs(7) && failed_after < Duration::from_secs(8));
        assert_eq!(feed.calls(), 2);
        assert!(screen.snapshot().displayed.displayed_buses.is_empty());

        snapshots
            .wait_for(|s| matches!(s.last_fetch, Some(FetchStatus::Succeeded { bus_count: 3, .. })))
            .await?;
        let recovered_after = opened.elapsed();
        assert!(recovered_after >= Duration::from_secs(14) && recovered_after < Duration::from_secs(15));
        assert_eq!(feed.calls(), 3);
        assert_eq!(displayed_bus_ids(&screen.snapshot()), vec!["4", "5"]);

        screen.close().await;

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_refresh_keeps_map_empty() -> Result<(), anyhow::Error> {
        let feed = ScriptedFeed::new(vec![Ok(vec![]), Ok(vec![bus("1", "7a-in")])]);

        let screen = MapScreen::open(feed.clone(), data(), Duration::from_secs(7)).await?;
        let mut snapshots = screen.subscribe();
        snapshots
            .wait_for(|s| matches!(s.last_fetch, Some(FetchStatus::Succeeded { bus_count: 1, .. })))
            .await?;

        assert!(screen.snapshot().displayed.displayed_buses.is_empty());

        screen.close().await;

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_fetching() -> Result<(), anyhow::Error> {
        let feed = ScriptedFeed::new(vec![]);

        let screen = MapScreen::open(feed.clone(), data(), Duration::from_secs(7)).await?;
        let mut snapshots = screen.subscribe();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(feed.calls(), 3);

        screen.close().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(feed.calls(), 3);
        snapshots.borrow_and_update();
        assert!(snapshots.changed().await.is_err());

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_fetching() -> Result<(), anyhow::Error> {
        let feed = ScriptedFeed::new(vec![]);

        let screen = MapScreen::open(feed.clone(), data(), Duration::from_secs(7)).await?;
        drop(screen);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(feed.calls(), 1);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_refresh_interval_is_rejected() {
        let feed = ScriptedFeed::new(vec![]);

        let opened = MapScreen::open(feed.clone(), data(), Duration::ZERO).await;

        assert!(opened.is_err());
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_close_fail() -> Result<(), anyhow::Error> {
        let feed = ScriptedFeed::new(vec![]);
        let screen = MapScreen::open(feed, data(), Duration::from_secs(7)).await?;
        let commands = screen.commands.clone();

        screen.close().await;

        assert!(commands.send(super::ScreenCommand::ClearSelection).await.is_err());

        Ok(())
    }
}
