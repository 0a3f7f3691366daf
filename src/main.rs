use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use itertools::Itertools;
use myway_transit::{
    app_context::AppContext,
    assets::{load_bus_routes, try_load_bus_routes},
    background_services::{
        FetchStatus, HttpBusFeed, MapScreen, ScreenData, ScreenSnapshot, fetch_buses_or_empty,
    },
    config::{Cli, Command, Config, ProfileCommand, SavedCommand, SettingsCommand},
    dal,
    route_matcher::{buses_on_route, filter_routes, find_route},
};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::path::Path;
use std::time::Duration;
use tokio::{select, signal};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();
    let cli = Cli::parse();

    let (_guard, provider) = init_tracing(&cli.config)?;

    let pool = dal::connect(&cli.config.database_url).await?;
    let context = AppContext::init(cli.config, pool).await?;

    let result = match cli.command.unwrap_or_default() {
        Command::Watch { route } => watch(&context, route).await,
        Command::Buses { route } => buses(&context, route).await,
        Command::Routes { search } => list_routes(&context, search.as_deref()).await,
        Command::Saved { command } => saved(&context, command).await,
        Command::Settings { command } => settings(&context, command).await,
        Command::Profile { command } => profile(&context, command).await,
    };

    if let Err(e) = &result {
        error!("{e:?}");
    }

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("error shutting down the tracer provider: {e}");
        }
    }

    result
}

fn init_tracing(config: &Config) -> Result<(WorkerGuard, Option<SdkTracerProvider>)> {
    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_timeout(Duration::from_millis(1000))
                .with_endpoint(endpoint)
                .build()
                .context("Error building the OTLP exporter")?;

            Some(
                SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .with_resource(Resource::builder().with_service_name("myway_transit").build())
                    .build(),
            )
        }
        None => None,
    };

    let telemetry_layer = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer("myway_transit")));

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let (non_blocking_appender, guard) =
        tracing_appender::non_blocking(log_appender(&config.log_dir)?);

    // A layer that logs events to rolling files.
    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    let stderr_log = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    Registry::default()
        .with(telemetry_layer)
        .with(file_log)
        .with(stderr_log)
        .with(env_filter)
        .init();

    Ok((guard, provider))
}

fn log_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("myway_transit.log")
        .build(log_dir)
        .with_context(|| format!("Couldn't open log directory {}", log_dir.display()))
}

/// Opens a map screen and logs what it shows until Ctrl-C
async fn watch(context: &AppContext, route: Option<String>) -> Result<()> {
    let config = context.config();
    let feed = HttpBusFeed::new(&config.feed_base_url, config.request_timeout())?;
    let data = ScreenData::load(&config.bus_stops_path, &config.routes_path).await;

    info!(
        "showing {} bus stops, {} routes",
        data.bus_stops.len(),
        data.routes.len()
    );

    info!(url = feed.url(), "following the bus feed");
    let screen = MapScreen::open(feed, data, config.refresh_interval()).await?;

    if let Some(route_num) = route {
        screen.select_route_num(route_num).await?;
    }

    let mut snapshots = screen.subscribe();
    let mut dark_mode = context.watch_dark_mode();
    log_snapshot(&snapshots.borrow_and_update());

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        select! {
            _ = &mut ctrl_c => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("map screen stopped on its own");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log_snapshot(&snapshot);
            }
            changed = dark_mode.changed() => {
                if changed.is_ok() {
                    info!(dark_mode = *dark_mode.borrow_and_update(), "theme changed");
                }
            }
        }
    }

    info!("closing map screen");
    screen.close().await;

    Ok(())
}

fn log_snapshot(snapshot: &ScreenSnapshot) {
    match &snapshot.last_fetch {
        Some(FetchStatus::Failed { at, reason }) => {
            warn!("buses unavailable since {at}: {reason}")
        }
        Some(FetchStatus::Succeeded { at, bus_count }) => {
            info!("{bus_count} buses in service at {at}")
        }
        None => {}
    }

    for route in &snapshot.displayed.displayed_routes {
        info!(
            "route {}: {} ({} segments)",
            route.route_num,
            route.title,
            route.segments.len()
        );
    }

    for bus in &snapshot.displayed.displayed_buses {
        info!(
            latitude = bus.latitude,
            longitude = bus.longitude,
            "Bus {} on route {}",
            bus.bus_id,
            bus.route_id
        );
    }
}

/// One fetch, printed. A failed fetch prints no buses.
async fn buses(context: &AppContext, route: Option<String>) -> Result<()> {
    let config = context.config();
    let feed = HttpBusFeed::new(&config.feed_base_url, config.request_timeout())?;
    info!(url = feed.url(), "fetching buses");

    let mut buses = fetch_buses_or_empty(&feed).await;

    if let Some(route_num) = route {
        let routes = try_load_bus_routes(&config.routes_path).await?;
        let Some(route) = find_route(&routes, &route_num) else {
            bail!("there is no route {route_num}");
        };
        buses = buses_on_route(route, &buses);
    }

    for bus in &buses {
        println!(
            "{} {:>8} ({:.5}, {:.5})",
            bus.bus_id, bus.route_id, bus.latitude, bus.longitude
        );
    }
    println!("{} buses", buses.len());

    Ok(())
}

async fn list_routes(context: &AppContext, search: Option<&str>) -> Result<()> {
    let routes = load_bus_routes(&context.config().routes_path).await;
    let saved_routes = dal::get_all_saved_routes(context.pool()).await?;

    println!("Saved Routes");
    for saved in &saved_routes {
        println!("  [{}] {}: {}", saved.id, saved.route_num, saved.route_title);
    }

    println!("All Routes");
    for route in filter_routes(&routes, search.unwrap_or_default()) {
        let star = if saved_routes.iter().any(|s| s.is_for(&route)) {
            "*"
        } else {
            " "
        };
        println!(" {star}{}: {}", route.route_num, route.title);
    }

    Ok(())
}

async fn saved(context: &AppContext, command: SavedCommand) -> Result<()> {
    match command {
        SavedCommand::List => {
            let saved_routes = dal::get_all_saved_routes(context.pool()).await?;
            println!(
                "{}",
                saved_routes
                    .iter()
                    .map(|s| format!("[{}] {}: {}", s.id, s.route_num, s.route_title))
                    .join("\n")
            );
        }
        SavedCommand::Add { route_num } => {
            let routes = try_load_bus_routes(&context.config().routes_path).await?;
            let Some(route) = find_route(&routes, &route_num) else {
                bail!("there is no route {route_num}");
            };
            let saved = dal::insert_saved_route(&route.route_num, &route.title, context.pool()).await?;
            println!("saved [{}] {}: {}", saved.id, saved.route_num, saved.route_title);
        }
        SavedCommand::Remove { id } => {
            if !dal::delete_saved_route(id, context.pool()).await? {
                bail!("there is no saved route with id {id}");
            }
            println!("removed saved route {id}");
        }
    }

    Ok(())
}

async fn settings(context: &AppContext, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => {
            println!("dark mode: {}", context.is_dark_mode());
        }
        SettingsCommand::DarkMode { enabled } => {
            context.set_dark_mode(enabled).await?;
            println!("dark mode: {enabled}");
        }
    }

    Ok(())
}

async fn profile(context: &AppContext, command: ProfileCommand) -> Result<()> {
    let data_dir: &Path = &context.config().data_dir;

    match command {
        ProfileCommand::Show => {
            println!("Hi, {}", dal::get_user_name(context.pool()).await?);
            match dal::get_profile_picture_path(data_dir, context.pool()).await? {
                Some(path) => println!("profile picture: {}", path.display()),
                None => println!("no profile picture"),
            }
        }
        ProfileCommand::Name { name } => {
            dal::set_user_name(&name, context.pool()).await?;
            println!("Hi, {name}");
        }
        ProfileCommand::Picture { path } => {
            let saved = dal::set_profile_picture(&path, data_dir, context.pool()).await?;
            println!("profile picture: {}", saved.display());
        }
    }

    Ok(())
}
