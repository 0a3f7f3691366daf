use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::background_services::{
    bus_fetcher::DEFAULT_FEED_BASE_URL, map_screen::DEFAULT_REFRESH_INTERVAL,
};

#[derive(Debug, Parser)]
#[command(name = "myway_transit", version, about = "Live Halifax Transit bus positions")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings read from the command line, the environment or `.env`
#[derive(Clone, Debug, Args)]
pub struct Config {
    /// Base url of the realtime feed. `hrmbuses` is appended.
    #[arg(long, env = "FEED_BASE_URL", default_value = DEFAULT_FEED_BASE_URL)]
    pub feed_base_url: String,

    #[arg(long, env = "BUS_STOPS_PATH", default_value = "assets/busstops.geojson")]
    pub bus_stops_path: PathBuf,

    #[arg(long, env = "ROUTES_PATH", default_value = "assets/routes.geojson")]
    pub routes_path: PathBuf,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://myway_transit.db?mode=rwc")]
    pub database_url: String,

    /// Where the profile picture is kept
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(
        long,
        env = "REFRESH_INTERVAL_SECS",
        default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub refresh_interval_secs: u64,

    #[arg(
        long,
        env = "REQUEST_TIMEOUT_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_secs: u64,

    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Spans are exported over OTLP/gRPC when set
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Follow live buses until Ctrl-C
    Watch {
        /// Route number to show, e.g. 7a
        #[arg(long)]
        route: Option<String>,
    },
    /// Fetch the buses once and print them
    Buses {
        /// Only buses on this route, e.g. 7a
        #[arg(long)]
        route: Option<String>,
    },
    /// List routes and saved routes
    Routes {
        #[arg(long)]
        search: Option<String>,
    },
    /// Manage saved routes
    Saved {
        #[command(subcommand)]
        command: SavedCommand,
    },
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Watch { route: None }
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum SavedCommand {
    List,
    Add { route_num: String },
    Remove { id: i64 },
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum SettingsCommand {
    Show,
    DarkMode {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum ProfileCommand {
    Show,
    Name { name: String },
    /// Image file to use as the profile picture
    Picture { path: PathBuf },
}
