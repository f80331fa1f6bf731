//! EMT Madrid CLI
//!
//! Command-line access to the EMT bus API: arrivals, nearby stops, line
//! details and node metadata, printed as JSON.

#![allow(clippy::print_stdout)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use integration_emt::{
    DirectionTokens, EmtClient, EmtConfig, EmtHttpClient, Location, StopIds,
};
use serde::Serialize;
use tracing::debug;

/// EMT Madrid bus API CLI
#[derive(Debug, Parser)]
#[command(name = "emt-cli")]
#[command(author, version, about = "EMT Madrid bus API CLI", long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// EMT client identifier
    #[arg(long, env = "EMT_APP_ID", hide_env_values = true)]
    pub client_id: String,

    /// EMT passkey
    #[arg(long, env = "EMT_PASSKEY", hide_env_values = true)]
    pub passkey: String,

    /// Override the API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Skip the stop existence check before fetching arrivals
    #[arg(long)]
    pub no_stop_check: bool,

    /// Use the older "A"/"B" direction tokens instead of "1"/"2"
    #[arg(long)]
    pub legacy_directions: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Buses approaching a stop
    Arrivals {
        /// Stop id
        stop: String,
    },

    /// Check whether a stop exists
    Exists {
        /// Stop id
        stop: String,
    },

    /// Stops around a position
    Nearby {
        /// Latitude in degrees
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        /// Longitude in degrees
        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        /// Search radius in meters
        #[arg(short, long, default_value_t = 200)]
        radius: u32,
    },

    /// Details and stops of a line
    Line {
        /// Line code
        line: String,

        /// Direction token
        #[arg(short, long)]
        direction: Option<String>,
    },

    /// Node metadata for stops (all nodes when none are given)
    Nodes {
        /// Stop ids
        stops: Vec<String>,
    },
}

impl Cli {
    /// Build the client configuration from the global flags
    #[must_use]
    pub fn config(&self) -> EmtConfig {
        let mut config = EmtConfig::new(self.client_id.clone(), self.passkey.clone())
            .with_stop_check(!self.no_stop_check);
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        if self.legacy_directions {
            config = config.with_direction_tokens(DirectionTokens::legacy());
        }
        config
    }
}

/// Determine log filter level from verbosity count
#[must_use]
pub const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute the parsed command
///
/// # Errors
///
/// Returns an error if the client cannot be built or the API call fails.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    debug!(?config, "Starting EMT client");
    let client = EmtHttpClient::new(&config).context("invalid EMT configuration")?;

    match cli.command {
        Commands::Arrivals { stop } => {
            let arrivals = client
                .incoming_buses(stop.as_str().into())
                .await
                .with_context(|| format!("fetching arrivals for stop {stop}"))?;
            print_json(&arrivals)?;
        },

        Commands::Exists { stop } => {
            let exists = client.stop_exists(stop.as_str().into()).await?;
            print_json(&exists)?;
        },

        Commands::Nearby {
            latitude,
            longitude,
            radius,
        } => {
            let stops = client
                .stops_from_location(Location::new(latitude, longitude), radius)
                .await
                .context("searching nearby stops")?;
            print_json(&stops)?;
        },

        Commands::Line { line, direction } => {
            let details = client
                .stops_on_line(&line, direction.as_deref())
                .await
                .with_context(|| format!("fetching line {line}"))?;
            print_json(&details)?;
        },

        Commands::Nodes { stops } => {
            let nodes = client
                .nodes_lines(StopIds::from(stops))
                .await
                .context("fetching node metadata")?;
            print_json(&nodes)?;
        },
    }

    Ok(())
}
