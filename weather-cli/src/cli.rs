use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Select};
use weather_core::{
    Config, FileStore, Geolocator, IpGeolocator, LocationStore, OpenWeatherProvider, UnitSystem,
    WeatherController,
};

use crate::{interactive, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and default preferences.
    Configure,

    /// Show current conditions and the 5-day forecast.
    ///
    /// Without a location, the last successful search is repeated.
    Show {
        /// City name, e.g. "London".
        city: Option<String>,

        /// Latitude in decimal degrees.
        #[arg(long, requires = "lon", allow_hyphen_values = true, conflicts_with = "city")]
        lat: Option<f64>,

        /// Longitude in decimal degrees.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Use the current location.
        #[arg(long, conflicts_with_all = ["city", "lat", "lon"])]
        here: bool,

        /// metric or imperial; defaults to the configured unit system.
        #[arg(long, value_parser = parse_units)]
        units: Option<UnitSystem>,

        /// Print the session state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the last successful search.
    Last,

    /// Forget the last successful search.
    Clear,

    /// Search, toggle units and locate yourself from a menu.
    Interactive {
        #[arg(long, value_parser = parse_units)]
        units: Option<UnitSystem>,
    },
}

fn parse_units(value: &str) -> Result<UnitSystem, String> {
    UnitSystem::try_from(value).map_err(|e| e.to_string())
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure => configure(config),
            Command::Show {
                city,
                lat,
                lon,
                here,
                units,
                json,
            } => {
                let ctl = build_controller(&config, units)?;

                match (city, lat.zip(lon)) {
                    (Some(city), _) => ctl.search_by_name(&city).await,
                    (None, Some((lat, lon))) => ctl.search_by_coords(lat, lon).await,
                    (None, None) if here => ctl.use_current_location().await,
                    (None, None) => {
                        if ctl.snapshot().active_location.is_none() {
                            bail!("No previous search. Pass a city, --lat/--lon or --here.");
                        }
                        ctl.refresh().await;
                    }
                }
                ctl.wait_for_forecast().await;

                let state = ctl.snapshot();
                if json {
                    println!("{}", serde_json::to_string_pretty(&state)?);
                } else {
                    print!("{}", render::render_state(&state));
                }

                match state.error {
                    Some(error) => Err(anyhow!(error)),
                    None => Ok(()),
                }
            }
            Command::Last => {
                let store = FileStore::new(Config::last_search_path()?);
                match store.load() {
                    Some(location) => println!("{}", render::describe_last(&location)),
                    None => println!("No saved search."),
                }
                Ok(())
            }
            Command::Clear => {
                let ctl = build_controller(&config, None)?;
                ctl.clear_last_search();
                println!("Cleared last search.");
                Ok(())
            }
            Command::Interactive { units } => {
                let ctl = build_controller(&config, units)?;
                interactive::run(&ctl).await
            }
        }
    }
}

/// Wire the controller to OpenWeather, the on-disk store and IP geolocation.
fn build_controller(
    config: &Config,
    units: Option<UnitSystem>,
) -> anyhow::Result<WeatherController> {
    let mut provider = OpenWeatherProvider::new(config.resolve_api_key());
    if let Some(url) = &config.api_base_url {
        provider = provider.with_base_url(url.as_str());
    }

    let store = FileStore::new(Config::last_search_path()?);

    let geolocator: Option<Arc<dyn Geolocator>> = if config.geolocation {
        Some(Arc::new(IpGeolocator::new()))
    } else {
        None
    };

    let units = units.unwrap_or(config.units);
    tracing::debug!(%units, geolocation = config.geolocation, "Starting weather session");

    Ok(WeatherController::new(
        Arc::new(provider),
        Arc::new(store),
        geolocator,
        units,
    ))
}

fn configure(mut config: Config) -> anyhow::Result<()> {
    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_help_message("Leave empty to keep using the OPENWEATHER_API_KEY environment variable")
        .prompt()
        .context("Failed to read API key")?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key);
    }

    let options = vec![UnitSystem::Metric, UnitSystem::Imperial];
    let start = options.iter().position(|u| *u == config.units).unwrap_or(0);
    config.units = Select::new("Default units:", options)
        .with_starting_cursor(start)
        .prompt()
        .context("Failed to read unit system")?;

    config.geolocation = Confirm::new("Allow locating you by IP address?")
        .with_default(config.geolocation)
        .prompt()
        .context("Failed to read geolocation preference")?;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}
