//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credential resolution
//! - The OpenWeather lookup client and the provider abstraction over it
//! - Persistence of the last successful search
//! - The session controller that ties lookups, units and persistence together
//!
//! It is used by `weather-cli`, but can also be reused by other front-ends.

pub mod config;
pub mod error;
pub mod geolocation;
pub mod model;
pub mod provider;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::WeatherError;
pub use geolocation::{FixedGeolocator, Geolocator, IpGeolocator};
pub use model::{Coordinates, CurrentConditions, ForecastDay, LocationQuery, UnitSystem};
pub use provider::{OpenWeatherProvider, WeatherProvider};
pub use session::{SessionState, WeatherController};
pub use store::{FileStore, LocationStore, MemoryStore};
