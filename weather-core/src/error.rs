/// Environment variable holding the OpenWeather credential.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Errors produced while looking up weather or locating the user.
///
/// None of these are fatal: the session controller turns every variant into
/// a message via [`WeatherError::user_message`] except `ForecastUnavailable`,
/// which is only logged.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("no OpenWeather API key configured")]
    MissingCredential,

    #[error("location not found")]
    LocationNotFound { by_coords: bool },

    #[error("geolocation denied: {0}")]
    GeolocationDenied(String),

    #[error("geolocation is not available")]
    GeolocationUnsupported,

    #[error("forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl WeatherError {
    /// Message shown to the user in the session's error field.
    pub fn user_message(&self) -> String {
        match self {
            WeatherError::MissingCredential => {
                format!("Missing API key. Set {API_KEY_ENV} or run `weather configure`.")
            }
            WeatherError::LocationNotFound { by_coords: false } => "City not found".to_string(),
            WeatherError::LocationNotFound { by_coords: true } => "Location not found".to_string(),
            WeatherError::GeolocationDenied(reason) if !reason.trim().is_empty() => reason.clone(),
            WeatherError::GeolocationDenied(_) => "Unable to retrieve your location.".to_string(),
            WeatherError::GeolocationUnsupported => {
                "Geolocation not supported by your browser.".to_string()
            }
            WeatherError::ForecastUnavailable(reason) => format!("Forecast unavailable: {reason}"),
            WeatherError::Network(e) => format!("Network error: {e}"),
            WeatherError::Parse(_) => "Unexpected response from weather service".to_string(),
        }
    }
}
