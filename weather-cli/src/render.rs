//! Plain-text rendering of a session.

use std::fmt::Write;

use chrono::{Local, TimeZone};
use weather_core::{CurrentConditions, ForecastDay, LocationQuery, SessionState, UnitSystem};

fn degrees(value: f64, units: UnitSystem) -> String {
    format!("{}{}", value.round() as i64, units.temperature_suffix())
}

pub fn render_state(state: &SessionState) -> String {
    let mut out = String::new();

    if state.loading {
        out.push_str("Loading...\n");
    }
    if let Some(conditions) = &state.conditions {
        out.push_str(&render_conditions(conditions, state.units));
    }
    if let Some(days) = state.forecast.as_deref().filter(|d| !d.is_empty()) {
        out.push('\n');
        out.push_str(&render_forecast_in(days, state.units, &Local));
    }

    out
}

pub fn render_conditions(c: &CurrentConditions, units: UnitSystem) -> String {
    let mut out = String::new();

    let place = match &c.country {
        Some(country) => format!("{}, {}", c.location_name, country),
        None => c.location_name.clone(),
    };
    writeln!(out, "{place}").ok();

    let mut headline = degrees(c.temperature, units);
    if let Some(desc) = &c.description {
        write!(headline, "  {desc}").ok();
    }
    if let Some(icon) = &c.icon {
        write!(headline, " ({icon})").ok();
    }
    writeln!(out, "{headline}").ok();

    writeln!(
        out,
        "Feels: {}  Humidity: {}%  Wind: {} {}",
        degrees(c.feels_like, units),
        c.humidity_pct,
        c.wind_speed,
        units.wind_unit()
    )
    .ok();

    out
}

/// One line per day: weekday, max / min, description.
pub fn render_forecast_in<Tz: TimeZone>(days: &[ForecastDay], units: UnitSystem, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    for day in days {
        let weekday = day.date.with_timezone(tz).format("%a");
        writeln!(
            out,
            "{weekday}  {} / {}  {}",
            degrees(day.max, units),
            degrees(day.min, units),
            day.description.as_deref().unwrap_or("")
        )
        .ok();
    }
    out
}

pub fn describe_last(location: &LocationQuery) -> String {
    format!("Last: {location}")
}
