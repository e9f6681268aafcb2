//! Menu-driven session: the terminal counterpart of the search page.

use std::fmt;

use anyhow::Context;
use inquire::{InquireError, Select, Text};
use weather_core::WeatherController;

use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Search,
    UseMyLocation,
    ToggleUnits,
    SearchAgain,
    ClearLast,
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Search => "Search city",
            Action::UseMyLocation => "Use my location",
            Action::ToggleUnits => "Toggle units",
            Action::SearchAgain => "Search again",
            Action::ClearLast => "Clear last search",
            Action::Quit => "Quit",
        })
    }
}

fn menu(has_last: bool) -> Vec<Action> {
    let mut actions = vec![Action::Search, Action::UseMyLocation, Action::ToggleUnits];
    if has_last {
        actions.extend([Action::SearchAgain, Action::ClearLast]);
    }
    actions.push(Action::Quit);
    actions
}

pub async fn run(ctl: &WeatherController) -> anyhow::Result<()> {
    loop {
        let state = ctl.snapshot();
        if let Some(last) = &state.active_location {
            println!("{}", render::describe_last(last));
        }

        let prompt = format!("Units: {}", state.units.temperature_suffix());
        let action = match Select::new(&prompt, menu(state.active_location.is_some())).prompt() {
            Ok(action) => action,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(e) => return Err(e).context("Failed to read menu selection"),
        };

        match action {
            Action::Search => {
                let city = Text::new("City:")
                    .with_placeholder("e.g. London")
                    .with_initial_value(&state.current_query)
                    .prompt()
                    .context("Failed to read city")?;
                ctl.set_query(city);
                ctl.submit().await;
            }
            Action::UseMyLocation => ctl.use_current_location().await,
            Action::ToggleUnits => ctl.toggle_units().await,
            Action::SearchAgain => ctl.refresh().await,
            Action::ClearLast => ctl.clear_last_search(),
            Action::Quit => break,
        }

        ctl.wait_for_forecast().await;

        let state = ctl.snapshot();
        print!("{}", render::render_state(&state));
        if let Some(error) = &state.error {
            eprintln!("{error}");
        }
        println!();
    }

    Ok(())
}
