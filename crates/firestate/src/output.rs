//! Output formatting: one JSON object per state transition.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use firestate_core::DataState;

/// One printed state transition.
#[derive(Debug, Serialize)]
pub struct StateLine<'a> {
    pub step: &'a str,
    pub loading: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Option<Value>,
}

impl<'a> StateLine<'a> {
    pub fn new<T: Serialize>(
        step: &'a str,
        state: &DataState<T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            step,
            loading: state.loading(),
            failed: state.failed(),
            error: state.error().map(ToString::to_string),
            data: state.data().map(serde_json::to_value).transpose()?,
        })
    }
}

/// Print `state` as a compact JSON line on stdout.
pub fn print_state<T: Serialize>(
    step: &str,
    state: &DataState<T>,
) -> Result<(), crate::error::CliError> {
    let line = serde_json::to_string(&StateLine::new(step, state)?)?;
    print_line(&line);
    Ok(())
}

/// Render any serde-serializable value as JSON.
pub fn render_json<T: Serialize + ?Sized>(
    data: &T,
    pretty: bool,
) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    }
}

pub fn print_line(output: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
