//! Command-line parsing.
//!
//! ```text
//! bridge-probe [--watch <topic>]... <ws-url> <method> [params-json]
//! ```

use crate::error::ProbeError;

use common::ErrorLocation;

use std::panic::Location;

use serde_json::Value;

pub const USAGE: &str = "Usage: bridge-probe [--watch <topic>]... <ws-url> <method> [params-json]";

const WATCH_FLAG: &str = "--watch";

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeArgs {
    /// Push topics to print while the call is outstanding.
    pub watch: Vec<String>,
    pub url: String,
    pub method: String,
    /// Defaults to `null` when omitted.
    pub params: Value,
}

impl ProbeArgs {
    /// Parse arguments, excluding the program name.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Usage`] for a missing or extra positional
    /// argument, a `--watch` without a topic, an unknown flag, or params that
    /// are not valid JSON.
    pub fn parse<I>(args: I) -> Result<Self, ProbeError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut watch = Vec::new();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            if arg == WATCH_FLAG {
                let topic = args
                    .next()
                    .ok_or_else(|| usage_error(format!("{WATCH_FLAG} requires a topic")))?;
                watch.push(topic);
            } else if let Some(topic) = arg.strip_prefix("--watch=") {
                watch.push(topic.to_string());
            } else if arg.starts_with("--") {
                return Err(usage_error(format!("Unknown flag '{arg}'")));
            } else {
                positional.push(arg);
            }
        }

        let mut positional = positional.into_iter();
        let (Some(url), Some(method)) = (positional.next(), positional.next()) else {
            return Err(usage_error("Expected <ws-url> and <method>"));
        };

        let params = match positional.next() {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| usage_error(format!("params-json is not valid JSON: {e}")))?,
            None => Value::Null,
        };

        if let Some(extra) = positional.next() {
            return Err(usage_error(format!("Unexpected argument '{extra}'")));
        }

        Ok(Self {
            watch,
            url,
            method,
            params,
        })
    }
}

#[track_caller]
fn usage_error(message: impl Into<String>) -> ProbeError {
    ProbeError::Usage {
        message: format!("{}\n{USAGE}", message.into()),
        location: ErrorLocation::from(Location::caller()),
    }
}
