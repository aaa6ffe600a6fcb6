use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CollectResult, ExtractResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub collect: CollectResult,
    pub extract: Option<ExtractResult>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_collect(result: &CollectResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_extract(result: &ExtractResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log at `info`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!("{} ({:.1?})", event.message, elapsed),
            None => tracing::debug!("{}", event.message),
        }
    }
}
