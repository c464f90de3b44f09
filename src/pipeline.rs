use std::fmt;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::db::{LoadStatus, Loader};
use crate::error::{ExtractError, FetchError};
use crate::fetcher::Fetcher;
use crate::parser;
use crate::parser::transform::ResultTable;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The site refused the request. Nothing was parsed or loaded.
    Blocked,
    FetchFailed(FetchError),
    /// The page was fetched. An extraction failure leaves `table` empty and
    /// `load` as `None`: nothing reaches the destination or its run log.
    Finished {
        table: ResultTable,
        extract_error: Option<ExtractError>,
        load: Option<LoadStatus>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::Finished {
                extract_error: None,
                load: Some(load),
                ..
            } => load.is_success(),
            _ => false,
        }
    }

    pub fn table(&self) -> Option<&ResultTable> {
        match self {
            RunOutcome::Finished { table, .. } => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Blocked => write!(f, "blocked: {}", FetchError::Blocked),
            RunOutcome::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            RunOutcome::Finished {
                table,
                extract_error: Some(e),
                ..
            } => write!(f, "extraction failed: {} ({} rows, load skipped)", e, table.len()),
            RunOutcome::Finished { table, load: Some(load), .. } => {
                write!(f, "{} rows, {}", table.len(), load)
            }
            RunOutcome::Finished { table, load: None, .. } => {
                write!(f, "{} rows, load skipped", table.len())
            }
        }
    }
}

/// Fetch → extract → transform → load, strictly in sequence.
pub fn run(settings: &Settings) -> RunOutcome {
    let markup = match fetch_page(settings) {
        Ok(m) => m,
        Err(FetchError::Blocked) => {
            warn!("Run stopped: request blocked");
            return RunOutcome::Blocked;
        }
        Err(e) => {
            error!("Run stopped: {}", e);
            return RunOutcome::FetchFailed(e);
        }
    };

    let (table, extract_error) = match parser::process_page(&markup) {
        Ok(table) => (table, None),
        Err(e) => {
            match &e {
                ExtractError::UnexpectedSchema { key, path } => {
                    error!(key = %key, path = %path, "Embedded payload changed shape: {}", e)
                }
                _ => error!("Extraction failed: {}", e),
            }
            (ResultTable::empty(), Some(e))
        }
    };

    let load = if extract_error.is_some() {
        warn!("Load skipped: extraction failed");
        None
    } else {
        Some(Loader::new(settings.warehouse.clone()).load(&table))
    };
    let outcome = RunOutcome::Finished {
        table,
        extract_error,
        load,
    };
    info!(success = outcome.is_success(), "Run finished: {}", outcome);
    outcome
}

fn fetch_page(settings: &Settings) -> Result<String, FetchError> {
    let headers = settings.fetch.headers()?;
    let fetcher = Fetcher::new(&settings.fetch)?;
    fetcher.fetch(&settings.fetch.url, &headers)
}
