use std::time::Instant;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Single-shot page fetcher. No retries; redirects follow the client defaults.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Fetcher, FetchError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Fetcher { client })
    }

    /// GET `url` and return the body text. A 403 is reported as
    /// [`FetchError::Blocked`] so the caller can stop before parsing.
    pub fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, FetchError> {
        info!("Fetching category page: {}", url);
        let start = Instant::now();
        let response = self.client.get(url).headers(headers.clone()).send()?;
        let status = response.status();
        let elapsed = start.elapsed().as_millis() as u64;

        if status == StatusCode::FORBIDDEN {
            warn!(latency_ms = elapsed, "Access forbidden, the server may be blocking requests");
            return Err(FetchError::Blocked);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), latency_ms = elapsed, "Page request failed");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text()?;
        info!(bytes = body.len(), latency_ms = elapsed, "Page fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_USER_AGENT, FetchConfig};
    use mockito::Server;
    use std::collections::HashMap;

    fn config(url: &str) -> FetchConfig {
        FetchConfig {
            url: url.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 5,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn returns_body_on_success() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/browse")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body("<html>ok</html>")
            .create();

        let cfg = config(&format!("{}/browse", server.url()));
        let fetcher = Fetcher::new(&cfg).unwrap();
        let body = fetcher.fetch(&cfg.url, &cfg.headers().unwrap()).unwrap();

        assert_eq!(body, "<html>ok</html>");
        mock.assert();
    }

    #[test]
    fn forbidden_is_blocked() {
        let mut server = Server::new();
        server.mock("GET", "/browse").with_status(403).create();

        let cfg = config(&format!("{}/browse", server.url()));
        let fetcher = Fetcher::new(&cfg).unwrap();
        let err = fetcher.fetch(&cfg.url, &cfg.headers().unwrap()).unwrap_err();

        assert!(matches!(err, FetchError::Blocked));
    }

    #[test]
    fn other_status_is_reported() {
        let mut server = Server::new();
        server.mock("GET", "/browse").with_status(503).create();

        let cfg = config(&format!("{}/browse", server.url()));
        let fetcher = Fetcher::new(&cfg).unwrap();
        let err = fetcher.fetch(&cfg.url, &cfg.headers().unwrap()).unwrap_err();

        assert!(matches!(err, FetchError::Status(503)));
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let cfg = config("http://127.0.0.1:9/browse");
        let fetcher = Fetcher::new(&cfg).unwrap();
        let err = fetcher.fetch(&cfg.url, &cfg.headers().unwrap()).unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
    }
}
