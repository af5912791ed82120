use std::time::Duration;

use ureq::{http::header, Agent, RequestBuilder};

/// Default `User-Agent` sent to the registry.
pub const DEFAULT_USER_AGENT: &str = concat!("bazaar/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// Creates a config with the crate user agent, no token and no timeout.
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an HTTP `Agent` configured from this `ClientConfig`.
    ///
    /// Non-2xx responses are returned as regular responses rather than errors so that the
    /// caller can map each status code itself. The timeout, when set, bounds the whole
    /// request including reading the body.
    pub fn build(&self) -> Agent {
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .into()
    }
}

/// Applies the headers every registry request carries.
pub(crate) fn apply_headers<B>(req: RequestBuilder<B>, token: Option<&str>) -> RequestBuilder<B> {
    let req = req.header(header::ACCEPT, "application/json");
    match token {
        Some(token) if !token.is_empty() => {
            req.header(header::AUTHORIZATION, format!("Bearer {token}"))
        }
        _ => req,
    }
}
