//! Connection target modelling.
//!
//! A [`Target`] identifies one remote compute client and an optional group
//! suffix scoping the connection to a named sub-resource. Targets are
//! validated on construction and immutable afterwards; the WebSocket URL is
//! derived once and reused for the lifetime of the session.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Host used when none is given on the command line.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// WebSocket port the compute client listens on by default.
pub const DEFAULT_PORT: u16 = 7396;

/// Fixed path of the client's WebSocket API.
const WEBSOCKET_PATH: &str = "/api/websocket";

/// One remote endpoint plus an optional group suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
    group: Option<String>,
    url: Url,
}

impl Target {
    /// Builds a validated target.
    ///
    /// An empty group is treated as absent; a present group must start with
    /// a path separator so it can be appended to the connection path
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] when the port is zero, the group is not
    /// `/`-prefixed, or the assembled URL does not parse.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        group: Option<String>,
    ) -> Result<Self, TargetError> {
        let host = host.into();
        if port == 0 {
            return Err(TargetError::PortOutOfRange);
        }
        let group = group.filter(|suffix| !suffix.is_empty());
        if let Some(suffix) = &group
            && !suffix.starts_with('/')
        {
            return Err(TargetError::GroupWithoutSeparator {
                group: suffix.clone(),
            });
        }

        let suffix = group.as_deref().unwrap_or_default();
        let url = Url::parse(&format!("ws://{host}:{port}{WEBSOCKET_PATH}{suffix}"))?;
        Ok(Self {
            host,
            port,
            group,
            url,
        })
    }

    /// Host name or address of the remote endpoint.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// WebSocket port of the remote endpoint.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Optional group suffix, including its leading separator.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Full connection URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Target {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.host, self.port)
    }
}

/// Errors raised while validating a [`Target`].
#[derive(Debug, Error)]
pub enum TargetError {
    /// Port zero cannot be connected to.
    #[error("port must be between 1 and 65535")]
    PortOutOfRange,
    /// A group suffix must begin with a path separator.
    #[error("group '{group}' must start with '/'")]
    GroupWithoutSeparator {
        /// The offending suffix.
        group: String,
    },
    /// The assembled connection URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
