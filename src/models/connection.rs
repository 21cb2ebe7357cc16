//! Connection-related data models.
//!
//! `ConnectionDetails` is supplied by the caller on every request and handed
//! straight to the database collaborator; nothing here keeps a connection open.

use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Default port of the ClickHouse HTTP interface.
pub const DEFAULT_HTTP_PORT: u16 = 8123;

/// Default port of the ClickHouse HTTPS interface.
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// How to reach and authenticate to one ClickHouse database.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub host: String,
    /// Accepts a JSON number or a numeric string
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Use HTTPS instead of HTTP
    #[serde(default)]
    pub secure: bool,
    /// Authenticate with `jwt_token` as a Bearer token instead of a password
    #[serde(default)]
    pub use_jwt: bool,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub jwt_token: Option<String>,
}

impl ConnectionDetails {
    /// Create connection details with password authentication.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: None,
            secure: false,
            use_jwt: false,
            jwt_token: None,
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authenticate with a JWT instead of the password.
    pub fn with_jwt(mut self, token: impl Into<String>) -> Self {
        self.use_jwt = true;
        self.jwt_token = Some(token.into());
        self
    }

    /// Use HTTPS.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Check the details before any network round trip.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::invalid_input("Host cannot be empty"));
        }
        if self.host.contains('/') || self.host.contains('@') {
            return Err(ConnectorError::invalid_input(
                "Host must be a bare hostname or IP address, not a URL",
            ));
        }
        if self.port == 0 {
            return Err(ConnectorError::invalid_input("Port must be greater than 0"));
        }
        if self.database.trim().is_empty() {
            return Err(ConnectorError::invalid_input("Database cannot be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(ConnectorError::invalid_input("Username cannot be empty"));
        }
        if self.use_jwt && self.jwt_token.as_deref().is_none_or(str::is_empty) {
            return Err(ConnectorError::invalid_input(
                "use_jwt is set but no jwt_token was provided",
            ));
        }
        Ok(())
    }

    /// URL scheme for the HTTP interface.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// Display-safe summary (no credentials).
    pub fn display_target(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.scheme(),
            self.username,
            self.host,
            self.port,
            self.database
        )
    }
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("secure", &self.secure)
            .field("use_jwt", &self.use_jwt)
            .field("jwt_token", &self.jwt_token.as_ref().map(|_| "****"))
            .finish()
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortInput {
        Number(u16),
        Text(String),
    }

    match PortInput::deserialize(deserializer)? {
        PortInput::Number(port) => Ok(port),
        PortInput::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ConnectionDetails {
        ConnectionDetails::new("localhost", DEFAULT_HTTP_PORT, "analytics", "default")
            .with_password("secret")
    }

    #[test]
    fn test_port_accepts_string_and_number() {
        let from_str: ConnectionDetails = serde_json::from_str(
            r#"{"host":"h","port":"8123","database":"d","username":"u"}"#,
        )
        .unwrap();
        let from_num: ConnectionDetails =
            serde_json::from_str(r#"{"host":"h","port":9000,"database":"d","username":"u"}"#)
                .unwrap();
        assert_eq!(from_str.port, 8123);
        assert_eq!(from_num.port, 9000);
    }

    #[test]
    fn test_port_rejects_garbage() {
        let result: Result<ConnectionDetails, _> = serde_json::from_str(
            r#"{"host":"h","port":"eighty","database":"d","username":"u"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let debug = format!("{:?}", details().with_jwt("token-value"));
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("token-value"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_serialize_skips_secrets() {
        let json = serde_json::to_string(&details()).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_validate() {
        assert!(details().validate().is_ok());

        let mut bad = details();
        bad.host = "http://localhost".into();
        assert!(bad.validate().is_err());

        let mut jwt_without_token = details();
        jwt_without_token.use_jwt = true;
        assert!(jwt_without_token.validate().is_err());

        let mut no_db = details();
        no_db.database = " ".into();
        assert!(no_db.validate().is_err());
    }

    #[test]
    fn test_display_target() {
        let target = details().with_secure(true).display_target();
        assert_eq!(target, "https://default@localhost:8123/analytics");
    }
}
