use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

/// Username + secret for one Miniserver.
///
/// Held in memory for the lifetime of a connection and never written to
/// disk by this crate.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Base64 of `username:password`, as carried by the realtime
    /// authenticate command. No hashing and no challenge: this is the
    /// scheme the controller generation expects.
    pub fn basic_token(&self) -> String {
        STANDARD.encode(format!(
            "{}:{}",
            self.username,
            self.password.expose_secret()
        ))
    }

    /// The realtime `authenticate/{token}` command.
    pub fn authenticate_command(&self) -> String {
        format!("authenticate/{}", self.basic_token())
    }
}
