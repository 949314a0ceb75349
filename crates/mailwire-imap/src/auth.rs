//! Authentication: SASL mechanisms and the bounded login loop.
//!
//! Mechanisms implement [`Authenticator`]; the command driver does the
//! base64 coding and the continuation handshake, so an authenticator only
//! maps decoded challenges to raw responses.
//!
//! | Mechanism | First response | Later challenges |
//! |---|---|---|
//! | `PLAIN` | `\0user\0password` | cancel |
//! | `LOGIN` | user, then password | cancel |
//! | `XOAUTH2` | `user=..\x01auth=Bearer ..\x01\x01` | empty (acknowledges the error) |

use crate::Result;
use crate::command::Command;
use crate::connection::{Connection, Transport};
use crate::error::Error;
use crate::handler::{Credentials, LoginContext, Severity};
use crate::parser::Reply;
use crate::state::ProtocolState;
use crate::types::{AuthMechanisms, CapFlags, ResponseCode, Status};

/// One side of a SASL exchange.
pub trait Authenticator: Send {
    /// Mechanism name sent with AUTHENTICATE.
    fn mechanism(&self) -> &'static str;

    /// Answers a decoded challenge. `None` cancels the exchange.
    fn step(&mut self, challenge: &[u8]) -> Option<Vec<u8>>;
}

/// `AUTHENTICATE PLAIN` (RFC 4616).
#[derive(Debug)]
pub struct PlainAuth {
    credentials: Credentials,
    sent: bool,
}

impl PlainAuth {
    /// Creates the authenticator.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            sent: false,
        }
    }
}

impl Authenticator for PlainAuth {
    fn mechanism(&self) -> &'static str {
        "PLAIN"
    }

    fn step(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        if std::mem::replace(&mut self.sent, true) {
            return None;
        }
        let Credentials { username, password } = &self.credentials;
        Some(format!("\0{username}\0{password}").into_bytes())
    }
}

/// `AUTHENTICATE LOGIN`: user name for the first challenge, password for
/// the second.
#[derive(Debug)]
pub struct LoginAuth {
    credentials: Credentials,
    round: u8,
}

impl LoginAuth {
    /// Creates the authenticator.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            round: 0,
        }
    }
}

impl Authenticator for LoginAuth {
    fn mechanism(&self) -> &'static str {
        "LOGIN"
    }

    fn step(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        self.round += 1;
        match self.round {
            1 => Some(self.credentials.username.as_bytes().to_vec()),
            2 => Some(self.credentials.password.as_bytes().to_vec()),
            _ => None,
        }
    }
}

/// `AUTHENTICATE XOAUTH2` with a bearer token.
pub struct XOAuth2Auth {
    user: String,
    token: String,
    round: u8,
}

impl XOAuth2Auth {
    /// Creates the authenticator.
    #[must_use]
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
            round: 0,
        }
    }
}

impl std::fmt::Debug for XOAuth2Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XOAuth2Auth")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Authenticator for XOAuth2Auth {
    fn mechanism(&self) -> &'static str {
        "XOAUTH2"
    }

    fn step(&mut self, challenge: &[u8]) -> Option<Vec<u8>> {
        self.round += 1;
        match self.round {
            1 => Some(
                format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.token).into_bytes(),
            ),
            // the server reports failure as a JSON challenge and wants an
            // empty answer before its tagged NO
            2 => {
                tracing::debug!(
                    challenge = %String::from_utf8_lossy(challenge),
                    "XOAUTH2 rejected"
                );
                Some(Vec::new())
            }
            _ => None,
        }
    }
}

/// Picks the SASL mechanism to use for password credentials.
#[must_use]
pub fn password_mechanism(offered: AuthMechanisms) -> Option<AuthMechanisms> {
    [AuthMechanisms::PLAIN, AuthMechanisms::LOGIN]
        .into_iter()
        .find(|m| offered.contains(*m))
}

/// Authenticates the connection.
///
/// With `token` set and XOAUTH2 on offer, one XOAUTH2 attempt is made.
/// Otherwise credentials come from the notifier, up to `max_trials`
/// times: AUTHENTICATE with the best offered mechanism, else LOGIN unless
/// the server advertises LOGINDISABLED.
///
/// # Errors
///
/// `Auth` when the user aborts, the server refuses every attempt, or no
/// usable method exists; `ConnectionBroken` if the connection dies.
pub async fn authenticate<T: Transport>(
    conn: &mut Connection<T>,
    host: &str,
    user: Option<&str>,
    max_trials: u32,
    token: Option<&mut XOAuth2Auth>,
) -> Result<()> {
    let offered = conn.state().caps.auth_mechanisms();

    if let Some(token) = token {
        if !offered.contains(AuthMechanisms::XOAUTH2) {
            return Err(Error::Auth("server does not offer XOAUTH2".to_string()));
        }
        let reply = conn.authenticate(token).await;
        return finish(conn, reply).await;
    }

    let mechanism = password_mechanism(offered);
    if mechanism.is_none() && conn.state().caps.has(CapFlags::LOGIN_DISABLED) {
        conn.notifier()
            .log(Severity::Error, "Server disables LOGIN, no authenticators available");
        return Err(Error::Auth("LOGIN disabled by server".to_string()));
    }

    for trial in 1..=max_trials {
        let context = LoginContext { host, user, trial };
        let credentials = match conn.notifier().login(&context) {
            Some(c) if !c.password.is_empty() => c,
            _ => {
                conn.notifier().log(Severity::Error, "Login aborted");
                return Err(Error::Auth("login aborted".to_string()));
            }
        };
        tracing::debug!(host, trial, ?mechanism, "login attempt");

        let reply = match mechanism {
            Some(AuthMechanisms::PLAIN) => {
                conn.authenticate(&mut PlainAuth::new(credentials)).await
            }
            Some(_) => conn.authenticate(&mut LoginAuth::new(credentials)).await,
            None => {
                let command = Command::Login {
                    username: credentials.username,
                    password: credentials.password,
                };
                conn.execute(&command).await
            }
        };

        if reply.is_closed() {
            return Err(Error::ConnectionBroken(reply.human_text()));
        }
        if reply.status() == Some(Status::Ok) {
            return finish(conn, reply).await;
        }
        tracing::warn!(trial, text = %reply.human_text(), "login failed");
        conn.notifier()
            .log(Severity::Warn, &format!("Retrying login: {}", reply.human_text()));
    }

    conn.notifier().log(Severity::Error, "Too many login failures");
    Err(Error::Auth(format!("{max_trials} login attempts failed")))
}

async fn finish<T: Transport>(conn: &mut Connection<T>, reply: Reply) -> Result<()> {
    if reply.is_closed() {
        return Err(Error::ConnectionBroken(reply.human_text()));
    }
    if reply.status() != Some(Status::Ok) {
        conn.notifier().log(Severity::Error, &reply.human_text());
        return Err(Error::Auth(reply.human_text()));
    }
    conn.state_mut().protocol = ProtocolState::Authenticated;
    tracing::info!("authenticated");
    // capabilities may change once logged in
    let piggybacked = matches!(reply.code(), Some(ResponseCode::Capability(_)));
    if !piggybacked && conn.state().caps.has(CapFlags::IMAP4) {
        conn.execute(&Command::Capability).await;
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("fred", "secret")
    }

    #[test]
    fn plain_sends_once() {
        let mut auth = PlainAuth::new(creds());
        assert_eq!(auth.step(b"").unwrap(), b"\0fred\0secret");
        assert!(auth.step(b"").is_none());
    }

    #[test]
    fn login_sends_user_then_password() {
        let mut auth = LoginAuth::new(creds());
        assert_eq!(auth.step(b"Username:").unwrap(), b"fred");
        assert_eq!(auth.step(b"Password:").unwrap(), b"secret");
        assert!(auth.step(b"?").is_none());
    }

    #[test]
    fn xoauth2_acknowledges_error_challenge() {
        let mut auth = XOAuth2Auth::new("fred@example.com", "tok");
        assert_eq!(
            auth.step(b"").unwrap(),
            b"user=fred@example.com\x01auth=Bearer tok\x01\x01"
        );
        assert_eq!(auth.step(b"{\"status\":\"400\"}").unwrap(), b"");
        assert!(auth.step(b"").is_none());
        assert!(!format!("{auth:?}").contains("\"tok\""));
    }

    #[test]
    fn mechanism_preference() {
        let both = AuthMechanisms::PLAIN | AuthMechanisms::LOGIN;
        assert_eq!(password_mechanism(both), Some(AuthMechanisms::PLAIN));
        assert_eq!(
            password_mechanism(AuthMechanisms::LOGIN),
            Some(AuthMechanisms::LOGIN)
        );
        assert_eq!(password_mechanism(AuthMechanisms::XOAUTH2), None);
    }
}
