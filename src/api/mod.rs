//! Client for the Neo consumer web service.

pub mod client;
pub mod errors;

use crate::error::Result;
use crate::xml::{Consumer, ConsumerProfile};
use async_trait::async_trait;
use std::fmt;

pub use client::NeoClient;
pub use errors::error_from_response;

/// Consumer credentials, sent as an `Authorization` header when MCAL is enabled.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub promo_code: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            promo_code: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("promo_code", &self.promo_code)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Login {
    Password { username: String, password: String },
    /// A remember-me token stored earlier with `remember_me`.
    Token(String),
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Login::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Login::Token(_) => f.write_str("Token(***)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub login: Login,
    pub promo_code: Option<String>,
    pub acquisition_source: Option<String>,
}

impl AuthRequest {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Login::Password {
                username: username.into(),
                password: password.into(),
            },
            promo_code: None,
            acquisition_source: None,
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            login: Login::Token(token.into()),
            promo_code: None,
            acquisition_source: None,
        }
    }
}

/// The remote operations member synchronization and authentication depend on.
#[async_trait]
pub trait NeoApi: Send + Sync {
    /// Returns the consumer id when Neo accepts the login.
    async fn authenticate(&self, request: &AuthRequest) -> Result<Option<String>>;

    async fn logout(
        &self,
        consumer_id: &str,
        promo_code: Option<&str>,
        acquisition_source: Option<&str>,
    ) -> Result<()>;

    /// Returns the new consumer id and its validation uri.
    async fn create_consumer(&self, consumer: &Consumer) -> Result<(String, String)>;

    async fn complete_registration(&self, consumer_id: &str, uri: Option<&str>) -> Result<()>;

    async fn get_consumer(&self, consumer_id: &str, credentials: Option<&Credentials>) -> Result<Consumer>;

    async fn get_consumer_profile(
        &self,
        consumer_id: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConsumerProfile>;

    async fn update_consumer(
        &self,
        consumer_id: &str,
        consumer: &Consumer,
        credentials: Option<&Credentials>,
    ) -> Result<()>;

    async fn get_forgot_password_token(&self, username: &str) -> Result<String>;

    /// Changes a password with either the old password or a forgot-password token.
    async fn change_password(
        &self,
        username: &str,
        new_password: &str,
        old_password: Option<&str>,
        token: Option<&str>,
    ) -> Result<String>;
}
