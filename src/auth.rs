//! Login and password reset against Neo.

use crate::api::{AuthRequest, NeoApi};
use crate::error::Result;
use crate::member::Member;
use crate::storage::ProfileStore;
use crate::wrapper::{ConsumerContext, ConsumerWrapper};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Turns a raw password into the form Neo stores.
pub trait PasswordEncoder: Send + Sync {
    fn encode(&self, raw: &str) -> String;
}

/// Hex encoded SHA-256 digest
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Encoder;

impl PasswordEncoder for Sha256Encoder {
    fn encode(&self, raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

/// Sends passwords unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainEncoder;

impl PasswordEncoder for PlainEncoder {
    fn encode(&self, raw: &str) -> String {
        raw.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Neo accepted the login and the consumer belongs to this local member.
    Linked(u64),
    /// Neo accepted the login but no local member is linked to the consumer yet.
    /// `member` is built from the remote consumer so the caller can store it.
    Unlinked { consumer_id: String, member: Box<Member> },
    Rejected,
}

pub struct NeoBackend {
    api: Arc<dyn NeoApi>,
    profiles: Arc<dyn ProfileStore>,
    encoder: Box<dyn PasswordEncoder>,
    context: ConsumerContext,
}

impl NeoBackend {
    pub fn new(api: Arc<dyn NeoApi>, profiles: Arc<dyn ProfileStore>, context: ConsumerContext) -> Self {
        Self::with_encoder(api, profiles, context, Box::new(Sha256Encoder))
    }

    pub fn with_encoder(
        api: Arc<dyn NeoApi>,
        profiles: Arc<dyn ProfileStore>,
        context: ConsumerContext,
        encoder: Box<dyn PasswordEncoder>,
    ) -> Self {
        Self {
            api,
            profiles,
            encoder,
            context,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        let digest = self.encoder.encode(password);
        let request = AuthRequest::password(username, digest);
        let Some(consumer_id) = self.api.authenticate(&request).await? else {
            debug!("Neo rejected login for {}", username);
            return Ok(AuthOutcome::Rejected);
        };
        if let Some(member_id) = self.profiles.member_id_for(&consumer_id).await? {
            return Ok(AuthOutcome::Linked(member_id));
        }

        info!("Consumer {} has no local member yet", consumer_id);
        let consumer = self.api.get_consumer(&consumer_id, None).await?;
        let wrapper = ConsumerWrapper::with_consumer(consumer, self.context.clone());
        let mut member = Member::from_wrapper(0, &wrapper)?;
        member.consumer_id = Some(consumer_id.clone());
        Ok(AuthOutcome::Unlinked {
            consumer_id,
            member: Box::new(member),
        })
    }
}

/// Issues password reset tokens through Neo's forgot-password flow.
pub struct NeoTokenGenerator {
    api: Arc<dyn NeoApi>,
}

impl NeoTokenGenerator {
    pub fn new(api: Arc<dyn NeoApi>) -> Self {
        Self { api }
    }

    #[instrument(skip(self))]
    pub async fn make_token(&self, username: &str) -> Result<String> {
        self.api.get_forgot_password_token(username).await
    }

    /// Neo checks the token itself when the password is changed, so it is
    /// only attached to the member for the next save.
    pub fn check_token(&self, member: &mut Member, token: &str) -> bool {
        member.forgot_password_token = Some(token.to_string());
        true
    }
}
