//! Keeps Neo consumers in step with local members.
//!
//! Changes are found by diffing the member against the snapshot last synced
//! for it, and only the changed fields are sent to Neo.

use crate::api::{Credentials, NeoApi};
use crate::config::NeoConfig;
use crate::constants::ModifyFlag;
use crate::error::{NeoError, Result};
use crate::member::{AddressFields, FieldValue, Member, MemberField, Snapshot, ADDRESS_FIELDS, NEO_ATTR};
use crate::metrics::ApiMetrics;
use crate::storage::{ProfileStore, SnapshotCache};
use crate::wrapper::{ConsumerContext, ConsumerWrapper};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeValue {
    Field(FieldValue),
    Address(AddressFields),
}

/// One field (or the whole address) that differs from the last synced snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// `MemberField::Address` stands for the whole address group.
    pub field: MemberField,
    pub flag: ModifyFlag,
    pub value: ChangeValue,
}

fn flag_for<T>(old: Option<T>, current: Option<T>) -> Option<(ModifyFlag, T)> {
    match (old, current) {
        (None, Some(current)) => Some((ModifyFlag::Insert, current)),
        (Some(old), None) => Some((ModifyFlag::Delete, old)),
        (Some(_), Some(current)) => Some((ModifyFlag::Update, current)),
        (None, None) => None,
    }
}

/// Lists the changes needed to turn `old` into `current`.
pub fn diff(old: &Snapshot, current: &Snapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for &field in NEO_ATTR {
        let (before, after) = (old.get(field), current.get(field));
        if before == after {
            continue;
        }
        if let Some((flag, value)) = flag_for(before, after) {
            changes.push(FieldChange {
                field,
                flag,
                value: ChangeValue::Field(value.clone()),
            });
        }
    }

    let address_changed = ADDRESS_FIELDS.iter().any(|&f| old.get(f) != current.get(f));
    if address_changed {
        let has_address = |s: &Snapshot| ADDRESS_FIELDS.iter().any(|&f| s.get(f).is_some());
        let before = Some(old.address_fields()).filter(|_| has_address(old));
        let after = Some(current.address_fields()).filter(|_| has_address(current));
        if let Some((flag, value)) = flag_for(before, after) {
            changes.push(FieldChange {
                field: MemberField::Address,
                flag,
                value: ChangeValue::Address(value),
            });
        }
    }
    changes
}

/// Writes each change into `wrapper` through the matching setter.
pub fn apply_changes(wrapper: &mut ConsumerWrapper, changes: &[FieldChange]) -> Result<()> {
    for change in changes {
        let flag = change.flag;
        match (change.field, &change.value) {
            (MemberField::Address, ChangeValue::Address(address)) => wrapper.set_address(address, flag),
            (MemberField::Dob, ChangeValue::Field(FieldValue::Date(d))) => wrapper.set_dob(*d, flag),
            (MemberField::Gender, ChangeValue::Field(FieldValue::Gender(g))) => wrapper.set_gender(*g, flag),
            (MemberField::ReceiveSms, ChangeValue::Field(FieldValue::Flag(b))) => {
                wrapper.set_receive_sms(*b, flag)
            }
            (MemberField::ReceiveEmail, ChangeValue::Field(FieldValue::Flag(b))) => {
                wrapper.set_receive_email(*b, flag)
            }
            (field, ChangeValue::Field(FieldValue::Text(text))) => match field {
                MemberField::Username => wrapper.set_username(text, flag),
                MemberField::Password => wrapper.set_password(text, flag),
                MemberField::FirstName => wrapper.set_first_name(text, flag),
                MemberField::LastName => wrapper.set_last_name(text, flag),
                MemberField::Email => wrapper.set_email(text, flag),
                MemberField::MobileNumber => wrapper.set_mobile_number(text, flag),
                MemberField::Country => wrapper.set_country(text, flag)?,
                _ => return Err(mismatch(change)),
            },
            _ => return Err(mismatch(change)),
        }
    }
    Ok(())
}

fn mismatch(change: &FieldChange) -> NeoError {
    NeoError::InvalidValue {
        field: change.field.name().to_string(),
        value: format!("{:?}", change.value),
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub use_mcal: bool,
    pub cache_ttl: Duration,
    pub context: ConsumerContext,
}

impl SyncSettings {
    pub fn from_config(config: &NeoConfig) -> Self {
        Self {
            use_mcal: config.use_mcal,
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            context: config.consumer_context(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { consumer_id: String },
    Updated { changes: usize },
    Unchanged,
    /// The member lacks fields Neo requires, so nothing was sent.
    Skipped,
}

/// Runs the save, load and logout hooks of the member lifecycle against Neo.
pub struct ConsumerSync {
    api: Arc<dyn NeoApi>,
    cache: Arc<dyn SnapshotCache>,
    profiles: Arc<dyn ProfileStore>,
    settings: SyncSettings,
}

impl ConsumerSync {
    pub fn new(
        api: Arc<dyn NeoApi>,
        cache: Arc<dyn SnapshotCache>,
        profiles: Arc<dyn ProfileStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            api,
            cache,
            profiles,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Pushes a saved member to Neo, registering a consumer when the member has none yet.
    #[instrument(skip(self, member), fields(member_id = member.id))]
    pub async fn member_saved(&self, member: &mut Member, created: bool) -> Result<SyncOutcome> {
        let linked = self.profiles.consumer_id_for(member.id).await?;
        let outcome = match linked {
            Some(consumer_id) if !created => self.update_consumer(member, &consumer_id).await?,
            _ => self.create_consumer(member).await?,
        };
        if outcome != SyncOutcome::Skipped {
            self.cache
                .set(member.id, &member.snapshot(), self.settings.cache_ttl)
                .await?;
        }
        Ok(outcome)
    }

    async fn create_consumer(&self, member: &mut Member) -> Result<SyncOutcome> {
        if !member.is_complete() {
            debug!("Member {} is missing required fields, not registering", member.id);
            ApiMetrics::record_sync("skipped");
            return Ok(SyncOutcome::Skipped);
        }
        member.validate()?;
        let wrapper = ConsumerWrapper::from_member(member, self.settings.context.clone())?;
        let (consumer_id, _uri) = self.api.create_consumer(wrapper.consumer()).await?;
        self.api.complete_registration(&consumer_id, None).await?;
        self.profiles.link(member.id, &consumer_id).await?;
        member.consumer_id = Some(consumer_id.clone());
        info!("Registered member {} as consumer {}", member.id, consumer_id);
        ApiMetrics::record_sync("created");
        Ok(SyncOutcome::Created { consumer_id })
    }

    async fn update_consumer(&self, member: &mut Member, consumer_id: &str) -> Result<SyncOutcome> {
        member.validate()?;
        let old = match self.cache.get(member.id).await? {
            Some(snapshot) => snapshot,
            None => {
                warn!("No cached snapshot for member {}, comparing against Neo", member.id);
                // Neo still holds the password from before any pending change.
                let current = member.old_password.clone().or_else(|| member.password.clone());
                let credentials = self.credentials(member, current);
                self.remote_snapshot(consumer_id, credentials.as_ref()).await?
            }
        };
        let mut changes = diff(&old, &member.snapshot());
        if changes.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        let change_count = changes.len();

        let old_password = old.get(MemberField::Password).and_then(FieldValue::as_text);
        let mut auth_password = old_password.map(str::to_string);
        if self.change_password(member, &old, &changes).await? {
            changes.retain(|c| c.field != MemberField::Password);
            auth_password = member.password.clone();
        }

        let mut wrapper = ConsumerWrapper::new(self.settings.context.clone());
        apply_changes(&mut wrapper, &changes)?;
        let credentials = self.credentials(member, auth_password);

        if needs_remote_ids(&wrapper) {
            let remote = self
                .api
                .get_consumer_profile(consumer_id, credentials.as_ref())
                .await?;
            wrapper.set_ids_for_profile(&remote);
        }
        if !wrapper.is_empty() {
            self.api
                .update_consumer(consumer_id, wrapper.consumer(), credentials.as_ref())
                .await?;
        }
        member.old_password = None;
        member.forgot_password_token = None;
        info!("Sent {} changed fields for member {}", change_count, member.id);
        ApiMetrics::record_sync("updated");
        Ok(SyncOutcome::Updated {
            changes: change_count,
        })
    }

    /// Returns true when the password change went through the dedicated endpoint.
    async fn change_password(&self, member: &Member, old: &Snapshot, changes: &[FieldChange]) -> Result<bool> {
        let Some(change) = changes.iter().find(|c| c.field == MemberField::Password) else {
            return Ok(false);
        };
        if change.flag == ModifyFlag::Delete {
            return Ok(false);
        }
        let ChangeValue::Field(FieldValue::Text(new_password)) = &change.value else {
            return Err(mismatch(change));
        };
        if member.old_password.is_none() && member.forgot_password_token.is_none() {
            return Ok(false);
        }
        let username = member
            .username
            .clone()
            .or_else(|| old.get(MemberField::Username).and_then(FieldValue::as_text).map(str::to_string))
            .ok_or_else(|| NeoError::MissingField("username".into()))?;
        self.api
            .change_password(
                &username,
                new_password,
                member.old_password.as_deref(),
                member.forgot_password_token.as_deref(),
            )
            .await?;
        debug!("Changed password for member {}", member.id);
        Ok(true)
    }

    fn credentials(&self, member: &Member, password: Option<String>) -> Option<Credentials> {
        if !self.settings.use_mcal {
            return None;
        }
        let username = member.username.clone()?;
        let password = password.or_else(|| member.password.clone())?;
        Some(Credentials {
            username,
            password,
            promo_code: Some(self.settings.context.promo_code.clone()),
        })
    }

    async fn remote_snapshot(&self, consumer_id: &str, credentials: Option<&Credentials>) -> Result<Snapshot> {
        let consumer = self.api.get_consumer(consumer_id, credentials).await?;
        let wrapper = ConsumerWrapper::with_consumer(consumer, self.settings.context.clone());
        Snapshot::from_wrapper(&wrapper)
    }

    /// Returns the remote-tracked fields to overlay on a loaded member, or `None` when unlinked.
    #[instrument(skip(self))]
    pub async fn load_member(&self, member_id: u64) -> Result<Option<Snapshot>> {
        if let Some(snapshot) = self.cache.get(member_id).await? {
            return Ok(Some(snapshot));
        }
        let Some(consumer_id) = self.profiles.consumer_id_for(member_id).await? else {
            return Ok(None);
        };
        let snapshot = self.remote_snapshot(&consumer_id, None).await?;
        self.cache
            .set(member_id, &snapshot, self.settings.cache_ttl)
            .await?;
        Ok(Some(snapshot))
    }

    #[instrument(skip(self))]
    pub async fn member_logged_out(&self, member_id: u64) -> Result<()> {
        match self.profiles.consumer_id_for(member_id).await? {
            Some(consumer_id) => self.api.logout(&consumer_id, None, None).await,
            None => {
                debug!("Member {} has no consumer, skipping logout", member_id);
                Ok(())
            }
        }
    }
}

/// True when the wrapper changes profile entries Neo identifies by id.
fn needs_remote_ids(wrapper: &ConsumerWrapper) -> bool {
    let Some(profile) = wrapper.consumer().consumer_profile.as_ref() else {
        return false;
    };
    let not_insert = |flag: Option<ModifyFlag>| flag.is_some_and(|f| f != ModifyFlag::Insert);
    profile.addresses.iter().any(|a| not_insert(a.modify_flag))
        || profile.emails.iter().any(|e| not_insert(e.modify_flag))
        || profile.phones.iter().any(|p| not_insert(p.modify_flag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Gender;
    use chrono::NaiveDate;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn base() -> Snapshot {
        let mut s = Snapshot::default();
        s.insert(MemberField::Username, text("user_1234"));
        s.insert(MemberField::FirstName, text("Jo"));
        s.insert(MemberField::Dob, FieldValue::Date(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap()));
        s.insert(MemberField::ReceiveSms, FieldValue::Flag(false));
        s
    }

    fn context() -> ConsumerContext {
        ConsumerContext::new(35, "testPromo")
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        assert!(diff(&base(), &base()).is_empty());
    }

    #[test]
    fn test_insert_update_delete_flags() {
        let old = base();
        let mut current = base();
        current.insert(MemberField::Email, text("jo@example.com"));
        current.insert(MemberField::FirstName, text("Joanne"));
        current.insert(MemberField::ReceiveSms, FieldValue::Flag(true));
        let mut without_dob = Snapshot::default();
        for (field, value) in current.iter().filter(|(f, _)| *f != MemberField::Dob) {
            without_dob.insert(field, value.clone());
        }

        let changes = diff(&old, &without_dob);
        let summary: Vec<_> = changes.iter().map(|c| (c.field, c.flag)).collect();
        assert_eq!(
            summary,
            vec![
                (MemberField::FirstName, ModifyFlag::Update),
                (MemberField::Dob, ModifyFlag::Delete),
                (MemberField::Email, ModifyFlag::Insert),
                (MemberField::ReceiveSms, ModifyFlag::Update),
            ]
        );
        // Deletes carry the old value
        assert_eq!(
            changes[1].value,
            ChangeValue::Field(FieldValue::Date(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap()))
        );
    }

    #[test]
    fn test_address_is_diffed_as_one_group() {
        let old = base();
        let mut current = base();
        current.insert(MemberField::City, text("Austin"));
        current.insert(MemberField::Country, text("US"));

        let changes = diff(&old, &current);
        let address = changes.iter().find(|c| c.field == MemberField::Address).unwrap();
        assert_eq!(address.flag, ModifyFlag::Insert);
        assert_eq!(
            address.value,
            ChangeValue::Address(AddressFields {
                city: Some("Austin".into()),
                country: Some("US".into()),
                ..Default::default()
            })
        );

        let mut moved = current.clone();
        moved.insert(MemberField::Zipcode, text("78701"));
        let changes = diff(&current, &moved);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].flag, ModifyFlag::Update);

        let changes = diff(&current, &base());
        let address = changes.iter().find(|c| c.field == MemberField::Address).unwrap();
        assert_eq!(address.flag, ModifyFlag::Delete);
    }

    #[test]
    fn test_country_change_alone_leaves_address_untouched() {
        let mut old = base();
        old.insert(MemberField::City, text("Austin"));
        let mut current = old.clone();
        current.insert(MemberField::Country, text("US"));
        let changes = diff(&old, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, MemberField::Country);
    }

    #[test]
    fn test_apply_changes_builds_partial_consumer() {
        let mut wrapper = ConsumerWrapper::new(context());
        let changes = vec![
            FieldChange {
                field: MemberField::LastName,
                flag: ModifyFlag::Update,
                value: ChangeValue::Field(text("Smith")),
            },
            FieldChange {
                field: MemberField::Gender,
                flag: ModifyFlag::Insert,
                value: ChangeValue::Field(FieldValue::Gender(Gender::Male)),
            },
            FieldChange {
                field: MemberField::ReceiveEmail,
                flag: ModifyFlag::Update,
                value: ChangeValue::Field(FieldValue::Flag(true)),
            },
        ];
        apply_changes(&mut wrapper, &changes).unwrap();
        assert_eq!(wrapper.last_name().as_deref(), Some("Smith"));
        assert_eq!(wrapper.gender(), Some(Gender::Male));
        assert_eq!(wrapper.receive_email(), Some(true));
        assert!(wrapper.username().is_none());
        assert!(!needs_remote_ids(&wrapper));
    }

    #[test]
    fn test_apply_changes_rejects_mismatched_values() {
        let mut wrapper = ConsumerWrapper::new(context());
        let bad = FieldChange {
            field: MemberField::Dob,
            flag: ModifyFlag::Update,
            value: ChangeValue::Field(text("1990-01-02")),
        };
        assert!(matches!(
            apply_changes(&mut wrapper, &[bad]),
            Err(NeoError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_updated_entries_need_remote_ids() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_email("jo@example.com", ModifyFlag::Insert);
        assert!(!needs_remote_ids(&wrapper));
        wrapper.set_mobile_number("0821234567", ModifyFlag::Update);
        assert!(needs_remote_ids(&wrapper));
    }
}
