//! Local member records and the flat snapshots used to detect changes.

use crate::error::{NeoError, Result};
use crate::validation;
use crate::wrapper::ConsumerWrapper;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

/// The member attributes that live on Neo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberField {
    Username,
    Password,
    FirstName,
    LastName,
    Dob,
    Email,
    MobileNumber,
    ReceiveSms,
    ReceiveEmail,
    Country,
    Gender,
    Address,
    City,
    Province,
    Zipcode,
}

/// Fields diffed one by one, in the order changes are applied.
pub const NEO_ATTR: &[MemberField] = &[
    MemberField::Username,
    MemberField::Password,
    MemberField::FirstName,
    MemberField::LastName,
    MemberField::Dob,
    MemberField::Email,
    MemberField::MobileNumber,
    MemberField::ReceiveSms,
    MemberField::ReceiveEmail,
    MemberField::Country,
    MemberField::Gender,
];

/// Fields that Neo stores together as the home address.
pub const ADDRESS_FIELDS: &[MemberField] = &[
    MemberField::Address,
    MemberField::City,
    MemberField::Province,
    MemberField::Zipcode,
];

/// Fields a member needs before a consumer can be registered for it.
pub const REQUIRED_FIELDS: &[MemberField] = &[
    MemberField::Username,
    MemberField::Password,
    MemberField::FirstName,
    MemberField::LastName,
    MemberField::Dob,
    MemberField::Gender,
];

impl MemberField {
    pub fn name(self) -> &'static str {
        match self {
            MemberField::Username => "username",
            MemberField::Password => "password",
            MemberField::FirstName => "first_name",
            MemberField::LastName => "last_name",
            MemberField::Dob => "dob",
            MemberField::Email => "email",
            MemberField::MobileNumber => "mobile_number",
            MemberField::ReceiveSms => "receive_sms",
            MemberField::ReceiveEmail => "receive_email",
            MemberField::Country => "country",
            MemberField::Gender => "gender",
            MemberField::Address => "address",
            MemberField::City => "city",
            MemberField::Province => "province",
            MemberField::Zipcode => "zipcode",
        }
    }

    pub fn is_address(self) -> bool {
        ADDRESS_FIELDS.contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Flag(bool),
    Gender(Gender),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Home address as flat member attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

impl AddressFields {
    /// True when none of the address lines are set. Country alone is not an address.
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.city.is_none() && self.province.is_none() && self.zipcode.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: u64,
    pub username: Option<String>,
    /// Raw password, only ever held in memory and sent to Neo.
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    pub receive_sms: bool,
    pub receive_email: bool,
    /// ISO country code
    pub country: Option<String>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zipcode: Option<String>,
    /// Neo consumer id, set once the member is linked.
    pub consumer_id: Option<String>,
    #[serde(skip)]
    pub old_password: Option<String>,
    #[serde(skip)]
    pub forgot_password_token: Option<String>,
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value
        .as_ref()
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.clone()))
}

impl Member {
    pub fn get(&self, field: MemberField) -> Option<FieldValue> {
        match field {
            MemberField::Username => text(&self.username),
            MemberField::Password => text(&self.password),
            MemberField::FirstName => text(&self.first_name),
            MemberField::LastName => text(&self.last_name),
            MemberField::Dob => self.dob.map(FieldValue::Date),
            MemberField::Email => text(&self.email),
            MemberField::MobileNumber => text(&self.mobile_number),
            MemberField::ReceiveSms => Some(FieldValue::Flag(self.receive_sms)),
            MemberField::ReceiveEmail => Some(FieldValue::Flag(self.receive_email)),
            MemberField::Country => text(&self.country),
            MemberField::Gender => self.gender.map(FieldValue::Gender),
            MemberField::Address => text(&self.address),
            MemberField::City => text(&self.city),
            MemberField::Province => text(&self.province),
            MemberField::Zipcode => text(&self.zipcode),
        }
    }

    /// Sets one attribute, rejecting values of the wrong kind.
    pub fn set(&mut self, field: MemberField, value: FieldValue) -> Result<()> {
        let mismatch = |value: &FieldValue| NeoError::InvalidValue {
            field: field.name().to_string(),
            value: format!("{:?}", value),
        };
        match (field, value) {
            (MemberField::Dob, FieldValue::Date(d)) => self.dob = Some(d),
            (MemberField::ReceiveSms, FieldValue::Flag(b)) => self.receive_sms = b,
            (MemberField::ReceiveEmail, FieldValue::Flag(b)) => self.receive_email = b,
            (MemberField::Gender, FieldValue::Gender(g)) => self.gender = Some(g),
            (field, FieldValue::Text(s)) => {
                let slot = match field {
                    MemberField::Username => &mut self.username,
                    MemberField::Password => &mut self.password,
                    MemberField::FirstName => &mut self.first_name,
                    MemberField::LastName => &mut self.last_name,
                    MemberField::Email => &mut self.email,
                    MemberField::MobileNumber => &mut self.mobile_number,
                    MemberField::Country => &mut self.country,
                    MemberField::Address => &mut self.address,
                    MemberField::City => &mut self.city,
                    MemberField::Province => &mut self.province,
                    MemberField::Zipcode => &mut self.zipcode,
                    _ => return Err(mismatch(&FieldValue::Text(s))),
                };
                *slot = Some(s);
            }
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(())
    }

    pub fn address_fields(&self) -> AddressFields {
        AddressFields {
            address: self.address.clone().filter(|s| !s.is_empty()),
            city: self.city.clone().filter(|s| !s.is_empty()),
            province: self.province.clone().filter(|s| !s.is_empty()),
            zipcode: self.zipcode.clone().filter(|s| !s.is_empty()),
            country: self.country.clone().filter(|s| !s.is_empty()),
        }
    }

    /// The current values of every remote-tracked field.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for &field in NEO_ATTR.iter().chain(ADDRESS_FIELDS) {
            if let Some(value) = self.get(field) {
                snapshot.insert(field, value);
            }
        }
        snapshot
    }

    /// Overlays the values present in `snapshot`; absent values keep their local state.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        for (field, value) in snapshot.iter() {
            self.set(field, value.clone())?;
        }
        Ok(())
    }

    /// Builds a member from a remote consumer, e.g. after a first remote login.
    pub fn from_wrapper(id: u64, wrapper: &ConsumerWrapper) -> Result<Self> {
        let mut member = Member {
            id,
            ..Default::default()
        };
        member.apply_snapshot(&Snapshot::from_wrapper(wrapper)?)?;
        Ok(member)
    }

    pub fn is_complete(&self) -> bool {
        REQUIRED_FIELDS.iter().all(|&f| self.get(f).is_some())
            && (self.get(MemberField::Email).is_some() || self.get(MemberField::MobileNumber).is_some())
    }

    pub fn validate(&self) -> Result<()> {
        for &field in &[MemberField::Username, MemberField::MobileNumber] {
            if let Some(FieldValue::Text(value)) = self.get(field) {
                validation::validate(field.name(), &value)?;
            }
        }
        Ok(())
    }
}

/// Flat field values as last seen on both sides; a missing key means "no value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot(BTreeMap<MemberField, FieldValue>);

impl Snapshot {
    pub fn get(&self, field: MemberField) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    pub fn insert(&mut self, field: MemberField, value: FieldValue) {
        self.0.insert(field, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (MemberField, &FieldValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn address_fields(&self) -> AddressFields {
        let text = |f| self.get(f).and_then(FieldValue::as_text).map(str::to_string);
        AddressFields {
            address: text(MemberField::Address),
            city: text(MemberField::City),
            province: text(MemberField::Province),
            zipcode: text(MemberField::Zipcode),
            country: text(MemberField::Country),
        }
    }

    /// Flattens a nested consumer into member attributes.
    pub fn from_wrapper(wrapper: &ConsumerWrapper) -> Result<Self> {
        let mut snapshot = Snapshot::default();
        let put_text = |snapshot: &mut Snapshot, field, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                snapshot.insert(field, FieldValue::Text(v));
            }
        };
        put_text(&mut snapshot, MemberField::Username, wrapper.username());
        put_text(&mut snapshot, MemberField::Password, wrapper.password());
        put_text(&mut snapshot, MemberField::FirstName, wrapper.first_name());
        put_text(&mut snapshot, MemberField::LastName, wrapper.last_name());
        put_text(&mut snapshot, MemberField::Email, wrapper.email());
        put_text(&mut snapshot, MemberField::MobileNumber, wrapper.mobile_number());
        if let Some(dob) = wrapper.dob()? {
            snapshot.insert(MemberField::Dob, FieldValue::Date(dob));
        }
        if let Some(v) = wrapper.receive_sms() {
            snapshot.insert(MemberField::ReceiveSms, FieldValue::Flag(v));
        }
        if let Some(v) = wrapper.receive_email() {
            snapshot.insert(MemberField::ReceiveEmail, FieldValue::Flag(v));
        }
        if let Some(g) = wrapper.gender() {
            snapshot.insert(MemberField::Gender, FieldValue::Gender(g));
        }
        if let Some(address) = wrapper.address() {
            put_text(&mut snapshot, MemberField::Address, address.address);
            put_text(&mut snapshot, MemberField::City, address.city);
            put_text(&mut snapshot, MemberField::Province, address.province);
            put_text(&mut snapshot, MemberField::Zipcode, address.zipcode);
            put_text(&mut snapshot, MemberField::Country, address.country);
        }
        // The country question wins over the address country.
        put_text(&mut snapshot, MemberField::Country, wrapper.country());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ModifyFlag;
    use crate::wrapper::ConsumerContext;

    fn member() -> Member {
        Member {
            id: 7,
            username: Some("user_1234".into()),
            password: Some("password".into()),
            first_name: Some("firstname".into()),
            last_name: Some("lastname".into()),
            dob: NaiveDate::from_ymd_opt(1990, 1, 2),
            email: Some("1234@example.com".into()),
            mobile_number: Some("0821234567".into()),
            receive_sms: false,
            receive_email: true,
            country: Some("US".into()),
            gender: Some(Gender::Female),
            address: Some("address".into()),
            city: Some("city".into()),
            province: Some("province".into()),
            zipcode: Some("zipcode".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_skips_blank_text() {
        let mut m = member();
        m.city = Some(String::new());
        m.zipcode = None;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.get(MemberField::City), None);
        assert_eq!(snapshot.get(MemberField::Zipcode), None);
        assert_eq!(snapshot.get(MemberField::ReceiveSms), Some(&FieldValue::Flag(false)));
        assert_eq!(snapshot.len(), 13);
    }

    #[test]
    fn test_wrapper_flattens_back_to_the_same_snapshot() {
        let m = member();
        let context = ConsumerContext::new(35, "testPromo");
        let wrapper = ConsumerWrapper::from_member(&m, context).unwrap();
        let snapshot = Snapshot::from_wrapper(&wrapper).unwrap();
        assert_eq!(snapshot, m.snapshot());

        let rebuilt = Member::from_wrapper(7, &wrapper).unwrap();
        assert_eq!(rebuilt.snapshot(), m.snapshot());
        assert_eq!(rebuilt.consumer_id, None);
    }

    #[test]
    fn test_address_country_fills_in_for_missing_country_answer() {
        let mut wrapper = ConsumerWrapper::new(ConsumerContext::new(35, "p"));
        wrapper.set_address(
            &AddressFields {
                city: Some("Austin".into()),
                country: Some("US".into()),
                ..Default::default()
            },
            ModifyFlag::Insert,
        );
        let snapshot = Snapshot::from_wrapper(&wrapper).unwrap();
        assert_eq!(
            snapshot.get(MemberField::Country),
            Some(&FieldValue::Text("US".into()))
        );
        assert_eq!(snapshot.address_fields().city.as_deref(), Some("Austin"));
    }

    #[test]
    fn test_apply_snapshot_overlays_present_values_only() {
        let mut local = Member {
            id: 3,
            username: Some("local".into()),
            city: Some("Local City".into()),
            ..Default::default()
        };
        let mut remote = Snapshot::default();
        remote.insert(MemberField::Username, FieldValue::Text("remote".into()));
        remote.insert(MemberField::ReceiveEmail, FieldValue::Flag(true));
        local.apply_snapshot(&remote).unwrap();
        assert_eq!(local.username.as_deref(), Some("remote"));
        assert_eq!(local.city.as_deref(), Some("Local City"));
        assert!(local.receive_email);
    }

    #[test]
    fn test_set_rejects_mismatched_kinds() {
        let mut m = Member::default();
        assert!(m.set(MemberField::Dob, FieldValue::Text("1990-01-01".into())).is_err());
        assert!(m.set(MemberField::Gender, FieldValue::Flag(true)).is_err());
    }

    #[test]
    fn test_is_complete_needs_gender_and_a_contact() {
        let mut m = member();
        assert!(m.is_complete());
        m.gender = None;
        assert!(!m.is_complete());
        m.gender = Some(Gender::Male);
        m.email = None;
        m.mobile_number = None;
        assert!(!m.is_complete());
    }

    #[test]
    fn test_snapshot_survives_json() {
        let snapshot = member().snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_transient_passwords_are_not_serialized() {
        let mut m = member();
        m.old_password = Some("old".into());
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("old_password").is_none());
        assert_eq!(json["gender"], "F");
    }
}
