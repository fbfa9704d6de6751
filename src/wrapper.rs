//! Typed accessors and mutators over a Neo [`Consumer`] tree.

use crate::constants::*;
use crate::error::{NeoError, Result};
use crate::member::{AddressFields, Gender, Member};
use crate::xml::{
    AddressDetails, Answer, Consumer, ConsumerProfile, EmailDetails, PhoneDetails, Preferences,
    QuestionAnswers, QuestionCategory, UserAccount,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Maps ISO country codes to the option ids of Neo's country question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryTable {
    option_ids: BTreeMap<String, u32>,
}

impl Default for CountryTable {
    fn default() -> Self {
        Self {
            option_ids: COUNTRY_OPTION_IDS
                .iter()
                .map(|(code, id)| (code.to_string(), *id))
                .collect(),
        }
    }
}

impl CountryTable {
    pub fn insert(&mut self, code: &str, option_id: u32) {
        self.option_ids.insert(code.to_uppercase(), option_id);
    }

    pub fn option_id(&self, code: &str) -> Option<u32> {
        self.option_ids.get(&code.to_uppercase()).copied()
    }

    pub fn code_for(&self, option_id: u32) -> Option<&str> {
        self.option_ids
            .iter()
            .find(|(_, id)| **id == option_id)
            .map(|(code, _)| code.as_str())
    }
}

/// Site-wide values every consumer record is written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerContext {
    pub brand_id: u32,
    pub promo_code: String,
    pub countries: CountryTable,
}

impl ConsumerContext {
    pub fn new(brand_id: u32, promo_code: &str) -> Self {
        Self {
            brand_id,
            promo_code: promo_code.to_string(),
            countries: CountryTable::default(),
        }
    }

    pub fn with_countries(mut self, extra: impl IntoIterator<Item = (String, u32)>) -> Self {
        for (code, id) in extra {
            self.countries.insert(&code, id);
        }
        self
    }
}

pub struct ConsumerWrapper {
    consumer: Consumer,
    context: ConsumerContext,
}

impl ConsumerWrapper {
    pub fn new(context: ConsumerContext) -> Self {
        Self::with_consumer(Consumer::default(), context)
    }

    pub fn with_consumer(consumer: Consumer, context: ConsumerContext) -> Self {
        Self { consumer, context }
    }

    /// Builds a full insert-mode consumer for a member.
    pub fn from_member(member: &Member, context: ConsumerContext) -> Result<Self> {
        let flag = ModifyFlag::Insert;
        let mut wrapper = Self::new(context);
        if let Some(v) = &member.first_name {
            wrapper.set_first_name(v, flag);
        }
        if let Some(v) = &member.last_name {
            wrapper.set_last_name(v, flag);
        }
        if let Some(v) = member.dob {
            wrapper.set_dob(v, flag);
        }
        if let Some(v) = member.gender {
            wrapper.set_gender(v, flag);
        }
        let address = member.address_fields();
        if !address.is_empty() {
            wrapper.set_address(&address, flag);
        }
        if let Some(v) = &member.mobile_number {
            wrapper.set_mobile_number(v, flag);
        }
        if let Some(v) = &member.email {
            wrapper.set_email(v, flag);
        }
        if let Some(v) = &member.country {
            wrapper.set_country(v, flag)?;
        }
        wrapper.set_receive_email(member.receive_email, flag);
        wrapper.set_receive_sms(member.receive_sms, flag);
        if let Some(v) = &member.username {
            wrapper.set_username(v, flag);
        }
        if let Some(v) = &member.password {
            wrapper.set_password(v, flag);
        }
        Ok(wrapper)
    }

    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    pub fn into_consumer(self) -> Consumer {
        self.consumer
    }

    pub fn context(&self) -> &ConsumerContext {
        &self.context
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.consumer_profile.is_none()
            && self.consumer.user_account.is_none()
            && self.consumer.preferences.is_none()
    }

    pub fn profile_is_empty(&self) -> bool {
        self.consumer.consumer_profile.is_none()
    }

    fn profile(&self) -> Option<&ConsumerProfile> {
        self.consumer.consumer_profile.as_ref()
    }

    fn get_or_create_profile(&mut self) -> &mut ConsumerProfile {
        let promo_code = &self.context.promo_code;
        self.consumer.consumer_profile.get_or_insert_with(|| ConsumerProfile {
            // Neo requires a title but members don't have one
            title: Some(String::new()),
            promo_code: Some(promo_code.clone()),
            ..Default::default()
        })
    }

    fn get_or_create_account(&mut self) -> &mut UserAccount {
        self.consumer.user_account.get_or_insert_with(UserAccount::default)
    }

    fn get_or_create_preferences(&mut self) -> &mut Preferences {
        self.consumer.preferences.get_or_insert_with(Preferences::default)
    }

    fn get_preference(&self, category_id: u32, question_id: u32) -> Option<&[Answer]> {
        self.consumer
            .preferences
            .as_ref()?
            .categories
            .iter()
            .find(|c| c.category_id == category_id)?
            .questions
            .iter()
            .find(|q| q.question_id == question_id)
            .map(|q| q.answers.as_slice())
    }

    fn get_preference_mut(&mut self, category_id: u32, question_id: u32) -> Option<&mut Vec<Answer>> {
        self.consumer
            .preferences
            .as_mut()?
            .categories
            .iter_mut()
            .find(|c| c.category_id == category_id)?
            .questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
            .map(|q| &mut q.answers)
    }

    /// Appends a new answer, creating its category and question when missing.
    fn set_preference(&mut self, mut answer: Answer, category_id: u32, question_id: u32, flag: ModifyFlag) {
        answer.modify_flag = Some(match flag {
            ModifyFlag::Update => ModifyFlag::Modify,
            other => other,
        });
        let prefs = self.get_or_create_preferences();
        let idx = match prefs.categories.iter().position(|c| c.category_id == category_id) {
            Some(idx) => idx,
            None => {
                prefs.categories.push(QuestionCategory {
                    category_id,
                    questions: Vec::new(),
                });
                prefs.categories.len() - 1
            }
        };
        let category = &mut prefs.categories[idx];
        match category.questions.iter_mut().find(|q| q.question_id == question_id) {
            Some(question) => question.answers.push(answer),
            None => category.questions.push(QuestionAnswers {
                question_id,
                answers: vec![answer],
            }),
        }
    }

    fn get_opt_in(&self, question_id: u32, comm_channel: u32) -> Option<bool> {
        let brand_id = self.context.brand_id;
        self.get_preference(QUESTION_CATEGORY_OPTIN, question_id)?
            .iter()
            .find(|a| {
                a.communication_channel == Some(comm_channel)
                    && a.brand_id.map_or(true, |b| b == brand_id)
            })
            .map(|a| a.option_id == Some(OPTION_YES))
    }

    fn set_opt_in(&mut self, value: bool, question_id: u32, comm_channel: u32, flag: ModifyFlag) {
        let brand_id = self.context.brand_id;
        let option_id = if value { OPTION_YES } else { OPTION_NO };
        if let Some(answers) = self.get_preference_mut(QUESTION_CATEGORY_OPTIN, question_id) {
            if let Some(existing) = answers
                .iter_mut()
                .find(|a| a.brand_id == Some(brand_id) && a.communication_channel == Some(comm_channel))
            {
                existing.option_id = Some(option_id);
                existing.modify_flag = Some(flag);
                return;
            }
        }
        let answer = Answer {
            option_id: Some(option_id),
            brand_id: Some(brand_id),
            communication_channel: Some(comm_channel),
            ..Default::default()
        };
        self.set_preference(answer, QUESTION_CATEGORY_OPTIN, question_id, flag);
    }

    /// Copies remote entry ids onto the entries this wrapper updates or deletes.
    pub fn set_ids_for_profile(&mut self, remote: &ConsumerProfile) {
        let Some(profile) = self.consumer.consumer_profile.as_mut() else {
            return;
        };
        if let Some(address) = profile.addresses.first_mut() {
            if address.modify_flag != Some(ModifyFlag::Insert) {
                address.address_id = remote
                    .addresses
                    .iter()
                    .find(|a| a.address_type == Some(ADDRESS_TYPE_HOME))
                    .or_else(|| remote.addresses.first())
                    .and_then(|a| a.address_id);
            }
        }
        for email in profile.emails.iter_mut() {
            if email.modify_flag == Some(ModifyFlag::Insert) {
                continue;
            }
            if let Some(remote_email) = remote
                .emails
                .iter()
                .find(|e| e.email_category.is_some() && e.email_category == email.email_category)
            {
                email.id = remote_email.id;
            }
        }
        if let Some(phone) = profile.phones.first_mut() {
            if phone.modify_flag != Some(ModifyFlag::Insert) {
                phone.phone_id = remote.phones.first().and_then(|p| p.phone_id);
            }
        }
    }

    pub fn receive_sms(&self) -> Option<bool> {
        self.get_opt_in(OPT_IN_QUESTION, COMM_CHANNEL_SMS)
    }

    pub fn receive_email(&self) -> Option<bool> {
        self.get_opt_in(OPT_IN_QUESTION, COMM_CHANNEL_EMAIL)
    }

    /// Country of residence as an ISO code.
    pub fn country(&self) -> Option<String> {
        let option_id = self
            .get_preference(QUESTION_CATEGORY_GENERAL, COUNTRY_QUESTION)?
            .first()?
            .option_id?;
        self.context.countries.code_for(option_id).map(str::to_string)
    }

    pub fn dob(&self) -> Result<Option<NaiveDate>> {
        let Some(raw) = self.profile().and_then(|p| p.dob.as_deref()) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        // Neo may append a time component
        let date_part = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, DOB_FORMAT)
            .map(Some)
            .map_err(|_| NeoError::InvalidValue {
                field: "DOB".to_string(),
                value: raw.to_string(),
            })
    }

    pub fn email(&self) -> Option<String> {
        self.profile()?
            .emails
            .iter()
            .find(|e| e.email_category == Some(EMAIL_CATEGORY_PERSONAL))
            .and_then(|e| e.email_id.clone())
    }

    pub fn mobile_number(&self) -> Option<String> {
        self.profile()?
            .phones
            .iter()
            .find(|p| p.phone_type == Some(PHONE_TYPE_MOBILE))
            .and_then(|p| p.phone_number.clone())
    }

    pub fn first_name(&self) -> Option<String> {
        self.profile()?.first_name.clone()
    }

    pub fn last_name(&self) -> Option<String> {
        self.profile()?.last_name.clone()
    }

    pub fn address(&self) -> Option<AddressFields> {
        let a = self.profile()?.addresses.first()?;
        Some(AddressFields {
            address: a.address1.clone(),
            city: a.city.clone(),
            province: a.state_other.clone(),
            zipcode: a.zip_code.clone(),
            country: a.country.clone(),
        })
    }

    pub fn gender(&self) -> Option<Gender> {
        match self.profile()?.gender? {
            GENDER_MALE => Some(Gender::Male),
            _ => Some(Gender::Female),
        }
    }

    pub fn username(&self) -> Option<String> {
        self.consumer
            .user_account
            .as_ref()?
            .login_credentials
            .login_name
            .clone()
    }

    pub fn password(&self) -> Option<String> {
        self.consumer
            .user_account
            .as_ref()?
            .login_credentials
            .password
            .clone()
    }

    pub fn set_receive_sms(&mut self, value: bool, flag: ModifyFlag) {
        self.set_opt_in(value, OPT_IN_QUESTION, COMM_CHANNEL_SMS, flag);
    }

    pub fn set_receive_email(&mut self, value: bool, flag: ModifyFlag) {
        self.set_opt_in(value, OPT_IN_QUESTION, COMM_CHANNEL_EMAIL, flag);
    }

    pub fn set_country(&mut self, country_code: &str, flag: ModifyFlag) -> Result<()> {
        if country_code.is_empty() {
            return Ok(());
        }
        let option_id = self
            .context
            .countries
            .option_id(country_code)
            .ok_or_else(|| NeoError::InvalidValue {
                field: "country".to_string(),
                value: country_code.to_string(),
            })?;
        if let Some(existing) = self
            .get_preference_mut(QUESTION_CATEGORY_GENERAL, COUNTRY_QUESTION)
            .and_then(|answers| answers.first_mut())
        {
            existing.option_id = Some(option_id);
            existing.modify_flag = Some(flag);
            return Ok(());
        }
        let answer = Answer {
            option_id: Some(option_id),
            ..Default::default()
        };
        self.set_preference(answer, QUESTION_CATEGORY_GENERAL, COUNTRY_QUESTION, flag);
        Ok(())
    }

    pub fn set_dob(&mut self, dob: NaiveDate, _flag: ModifyFlag) {
        self.get_or_create_profile().dob = Some(dob.format(DOB_FORMAT).to_string());
    }

    pub fn set_first_name(&mut self, first_name: &str, _flag: ModifyFlag) {
        self.get_or_create_profile().first_name = Some(first_name.to_string());
    }

    pub fn set_last_name(&mut self, last_name: &str, _flag: ModifyFlag) {
        self.get_or_create_profile().last_name = Some(last_name.to_string());
    }

    pub fn set_gender(&mut self, gender: Gender, _flag: ModifyFlag) {
        self.get_or_create_profile().gender = Some(match gender {
            Gender::Male => GENDER_MALE,
            Gender::Female => GENDER_FEMALE,
        });
    }

    pub fn set_username(&mut self, username: &str, _flag: ModifyFlag) {
        self.get_or_create_account().login_credentials.login_name = Some(username.to_string());
    }

    pub fn set_password(&mut self, password: &str, _flag: ModifyFlag) {
        self.get_or_create_account().login_credentials.password = Some(password.to_string());
    }

    pub fn set_address(&mut self, fields: &AddressFields, flag: ModifyFlag) {
        let profile = self.get_or_create_profile();
        let apply = |a: &mut AddressDetails| {
            a.address1 = fields.address.clone();
            a.city = fields.city.clone();
            a.state_other = fields.province.clone();
            a.zip_code = fields.zipcode.clone();
            a.country = fields.country.clone();
            a.modify_flag = Some(flag);
        };
        match profile
            .addresses
            .iter_mut()
            .find(|a| a.address_type == Some(ADDRESS_TYPE_HOME))
        {
            Some(existing) => apply(existing),
            None => {
                let mut address = AddressDetails {
                    address_type: Some(ADDRESS_TYPE_HOME),
                    ..Default::default()
                };
                apply(&mut address);
                profile.addresses.push(address);
            }
        }
    }

    pub fn set_email(&mut self, email: &str, flag: ModifyFlag) {
        if email.is_empty() {
            return;
        }
        let profile = self.get_or_create_profile();
        if let Some(existing) = profile
            .emails
            .iter_mut()
            .find(|e| e.email_category == Some(EMAIL_CATEGORY_PERSONAL))
        {
            existing.email_id = Some(email.to_string());
            existing.modify_flag = Some(flag);
            return;
        }
        let is_default = if profile.emails.is_empty() { 1 } else { 0 };
        profile.emails.push(EmailDetails {
            email_id: Some(email.to_string()),
            email_category: Some(EMAIL_CATEGORY_PERSONAL),
            is_default_flag: Some(is_default),
            modify_flag: Some(flag),
            ..Default::default()
        });
    }

    /// Sets the mobile phone and its companion mobile-number email entry.
    pub fn set_mobile_number(&mut self, mobile_number: &str, flag: ModifyFlag) {
        if mobile_number.is_empty() {
            return;
        }
        let profile = self.get_or_create_profile();
        match profile.phones.first_mut() {
            None => {
                profile.phones.push(PhoneDetails {
                    phone_number: Some(mobile_number.to_string()),
                    phone_type: Some(PHONE_TYPE_MOBILE),
                    modify_flag: Some(flag),
                    ..Default::default()
                });
                let is_default = if profile.emails.is_empty() { 1 } else { 0 };
                profile.emails.push(EmailDetails {
                    email_id: Some(mobile_number.to_string()),
                    email_category: Some(EMAIL_CATEGORY_MOBILE_NO),
                    is_default_flag: Some(is_default),
                    modify_flag: Some(flag),
                    ..Default::default()
                });
            }
            Some(phone) => {
                phone.phone_number = Some(mobile_number.to_string());
                phone.modify_flag = Some(flag);
                if let Some(email) = profile
                    .emails
                    .iter_mut()
                    .find(|e| e.email_category == Some(EMAIL_CATEGORY_MOBILE_NO))
                {
                    email.email_id = Some(mobile_number.to_string());
                    email.modify_flag = Some(flag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConsumerContext {
        ConsumerContext::new(35, "testPromo").with_countries([("ZA".to_string(), 197)])
    }

    #[test]
    fn test_new_wrapper_is_empty() {
        let wrapper = ConsumerWrapper::new(context());
        assert!(wrapper.is_empty());
        assert!(wrapper.profile_is_empty());
        assert_eq!(wrapper.first_name(), None);
        assert_eq!(wrapper.receive_sms(), None);
    }

    #[test]
    fn test_profile_gets_blank_title_and_promo_code() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_first_name("Jo", ModifyFlag::Insert);
        let profile = wrapper.consumer().consumer_profile.as_ref().unwrap();
        assert_eq!(profile.title.as_deref(), Some(""));
        assert_eq!(profile.promo_code.as_deref(), Some("testPromo"));
        assert!(!wrapper.is_empty());
    }

    #[test]
    fn test_opt_ins_share_one_question() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_receive_email(true, ModifyFlag::Insert);
        wrapper.set_receive_sms(false, ModifyFlag::Insert);
        assert_eq!(wrapper.receive_email(), Some(true));
        assert_eq!(wrapper.receive_sms(), Some(false));

        let prefs = wrapper.consumer().preferences.as_ref().unwrap();
        assert_eq!(prefs.categories.len(), 1);
        assert_eq!(prefs.categories[0].category_id, QUESTION_CATEGORY_OPTIN);
        assert_eq!(prefs.categories[0].questions.len(), 1);
        assert_eq!(prefs.categories[0].questions[0].answers.len(), 2);

        // Updating an existing answer modifies it in place.
        wrapper.set_receive_sms(true, ModifyFlag::Update);
        let answers = &wrapper.consumer().preferences.as_ref().unwrap().categories[0].questions[0].answers;
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[1].option_id, Some(OPTION_YES));
        assert_eq!(answers[1].modify_flag, Some(ModifyFlag::Update));
    }

    #[test]
    fn test_new_preference_answers_use_modify_flag_for_updates() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_country("ZA", ModifyFlag::Update).unwrap();
        let answer = &wrapper.consumer().preferences.as_ref().unwrap().categories[0].questions[0].answers[0];
        assert_eq!(answer.modify_flag, Some(ModifyFlag::Modify));
        assert_eq!(answer.option_id, Some(197));
        assert_eq!(wrapper.country().as_deref(), Some("ZA"));
    }

    #[test]
    fn test_unknown_country_is_an_error() {
        let mut wrapper = ConsumerWrapper::new(context());
        assert!(wrapper.set_country("XX", ModifyFlag::Insert).is_err());
        assert!(wrapper.is_empty());
    }

    #[test]
    fn test_mobile_number_adds_phone_and_email() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_mobile_number("0821234567", ModifyFlag::Insert);
        wrapper.set_email("jo@example.com", ModifyFlag::Insert);
        let profile = wrapper.consumer().consumer_profile.as_ref().unwrap();
        assert_eq!(profile.phones.len(), 1);
        assert_eq!(profile.emails.len(), 2);
        assert_eq!(profile.emails[0].email_category, Some(EMAIL_CATEGORY_MOBILE_NO));
        assert_eq!(profile.emails[0].is_default_flag, Some(1));
        assert_eq!(profile.emails[1].is_default_flag, Some(0));

        wrapper.set_mobile_number("0829999999", ModifyFlag::Update);
        let profile = wrapper.consumer().consumer_profile.as_ref().unwrap();
        assert_eq!(profile.phones.len(), 1);
        assert_eq!(profile.emails[0].email_id.as_deref(), Some("0829999999"));
        assert_eq!(profile.emails[0].modify_flag, Some(ModifyFlag::Update));
        assert_eq!(wrapper.mobile_number().as_deref(), Some("0829999999"));
        assert_eq!(wrapper.email().as_deref(), Some("jo@example.com"));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_email("", ModifyFlag::Insert);
        wrapper.set_mobile_number("", ModifyFlag::Insert);
        wrapper.set_country("", ModifyFlag::Insert).unwrap();
        assert!(wrapper.is_empty());
    }

    #[test]
    fn test_set_ids_for_profile_skips_inserts() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.set_email("new@example.com", ModifyFlag::Update);
        wrapper.set_mobile_number("0820000000", ModifyFlag::Insert);
        wrapper.set_address(
            &AddressFields {
                city: Some("Durban".into()),
                ..Default::default()
            },
            ModifyFlag::Delete,
        );

        let remote = ConsumerProfile {
            addresses: vec![AddressDetails {
                address_id: Some(11),
                address_type: Some(ADDRESS_TYPE_HOME),
                ..Default::default()
            }],
            phones: vec![PhoneDetails {
                phone_id: Some(22),
                ..Default::default()
            }],
            emails: vec![
                EmailDetails {
                    id: Some(33),
                    email_category: Some(EMAIL_CATEGORY_PERSONAL),
                    ..Default::default()
                },
                EmailDetails {
                    id: Some(44),
                    email_category: Some(EMAIL_CATEGORY_MOBILE_NO),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        wrapper.set_ids_for_profile(&remote);

        let profile = wrapper.consumer().consumer_profile.as_ref().unwrap();
        assert_eq!(profile.addresses[0].address_id, Some(11));
        let personal = profile
            .emails
            .iter()
            .find(|e| e.email_category == Some(EMAIL_CATEGORY_PERSONAL))
            .unwrap();
        assert_eq!(personal.id, Some(33));
        let mobile = profile
            .emails
            .iter()
            .find(|e| e.email_category == Some(EMAIL_CATEGORY_MOBILE_NO))
            .unwrap();
        assert_eq!(mobile.id, None);
        assert_eq!(profile.phones[0].phone_id, None);
    }

    #[test]
    fn test_dob_accepts_trailing_time() {
        let mut wrapper = ConsumerWrapper::new(context());
        wrapper.get_or_create_profile().dob = Some("1990-04-01T00:00:00".into());
        assert_eq!(
            wrapper.dob().unwrap(),
            NaiveDate::from_ymd_opt(1990, 4, 1)
        );
        wrapper.get_or_create_profile().dob = Some("April".into());
        assert!(wrapper.dob().is_err());
    }
}
