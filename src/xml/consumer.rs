//! Typed consumer records exchanged with Neo.
//!
//! Child element order follows the Consumers schema used by the CIDB Data
//! Load Tool; the web service accepts the same order.

use super::XmlNode;
use crate::constants::ModifyFlag;
use crate::error::{NeoError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumer {
    pub consumer_profile: Option<ConsumerProfile>,
    pub preferences: Option<Preferences>,
    pub user_account: Option<UserAccount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerProfile {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `YYYY-MM-DD`
    pub dob: Option<String>,
    pub gender: Option<u32>,
    pub addresses: Vec<AddressDetails>,
    pub phones: Vec<PhoneDetails>,
    pub promo_code: Option<String>,
    pub emails: Vec<EmailDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDetails {
    pub address_id: Option<u64>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
    pub address_type: Option<u32>,
    pub state_other: Option<String>,
    pub modify_flag: Option<ModifyFlag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneDetails {
    pub phone_id: Option<u64>,
    pub phone_number: Option<String>,
    pub phone_type: Option<u32>,
    pub modify_flag: Option<ModifyFlag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailDetails {
    pub id: Option<u64>,
    pub email_id: Option<String>,
    pub email_category: Option<u32>,
    pub is_default_flag: Option<u32>,
    pub modify_flag: Option<ModifyFlag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub categories: Vec<QuestionCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionCategory {
    pub category_id: u32,
    pub questions: Vec<QuestionAnswers>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionAnswers {
    pub question_id: u32,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub option_id: Option<u32>,
    pub modify_flag: Option<ModifyFlag>,
    pub brand_id: Option<u32>,
    pub communication_channel: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAccount {
    pub login_credentials: LoginCredentials,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginCredentials {
    pub login_name: Option<String>,
    pub password: Option<String>,
}

fn text(node: &XmlNode, name: &str) -> Option<String> {
    node.child_text(name).map(str::to_string)
}

fn modify_flag(node: &XmlNode) -> Result<Option<ModifyFlag>> {
    match node.child_text("ModifyFlag").map(str::trim) {
        None | Some("") => Ok(None),
        Some(code) => ModifyFlag::from_code(code).map(Some).ok_or_else(|| NeoError::InvalidValue {
            field: format!("{}/ModifyFlag", node.name),
            value: code.to_string(),
        }),
    }
}

fn required<T: std::str::FromStr>(node: &XmlNode, name: &str) -> Result<T> {
    node.parse_child(name)?
        .ok_or_else(|| NeoError::MissingField(format!("{}/{}", node.name, name)))
}

impl Consumer {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            consumer_profile: node
                .child("ConsumerProfile")
                .map(ConsumerProfile::from_node)
                .transpose()?,
            preferences: node.child("Preferences").map(Preferences::from_node).transpose()?,
            user_account: node.child("UserAccount").map(UserAccount::from_node).transpose()?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Consumer");
        if let Some(profile) = &self.consumer_profile {
            node.push(profile.to_node());
        }
        if let Some(preferences) = &self.preferences {
            node.push(preferences.to_node());
        }
        if let Some(account) = &self.user_account {
            node.push(account.to_node());
        }
        node
    }
}

impl ConsumerProfile {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            title: text(node, "Title"),
            first_name: text(node, "FirstName"),
            last_name: text(node, "LastName"),
            dob: text(node, "DOB"),
            gender: node.parse_child("Gender")?,
            addresses: node
                .children_named("Address")
                .map(AddressDetails::from_node)
                .collect::<Result<_>>()?,
            phones: node
                .children_named("Phone")
                .map(PhoneDetails::from_node)
                .collect::<Result<_>>()?,
            promo_code: text(node, "PromoCode"),
            emails: node
                .children_named("Email")
                .map(EmailDetails::from_node)
                .collect::<Result<_>>()?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("ConsumerProfile");
        node.push_leaf("Title", self.title.as_ref());
        node.push_leaf("FirstName", self.first_name.as_ref());
        node.push_leaf("LastName", self.last_name.as_ref());
        node.push_leaf("DOB", self.dob.as_ref());
        node.push_leaf("Gender", self.gender);
        for address in &self.addresses {
            node.push(address.to_node());
        }
        for phone in &self.phones {
            node.push(phone.to_node());
        }
        node.push_leaf("PromoCode", self.promo_code.as_ref());
        for email in &self.emails {
            node.push(email.to_node());
        }
        node
    }
}

impl AddressDetails {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            address_id: node.parse_child("AddressID")?,
            address1: text(node, "Address1"),
            city: text(node, "City"),
            country: text(node, "Country"),
            zip_code: text(node, "ZipCode"),
            address_type: node.parse_child("AddressType")?,
            state_other: text(node, "StateOther"),
            modify_flag: modify_flag(node)?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Address");
        node.push_leaf("AddressID", self.address_id);
        node.push_leaf("Address1", self.address1.as_ref());
        node.push_leaf("City", self.city.as_ref());
        node.push_leaf("Country", self.country.as_ref());
        node.push_leaf("ZipCode", self.zip_code.as_ref());
        node.push_leaf("AddressType", self.address_type);
        node.push_leaf("StateOther", self.state_other.as_ref());
        node.push_leaf("ModifyFlag", self.modify_flag);
        node
    }
}

impl PhoneDetails {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            phone_id: node.parse_child("PhoneID")?,
            phone_number: text(node, "PhoneNumber"),
            phone_type: node.parse_child("PhoneType")?,
            modify_flag: modify_flag(node)?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Phone");
        node.push_leaf("PhoneID", self.phone_id);
        node.push_leaf("PhoneNumber", self.phone_number.as_ref());
        node.push_leaf("PhoneType", self.phone_type);
        node.push_leaf("ModifyFlag", self.modify_flag);
        node
    }
}

impl EmailDetails {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            id: node.parse_child("Id")?,
            email_id: text(node, "EmailId"),
            email_category: node.parse_child("EmailCategory")?,
            is_default_flag: node.parse_child("IsDefaultFlag")?,
            modify_flag: modify_flag(node)?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Email");
        node.push_leaf("Id", self.id);
        node.push_leaf("EmailId", self.email_id.as_ref());
        node.push_leaf("EmailCategory", self.email_category);
        node.push_leaf("IsDefaultFlag", self.is_default_flag);
        node.push_leaf("ModifyFlag", self.modify_flag);
        node
    }
}

impl Preferences {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            categories: node
                .children_named("QuestionCategory")
                .map(QuestionCategory::from_node)
                .collect::<Result<_>>()?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Preferences");
        for category in &self.categories {
            node.push(category.to_node());
        }
        node
    }
}

impl QuestionCategory {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            category_id: required(node, "CategoryID")?,
            questions: node
                .children_named("QuestionAnswers")
                .map(QuestionAnswers::from_node)
                .collect::<Result<_>>()?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("QuestionCategory").with_child(XmlNode::leaf("CategoryID", self.category_id));
        for question in &self.questions {
            node.push(question.to_node());
        }
        node
    }
}

impl QuestionAnswers {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            question_id: required(node, "QuestionID")?,
            answers: node
                .children_named("Answer")
                .map(Answer::from_node)
                .collect::<Result<_>>()?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("QuestionAnswers").with_child(XmlNode::leaf("QuestionID", self.question_id));
        for answer in &self.answers {
            node.push(answer.to_node());
        }
        node
    }
}

impl Answer {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            option_id: node.parse_child("OptionID")?,
            modify_flag: modify_flag(node)?,
            brand_id: node.parse_child("BrandID")?,
            communication_channel: node.parse_child("CommunicationChannel")?,
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Answer");
        node.push_leaf("OptionID", self.option_id);
        node.push_leaf("ModifyFlag", self.modify_flag);
        node.push_leaf("BrandID", self.brand_id);
        node.push_leaf("CommunicationChannel", self.communication_channel);
        node
    }
}

impl UserAccount {
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        let credentials = node.child("LoginCredentials");
        Ok(Self {
            login_credentials: LoginCredentials {
                login_name: credentials.and_then(|c| text(c, "LoginName")),
                password: credentials.and_then(|c| text(c, "Password")),
            },
        })
    }

    pub fn to_node(&self) -> XmlNode {
        let mut credentials = XmlNode::new("LoginCredentials");
        credentials.push_leaf("LoginName", self.login_credentials.login_name.as_ref());
        credentials.push_leaf("Password", self.login_credentials.password.as_ref());
        XmlNode::new("UserAccount").with_child(credentials)
    }
}
