use super::{error_from_response, AuthRequest, Credentials, Login, NeoApi};
use crate::config::NeoConfig;
use crate::constants::DOB_QUERY_FORMAT;
use crate::error::{NeoError, Result};
use crate::metrics::{time_call, ApiMetrics};
use crate::xml::{self, temp_token_from_node, Consumer, ConsumerProfile, ConsumerSummary, Preferences, XmlNode};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, PROXY_AUTHORIZATION,
};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info, instrument};

static CONSUMER_LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"/consumers/(\d+)/").unwrap());

type Query = Vec<(&'static str, String)>;

enum RequestBody {
    /// No body; the request still carries the XML content type.
    None,
    Xml(String),
    /// An empty body sent with `Content-Length: 0` and no content type.
    Empty,
}

struct NeoResponse {
    status: u16,
    location: Option<String>,
    body: String,
}

/// The question-answer documents that share one update endpoint shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerDocument {
    Preferences,
    DigitalInteractions,
    ConversionLocations,
}

impl AnswerDocument {
    pub fn root_tag(self) -> &'static str {
        match self {
            AnswerDocument::Preferences => "Preferences",
            AnswerDocument::DigitalInteractions => "DigitalInteractions",
            AnswerDocument::ConversionLocations => "ConversionLocations",
        }
    }
}

pub struct NeoClient {
    http: reqwest::Client,
    base_url: String,
    config: NeoConfig,
}

impl NeoClient {
    pub fn new(config: NeoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_cert)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            config,
        })
    }

    pub fn config(&self) -> &NeoConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn promo_code(&self, promo_code: Option<&str>) -> String {
        promo_code
            .filter(|p| !p.is_empty())
            .unwrap_or(self.config.promo_code.as_str())
            .to_string()
    }

    fn headers(&self, credentials: Option<&Credentials>, empty_body: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if empty_body {
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        } else {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        }
        if self.config.use_mcal {
            let password = self.config.password.as_deref().ok_or_else(|| {
                NeoError::ImproperlyConfigured("Neo setting PASSWORD is missing.".to_string())
            })?;
            headers.insert(
                PROXY_AUTHORIZATION,
                basic_auth(&format!("{}:{}", self.config.app_id, password))?,
            );
            if let Some(creds) = credentials {
                let promo = self.promo_code(creds.promo_code.as_deref());
                headers.insert(
                    AUTHORIZATION,
                    basic_auth(&format!("{}:{}:{}", creds.username, creds.password, promo))?,
                );
            }
        }
        Ok(headers)
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        query: &Query,
        body: RequestBody,
        credentials: Option<&Credentials>,
    ) -> Result<NeoResponse> {
        let _timing = time_call(operation);
        let headers = self.headers(credentials, matches!(body, RequestBody::Empty))?;
        let mut request = self.http.request(method, url).headers(headers);
        if !query.is_empty() {
            request = request.query(query);
        }
        request = match body {
            RequestBody::None => request,
            RequestBody::Xml(xml) => request.body(xml),
            RequestBody::Empty => request.body(""),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        info!(operation, status, "Neo API call");
        ApiMetrics::record_call(operation, status);
        Ok(NeoResponse {
            status,
            location,
            body,
        })
    }

    /// Sends a request and fails unless Neo answers with `expected`.
    #[allow(clippy::too_many_arguments)]
    async fn call(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        query: &Query,
        body: RequestBody,
        credentials: Option<&Credentials>,
        expected: u16,
    ) -> Result<NeoResponse> {
        let response = self
            .send(operation, method.clone(), url, query, body, credentials)
            .await?;
        if response.status == expected {
            Ok(response)
        } else {
            Err(error_from_response(operation, &method, response.status, &response.body))
        }
    }

    /// Like `call`, but also requires the body to be an XML document.
    async fn fetch_xml(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        query: &Query,
        body: RequestBody,
        credentials: Option<&Credentials>,
    ) -> Result<XmlNode> {
        let response = self
            .call(operation, method.clone(), url, query, body, credentials, 200)
            .await?;
        xml::parse(&response.body)
            .map_err(|_| error_from_response(operation, &method, response.status, &response.body))
    }

    #[instrument(skip(self, token))]
    pub async fn remember_me(&self, consumer_id: &str, token: &str) -> Result<()> {
        let url = self.url(&format!("consumers/{}/useraccount", consumer_id));
        let query = vec![("authtoken", token.to_string())];
        self.call("remember_me", Method::PUT, &url, &query, RequestBody::None, None, 200)
            .await?;
        Ok(())
    }

    /// Finds consumers registered with an email address or mobile number and date of birth.
    #[instrument(skip(self))]
    pub async fn get_consumers(&self, email_id: &str, dob: NaiveDate) -> Result<Vec<ConsumerSummary>> {
        let query = vec![
            ("dateofbirth", dob.format(DOB_QUERY_FORMAT).to_string()),
            ("emailid", email_id.to_string()),
        ];
        let node = self
            .fetch_xml("get_consumers", Method::GET, &self.url("consumers/"), &query, RequestBody::None, None)
            .await?;
        ConsumerSummary::list_from_node(&node)
    }

    /// Links a consumer registered through another application to this one.
    #[instrument(skip(self, password))]
    pub async fn link_consumer(
        &self,
        consumer_id: &str,
        username: &str,
        password: &str,
        promo_code: Option<&str>,
        acquisition_source: Option<&str>,
    ) -> Result<XmlNode> {
        let mut query = vec![
            ("loginname", username.to_string()),
            ("password", password.to_string()),
            ("promocode", self.promo_code(promo_code)),
        ];
        if let Some(src) = acquisition_source {
            query.push(("acquisitionsource", src.to_string()));
        }
        let url = self.url(&format!("consumers/{}/registration/", consumer_id));
        self.fetch_xml("link_consumer", Method::PUT, &url, &query, RequestBody::None, None)
            .await
    }

    #[instrument(skip(self, credentials))]
    pub async fn get_consumer_preferences(
        &self,
        consumer_id: &str,
        category_id: Option<u32>,
        credentials: Option<&Credentials>,
    ) -> Result<Preferences> {
        let mut path = format!("consumers/{}/preferences", consumer_id);
        if let Some(category) = category_id {
            path.push_str(&format!("/category/{}", category));
        }
        let node = self
            .fetch_xml(
                "get_consumer_preferences",
                Method::GET,
                &self.url(&path),
                &Query::new(),
                RequestBody::None,
                credentials,
            )
            .await?;
        Preferences::from_node(&node)
    }

    /// Creates (POST) or replaces (PUT) one of the consumer's answer documents.
    #[instrument(skip(self, document, credentials), fields(root = kind.root_tag()))]
    pub async fn update_answers(
        &self,
        consumer_id: &str,
        kind: AnswerDocument,
        document: &XmlNode,
        category_id: Option<u32>,
        create: bool,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let root = kind.root_tag();
        let mut path = format!("consumers/{}/{}", consumer_id, root.to_lowercase());
        if let Some(category) = category_id {
            path.push_str(&format!("/category/{}", category));
        }
        let body = xml::to_string(&document.clone().renamed(root))?;
        let method = if create { Method::POST } else { Method::PUT };
        let operation = match kind {
            AnswerDocument::Preferences => "update_consumer_preferences",
            AnswerDocument::DigitalInteractions => "update_digital_interactions",
            AnswerDocument::ConversionLocations => "update_conversion_locations",
        };
        self.call(operation, method, &self.url(&path), &Query::new(), RequestBody::Xml(body), credentials, 200)
            .await?;
        Ok(())
    }

    pub async fn update_consumer_preferences(
        &self,
        consumer_id: &str,
        preferences: &Preferences,
        category_id: Option<u32>,
        create: bool,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        self.update_answers(
            consumer_id,
            AnswerDocument::Preferences,
            &preferences.to_node(),
            category_id,
            create,
            credentials,
        )
        .await
    }

    pub async fn update_digital_interactions(
        &self,
        consumer_id: &str,
        interactions: &XmlNode,
        category_id: Option<u32>,
        create: bool,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        self.update_answers(
            consumer_id,
            AnswerDocument::DigitalInteractions,
            interactions,
            category_id,
            create,
            credentials,
        )
        .await
    }

    pub async fn update_conversion_locations(
        &self,
        consumer_id: &str,
        locations: &XmlNode,
        category_id: Option<u32>,
        create: bool,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        self.update_answers(
            consumer_id,
            AnswerDocument::ConversionLocations,
            locations,
            category_id,
            create,
            credentials,
        )
        .await
    }

    /// Neo has no endpoint for deleting consumers.
    pub async fn remove_consumer(&self, _consumer_id: &str) -> Result<()> {
        Err(NeoError::Unsupported("removing consumers"))
    }

    /// Unsubscribes a logged in consumer from a brand or communication channel.
    #[instrument(skip(self, unsubscribe))]
    pub async fn unsubscribe(&self, consumer_id: &str, unsubscribe: &XmlNode) -> Result<()> {
        let url = self.url(&format!("consumers/{}/preferences/unsubscribe", consumer_id));
        let body = xml::to_string(unsubscribe)?;
        self.call("unsubscribe", Method::PUT, &url, &Query::new(), RequestBody::Xml(body), None, 200)
            .await?;
        Ok(())
    }

    /// Adds a promo code from the master promo code list to a consumer.
    #[instrument(skip(self, credentials))]
    pub async fn add_promo_code(
        &self,
        consumer_id: &str,
        promo_code: &str,
        acquisition_source: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let mut query = vec![("promocode", promo_code.to_string())];
        if let Some(src) = acquisition_source {
            query.push(("acquisitionsource", src.to_string()));
        }
        let url = self.url(&format!("consumers/{}", consumer_id));
        self.call("add_promo_code", Method::PUT, &url, &query, RequestBody::Empty, credentials, 200)
            .await?;
        Ok(())
    }

    /// Asks Neo whether someone born on `dob` may access the gateway.
    #[instrument(skip(self))]
    pub async fn do_age_check(
        &self,
        dob: NaiveDate,
        country_code: &str,
        gateway_id: &str,
        language_code: Option<&str>,
    ) -> Result<XmlNode> {
        let mut query = vec![
            ("dateofbirth", dob.format(DOB_QUERY_FORMAT).to_string()),
            ("countrycode", country_code.to_string()),
            ("gatewayid", gateway_id.to_string()),
        ];
        if let Some(language) = language_code {
            query.push(("language_code", language.to_string()));
        }
        self.fetch_xml(
            "do_age_check",
            Method::GET,
            &self.url("consumers/affirmage"),
            &query,
            RequestBody::None,
            None,
        )
        .await
    }

    /// Looks up country details by country code, falling back to an IP address.
    #[instrument(skip(self))]
    pub async fn get_country(&self, country_code: Option<&str>, ip_address: Option<&str>) -> Result<XmlNode> {
        let query = match (country_code, ip_address) {
            (Some(code), _) => vec![("countrycode", code.to_string())],
            (None, Some(ip)) => vec![("ipaddress", ip.to_string())],
            (None, None) => {
                return Err(NeoError::InvalidArgument(
                    "Either the country code or ip address needs to be specified.".to_string(),
                ))
            }
        };
        self.fetch_xml("get_country", Method::GET, &self.url("country/"), &query, RequestBody::None, None)
            .await
    }
}

#[async_trait]
impl NeoApi for NeoClient {
    #[instrument(skip(self))]
    async fn authenticate(&self, request: &AuthRequest) -> Result<Option<String>> {
        let mut query = vec![("promocode", self.promo_code(request.promo_code.as_deref()))];
        match &request.login {
            Login::Password { username, password } => {
                query.push(("loginname", username.clone()));
                query.push(("password", password.clone()));
            }
            Login::Token(token) => query.push(("authtoken", token.clone())),
        }
        if let Some(src) = &request.acquisition_source {
            query.push(("acquisitionsource", src.clone()));
        }
        let response = self
            .send(
                "authenticate",
                Method::GET,
                &self.url("consumers/useraccount/"),
                &query,
                RequestBody::None,
                None,
            )
            .await?;
        if response.status == 200 {
            Ok(Some(response.body.trim().to_string()))
        } else {
            debug!("Neo rejected login with status {}", response.status);
            Ok(None)
        }
    }

    #[instrument(skip(self))]
    async fn logout(
        &self,
        consumer_id: &str,
        promo_code: Option<&str>,
        acquisition_source: Option<&str>,
    ) -> Result<()> {
        let mut query = vec![("promocode", self.promo_code(promo_code))];
        if let Some(src) = acquisition_source {
            query.push(("acquisitionsource", src.to_string()));
        }
        let url = self.url(&format!("consumers/{}/useraccount/notifylogout", consumer_id));
        self.call("logout", Method::PUT, &url, &query, RequestBody::Empty, None, 200)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, consumer))]
    async fn create_consumer(&self, consumer: &Consumer) -> Result<(String, String)> {
        let body = xml::to_string(&consumer.to_node())?;
        let response = self
            .call(
                "create_consumer",
                Method::POST,
                &self.url("consumers"),
                &Query::new(),
                RequestBody::Xml(body),
                None,
                201,
            )
            .await?;
        let uri = response
            .location
            .ok_or_else(|| NeoError::MissingField("Location".into()))?;
        let consumer_id = CONSUMER_LOCATION
            .captures(&uri)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| NeoError::Parse(format!("no consumer id in Location {}", uri)))?;
        Ok((consumer_id, uri))
    }

    #[instrument(skip(self))]
    async fn complete_registration(&self, consumer_id: &str, uri: Option<&str>) -> Result<()> {
        match uri {
            Some(uri) => {
                self.call("complete_registration", Method::GET, uri, &Query::new(), RequestBody::None, None, 200)
                    .await?
            }
            None => {
                let url = self.url(&format!("consumers/{}/registration", consumer_id));
                self.call("complete_registration", Method::POST, &url, &Query::new(), RequestBody::Empty, None, 200)
                    .await?
            }
        };
        Ok(())
    }

    #[instrument(skip(self, credentials))]
    async fn get_consumer(&self, consumer_id: &str, credentials: Option<&Credentials>) -> Result<Consumer> {
        let url = self.url(&format!("consumers/{}/all", consumer_id));
        let node = self
            .fetch_xml("get_consumer", Method::GET, &url, &Query::new(), RequestBody::None, credentials)
            .await?;
        Consumer::from_node(&node)
    }

    #[instrument(skip(self, credentials))]
    async fn get_consumer_profile(
        &self,
        consumer_id: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConsumerProfile> {
        let url = self.url(&format!("consumers/{}/profile", consumer_id));
        let node = self
            .fetch_xml("get_consumer_profile", Method::GET, &url, &Query::new(), RequestBody::None, credentials)
            .await?;
        ConsumerProfile::from_node(&node)
    }

    #[instrument(skip(self, consumer, credentials))]
    async fn update_consumer(
        &self,
        consumer_id: &str,
        consumer: &Consumer,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let body = xml::to_string(&consumer.to_node())?;
        let url = self.url(&format!("consumers/{}", consumer_id));
        self.call("update_consumer", Method::PUT, &url, &Query::new(), RequestBody::Xml(body), credentials, 200)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_forgot_password_token(&self, username: &str) -> Result<String> {
        let query = vec![("loginname", username.to_string()), ("temptoken", "0".to_string())];
        let node = self
            .fetch_xml(
                "get_forgot_password_token",
                Method::GET,
                &self.url("consumers/useraccount"),
                &query,
                RequestBody::None,
                None,
            )
            .await?;
        temp_token_from_node(&node)
    }

    #[instrument(skip(self, new_password, old_password, token))]
    async fn change_password(
        &self,
        username: &str,
        new_password: &str,
        old_password: Option<&str>,
        token: Option<&str>,
    ) -> Result<String> {
        let mut query = vec![("loginname", username.to_string())];
        match (old_password, token) {
            (Some(old), _) => {
                query.push(("newpassword", new_password.to_string()));
                query.push(("oldpassword", old.to_string()));
            }
            (None, Some(token)) => {
                query.push(("password", new_password.to_string()));
                query.push(("temptoken", token.to_string()));
            }
            (None, None) => {
                return Err(NeoError::InvalidArgument(
                    "Either the old password or the forgot password token needs to be specified."
                        .to_string(),
                ))
            }
        }
        let response = self
            .call(
                "change_password",
                Method::PUT,
                &self.url("consumers/useraccount"),
                &query,
                RequestBody::Empty,
                None,
                200,
            )
            .await?;
        Ok(response.body.trim().to_string())
    }
}

fn basic_auth(raw: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(raw)))
        .map_err(|e| NeoError::InvalidArgument(format!("invalid credentials header: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}
