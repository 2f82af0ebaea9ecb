#![allow(dead_code)]

use dynamics_webapi::api::{
    ClientCredentialsGrant, DynamicsClient, EntityType, Many, Property, Ref, ResilienceConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/tenant/oauth2/token";
pub const API: &str = "/api/data/v9.2";

pub struct Incident;
pub struct Contact;
pub struct Account;

impl EntityType for Incident {
    const LOGICAL_NAME: &'static str = "incident";
}

impl EntityType for Contact {
    const LOGICAL_NAME: &'static str = "contact";
}

impl EntityType for Account {
    const LOGICAL_NAME: &'static str = "account";
}

pub fn case_number() -> Property<Incident, String> {
    Property::required("casenumber")
}

pub fn title() -> Property<Incident, String> {
    Property::optional("title")
}

pub fn primary_contact() -> Property<Incident, Ref<Contact>> {
    Property::optional_reference("primarycontactid")
}

pub fn full_name() -> Property<Contact, String> {
    Property::required("fullname")
}

pub fn parent_customer() -> Property<Contact, Ref<Account>> {
    Property::optional_reference("parentcustomerid")
}

pub fn account_name() -> Property<Account, String> {
    Property::required("name")
}

pub fn revenue() -> Property<Account, f64> {
    Property::optional("revenue")
}

pub fn account_contacts() -> Property<Account, Many<Contact>> {
    Property::collection("contact_customer_accounts")
}

pub fn token_body() -> serde_json::Value {
    let expires_on = chrono::Utc::now().timestamp() + 3600;
    json!({
        "token_type": "Bearer",
        "expires_on": expires_on.to_string(),
        "access_token": "test-token",
    })
}

/// Serve tokens from the mock identity endpoint
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(server)
        .await;
}

pub fn grant(server: &MockServer) -> ClientCredentialsGrant {
    ClientCredentialsGrant::new("tenant", server.uri(), "client-id", "client-secret")
        .with_token_endpoint(format!("{}{}", server.uri(), TOKEN_PATH))
}

pub fn client_with(server: &MockServer, resilience: ResilienceConfig) -> DynamicsClient {
    DynamicsClient::builder(server.uri(), grant(server))
        .resilience(resilience)
        .build()
        .unwrap()
}

pub fn client(server: &MockServer) -> DynamicsClient {
    client_with(server, ResilienceConfig::default())
}

pub fn api_path(tail: &str) -> String {
    format!("{}/{}", API, tail)
}
