//! API Constants and Configuration for Dynamics 365 Web API

/// Dynamics 365 Web API version
pub const API_VERSION: &str = "v9.2";

/// Base API path for Dynamics 365
pub const API_BASE_PATH: &str = "/api/data";

/// Full API path with version
pub fn api_path() -> String {
    format!("{}/{}", API_BASE_PATH, API_VERSION)
}

/// Azure AD v1 token endpoint for a tenant
pub fn token_endpoint(tenant_id: &str) -> String {
    format!("https://login.microsoftonline.com/{}/oauth2/token", tenant_id)
}

/// Standard headers for Dynamics 365 requests
pub mod headers {
    pub const ODATA_MAX_VERSION: &str = "OData-MaxVersion";
    pub const ODATA_VERSION: &str = "OData-Version";

    /// Header carrying the URL of a newly created record
    pub const ODATA_ENTITY_ID: &str = "OData-EntityId";

    /// Value for both version headers
    pub const ODATA_VERSION_VALUE: &str = "4.0";

    /// Content type for JSON requests
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    pub const PREFER: &str = "Prefer";

    pub const IF_MATCH: &str = "If-Match";

    /// If-Match value for updates (any version)
    pub const IF_MATCH_ANY: &str = "*";

    pub const RETRY_AFTER: &str = "Retry-After";

    /// `Prefer` value asking for a page size
    pub fn max_page_size(size: u32) -> String {
        format!("odata.maxpagesize={}", size)
    }
}

/// Field names of the OData JSON envelope
pub mod odata {
    pub const CONTEXT: &str = "@odata.context";
    pub const NEXT_LINK: &str = "@odata.nextLink";
    pub const COUNT: &str = "@odata.count";
    pub const VALUE: &str = "value";
    pub const ID: &str = "@odata.id";
}

/// Build full entity endpoint URL
pub fn entity_endpoint(base_url: &str, entity_set: &str) -> String {
    format!("{}{}/{}", base_url.trim_end_matches('/'), api_path(), entity_set)
}

/// Build entity record endpoint URL
pub fn entity_record_endpoint(base_url: &str, entity_set: &str, id: &uuid::Uuid) -> String {
    format!("{}({})", entity_endpoint(base_url, entity_set), id.hyphenated())
}

/// Build the `$ref` endpoint of a navigation property on one record
pub fn reference_endpoint(base_url: &str, entity_set: &str, id: &uuid::Uuid, navigation: &str) -> String {
    format!("{}/{}/$ref", entity_record_endpoint(base_url, entity_set, id), navigation)
}
