//! Dynamics 365 Web API client
//!
//! [`DynamicsClient`] wires the pieces together: requests are compiled by a
//! [`QueryCompiler`], authorized through the [`AuthCache`], dispatched by the
//! [`RateLimitedTransport`] and, for collection queries, walked page by page
//! with a [`PaginationCursor`].

use super::auth::{AuthCache, ClientCredentialsGrant};
use super::constants::{self, headers, odata};
use super::metadata::{EntitySetResolver, PluralizingResolver};
use super::model::{EntityId, EntityRecord, EntityType, Navigable, Property, PropertyKind};
use super::query::{Encoding, FindRequest, Page, PageFetcher, PaginationCursor, QueryCompiler, ValueFormatter};
use super::resilience::{RateLimitedTransport, ResilienceConfig};
use crate::error::{DynamicsError, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const NO_HEADERS: &[(&str, String)] = &[];

/// Stream of typed records produced by [`DynamicsClient::find`].
pub type EntityStream<'a, E> = BoxStream<'a, Result<EntityRecord<E>>>;

/// Modern Dynamics 365 Web API client with connection pooling
pub struct DynamicsClient {
    base_url: String,
    auth: AuthCache,
    transport: RateLimitedTransport<reqwest::Client>,
    compiler: QueryCompiler,
    resolver: Arc<dyn EntitySetResolver>,
    default_page_size: Option<u32>,
}

impl DynamicsClient {
    pub fn builder(base_url: impl Into<String>, grant: ClientCredentialsGrant) -> DynamicsClientBuilder {
        DynamicsClientBuilder::new(base_url, grant)
    }

    /// Organization URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthCache {
        &self.auth
    }

    pub fn transport(&self) -> &RateLimitedTransport<reqwest::Client> {
        &self.transport
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Collection name of `E`
    pub fn entity_set<E: EntityType>(&self) -> String {
        self.resolver.entity_set(E::LOGICAL_NAME)
    }

    /// Absolute URL of the first page of `request` against `entity_set`
    pub fn query_url<E: EntityType>(&self, entity_set: &str, request: &FindRequest<E>) -> String {
        let endpoint = constants::entity_endpoint(&self.base_url, entity_set);
        let query = self.compiler.query_string(request, Encoding::Escaped);
        if query.is_empty() {
            endpoint
        } else {
            format!("{}?{}", endpoint, query)
        }
    }

    /// Lazily stream every record matching `request`
    pub fn find<'a, E: EntityType>(&'a self, request: &FindRequest<E>, cancel: CancellationToken) -> EntityStream<'a, E> {
        self.find_in(&self.entity_set::<E>(), request, cancel)
    }

    /// Like [`DynamicsClient::find`] against an explicit entity set, for
    /// requests over [`super::model::Untyped`]
    pub fn find_in<'a, E: EntityType>(
        &'a self,
        entity_set: &str,
        request: &FindRequest<E>,
        cancel: CancellationToken,
    ) -> EntityStream<'a, E> {
        let url = self.query_url(entity_set, request);
        debug!("Querying {}", url);

        PaginationCursor::new(self, url, cancel)
            .max_page_size(request.max_page_size().or(self.default_page_size))
            .offset(request.offset().unwrap_or(0))
            .limit(request.limit())
            .into_stream()
            .map_ok(EntityRecord::new)
            .boxed()
    }

    /// Collect every record matching `request`
    pub async fn find_all<E: EntityType>(
        &self,
        request: &FindRequest<E>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntityRecord<E>>> {
        self.find(request, cancel.clone()).try_collect().await
    }

    /// Fetch one record by id, `None` when it does not exist
    ///
    /// Only the selection and expansion of `request` are used.
    pub async fn retrieve<E: EntityType>(
        &self,
        id: Uuid,
        request: &FindRequest<E>,
        cancel: &CancellationToken,
    ) -> Result<Option<EntityRecord<E>>> {
        let mut url = constants::entity_record_endpoint(&self.base_url, &self.entity_set::<E>(), &id);
        let options: Vec<String> = self
            .compiler
            .query_parts(request)
            .into_iter()
            .filter(|(name, _)| matches!(*name, "$select" | "$expand"))
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(&value)))
            .collect();
        if !options.is_empty() {
            url = format!("{}?{}", url, options.join("&"));
        }

        let response = self
            .send(
                || self.build_request(Method::GET, &url, None, NO_HEADERS, cancel),
                &[StatusCode::NOT_FOUND],
                cancel,
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        match read_json(response, cancel).await? {
            Value::Object(fields) => Ok(Some(EntityRecord::new(fields))),
            other => Err(DynamicsError::malformed(format!("record is not a JSON object: {}", other))),
        }
    }

    /// Create a record and return its id
    pub async fn create<E: EntityType>(&self, body: &impl Serialize, cancel: &CancellationToken) -> Result<EntityId> {
        let url = constants::entity_endpoint(&self.base_url, &self.entity_set::<E>());
        let body = serde_json::to_value(body)?;

        let response = self
            .send(|| self.build_request(Method::POST, &url, Some(&body), NO_HEADERS, cancel), &[], cancel)
            .await?;

        let header = response
            .headers()
            .get(headers::ODATA_ENTITY_ID)
            .ok_or_else(|| DynamicsError::malformed("create response without OData-EntityId"))?
            .to_str()
            .map_err(|_| DynamicsError::malformed("OData-EntityId is not valid text"))?;

        EntityId::from_entity_id_header(E::LOGICAL_NAME, header)
    }

    /// Update an existing record; fails instead of creating one
    pub async fn update<E: EntityType>(&self, id: Uuid, body: &impl Serialize, cancel: &CancellationToken) -> Result<()> {
        let url = constants::entity_record_endpoint(&self.base_url, &self.entity_set::<E>(), &id);
        let body = serde_json::to_value(body)?;
        let extra = [(headers::IF_MATCH, headers::IF_MATCH_ANY.to_string())];

        self.send(|| self.build_request(Method::PATCH, &url, Some(&body), &extra, cancel), &[], cancel)
            .await?;
        Ok(())
    }

    pub async fn delete<E: EntityType>(&self, id: Uuid, cancel: &CancellationToken) -> Result<()> {
        let url = constants::entity_record_endpoint(&self.base_url, &self.entity_set::<E>(), &id);

        self.send(|| self.build_request(Method::DELETE, &url, None, NO_HEADERS, cancel), &[], cancel)
            .await?;
        Ok(())
    }

    /// Link `target` to record `id` through `navigation`
    ///
    /// Single-valued navigations are set with `PUT`, collection-valued ones
    /// gain a member with `POST`.
    pub async fn associate<E: EntityType, T: Navigable>(
        &self,
        id: Uuid,
        navigation: &Property<E, T>,
        target: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = constants::reference_endpoint(&self.base_url, &self.entity_set::<E>(), &id, &navigation.name());
        let mut body = Map::new();
        body.insert(odata::ID.to_string(), Value::String(self.record_uri(target)));
        let body = Value::Object(body);
        let method = if navigation.kind() == PropertyKind::Collection {
            Method::POST
        } else {
            Method::PUT
        };

        self.send(|| self.build_request(method.clone(), &url, Some(&body), NO_HEADERS, cancel), &[], cancel)
            .await?;
        Ok(())
    }

    /// Remove a link created by [`DynamicsClient::associate`]
    ///
    /// Collection-valued navigations need the `target` to remove; it is
    /// ignored for single-valued ones.
    pub async fn disassociate<E: EntityType, T: Navigable>(
        &self,
        id: Uuid,
        navigation: &Property<E, T>,
        target: Option<&EntityId>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut url = constants::reference_endpoint(&self.base_url, &self.entity_set::<E>(), &id, &navigation.name());

        if navigation.kind() == PropertyKind::Collection {
            let target = target.ok_or_else(|| {
                DynamicsError::InvalidProperty(format!(
                    "removing a member of collection '{}' needs the target record",
                    navigation.name()
                ))
            })?;
            url = format!("{}?$id={}", url, urlencoding::encode(&self.record_uri(target)));
        }

        self.send(|| self.build_request(Method::DELETE, &url, None, NO_HEADERS, cancel), &[], cancel)
            .await?;
        Ok(())
    }

    /// Dispatch through the transport; a 401 drops the cached token so the
    /// next request authenticates again
    async fn send<F, Fut>(&self, factory: F, allowed: &[StatusCode], cancel: &CancellationToken) -> Result<Response>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Request>> + Send,
    {
        let outcome = self.transport.send(factory, allowed, cancel).await;

        let unauthorized = matches!(&outcome, Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED));
        if unauthorized {
            warn!("Request rejected as unauthorized, dropping cached token");
            self.auth.invalidate().await;
        }

        outcome
    }

    /// Absolute URI of a record, as used in `@odata.id`
    fn record_uri(&self, id: &EntityId) -> String {
        let entity_set = self.resolver.entity_set(id.entity());
        constants::entity_record_endpoint(&self.base_url, &entity_set, &id.id())
    }

    async fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        extra_headers: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<Request> {
        let token = self.auth.acquire(cancel).await?;

        let mut builder = self
            .transport
            .sender()
            .request(method, url)
            .header(AUTHORIZATION, token.header_value())
            .header(ACCEPT, headers::CONTENT_TYPE_JSON)
            .header(headers::ODATA_MAX_VERSION, headers::ODATA_VERSION_VALUE)
            .header(headers::ODATA_VERSION, headers::ODATA_VERSION_VALUE);

        for (name, value) in extra_headers {
            builder = builder.header(*name, value.as_str());
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl PageFetcher for DynamicsClient {
    async fn fetch_page(&self, url: &str, max_page_size: Option<u32>, cancel: &CancellationToken) -> Result<Page> {
        let extra: Vec<(&str, String)> = max_page_size
            .map(|size| (headers::PREFER, headers::max_page_size(size)))
            .into_iter()
            .collect();

        let response = self
            .send(|| self.build_request(Method::GET, url, None, &extra, cancel), &[], cancel)
            .await?;

        Page::from_json(read_json(response, cancel).await?)
    }
}

impl std::fmt::Debug for DynamicsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicsClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("default_page_size", &self.default_page_size)
            .finish_non_exhaustive()
    }
}

async fn read_json(response: Response, cancel: &CancellationToken) -> Result<Value> {
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
        body = response.text() => body?,
    };
    serde_json::from_str(&body).map_err(|e| DynamicsError::malformed(format!("response is not JSON: {}", e)))
}

/// Builder for [`DynamicsClient`]
pub struct DynamicsClientBuilder {
    base_url: String,
    grant: ClientCredentialsGrant,
    http_client: Option<reqwest::Client>,
    timeout: Duration,
    resilience: ResilienceConfig,
    resolver: Arc<dyn EntitySetResolver>,
    formatter: Option<Arc<dyn ValueFormatter>>,
    default_page_size: Option<u32>,
}

impl DynamicsClientBuilder {
    pub fn new(base_url: impl Into<String>, grant: ClientCredentialsGrant) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            grant,
            http_client: None,
            timeout: Duration::from_secs(30),
            resilience: ResilienceConfig::default(),
            resolver: Arc::new(PluralizingResolver::new()),
            formatter: None,
            default_page_size: None,
        }
    }

    /// Use a preconfigured HTTP client; `timeout` is then ignored
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Per-request timeout of the default HTTP client
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = config;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn EntitySetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn value_formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Page size for requests that do not set their own
    pub fn default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = Some(size);
        self
    }

    pub fn build(self) -> Result<DynamicsClient> {
        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .timeout(self.timeout)
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("dynamics-webapi/", env!("CARGO_PKG_VERSION")))
                .build()?,
        };

        let compiler = match self.formatter {
            Some(formatter) => QueryCompiler::with_formatter(formatter),
            None => QueryCompiler::new(),
        };

        Ok(DynamicsClient {
            base_url: self.base_url,
            auth: AuthCache::new(http.clone(), self.grant),
            transport: RateLimitedTransport::new(http, &self.resilience),
            compiler,
            resolver: self.resolver,
            default_page_size: self.default_page_size,
        })
    }
}
