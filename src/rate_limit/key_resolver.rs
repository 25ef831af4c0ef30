//! Key resolvers: derive the bucket id for a request.
//!
//! A resolver failure propagates as a request failure. There is no
//! fallback key, so a request nobody can be charged for is not admitted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::filter::ServerExchange;

pub const REMOTE_ADDR_KEY_RESOLVER: &str = "remoteAddrKeyResolver";
pub const PRINCIPAL_NAME_KEY_RESOLVER: &str = "principalNameKeyResolver";

#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Name a route refers to the resolver by, e.g. `#{@remoteAddrKeyResolver}`.
    fn name(&self) -> &'static str;

    async fn resolve(&self, exchange: &ServerExchange) -> Result<String, GatewayError>;
}

/// Client IP address, without the port.
pub struct RemoteAddrKeyResolver;

#[async_trait]
impl KeyResolver for RemoteAddrKeyResolver {
    fn name(&self) -> &'static str {
        REMOTE_ADDR_KEY_RESOLVER
    }

    async fn resolve(&self, exchange: &ServerExchange) -> Result<String, GatewayError> {
        exchange
            .request()
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .ok_or_else(|| GatewayError::KeyResolution("remote address unknown".into()))
    }
}

/// Name of the authenticated principal.
pub struct PrincipalNameKeyResolver;

#[async_trait]
impl KeyResolver for PrincipalNameKeyResolver {
    fn name(&self) -> &'static str {
        PRINCIPAL_NAME_KEY_RESOLVER
    }

    async fn resolve(&self, exchange: &ServerExchange) -> Result<String, GatewayError> {
        exchange
            .attributes()
            .principal
            .clone()
            .ok_or_else(|| GatewayError::KeyResolution("no authenticated principal".into()))
    }
}

/// Resolvers by name, plus the one used when a route names none.
pub struct KeyResolvers {
    resolvers: HashMap<&'static str, Arc<dyn KeyResolver>>,
    default: String,
}

impl KeyResolvers {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            resolvers: HashMap::new(),
            default: default.into(),
        }
    }

    /// Both built-in resolvers, with `default` as the fallback name.
    pub fn with_defaults(default: &str) -> Self {
        let mut resolvers = Self::new(default);
        resolvers.register(Arc::new(RemoteAddrKeyResolver));
        resolvers.register(Arc::new(PrincipalNameKeyResolver));
        resolvers
    }

    pub fn register(&mut self, resolver: Arc<dyn KeyResolver>) {
        self.resolvers.insert(resolver.name(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KeyResolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn default_resolver(&self) -> Option<Arc<dyn KeyResolver>> {
        self.get(&self.default)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.resolvers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for KeyResolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolvers")
            .field("resolvers", &self.names())
            .field("default", &self.default)
            .finish()
    }
}
