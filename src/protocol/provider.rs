//! # Service Provider Registry
//!
//! Local mapping from service key to a published service.
//!
//! A service is built once from typed closures. Each method is compiled at
//! registration into a handler over parameter blobs, so dispatch is a map lookup
//! plus a parameter-type check and never needs runtime type information.
//!
//! ```rust
//! use netrpc::protocol::provider::{RpcService, ServiceProvider};
//!
//! let hello = RpcService::builder("Hello")
//!     .method("hello", |name: String| format!("Hello, {name}"))
//!     .build();
//!
//! let provider = ServiceProvider::new();
//! let key = provider.publish(hello, "test1", "version1");
//! assert_eq!(key, "Hellotest1version1");
//! assert!(provider.get_service(&key).is_ok());
//! ```

use crate::core::serialization::{from_blob, to_blob};
use crate::error::{Result, RpcError};
use crate::protocol::message::RpcServiceProperties;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

type HandlerFn = dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static;

/// Parameter type name recorded for a method taking `P`
pub fn param_type_names<P>() -> Vec<String> {
    vec![std::any::type_name::<P>().to_string()]
}

struct MethodEntry {
    param_types: Vec<String>,
    handler: Box<HandlerFn>,
}

/// A service implementation: named methods over parameter blobs
pub struct RpcService {
    interface_name: String,
    methods: HashMap<String, MethodEntry>,
}

impl fmt::Debug for RpcService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("RpcService")
            .field("interface_name", &self.interface_name)
            .field("methods", &methods)
            .finish()
    }
}

impl RpcService {
    pub fn builder(interface_name: impl Into<String>) -> RpcServiceBuilder {
        RpcServiceBuilder {
            service: RpcService {
                interface_name: interface_name.into(),
                methods: HashMap::new(),
            },
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Invoke `method` after checking it exists and takes `param_types`.
    pub fn invoke(&self, method: &str, param_types: &[String], parameters: &[u8]) -> Result<Vec<u8>> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::MethodNotFound {
                service: self.interface_name.clone(),
                method: method.to_string(),
            })?;

        if entry.param_types != param_types {
            return Err(RpcError::ParameterMismatch {
                method: method.to_string(),
                expected: entry.param_types.clone(),
                actual: param_types.to_vec(),
            });
        }

        (entry.handler)(parameters)
    }
}

/// Builder registering typed methods on an [`RpcService`]
pub struct RpcServiceBuilder {
    service: RpcService,
}

impl RpcServiceBuilder {
    /// Register an infallible method taking `P` and returning `R`.
    pub fn method<P, R, F>(self, name: &str, f: F) -> Self
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(P) -> R + Send + Sync + 'static,
    {
        self.try_method(name, move |params: P| {
            Ok::<R, std::convert::Infallible>(f(params))
        })
    }

    /// Register a method whose error becomes a FAIL response.
    pub fn try_method<P, R, E, F>(mut self, name: &str, f: F) -> Self
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: fmt::Display,
        F: Fn(P) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let handler = move |blob: &[u8]| -> Result<Vec<u8>> {
            let params: P = from_blob(blob)?;
            let value = f(params).map_err(|e| RpcError::Invocation(e.to_string()))?;
            to_blob(&value)
        };
        self.service.methods.insert(
            name.to_string(),
            MethodEntry {
                param_types: param_type_names::<P>(),
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn build(self) -> RpcService {
        self.service
    }
}

/// Process-local registry of published services
#[derive(Default)]
pub struct ServiceProvider {
    services: DashMap<String, Arc<RpcService>>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `service` under its composed key; a key is only ever stored once.
    pub fn publish(&self, service: RpcService, group: &str, version: &str) -> String {
        let properties = RpcServiceProperties::new(service.interface_name(), group, version);
        self.add_service(service, &properties)
    }

    pub fn add_service(&self, service: RpcService, properties: &RpcServiceProperties) -> String {
        let key = properties.rpc_service_name();
        match self.services.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(service = %key, "Service already published");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(service));
                info!(service = %key, "Add service");
            }
        }
        key
    }

    pub fn get_service(&self, service_key: &str) -> Result<Arc<RpcService>> {
        self.services
            .get(service_key)
            .map(|s| s.value().clone())
            .ok_or_else(|| RpcError::ServiceNotFound(service_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
