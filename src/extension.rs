//! # Extension Registry
//!
//! Named factories for pluggable capabilities.
//!
//! Each capability (serializer, compressor, load balancer) gets an
//! [`ExtensionLoader`] mapping a configured name to a factory. The first lookup of a
//! name builds the instance and later lookups share it.
//!
//! ```rust
//! use netrpc::extension::Extensions;
//!
//! let extensions = Extensions::with_codecs();
//! assert!(extensions.serializers().get_extension("bincode").is_ok());
//! assert!(extensions.serializers().get_extension("protostuff").is_err());
//! ```

use crate::core::serialization::{BincodeSerializer, JsonSerializer, SerializationType, Serializer};
use crate::error::{Result, RpcError};
use crate::loadbalance::consistent_hash::ConsistentHashLoadBalance;
use crate::loadbalance::least_active::{ActiveCalls, LeastActiveLoadBalance};
use crate::loadbalance::random::RandomLoadBalance;
use crate::loadbalance::round_robin::RoundRobinLoadBalance;
use crate::loadbalance::{LoadBalance, WeightSource};
use crate::utils::compression::{
    CompressType, Compressor, Lz4Compressor, NoCompression, ZstdCompressor,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

type Factory<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

/// Factory registry with per-name singleton caching for one capability
pub struct ExtensionLoader<T: ?Sized> {
    capability: &'static str,
    factories: DashMap<String, Factory<T>>,
    instances: DashMap<String, Arc<T>>,
}

impl<T: ?Sized> ExtensionLoader<T> {
    pub fn new(capability: &'static str) -> Self {
        Self {
            capability,
            factories: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    pub fn capability(&self) -> &'static str {
        self.capability
    }

    /// Register (or replace) the factory for `name`, dropping any cached instance.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self.instances.remove(name);
    }

    /// Resolve `name`, building its instance on first use.
    pub fn get_extension(&self, name: &str) -> Result<Arc<T>> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(instance.value().clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RpcError::ExtensionNotFound {
                capability: self.capability.to_string(),
                name: name.to_string(),
            })?;

        let instance = self
            .instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(capability = self.capability, name, "Creating extension");
                (factory.value())()
            })
            .value()
            .clone();
        Ok(instance)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Load balancer extension names
pub mod load_balance_names {
    pub const RANDOM: &str = "random";
    pub const ROUND_ROBIN: &str = "round_robin";
    pub const CONSISTENT_HASH: &str = "consistent_hash";
    pub const LEAST_ACTIVE: &str = "least_active";

    pub const ALL: [&str; 4] = [RANDOM, ROUND_ROBIN, CONSISTENT_HASH, LEAST_ACTIVE];
}

/// Loaders for every pluggable capability
pub struct Extensions {
    serializers: ExtensionLoader<dyn Serializer>,
    compressors: ExtensionLoader<dyn Compressor>,
    load_balancers: ExtensionLoader<dyn LoadBalance>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new()
    }
}

impl Extensions {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            serializers: ExtensionLoader::new("serializer"),
            compressors: ExtensionLoader::new("compressor"),
            load_balancers: ExtensionLoader::new("load_balance"),
        }
    }

    /// Registry with the built-in serializers and compressors
    pub fn with_codecs() -> Self {
        let extensions = Self::new();
        extensions.register_default_codecs();
        extensions
    }

    /// Registry with every built-in extension; load balancers read weights from `weights`.
    pub fn with_defaults(weights: Arc<dyn WeightSource>, active: Arc<ActiveCalls>) -> Self {
        let extensions = Self::with_codecs();
        extensions.register_default_load_balancers(weights, active);
        extensions
    }

    pub fn register_default_codecs(&self) {
        self.serializers.register(SerializationType::Bincode.name(), || {
            Arc::new(BincodeSerializer) as Arc<dyn Serializer>
        });
        self.serializers.register(SerializationType::Json.name(), || {
            Arc::new(JsonSerializer) as Arc<dyn Serializer>
        });

        self.compressors.register(CompressType::None.name(), || {
            Arc::new(NoCompression) as Arc<dyn Compressor>
        });
        self.compressors.register(CompressType::Lz4.name(), || {
            Arc::new(Lz4Compressor) as Arc<dyn Compressor>
        });
        self.compressors.register(CompressType::Zstd.name(), || {
            Arc::new(ZstdCompressor::default()) as Arc<dyn Compressor>
        });
    }

    pub fn register_default_load_balancers(
        &self,
        weights: Arc<dyn WeightSource>,
        active: Arc<ActiveCalls>,
    ) {
        let w = weights.clone();
        self.load_balancers
            .register(load_balance_names::RANDOM, move || {
                Arc::new(RandomLoadBalance::new(w.clone())) as Arc<dyn LoadBalance>
            });
        let w = weights.clone();
        self.load_balancers
            .register(load_balance_names::ROUND_ROBIN, move || {
                Arc::new(RoundRobinLoadBalance::new(w.clone())) as Arc<dyn LoadBalance>
            });
        self.load_balancers
            .register(load_balance_names::CONSISTENT_HASH, || {
                Arc::new(ConsistentHashLoadBalance::new()) as Arc<dyn LoadBalance>
            });
        self.load_balancers
            .register(load_balance_names::LEAST_ACTIVE, move || {
                Arc::new(LeastActiveLoadBalance::new(weights.clone(), active.clone()))
                    as Arc<dyn LoadBalance>
            });
    }

    pub fn serializers(&self) -> &ExtensionLoader<dyn Serializer> {
        &self.serializers
    }

    pub fn compressors(&self) -> &ExtensionLoader<dyn Compressor> {
        &self.compressors
    }

    pub fn load_balancers(&self) -> &ExtensionLoader<dyn LoadBalance> {
        &self.load_balancers
    }

    /// Serializer named by a frame codec id
    pub fn serializer(&self, codec: u8) -> Result<Arc<dyn Serializer>> {
        let kind = SerializationType::from_code(codec).ok_or(RpcError::UnknownCodec(codec))?;
        self.serializers.get_extension(kind.name())
    }

    /// Compressor named by a frame compression id
    pub fn compressor(&self, compress: u8) -> Result<Arc<dyn Compressor>> {
        let kind = CompressType::from_code(compress).ok_or(RpcError::UnknownCompression(compress))?;
        self.compressors.get_extension(kind.name())
    }

    pub fn load_balancer(&self, name: &str) -> Result<Arc<dyn LoadBalance>> {
        self.load_balancers.get_extension(name)
    }
}
