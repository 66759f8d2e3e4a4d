/// External collaborators of the decision engine
/// The registry, leader election, admin endpoint, and namespace service are
/// owned elsewhere in the broker; the engine only consumes these interfaces.

use async_trait::async_trait;
use hivebus_load_data::{BrokerLoadData, BundleData, LoadDataStore};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AdminError, BalancerError};

/// Set of live brokers as seen by the metadata layer
#[async_trait]
pub trait BrokerRegistry: Send + Sync {
    fn available_brokers(&self) -> HashSet<String>;

    async fn available_brokers_async(&self) -> Result<HashSet<String>, BalancerError> {
        Ok(self.available_brokers())
    }
}

/// Cluster-singleton election; the engine only acts while leader
pub trait LeaderElection: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Admin endpoint that executes unload requests against the owning broker
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn unload_namespace_bundle(
        &self,
        namespace: &str,
        range: &str,
    ) -> Result<(), AdminError>;
}

/// Namespace metadata queries
#[async_trait]
pub trait NamespaceService: Send + Sync {
    async fn bundle_count(&self, namespace: &str) -> Result<u32, BalancerError>;
}

/// Sibling placement strategy consulted for `get_least_loaded` pass-through
pub trait PlacementStrategy: Send + Sync {
    fn select_broker(&self, bundle: &str, brokers: &HashSet<String>) -> Option<String>;
}

/// Everything the schedulers need from the rest of the broker
pub struct ClusterContext {
    pub registry: Arc<dyn BrokerRegistry>,
    /// Absent election means this broker is never leader
    pub leader: Option<Arc<dyn LeaderElection>>,
    pub admin: Arc<dyn AdminClient>,
    pub namespaces: Arc<dyn NamespaceService>,
    pub broker_loads: Arc<dyn LoadDataStore<BrokerLoadData>>,
    pub bundle_loads: Arc<dyn LoadDataStore<BundleData>>,
}

impl ClusterContext {
    pub fn is_leader(&self) -> bool {
        self.leader.as_ref().map(|l| l.is_leader()).unwrap_or(false)
    }
}

/// Split a bundle id of the form `<namespace>/<range>` at the final slash
pub fn split_bundle_id(bundle: &str) -> Result<(&str, &str), BalancerError> {
    match bundle.rsplit_once('/') {
        Some((namespace, range)) if !namespace.is_empty() && !range.is_empty() => {
            Ok((namespace, range))
        }
        _ => Err(BalancerError::InvalidBundleId(bundle.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_bundle_id_at_final_slash() {
        let (namespace, range) =
            split_bundle_id("tenant/ns/0x40000000_0x80000000").expect("well-formed");
        assert_eq!(namespace, "tenant/ns");
        assert_eq!(range, "0x40000000_0x80000000");
    }

    #[test]
    fn test_split_bundle_id_single_segment_namespace() {
        let (namespace, range) = split_bundle_id("ns1/0x00_0x80").expect("well-formed");
        assert_eq!(namespace, "ns1");
        assert_eq!(range, "0x00_0x80");
    }

    #[test]
    fn test_malformed_bundle_ids_are_rejected() {
        assert!(split_bundle_id("no-slash").is_err());
        assert!(split_bundle_id("/leading").is_err());
        assert!(split_bundle_id("trailing/").is_err());
        assert!(split_bundle_id("").is_err());
    }

    #[test]
    fn test_missing_leader_election_means_not_leader() {
        use hivebus_load_data::InMemoryLoadStore;

        struct NoBrokers;
        #[async_trait]
        impl BrokerRegistry for NoBrokers {
            fn available_brokers(&self) -> HashSet<String> {
                HashSet::new()
            }
        }
        struct NoAdmin;
        #[async_trait]
        impl AdminClient for NoAdmin {
            async fn unload_namespace_bundle(
                &self,
                _namespace: &str,
                _range: &str,
            ) -> Result<(), AdminError> {
                Ok(())
            }
        }
        struct NoNamespaces;
        #[async_trait]
        impl NamespaceService for NoNamespaces {
            async fn bundle_count(&self, _namespace: &str) -> Result<u32, BalancerError> {
                Ok(0)
            }
        }

        let context = ClusterContext {
            registry: Arc::new(NoBrokers),
            leader: None,
            admin: Arc::new(NoAdmin),
            namespaces: Arc::new(NoNamespaces),
            broker_loads: Arc::new(InMemoryLoadStore::new()),
            bundle_loads: Arc::new(InMemoryLoadStore::new()),
        };
        assert!(!context.is_leader());
    }
}
