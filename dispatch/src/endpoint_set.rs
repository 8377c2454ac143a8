//! The static set of nodes every operation fans out to.
//!
//! Built once at startup and passed down explicitly; read-only afterwards, so
//! it is shared by `Arc` without synchronization.

use std::collections::HashSet;
use std::sync::Arc;

use multinode_rpc::{HttpNodeClient, NodeRpc};
use multinode_types::{NodeEndpoint, NodeId};

use crate::{ConfigError, NodeRef};

/// One configured node: its descriptor and the client that talks to it.
pub struct ConfiguredNode {
    node: NodeRef,
    endpoint: NodeEndpoint,
    client: Arc<dyn NodeRpc>,
}

impl ConfiguredNode {
    pub fn node_ref(&self) -> &NodeRef {
        &self.node
    }

    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    pub fn client(&self) -> Arc<dyn NodeRpc> {
        Arc::clone(&self.client)
    }
}

impl std::fmt::Debug for ConfiguredNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredNode")
            .field("node", &self.node)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct NodeEndpointSet {
    nodes: Vec<Arc<ConfiguredNode>>,
}

impl NodeEndpointSet {
    /// Build the set from endpoints paired with their clients, in
    /// configuration order.
    ///
    /// Rejects an empty list, invalid descriptors and duplicate `host:port`
    /// pairs.
    pub fn new(entries: Vec<(NodeEndpoint, Arc<dyn NodeRpc>)>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(entries.len());
        for (index, (endpoint, client)) in entries.into_iter().enumerate() {
            endpoint.validate()?;
            let id = endpoint.id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Duplicate(id));
            }
            nodes.push(Arc::new(ConfiguredNode {
                node: NodeRef { index, id },
                endpoint,
                client,
            }));
        }

        tracing::info!(nodes = nodes.len(), "node endpoint set ready");
        Ok(Self { nodes })
    }

    /// Build the set with an HTTP JSON-RPC client per endpoint.
    pub fn connect_http(endpoints: Vec<NodeEndpoint>) -> Result<Self, ConfigError> {
        let entries = endpoints
            .into_iter()
            .map(|ep| -> Result<(NodeEndpoint, Arc<dyn NodeRpc>), ConfigError> {
                let client: Arc<dyn NodeRpc> = Arc::new(HttpNodeClient::new(ep.clone())?);
                Ok((ep, client))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ConfiguredNode>> {
        self.nodes.iter()
    }

    pub fn all(&self) -> &[Arc<ConfiguredNode>] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&Arc<ConfiguredNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// The named nodes, kept in configuration order.
    pub fn select(&self, ids: &[NodeId]) -> Result<Vec<Arc<ConfiguredNode>>, ConfigError> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(ConfigError::UnknownNode(unknown.clone()));
        }
        Ok(self
            .nodes
            .iter()
            .filter(|n| ids.contains(n.id()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multinode_nullables::NullNode;

    fn entry(port: u16) -> (NodeEndpoint, Arc<dyn NodeRpc>) {
        let client: Arc<dyn NodeRpc> = Arc::new(NullNode::new());
        (NodeEndpoint::new("127.0.0.1", port), client)
    }

    #[test]
    fn empty_set_rejected() {
        assert!(matches!(NodeEndpointSet::new(vec![]), Err(ConfigError::Empty)));
    }

    #[test]
    fn duplicate_endpoint_rejected() {
        let err = NodeEndpointSet::new(vec![entry(1), entry(2), entry(1)]).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(id) if id.as_str() == "127.0.0.1:1"));
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let err = NodeEndpointSet::new(vec![entry(0)]).unwrap_err();
        assert!(matches!(err, ConfigError::Endpoint(_)));
    }

    #[test]
    fn indices_follow_configuration_order() {
        let set = NodeEndpointSet::new(vec![entry(3), entry(1), entry(2)]).unwrap();
        let ports: Vec<_> = set.iter().map(|n| (n.node_ref().index, n.endpoint().port)).collect();
        assert_eq!(ports, vec![(0, 3), (1, 1), (2, 2)]);
    }

    #[test]
    fn select_keeps_configuration_order() {
        let set = NodeEndpointSet::new(vec![entry(1), entry(2), entry(3)]).unwrap();
        let picked = set
            .select(&[NodeId::new("127.0.0.1:3"), NodeId::new("127.0.0.1:1")])
            .unwrap();
        let ports: Vec<_> = picked.iter().map(|n| n.endpoint().port).collect();
        assert_eq!(ports, vec![1, 3]);
    }

    #[test]
    fn select_unknown_node_fails() {
        let set = NodeEndpointSet::new(vec![entry(1)]).unwrap();
        assert!(matches!(
            set.select(&[NodeId::new("10.0.0.1:1")]),
            Err(ConfigError::UnknownNode(_))
        ));
    }
}
