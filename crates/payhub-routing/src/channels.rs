use dashmap::DashMap;

use payhub_core::types::Token;

/// A payment-channel node the hub can receive through.
#[derive(Debug, Clone)]
pub struct ChannelNode {
    /// Node identifier on the channel network.
    pub node_id: String,
    /// Whether the node is currently reachable.
    pub online: bool,
}

/// Registry of channel nodes and their per-token channel capacity.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    nodes: DashMap<String, ChannelNode>,
    // (node_id, token) -> receivable capacity in atomic units
    capacity: DashMap<(String, Token), u128>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, initially offline with no capacity.
    pub fn register(&self, node_id: impl Into<String>) {
        let node_id = node_id.into();
        self.nodes.insert(
            node_id.clone(),
            ChannelNode {
                node_id,
                online: false,
            },
        );
    }

    /// Mark a node online or offline.
    pub fn set_online(&self, node_id: &str, online: bool) {
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            node.online = online;
            tracing::info!(node_id, online, "channel node availability changed");
        }
    }

    /// Record a node's receivable capacity for one token.
    pub fn set_capacity(&self, node_id: &str, token: Token, value: u128) {
        self.capacity.insert((node_id.to_string(), token), value);
    }

    /// Online nodes whose capacity for the token covers the value.
    /// A `None` value only requires a non-zero channel.
    pub fn funded_nodes(&self, token: &Token, value: Option<u128>) -> Vec<String> {
        self.capacity
            .iter()
            .filter(|kv| {
                let (node_id, cap_token) = kv.key();
                if cap_token != token {
                    return false;
                }
                let online = self
                    .nodes
                    .get(node_id)
                    .map(|n| n.online)
                    .unwrap_or(false);
                online && *kv.value() >= value.unwrap_or(1)
            })
            .map(|kv| kv.key().0.clone())
            .collect()
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
