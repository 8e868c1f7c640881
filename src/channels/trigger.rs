use rustc_hash::FxHashMap;

use crate::types::NodeKind;

/// Maps channel names to the set of nodes that should be woken when that
/// channel's version advances, per the data model's `TriggerMap`.
///
/// Built once at graph-compile time from each node's declared read set, and
/// consulted by the executor after a barrier to compute the next frontier
/// for nodes reached only through channel subscriptions rather than
/// explicit edges.
#[derive(Clone, Debug, Default)]
pub struct TriggerMap {
    triggers: FxHashMap<String, Vec<NodeKind>>,
}

impl TriggerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, channel: impl Into<String>, node: NodeKind) {
        self.triggers.entry(channel.into()).or_default().push(node);
    }

    #[must_use]
    pub fn with_subscription(mut self, channel: impl Into<String>, node: NodeKind) -> Self {
        self.subscribe(channel, node);
        self
    }

    /// Nodes subscribed to any of `updated_channels`, deduplicated and in
    /// first-subscription order.
    #[must_use]
    pub fn nodes_for(&self, updated_channels: &[String]) -> Vec<NodeKind> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for channel in updated_channels {
            if let Some(nodes) = self.triggers.get(channel) {
                for node in nodes {
                    if seen.insert(node.clone()) {
                        out.push(node.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_for_deduplicates_across_channels() {
        let map = TriggerMap::new()
            .with_subscription("a", NodeKind::Custom("n1".into()))
            .with_subscription("b", NodeKind::Custom("n1".into()))
            .with_subscription("a", NodeKind::Custom("n2".into()));
        let nodes = map.nodes_for(&["a".to_string(), "b".to_string()]);
        assert_eq!(
            nodes,
            vec![
                NodeKind::Custom("n1".into()),
                NodeKind::Custom("n2".into())
            ]
        );
    }
}
