//! Key naming

/// Cluster attribute hash
pub const CLUSTER_ATTRIBUTES: &str = "cluster:attributes";

/// Bumped in the same batch as every routing-affecting mutation
pub const ROUTING_GENERATION: &str = "routing:generation";

/// Per-key versions kept by shared stores
pub const STORE_VERSIONS: &str = "store:versions";

/// Counter the shared store draws versions from
pub const STORE_CLOCK: &str = "store:clock";

/// Target system of propagated events
pub const CALL_ENGINE: &str = "callengine";

/// Reverse-reference set of the record stored at `record_key`
pub fn engagement(record_key: &str) -> String {
    format!("engagement:{}", record_key)
}

/// Set of names defined for one entity class
pub fn nameset(class_token: &str) -> String {
    format!("nameset:{}", class_token)
}

/// Owner of a SIP source address within a SIP profile
pub fn recognition(sipprofile: &str, ip: &str) -> String {
    format!("recognition:{}:{}", sipprofile, ip)
}

/// Per-node event queue
pub fn event_queue(target: &str, event_class: &str, nodeid: &str) -> String {
    format!("event:{}:{}:{}", target, event_class, nodeid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(engagement("intcon:out:c1"), "engagement:intcon:out:c1");
        assert_eq!(nameset("gateway"), "nameset:gateway");
        assert_eq!(recognition("external", "10.0.0.1"), "recognition:external:10.0.0.1");
        assert_eq!(
            event_queue(CALL_ENGINE, "outbound:intcon", "node1"),
            "event:callengine:outbound:intcon:node1"
        );
    }
}
