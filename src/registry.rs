//! Bounded policy registry.

use std::collections::HashMap;

use parking_lot::Mutex;

use keyneg_types::{PolicyConfig, MAX_POLICY_COUNT};

/// Thread-safe store of policy configurations, unique per policy id and
/// capped at [`MAX_POLICY_COUNT`] entries.
pub struct PolicyRegistry {
    policies: Mutex<HashMap<u32, PolicyConfig>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a policy. Rejects duplicate ids and inserts beyond capacity.
    pub fn add(&self, policy: PolicyConfig) -> bool {
        let mut policies = self.policies.lock();
        if policies.len() >= MAX_POLICY_COUNT || policies.contains_key(&policy.policy_id) {
            return false;
        }
        policies.insert(policy.policy_id, policy);
        true
    }

    /// Remove a policy. Returns whether it existed.
    pub fn remove(&self, policy_id: u32) -> bool {
        self.policies.lock().remove(&policy_id).is_some()
    }

    pub fn contains(&self, policy_id: u32) -> bool {
        self.policies.lock().contains_key(&policy_id)
    }

    /// Snapshot of a policy configuration.
    pub fn get(&self, policy_id: u32) -> Option<PolicyConfig> {
        self.policies.lock().get(&policy_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.policies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn policy(policy_id: u32) -> PolicyConfig {
        PolicyConfig {
            policy_id,
            remote_ip: Ipv4Addr::LOCALHOST,
            remote_port: 6000,
            timeout_ms: 1000,
            retry_times: 3,
        }
    }

    #[test]
    fn test_add_get_remove() {
        let registry = PolicyRegistry::new();
        assert!(registry.add(policy(1)));
        assert!(registry.contains(1));
        assert_eq!(registry.get(1).unwrap().remote_port, 6000);

        assert!(registry.remove(1));
        assert!(!registry.remove(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = PolicyRegistry::new();
        assert!(registry.add(policy(5)));
        assert!(!registry.add(policy(5)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let registry = PolicyRegistry::new();
        for id in 1..=MAX_POLICY_COUNT as u32 {
            assert!(registry.add(policy(id)), "insert {id} should succeed");
        }
        assert_eq!(registry.len(), MAX_POLICY_COUNT);

        // One past the cap fails, as does a previously used id.
        assert!(!registry.add(policy(MAX_POLICY_COUNT as u32 + 1)));
        assert!(!registry.add(policy(1)));
        assert_eq!(registry.len(), MAX_POLICY_COUNT);
    }
}
