//! Handler registry: maps finding types to workflow constructors.
//!
//! The registry is the single source of truth for which finding types are
//! actionable. Supporting a new type means one `register` call plus one
//! workflow type; the dispatcher never changes.

use crate::workflow::{C2ActivityWorkflow, C2DnsActivityWorkflow, WorkflowConstructor};
use std::collections::HashMap;

/// GuardDuty type for outbound traffic to a known command-and-control IP.
pub const C2_ACTIVITY: &str = "Backdoor:EC2/C&CActivity.B";
/// GuardDuty type for DNS lookups of a known command-and-control domain.
pub const C2_DNS_ACTIVITY: &str = "Backdoor:EC2/C&CActivity.B!DNS";

/// Lookup table from finding type to workflow constructor.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, WorkflowConstructor>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in C2 workflows.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(C2_ACTIVITY, C2ActivityWorkflow::construct);
        registry.register(C2_DNS_ACTIVITY, C2DnsActivityWorkflow::construct);
        registry
    }

    /// Register a constructor, replacing any existing one for the same type.
    /// Returns the replaced constructor, if any.
    pub fn register(
        &mut self,
        finding_type: impl Into<String>,
        constructor: WorkflowConstructor,
    ) -> Option<WorkflowConstructor> {
        self.handlers.insert(finding_type.into(), constructor)
    }

    /// Remove the constructor for a type.
    pub fn unregister(&mut self, finding_type: &str) -> Option<WorkflowConstructor> {
        self.handlers.remove(finding_type)
    }

    /// Look up the constructor for a finding type. Unknown types are `None`,
    /// never an error.
    pub fn resolve(&self, finding_type: &str) -> Option<WorkflowConstructor> {
        let constructor = self.handlers.get(finding_type).copied();
        if constructor.is_none() {
            tracing::debug!(finding_type, "No handler registered for finding type");
        }
        constructor
    }

    pub fn contains(&self, finding_type: &str) -> bool {
        self.handlers.contains_key(finding_type)
    }

    /// Registered finding types, sorted.
    pub fn finding_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.finding_types(), vec![C2_ACTIVITY, C2_DNS_ACTIVITY]);
        assert!(registry.resolve(C2_ACTIVITY).is_some());
        assert!(registry.resolve(C2_DNS_ACTIVITY).is_some());
    }

    #[test]
    fn test_unknown_type_is_absent() {
        let registry = HandlerRegistry::with_defaults();
        assert!(registry.resolve("Recon:EC2/PortProbeUnprotectedPort").is_none());
        assert!(registry.resolve("").is_none());
        // Matching is exact.
        assert!(registry.resolve("backdoor:ec2/c&cactivity.b").is_none());
    }

    #[test]
    fn test_register_replaces_existing_entry() {
        let mut registry = HandlerRegistry::with_defaults();
        let previous = registry.register(C2_ACTIVITY, C2DnsActivityWorkflow::construct);
        assert!(previous.is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_new_type() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(
            registry
                .register("CryptoCurrency:EC2/BitcoinTool.B", C2ActivityWorkflow::construct)
                .is_none()
        );
        assert!(registry.contains("CryptoCurrency:EC2/BitcoinTool.B"));

        registry.unregister("CryptoCurrency:EC2/BitcoinTool.B");
        assert!(registry.is_empty());
    }
}
