use std::collections::HashMap;

use crate::model::{TargetId, TargetInfo};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryEntry {
    address: String,
    comment: String,
}

impl RegistryEntry {
    pub fn new(target: &TargetInfo) -> Self {
        let mut comment = target.comment.clone();
        if target.requested != target.resolved {
            comment.push_str(" (resolved-from: ");
            comment.push_str(&target.requested);
            comment.push(')');
        }
        Self {
            address: target.resolved.clone(),
            comment,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

/// Resolved address and display comment for every target of one run.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    entries: HashMap<TargetId, RegistryEntry>,
}

impl TargetRegistry {
    pub fn new(targets: &[TargetInfo]) -> Self {
        Self {
            entries: targets
                .iter()
                .map(|target| (target.id, RegistryEntry::new(target)))
                .collect(),
        }
    }

    pub fn get(&self, id: TargetId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// Address for display; unknown targets render blank.
    pub fn address(&self, id: TargetId) -> &str {
        self.get(id).map_or("", RegistryEntry::address)
    }

    pub fn comment(&self, id: TargetId) -> &str {
        self.get(id).map_or("", RegistryEntry::comment)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: TargetId, requested: &str, resolved: &str, comment: &str) -> TargetInfo {
        TargetInfo {
            id,
            requested: requested.to_string(),
            resolved: resolved.to_string(),
            comment: comment.to_string(),
        }
    }

    #[test]
    fn hostname_targets_note_their_origin() {
        let registry = TargetRegistry::new(&[
            target(1, "10.0.0.1", "10.0.0.1", "gateway"),
            target(2, "dns.example", "192.0.2.53", "resolver"),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.address(1), "10.0.0.1");
        assert_eq!(registry.comment(1), "gateway");
        assert_eq!(registry.address(2), "192.0.2.53");
        assert_eq!(registry.comment(2), "resolver (resolved-from: dns.example)");
    }

    #[test]
    fn unknown_target_renders_blank() {
        let registry = TargetRegistry::new(&[]);
        assert!(registry.is_empty());
        assert_eq!(registry.address(7), "");
        assert_eq!(registry.comment(7), "");
    }
}
