//! The valid policy tree of RFC 5280 §6.1.2 (a).
//!
//! Nodes live in an arena and refer to each other by index; deleted nodes are
//! unlinked from their parent and marked dead rather than removed, so indices
//! stay stable while the tree is pruned.

use std::collections::{BTreeMap, BTreeSet};

use pathkit_utils::oid::{known, Oid};

use crate::x509::{CertificatePolicies, PolicyMappings, PolicyQualifier};

/// One node of the valid policy tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyNode {
    pub valid_policy: Oid,
    pub qualifiers: Vec<PolicyQualifier>,
    pub criticality: bool,
    pub expected_policy_set: BTreeSet<Oid>,
    /// Depth in the tree, the root sits at 0.
    pub depth: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    alive: bool,
}

/// Policy tree with depth 0 holding the anyPolicy root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTree {
    nodes: Vec<PolicyNode>,
}

impl Default for PolicyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyTree {
    /// The initial tree: a single anyPolicy node at depth 0.
    pub fn new() -> Self {
        let any = known::any_policy();
        PolicyTree {
            nodes: vec![PolicyNode {
                valid_policy: any.clone(),
                qualifiers: Vec::new(),
                criticality: false,
                expected_policy_set: BTreeSet::from([any]),
                depth: 0,
                parent: None,
                children: Vec::new(),
                alive: true,
            }],
        }
    }

    pub fn root(&self) -> &PolicyNode {
        &self.nodes[0]
    }

    pub fn children<'a>(&'a self, node: &'a PolicyNode) -> impl Iterator<Item = &'a PolicyNode> + 'a {
        node.children.iter().map(|&i| &self.nodes[i])
    }

    pub fn parent(&self, node: &PolicyNode) -> Option<&PolicyNode> {
        node.parent.map(|i| &self.nodes[i])
    }

    /// Live nodes at `depth`.
    pub fn nodes_at(&self, depth: usize) -> impl Iterator<Item = &PolicyNode> {
        self.nodes
            .iter()
            .filter(move |n| n.alive && n.depth == depth)
    }

    /// Deepest level with a live node.
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.alive)
            .map(|n| n.depth)
            .max()
            .unwrap_or(0)
    }

    /// The policies a relying party may rely on: valid policies of the
    /// deepest level.
    pub fn authority_constrained_policies(&self) -> BTreeSet<Oid> {
        let depth = self.depth();
        self.nodes_at(depth)
            .map(|n| n.valid_policy.clone())
            .collect()
    }

    fn live_at(&self, depth: usize) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].alive && self.nodes[i].depth == depth)
            .collect()
    }

    fn add_child(
        &mut self,
        parent: usize,
        valid_policy: Oid,
        qualifiers: Vec<PolicyQualifier>,
        expected_policy_set: BTreeSet<Oid>,
    ) -> usize {
        let idx = self.nodes.len();
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(PolicyNode {
            valid_policy,
            qualifiers,
            criticality: false,
            expected_policy_set,
            depth,
            parent: Some(parent),
            children: Vec::new(),
            alive: true,
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    fn remove(&mut self, idx: usize) {
        let children = std::mem::take(&mut self.nodes[idx].children);
        for c in children {
            self.remove(c);
        }
        self.nodes[idx].alive = false;
        if let Some(p) = self.nodes[idx].parent {
            self.nodes[p].children.retain(|&c| c != idx);
        }
    }

    /// Delete every node above `depth` that has no children, repeatedly.
    fn prune_childless(&mut self, depth: usize) {
        for d in (0..depth).rev() {
            for idx in self.live_at(d) {
                if self.nodes[idx].children.is_empty() {
                    self.remove(idx);
                }
            }
        }
    }

    fn root_alive(&self) -> bool {
        self.nodes[0].alive
    }

    /// Process the certificate policies of the certificate at `depth`
    /// (RFC 5280 §6.1.3 (d)). Returns `false` when the tree became empty.
    pub(crate) fn process_certificate(
        &mut self,
        depth: usize,
        policies: &CertificatePolicies,
        critical: bool,
        allow_any: bool,
    ) -> bool {
        let any = known::any_policy();
        let parents = self.live_at(depth - 1);

        // (d)(1)
        for info in policies.policies.iter().filter(|p| p.policy_id != any) {
            let mut matched = false;
            for &p in &parents {
                if self.nodes[p].expected_policy_set.contains(&info.policy_id) {
                    self.add_child(
                        p,
                        info.policy_id.clone(),
                        info.qualifiers.clone(),
                        BTreeSet::from([info.policy_id.clone()]),
                    );
                    matched = true;
                }
            }
            if !matched {
                for &p in &parents {
                    if self.nodes[p].valid_policy == any {
                        self.add_child(
                            p,
                            info.policy_id.clone(),
                            info.qualifiers.clone(),
                            BTreeSet::from([info.policy_id.clone()]),
                        );
                    }
                }
            }
        }

        // (d)(2)
        if allow_any {
            if let Some(any_info) = policies.policies.iter().find(|p| p.policy_id == any) {
                for &p in &parents {
                    let expected: Vec<Oid> =
                        self.nodes[p].expected_policy_set.iter().cloned().collect();
                    for oid in expected {
                        let exists = self.nodes[p]
                            .children
                            .iter()
                            .any(|&c| self.nodes[c].valid_policy == oid);
                        if !exists {
                            self.add_child(
                                p,
                                oid.clone(),
                                any_info.qualifiers.clone(),
                                BTreeSet::from([oid]),
                            );
                        }
                    }
                }
            }
        }

        // (d)(3)
        self.prune_childless(depth);

        for idx in self.live_at(depth) {
            self.nodes[idx].criticality = critical;
        }
        self.root_alive()
    }

    /// Apply policy mappings at `depth` (RFC 5280 §6.1.4 (b)). Returns
    /// `false` when the tree became empty.
    pub(crate) fn apply_mappings(
        &mut self,
        depth: usize,
        mappings: &PolicyMappings,
        mapping_allowed: bool,
        any_policy_qualifiers: Option<&[PolicyQualifier]>,
    ) -> bool {
        let any = known::any_policy();
        let mut by_issuer: BTreeMap<Oid, BTreeSet<Oid>> = BTreeMap::new();
        for m in &mappings.mappings {
            by_issuer
                .entry(m.issuer_domain_policy.clone())
                .or_default()
                .insert(m.subject_domain_policy.clone());
        }

        for (issuer_policy, subjects) in by_issuer {
            let nodes: Vec<usize> = self
                .live_at(depth)
                .into_iter()
                .filter(|&i| self.nodes[i].valid_policy == issuer_policy)
                .collect();

            if mapping_allowed {
                if !nodes.is_empty() {
                    for idx in nodes {
                        self.nodes[idx].expected_policy_set = subjects.clone();
                    }
                } else if let Some(qualifiers) = any_policy_qualifiers {
                    let any_node = self
                        .live_at(depth)
                        .into_iter()
                        .find(|&i| self.nodes[i].valid_policy == any);
                    if let Some(any_idx) = any_node {
                        if let Some(parent) = self.nodes[any_idx].parent {
                            let criticality = self.nodes[any_idx].criticality;
                            let child = self.add_child(
                                parent,
                                issuer_policy.clone(),
                                qualifiers.to_vec(),
                                subjects.clone(),
                            );
                            self.nodes[child].criticality = criticality;
                        }
                    }
                }
            } else {
                for idx in nodes {
                    self.remove(idx);
                }
                self.prune_childless(depth);
            }
        }
        self.root_alive()
    }

    /// Final processing (RFC 5280 §6.1.5 (g)): intersect with the
    /// user-initial-policy-set. An empty initial set means anyPolicy.
    pub(crate) fn intersect(&mut self, depth: usize, initial: &BTreeSet<Oid>) -> bool {
        let any = known::any_policy();
        if initial.is_empty() || initial.contains(&any) {
            return self.root_alive();
        }

        // The valid_policy_node_set: nodes whose parent is anyPolicy.
        let valid_set: Vec<usize> = (1..self.nodes.len())
            .filter(|&i| {
                self.nodes[i].alive
                    && self.nodes[i].valid_policy != any
                    && self.nodes[i]
                        .parent
                        .is_some_and(|p| self.nodes[p].valid_policy == any)
            })
            .collect();

        let mut present: BTreeSet<Oid> = BTreeSet::new();
        for idx in valid_set {
            if !self.nodes[idx].alive {
                continue;
            }
            if initial.contains(&self.nodes[idx].valid_policy) {
                present.insert(self.nodes[idx].valid_policy.clone());
            } else {
                self.remove(idx);
            }
        }

        let leaf_any = self
            .live_at(depth)
            .into_iter()
            .find(|&i| self.nodes[i].valid_policy == any);
        if let Some(any_idx) = leaf_any {
            if let Some(parent) = self.nodes[any_idx].parent {
                let qualifiers = self.nodes[any_idx].qualifiers.clone();
                let criticality = self.nodes[any_idx].criticality;
                for oid in initial.difference(&present) {
                    let child = self.add_child(
                        parent,
                        oid.clone(),
                        qualifiers.clone(),
                        BTreeSet::from([oid.clone()]),
                    );
                    self.nodes[child].criticality = criticality;
                }
            }
            self.remove(any_idx);
        }

        self.prune_childless(depth);
        self.root_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::{PolicyInformation, PolicyMapping};

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn policies(ids: &[&str]) -> CertificatePolicies {
        CertificatePolicies {
            policies: ids.iter().map(|s| PolicyInformation::new(oid(s))).collect(),
        }
    }

    #[test]
    fn test_explicit_policy_under_any_root() {
        let mut tree = PolicyTree::new();
        assert!(tree.process_certificate(1, &policies(&["1.2.3.4.5"]), false, true));
        let level: Vec<_> = tree.nodes_at(1).collect();
        assert_eq!(level.len(), 1);
        assert_eq!(level[0].valid_policy, oid("1.2.3.4.5"));
        assert_eq!(tree.parent(level[0]).unwrap().valid_policy, known::any_policy());
    }

    #[test]
    fn test_unmatched_policy_prunes_tree() {
        let mut tree = PolicyTree::new();
        assert!(tree.process_certificate(1, &policies(&["1.2.3"]), false, true));
        assert!(!tree.process_certificate(2, &policies(&["1.2.4"]), false, true));
    }

    #[test]
    fn test_any_policy_expands_expected_set() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.2.3", "1.2.4"]), false, true);
        assert!(tree.process_certificate(2, &policies(&["2.5.29.32.0"]), true, true));
        let mut level: Vec<_> = tree.nodes_at(2).map(|n| n.valid_policy.to_string()).collect();
        level.sort();
        assert_eq!(level, ["1.2.3", "1.2.4"]);
        assert!(tree.nodes_at(2).all(|n| n.criticality));
    }

    #[test]
    fn test_any_policy_ignored_when_inhibited() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.2.3"]), false, true);
        assert!(!tree.process_certificate(2, &policies(&["2.5.29.32.0"]), false, false));
    }

    #[test]
    fn test_mapping_rewrites_expected_set() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.1"]), false, true);
        let mappings = PolicyMappings {
            mappings: vec![PolicyMapping {
                issuer_domain_policy: oid("1.1"),
                subject_domain_policy: oid("2.2"),
            }],
        };
        assert!(tree.apply_mappings(1, &mappings, true, None));
        assert!(tree.process_certificate(2, &policies(&["2.2"]), false, true));
        let leaf = tree.nodes_at(2).next().unwrap();
        assert_eq!(leaf.valid_policy, oid("2.2"));
        assert_eq!(tree.parent(leaf).unwrap().valid_policy, oid("1.1"));
    }

    #[test]
    fn test_mapping_inhibited_deletes_nodes() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.1"]), false, true);
        let mappings = PolicyMappings {
            mappings: vec![PolicyMapping {
                issuer_domain_policy: oid("1.1"),
                subject_domain_policy: oid("2.2"),
            }],
        };
        assert!(!tree.apply_mappings(1, &mappings, false, None));
    }

    #[test]
    fn test_intersection_with_initial_set() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.1", "1.2"]), false, true);
        let initial = BTreeSet::from([oid("1.2")]);
        assert!(tree.intersect(1, &initial));
        assert_eq!(tree.authority_constrained_policies(), BTreeSet::from([oid("1.2")]));

        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["1.1"]), false, true);
        assert!(!tree.intersect(1, &BTreeSet::from([oid("9.9.9.9")])));
    }

    #[test]
    fn test_intersection_replaces_leaf_any_policy() {
        let mut tree = PolicyTree::new();
        tree.process_certificate(1, &policies(&["2.5.29.32.0"]), false, true);
        let initial = BTreeSet::from([oid("1.5"), oid("1.6")]);
        assert!(tree.intersect(1, &initial));
        assert_eq!(tree.authority_constrained_policies(), initial);
    }
}
