//! Option DAG: registry of interpretation options and their conflicts
//!
//! Primitive options stand for a single interpretation at a relative position
//! (`rid`). Conjunctions combine several options; the DAG keeps each node's
//! parents (the smaller options it was built from) and children (the larger
//! ones built on top of it), so `length` strictly increases toward the leaves.
//! Conflicts are stored symmetrically: the registering side keeps a primary
//! entry, the other side a secondary one.

use aika_core::{Error, Result};
use std::fmt;
use tracing::debug;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct OptionId(pub u32);

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct OptionNode {
    /// Sorted, deduplicated primitive options covered by this node.
    primitives: Vec<OptionId>,
    rid: Option<i64>,
    parents: Vec<OptionId>,
    children: Vec<OptionId>,
    primary: Vec<OptionId>,
    secondary: Vec<OptionId>,
    refs: u32,
    visited: u64,
    removed: bool,
}

#[derive(Debug)]
pub struct OptionDag {
    nodes: Vec<OptionNode>,
    max_rid: i64,
    visited: u64,
}

impl OptionDag {
    pub fn new(max_rid: i64) -> Self {
        Self {
            nodes: Vec::new(),
            max_rid,
            visited: 0,
        }
    }

    fn node(&self, id: OptionId) -> Result<&OptionNode> {
        match self.nodes.get(id.0 as usize) {
            Some(n) if !n.removed => Ok(n),
            _ => Err(Error::Internal(format!("unknown option {}", id))),
        }
    }

    fn next_visited(&mut self) -> u64 {
        self.visited += 1;
        self.visited
    }

    pub fn primitive(&mut self, rid: i64) -> OptionId {
        let id = OptionId(self.nodes.len() as u32);
        self.nodes.push(OptionNode {
            primitives: vec![id],
            rid: Some(rid),
            parents: Vec::new(),
            children: Vec::new(),
            primary: Vec::new(),
            secondary: Vec::new(),
            refs: 1,
            visited: 0,
            removed: false,
        });
        id
    }

    /// Conjunction of `parts`. Returns an existing node when one already
    /// covers exactly the same primitives. Fails with `RidOutOfRange` when
    /// the parts span more positions than allowed.
    pub fn conjunction(&mut self, parts: &[OptionId]) -> Result<OptionId> {
        let mut primitives = Vec::new();
        for part in parts {
            primitives.extend_from_slice(&self.node(*part)?.primitives);
        }
        primitives.sort();
        primitives.dedup();

        let rids: Vec<i64> = primitives
            .iter()
            .filter_map(|p| self.nodes[p.0 as usize].rid)
            .collect();
        if let (Some(min), Some(max)) = (rids.iter().min(), rids.iter().max()) {
            let span = max - min;
            if span > self.max_rid {
                return Err(Error::RidOutOfRange {
                    rid: span,
                    max: self.max_rid,
                });
            }
        }

        if let Some(existing) = self.find(&primitives) {
            self.acquire(existing)?;
            return Ok(existing);
        }

        let id = OptionId(self.nodes.len() as u32);
        // only keep maximal parts as direct parents
        let mut parents: Vec<OptionId> = Vec::new();
        for part in parts {
            if parents.contains(part) {
                continue;
            }
            let covered = parts.iter().any(|other| {
                other != part
                    && self.nodes[other.0 as usize].primitives.len()
                        > self.nodes[part.0 as usize].primitives.len()
                    && is_subset(
                        &self.nodes[part.0 as usize].primitives,
                        &self.nodes[other.0 as usize].primitives,
                    )
            });
            if !covered {
                parents.push(*part);
            }
        }
        for p in &parents {
            self.nodes[p.0 as usize].children.push(id);
        }
        self.nodes.push(OptionNode {
            primitives,
            rid: None,
            parents,
            children: Vec::new(),
            primary: Vec::new(),
            secondary: Vec::new(),
            refs: 1,
            visited: 0,
            removed: false,
        });
        Ok(id)
    }

    fn find(&self, primitives: &[OptionId]) -> Option<OptionId> {
        self.nodes
            .iter()
            .position(|n| !n.removed && n.primitives == primitives)
            .map(|i| OptionId(i as u32))
    }

    /// Number of primitives covered.
    pub fn length(&self, id: OptionId) -> Result<usize> {
        Ok(self.node(id)?.primitives.len())
    }

    pub fn parents(&self, id: OptionId) -> Result<&[OptionId]> {
        Ok(&self.node(id)?.parents)
    }

    pub fn children(&self, id: OptionId) -> Result<&[OptionId]> {
        Ok(&self.node(id)?.children)
    }

    /// Whether `a` covers every primitive of `b`.
    pub fn contains(&mut self, a: OptionId, b: OptionId) -> Result<bool> {
        self.node(a)?;
        self.node(b)?;
        let stamp = self.next_visited();
        let marked = self.nodes[a.0 as usize].primitives.clone();
        for p in marked {
            self.nodes[p.0 as usize].visited = stamp;
        }
        Ok(self.nodes[b.0 as usize]
            .primitives
            .iter()
            .all(|p| self.nodes[p.0 as usize].visited == stamp))
    }

    pub fn add_conflict(&mut self, primary: OptionId, secondary: OptionId) -> Result<()> {
        self.node(primary)?;
        self.node(secondary)?;
        if self.nodes[primary.0 as usize].primary.contains(&secondary) {
            return Ok(());
        }
        self.nodes[primary.0 as usize].primary.push(secondary);
        self.nodes[secondary.0 as usize].secondary.push(primary);
        debug!("option conflict {} <-> {}", primary, secondary);
        Ok(())
    }

    /// Direct conflicts of a node, primary entries first.
    pub fn conflicts(&self, id: OptionId) -> Result<Vec<OptionId>> {
        let n = self.node(id)?;
        Ok(n.primary.iter().chain(n.secondary.iter()).copied().collect())
    }

    /// Two options conflict when any option they are built from (themselves
    /// included) conflicts with any option the other is built from.
    pub fn is_conflicting(&mut self, a: OptionId, b: OptionId) -> Result<bool> {
        self.node(a)?;
        self.node(b)?;
        let stamp = self.next_visited();
        for id in self.ancestors(b) {
            self.nodes[id.0 as usize].visited = stamp;
        }
        for id in self.ancestors(a) {
            let n = &self.nodes[id.0 as usize];
            if n.primary
                .iter()
                .chain(n.secondary.iter())
                .any(|c| self.nodes[c.0 as usize].visited == stamp)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn ancestors(&self, id: OptionId) -> Vec<OptionId> {
        let mut result = vec![id];
        let mut i = 0;
        while i < result.len() {
            for p in &self.nodes[result[i].0 as usize].parents {
                if !result.contains(p) {
                    result.push(*p);
                }
            }
            i += 1;
        }
        result
    }

    pub fn acquire(&mut self, id: OptionId) -> Result<()> {
        self.node(id)?;
        self.nodes[id.0 as usize].refs += 1;
        Ok(())
    }

    /// Drop one reference. At zero the node is removed and its parents are
    /// linked directly to its children. Returns whether the node was removed.
    pub fn release(&mut self, id: OptionId) -> Result<bool> {
        self.node(id)?;
        let node = &mut self.nodes[id.0 as usize];
        node.refs = node.refs.saturating_sub(1);
        if node.refs > 0 {
            return Ok(false);
        }
        node.removed = true;
        let parents = std::mem::take(&mut node.parents);
        let children = std::mem::take(&mut node.children);
        let primary = std::mem::take(&mut node.primary);
        let secondary = std::mem::take(&mut node.secondary);

        for p in &parents {
            let pn = &mut self.nodes[p.0 as usize];
            pn.children.retain(|c| *c != id);
            for c in &children {
                if !pn.children.contains(c) {
                    pn.children.push(*c);
                }
            }
        }
        for c in &children {
            let cn = &mut self.nodes[c.0 as usize];
            cn.parents.retain(|p| *p != id);
            for p in &parents {
                if !cn.parents.contains(p) {
                    cn.parents.push(*p);
                }
            }
        }
        for other in primary.iter().chain(secondary.iter()) {
            let on = &mut self.nodes[other.0 as usize];
            on.primary.retain(|x| *x != id);
            on.secondary.retain(|x| *x != id);
        }
        debug!("removed option {}", id);
        Ok(true)
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_subset(small: &[OptionId], large: &[OptionId]) -> bool {
    small.iter().all(|x| large.binary_search(x).is_ok())
}
