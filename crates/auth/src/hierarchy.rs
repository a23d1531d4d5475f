//! Site hierarchy index and site visibility.
//!
//! Sites form a forest inside a client: a site may have a parent site, and a
//! SITE_GROUP grant on a site reaches every transitive descendant.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use inspectra_core::SiteId;

use crate::{EffectiveAccessGrant, Scope};

/// Flat (site, parent) pair as stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteNode {
    pub id: SiteId,
    pub parent_id: Option<SiteId>,
}

impl SiteNode {
    pub fn root(id: SiteId) -> Self {
        Self { id, parent_id: None }
    }

    pub fn child(id: SiteId, parent_id: SiteId) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("site hierarchy contains a cycle through site {site_id}")]
    Cycle { site_id: SiteId },

    #[error("site {site_id} appears more than once")]
    DuplicateSite { site_id: SiteId },
}

/// Every site mapped to all of its transitive descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteHierarchy {
    descendants: BTreeMap<SiteId, Vec<SiteId>>,
}

impl SiteHierarchy {
    /// Build the index from flat (site, parent) pairs.
    ///
    /// Parents that are not part of `sites` are treated as absent (the site is
    /// a root). Any cycle, including a site parented to itself, is rejected.
    /// Nodes are visited in id order, so the reported site is deterministic.
    pub fn build(sites: &[SiteNode]) -> Result<Self, HierarchyError> {
        let mut parent_of: BTreeMap<SiteId, Option<SiteId>> = BTreeMap::new();
        for node in sites {
            if parent_of.insert(node.id, node.parent_id).is_some() {
                return Err(HierarchyError::DuplicateSite { site_id: node.id });
            }
        }

        let mut children: BTreeMap<SiteId, Vec<SiteId>> = BTreeMap::new();
        let mut roots = Vec::new();
        for (&id, &parent) in &parent_of {
            match parent.filter(|p| parent_of.contains_key(p)) {
                Some(p) => children.entry(p).or_default().push(id),
                None => roots.push(id),
            }
        }

        detect_cycle(&parent_of)?;

        // Breadth-first from the roots; processing that order backwards sees
        // every child before its parent.
        let mut order = Vec::with_capacity(parent_of.len());
        let mut queue: VecDeque<SiteId> = roots.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(kids) = children.get(&id) {
                queue.extend(kids.iter().copied());
            }
        }

        let mut descendants: BTreeMap<SiteId, Vec<SiteId>> = BTreeMap::new();
        for id in order.iter().rev() {
            let mut all = Vec::new();
            if let Some(kids) = children.get(id) {
                for kid in kids {
                    all.push(*kid);
                    if let Some(grand) = descendants.get(kid) {
                        all.extend(grand.iter().copied());
                    }
                }
            }
            all.sort();
            descendants.insert(*id, all);
        }

        Ok(Self { descendants })
    }

    /// Transitive descendants of `site` (empty for leaves and unknown sites).
    pub fn descendants_of(&self, site: SiteId) -> &[SiteId] {
        self.descendants.get(&site).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, site: SiteId) -> bool {
        self.descendants.contains_key(&site)
    }

    pub fn len(&self) -> usize {
        self.descendants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descendants.is_empty()
    }

    pub fn site_ids(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.descendants.keys().copied()
    }
}

fn detect_cycle(parent_of: &BTreeMap<SiteId, Option<SiteId>>) -> Result<(), HierarchyError> {
    #[derive(Copy, Clone, PartialEq, Eq)]
    enum Mark {
        OnPath,
        Done,
    }

    let mut marks: BTreeMap<SiteId, Mark> = BTreeMap::new();
    for &start in parent_of.keys() {
        let mut path = Vec::new();
        let mut current = Some(start);

        while let Some(id) = current {
            match marks.get(&id) {
                Some(Mark::Done) => break,
                Some(Mark::OnPath) => return Err(HierarchyError::Cycle { site_id: id }),
                None => {}
            }
            marks.insert(id, Mark::OnPath);
            path.push(id);
            current = parent_of
                .get(&id)
                .copied()
                .flatten()
                .filter(|p| parent_of.contains_key(p));
        }

        for id in path {
            marks.insert(id, Mark::Done);
        }
    }
    Ok(())
}

/// Which sites a grant may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "site_ids", rename_all = "snake_case")]
pub enum VisibleSites {
    /// No site filtering at all; callers must not apply a site predicate.
    All,
    Sites(BTreeSet<SiteId>),
}

impl VisibleSites {
    pub fn none() -> Self {
        VisibleSites::Sites(BTreeSet::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, VisibleSites::All)
    }

    pub fn contains(&self, site: SiteId) -> bool {
        match self {
            VisibleSites::All => true,
            VisibleSites::Sites(ids) => ids.contains(&site),
        }
    }

    /// Explicit ids, or `None` when unrestricted.
    pub fn ids(&self) -> Option<&BTreeSet<SiteId>> {
        match self {
            VisibleSites::All => None,
            VisibleSites::Sites(ids) => Some(ids),
        }
    }
}

/// Sites visible to `grant` within `hierarchy`.
pub fn visible_sites(grant: &EffectiveAccessGrant, hierarchy: &SiteHierarchy) -> VisibleSites {
    visible_sites_with(grant, |site| hierarchy.descendants_of(site).to_vec())
}

/// Like [`visible_sites`], with descendants supplied by the caller (e.g. from a cache).
///
/// `descendants_of` is only consulted for SITE_GROUP grants.
pub fn visible_sites_with<F>(grant: &EffectiveAccessGrant, descendants_of: F) -> VisibleSites
where
    F: FnOnce(SiteId) -> Vec<SiteId>,
{
    if grant.scope.is_at_least(Scope::Client) {
        return VisibleSites::All;
    }

    match (grant.scope, grant.site_id) {
        (Scope::SiteGroup, Some(site)) => {
            let mut ids: BTreeSet<SiteId> = descendants_of(site).into_iter().collect();
            ids.insert(site);
            VisibleSites::Sites(ids)
        }
        (Scope::Site, Some(site)) => VisibleSites::Sites(BTreeSet::from([site])),
        _ => VisibleSites::none(),
    }
}
