//! Link Arena
//!
//! Every edge in the dependency graph is a [`Link`]. A link sits in two lists
//! at once: the source's subscriber list (doubly linked through `prev_sub` /
//! `next_sub`) and the subscriber's dependency list (forward only, through
//! `next_dep`).
//!
//! Links are stored in a flat arena and addressed by [`LinkId`]. Retired links
//! are not freed; they are chained into a pool through their `next_dep` field
//! and handed out again by the next allocation. A subscriber that re-runs with
//! a changing dependency set therefore recycles its edges instead of growing
//! the arena.

use super::node::{SourceId, SubId};

/// Index of a link in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u32);

impl LinkId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One edge between a source and a subscriber.
#[derive(Debug, Default, Clone)]
pub(crate) struct Link {
    /// The source end. `None` while the link sits in the pool.
    pub dep: Option<SourceId>,
    /// The subscriber end. `None` while the link sits in the pool.
    pub sub: Option<SubId>,
    pub prev_sub: Option<LinkId>,
    pub next_sub: Option<LinkId>,
    /// Next entry of the subscriber's dependency list, or the next pooled
    /// link once retired.
    pub next_dep: Option<LinkId>,
}

/// Growable link storage with a free list.
#[derive(Debug, Default)]
pub(crate) struct LinkArena {
    links: Vec<Link>,
    pool: Option<LinkId>,
    pooled: usize,
}

impl LinkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a link from the pool, or grow the arena when the pool is empty.
    pub fn alloc(&mut self, dep: SourceId, sub: SubId, next_dep: Option<LinkId>) -> LinkId {
        let fresh = Link {
            dep: Some(dep),
            sub: Some(sub),
            prev_sub: None,
            next_sub: None,
            next_dep,
        };

        match self.pool {
            Some(id) => {
                self.pool = self.links[id.index()].next_dep;
                self.pooled -= 1;
                self.links[id.index()] = fresh;
                id
            }
            None => {
                let id = LinkId(
                    u32::try_from(self.links.len()).expect("link arena exceeded u32::MAX entries"),
                );
                self.links.push(fresh);
                id
            }
        }
    }

    /// Clear every cross-reference of `id` and push it onto the pool.
    pub fn retire(&mut self, id: LinkId) {
        let pool = self.pool;
        let link = &mut self.links[id.index()];
        link.dep = None;
        link.sub = None;
        link.prev_sub = None;
        link.next_sub = None;
        link.next_dep = pool;
        self.pool = Some(id);
        self.pooled += 1;
    }

    /// Whether `id` currently joins exactly `dep` and `sub`.
    pub fn joins(&self, id: LinkId, dep: SourceId, sub: SubId) -> bool {
        self.links
            .get(id.index())
            .is_some_and(|link| link.dep == Some(dep) && link.sub == Some(sub))
    }

    /// Number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.links.len()
    }

    /// Number of retired links waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.pooled
    }

    /// Number of links currently joining a source and a subscriber.
    pub fn live(&self) -> usize {
        self.links.len() - self.pooled
    }
}

impl std::ops::Index<LinkId> for LinkArena {
    type Output = Link;

    fn index(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }
}

impl std::ops::IndexMut<LinkId> for LinkArena {
    fn index_mut(&mut self, id: LinkId) -> &mut Link {
        &mut self.links[id.index()]
    }
}
