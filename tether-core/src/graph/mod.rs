//! Dependency Graph
//!
//! This module implements the link graph that records which subscribers
//! (effects, computed values) currently depend on which sources (refs,
//! reactive object keys, computed values).
//!
//! # Overview
//!
//! Instead of per-node hash sets, edges are intrusive list entries:
//!
//! - Each source keeps a doubly linked list of the links pointing at it, so a
//!   change can walk its subscribers and a stale link can be unspliced in O(1).
//! - Each subscriber keeps a forward list of its links in read order. A
//!   tracking pass rewinds the tail and walks forward as reads happen; a read
//!   that matches the next entry just advances the tail.
//! - Whatever is left after the tail when the pass ends was not read this
//!   time and is retired.
//!
//! When a subscriber reads the same sources in the same order on every run,
//! re-tracking touches no allocation at all.
//!
//! # Storage
//!
//! Sources and subscribers live in [`slab::Slab`]s and links in a dedicated
//! arena with a free list. Everything is addressed by index, so a link can be
//! a member of two lists without shared mutable pointers.

mod link;
mod node;

use serde::Serialize;
use slab::Slab;
use smallvec::SmallVec;

pub use link::LinkId;
pub use node::{SourceId, SubId, SubKind};

use link::LinkArena;
use node::{SourceNode, SubNode};

/// Subscriber snapshot taken at the start of a propagation walk.
pub type SubscriberList = SmallVec<[(LinkId, SubId); 8]>;

/// Counters describing the current shape of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphStats {
    /// Live source nodes.
    pub sources: usize,
    /// Live subscriber nodes.
    pub subscribers: usize,
    /// Links joining a source and a subscriber.
    pub live_links: usize,
    /// Retired links waiting in the pool.
    pub pooled_links: usize,
}

/// The link graph.
#[derive(Debug, Default)]
pub struct Graph {
    sources: Slab<SourceNode>,
    subs: Slab<SubNode>,
    links: LinkArena,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source node with an empty subscriber list.
    pub fn add_source(&mut self) -> SourceId {
        SourceId::from_raw(self.sources.insert(SourceNode::default()))
    }

    /// Add a subscriber node. Derived subscribers start dirty.
    pub fn add_subscriber(&mut self, kind: SubKind) -> SubId {
        SubId::from_raw(self.subs.insert(SubNode::new(kind)))
    }

    /// Whether `dep` is a live source.
    pub fn contains_source(&self, dep: SourceId) -> bool {
        self.sources.contains(dep.raw())
    }

    /// Whether `sub` is a live subscriber.
    pub fn contains_subscriber(&self, sub: SubId) -> bool {
        self.subs.contains(sub.raw())
    }

    /// Record that `sub` read `dep` during its current tracking pass.
    pub fn link(&mut self, dep: SourceId, sub: SubId) {
        if !self.sources.contains(dep.raw()) {
            return;
        }
        let Some(node) = self.subs.get_mut(sub.raw()) else {
            return;
        };
        // Stopped mid-run
        if !node.tracking {
            return;
        }

        let tail = node.deps_tail;

        // Same source read twice in a row
        if let Some(tail) = tail {
            if self.links[tail].dep == Some(dep) {
                return;
            }
        }

        // Same source read at the same position as last pass
        let next = match tail {
            Some(tail) => self.links[tail].next_dep,
            None => node.deps_head,
        };
        if let Some(next) = next {
            if self.links[next].dep == Some(dep) {
                node.deps_tail = Some(next);
                return;
            }
        }

        let id = self.links.alloc(dep, sub, next);

        let source = &mut self.sources[dep.raw()];
        match source.subs_tail {
            Some(last) => {
                self.links[last].next_sub = Some(id);
                self.links[id].prev_sub = Some(last);
            }
            None => source.subs_head = Some(id),
        }
        source.subs_tail = Some(id);

        match tail {
            Some(tail) => self.links[tail].next_dep = Some(id),
            None => node.deps_head = Some(id),
        }
        node.deps_tail = Some(id);
    }

    /// Begin a tracking pass: rewind the dependency tail.
    pub fn start_track(&mut self, sub: SubId) {
        if let Some(node) = self.subs.get_mut(sub.raw()) {
            node.tracking = true;
            node.deps_tail = None;
        }
    }

    /// End a tracking pass: mark the subscriber clean and retire every link
    /// that was not confirmed during the pass.
    pub fn end_track(&mut self, sub: SubId) {
        let Some(node) = self.subs.get_mut(sub.raw()) else {
            return;
        };
        node.tracking = false;
        node.dirty = false;

        let stale = match node.deps_tail {
            Some(tail) => self.links[tail].next_dep.take(),
            None => node.deps_head.take(),
        };

        if let Some(stale) = stale {
            self.clear_tracking(stale);
        }
    }

    /// Retire `from` and every link after it in its dependency list.
    fn clear_tracking(&mut self, from: LinkId) {
        let mut cursor = Some(from);

        while let Some(id) = cursor {
            let link = &self.links[id];
            let (dep, prev_sub, next_sub) = (link.dep, link.prev_sub, link.next_sub);
            cursor = link.next_dep;

            if let Some(dep) = dep {
                self.unsplice(dep, prev_sub, next_sub);
            }
            self.links.retire(id);
        }
    }

    /// Close the gap a link leaves in a source's subscriber list.
    fn unsplice(&mut self, dep: SourceId, prev: Option<LinkId>, next: Option<LinkId>) {
        match prev {
            Some(prev) => self.links[prev].next_sub = next,
            None => {
                if let Some(source) = self.sources.get_mut(dep.raw()) {
                    source.subs_head = next;
                }
            }
        }

        match next {
            Some(next) => self.links[next].prev_sub = prev,
            None => {
                if let Some(source) = self.sources.get_mut(dep.raw()) {
                    source.subs_tail = prev;
                }
            }
        }
    }

    /// Drop every dependency of `sub` without removing it.
    ///
    /// This is what stopping an effect does.
    pub fn clear_dependencies(&mut self, sub: SubId) {
        self.start_track(sub);
        self.end_track(sub);
    }

    /// Remove a subscriber and all of its links.
    pub fn remove_subscriber(&mut self, sub: SubId) {
        if self.subs.contains(sub.raw()) {
            self.clear_dependencies(sub);
            self.subs.remove(sub.raw());
        }
    }

    /// Remove a source and all of its links.
    ///
    /// Each link is also cut out of its subscriber's dependency list.
    pub fn remove_source(&mut self, dep: SourceId) {
        if !self.sources.contains(dep.raw()) {
            return;
        }
        let source = self.sources.remove(dep.raw());

        let mut cursor = source.subs_head;
        while let Some(id) = cursor {
            let link = &self.links[id];
            let (sub, next_dep) = (link.sub, link.next_dep);
            cursor = link.next_sub;

            if let Some(sub) = sub {
                self.detach_dependency(sub, id, next_dep);
            }
            self.links.retire(id);
        }
    }

    /// Cut `id` out of `sub`'s dependency list.
    fn detach_dependency(&mut self, sub: SubId, id: LinkId, next_dep: Option<LinkId>) {
        let Some(node) = self.subs.get_mut(sub.raw()) else {
            return;
        };

        let mut prev = None;
        let mut cursor = node.deps_head;
        while let Some(current) = cursor {
            if current == id {
                break;
            }
            prev = Some(current);
            cursor = self.links[current].next_dep;
        }
        if cursor.is_none() {
            return;
        }

        match prev {
            Some(prev) => self.links[prev].next_dep = next_dep,
            None => node.deps_head = next_dep,
        }
        if node.deps_tail == Some(id) {
            node.deps_tail = prev;
        }
    }

    /// Snapshot the subscriber list of `dep` in list order.
    pub fn subscribers(&self, dep: SourceId) -> SubscriberList {
        let mut list = SubscriberList::new();
        let Some(source) = self.sources.get(dep.raw()) else {
            return list;
        };

        let mut cursor = source.subs_head;
        while let Some(id) = cursor {
            let link = &self.links[id];
            if let Some(sub) = link.sub {
                list.push((id, sub));
            }
            cursor = link.next_sub;
        }
        list
    }

    /// Whether any subscriber currently tracks `dep`.
    pub fn has_subscribers(&self, dep: SourceId) -> bool {
        self.sources
            .get(dep.raw())
            .is_some_and(|source| source.subs_head.is_some())
    }

    /// Number of links in the subscriber list of `dep`.
    pub fn subscriber_count(&self, dep: SourceId) -> usize {
        self.subscribers(dep).len()
    }

    /// Sources currently tracked by `sub`, in read order.
    pub fn dependencies(&self, sub: SubId) -> Vec<SourceId> {
        let mut deps = Vec::new();
        let Some(node) = self.subs.get(sub.raw()) else {
            return deps;
        };

        let mut cursor = node.deps_head;
        while let Some(id) = cursor {
            let link = &self.links[id];
            if let Some(dep) = link.dep {
                deps.push(dep);
            }
            cursor = link.next_dep;
        }
        deps
    }

    /// Number of links joining `dep` and `sub`.
    pub fn link_count(&self, dep: SourceId, sub: SubId) -> usize {
        self.subscribers(dep)
            .iter()
            .filter(|(_, linked)| *linked == sub)
            .count()
    }

    /// Whether `link` still joins `dep` and `sub`.
    pub fn joins(&self, link: LinkId, dep: SourceId, sub: SubId) -> bool {
        self.links.joins(link, dep, sub)
    }

    /// Mark the subscriber behind `link` dirty, unless it is running or
    /// already dirty. Returns its kind when the mark was applied.
    pub fn mark_dirty(&mut self, link: LinkId, dep: SourceId, sub: SubId) -> Option<SubKind> {
        if !self.links.joins(link, dep, sub) {
            return None;
        }
        let node = self.subs.get_mut(sub.raw())?;
        if node.tracking || node.dirty {
            return None;
        }
        node.dirty = true;
        Some(node.kind)
    }

    /// Whether `sub` has a pending change.
    pub fn is_dirty(&self, sub: SubId) -> bool {
        self.subs.get(sub.raw()).is_some_and(|node| node.dirty)
    }

    /// Whether `sub` is inside a tracking pass.
    pub fn is_tracking(&self, sub: SubId) -> bool {
        self.subs.get(sub.raw()).is_some_and(|node| node.tracking)
    }

    /// Current counters.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            sources: self.sources.len(),
            subscribers: self.subs.len(),
            live_links: self.links.live(),
            pooled_links: self.links.pooled(),
        }
    }

    /// Number of link slots ever allocated.
    pub fn link_capacity(&self) -> usize {
        self.links.capacity()
    }
}
