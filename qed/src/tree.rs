use std::ops::{Index, IndexMut};
use std::time::Instant;

use qed_core::Range;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::coqtop::StateId;
use crate::sentence::Sentence;

slotmap::new_key_type! {
    /// Arena key for sentences. Unrelated to the prover's [`StateId`].
    pub struct SentenceId;
}

/// The ordered tree of accepted sentences, rooted at the prover's initial
/// state.
///
/// The tree owns the sentence data; the state-id index is a secondary lookup
/// whose entries mirror tree membership exactly. Every mutation goes through
/// this type so the two can never disagree.
pub struct SentenceTree {
    arena: SlotMap<SentenceId, Sentence>,
    index: FxHashMap<StateId, SentenceId>,
    root: SentenceId,
}

impl SentenceTree {
    pub fn new(root_state: StateId) -> Self {
        let mut arena = SlotMap::with_key();
        let root = arena.insert(Sentence::root(root_state));
        let mut index = FxHashMap::default();
        index.insert(root_state, root);
        Self { arena, index, root }
    }

    #[inline]
    pub fn root(&self) -> SentenceId {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    #[inline]
    pub fn get(&self, id: SentenceId) -> Option<&Sentence> {
        self.arena.get(id)
    }

    /// Find the live sentence the prover knows as `state`.
    #[inline]
    pub fn lookup(&self, state: StateId) -> Option<SentenceId> {
        self.index.get(&state).copied()
    }

    /// Append a sentence under `parent`, keeping the children in document
    /// order and the index in sync.
    pub fn add(
        &mut self,
        parent: SentenceId,
        state: StateId,
        text: String,
        range: Range,
        started_at: Instant,
    ) -> SentenceId {
        debug_assert!(
            range.start() >= self.arena[parent].range().end(),
            "sentence at {range} starts before its parent ends at {}",
            self.arena[parent].range().end()
        );
        debug_assert!(!self.index.contains_key(&state), "state {state} is already live");

        let id = self.arena.insert(Sentence::new(state, text, range, started_at, parent));
        self.index.insert(state, id);
        self.insert_child(parent, id);
        id
    }

    fn insert_child(&mut self, parent: SentenceId, child: SentenceId) {
        let start = self.arena[child].range().start();
        let children = &self.arena[parent].children;
        let at = children
            .iter()
            .position(|&c| self.arena[c].range().start() > start)
            .unwrap_or(children.len());
        self.arena[parent].children.insert(at, child);
    }

    /// Pre-order walk of `from`'s descendants, not including `from` itself.
    /// Pre-order over range-ordered children is the timeline of accepted
    /// commands.
    pub fn descendants(&self, from: SentenceId) -> Descendants<'_> {
        let mut stack = self.arena[from].children.clone();
        stack.reverse();
        Descendants { tree: self, stack }
    }

    /// Descendants of `from` in pre-order, stopping at (not including) `end`.
    pub fn descendants_until(
        &self,
        from: SentenceId,
        end: SentenceId,
    ) -> impl Iterator<Item = SentenceId> + '_ {
        self.descendants(from).take_while(move |&id| id != end)
    }

    /// Walk from `from`'s parent up to the root.
    pub fn ancestors(&self, from: SentenceId) -> Ancestors<'_> {
        Ancestors { tree: self, next: self.arena[from].parent() }
    }

    /// Remove the descendants of `from` strictly before `end` in pre-order,
    /// splicing the survivors (starting with `end`) under `from` in document
    /// order. Returns the removed sentences, or `None` when `end` is not a
    /// descendant of `from`.
    pub fn remove_between(&mut self, from: SentenceId, end: SentenceId) -> Option<Vec<Sentence>> {
        let all: Vec<SentenceId> = self.descendants(from).collect();
        let cut = all.iter().position(|&id| id == end)?;
        let (doomed, rest) = all.split_at(cut);

        let doomed_set: FxHashSet<SentenceId> = doomed.iter().copied().collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for &id in doomed {
            let sentence = self.arena.remove(id).unwrap();
            self.index.remove(&sentence.state_id());
            removed.push(sentence);
        }
        self.arena[from].children.retain(|c| !doomed_set.contains(c));

        // reattach survivors whose parent chain was cut
        for &id in rest {
            let orphaned = self.arena[id].parent().is_some_and(|p| doomed_set.contains(&p));
            if orphaned {
                self.arena[id].parent = Some(from);
                self.insert_child(from, id);
            }
        }

        Some(removed)
    }

    /// Drop every descendant of `from`. Returns them in pre-order.
    pub fn truncate(&mut self, from: SentenceId) -> Vec<Sentence> {
        let all: Vec<SentenceId> = self.descendants(from).collect();
        let mut removed = Vec::with_capacity(all.len());
        for id in all {
            let sentence = self.arena.remove(id).unwrap();
            self.index.remove(&sentence.state_id());
            removed.push(sentence);
        }
        self.arena[from].children.clear();
        removed
    }
}

impl Index<SentenceId> for SentenceTree {
    type Output = Sentence;

    #[inline]
    fn index(&self, index: SentenceId) -> &Self::Output {
        &self.arena[index]
    }
}

impl IndexMut<SentenceId> for SentenceTree {
    #[inline]
    fn index_mut(&mut self, index: SentenceId) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

pub struct Descendants<'a> {
    tree: &'a SentenceTree,
    stack: Vec<SentenceId>,
}

impl Iterator for Descendants<'_> {
    type Item = SentenceId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree[id].children().iter().rev());
        Some(id)
    }
}

pub struct Ancestors<'a> {
    tree: &'a SentenceTree,
    next: Option<SentenceId>,
}

impl Iterator for Ancestors<'_> {
    type Item = SentenceId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree[id].parent();
        Some(id)
    }
}
