use rand::Rng;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Pointers are indices into `SkipList::nodes` (arena allocation): no
/// unsafe, and nodes are never freed individually since the memtable is
/// dropped wholesale after a flush.
#[derive(Clone)]
struct SkipNode<V> {
    key: Vec<u8>,
    value: V,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map from byte keys to `V`.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
///
/// Positions handed out by `lower_bound` and friends are arena indices.
/// They stay valid for the life of the list, since nodes are never removed.
#[derive(Clone)]
pub struct SkipList<V> {
    nodes: Vec<SkipNode<V>>,
    /// Forward pointers of the head sentinel, one per level.
    head: [Option<usize>; MAX_HEIGHT],
    /// Current max level in use (at least 1).
    height: usize,
}

/// For each level, the last node whose key is strictly less than the
/// search key. `None` means the head sentinel.
type Predecessors = [Option<usize>; MAX_HEIGHT];

impl<V> SkipList<V> {
    pub fn new() -> Self {
        SkipList {
            nodes: Vec::new(),
            head: [None; MAX_HEIGHT],
            height: 1,
        }
    }

    /// Insert or overwrite. Returns the value previously stored under `key`.
    pub fn insert(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        let mut preds = self.find_predecessors(&key);

        if let Some(next) = self.next_of(preds[0], 0) {
            if self.nodes[next].key == key {
                return Some(std::mem::replace(&mut self.nodes[next].value, value));
            }
        }

        let height = random_height();
        if height > self.height {
            // Levels above the old height only have the head as predecessor.
            for pred in preds.iter_mut().take(height).skip(self.height) {
                *pred = None;
            }
            self.height = height;
        }

        let idx = self.nodes.len();
        let mut forward = Vec::with_capacity(height);
        for (level, pred) in preds.iter().enumerate().take(height) {
            forward.push(self.next_of(*pred, level));
            self.set_next(*pred, level, Some(idx));
        }
        self.nodes.push(SkipNode { key, value, forward });
        None
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let preds = self.find_predecessors(key);
        self.next_of(preds[0], 0)
            .filter(|&next| self.nodes[next].key == key)
            .map(|next| &self.nodes[next].value)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ascending iterator over every entry.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            current: self.head[0],
        }
    }

    /// Ascending iterator starting at the first key >= `key`.
    pub fn seek(&self, key: &[u8]) -> Iter<'_, V> {
        Iter {
            list: self,
            current: self.lower_bound(key),
        }
    }

    /// Descending iterator starting at the last key <= `key`.
    ///
    /// Nodes have no back pointers, so every step re-runs a predecessor
    /// search: O(log n) per entry.
    pub fn seek_for_prev(&self, key: &[u8]) -> RevIter<'_, V> {
        RevIter {
            list: self,
            current: self.upper_bound_inclusive(key),
        }
    }

    /// Position of the first key >= `key`.
    pub fn lower_bound(&self, key: &[u8]) -> Option<usize> {
        let preds = self.find_predecessors(key);
        self.next_of(preds[0], 0)
    }

    /// Position of the last key <= `key`.
    pub fn upper_bound_inclusive(&self, key: &[u8]) -> Option<usize> {
        let preds = self.find_predecessors(key);
        match self.next_of(preds[0], 0) {
            Some(next) if self.nodes[next].key == key => Some(next),
            _ => preds[0],
        }
    }

    /// Entry at `pos`. Panics on a position not handed out by this list.
    pub fn entry(&self, pos: usize) -> (&[u8], &V) {
        let node = &self.nodes[pos];
        (node.key.as_slice(), &node.value)
    }

    /// Position after `pos` in key order.
    pub fn successor(&self, pos: usize) -> Option<usize> {
        self.nodes[pos].forward[0]
    }

    /// Position before `pos` in key order.
    pub fn predecessor(&self, pos: usize) -> Option<usize> {
        self.find_predecessors(&self.nodes[pos].key)[0]
    }

    fn find_predecessors(&self, key: &[u8]) -> Predecessors {
        let mut preds = [None; MAX_HEIGHT];
        let mut current = None;
        for level in (0..self.height).rev() {
            while let Some(next) = self.next_of(current, level) {
                if self.nodes[next].key.as_slice() < key {
                    current = Some(next);
                } else {
                    break;
                }
            }
            preds[level] = current;
        }
        preds
    }

    fn next_of(&self, node: Option<usize>, level: usize) -> Option<usize> {
        match node {
            None => self.head[level],
            Some(idx) => self.nodes[idx].forward[level],
        }
    }

    fn set_next(&mut self, node: Option<usize>, level: usize, target: Option<usize>) {
        match node {
            None => self.head[level] = target,
            Some(idx) => self.nodes[idx].forward[level] = target,
        }
    }
}

impl<V> Default for SkipList<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Each extra level has a 1/4 probability (LevelDB's branching factor).
fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_HEIGHT && rng.gen_ratio(1, 4) {
        height += 1;
    }
    height
}

/// Follows level 0 forward pointers, which link every entry in order.
pub struct Iter<'a, V> {
    list: &'a SkipList<V>,
    current: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.current?;
        self.current = self.list.successor(pos);
        Some(self.list.entry(pos))
    }
}

pub struct RevIter<'a, V> {
    list: &'a SkipList<V>,
    current: Option<usize>,
}

impl<'a, V> Iterator for RevIter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.current?;
        self.current = self.list.predecessor(pos);
        Some(self.list.entry(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_height_stays_in_bounds() {
        for _ in 0..10_000 {
            let h = random_height();
            assert!((1..=MAX_HEIGHT).contains(&h));
        }
    }

    #[test]
    fn height_grows_with_many_inserts() {
        let mut sl = SkipList::new();
        for i in 0..5_000u32 {
            sl.insert(i.to_be_bytes().to_vec(), ());
        }
        // 5000 nodes with p = 1/4 reach level 2 with overwhelming probability.
        assert!(sl.height > 1);
        assert!(sl.height <= MAX_HEIGHT);
    }
}
