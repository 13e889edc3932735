use super::*;

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Checks every structural invariant of the set: arena partitioning, list
/// symmetry, one shared name object per class, exact reference counts, and
/// exact byte accounting.
fn validate_set(set: &SeqSet) {
    let mut reachable: HashSet<u32> = HashSet::new();
    let mut stack = vec![ROOT];
    while let Some(id) = stack.pop() {
        assert!(reachable.insert(id.0), "node reached twice: {id:?}");
        for child in set.nodes[id.index()].children {
            if !child.is_null() {
                stack.push(child);
            }
        }
    }
    assert_eq!(reachable.len(), set.live_nodes, "live count must match tree");

    let free: HashSet<u32> = set.free_nodes.iter().map(|id| id.0).collect();
    assert_eq!(free.len(), set.free_nodes.len(), "free list has duplicates");
    assert!(
        reachable.is_disjoint(&free),
        "free slot reachable from the root"
    );
    assert_eq!(reachable.len() + free.len(), set.nodes.len());

    for &raw in &reachable {
        let id = NodeId(raw);
        let node = &set.nodes[id.index()];
        if !node.next.is_null() {
            assert!(reachable.contains(&node.next.0), "next must be live");
            assert_eq!(set.nodes[node.next.index()].prev, id, "a.next=b iff b.prev=a");
        }
        if !node.prev.is_null() {
            assert!(reachable.contains(&node.prev.0), "prev must be live");
            assert_eq!(set.nodes[node.prev.index()].next, id, "a.next=b iff b.prev=a");
        }
    }

    let mut refs: HashMap<u32, u32> = HashMap::new();
    for &raw in &reachable {
        let id = NodeId(raw);
        let node = &set.nodes[id.index()];
        if !node.name.is_null() {
            *refs.entry(node.name.0).or_default() += 1;
        }
        if node.prev.is_null() {
            // Walk the class from its head: one shared name object, no cycle.
            let shared = node.name;
            let mut cur = id;
            let mut steps = 0usize;
            while !cur.is_null() {
                assert_eq!(
                    set.nodes[cur.index()].name,
                    shared,
                    "class members must share one name object"
                );
                steps += 1;
                assert!(steps <= set.live_nodes, "class list must terminate");
                cur = set.nodes[cur.index()].next;
            }
        }
    }

    let mut live_names = 0usize;
    let mut name_bytes = 0usize;
    for (i, entry) in set.names.entries.iter().enumerate() {
        match entry {
            Some(entry) => {
                live_names += 1;
                name_bytes += entry.text.len();
                assert!(entry.refs > 0, "live name entry must be referenced");
                assert_eq!(
                    refs.get(&(i as u32)).copied().unwrap_or(0),
                    entry.refs,
                    "refcount must equal live referencing nodes"
                );
            }
            None => assert!(
                set.names.free.iter().any(|id| id.index() == i),
                "dead name slot must be on the free list"
            ),
        }
    }
    assert_eq!(refs.len(), live_names, "every referenced name must be live");
    assert_eq!(
        set.mem_used,
        set.live_nodes * NODE_COST + name_bytes,
        "byte accounting must be exact"
    );
}

/// Every stored sequence with its class name, by tree walk.
fn dump(set: &SeqSet) -> BTreeMap<String, Option<String>> {
    let mut out = BTreeMap::new();
    let mut stack: Vec<(NodeId, String)> = vec![(ROOT, String::new())];
    while let Some((id, path)) = stack.pop() {
        if !path.is_empty() {
            let name = set.nodes[id.index()].name;
            let name = if name.is_null() {
                None
            } else {
                Some(set.names.text(name).to_string())
            };
            out.insert(path.clone(), name);
        }
        for slot in 0..SYMBOLS {
            let child = set.nodes[id.index()].children[slot];
            if !child.is_null() {
                let mut next = path.clone();
                next.push(char::from(b'0' + slot as u8));
                stack.push((child, next));
            }
        }
    }
    out
}

// =============================================================================
// Reference model
// =============================================================================

/// Naive model: a prefix-closed set of strings plus class-id maps.
#[derive(Clone, Debug, Default)]
struct ModelSet {
    seqs: BTreeSet<String>,
    class: HashMap<String, u32>,
    names: HashMap<u32, String>,
    next_class: u32,
}

impl ModelSet {
    fn add(&mut self, s: &str) -> AddResult {
        let mut created = false;
        for end in 1..=s.len() {
            let p = &s[..end];
            if self.seqs.insert(p.to_string()) {
                self.class.insert(p.to_string(), self.next_class);
                self.next_class += 1;
                created = true;
            }
        }
        if created {
            AddResult::Created
        } else {
            AddResult::AlreadyPresent
        }
    }

    fn remove(&mut self, s: &str) -> RemoveResult {
        if !self.seqs.contains(s) {
            return RemoveResult::NotFound;
        }
        let doomed: Vec<String> = self
            .seqs
            .iter()
            .filter(|t| t.starts_with(s))
            .cloned()
            .collect();
        for t in &doomed {
            self.seqs.remove(t);
            let cid = self.class.remove(t).expect("stored sequence has a class");
            if !self.class.values().any(|&c| c == cid) {
                self.names.remove(&cid);
            }
        }
        RemoveResult::Removed
    }

    fn contains(&self, s: &str) -> bool {
        self.seqs.contains(s)
    }

    fn set_name(&mut self, s: &str, name: &str) -> NameResult {
        if !self.seqs.contains(s) {
            return NameResult::NotFound;
        }
        let cid = self.class[s];
        if self.names.get(&cid).map(String::as_str) == Some(name) {
            return NameResult::Unchanged;
        }
        self.names.insert(cid, name.to_string());
        NameResult::Set
    }

    fn get_name(&self, s: &str) -> Option<String> {
        let cid = self.class.get(s)?;
        self.names.get(cid).cloned()
    }

    fn make_equivalent(&mut self, s1: &str, s2: &str) -> EquivResult {
        if !self.seqs.contains(s1) || !self.seqs.contains(s2) {
            return EquivResult::Unchanged;
        }
        let c1 = self.class[s1];
        let c2 = self.class[s2];
        if c1 == c2 {
            return EquivResult::Unchanged;
        }
        let merged = match (self.names.get(&c1), self.names.get(&c2)) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) if a == b => Some(a.clone()),
            (Some(a), Some(b)) => Some(format!("{a}{b}")),
        };
        for c in self.class.values_mut() {
            if *c == c2 {
                *c = c1;
            }
        }
        self.names.remove(&c2);
        match merged {
            Some(n) => {
                self.names.insert(c1, n);
            }
            None => {
                self.names.remove(&c1);
            }
        }
        EquivResult::Merged
    }

    fn dump(&self) -> BTreeMap<String, Option<String>> {
        self.seqs
            .iter()
            .map(|s| (s.clone(), self.get_name(s)))
            .collect()
    }
}

// =============================================================================
// Strategies
// =============================================================================

#[derive(Clone, Debug)]
enum Op {
    Add(String),
    Remove(String),
    Contains(String),
    SetName(String, String),
    GetName(String),
    Equiv(String, String),
}

/// Short sequences over a three-symbol alphabet collide often, which is what
/// exercises prefix sharing, subtree removal, and class splicing.
fn seq_strategy() -> impl Strategy<Value = String> + Clone {
    proptest::collection::vec(0u8..3, 1..=6)
        .prop_map(|digits| digits.into_iter().map(|d| char::from(b'0' + d)).collect())
}

fn name_strategy() -> impl Strategy<Value = String> + Clone {
    proptest::sample::select(vec!["A", "B", "C", "AB", "name"]).prop_map(String::from)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let seq = seq_strategy();
    let name = name_strategy();
    let op = prop_oneof![
        30 => seq.clone().prop_map(Op::Add),
        12 => seq.clone().prop_map(Op::Remove),
        12 => seq.clone().prop_map(Op::Contains),
        15 => (seq.clone(), name).prop_map(|(s, n)| Op::SetName(s, n)),
        11 => seq.clone().prop_map(Op::GetName),
        20 => (seq.clone(), seq.clone()).prop_map(|(a, b)| Op::Equiv(a, b)),
    ];
    proptest::collection::vec(op, 0..=300)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_model_equivalence(ops in ops_strategy()) {
        let mut set = SeqSet::new();
        let mut model = ModelSet::default();

        for op in ops {
            match op {
                Op::Add(s) => {
                    prop_assert_eq!(set.add(&s).unwrap(), model.add(&s));
                }
                Op::Remove(s) => {
                    prop_assert_eq!(set.remove(&s).unwrap(), model.remove(&s));
                }
                Op::Contains(s) => {
                    prop_assert_eq!(set.contains(&s).unwrap(), model.contains(&s));
                }
                Op::SetName(s, n) => {
                    prop_assert_eq!(set.set_name(&s, &n).unwrap(), model.set_name(&s, &n));
                }
                Op::GetName(s) => {
                    let got = set.get_name(&s).unwrap().map(str::to_string);
                    prop_assert_eq!(got, model.get_name(&s));
                }
                Op::Equiv(s1, s2) => {
                    prop_assert_eq!(
                        set.make_equivalent(&s1, &s2).unwrap(),
                        model.make_equivalent(&s1, &s2)
                    );
                }
            }
            prop_assert_eq!(set.len(), model.seqs.len());
            validate_set(&set);
        }

        prop_assert_eq!(dump(&set), model.dump());
    }

    /// Under an arbitrary memory limit every failed operation must be
    /// invisible: same stored sequences, same names, same accounting.
    #[test]
    fn prop_limited_budget_is_transactional(
        extra_nodes in 0usize..10,
        extra_bytes in 0usize..8,
        ops in ops_strategy(),
    ) {
        let limit = NODE_COST * (1 + extra_nodes) + extra_bytes;
        let mut set = SeqSet::with_memory_limit(limit).unwrap();

        for op in ops {
            let before_dump = dump(&set);
            let before_stats = set.memory_stats();

            let failed = match op {
                Op::Add(s) => set.add(&s).is_err(),
                Op::Remove(s) => set.remove(&s).is_err(),
                Op::Contains(s) => set.contains(&s).is_err(),
                Op::SetName(s, n) => set.set_name(&s, &n).is_err(),
                Op::GetName(s) => set.get_name(&s).is_err(),
                Op::Equiv(s1, s2) => set.make_equivalent(&s1, &s2).is_err(),
            };

            if failed {
                prop_assert_eq!(dump(&set), before_dump);
                prop_assert_eq!(set.memory_stats(), before_stats);
            }
            prop_assert!(set.memory_stats().mem_used <= limit);
            validate_set(&set);
        }
    }
}
