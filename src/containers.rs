// Built-in container implementations.
//
// Each container is held by value behind an Rc<RefCell<..>> handle
// (see value.rs), so every alias observes every mutation. Keys and
// elements are compared with the structural equality of Value; ordered
// containers use value::compare and so reject incomparable elements at
// the offending operation.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::value::{compare, Value};


// Insertion-ordered association map. Linear lookup keeps equality
// unrestricted (keys need no hash) and iteration deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct MapData {
    entries: Vec<(Value, Value)>
}

impl MapData {
    pub fn new() -> MapData {
        MapData {entries: Vec::new()}
    }

    pub fn size(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&mut self, key: Value, value: Value) {
        for entry in self.entries.iter_mut() {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn has(&self, key: &Value) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn delete(&mut self, key: &Value) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn same_entries(&self, other: &MapData) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |ov| ov == *v))
    }
}


// Insertion-ordered set.
#[derive(Clone, Debug, PartialEq)]
pub struct SetData {
    items: Vec<Value>
}

impl SetData {
    pub fn new() -> SetData {
        SetData {items: Vec::new()}
    }

    pub fn size(&self) -> i64 {
        self.items.len() as i64
    }

    pub fn add(&mut self, value: Value) {
        if !self.items.contains(&value) {
            self.items.push(value);
        }
    }

    pub fn has(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    pub fn delete(&mut self, value: &Value) -> bool {
        let before = self.items.len();
        self.items.retain(|v| v != value);
        self.items.len() != before
    }

    pub fn values(&self) -> &[Value] {
        &self.items
    }

    pub fn same_members(&self, other: &SetData) -> bool {
        self.items.len() == other.items.len()
            && self.items.iter().all(|v| other.has(v))
    }
}


// Binary heap over a Vec, min or max by construction.
#[derive(Clone, Debug)]
pub struct HeapData {
    pub max: bool,
    items: Vec<Value>
}

impl HeapData {
    pub fn new(max: bool) -> HeapData {
        HeapData {max, items: Vec::new()}
    }

    pub fn size(&self) -> i64 {
        self.items.len() as i64
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    // True when a should sit above b.
    fn above(&self, a: &Value, b: &Value) -> Result<bool> {
        let ord = compare(a, b)?;
        Ok(if self.max {
            ord == Ordering::Greater
        } else {
            ord == Ordering::Less
        })
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        self.items.push(value);
        let mut i = self.items.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.above(&self.items[i], &self.items[parent])? {
                self.items.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
        Ok(())
    }

    pub fn peek(&self) -> Result<Value> {
        self.items
            .first()
            .cloned()
            .ok_or_else(|| Error::index("peek on an empty heap"))
    }

    pub fn pop(&mut self) -> Result<Value> {
        if self.items.is_empty() {
            return Err(Error::index("pop on an empty heap"));
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop().expect("heap underflow");
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut best = i;
            if left < self.items.len()
                && self.above(&self.items[left], &self.items[best])?
            {
                best = left;
            }
            if right < self.items.len()
                && self.above(&self.items[right], &self.items[best])?
            {
                best = right;
            }
            if best == i {
                break;
            }
            self.items.swap(i, best);
            i = best;
        }
        Ok(top)
    }
}


// Priority map: push(key, priority), pop the key with the least (or
// greatest) priority. Duplicate keys are allowed; stale entries are
// the caller's concern, as in the usual Dijkstra idiom.
#[derive(Clone, Debug)]
pub struct HeapMapData {
    pub max: bool,
    entries: Vec<(Value, Value)>
}

impl HeapMapData {
    pub fn new(max: bool) -> HeapMapData {
        HeapMapData {max, entries: Vec::new()}
    }

    pub fn size(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    fn above(&self, a: &Value, b: &Value) -> Result<bool> {
        let ord = compare(a, b)?;
        Ok(if self.max {
            ord == Ordering::Greater
        } else {
            ord == Ordering::Less
        })
    }

    pub fn push(&mut self, key: Value, priority: Value) -> Result<()> {
        self.entries.push((key, priority));
        let mut i = self.entries.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.above(&self.entries[i].1, &self.entries[parent].1)? {
                self.entries.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
        Ok(())
    }

    pub fn peek(&self) -> Result<Value> {
        self.entries
            .first()
            .map(|(k, _)| k.clone())
            .ok_or_else(|| Error::index("peek on an empty heap"))
    }

    pub fn pop(&mut self) -> Result<Value> {
        if self.entries.is_empty() {
            return Err(Error::index("pop on an empty heap"));
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let (key, _) = self.entries.pop().expect("heap underflow");
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut best = i;
            if left < self.entries.len()
                && self.above(&self.entries[left].1, &self.entries[best].1)?
            {
                best = left;
            }
            if right < self.entries.len()
                && self.above(&self.entries[right].1, &self.entries[best].1)?
            {
                best = right;
            }
            if best == i {
                break;
            }
            self.entries.swap(i, best);
            i = best;
        }
        Ok(key)
    }
}


// Search tree, plain or AVL-balanced by construction. Duplicates are
// dropped on insert.
#[derive(Clone, Debug)]
pub struct TreeData {
    pub balanced: bool,
    root: Option<Box<TreeNode>>
}

#[derive(Clone, Debug)]
struct TreeNode {
    value: Value,
    height: i64,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>
}

fn height(node: &Option<Box<TreeNode>>) -> i64 {
    node.as_ref().map_or(0, |n| n.height)
}

fn fix_height(node: &mut Box<TreeNode>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn rotate_right(mut node: Box<TreeNode>) -> Box<TreeNode> {
    let mut pivot = node.left.take().expect("rotation without child");
    node.left = pivot.right.take();
    fix_height(&mut node);
    pivot.right = Some(node);
    fix_height(&mut pivot);
    pivot
}

fn rotate_left(mut node: Box<TreeNode>) -> Box<TreeNode> {
    let mut pivot = node.right.take().expect("rotation without child");
    node.right = pivot.left.take();
    fix_height(&mut node);
    pivot.left = Some(node);
    fix_height(&mut pivot);
    pivot
}

fn rebalance(mut node: Box<TreeNode>) -> Box<TreeNode> {
    fix_height(&mut node);
    let balance = height(&node.left) - height(&node.right);
    if balance > 1 {
        let left = node.left.take().expect("unbalanced without child");
        let left = if height(&left.right) > height(&left.left) {
            rotate_left(left)
        } else {
            left
        };
        node.left = Some(left);
        rotate_right(node)
    } else if balance < -1 {
        let right = node.right.take().expect("unbalanced without child");
        let right = if height(&right.left) > height(&right.right) {
            rotate_right(right)
        } else {
            right
        };
        node.right = Some(right);
        rotate_left(node)
    } else {
        node
    }
}

impl TreeData {
    pub fn new(balanced: bool) -> TreeData {
        TreeData {balanced, root: None}
    }

    pub fn insert(&mut self, value: Value) -> Result<()> {
        let root = self.root.take();
        self.root = Some(Self::insert_at(root, value, self.balanced)?);
        Ok(())
    }

    fn insert_at(
        node: Option<Box<TreeNode>>,
        value: Value,
        balanced: bool
    ) -> Result<Box<TreeNode>> {
        let mut node = match node {
            None => {
                return Ok(Box::new(TreeNode {
                    value,
                    height: 1,
                    left: None,
                    right: None
                }))
            },
            Some(node) => node
        };
        match compare(&value, &node.value)? {
            Ordering::Less => {
                node.left =
                    Some(Self::insert_at(node.left.take(), value, balanced)?);
            },
            Ordering::Greater => {
                node.right =
                    Some(Self::insert_at(node.right.take(), value, balanced)?);
            },
            Ordering::Equal => return Ok(node)
        }
        Ok(if balanced {
            rebalance(node)
        } else {
            fix_height(&mut node);
            node
        })
    }

    pub fn search(&self, value: &Value) -> Result<bool> {
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            match compare(value, &node.value)? {
                Ordering::Less => cursor = &node.left,
                Ordering::Greater => cursor = &node.right,
                Ordering::Equal => return Ok(true)
            }
        }
        Ok(false)
    }

    pub fn get_height(&self) -> i64 {
        height(&self.root)
    }

    pub fn pre_order(&self) -> Vec<Value> {
        fn walk(node: &Option<Box<TreeNode>>, out: &mut Vec<Value>) {
            if let Some(n) = node {
                out.push(n.value.clone());
                walk(&n.left, out);
                walk(&n.right, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    pub fn in_order(&self) -> Vec<Value> {
        fn walk(node: &Option<Box<TreeNode>>, out: &mut Vec<Value>) {
            if let Some(n) = node {
                walk(&n.left, out);
                out.push(n.value.clone());
                walk(&n.right, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    pub fn post_order(&self) -> Vec<Value> {
        fn walk(node: &Option<Box<TreeNode>>, out: &mut Vec<Value>) {
            if let Some(n) = node {
                walk(&n.left, out);
                walk(&n.right, out);
                out.push(n.value.clone());
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}


// Adjacency-by-edge-list graph. Vertices keep insertion order; adding
// an edge registers unseen endpoints.
#[derive(Clone, Debug)]
pub struct GraphData {
    pub directed: bool,
    verts: Vec<Value>,
    edges: Vec<(usize, usize, Value)>
}

impl GraphData {
    pub fn new(directed: bool) -> GraphData {
        GraphData {directed, verts: Vec::new(), edges: Vec::new()}
    }

    pub fn size(&self) -> i64 {
        self.verts.len() as i64
    }

    pub fn vertices(&self) -> &Vec<Value> {
        &self.verts
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn index_of(&self, v: &Value) -> Option<usize> {
        self.verts.iter().position(|x| x == v)
    }

    pub fn add_vertex(&mut self, v: Value) {
        if self.index_of(&v).is_none() {
            self.verts.push(v);
        }
    }

    pub fn add_edge(&mut self, from: Value, to: Value, weight: Value) {
        self.add_vertex(from.clone());
        self.add_vertex(to.clone());
        let f = self.index_of(&from).expect("vertex just added");
        let t = self.index_of(&to).expect("vertex just added");
        self.edges.push((f, t, weight));
    }

    pub fn has_vertex(&self, v: &Value) -> bool {
        self.index_of(v).is_some()
    }

    pub fn has_edge(&self, from: &Value, to: &Value) -> bool {
        let (f, t) = match (self.index_of(from), self.index_of(to)) {
            (Some(f), Some(t)) => (f, t),
            _ => return false
        };
        self.edges.iter().any(|(a, b, _)| {
            (*a == f && *b == t) || (!self.directed && *a == t && *b == f)
        })
    }

    // Outgoing (to, weight) pairs; both directions for undirected
    // graphs.
    pub fn neighbors(&self, v: &Value) -> Vec<(Value, Value)> {
        let i = match self.index_of(v) {
            Some(i) => i,
            None => return Vec::new()
        };
        let mut out = Vec::new();
        for (f, t, w) in &self.edges {
            if *f == i {
                out.push((self.verts[*t].clone(), w.clone()));
            } else if !self.directed && *t == i {
                out.push((self.verts[*f].clone(), w.clone()));
            }
        }
        out
    }

    // Every edge as a (from, to, weight) triple, in insertion order.
    pub fn all_edges(&self) -> Vec<(Value, Value, Value)> {
        self.edges
            .iter()
            .map(|(f, t, w)| {
                (self.verts[*f].clone(), self.verts[*t].clone(), w.clone())
            })
            .collect()
    }
}


// The lazy integer range: a..b, a..=b, or the unbounded a.. form.
#[derive(Clone, Debug, PartialEq)]
pub struct LazyRange {
    pub start: i64,
    pub end: Option<i64>,
    pub inclusive: bool
}

impl LazyRange {
    pub fn is_infinite(&self) -> bool {
        self.end.is_none()
    }

    pub fn to_array(&self) -> Result<Vec<Value>> {
        let end = self.end.ok_or_else(|| {
            Error::index("cannot materialize an unbounded range")
        })?;
        let stop = if self.inclusive { end + 1 } else { end };
        Ok((self.start..stop).map(Value::Int).collect())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ints(ns: &[i64]) -> Vec<Value> {
        ns.iter().cloned().map(Value::Int).collect()
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let mut m = MapData::new();
        m.set(Value::Int(2), Value::Int(20));
        m.set(Value::Int(0), Value::Int(0));
        m.set(Value::Int(2), Value::Int(21));
        assert_eq!(m.size(), 2);
        assert_eq!(m.keys(), ints(&[2, 0]));
        assert_eq!(m.get(&Value::Int(2)), Some(Value::Int(21)));
        assert!(m.delete(&Value::Int(2)));
        assert!(!m.delete(&Value::Int(2)));
    }

    #[test]
    fn test_set_dedup() {
        let mut s = SetData::new();
        s.add(Value::Int(1));
        s.add(Value::Int(1));
        s.add(Value::Int(2));
        assert_eq!(s.size(), 2);
        assert!(s.has(&Value::Int(1)));
    }

    #[test]
    fn test_min_heap_order() {
        let mut h = HeapData::new(false);
        for n in &[5, 1, 4, 2, 3] {
            h.push(Value::Int(*n)).unwrap();
        }
        let mut drained = Vec::new();
        while h.size() > 0 {
            drained.push(h.pop().unwrap());
        }
        assert_eq!(drained, ints(&[1, 2, 3, 4, 5]));
        assert!(h.pop().is_err());
    }

    #[test]
    fn test_max_heap_order() {
        let mut h = HeapData::new(true);
        for n in &[2, 9, 4] {
            h.push(Value::Int(*n)).unwrap();
        }
        assert_eq!(h.pop().unwrap(), Value::Int(9));
        assert_eq!(h.peek().unwrap(), Value::Int(4));
    }

    #[test]
    fn test_heapmap_pops_least_priority_key() {
        let mut h = HeapMapData::new(false);
        h.push(Value::Int(10), Value::Int(7)).unwrap();
        h.push(Value::Int(20), Value::Int(3)).unwrap();
        h.push(Value::Int(30), Value::Int(5)).unwrap();
        assert_eq!(h.pop().unwrap(), Value::Int(20));
        assert_eq!(h.pop().unwrap(), Value::Int(30));
        assert_eq!(h.pop().unwrap(), Value::Int(10));
    }

    #[test]
    fn test_avl_stays_balanced() {
        let mut t = TreeData::new(true);
        for n in 1..=7 {
            t.insert(Value::Int(n)).unwrap();
        }
        // A sorted insertion sequence would give height 7 unbalanced.
        assert_eq!(t.get_height(), 3);
        assert_eq!(t.in_order(), ints(&[1, 2, 3, 4, 5, 6, 7]));
        assert!(t.search(&Value::Int(5)).unwrap());
        assert!(!t.search(&Value::Int(8)).unwrap());
    }

    #[test]
    fn test_plain_bst_keeps_shape() {
        let mut t = TreeData::new(false);
        for n in 1..=4 {
            t.insert(Value::Int(n)).unwrap();
        }
        assert_eq!(t.get_height(), 4);
        assert_eq!(t.pre_order(), ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_graph_neighbors_undirected() {
        let mut g = GraphData::new(false);
        g.add_edge(Value::Int(0), Value::Int(1), Value::Int(2));
        g.add_edge(Value::Int(2), Value::Int(0), Value::Int(9));
        assert_eq!(g.size(), 3);
        assert!(g.has_edge(&Value::Int(1), &Value::Int(0)));
        let n = g.neighbors(&Value::Int(0));
        assert_eq!(
            n,
            vec![
                (Value::Int(1), Value::Int(2)),
                (Value::Int(2), Value::Int(9))
            ]
        );
    }

    #[test]
    fn test_graph_directed_edges_one_way() {
        let mut g = GraphData::new(true);
        g.add_edge(Value::Int(0), Value::Int(1), Value::Int(1));
        assert!(g.has_edge(&Value::Int(0), &Value::Int(1)));
        assert!(!g.has_edge(&Value::Int(1), &Value::Int(0)));
        assert!(g.neighbors(&Value::Int(1)).is_empty());
    }

    #[test]
    fn test_lazy_range() {
        let r = LazyRange {start: 2, end: Some(5), inclusive: false};
        assert_eq!(r.to_array().unwrap(), ints(&[2, 3, 4]));
        let r = LazyRange {start: 2, end: Some(5), inclusive: true};
        assert_eq!(r.to_array().unwrap(), ints(&[2, 3, 4, 5]));
        let r = LazyRange {start: 0, end: None, inclusive: false};
        assert!(r.is_infinite());
        assert!(r.to_array().is_err());
    }
}
