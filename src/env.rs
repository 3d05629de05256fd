use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;

use crate::ast::Node;


// Datastructure to manage lexical scoping. One frame per block or
// function activation; lookups walk the parent chain.
pub struct Env<T> {
    scope: RefCell<HashMap<String, T>>,
    parent: Option<Node<Env<T>>>
}


impl<T> Env<T> where T: Clone + Debug {
    fn new(parent: Option<Node<Env<T>>>) -> Node<Env<T>> {
        Node::new(Env {
            scope: RefCell::new(HashMap::new()),
            parent
        })
    }

    pub fn root() -> Node<Env<T>> {
        Self::new(None)
    }

    pub fn chain(parent: &Node<Env<T>>) -> Node<Env<T>> {
        Self::new(Some(parent.clone()))
    }

    pub fn parent(&self) -> Option<Node<Env<T>>> {
        self.parent.clone()
    }

    // Look up an identifier from anywhere in our scope chain.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.scope.borrow().get(key) {
            Some(value.clone())
        } else if let Some(env) = &self.parent {
            env.get(key)
        } else {
            None
        }
    }

    // Insert a value in the current scope.
    pub fn define(&self, key: &str, value: T) {
        self.scope.borrow_mut().insert(String::from(key), value);
    }

    // Update the binding in the nearest frame that holds it. Returns
    // false when the name is unbound anywhere in the chain.
    pub fn set(&self, key: &str, value: T) -> bool {
        if self.scope.borrow().contains_key(key) {
            self.scope.borrow_mut().insert(String::from(key), value);
            true
        } else if let Some(env) = &self.parent {
            env.set(key, value)
        } else {
            false
        }
    }

    pub fn is_defined_here(&self, key: &str) -> bool {
        self.scope.borrow().contains_key(key)
    }

    // Every visible binding, innermost shadowing outermost, in sorted
    // name order so renderings are stable.
    pub fn visible(&self) -> Vec<(String, T)> {
        let mut seen = HashMap::new();
        self.collect(&mut seen);
        let mut items: Vec<(String, T)> = seen.into_iter().collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    fn collect(&self, seen: &mut HashMap<String, T>) {
        for (k, v) in self.scope.borrow().iter() {
            seen.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if let Some(env) = &self.parent {
            env.collect(seen);
        }
    }
}


impl<T> Debug for Env<T> where T: Clone + Debug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<String> =
            self.scope.borrow().keys().cloned().collect();
        names.sort();
        write!(f, "<env {:?}>", names)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup() {
        let root: Node<Env<i64>> = Env::root();
        root.define("x", 1);
        let child = Env::chain(&root);
        child.define("y", 2);

        assert_eq!(child.get("x"), Some(1));
        assert_eq!(child.get("y"), Some(2));
        assert_eq!(root.get("y"), None);
    }

    #[test]
    fn test_shadowing() {
        let root: Node<Env<i64>> = Env::root();
        root.define("x", 1);
        let child = Env::chain(&root);
        child.define("x", 2);

        assert_eq!(child.get("x"), Some(2));
        assert_eq!(root.get("x"), Some(1));
    }

    #[test]
    fn test_set_walks_to_owner() {
        let root: Node<Env<i64>> = Env::root();
        root.define("x", 1);
        let child = Env::chain(&root);

        assert!(child.set("x", 10));
        assert_eq!(root.get("x"), Some(10));
        assert!(!child.set("missing", 0));
    }

    #[test]
    fn test_visible_is_sorted_and_shadow_aware() {
        let root: Node<Env<i64>> = Env::root();
        root.define("b", 1);
        root.define("a", 2);
        let child = Env::chain(&root);
        child.define("b", 3);

        assert_eq!(
            child.visible(),
            vec![(String::from("a"), 2), (String::from("b"), 3)]
        );
    }
}
