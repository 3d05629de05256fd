// The invariant and predicate engine.
//
// Predicates are total functions over runtime values; trackers record
// per-iteration observations of loop state and synthesize candidate
// refinement predicates at loop exit. Synthesis is advisory: it only
// enriches the types bindings display, never execution.

use std::collections::HashMap;

use crate::ast::{Expr, Node, Pos};
use crate::env::Env;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{compare, expected, repr, Binding, Tag, Value};


#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub name: String,
    pub args: Vec<Value>
}

impl Predicate {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Predicate {
        Predicate {name: name.into(), args}
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            format!("@{}", self.name)
        } else {
            let parts: Vec<String> = self.args.iter().map(repr).collect();
            format!("@{}({})", self.name, parts.join(", "))
        }
    }

    // The numbers a numeric predicate ranges over: a scalar subject
    // yields one, an array subject yields all of its elements.
    fn numbers(subject: &Value) -> Result<Vec<f64>> {
        match subject {
            Value::Int(n) => Ok(vec![*n as f64]),
            Value::Float(x) => Ok(vec![*x]),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Int(n) => Ok(*n as f64),
                    Value::Float(x) => Ok(*x),
                    other => {
                        Err(expected(Tag::Int | Tag::Float, other))
                    }
                })
                .collect(),
            other => Err(expected(
                Tag::Int | Tag::Float | Tag::Array,
                other
            ))
        }
    }

    fn arg_number(&self) -> Result<f64> {
        match self.args.first() {
            Some(Value::Int(n)) => Ok(*n as f64),
            Some(Value::Float(x)) => Ok(*x),
            Some(other) => Err(expected(Tag::Int | Tag::Float, other)),
            None => Err(Error {
                kind: ErrorKind::Type(format!(
                    "predicate @{} needs an argument",
                    self.name
                )),
                pos: None
            })
        }
    }

    pub fn eval(&self, subject: &Value) -> Result<bool> {
        match self.name.as_str() {
            "sorted" => match subject {
                Value::Array(items) => {
                    let items = items.borrow();
                    for pair in items.windows(2) {
                        if compare(&pair[0], &pair[1])?
                            == std::cmp::Ordering::Greater
                        {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                },
                other => {
                    Err(expected(enumflags2::BitFlags::from_flag(Tag::Array), other))
                }
            },
            "positive" => {
                Ok(Self::numbers(subject)?.iter().all(|x| *x > 0.0))
            },
            "negative" => {
                Ok(Self::numbers(subject)?.iter().all(|x| *x < 0.0))
            },
            "non_negative" => {
                Ok(Self::numbers(subject)?.iter().all(|x| *x >= 0.0))
            },
            "non_empty" => match subject {
                Value::Str(s) => Ok(!s.is_empty()),
                Value::Array(items) => Ok(!items.borrow().is_empty()),
                Value::Map(m) => Ok(m.borrow().size() > 0),
                Value::Set(s) => Ok(s.borrow().size() > 0),
                Value::Heap(h) => Ok(h.borrow().size() > 0),
                Value::HeapMap(h) => Ok(h.borrow().size() > 0),
                Value::Graph(g) => Ok(g.borrow().size() > 0),
                other => Err(expected(
                    Tag::Str
                        | Tag::Array
                        | Tag::Map
                        | Tag::Set
                        | Tag::Heap
                        | Tag::HeapMap
                        | Tag::Graph,
                    other
                ))
            },
            "unique" => match subject {
                Value::Array(items) => {
                    let items = items.borrow();
                    for i in 0..items.len() {
                        for j in (i + 1)..items.len() {
                            if items[i] == items[j] {
                                return Ok(false);
                            }
                        }
                    }
                    Ok(true)
                },
                other => {
                    Err(expected(enumflags2::BitFlags::from_flag(Tag::Array), other))
                }
            },
            "greater_than" => {
                let bound = self.arg_number()?;
                Ok(Self::numbers(subject)?.iter().all(|x| *x > bound))
            },
            "less_than" => {
                let bound = self.arg_number()?;
                Ok(Self::numbers(subject)?.iter().all(|x| *x < bound))
            },
            "equals" => match self.args.first() {
                Some(arg) => Ok(subject == arg),
                None => Err(Error {
                    kind: ErrorKind::Type(String::from(
                        "predicate @equals needs an argument"
                    )),
                    pos: None
                })
            },
            other => Err(Error {
                kind: ErrorKind::Name(format!(
                    "unknown predicate @{}",
                    other
                )),
                pos: None
            })
        }
    }
}


// What the tracker remembers about one binding in one iteration.
#[derive(Copy, Clone, Debug)]
enum Observed {
    Num(f64),
    Arr {
        empty: bool,
        sorted: bool,
        unique: bool
    }
}

fn observe(value: &Value) -> Option<Observed> {
    match value {
        Value::Int(n) => Some(Observed::Num(*n as f64)),
        Value::Float(x) if x.is_finite() => Some(Observed::Num(*x)),
        Value::Array(items) => {
            let empty = items.borrow().is_empty();
            let sorted = Predicate::new("sorted", vec![])
                .eval(value)
                .unwrap_or(false);
            let unique = Predicate::new("unique", vec![])
                .eval(value)
                .unwrap_or(false);
            Some(Observed::Arr {empty, sorted, unique})
        },
        _ => None
    }
}


// An @invariant statement registered inside a loop body, re-checked
// at iteration boundaries.
#[derive(Clone, Debug)]
pub struct Invariant {
    pub cond: Node<Expr>,
    pub message: Option<String>,
    pub pos: Pos
}


// Per-loop synthesis state: one entry per recorded iteration.
#[derive(Debug)]
pub struct Tracker {
    pub context: &'static str,
    states: Vec<HashMap<String, Observed>>,
    invariants: Vec<Invariant>,
    // Turnstile checks observed while the loop ran, by binding name.
    checks: Vec<(String, Predicate, bool)>
}

impl Tracker {
    pub fn new(context: &'static str) -> Tracker {
        Tracker {
            context,
            states: Vec::new(),
            invariants: Vec::new(),
            checks: Vec::new()
        }
    }

    pub fn iteration(&self) -> usize {
        self.states.len()
    }

    pub fn record_state(&mut self, env: &Node<Env<Binding>>) {
        let mut state = HashMap::new();
        for (name, binding) in env.visible() {
            if let Some(obs) = observe(&binding.value) {
                state.insert(name, obs);
            }
        }
        self.states.push(state);
    }

    pub fn register_invariant(
        &mut self,
        cond: &Node<Expr>,
        message: &Option<String>,
        pos: Pos
    ) {
        // The statement re-executes every iteration; register once.
        if self.invariants.iter().any(|i| Node::ptr_eq(&i.cond, cond)) {
            return;
        }
        self.invariants.push(Invariant {
            cond: cond.clone(),
            message: message.clone(),
            pos
        });
    }

    pub fn invariants(&self) -> Vec<Invariant> {
        self.invariants.clone()
    }

    pub fn observe_check(
        &mut self,
        name: &str,
        predicate: &Predicate,
        held: bool
    ) {
        self.checks
            .push((String::from(name), predicate.clone(), held));
    }

    // Candidate refinements consistent across every recorded state.
    pub fn synthesize(&self) -> Vec<(String, Vec<Predicate>)> {
        let mut out: Vec<(String, Vec<Predicate>)> = Vec::new();
        if self.states.is_empty() {
            return out;
        }

        let first = &self.states[0];
        for name in first.keys() {
            let mut nums = Vec::new();
            let mut arrs = Vec::new();
            for state in &self.states {
                match state.get(name) {
                    Some(Observed::Num(x)) => nums.push(*x),
                    Some(Observed::Arr {empty, sorted, unique}) => {
                        arrs.push((*empty, *sorted, *unique))
                    },
                    None => break
                }
            }

            let mut predicates = Vec::new();
            if nums.len() == self.states.len() {
                if nums.iter().all(|x| *x > 0.0) {
                    predicates.push(Predicate::new("positive", vec![]));
                }
                if nums.iter().all(|x| *x < 0.0) {
                    predicates.push(Predicate::new("negative", vec![]));
                }
                if nums.iter().all(|x| *x >= 0.0) {
                    predicates.push(Predicate::new("non_negative", vec![]));
                }
            } else if arrs.len() == self.states.len() {
                if arrs.iter().all(|(empty, _, _)| !empty) {
                    predicates.push(Predicate::new("non_empty", vec![]));
                }
                if arrs.iter().all(|(_, sorted, _)| *sorted) {
                    predicates.push(Predicate::new("sorted", vec![]));
                }
                if arrs.iter().all(|(_, _, unique)| *unique) {
                    predicates.push(Predicate::new("unique", vec![]));
                }
            }

            // Turnstile checks that held every time they ran.
            let mut held_preds: Vec<Predicate> = Vec::new();
            let mut failed: Vec<&Predicate> = Vec::new();
            for (n, p, held) in &self.checks {
                if n != name {
                    continue;
                }
                if *held {
                    held_preds.push(p.clone());
                } else {
                    failed.push(p);
                }
            }
            for p in held_preds {
                let key = p.render();
                if failed.iter().any(|f| f.render() == key) {
                    continue;
                }
                if !predicates.iter().any(|q| q.render() == key) {
                    predicates.push(p);
                }
            }

            if !predicates.is_empty() {
                out.push((name.clone(), predicates));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}


// The post-mortem environment rendering attached to verification
// failures: every visible non-function binding, one per line.
pub fn snapshot(env: &Node<Env<Binding>>) -> Vec<String> {
    env.visible()
        .into_iter()
        .filter(|(_, b)| match b.value {
            Value::Closure(_) | Value::Native(_) | Value::Bound(_) => false,
            _ => true
        })
        .map(|(name, b)| format!("{} = {}", name, repr(&b.value)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn arr(ns: &[i64]) -> Value {
        Value::Array(Rc::new(RefCell::new(
            ns.iter().cloned().map(Value::Int).collect()
        )))
    }

    fn holds(name: &str, args: Vec<Value>, subject: &Value) -> bool {
        Predicate::new(name, args).eval(subject).unwrap()
    }

    #[test]
    fn test_sorted() {
        assert!(holds("sorted", vec![], &arr(&[1, 3, 5])));
        assert!(holds("sorted", vec![], &arr(&[1, 1, 2])));
        assert!(!holds("sorted", vec![], &arr(&[1, 3, 2])));
        assert!(holds("sorted", vec![], &arr(&[])));
        assert!(Predicate::new("sorted", vec![])
            .eval(&Value::Int(1))
            .is_err());
    }

    #[test]
    fn test_numeric_predicates() {
        assert!(holds("positive", vec![], &Value::Int(3)));
        assert!(!holds("positive", vec![], &Value::Int(0)));
        assert!(holds("non_negative", vec![], &Value::Int(0)));
        assert!(holds("negative", vec![], &Value::Float(-0.5)));
        // Arrays quantify over their elements.
        assert!(holds("positive", vec![], &arr(&[1, 2, 3])));
        assert!(!holds("positive", vec![], &arr(&[1, -2, 3])));
    }

    #[test]
    fn test_bounded_predicates() {
        assert!(holds("greater_than", vec![Value::Int(2)], &Value::Int(3)));
        assert!(!holds("greater_than", vec![Value::Int(3)], &Value::Int(3)));
        assert!(holds("less_than", vec![Value::Float(1.5)], &Value::Int(1)));
        assert!(holds("equals", vec![Value::Int(4)], &Value::Int(4)));
        assert!(Predicate::new("greater_than", vec![])
            .eval(&Value::Int(1))
            .is_err());
    }

    #[test]
    fn test_unique_and_non_empty() {
        assert!(holds("unique", vec![], &arr(&[1, 2, 3])));
        assert!(!holds("unique", vec![], &arr(&[1, 2, 1])));
        assert!(holds("non_empty", vec![], &arr(&[1])));
        assert!(!holds("non_empty", vec![], &arr(&[])));
    }

    #[test]
    fn test_unknown_predicate_is_diagnosed() {
        assert!(Predicate::new("mystery", vec![])
            .eval(&Value::Int(1))
            .is_err());
    }

    #[test]
    fn test_tracker_synthesis() {
        let env: Node<Env<Binding>> = Env::root();
        let mut tracker = Tracker::new("while");

        env.define("i", Binding::of(Value::Int(0)));
        env.define("xs", Binding::of(arr(&[1, 2, 3])));
        tracker.record_state(&env);
        for i in 1..=3 {
            env.set("i", Binding::of(Value::Int(i)));
            tracker.record_state(&env);
        }

        let synthesized = tracker.synthesize();
        let i_preds: &Vec<Predicate> = &synthesized
            .iter()
            .find(|(n, _)| n == "i")
            .expect("refinements for i")
            .1;
        // 0 appears in the trace, so positive must not survive.
        assert!(i_preds.iter().any(|p| p.name == "non_negative"));
        assert!(!i_preds.iter().any(|p| p.name == "positive"));

        let xs_preds: &Vec<Predicate> = &synthesized
            .iter()
            .find(|(n, _)| n == "xs")
            .expect("refinements for xs")
            .1;
        assert!(xs_preds.iter().any(|p| p.name == "sorted"));
        assert!(xs_preds.iter().any(|p| p.name == "non_empty"));
        assert!(xs_preds.iter().any(|p| p.name == "unique"));
    }

    #[test]
    fn test_snapshot_skips_functions() {
        let env: Node<Env<Binding>> = Env::root();
        env.define("arr", Binding::of(arr(&[1, 3, 2])));
        env.define(
            "print",
            Binding::of(Value::Native(crate::value::Native {name: "print"}))
        );
        assert_eq!(snapshot(&env), vec![String::from("arr = [1, 3, 2]")]);
    }
}
