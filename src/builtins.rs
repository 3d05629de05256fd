// Built-in dispatch: uniform access to container operations through a
// single type-tagged entry point, plus the native functions and
// constructors installed into every machine's root frame.

use std::cell::RefCell;
use std::rc::Rc;

use enumflags2::BitFlags;

use crate::ast::Node;
use crate::containers::{
    GraphData,
    HeapData,
    HeapMapData,
    MapData,
    SetData,
    TreeData
};
use crate::env::Env;
use crate::error::{Error, ErrorKind, Result};
use crate::types::Type;
use crate::value::{display, expected, Binding, Native, Tag, TryInto, Value};


const CONSTRUCTORS: &[&str] = &[
    "Map",
    "Set",
    "MinHeap",
    "MaxHeap",
    "MinHeapMap",
    "MaxHeapMap",
    "Graph",
    "BinaryTree",
    "AVLTree"
];


// Install the root bindings: print, inf, and the container
// constructors.
pub fn install(env: &Node<Env<Binding>>) {
    env.define("print", Binding::of(Value::Native(Native {name: "print"})));
    env.define(
        "inf",
        Binding::new(
            Value::Float(f64::INFINITY),
            Node::new(Type::Intersection(vec![
                Node::new(Type::Int),
                Node::new(Type::Float)
            ]))
        )
    );
    for name in CONSTRUCTORS {
        env.define(name, Binding::of(Value::Native(Native {name})));
    }
}


fn arity(method: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error {
            kind: ErrorKind::Type(format!(
                "{} expects {} argument(s), got {}",
                method,
                n,
                args.len()
            )),
            pos: None
        })
    }
}

fn array_value(items: Vec<Value>) -> Value {
    Value::Array(Rc::new(RefCell::new(items)))
}


pub fn native_call(
    name: &str,
    args: &[Value],
    out: &mut Vec<String>
) -> Result<Value> {
    match name {
        "print" => {
            let parts: Vec<String> = args.iter().map(display).collect();
            out.push(parts.join(" "));
            Ok(Value::Void)
        },
        "Map" => {
            arity(name, args, 0)?;
            Ok(Value::Map(Rc::new(RefCell::new(MapData::new()))))
        },
        "Set" => {
            arity(name, args, 0)?;
            Ok(Value::Set(Rc::new(RefCell::new(SetData::new()))))
        },
        "MinHeap" | "MaxHeap" => {
            arity(name, args, 0)?;
            Ok(Value::Heap(Rc::new(RefCell::new(HeapData::new(
                name == "MaxHeap"
            )))))
        },
        "MinHeapMap" | "MaxHeapMap" => {
            arity(name, args, 0)?;
            Ok(Value::HeapMap(Rc::new(RefCell::new(HeapMapData::new(
                name == "MaxHeapMap"
            )))))
        },
        "BinaryTree" | "AVLTree" => {
            arity(name, args, 0)?;
            Ok(Value::Tree(Rc::new(RefCell::new(TreeData::new(
                name == "AVLTree"
            )))))
        },
        "Graph" => {
            let directed = match args {
                [] => false,
                [flag] => flag.clone().try_into()?,
                _ => return arity(name, args, 1).map(|_| Value::Void)
            };
            Ok(Value::Graph(Rc::new(RefCell::new(GraphData::new(
                directed
            )))))
        },
        other => Err(Error::internal(format!("unknown native `{}`", other)))
    }
}


// Dispatch a method call against its receiver. The inference pass has
// already vetted well-typed programs; this is the runtime's own check
// for the weak/dynamic paths.
pub fn invoke(recv: &Value, method: &str, args: &[Value]) -> Result<Value> {
    match recv {
        Value::Array(items) => match method {
            "length" => {
                arity(method, args, 0)?;
                Ok(Value::Int(items.borrow().len() as i64))
            },
            "push" => {
                arity(method, args, 1)?;
                items.borrow_mut().push(args[0].clone());
                Ok(Value::Void)
            },
            "pop" => {
                arity(method, args, 0)?;
                items
                    .borrow_mut()
                    .pop()
                    .ok_or_else(|| Error::index("pop on an empty array"))
            },
            _ => unknown(method, recv)
        },
        Value::Map(m) => match method {
            "size" => {
                arity(method, args, 0)?;
                Ok(Value::Int(m.borrow().size()))
            },
            "get" => {
                arity(method, args, 1)?;
                m.borrow().get(&args[0]).ok_or_else(|| {
                    Error::index(format!(
                        "key {} not found",
                        crate::value::repr(&args[0])
                    ))
                })
            },
            "set" => {
                arity(method, args, 2)?;
                m.borrow_mut().set(args[0].clone(), args[1].clone());
                Ok(Value::Void)
            },
            "has" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(m.borrow().has(&args[0])))
            },
            "delete" | "deleteWithKey" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(m.borrow_mut().delete(&args[0])))
            },
            "keys" => {
                arity(method, args, 0)?;
                Ok(array_value(m.borrow().keys()))
            },
            "values" => {
                arity(method, args, 0)?;
                Ok(array_value(m.borrow().values()))
            },
            "entries" => {
                arity(method, args, 0)?;
                let entries: Vec<Value> = m
                    .borrow()
                    .entries()
                    .iter()
                    .map(|(k, v)| {
                        Value::Tuple(Rc::new(vec![k.clone(), v.clone()]))
                    })
                    .collect();
                Ok(array_value(entries))
            },
            _ => unknown(method, recv)
        },
        Value::Set(s) => match method {
            "size" => {
                arity(method, args, 0)?;
                Ok(Value::Int(s.borrow().size()))
            },
            "add" => {
                arity(method, args, 1)?;
                s.borrow_mut().add(args[0].clone());
                Ok(Value::Void)
            },
            "has" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(s.borrow().has(&args[0])))
            },
            "delete" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(s.borrow_mut().delete(&args[0])))
            },
            "values" => {
                arity(method, args, 0)?;
                Ok(array_value(s.borrow().values().to_vec()))
            },
            _ => unknown(method, recv)
        },
        Value::Heap(h) => match method {
            "size" => {
                arity(method, args, 0)?;
                Ok(Value::Int(h.borrow().size()))
            },
            "push" => {
                arity(method, args, 1)?;
                h.borrow_mut().push(args[0].clone())?;
                Ok(Value::Void)
            },
            "pop" => {
                arity(method, args, 0)?;
                h.borrow_mut().pop()
            },
            "peek" => {
                arity(method, args, 0)?;
                h.borrow().peek()
            },
            _ => unknown(method, recv)
        },
        Value::HeapMap(h) => match method {
            "size" => {
                arity(method, args, 0)?;
                Ok(Value::Int(h.borrow().size()))
            },
            "push" => {
                arity(method, args, 2)?;
                h.borrow_mut().push(args[0].clone(), args[1].clone())?;
                Ok(Value::Void)
            },
            "pop" => {
                arity(method, args, 0)?;
                h.borrow_mut().pop()
            },
            "peek" => {
                arity(method, args, 0)?;
                h.borrow().peek()
            },
            _ => unknown(method, recv)
        },
        Value::Tree(t) => match method {
            "insert" => {
                arity(method, args, 1)?;
                t.borrow_mut().insert(args[0].clone())?;
                Ok(Value::Void)
            },
            "search" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(t.borrow().search(&args[0])?))
            },
            "getHeight" => {
                arity(method, args, 0)?;
                Ok(Value::Int(t.borrow().get_height()))
            },
            "preOrderTraversal" => {
                arity(method, args, 0)?;
                Ok(array_value(t.borrow().pre_order()))
            },
            "inOrderTraversal" => {
                arity(method, args, 0)?;
                Ok(array_value(t.borrow().in_order()))
            },
            "postOrderTraversal" => {
                arity(method, args, 0)?;
                Ok(array_value(t.borrow().post_order()))
            },
            _ => unknown(method, recv)
        },
        Value::Graph(g) => match method {
            "addVertex" => {
                arity(method, args, 1)?;
                g.borrow_mut().add_vertex(args[0].clone());
                Ok(Value::Void)
            },
            "addEdge" => {
                let weight = match args.len() {
                    2 => Value::Int(1),
                    3 => args[2].clone(),
                    _ => return arity(method, args, 3).map(|_| Value::Void)
                };
                g.borrow_mut().add_edge(
                    args[0].clone(),
                    args[1].clone(),
                    weight
                );
                Ok(Value::Void)
            },
            "hasVertex" => {
                arity(method, args, 1)?;
                Ok(Value::Bool(g.borrow().has_vertex(&args[0])))
            },
            "hasEdge" => {
                arity(method, args, 2)?;
                Ok(Value::Bool(g.borrow().has_edge(&args[0], &args[1])))
            },
            "getVertices" => {
                arity(method, args, 0)?;
                Ok(array_value(g.borrow().vertices().clone()))
            },
            "getEdges" => {
                arity(method, args, 0)?;
                let edges: Vec<Value> = g
                    .borrow()
                    .all_edges()
                    .into_iter()
                    .map(|(from, to, weight)| {
                        Value::Record(Rc::new(vec![
                            (String::from("from"), from),
                            (String::from("to"), to),
                            (String::from("weight"), weight)
                        ]))
                    })
                    .collect();
                Ok(array_value(edges))
            },
            "getNeighbors" => {
                arity(method, args, 1)?;
                let neighbors: Vec<Value> = g
                    .borrow()
                    .neighbors(&args[0])
                    .into_iter()
                    .map(|(to, weight)| {
                        Value::Record(Rc::new(vec![
                            (String::from("to"), to),
                            (String::from("weight"), weight)
                        ]))
                    })
                    .collect();
                Ok(array_value(neighbors))
            },
            "isDirected" => {
                arity(method, args, 0)?;
                Ok(Value::Bool(g.borrow().directed))
            },
            "size" => {
                arity(method, args, 0)?;
                Ok(Value::Int(g.borrow().size()))
            },
            _ => unknown(method, recv)
        },
        Value::Range(r) => match method {
            "toArray" => {
                arity(method, args, 0)?;
                Ok(array_value(r.to_array()?))
            },
            "isInfinite" => {
                arity(method, args, 0)?;
                Ok(Value::Bool(r.is_infinite()))
            },
            _ => unknown(method, recv)
        },
        other => Err(expected(container_tags(method), other))
    }
}

fn unknown(method: &str, recv: &Value) -> Result<Value> {
    Err(expected(container_tags(method), recv))
}

// Which receivers could have satisfied a method name; used to build a
// useful expected-set when dispatch fails.
fn container_tags(method: &str) -> BitFlags<Tag> {
    match method {
        "length" => BitFlags::from_flag(Tag::Array),
        "push" | "pop" => Tag::Array | Tag::Heap | Tag::HeapMap,
        "peek" => Tag::Heap | Tag::HeapMap,
        "get" | "set" | "keys" | "entries" | "deleteWithKey" => {
            BitFlags::from_flag(Tag::Map)
        },
        "add" => BitFlags::from_flag(Tag::Set),
        "has" | "delete" | "values" => Tag::Map | Tag::Set,
        "size" => Tag::Map | Tag::Set | Tag::Heap | Tag::HeapMap | Tag::Graph,
        "insert" | "search" | "getHeight" | "preOrderTraversal"
        | "inOrderTraversal" | "postOrderTraversal" => {
            BitFlags::from_flag(Tag::Tree)
        },
        "addVertex" | "addEdge" | "hasVertex" | "hasEdge" | "getVertices"
        | "getEdges" | "getNeighbors" | "isDirected" => {
            BitFlags::from_flag(Tag::Graph)
        },
        "toArray" | "isInfinite" => BitFlags::from_flag(Tag::Range),
        _ => {
            Tag::Array
                | Tag::Map
                | Tag::Set
                | Tag::Heap
                | Tag::HeapMap
                | Tag::Tree
                | Tag::Graph
                | Tag::Range
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn invoke_new(ctor: &str) -> Value {
        let mut out = Vec::new();
        native_call(ctor, &[], &mut out).unwrap()
    }

    #[test]
    fn test_print_formats_a_line() {
        let mut out = Vec::new();
        native_call(
            "print",
            &[
                Value::Str(Rc::new(String::from("dist"))),
                Value::Int(3),
                Value::Float(2.0)
            ],
            &mut out
        )
        .unwrap();
        assert_eq!(out, vec!["dist 3 2.0"]);
    }

    #[test]
    fn test_constructor_dispatch() {
        assert!(matches!(invoke_new("Map"), Value::Map(_)));
        assert!(matches!(invoke_new("Set"), Value::Set(_)));
        assert!(matches!(invoke_new("MinHeap"), Value::Heap(_)));
        assert!(matches!(invoke_new("AVLTree"), Value::Tree(_)));

        let mut out = Vec::new();
        let directed =
            native_call("Graph", &[Value::Bool(true)], &mut out).unwrap();
        assert_eq!(
            invoke(&directed, "isDirected", &[]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_method_dispatch_round_trip() {
        let array = array_value(vec![Value::Int(1)]);
        invoke(&array, "push", &[Value::Int(2)]).unwrap();
        assert_eq!(
            invoke(&array, "length", &[]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(invoke(&array, "pop", &[]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_bad_dispatch_reports_expected_set() {
        let array = array_value(vec![]);
        let e = invoke(&array, "set", &[Value::Int(0), Value::Int(1)])
            .unwrap_err();
        match e.kind {
            ErrorKind::RuntimeType {expect, got} => {
                assert!(expect.contains(Tag::Map));
                assert_eq!(got, Tag::Array);
            },
            other => panic!("wrong error: {:?}", other)
        }
    }

    #[test]
    fn test_arity_errors() {
        let array = array_value(vec![]);
        assert!(invoke(&array, "push", &[]).is_err());
        let mut out = Vec::new();
        assert!(native_call("Map", &[Value::Int(1)], &mut out).is_err());
    }

    #[test]
    fn test_addedge_defaults_weight() {
        let g = invoke_new("Graph");
        invoke(&g, "addEdge", &[Value::Int(0), Value::Int(1)]).unwrap();
        let neighbors = invoke(&g, "getNeighbors", &[Value::Int(0)]).unwrap();
        match neighbors {
            Value::Array(items) => {
                let items = items.borrow();
                match &items[0] {
                    Value::Record(fields) => {
                        assert_eq!(fields[1].1, Value::Int(1));
                    },
                    other => panic!("expected a record: {:?}", other)
                }
            },
            other => panic!("expected an array: {:?}", other)
        }
    }
}
