// Member synthesis: the closed table mapping each container type and
// property name to a method signature, parameterized by the
// container's type parameters. Unknown members yield None and the
// caller reports a located error.

use crate::ast::Node;
use crate::types::Type;


#[derive(Clone, Debug, PartialEq)]
pub struct MethodSig {
    pub params: Vec<Node<Type>>,
    pub ret: Node<Type>,
    // Trailing parameters past this count may be omitted (addEdge's
    // weight defaults to 1).
    pub required: usize
}

impl MethodSig {
    fn new(params: Vec<Node<Type>>, ret: Type) -> MethodSig {
        let required = params.len();
        MethodSig {params, ret: Node::new(ret), required}
    }

    fn with_optional(mut self, optional: usize) -> MethodSig {
        self.required -= optional;
        self
    }

    pub fn as_type(&self) -> Type {
        Type::Function {
            params: self.params.clone(),
            ret: self.ret.clone(),
            variadic: false
        }
    }
}


fn edge_record(node: &Node<Type>) -> Type {
    Type::Record(vec![
        (String::from("from"), node.clone()),
        (String::from("to"), node.clone()),
        (String::from("weight"), Node::new(Type::Int))
    ])
}

fn neighbor_record(node: &Node<Type>) -> Type {
    Type::Record(vec![
        (String::from("to"), node.clone()),
        (String::from("weight"), Node::new(Type::Int))
    ])
}


pub fn member_type(recv: &Type, prop: &str) -> Option<MethodSig> {
    let sig = |params: Vec<Node<Type>>, ret: Type| MethodSig::new(params, ret);
    let array_of = |e: &Node<Type>| Type::Array(e.clone());

    match recv {
        Type::Array(e) => match prop {
            "length" => Some(sig(vec![], Type::Int)),
            "push" => Some(sig(vec![e.clone()], Type::Void)),
            "pop" => Some(sig(vec![], (**e).clone())),
            _ => None
        },
        Type::Map(k, v) => match prop {
            "size" => Some(sig(vec![], Type::Int)),
            "get" => Some(sig(vec![k.clone()], (**v).clone())),
            "set" => Some(sig(vec![k.clone(), v.clone()], Type::Void)),
            "has" => Some(sig(vec![k.clone()], Type::Bool)),
            // deleteWithKey survives as an alias for delete.
            "delete" | "deleteWithKey" => {
                Some(sig(vec![k.clone()], Type::Bool))
            },
            "keys" => Some(sig(vec![], array_of(k))),
            "values" => Some(sig(vec![], array_of(v))),
            "entries" => Some(sig(
                vec![],
                Type::Array(Node::new(Type::Tuple(vec![
                    k.clone(),
                    v.clone()
                ])))
            )),
            _ => None
        },
        Type::Set(e) => match prop {
            "size" => Some(sig(vec![], Type::Int)),
            "add" => Some(sig(vec![e.clone()], Type::Void)),
            "has" => Some(sig(vec![e.clone()], Type::Bool)),
            "delete" => Some(sig(vec![e.clone()], Type::Bool)),
            "values" => Some(sig(vec![], array_of(e))),
            _ => None
        },
        Type::Heap(e) => match prop {
            "size" => Some(sig(vec![], Type::Int)),
            "push" => Some(sig(vec![e.clone()], Type::Void)),
            "pop" => Some(sig(vec![], (**e).clone())),
            "peek" => Some(sig(vec![], (**e).clone())),
            _ => None
        },
        Type::HeapMap(k, v) => match prop {
            "size" => Some(sig(vec![], Type::Int)),
            "push" => Some(sig(vec![k.clone(), v.clone()], Type::Void)),
            "pop" => Some(sig(vec![], (**k).clone())),
            "peek" => Some(sig(vec![], (**k).clone())),
            _ => None
        },
        Type::BinaryTree(e) | Type::AvlTree(e) => match prop {
            "insert" => Some(sig(vec![e.clone()], Type::Void)),
            "search" => Some(sig(vec![e.clone()], Type::Bool)),
            "getHeight" => Some(sig(vec![], Type::Int)),
            "preOrderTraversal"
            | "inOrderTraversal"
            | "postOrderTraversal" => Some(sig(vec![], array_of(e))),
            _ => None
        },
        Type::Graph(n) => match prop {
            "addVertex" => Some(sig(vec![n.clone()], Type::Void)),
            "addEdge" => Some(
                sig(
                    vec![n.clone(), n.clone(), Node::new(Type::Int)],
                    Type::Void
                )
                .with_optional(1)
            ),
            "hasVertex" => Some(sig(vec![n.clone()], Type::Bool)),
            "hasEdge" => Some(sig(vec![n.clone(), n.clone()], Type::Bool)),
            "getVertices" => Some(sig(vec![], array_of(n))),
            "getEdges" => Some(sig(
                vec![],
                Type::Array(Node::new(edge_record(n)))
            )),
            "getNeighbors" => Some(sig(
                vec![n.clone()],
                Type::Array(Node::new(neighbor_record(n)))
            )),
            "isDirected" => Some(sig(vec![], Type::Bool)),
            "size" => Some(sig(vec![], Type::Int)),
            _ => None
        },
        Type::Range => match prop {
            "toArray" => Some(sig(vec![], Type::Array(Node::new(Type::Int)))),
            "isInfinite" => Some(sig(vec![], Type::Bool)),
            _ => None
        },
        _ => None
    }
}


// Refinement support: a method name observed on a weak receiver
// implies a container kind. Only unambiguous names are listed.
pub fn implied_container(method: &str, argc: usize) -> Option<Type> {
    let weak = || Node::new(Type::Weak);
    match (method, argc) {
        ("length", 0) => Some(Type::Array(weak())),
        ("push", 1) => Some(Type::Array(weak())),
        ("push", 2) => Some(Type::HeapMap(weak(), weak())),
        ("set", 2) | ("get", 1) | ("keys", 0) | ("values", 0)
        | ("entries", 0) | ("deleteWithKey", 1) => {
            Some(Type::Map(weak(), weak()))
        },
        ("add", 1) => Some(Type::Set(weak())),
        ("insert", 1) | ("getHeight", 0) | ("search", 1)
        | ("inOrderTraversal", 0) | ("preOrderTraversal", 0)
        | ("postOrderTraversal", 0) => Some(Type::BinaryTree(weak())),
        ("addVertex", 1) | ("addEdge", 2) | ("addEdge", 3)
        | ("getNeighbors", 1) | ("getEdges", 0) | ("getVertices", 0)
        | ("hasVertex", 1) | ("hasEdge", 2) | ("isDirected", 0) => {
            Some(Type::Graph(weak()))
        },
        _ => None
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn node(t: Type) -> Node<Type> {
        Node::new(t)
    }

    #[test]
    fn test_array_members() {
        let arr = Type::Array(node(Type::Int));
        let length = member_type(&arr, "length").unwrap();
        assert_eq!(length.as_type().to_string(), "() -> int");
        let pop = member_type(&arr, "pop").unwrap();
        assert_eq!(*pop.ret, Type::Int);
        assert!(member_type(&arr, "set").is_none());
    }

    #[test]
    fn test_map_delete_alias() {
        let map = Type::Map(node(Type::Int), node(Type::Str));
        assert_eq!(
            member_type(&map, "delete"),
            member_type(&map, "deleteWithKey")
        );
        let entries = member_type(&map, "entries").unwrap();
        assert_eq!(entries.as_type().to_string(), "() -> Array<(int, string)>");
    }

    #[test]
    fn test_graph_records() {
        let graph = Type::Graph(node(Type::Int));
        let sig = member_type(&graph, "getNeighbors").unwrap();
        assert_eq!(
            sig.ret.to_string(),
            "Array<{to: int, weight: int}>"
        );
        let edge = member_type(&graph, "addEdge").unwrap();
        assert_eq!(edge.params.len(), 3);
        assert_eq!(edge.required, 2);
    }

    #[test]
    fn test_implied_containers() {
        assert_eq!(
            implied_container("length", 0),
            Some(Type::Array(node(Type::Weak)))
        );
        assert_eq!(
            implied_container("set", 2),
            Some(Type::Map(node(Type::Weak), node(Type::Weak)))
        );
        assert_eq!(
            implied_container("add", 1),
            Some(Type::Set(node(Type::Weak)))
        );
        // pop is shared by arrays and heaps: no implication.
        assert_eq!(implied_container("pop", 0), None);
    }
}
