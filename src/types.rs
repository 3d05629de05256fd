use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Node, Pos, TypeAnnotation};
use crate::error::{Error, Result};


// A mutable type slot shared between the AST, the inference scope and
// the refinement pass. Refinement is expressed as a propagator over
// these slots.
pub type Slot = Rc<RefCell<Node<Type>>>;

pub fn slot(t: Type) -> Slot {
    Rc::new(RefCell::new(Node::new(t)))
}

pub fn weak_slot() -> Slot {
    slot(Type::Weak)
}


// ADT for static types
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
    Void,
    Range,
    Pred,
    // Inferable placeholder: the only type refinement may overwrite.
    Weak,
    // Unifying wildcard for empty literals.
    Poly,
    // Statically unresolvable. Inert: never refined, never refines.
    Dynamic,
    Array(Node<Type>),
    Map(Node<Type>, Node<Type>),
    Set(Node<Type>),
    Heap(Node<Type>),
    HeapMap(Node<Type>, Node<Type>),
    BinaryTree(Node<Type>),
    AvlTree(Node<Type>),
    Graph(Node<Type>),
    Tuple(Vec<Node<Type>>),
    Record(Vec<(String, Node<Type>)>),
    Union(Vec<Node<Type>>),
    Intersection(Vec<Node<Type>>),
    Function {
        params: Vec<Node<Type>>,
        ret: Node<Type>,
        variadic: bool
    }
}

impl Type {
    pub fn is_weak(&self) -> bool {
        match self {
            Type::Weak => true,
            _ => false
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            _ => false
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Type::Int | Type::Float => true,
            // inf is typed int & float.
            Type::Intersection(arms) => arms.iter().all(|a| a.is_numeric()),
            _ => false
        }
    }

    // True when the type contains an intersection arm anywhere.
    // Intersection-typed values (inf) satisfy several concrete types
    // at once, so they make poor refinement sources: a slot refined to
    // int & float would then reject plain ints.
    fn has_intersection(&self) -> bool {
        match self {
            Type::Intersection(_) => true,
            Type::Array(e)
            | Type::Set(e)
            | Type::Heap(e)
            | Type::BinaryTree(e)
            | Type::AvlTree(e)
            | Type::Graph(e) => e.has_intersection(),
            Type::Map(k, v) | Type::HeapMap(k, v) => {
                k.has_intersection() || v.has_intersection()
            },
            Type::Tuple(elems) => elems.iter().any(|e| e.has_intersection()),
            Type::Record(fields) => {
                fields.iter().any(|(_, t)| t.has_intersection())
            },
            Type::Union(arms) => arms.iter().any(|a| a.has_intersection()),
            Type::Function {params, ret, ..} => {
                params.iter().any(|p| p.has_intersection())
                    || ret.has_intersection()
            },
            _ => false
        }
    }

    // A type that may overwrite a weak slot.
    pub fn refinable(&self) -> bool {
        self.fully_concrete() && !self.has_intersection()
    }

    // True when the type contains no placeholder anywhere: only such
    // types are allowed to flow into weak slots.
    pub fn fully_concrete(&self) -> bool {
        match self {
            Type::Weak | Type::Poly | Type::Dynamic => false,
            Type::Array(e)
            | Type::Set(e)
            | Type::Heap(e)
            | Type::BinaryTree(e)
            | Type::AvlTree(e)
            | Type::Graph(e) => e.fully_concrete(),
            Type::Map(k, v) | Type::HeapMap(k, v) => {
                k.fully_concrete() && v.fully_concrete()
            },
            Type::Tuple(elems) => elems.iter().all(|e| e.fully_concrete()),
            Type::Record(fields) => {
                fields.iter().all(|(_, t)| t.fully_concrete())
            },
            Type::Union(arms) | Type::Intersection(arms) => {
                arms.iter().all(|a| a.fully_concrete())
            },
            Type::Function {params, ret, ..} => {
                params.iter().all(|p| p.fully_concrete())
                    && ret.fully_concrete()
            },
            _ => true
        }
    }

    // Resolve a surface annotation to a type. Unknown names are
    // reported against the declaration's position.
    pub fn from_annotation(
        annot: &TypeAnnotation,
        pos: Pos
    ) -> Result<Node<Type>> {
        let t = match annot {
            TypeAnnotation::Simple(name) => match name.as_str() {
                "int" => Type::Int,
                "float" => Type::Float,
                "string" => Type::Str,
                "bool" | "boolean" => Type::Bool,
                "void" => Type::Void,
                "weak" => Type::Weak,
                "poly" => Type::Poly,
                "Range" => Type::Range,
                other => return Err(Error::type_error(
                    format!("unknown type name `{}`", other),
                    pos
                ))
            },
            TypeAnnotation::Generic(name, args) => {
                let arg = |i: usize| -> Result<Node<Type>> {
                    match args.get(i) {
                        Some(a) => Type::from_annotation(a, pos),
                        None => Ok(Node::new(Type::Weak))
                    }
                };
                match name.as_str() {
                    "Array" => Type::Array(arg(0)?),
                    "Map" => Type::Map(arg(0)?, arg(1)?),
                    "Set" => Type::Set(arg(0)?),
                    "MinHeap" | "MaxHeap" => Type::Heap(arg(0)?),
                    "MinHeapMap" | "MaxHeapMap" => {
                        Type::HeapMap(arg(0)?, arg(1)?)
                    },
                    "Graph" => Type::Graph(arg(0)?),
                    "BinaryTree" => Type::BinaryTree(arg(0)?),
                    "AVLTree" => Type::AvlTree(arg(0)?),
                    other => return Err(Error::type_error(
                        format!("unknown generic type `{}`", other),
                        pos
                    ))
                }
            },
            TypeAnnotation::Union(arms) => {
                let arms: Result<Vec<Node<Type>>> = arms
                    .iter()
                    .map(|a| Type::from_annotation(a, pos))
                    .collect();
                Type::Union(arms?)
            },
            TypeAnnotation::Intersection(arms) => {
                let arms: Result<Vec<Node<Type>>> = arms
                    .iter()
                    .map(|a| Type::from_annotation(a, pos))
                    .collect();
                Type::Intersection(arms?)
            },
            TypeAnnotation::Function(params, ret) => {
                let params: Result<Vec<Node<Type>>> = params
                    .iter()
                    .map(|a| Type::from_annotation(a, pos))
                    .collect();
                Type::Function {
                    params: params?,
                    ret: Type::from_annotation(ret, pos)?,
                    variadic: false
                }
            },
            TypeAnnotation::Tuple(elems) => {
                let elems: Result<Vec<Node<Type>>> = elems
                    .iter()
                    .map(|a| Type::from_annotation(a, pos))
                    .collect();
                Type::Tuple(elems?)
            },
            TypeAnnotation::Record(fields) => {
                let fields: Result<Vec<(String, Node<Type>)>> = fields
                    .iter()
                    .map(|(n, a)| {
                        Ok((n.clone(), Type::from_annotation(a, pos)?))
                    })
                    .collect();
                Type::Record(fields?)
            }
        };
        Ok(Node::new(t))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "string"),
            Type::Bool => write!(f, "boolean"),
            Type::Void => write!(f, "void"),
            Type::Range => write!(f, "Range"),
            Type::Pred => write!(f, "predicate"),
            Type::Weak => write!(f, "weak"),
            Type::Poly => write!(f, "poly"),
            Type::Dynamic => write!(f, "dynamic"),
            Type::Array(e) => write!(f, "Array<{}>", e),
            Type::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Type::Set(e) => write!(f, "Set<{}>", e),
            Type::Heap(e) => write!(f, "Heap<{}>", e),
            Type::HeapMap(k, v) => write!(f, "HeapMap<{}, {}>", k, v),
            Type::BinaryTree(e) => write!(f, "BinaryTree<{}>", e),
            Type::AvlTree(e) => write!(f, "AVLTree<{}>", e),
            Type::Graph(n) => write!(f, "Graph<{}>", n),
            Type::Tuple(elems) => {
                let parts: Vec<String> =
                    elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            },
            Type::Record(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(n, t)| format!("{}: {}", n, t))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            },
            Type::Union(arms) => {
                let parts: Vec<String> =
                    arms.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            },
            Type::Intersection(arms) => {
                let parts: Vec<String> =
                    arms.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(" & "))
            },
            Type::Function {params, ret, variadic} => {
                let mut parts: Vec<String> =
                    params.iter().map(|p| p.to_string()).collect();
                if *variadic {
                    parts.push(String::from("..."));
                }
                write!(f, "({}) -> {}", parts.join(", "), ret)
            }
        }
    }
}


// Subtype-like equality with per-pass memoization. The cache is keyed
// by the canonical rendering of the pair and must be cleared between
// refinement passes: weak slots mutate underneath it.
pub struct TypeCache {
    hits: RefCell<HashMap<(String, String), bool>>
}

impl TypeCache {
    pub fn new() -> TypeCache {
        TypeCache {hits: RefCell::new(HashMap::new())}
    }

    pub fn clear(&self) {
        self.hits.borrow_mut().clear();
    }

    // Is `a` assignable to `b`?
    pub fn equal(&self, a: &Type, b: &Type) -> bool {
        let key = (a.to_string(), b.to_string());
        if let Some(hit) = self.hits.borrow().get(&key) {
            return *hit;
        }
        let result = self.compute(a, b);
        self.hits.borrow_mut().insert(key, result);
        result
    }

    fn compute(&self, a: &Type, b: &Type) -> bool {
        use Type::*;
        match (a, b) {
            // Wildcards. Only weak is ever *mutated*; poly unifies and
            // dynamic defers everything to runtime.
            (Weak, _) | (_, Weak) => true,
            (Poly, _) | (_, Poly) => true,
            (Dynamic, _) | (_, Dynamic) => true,

            // A union on the left needs every arm accepted; on the
            // right, one arm suffices. Intersections are dual.
            (Union(arms), _) => arms.iter().all(|x| self.equal(x, b)),
            (_, Union(arms)) => arms.iter().any(|y| self.equal(a, y)),
            (Intersection(arms), _) => {
                arms.iter().any(|x| self.equal(x, b))
            },
            (_, Intersection(arms)) => {
                arms.iter().all(|y| self.equal(a, y))
            },

            (Int, Int)
            | (Float, Float)
            | (Str, Str)
            | (Bool, Bool)
            | (Void, Void)
            | (Range, Range)
            | (Pred, Pred) => true,

            (Array(x), Array(y))
            | (Set(x), Set(y))
            | (Heap(x), Heap(y))
            | (BinaryTree(x), BinaryTree(y))
            | (AvlTree(x), AvlTree(y))
            | (Graph(x), Graph(y)) => self.equal(x, y),

            (Map(ak, av), Map(bk, bv))
            | (HeapMap(ak, av), HeapMap(bk, bv)) => {
                self.equal(ak, bk) && self.equal(av, bv)
            },

            (Tuple(xs), Tuple(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| self.equal(x, y))
            },

            // Order-independent: every field the right side names must
            // be present with an assignable type.
            (Record(xs), Record(ys)) => ys.iter().all(|(name, yt)| {
                xs.iter()
                    .any(|(n, xt)| n == name && self.equal(xt, yt))
            }),

            (
                Function {params: ap, ret: ar, ..},
                Function {params: bp, ret: br, ..}
            ) => {
                ap.len() == bp.len()
                    && ap.iter().zip(bp).all(|(x, y)| self.equal(x, y))
                    && self.equal(ar, br)
            },

            _ => false
        }
    }
}


// One refinement move: fill weak slots inside `current` with the
// matching concrete parts of `actual`. Returns the rebuilt type only
// when something changed.
pub fn merge_nested(current: &Type, actual: &Type) -> Option<Node<Type>> {
    use Type::*;

    fn merge_param(cur: &Node<Type>, act: &Node<Type>) -> Option<Node<Type>> {
        merge_nested(cur, act)
    }

    match (current, actual) {
        (Weak, _) if actual.refinable() => {
            Some(Node::new(actual.clone()))
        },
        (Array(x), Array(y)) => {
            merge_param(x, y).map(|e| Node::new(Array(e)))
        },
        (Set(x), Set(y)) => merge_param(x, y).map(|e| Node::new(Set(e))),
        (Heap(x), Heap(y)) => {
            merge_param(x, y).map(|e| Node::new(Heap(e)))
        },
        (BinaryTree(x), BinaryTree(y)) => {
            merge_param(x, y).map(|e| Node::new(BinaryTree(e)))
        },
        (AvlTree(x), AvlTree(y)) => {
            merge_param(x, y).map(|e| Node::new(AvlTree(e)))
        },
        (Graph(x), Graph(y)) => {
            merge_param(x, y).map(|e| Node::new(Graph(e)))
        },
        (Map(k1, v1), Map(k2, v2)) => {
            let k = merge_param(k1, k2);
            let v = merge_param(v1, v2);
            if k.is_none() && v.is_none() {
                None
            } else {
                Some(Node::new(Map(
                    k.unwrap_or_else(|| k1.clone()),
                    v.unwrap_or_else(|| v1.clone())
                )))
            }
        },
        (HeapMap(k1, v1), HeapMap(k2, v2)) => {
            let k = merge_param(k1, k2);
            let v = merge_param(v1, v2);
            if k.is_none() && v.is_none() {
                None
            } else {
                Some(Node::new(HeapMap(
                    k.unwrap_or_else(|| k1.clone()),
                    v.unwrap_or_else(|| v1.clone())
                )))
            }
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
    fn test_wildcards() {
        let cache = TypeCache::new();
        assert!(cache.equal(&Type::Weak, &Type::Int));
        assert!(cache.equal(&Type::Int, &Type::Weak));
        assert!(cache.equal(&Type::Poly, &Type::Graph(node(Type::Int))));
        assert!(cache.equal(&Type::Dynamic, &Type::Str));
        assert!(!cache.equal(&Type::Int, &Type::Str));
    }

    #[test]
    fn test_union_membership() {
        let cache = TypeCache::new();
        let num = Type::Union(vec![node(Type::Int), node(Type::Float)]);
        // One arm suffices on the right.
        assert!(cache.equal(&Type::Int, &num));
        // Every arm must be accepted on the left.
        assert!(!cache.equal(&num, &Type::Int));
        assert!(cache.equal(&num, &num));
    }

    #[test]
    fn test_intersection_dual() {
        let cache = TypeCache::new();
        let inf = Type::Intersection(vec![node(Type::Int), node(Type::Float)]);
        // inf can stand in for either numeric type...
        assert!(cache.equal(&inf, &Type::Int));
        assert!(cache.equal(&inf, &Type::Float));
        // ...but a plain int is not an inf.
        assert!(!cache.equal(&Type::Int, &inf));
    }

    #[test]
    fn test_container_recursion() {
        let cache = TypeCache::new();
        let ints = Type::Array(node(Type::Int));
        let weaks = Type::Array(node(Type::Weak));
        let strs = Type::Array(node(Type::Str));
        assert!(cache.equal(&ints, &weaks));
        assert!(cache.equal(&weaks, &ints));
        assert!(!cache.equal(&ints, &strs));
    }

    #[test]
    fn test_record_field_order() {
        let cache = TypeCache::new();
        let a = Type::Record(vec![
            (String::from("to"), node(Type::Int)),
            (String::from("weight"), node(Type::Int))
        ]);
        let b = Type::Record(vec![
            (String::from("weight"), node(Type::Int)),
            (String::from("to"), node(Type::Int))
        ]);
        assert!(cache.equal(&a, &b));
        assert!(cache.equal(&b, &a));
    }

    #[test]
    fn test_merge_nested() {
        let declared = Type::Array(node(Type::Weak));
        let actual = Type::Array(node(Type::Int));
        let merged = merge_nested(&declared, &actual).unwrap();
        assert_eq!(*merged, Type::Array(node(Type::Int)));

        // Already concrete: nothing to do.
        assert!(merge_nested(&actual, &actual).is_none());
        // Dynamic is a fixed point.
        assert!(merge_nested(&Type::Dynamic, &Type::Int).is_none());
        // A still-weak source cannot refine anything.
        assert!(merge_nested(&declared, &declared).is_none());
        // Neither can an intersection (inf would poison the slot).
        let inf = Type::Intersection(vec![
            node(Type::Int),
            node(Type::Float)
        ]);
        assert!(merge_nested(&Type::Weak, &inf).is_none());
        assert!(merge_nested(
            &Type::Map(node(Type::Int), node(Type::Weak)),
            &Type::Map(node(Type::Int), node(inf))
        )
        .is_none());
    }

    #[test]
    fn test_rendering() {
        let t = Type::Map(
            node(Type::Str),
            node(Type::Array(node(Type::Int)))
        );
        assert_eq!(t.to_string(), "Map<string, Array<int>>");
        let f = Type::Function {
            params: vec![node(Type::Int)],
            ret: node(Type::Bool),
            variadic: false
        };
        assert_eq!(f.to_string(), "(int) -> boolean");
    }
}
