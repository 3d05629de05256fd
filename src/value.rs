// Runtime values.
//
// Values are tagged by their runtime type; containers are shared,
// interior-mutable handles, so assignment and argument passing alias
// rather than copy. Static types live on bindings, not on values.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

use enumflags2::BitFlags;

use crate::ast::{BinOp, FunctionDecl, Node};
use crate::containers::{
    GraphData,
    HeapData,
    HeapMapData,
    LazyRange,
    MapData,
    SetData,
    TreeData
};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::types::Type;
use crate::verify::Predicate;


// Runtime type tags. A set of these describes what an operation would
// have accepted when it fails.
#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u32)]
pub enum Tag {
    Int       = 0b00000000000000001,
    Float     = 0b00000000000000010,
    Str       = 0b00000000000000100,
    Bool      = 0b00000000000001000,
    Void      = 0b00000000000010000,
    Array     = 0b00000000000100000,
    Map       = 0b00000000001000000,
    Set       = 0b00000000010000000,
    Heap      = 0b00000000100000000,
    HeapMap   = 0b00000001000000000,
    Tree      = 0b00000010000000000,
    Graph     = 0b00000100000000000,
    Range     = 0b00001000000000000,
    Tuple     = 0b00010000000000000,
    Record    = 0b00100000000000000,
    Function  = 0b01000000000000000,
    Predicate = 0b10000000000000000
}

pub type TagSet = BitFlags<Tag>;

impl Tag {
    // The name `typeof` reports.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Int => "int",
            Tag::Float => "float",
            Tag::Str => "string",
            Tag::Bool => "boolean",
            Tag::Void => "void",
            Tag::Array => "array",
            Tag::Map => "map",
            Tag::Set => "set",
            Tag::Heap => "heap",
            Tag::HeapMap => "heapmap",
            Tag::Tree => "tree",
            Tag::Graph => "graph",
            Tag::Range => "range",
            Tag::Tuple => "tuple",
            Tag::Record => "record",
            Tag::Function => "function",
            Tag::Predicate => "predicate"
        }
    }
}


// A user function together with its captured environment.
pub struct Closure {
    pub decl: Node<FunctionDecl>,
    pub env: Node<Env<Binding>>
}

impl Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<do {}>", self.decl.name)
    }
}


// A built-in function, dispatched by name in builtins::native_call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Native {
    pub name: &'static str
}


// A container method plucked off its receiver, awaiting arguments.
#[derive(Clone, Debug)]
pub struct BoundMethod {
    pub recv: Value,
    pub method: String
}


// All valid values
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    Bool(bool),
    Void,
    Array(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<MapData>>),
    Set(Rc<RefCell<SetData>>),
    Heap(Rc<RefCell<HeapData>>),
    HeapMap(Rc<RefCell<HeapMapData>>),
    Tree(Rc<RefCell<TreeData>>),
    Graph(Rc<RefCell<GraphData>>),
    Range(Rc<LazyRange>),
    Tuple(Rc<Vec<Value>>),
    Record(Rc<Vec<(String, Value)>>),
    Closure(Rc<Closure>),
    Native(Native),
    Bound(Rc<BoundMethod>),
    Pred(Rc<Predicate>)
}


// What a binding knows about its value: the static type plus any
// refinement predicates the invariant synthesizer has attached.
#[derive(Clone, Debug)]
pub struct Binding {
    pub value: Value,
    pub ty: Node<Type>,
    pub refinements: Vec<Predicate>
}

impl Binding {
    pub fn new(value: Value, ty: Node<Type>) -> Binding {
        Binding {value, ty, refinements: Vec::new()}
    }

    pub fn of(value: Value) -> Binding {
        let ty = value.static_type();
        Binding {value, ty, refinements: Vec::new()}
    }
}


// Construct an Error from a value that missed the expected tag set.
pub fn expected(expect: TagSet, got: &Value) -> Error {
    Error::runtime(expect, got.get_type())
}

fn type_mismatch(a: &Value, b: &Value) -> Error {
    Error::mismatch(a.get_type(), b.get_type())
}


// Factors out the boiler plate in operator method implementations.
//
// Each matcher takes the method name and a white-list of operand
// patterns that implement the operator; anything not listed is a
// runtime error.
macro_rules! operator {
    (un $name:ident ($expect:expr) { $( $p:pat => $e:expr ),+ } ) => {
        pub fn $name (&self) -> Result<Value> {
            use Value::*;
            match self {
                $($p => Ok($e)),+ ,
                value => Err(expected($expect, value))
            }
        }
    };

    (bin $name:ident { $( $p:pat => $e:expr ),+ } ) => {
        pub fn $name (&self, other: &Value) -> Result<Value> {
            use Value::*;
            #[allow(unreachable_patterns)]
            match (self, other) {
                $($p => Ok($e)),+ ,
                (a, b) => Err(type_mismatch(a, b))
            }
        }
    };
}


impl Value {
    // Mixed int/float operands promote to float; + also concatenates
    // strings.
    operator! { bin add {
        (Int(a),   Int(b))   => Int(a + b),
        (Float(a), Float(b)) => Float(a + b),
        (Int(a),   Float(b)) => Float(*a as f64 + b),
        (Float(a), Int(b))   => Float(a + *b as f64),
        (Str(a),   Str(b))   => Str(Rc::new(format!("{}{}", a, b)))
    } }

    operator! { bin sub {
        (Int(a),   Int(b))   => Int(a - b),
        (Float(a), Float(b)) => Float(a - b),
        (Int(a),   Float(b)) => Float(*a as f64 - b),
        (Float(a), Int(b))   => Float(a - *b as f64)
    } }

    operator! { bin mul {
        (Int(a),   Int(b))   => Int(a * b),
        (Float(a), Float(b)) => Float(a * b),
        (Int(a),   Float(b)) => Float(*a as f64 * b),
        (Float(a), Int(b))   => Float(a * *b as f64)
    } }

    // Integer division is int-only; /. is the float division below.
    pub fn div(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Int(_), Int(0)) => {
                Err(Error::index("division by zero"))
            },
            (Int(a), Int(b)) => Ok(Int(a / b)),
            (a, b) => Err(type_mismatch(a, b))
        }
    }

    pub fn fdiv(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let a = match self {
            Int(a) => *a as f64,
            Float(a) => *a,
            v => return Err(expected(Tag::Int | Tag::Float, v))
        };
        let b = match other {
            Int(b) => *b as f64,
            Float(b) => *b,
            v => return Err(expected(Tag::Int | Tag::Float, v))
        };
        Ok(Float(a / b))
    }

    operator! { bin modulo {
        (Int(_),   Int(0))   => return Err(Error::index("division by zero")),
        (Int(a),   Int(b))   => Int(a % b),
        (Float(a), Float(b)) => Float(a % b),
        (Int(a),   Float(b)) => Float(*a as f64 % b),
        (Float(a), Int(b))   => Float(a % *b as f64)
    } }

    operator! { bin shl { (Int(a), Int(b)) => Int(a << b) } }

    operator! { bin shr { (Int(a), Int(b)) => Int(a >> b) } }

    operator! { un not (BitFlags::from_flag(Tag::Bool)) {
        Bool(a) => Bool(!a)
    } }

    operator! { un neg (Tag::Int | Tag::Float) {
        Int(a) => Int(-a),
        Float(a) => Float(-a)
    } }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(a) => Some(*a as f64),
            Value::Float(a) => Some(*a),
            _ => None
        }
    }

    fn relational(
        &self,
        other: &Value,
        test: fn(Ordering) -> bool
    ) -> Result<Value> {
        Ok(Value::Bool(test(compare(self, other)?)))
    }

    pub fn lt(&self, other: &Value) -> Result<Value> {
        self.relational(other, |o| o == Ordering::Less)
    }

    pub fn gt(&self, other: &Value) -> Result<Value> {
        self.relational(other, |o| o == Ordering::Greater)
    }

    pub fn lte(&self, other: &Value) -> Result<Value> {
        self.relational(other, |o| o != Ordering::Greater)
    }

    pub fn gte(&self, other: &Value) -> Result<Value> {
        self.relational(other, |o| o != Ordering::Less)
    }

    pub fn get_type(&self) -> Tag {
        match self {
            Value::Int(_) => Tag::Int,
            Value::Float(_) => Tag::Float,
            Value::Str(_) => Tag::Str,
            Value::Bool(_) => Tag::Bool,
            Value::Void => Tag::Void,
            Value::Array(_) => Tag::Array,
            Value::Map(_) => Tag::Map,
            Value::Set(_) => Tag::Set,
            Value::Heap(_) => Tag::Heap,
            Value::HeapMap(_) => Tag::HeapMap,
            Value::Tree(_) => Tag::Tree,
            Value::Graph(_) => Tag::Graph,
            Value::Range(_) => Tag::Range,
            Value::Tuple(_) => Tag::Tuple,
            Value::Record(_) => Tag::Record,
            Value::Closure(_) | Value::Native(_) | Value::Bound(_) => {
                Tag::Function
            },
            Value::Pred(_) => Tag::Predicate
        }
    }

    // The rough static type of a runtime value; container parameters
    // come from the first element when one exists.
    pub fn static_type(&self) -> Node<Type> {
        let elem = |vs: &[Value]| -> Node<Type> {
            match vs.first() {
                Some(v) => v.static_type(),
                None => Node::new(Type::Weak)
            }
        };
        let t = match self {
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::Str,
            Value::Bool(_) => Type::Bool,
            Value::Void => Type::Void,
            Value::Array(items) => Type::Array(elem(&items.borrow())),
            Value::Map(m) => {
                let m = m.borrow();
                match m.entries().first() {
                    Some((k, v)) => {
                        Type::Map(k.static_type(), v.static_type())
                    },
                    None => Type::Map(
                        Node::new(Type::Weak),
                        Node::new(Type::Weak)
                    )
                }
            },
            Value::Set(s) => Type::Set(elem(s.borrow().values())),
            Value::Heap(h) => Type::Heap(elem(h.borrow().items())),
            Value::HeapMap(h) => {
                let h = h.borrow();
                match h.entries().first() {
                    Some((k, v)) => {
                        Type::HeapMap(k.static_type(), v.static_type())
                    },
                    None => Type::HeapMap(
                        Node::new(Type::Weak),
                        Node::new(Type::Weak)
                    )
                }
            },
            Value::Tree(t) => {
                let data = t.borrow();
                let e = elem(&data.in_order());
                if data.balanced {
                    Type::AvlTree(e)
                } else {
                    Type::BinaryTree(e)
                }
            },
            Value::Graph(g) => Type::Graph(elem(g.borrow().vertices())),
            Value::Range(_) => Type::Range,
            Value::Tuple(elems) => {
                Type::Tuple(elems.iter().map(|e| e.static_type()).collect())
            },
            Value::Record(fields) => Type::Record(
                fields
                    .iter()
                    .map(|(n, v)| (n.clone(), v.static_type()))
                    .collect()
            ),
            Value::Closure(c) => Type::Function {
                params: c
                    .decl
                    .params
                    .iter()
                    .map(|p| p.ty.borrow().clone())
                    .collect(),
                ret: c.decl.ret.borrow().clone(),
                variadic: false
            },
            Value::Native(_) | Value::Bound(_) => Type::Function {
                params: Vec::new(),
                ret: Node::new(Type::Weak),
                variadic: true
            },
            Value::Pred(_) => Type::Pred
        };
        Node::new(t)
    }

    pub fn truthy(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            v => Err(expected(BitFlags::from_flag(Tag::Bool), v))
        }
    }
}


// Dispatch a binary operator. && and || never reach this point: the
// machine decomposes them into short-circuit continuations.
pub fn binop(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    match op {
        BinOp::Add => a.add(b),
        BinOp::Sub => a.sub(b),
        BinOp::Mul => a.mul(b),
        BinOp::Div => a.div(b),
        BinOp::FloatDiv => a.fdiv(b),
        BinOp::Mod => a.modulo(b),
        BinOp::Shl => a.shl(b),
        BinOp::Shr => a.shr(b),
        BinOp::Lt => a.lt(b),
        BinOp::Lte => a.lte(b),
        BinOp::Gt => a.gt(b),
        BinOp::Gte => a.gte(b),
        BinOp::Eq => Ok(Value::Bool(a == b)),
        BinOp::Neq => Ok(Value::Bool(a != b)),
        BinOp::And | BinOp::Or => Err(Error::internal(
            "short-circuit operator reached binop dispatch"
        ))
    }
}


// Total order over comparable values; mixed numerics promote.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(type_mismatch(a, b))
            };
            x.partial_cmp(&y)
                .ok_or_else(|| Error::index("unordered float comparison"))
        }
    }
}


// Structural equality. == is unrestricted: mismatched tags compare
// unequal rather than failing, and mixed numerics compare by value.
impl PartialEq for Value {
    fn eq(&self, rhs: &Self) -> bool {
        use Value::*;
        match (self, rhs) {
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => *a as f64 == *b,
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Void, Void) => true,
            (Array(a), Array(b)) => *a.borrow() == *b.borrow(),
            (Map(a), Map(b)) => a.borrow().same_entries(&b.borrow()),
            (Set(a), Set(b)) => a.borrow().same_members(&b.borrow()),
            (Tuple(a), Tuple(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (Range(a), Range(b)) => a == b,
            (Heap(a), Heap(b)) => Rc::ptr_eq(a, b),
            (HeapMap(a), HeapMap(b)) => Rc::ptr_eq(a, b),
            (Tree(a), Tree(b)) => Rc::ptr_eq(a, b),
            (Graph(a), Graph(b)) => Rc::ptr_eq(a, b),
            (Closure(a), Closure(b)) => Rc::ptr_eq(a, b),
            (Native(a), Native(b)) => a.name == b.name,
            (Pred(a), Pred(b)) => a == b,
            (_, _) => false
        }
    }
}


// The stable printer. `display` is what print() emits (strings bare);
// `repr` is used inside containers and environment snapshots (strings
// quoted).
pub fn display(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        _ => repr(v)
    }
}

pub fn repr(v: &Value) -> String {
    fn join(items: &[Value]) -> String {
        let parts: Vec<String> = items.iter().map(repr).collect();
        parts.join(", ")
    }

    match v {
        Value::Int(n) => format!("{}", n),
        Value::Float(x) => {
            if x.is_infinite() {
                if *x < 0.0 {
                    String::from("-inf")
                } else {
                    String::from("inf")
                }
            } else if *x == x.trunc() {
                format!("{:.1}", x)
            } else {
                format!("{}", x)
            }
        },
        Value::Str(s) => format!("\"{}\"", s),
        Value::Bool(b) => format!("{}", b),
        Value::Void => String::from("void"),
        Value::Array(items) => format!("[{}]", join(&items.borrow())),
        Value::Map(m) => {
            let parts: Vec<String> = m
                .borrow()
                .entries()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        },
        Value::Set(s) => format!("{{{}}}", join(s.borrow().values())),
        Value::Heap(h) => {
            let h = h.borrow();
            let kind = if h.max { "MaxHeap" } else { "MinHeap" };
            format!("{}[{}]", kind, join(h.items()))
        },
        Value::HeapMap(h) => {
            let h = h.borrow();
            let kind = if h.max { "MaxHeapMap" } else { "MinHeapMap" };
            let parts: Vec<String> = h
                .entries()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
                .collect();
            format!("{}{{{}}}", kind, parts.join(", "))
        },
        Value::Tree(t) => {
            let t = t.borrow();
            let kind = if t.balanced { "AVLTree" } else { "BinaryTree" };
            format!("{}[{}]", kind, join(&t.in_order()))
        },
        Value::Graph(g) => {
            let g = g.borrow();
            format!(
                "Graph({} vertices, {} edges)",
                g.vertices().len(),
                g.edge_count()
            )
        },
        Value::Range(r) => match r.end {
            Some(end) if r.inclusive => format!("{}..={}", r.start, end),
            Some(end) => format!("{}..{}", r.start, end),
            None => format!("{}..", r.start)
        },
        Value::Tuple(elems) => format!("({})", join(elems)),
        Value::Record(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(n, v)| format!("{}: {}", n, repr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        },
        Value::Closure(c) => format!("<do {}>", c.decl.name),
        Value::Native(n) => format!("<native {}>", n.name),
        Value::Bound(b) => format!("<method {}>", b.method),
        Value::Pred(p) => p.render()
    }
}


// Like core::Into, except that it returns a Result: conversions from
// runtime values can fail.
pub trait TryInto<T> {
    fn try_into(self) -> Result<T>;
}

macro_rules! impl_try_into {
    ($variant:ident => $type:ty) => {
        impl TryInto<$type> for Value {
            fn try_into(self) -> Result<$type> {
                match self {
                    Value::$variant(value) => Ok(value),
                    v => Err(expected(
                        BitFlags::from_flag(Tag::$variant),
                        &v
                    ))
                }
            }
        }
    }
}

impl_try_into! { Bool => bool }
impl_try_into! { Int => i64 }
impl_try_into! { Float => f64 }
impl_try_into! { Str => Rc<String> }
impl_try_into! { Array => Rc<RefCell<Vec<Value>>> }
impl_try_into! { Map => Rc<RefCell<MapData>> }
impl_try_into! { Range => Rc<LazyRange> }


#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &'static str) -> Value {
        Value::Str(Rc::new(String::from(v)))
    }

    fn arr(items: &[Value]) -> Value {
        Value::Array(Rc::new(RefCell::new(items.to_vec())))
    }

    #[test]
    fn test_numeric_promotion() {
        use Value::*;
        assert_eq!(Int(1).add(&Int(2)).unwrap(), Int(3));
        assert_eq!(Int(1).add(&Float(2.0)).unwrap(), Float(3.0));
        assert_eq!(Float(1.0).mul(&Int(3)).unwrap(), Float(3.0));
        assert_eq!(Int(7).div(&Int(2)).unwrap(), Int(3));
        assert_eq!(Int(7).fdiv(&Int(2)).unwrap(), Float(3.5));
        assert!(Float(7.0).div(&Float(2.0)).is_err());
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(s("foo").add(&s("bar")).unwrap(), s("foobar"));
        assert!(s("foo").add(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_relational() {
        use Value::*;
        assert_eq!(Int(2).lt(&Int(3)).unwrap(), Bool(true));
        assert_eq!(Int(2).lt(&Float(1.5)).unwrap(), Bool(false));
        assert_eq!(s("a").lte(&s("a")).unwrap(), Bool(true));
        assert!(Bool(true).lt(&Int(1)).is_err());
    }

    #[test]
    fn test_equality_is_unrestricted() {
        use Value::*;
        assert_eq!(Int(1), Float(1.0));
        assert_ne!(Int(1), s("1"));
        assert_eq!(
            arr(&[Int(1), Int(2)]),
            arr(&[Int(1), Int(2)])
        );
        assert_ne!(arr(&[Int(1)]), arr(&[Int(2)]));
    }

    #[test]
    fn test_shifts_are_int_only() {
        use Value::*;
        assert_eq!(Int(1).shl(&Int(3)).unwrap(), Int(8));
        assert_eq!(Int(8).shr(&Int(3)).unwrap(), Int(1));
        assert!(Float(1.0).shl(&Int(1)).is_err());
    }

    #[test]
    fn test_printer() {
        use Value::*;
        assert_eq!(repr(&Int(3)), "3");
        assert_eq!(repr(&Float(3.0)), "3.0");
        assert_eq!(repr(&Float(f64::INFINITY)), "inf");
        assert_eq!(repr(&s("hi")), "\"hi\"");
        assert_eq!(display(&s("hi")), "hi");
        assert_eq!(
            repr(&arr(&[Int(1), Int(3), Int(2)])),
            "[1, 3, 2]"
        );
    }
}
