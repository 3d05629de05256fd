use std::rc::Rc;

use crate::types::Slot;


// Abstract over various memory management strategies.
pub type Node<T> = Rc<T>;
pub type Seq<T> = Vec<Node<T>>;


// Source position, carried by every statement and expression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pos {
    pub line: u32,
    pub column: u32
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Pos {
        Pos {line, column}
    }
}


// Arithmetic, relational and logic operations
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloatDiv,
    Mod,
    Shl,
    Shr,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UnOp {
    Neg,
    Not
}


// Surface syntax for types, resolved to types::Type during inference.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeAnnotation {
    Simple(String),
    Generic(String, Vec<TypeAnnotation>),
    Union(Vec<TypeAnnotation>),
    Intersection(Vec<TypeAnnotation>),
    Function(Vec<TypeAnnotation>, Box<TypeAnnotation>),
    Tuple(Vec<TypeAnnotation>),
    Record(Vec<(String, TypeAnnotation)>)
}


// ADT for expressions
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    MetaIdent(String),
    Array(Seq<Expr>),
    MapLit(Vec<(Node<Expr>, Node<Expr>)>),
    SetLit(Seq<Expr>),
    Binary(BinOp, Node<Expr>, Node<Expr>),
    Unary(UnOp, Node<Expr>),
    Call(Node<Expr>, Seq<Expr>),
    Member(Node<Expr>, String),
    Index(Node<Expr>, Node<Expr>),
    Range {
        start: Option<Node<Expr>>,
        end: Option<Node<Expr>>,
        inclusive: bool
    },
    TypeOf(Node<Expr>),
    PredicateCheck {
        subject: Node<Expr>,
        name: String,
        args: Seq<Expr>
    }
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Node<Expr> {
        Node::new(Expr {kind, pos})
    }

    // The bound name a predicate check or tracker observation refers
    // to, when the expression is a plain identifier.
    pub fn ident_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None
        }
    }
}


// One `name[: T] = init` in a let statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub annot: Option<TypeAnnotation>,
    pub ty: Slot,
    pub init: Node<Expr>
}


#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub annot: Option<TypeAnnotation>,
    pub ty: Slot
}


#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_annot: Option<TypeAnnotation>,
    pub ret: Slot,
    pub body: Seq<Stmt>
}


#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
    Ident(String),
    Index(Node<Expr>, Node<Expr>)
}


// ADT for effects and structure
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Function(Node<FunctionDecl>),
    VarDecl(Rc<Vec<Declarator>>),
    Assign(AssignTarget, Node<Expr>),
    If {
        cond: Node<Expr>,
        then: Seq<Stmt>,
        alt: Option<Seq<Stmt>>
    },
    While {
        cond: Node<Expr>,
        body: Seq<Stmt>
    },
    Until {
        cond: Node<Expr>,
        body: Seq<Stmt>
    },
    For {
        var: String,
        iter: Node<Expr>,
        body: Seq<Stmt>
    },
    Return(Option<Node<Expr>>),
    Block(Seq<Stmt>),
    Expr(Node<Expr>),
    Invariant {
        cond: Node<Expr>,
        message: Option<String>
    },
    Assert {
        cond: Node<Expr>,
        message: Option<String>
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Pos) -> Node<Stmt> {
        Node::new(Stmt {kind, pos})
    }
}


// ADT for programs
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub body: Seq<Stmt>
}
