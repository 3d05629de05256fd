// Static type inference.
//
// Three passes over the AST: function registration (so mutual
// recursion resolves), then bottom-up local inference through the
// shared expression synthesizer, with block scopes saved and restored
// around every body. The synthesizer is also the workhorse of the
// refinement pass, which re-runs it while mutating weak slots.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::ast::*;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::members::member_type;
use crate::types::{slot, Slot, Type, TypeCache};


#[derive(Clone, Debug)]
pub struct FunctionInfo {
    pub params: Vec<Slot>,
    pub ret: Slot,
    pub variadic: bool
}


// Containers are constructed by calling their type name.
pub fn constructor_type(name: &str) -> Option<Type> {
    let weak = || Node::new(Type::Weak);
    match name {
        "Map" => Some(Type::Map(weak(), weak())),
        "Set" => Some(Type::Set(weak())),
        "MinHeap" | "MaxHeap" => Some(Type::Heap(weak())),
        "MinHeapMap" | "MaxHeapMap" => Some(Type::HeapMap(weak(), weak())),
        "Graph" => Some(Type::Graph(weak())),
        "BinaryTree" => Some(Type::BinaryTree(weak())),
        "AVLTree" => Some(Type::AvlTree(weak())),
        _ => None
    }
}


pub struct Inference {
    vars: RefCell<Node<Env<Slot>>>,
    funcs: RefCell<HashMap<String, FunctionInfo>>,
    pub cache: TypeCache,
    // One frame of return-type candidates per function being walked.
    returns: RefCell<Vec<Vec<Node<Type>>>>
}

impl Inference {
    pub fn new() -> Inference {
        let vars: Node<Env<Slot>> = Env::root();
        vars.define(
            "inf",
            slot(Type::Intersection(vec![
                Node::new(Type::Int),
                Node::new(Type::Float)
            ]))
        );

        let mut funcs = HashMap::new();
        funcs.insert(
            String::from("print"),
            FunctionInfo {
                params: Vec::new(),
                ret: slot(Type::Void),
                variadic: true
            }
        );

        Inference {
            vars: RefCell::new(vars),
            funcs: RefCell::new(funcs),
            cache: TypeCache::new(),
            returns: RefCell::new(Vec::new())
        }
    }

    pub fn lookup_var(&self, name: &str) -> Option<Slot> {
        self.vars.borrow().get(name)
    }

    pub fn define_var(&self, name: &str, ty: Slot) {
        self.vars.borrow().define(name, ty);
    }

    pub fn function(&self, name: &str) -> Option<FunctionInfo> {
        self.funcs.borrow().get(name).cloned()
    }

    // Run f in a child scope, restoring the parent on the way out.
    pub fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        let parent = self.vars.borrow().clone();
        *self.vars.borrow_mut() = Env::chain(&parent);
        let result = f();
        *self.vars.borrow_mut() = parent;
        result
    }

    pub fn infer_program(&self, program: &Program) -> Result<()> {
        for stmt in &program.body {
            if let StmtKind::Function(f) = &stmt.kind {
                self.register_function(f, stmt.pos)?;
            }
        }
        for stmt in &program.body {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn register_function(
        &self,
        f: &Node<FunctionDecl>,
        pos: Pos
    ) -> Result<()> {
        for param in &f.params {
            if let Some(annot) = &param.annot {
                *param.ty.borrow_mut() = Type::from_annotation(annot, pos)?;
            }
        }
        if let Some(annot) = &f.ret_annot {
            *f.ret.borrow_mut() = Type::from_annotation(annot, pos)?;
        }
        self.funcs.borrow_mut().insert(
            f.name.clone(),
            FunctionInfo {
                params: f.params.iter().map(|p| p.ty.clone()).collect(),
                ret: f.ret.clone(),
                variadic: false
            }
        );
        Ok(())
    }

    fn check_cond(&self, cond: &Node<Expr>) -> Result<()> {
        let t = self.synth(cond)?;
        if self.cache.equal(&t, &Type::Bool) {
            Ok(())
        } else {
            Err(Error::type_error(
                format!("condition must be boolean, found {}", t),
                cond.pos
            ))
        }
    }

    fn collapse_returns(
        &self,
        candidates: Vec<Node<Type>>,
        pos: Pos
    ) -> Result<Node<Type>> {
        let mut concrete: Vec<Node<Type>> = candidates
            .iter()
            .filter(|t| !t.is_weak())
            .cloned()
            .collect();
        if concrete.is_empty() {
            // All returns are still weak, or there were none at all.
            return Ok(candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| Node::new(Type::Void)));
        }
        let first = concrete.remove(0);
        for t in &concrete {
            if !self.cache.equal(t, &first) {
                return Err(Error::type_error(
                    format!(
                        "incompatible return types {} and {}",
                        first, t
                    ),
                    pos
                ));
            }
        }
        Ok(first)
    }

    pub fn check_function(
        &self,
        f: &Node<FunctionDecl>,
        pos: Pos
    ) -> Result<()> {
        if self.function(&f.name).is_none() {
            self.register_function(f, pos)?;
        }
        self.returns.borrow_mut().push(Vec::new());
        let walked: Result<()> = self.scoped(|| {
            for param in &f.params {
                self.define_var(&param.name, param.ty.clone());
            }
            for stmt in &f.body {
                self.check_stmt(stmt)?;
            }
            Ok(())
        });
        let candidates = self
            .returns
            .borrow_mut()
            .pop()
            .expect("return frame pushed above");
        walked?;
        if f.ret_annot.is_none() {
            *f.ret.borrow_mut() = self.collapse_returns(candidates, pos)?;
        }
        Ok(())
    }

    pub fn check_stmt(&self, stmt: &Node<Stmt>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Function(f) => self.check_function(f, stmt.pos),
            StmtKind::VarDecl(decls) => {
                for decl in decls.iter() {
                    if decl.name == "_" {
                        return Err(Error::name(
                            "`_` can never be bound",
                            stmt.pos
                        ));
                    }
                    let init = self.synth(&decl.init)?;
                    match &decl.annot {
                        Some(annot) => {
                            let declared =
                                Type::from_annotation(annot, stmt.pos)?;
                            if !self.cache.equal(&init, &declared) {
                                return Err(Error::type_error(
                                    format!(
                                        "initializer of type {} does not \
                                         match annotation {}",
                                        init, declared
                                    ),
                                    decl.init.pos
                                ));
                            }
                            *decl.ty.borrow_mut() = declared;
                        },
                        None => {
                            *decl.ty.borrow_mut() = init;
                        }
                    }
                    self.define_var(&decl.name, decl.ty.clone());
                }
                Ok(())
            },
            StmtKind::Assign(target, value) => match target {
                AssignTarget::Ident(name) => {
                    if name == "_" {
                        return Err(Error::name(
                            "`_` can never be assigned",
                            stmt.pos
                        ));
                    }
                    let ty = self.lookup_var(name).ok_or_else(|| {
                        Error::name(
                            format!("undefined variable `{}`", name),
                            stmt.pos
                        )
                    })?;
                    let vt = self.synth(value)?;
                    let declared = ty.borrow().clone();
                    if !self.cache.equal(&vt, &declared) {
                        return Err(Error::type_error(
                            format!(
                                "cannot assign {} to `{}` of type {}",
                                vt, name, declared
                            ),
                            value.pos
                        ));
                    }
                    Ok(())
                },
                AssignTarget::Index(obj, idx) => {
                    let ot = self.synth(obj)?;
                    let it = self.synth(idx)?;
                    let elem = self.index_result(&ot, idx, &it, stmt.pos)?;
                    let vt = self.synth(value)?;
                    if !self.cache.equal(&vt, &elem) {
                        return Err(Error::type_error(
                            format!(
                                "cannot store {} where {} is expected",
                                vt, elem
                            ),
                            value.pos
                        ));
                    }
                    Ok(())
                }
            },
            StmtKind::If {cond, then, alt} => {
                self.check_cond(cond)?;
                self.scoped(|| {
                    for s in then {
                        self.check_stmt(s)?;
                    }
                    Ok(())
                })?;
                if let Some(alt) = alt {
                    self.scoped(|| {
                        for s in alt {
                            self.check_stmt(s)?;
                        }
                        Ok(())
                    })?;
                }
                Ok(())
            },
            StmtKind::While {cond, body} | StmtKind::Until {cond, body} => {
                self.check_cond(cond)?;
                self.scoped(|| {
                    for s in body {
                        self.check_stmt(s)?;
                    }
                    Ok(())
                })
            },
            StmtKind::For {var, iter, body} => {
                let it = self.synth(iter)?;
                let elem = match &*it {
                    Type::Array(e) | Type::Set(e) => e.clone(),
                    Type::Range => Node::new(Type::Int),
                    Type::Weak | Type::Poly => Node::new(Type::Weak),
                    Type::Dynamic => Node::new(Type::Dynamic),
                    other => {
                        return Err(Error::type_error(
                            format!("type {} is not iterable", other),
                            iter.pos
                        ))
                    }
                };
                self.scoped(|| {
                    self.define_var(var, slot((*elem).clone()));
                    for s in body {
                        self.check_stmt(s)?;
                    }
                    Ok(())
                })
            },
            StmtKind::Return(arg) => {
                let t = match arg {
                    Some(e) => self.synth(e)?,
                    None => Node::new(Type::Void)
                };
                match self.returns.borrow_mut().last_mut() {
                    Some(frame) => {
                        frame.push(t);
                        Ok(())
                    },
                    None => Err(Error::type_error(
                        "return outside of a function",
                        stmt.pos
                    ))
                }
            },
            StmtKind::Block(body) => self.scoped(|| {
                for s in body {
                    self.check_stmt(s)?;
                }
                Ok(())
            }),
            StmtKind::Expr(e) => {
                self.synth(e)?;
                Ok(())
            },
            StmtKind::Invariant {cond, ..} | StmtKind::Assert {cond, ..} => {
                self.check_cond(cond)
            }
        }
    }

    // Produce a type for any expression. §4.1's synthesizer.
    pub fn synth(&self, expr: &Node<Expr>) -> Result<Node<Type>> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(_) => Ok(Node::new(Type::Int)),
            ExprKind::Float(_) => Ok(Node::new(Type::Float)),
            ExprKind::Str(_) => Ok(Node::new(Type::Str)),
            ExprKind::Bool(_) => Ok(Node::new(Type::Bool)),
            ExprKind::Ident(name) => {
                if name == "_" {
                    return Err(Error::name("`_` can never be read", pos));
                }
                if let Some(ty) = self.lookup_var(name) {
                    let t = ty.borrow().clone();
                    return Ok(t);
                }
                if let Some(info) = self.function(name) {
                    return Ok(Node::new(Type::Function {
                        params: info
                            .params
                            .iter()
                            .map(|p| p.borrow().clone())
                            .collect(),
                        ret: info.ret.borrow().clone(),
                        variadic: info.variadic
                    }));
                }
                Err(Error::name(
                    format!("undefined variable `{}`", name),
                    pos
                ))
            },
            ExprKind::MetaIdent(_) => Ok(Node::new(Type::Pred)),
            ExprKind::Array(elems) => {
                if elems.is_empty() {
                    return Ok(Node::new(Type::Array(Node::new(Type::Weak))));
                }
                let first = self.synth(&elems[0])?;
                for e in &elems[1..] {
                    let t = self.synth(e)?;
                    if !self.cache.equal(&t, &first) {
                        return Err(Error::type_error(
                            format!(
                                "heterogeneous array literal: {} next to {}",
                                t, first
                            ),
                            e.pos
                        ));
                    }
                }
                Ok(Node::new(Type::Array(first)))
            },
            ExprKind::MapLit(pairs) => {
                if pairs.is_empty() {
                    return Ok(Node::new(Type::Map(
                        Node::new(Type::Weak),
                        Node::new(Type::Weak)
                    )));
                }
                let k0 = self.synth(&pairs[0].0)?;
                let v0 = self.synth(&pairs[0].1)?;
                for (k, v) in &pairs[1..] {
                    let kt = self.synth(k)?;
                    if !self.cache.equal(&kt, &k0) {
                        return Err(Error::type_error(
                            format!(
                                "heterogeneous map keys: {} next to {}",
                                kt, k0
                            ),
                            k.pos
                        ));
                    }
                    let vt = self.synth(v)?;
                    if !self.cache.equal(&vt, &v0) {
                        return Err(Error::type_error(
                            format!(
                                "heterogeneous map values: {} next to {}",
                                vt, v0
                            ),
                            v.pos
                        ));
                    }
                }
                Ok(Node::new(Type::Map(k0, v0)))
            },
            ExprKind::SetLit(elems) => {
                if elems.is_empty() {
                    return Ok(Node::new(Type::Set(Node::new(Type::Weak))));
                }
                let first = self.synth(&elems[0])?;
                for e in &elems[1..] {
                    let t = self.synth(e)?;
                    if !self.cache.equal(&t, &first) {
                        return Err(Error::type_error(
                            format!(
                                "heterogeneous set literal: {} next to {}",
                                t, first
                            ),
                            e.pos
                        ));
                    }
                }
                Ok(Node::new(Type::Set(first)))
            },
            ExprKind::Binary(op, l, r) => {
                let lt = self.synth(l)?;
                let rt = self.synth(r)?;
                self.synth_binary(*op, &lt, &rt, pos)
            },
            ExprKind::Unary(op, operand) => {
                let t = self.synth(operand)?;
                match op {
                    UnOp::Neg => match &*t {
                        Type::Int
                        | Type::Float
                        | Type::Weak
                        | Type::Dynamic => Ok(t),
                        other => Err(Error::type_error(
                            format!("cannot negate {}", other),
                            pos
                        ))
                    },
                    UnOp::Not => {
                        if self.cache.equal(&t, &Type::Bool) {
                            Ok(Node::new(Type::Bool))
                        } else {
                            Err(Error::type_error(
                                format!("`!` requires boolean, found {}", t),
                                pos
                            ))
                        }
                    }
                }
            },
            ExprKind::Call(callee, args) => self.synth_call(callee, args, pos),
            ExprKind::Member(obj, prop) => {
                let ot = self.synth(obj)?;
                match &*ot {
                    Type::Weak | Type::Poly => Ok(Node::new(Type::Weak)),
                    Type::Dynamic => Ok(Node::new(Type::Dynamic)),
                    Type::Union(_) | Type::Intersection(_) => {
                        Ok(Node::new(Type::Dynamic))
                    },
                    Type::Record(fields) => fields
                        .iter()
                        .find(|(n, _)| n == prop)
                        .map(|(_, t)| t.clone())
                        .ok_or_else(|| {
                            Error::type_error(
                                format!(
                                    "unknown member `{}` on {}",
                                    prop, ot
                                ),
                                pos
                            )
                        }),
                    other => match member_type(other, prop) {
                        Some(sig) => Ok(Node::new(sig.as_type())),
                        None => Err(Error::type_error(
                            format!("unknown member `{}` on {}", prop, ot),
                            pos
                        ))
                    }
                }
            },
            ExprKind::Index(obj, idx) => {
                let ot = self.synth(obj)?;
                let it = self.synth(idx)?;
                self.index_result(&ot, idx, &it, pos)
            },
            ExprKind::Range {start, end, ..} => {
                let st = match start {
                    Some(s) => Some(self.synth(s)?),
                    None => None
                };
                let et = match end {
                    Some(e) => Some(self.synth(e)?),
                    None => None
                };
                let int_like = |t: &Option<Node<Type>>| match t {
                    None => true,
                    Some(t) => {
                        self.cache.equal(t, &Type::Int) && !t.is_dynamic()
                    }
                };
                if st.iter().chain(et.iter()).any(|t| t.is_dynamic()) {
                    return Ok(Node::new(Type::Dynamic));
                }
                match (&st, &et) {
                    (_, None) => {
                        if int_like(&st) {
                            Ok(Node::new(Type::Range))
                        } else {
                            Err(Error::type_error(
                                "open range start must be int",
                                pos
                            ))
                        }
                    },
                    (_, Some(_)) if int_like(&st) && int_like(&et) => {
                        Ok(Node::new(Type::Array(Node::new(Type::Int))))
                    },
                    (Some(s), Some(e))
                        if self.cache.equal(s, &Type::Str)
                            && self.cache.equal(e, &Type::Str) =>
                    {
                        Ok(Node::new(Type::Array(Node::new(Type::Str))))
                    },
                    _ => Err(Error::type_error(
                        "range endpoints must both be int or both string",
                        pos
                    ))
                }
            },
            ExprKind::TypeOf(operand) => {
                self.synth(operand)?;
                Ok(Node::new(Type::Str))
            },
            ExprKind::PredicateCheck {subject, args, ..} => {
                for a in args {
                    self.synth(a)?;
                }
                self.synth(subject)?;
                Ok(Node::new(Type::Bool))
            }
        }
    }

    fn synth_binary(
        &self,
        op: BinOp,
        lt: &Node<Type>,
        rt: &Node<Type>,
        pos: Pos
    ) -> Result<Node<Type>> {
        use BinOp::*;

        // Some operators pin their result type even through weak or
        // dynamic operands.
        let forced = match op {
            Lt | Lte | Gt | Gte | Eq | Neq | And | Or => Some(Type::Bool),
            Div | Shl | Shr => Some(Type::Int),
            FloatDiv => Some(Type::Float),
            _ => None
        };
        if lt.is_dynamic() || rt.is_dynamic() {
            return Ok(Node::new(forced.unwrap_or(Type::Dynamic)));
        }
        if lt.is_weak() || rt.is_weak() {
            return Ok(Node::new(forced.unwrap_or(Type::Weak)));
        }
        // Union-typed operands cannot be resolved statically; the
        // checker surrenders to the runtime.
        if matches!(**lt, Type::Union(_)) || matches!(**rt, Type::Union(_)) {
            return Ok(Node::new(forced.unwrap_or(Type::Dynamic)));
        }

        let both_int = self.cache.equal(lt, &Type::Int)
            && self.cache.equal(rt, &Type::Int);
        let both_numeric = lt.is_numeric() && rt.is_numeric();
        let fail = |what: &str| {
            Err(Error::type_error(
                format!("{} does not accept {} and {}", what, lt, rt),
                pos
            ))
        };

        match op {
            Add => {
                if both_int {
                    Ok(Node::new(Type::Int))
                } else if both_numeric {
                    Ok(Node::new(Type::Float))
                } else if self.cache.equal(lt, &Type::Str)
                    && self.cache.equal(rt, &Type::Str)
                {
                    Ok(Node::new(Type::Str))
                } else {
                    fail("`+`")
                }
            },
            Sub | Mul | Mod => {
                if both_int {
                    Ok(Node::new(Type::Int))
                } else if both_numeric {
                    Ok(Node::new(Type::Float))
                } else {
                    fail("arithmetic")
                }
            },
            Div => {
                if both_int {
                    Ok(Node::new(Type::Int))
                } else {
                    fail("`/` (integer division)")
                }
            },
            FloatDiv => {
                if both_numeric {
                    Ok(Node::new(Type::Float))
                } else {
                    fail("`/.`")
                }
            },
            Shl | Shr => {
                if both_int {
                    Ok(Node::new(Type::Int))
                } else {
                    fail("shift")
                }
            },
            Lt | Lte | Gt | Gte => {
                if both_numeric {
                    Ok(Node::new(Type::Bool))
                } else {
                    fail("comparison")
                }
            },
            Eq | Neq => Ok(Node::new(Type::Bool)),
            And | Or => {
                if self.cache.equal(lt, &Type::Bool)
                    && self.cache.equal(rt, &Type::Bool)
                {
                    Ok(Node::new(Type::Bool))
                } else {
                    fail("logic")
                }
            }
        }
    }

    fn check_args(
        &self,
        params: &[Node<Type>],
        required: usize,
        args: &[Node<Expr>],
        pos: Pos
    ) -> Result<()> {
        if args.len() < required || args.len() > params.len() {
            return Err(Error::type_error(
                format!(
                    "expected {} argument(s), got {}",
                    if required == params.len() {
                        format!("{}", required)
                    } else {
                        format!("{} to {}", required, params.len())
                    },
                    args.len()
                ),
                pos
            ));
        }
        for (arg, param) in args.iter().zip(params) {
            let at = self.synth(arg)?;
            if !self.cache.equal(&at, param) {
                return Err(Error::type_error(
                    format!("argument of type {} where {} is expected", at, param),
                    arg.pos
                ));
            }
        }
        Ok(())
    }

    fn synth_call(
        &self,
        callee: &Node<Expr>,
        args: &Seq<Expr>,
        pos: Pos
    ) -> Result<Node<Type>> {
        match &callee.kind {
            // Curried predicate construction: @greater_than(3)
            ExprKind::MetaIdent(_) => {
                for a in args {
                    self.synth(a)?;
                }
                Ok(Node::new(Type::Pred))
            },
            ExprKind::Ident(name) => {
                if let Some(t) = constructor_type(name) {
                    match (name.as_str(), args.len()) {
                        (_, 0) => {},
                        ("Graph", 1) => {
                            let at = self.synth(&args[0])?;
                            if !self.cache.equal(&at, &Type::Bool) {
                                return Err(Error::type_error(
                                    "Graph takes a boolean directedness flag",
                                    args[0].pos
                                ));
                            }
                        },
                        _ => {
                            return Err(Error::type_error(
                                format!(
                                    "constructor {} takes no arguments",
                                    name
                                ),
                                pos
                            ))
                        }
                    }
                    return Ok(Node::new(t));
                }
                if let Some(info) = self.function(name) {
                    if info.variadic {
                        for a in args {
                            self.synth(a)?;
                        }
                    } else {
                        let params: Vec<Node<Type>> = info
                            .params
                            .iter()
                            .map(|p| p.borrow().clone())
                            .collect();
                        self.check_args(&params, params.len(), args, pos)?;
                    }
                    let ret = info.ret.borrow().clone();
                    return Ok(ret);
                }
                if let Some(ty) = self.lookup_var(name) {
                    let t = ty.borrow().clone();
                    return self.synth_callable(&t, args, pos);
                }
                Err(Error::name(
                    format!("undefined function `{}`", name),
                    pos
                ))
            },
            ExprKind::Member(obj, prop) => {
                let ot = self.synth(obj)?;
                match &*ot {
                    Type::Weak | Type::Poly => {
                        for a in args {
                            self.synth(a)?;
                        }
                        Ok(Node::new(Type::Weak))
                    },
                    Type::Dynamic
                    | Type::Union(_)
                    | Type::Intersection(_) => {
                        for a in args {
                            self.synth(a)?;
                        }
                        Ok(Node::new(Type::Dynamic))
                    },
                    other => match member_type(other, prop) {
                        Some(sig) => {
                            self.check_args(
                                &sig.params,
                                sig.required,
                                args,
                                pos
                            )?;
                            Ok(sig.ret.clone())
                        },
                        None => Err(Error::type_error(
                            format!("unknown member `{}` on {}", prop, ot),
                            pos
                        ))
                    }
                }
            },
            _ => {
                let t = self.synth(callee)?;
                self.synth_callable(&t, args, pos)
            }
        }
    }

    fn synth_callable(
        &self,
        t: &Type,
        args: &Seq<Expr>,
        pos: Pos
    ) -> Result<Node<Type>> {
        match t {
            Type::Function {params, ret, variadic} => {
                if *variadic {
                    for a in args {
                        self.synth(a)?;
                    }
                } else {
                    self.check_args(params, params.len(), args, pos)?;
                }
                Ok(ret.clone())
            },
            Type::Pred => {
                for a in args {
                    self.synth(a)?;
                }
                Ok(Node::new(Type::Pred))
            },
            Type::Weak | Type::Poly => {
                for a in args {
                    self.synth(a)?;
                }
                Ok(Node::new(Type::Weak))
            },
            Type::Dynamic => {
                for a in args {
                    self.synth(a)?;
                }
                Ok(Node::new(Type::Dynamic))
            },
            other => Err(Error::type_error(
                format!("type {} is not callable", other),
                pos
            ))
        }
    }

    // Indexing rules shared by reads and indexed assignment.
    pub fn index_result(
        &self,
        ot: &Node<Type>,
        idx: &Node<Expr>,
        it: &Node<Type>,
        pos: Pos
    ) -> Result<Node<Type>> {
        match &**ot {
            Type::Weak | Type::Poly => Ok(Node::new(Type::Weak)),
            Type::Dynamic => Ok(Node::new(Type::Dynamic)),
            Type::Array(elem) => match &**it {
                // A slice keeps the array type.
                Type::Range => Ok(ot.clone()),
                Type::Array(i) if self.cache.equal(i, &Type::Int) => {
                    Ok(ot.clone())
                },
                _ if self.cache.equal(it, &Type::Int) => Ok(elem.clone()),
                other => Err(Error::type_error(
                    format!("array index must be int, found {}", other),
                    pos
                ))
            },
            Type::Map(k, v) => {
                if self.cache.equal(it, k) {
                    Ok(v.clone())
                } else {
                    Err(Error::type_error(
                        format!(
                            "map key must be {}, found {}",
                            k, it
                        ),
                        pos
                    ))
                }
            },
            Type::Tuple(elems) => match &idx.kind {
                ExprKind::Int(n) => {
                    let n = *n;
                    if n >= 0 && (n as usize) < elems.len() {
                        Ok(elems[n as usize].clone())
                    } else {
                        Err(Error::index(format!(
                            "tuple index {} out of range (line {}, column {})",
                            n, pos.line, pos.column
                        )))
                    }
                },
                _ => Err(Error::type_error(
                    "tuple index must be an integer literal",
                    pos
                ))
            },
            Type::Record(fields) => match &idx.kind {
                ExprKind::Str(name) => fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, t)| t.clone())
                    .ok_or_else(|| {
                        Error::index(format!(
                            "record field `{}` not present",
                            name
                        ))
                        .at(pos)
                    }),
                _ => Err(Error::type_error(
                    "record index must be a string literal",
                    pos
                ))
            },
            other => Err(Error::type_error(
                format!("type {} cannot be indexed", other),
                pos
            ))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    // Run inference on a program and hand back both for inspection.
    fn infer(source: &str) -> (Program, Inference) {
        let program = parse(source).unwrap();
        let cx = Inference::new();
        cx.infer_program(&program).unwrap();
        (program, cx)
    }

    fn infer_err(source: &str) -> Error {
        let program = parse(source).unwrap();
        let cx = Inference::new();
        cx.infer_program(&program).unwrap_err()
    }

    fn decl_type(program: &Program, index: usize) -> String {
        match &program.body[index].kind {
            StmtKind::VarDecl(decls) => decls[0].ty.borrow().to_string(),
            other => panic!("not a declaration: {:?}", other)
        }
    }

    #[test]
    fn test_literal_inference() {
        let (program, _) = infer(
            "let a = 1; let b = 2.5; let c = \"s\"; let d = [1, 2]"
        );
        assert_eq!(decl_type(&program, 0), "int");
        assert_eq!(decl_type(&program, 1), "float");
        assert_eq!(decl_type(&program, 2), "string");
        assert_eq!(decl_type(&program, 3), "Array<int>");
    }

    #[test]
    fn test_annotation_wins_over_empty_literal() {
        let (program, _) = infer("let a: Array<int> = []");
        assert_eq!(decl_type(&program, 0), "Array<int>");
    }

    #[test]
    fn test_heterogeneous_array_is_an_error() {
        let e = infer_err("let a = [1, \"x\"]");
        assert!(matches!(e.kind, crate::error::ErrorKind::Type(_)));
        assert_eq!(e.pos.map(|p| p.line), Some(1));
    }

    #[test]
    fn test_numeric_operator_rules() {
        let (program, _) = infer(
            "let a = 1 + 2; let b = 1 + 2.0; let c = 7 / 2; let d = 7 /. 2"
        );
        assert_eq!(decl_type(&program, 0), "int");
        assert_eq!(decl_type(&program, 1), "float");
        assert_eq!(decl_type(&program, 2), "int");
        assert_eq!(decl_type(&program, 3), "float");
        assert!(matches!(
            infer_err("let x = 1.0 / 2.0").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_conditions_must_be_boolean() {
        // A boolean condition passes...
        infer("if 1 == 1 { }");
        // ...anything else does not.
        assert!(matches!(
            infer_err("if 1 { }").kind,
            crate::error::ErrorKind::Type(_)
        ));
        assert!(matches!(
            infer_err("while \"x\" { }").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_function_registration_allows_forward_calls() {
        let (_, cx) = infer(
            "do even(n: int) -> bool { return odd(n - 1) }
             do odd(n: int) -> bool { return even(n - 1) }"
        );
        let info = cx.function("even").unwrap();
        assert_eq!(info.ret.borrow().to_string(), "boolean");
    }

    #[test]
    fn test_return_collapse() {
        let (_, cx) = infer("do f(x: int) { return x }");
        assert_eq!(cx.function("f").unwrap().ret.borrow().to_string(), "int");

        let (_, cx) = infer("do f() { }");
        assert_eq!(
            cx.function("f").unwrap().ret.borrow().to_string(),
            "void"
        );

        assert!(matches!(
            infer_err(
                "do f(x: int) { if x == 0 { return 1 } return \"no\" }"
            )
            .kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_arity_and_argument_checks() {
        assert!(matches!(
            infer_err("do f(a: int) { return a } f(1, 2)").kind,
            crate::error::ErrorKind::Type(_)
        ));
        assert!(matches!(
            infer_err("do f(a: int) { return a } f(\"x\")").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_member_synthesis() {
        let (program, _) = infer("let a = [1]; let n = a.length()");
        assert_eq!(decl_type(&program, 1), "int");
        let e = infer_err("let a = [1]; a.frob()");
        assert!(matches!(e.kind, crate::error::ErrorKind::Type(_)));
        assert!(e.pos.is_some());
    }

    #[test]
    fn test_constructors() {
        let (program, _) = infer("let m = Map(); let g = Graph(true)");
        assert_eq!(decl_type(&program, 0), "Map<weak, weak>");
        assert_eq!(decl_type(&program, 1), "Graph<weak>");
        assert!(matches!(
            infer_err("let m = Map(1)").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_indexing() {
        let (program, _) = infer(
            "let a = [1, 2, 3]
             let x = a[0]
             let s = a[0..2]
             let m = {\"k\": 5}
             let v = m[\"k\"]"
        );
        assert_eq!(decl_type(&program, 1), "int");
        assert_eq!(decl_type(&program, 2), "Array<int>");
        assert_eq!(decl_type(&program, 4), "int");
        assert!(matches!(
            infer_err("let a = [1]; let x = a[\"no\"]").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_ranges() {
        let (program, _) = infer(
            "let a = 0..5; let b = 0..; let c = \"a\"..\"f\""
        );
        assert_eq!(decl_type(&program, 0), "Array<int>");
        assert_eq!(decl_type(&program, 1), "Range");
        assert_eq!(decl_type(&program, 2), "Array<string>");
    }

    #[test]
    fn test_underscore_and_scope_errors() {
        assert!(matches!(
            infer_err("let _ = 1").kind,
            crate::error::ErrorKind::Name(_)
        ));
        assert!(matches!(
            infer_err("let x = _ ").kind,
            crate::error::ErrorKind::Name(_)
        ));
        assert!(matches!(
            infer_err("let x = missing").kind,
            crate::error::ErrorKind::Name(_)
        ));
        assert!(matches!(
            infer_err("return 1").kind,
            crate::error::ErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_predicate_check_is_boolean() {
        let (program, _) = infer("let a = [1]; let ok = a |- @sorted");
        assert_eq!(decl_type(&program, 1), "boolean");
    }

    #[test]
    fn test_inf_is_int_and_float() {
        let (program, _) = infer("let x = inf; let y = 1 < inf");
        assert_eq!(decl_type(&program, 0), "int & float");
        assert_eq!(decl_type(&program, 1), "boolean");
    }
}
