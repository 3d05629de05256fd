// Fixed-point refinement of weak type slots.
//
// Each pass re-walks the program through the shared synthesizer,
// applying constraints at use sites: a concrete operand constrains a
// weak operand, a method name implies a container kind, indexing
// implies an array, and call arguments flow into weak parameter
// slots. Every mutation raises the changed flag; the loop stops on
// the first quiet pass or after MAX_PASSES. Dynamic slots are never
// touched.

use std::cell::{Cell, RefCell};

use crate::ast::*;
use crate::error::{Error, Result};
use crate::infer::{constructor_type, Inference};
use crate::trace;
use crate::members::{implied_container, member_type};
use crate::types::{merge_nested, slot, Slot, Type};


const MAX_PASSES: usize = 10;


pub fn refine(program: &Program, cx: &Inference) -> Result<()> {
    for pass in 0..MAX_PASSES {
        cx.cache.clear();
        let refiner = Refiner {
            cx,
            changed: Cell::new(false),
            returns: RefCell::new(Vec::new())
        };
        refiner.pass(program)?;
        trace!("refinement pass {}: changed={}", pass, refiner.changed.get());
        if !refiner.changed.get() {
            break;
        }
    }
    Ok(())
}


struct Refiner<'a> {
    cx: &'a Inference,
    changed: Cell<bool>,
    returns: RefCell<Vec<Vec<Node<Type>>>>
}

impl<'a> Refiner<'a> {
    fn pass(&self, program: &Program) -> Result<()> {
        for stmt in &program.body {
            self.refine_stmt(stmt)?;
        }
        Ok(())
    }

    fn set_slot(&self, target: &Slot, t: Node<Type>) {
        trace!("refine: {} -> {}", target.borrow(), t);
        *target.borrow_mut() = t;
        self.changed.set(true);
    }

    // weak -> concrete, or a nested weak parameter filled in. Dynamic
    // and already-concrete slots are left alone.
    fn constrain(&self, target: &Slot, t: &Node<Type>) {
        let current = target.borrow().clone();
        if current.is_dynamic() {
            return;
        }
        if let Some(merged) = merge_nested(&current, t) {
            self.set_slot(target, merged);
        }
    }

    fn slot_of(&self, expr: &Node<Expr>) -> Option<Slot> {
        match expr.ident_name() {
            Some(name) => self.cx.lookup_var(name),
            None => None
        }
    }

    fn refine_stmt(&self, stmt: &Node<Stmt>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Function(f) => self.refine_function(f, stmt.pos),
            StmtKind::VarDecl(decls) => {
                for decl in decls.iter() {
                    let t = self.refine_expr(&decl.init)?;
                    self.constrain(&decl.ty, &t);
                    self.cx.define_var(&decl.name, decl.ty.clone());
                }
                Ok(())
            },
            StmtKind::Assign(target, value) => {
                let vt = self.refine_expr(value)?;
                match target {
                    AssignTarget::Ident(name) => {
                        if let Some(ty) = self.cx.lookup_var(name) {
                            self.constrain(&ty, &vt);
                            // Equality flows both ways: a concrete
                            // binding refines a weak right-hand name.
                            let cur = ty.borrow().clone();
                            if let Some(vslot) = self.slot_of(value) {
                                self.constrain(&vslot, &cur);
                            }
                        }
                        Ok(())
                    },
                    AssignTarget::Index(obj, idx) => {
                        let _ = self.refine_expr(obj)?;
                        let it = self.refine_expr(idx)?;
                        if let Some(oslot) = self.slot_of(obj) {
                            let cur = oslot.borrow().clone();
                            match &*cur {
                                Type::Array(e) => {
                                    if let Some(merged) =
                                        merge_nested(e, &vt)
                                    {
                                        self.set_slot(
                                            &oslot,
                                            Node::new(Type::Array(merged))
                                        );
                                    }
                                    if let Some(islot) = self.slot_of(idx) {
                                        self.constrain(
                                            &islot,
                                            &Node::new(Type::Int)
                                        );
                                    }
                                },
                                Type::Map(k, v) => {
                                    let nk = merge_nested(k, &it);
                                    let nv = merge_nested(v, &vt);
                                    if nk.is_some() || nv.is_some() {
                                        self.set_slot(
                                            &oslot,
                                            Node::new(Type::Map(
                                                nk.unwrap_or_else(|| {
                                                    k.clone()
                                                }),
                                                nv.unwrap_or_else(|| {
                                                    v.clone()
                                                })
                                            ))
                                        );
                                    }
                                },
                                _ => {}
                            }
                        }
                        Ok(())
                    }
                }
            },
            StmtKind::If {cond, then, alt} => {
                self.refine_expr(cond)?;
                self.cx.scoped(|| {
                    for s in then {
                        self.refine_stmt(s)?;
                    }
                    Ok(())
                })?;
                if let Some(alt) = alt {
                    self.cx.scoped(|| {
                        for s in alt {
                            self.refine_stmt(s)?;
                        }
                        Ok(())
                    })?;
                }
                Ok(())
            },
            StmtKind::While {cond, body} | StmtKind::Until {cond, body} => {
                self.refine_expr(cond)?;
                self.cx.scoped(|| {
                    for s in body {
                        self.refine_stmt(s)?;
                    }
                    Ok(())
                })
            },
            StmtKind::For {var, iter, body} => {
                let it = self.refine_expr(iter)?;
                let elem = match &*it {
                    Type::Array(e) | Type::Set(e) => (**e).clone(),
                    Type::Range => Type::Int,
                    Type::Dynamic => Type::Dynamic,
                    _ => Type::Weak
                };
                self.cx.scoped(|| {
                    self.cx.define_var(var, slot(elem));
                    for s in body {
                        self.refine_stmt(s)?;
                    }
                    Ok(())
                })
            },
            StmtKind::Return(arg) => {
                let t = match arg {
                    Some(e) => self.refine_expr(e)?,
                    None => Node::new(Type::Void)
                };
                if let Some(frame) = self.returns.borrow_mut().last_mut() {
                    frame.push(t);
                }
                Ok(())
            },
            StmtKind::Block(body) => self.cx.scoped(|| {
                for s in body {
                    self.refine_stmt(s)?;
                }
                Ok(())
            }),
            StmtKind::Expr(e) => {
                self.refine_expr(e)?;
                Ok(())
            },
            StmtKind::Invariant {cond, ..} | StmtKind::Assert {cond, ..} => {
                self.refine_expr(cond)?;
                Ok(())
            }
        }
    }

    fn refine_function(
        &self,
        f: &Node<FunctionDecl>,
        pos: Pos
    ) -> Result<()> {
        self.returns.borrow_mut().push(Vec::new());
        let walked: Result<()> = self.cx.scoped(|| {
            for param in &f.params {
                self.cx.define_var(&param.name, param.ty.clone());
            }
            for stmt in &f.body {
                self.refine_stmt(stmt)?;
            }
            Ok(())
        });
        let candidates = self
            .returns
            .borrow_mut()
            .pop()
            .expect("return frame pushed above");
        walked?;

        // Recompute the recorded return type from this pass's body
        // walk: fill a still-weak slot from the concrete candidates,
        // or fill nested weak parameters in a container return.
        let cur = f.ret.borrow().clone();
        if cur.is_weak() {
            let mut concrete =
                candidates.iter().filter(|t| t.fully_concrete());
            if let Some(first) = concrete.next() {
                for t in concrete {
                    if !self.cx.cache.equal(t, first) {
                        return Err(Error::type_error(
                            format!(
                                "incompatible return types {} and {}",
                                first, t
                            ),
                            pos
                        ));
                    }
                }
                self.set_slot(&f.ret, first.clone());
            }
        } else {
            for t in &candidates {
                if let Some(merged) = merge_nested(&cur, t) {
                    self.set_slot(&f.ret, merged);
                    break;
                }
            }
        }
        Ok(())
    }

    // Operators whose concrete side constrains a weak identifier on
    // the other side, and what the constraint is.
    fn binary_constraint(
        &self,
        op: BinOp,
        operand: &Node<Expr>,
        other: &Node<Type>
    ) {
        use BinOp::*;
        let target = match self.slot_of(operand) {
            Some(slot) => slot,
            None => return
        };
        match op {
            // Int-only operators force int outright.
            Div | Shl | Shr => {
                self.constrain(&target, &Node::new(Type::Int));
            },
            Eq | Neq => {
                self.constrain(&target, other);
            },
            Lt | Lte | Gt | Gte | Add | Sub | Mul | Mod => {
                if other.is_numeric() || matches!(**other, Type::Str) {
                    self.constrain(&target, other);
                }
            },
            _ => {}
        }
    }

    // Given a receiver whose container kind is known, flow concrete
    // argument types into its weak type parameters.
    fn refine_receiver(
        &self,
        oslot: &Slot,
        method: &str,
        args: &[Node<Type>]
    ) {
        let cur = oslot.borrow().clone();
        let arg = |i: usize| args.get(i);
        let rebuilt: Option<Node<Type>> = match (&*cur, method) {
            (Type::Array(e), "push") => arg(0)
                .and_then(|t| merge_nested(e, t))
                .map(|e| Node::new(Type::Array(e))),
            (Type::Map(k, v), "set") => {
                let nk = arg(0).and_then(|t| merge_nested(k, t));
                let nv = arg(1).and_then(|t| merge_nested(v, t));
                if nk.is_none() && nv.is_none() {
                    None
                } else {
                    Some(Node::new(Type::Map(
                        nk.unwrap_or_else(|| k.clone()),
                        nv.unwrap_or_else(|| v.clone())
                    )))
                }
            },
            (Type::Map(k, v), "get")
            | (Type::Map(k, v), "has")
            | (Type::Map(k, v), "delete")
            | (Type::Map(k, v), "deleteWithKey") => arg(0)
                .and_then(|t| merge_nested(k, t))
                .map(|nk| Node::new(Type::Map(nk, v.clone()))),
            (Type::Set(e), "add")
            | (Type::Set(e), "has")
            | (Type::Set(e), "delete") => arg(0)
                .and_then(|t| merge_nested(e, t))
                .map(|e| Node::new(Type::Set(e))),
            (Type::Heap(e), "push") => arg(0)
                .and_then(|t| merge_nested(e, t))
                .map(|e| Node::new(Type::Heap(e))),
            (Type::HeapMap(k, v), "push") => {
                let nk = arg(0).and_then(|t| merge_nested(k, t));
                let nv = arg(1).and_then(|t| merge_nested(v, t));
                if nk.is_none() && nv.is_none() {
                    None
                } else {
                    Some(Node::new(Type::HeapMap(
                        nk.unwrap_or_else(|| k.clone()),
                        nv.unwrap_or_else(|| v.clone())
                    )))
                }
            },
            (Type::BinaryTree(e), "insert")
            | (Type::BinaryTree(e), "search") => arg(0)
                .and_then(|t| merge_nested(e, t))
                .map(|e| Node::new(Type::BinaryTree(e))),
            (Type::AvlTree(e), "insert") | (Type::AvlTree(e), "search") => {
                arg(0)
                    .and_then(|t| merge_nested(e, t))
                    .map(|e| Node::new(Type::AvlTree(e)))
            },
            (Type::Graph(n), "addVertex")
            | (Type::Graph(n), "hasVertex")
            | (Type::Graph(n), "getNeighbors") => arg(0)
                .and_then(|t| merge_nested(n, t))
                .map(|n| Node::new(Type::Graph(n))),
            (Type::Graph(n), "addEdge") | (Type::Graph(n), "hasEdge") => {
                let merged = arg(0)
                    .and_then(|t| merge_nested(n, t))
                    .or_else(|| arg(1).and_then(|t| merge_nested(n, t)));
                merged.map(|n| Node::new(Type::Graph(n)))
            },
            _ => None
        };
        if let Some(t) = rebuilt {
            self.set_slot(oslot, t);
        }
    }

    fn refine_expr(&self, expr: &Node<Expr>) -> Result<Node<Type>> {
        match &expr.kind {
            ExprKind::Binary(op, l, r) => {
                let lt = self.refine_expr(l)?;
                let rt = self.refine_expr(r)?;
                self.binary_constraint(*op, l, &rt);
                self.binary_constraint(*op, r, &lt);
                self.cx.synth(expr)
            },
            ExprKind::Unary(_, operand) | ExprKind::TypeOf(operand) => {
                self.refine_expr(operand)?;
                self.cx.synth(expr)
            },
            ExprKind::Call(callee, args) => {
                let arg_types: Result<Vec<Node<Type>>> =
                    args.iter().map(|a| self.refine_expr(a)).collect();
                let arg_types = arg_types?;

                match &callee.kind {
                    ExprKind::Member(obj, prop) => {
                        self.refine_expr(obj)?;
                        if let Some(oslot) = self.slot_of(obj) {
                            // A method name on a still-weak receiver
                            // pins the container kind.
                            if oslot.borrow().is_weak() {
                                if let Some(c) =
                                    implied_container(prop, args.len())
                                {
                                    self.set_slot(&oslot, Node::new(c));
                                }
                            }
                            self.refine_receiver(&oslot, prop, &arg_types);
                            // And concrete receiver parameters flow
                            // back into weak argument bindings.
                            let cur = oslot.borrow().clone();
                            if let Some(sig) = member_type(&cur, prop) {
                                for (arg, param) in
                                    args.iter().zip(&sig.params)
                                {
                                    if let Some(aslot) = self.slot_of(arg) {
                                        self.constrain(&aslot, param);
                                    }
                                }
                            }
                        }
                    },
                    ExprKind::Ident(name) => {
                        if constructor_type(name).is_none() {
                            if let Some(info) = self.cx.function(name) {
                                for (i, arg) in args.iter().enumerate() {
                                    let pslot = match info.params.get(i) {
                                        Some(p) => p,
                                        None => break
                                    };
                                    // Call sites refine parameters...
                                    self.constrain(pslot, &arg_types[i]);
                                    // ...and parameters refine weak
                                    // argument bindings.
                                    let pt = pslot.borrow().clone();
                                    if let Some(aslot) = self.slot_of(arg) {
                                        self.constrain(&aslot, &pt);
                                    }
                                }
                            }
                        }
                    },
                    _ => {
                        self.refine_expr(callee)?;
                    }
                }
                self.cx.synth(expr)
            },
            ExprKind::Member(obj, _) => {
                self.refine_expr(obj)?;
                self.cx.synth(expr)
            },
            ExprKind::Index(obj, idx) => {
                self.refine_expr(obj)?;
                self.refine_expr(idx)?;
                if let Some(oslot) = self.slot_of(obj) {
                    // Indexing implies an array.
                    if oslot.borrow().is_weak() {
                        self.set_slot(
                            &oslot,
                            Node::new(Type::Array(Node::new(Type::Weak)))
                        );
                    }
                    let cur = oslot.borrow().clone();
                    if matches!(&*cur, Type::Array(_)) {
                        if let Some(islot) = self.slot_of(idx) {
                            self.constrain(&islot, &Node::new(Type::Int));
                        }
                    }
                }
                self.cx.synth(expr)
            },
            ExprKind::Array(elems) | ExprKind::SetLit(elems) => {
                for e in elems {
                    self.refine_expr(e)?;
                }
                self.cx.synth(expr)
            },
            ExprKind::MapLit(pairs) => {
                for (k, v) in pairs {
                    self.refine_expr(k)?;
                    self.refine_expr(v)?;
                }
                self.cx.synth(expr)
            },
            ExprKind::Range {start, end, ..} => {
                if let Some(s) = start {
                    self.refine_expr(s)?;
                }
                if let Some(e) = end {
                    self.refine_expr(e)?;
                }
                self.cx.synth(expr)
            },
            ExprKind::PredicateCheck {subject, args, ..} => {
                for a in args {
                    self.refine_expr(a)?;
                }
                self.refine_expr(subject)?;
                self.cx.synth(expr)
            },
            _ => self.cx.synth(expr)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn refined(source: &str) -> (Program, Inference) {
        let program = parse(source).unwrap();
        let cx = Inference::new();
        cx.infer_program(&program).unwrap();
        refine(&program, &cx).unwrap();
        (program, cx)
    }

    fn fn_sig(cx: &Inference, name: &str) -> (Vec<String>, String) {
        let info = cx.function(name).unwrap();
        let params = info.params
            .iter()
            .map(|p| p.borrow().to_string())
            .collect();
        let ret = info.ret.borrow().to_string();
        (params, ret)
    }

    fn decl_type(program: &Program, index: usize) -> String {
        match &program.body[index].kind {
            StmtKind::VarDecl(decls) => decls[0].ty.borrow().to_string(),
            other => panic!("not a declaration: {:?}", other)
        }
    }

    #[test]
    fn test_arithmetic_refines_weak_param() {
        let (_, cx) = refined("do f(n) { return n + 1 } f(2)");
        assert_eq!(
            fn_sig(&cx, "f"),
            (vec![String::from("int")], String::from("int"))
        );
    }

    #[test]
    fn test_fibonacci_converges_to_int() {
        let (_, cx) = refined(
            "do f(n) { if n <= 1 { return n } return f(n - 1) + f(n - 2) }"
        );
        assert_eq!(
            fn_sig(&cx, "f"),
            (vec![String::from("int")], String::from("int"))
        );
    }

    #[test]
    fn test_method_call_implies_container() {
        let (program, _) = refined("let a = []; a.push(1)");
        assert_eq!(decl_type(&program, 0), "Array<int>");

        let (program, _) = refined("let m = Map(); m.set(1, \"x\")");
        assert_eq!(decl_type(&program, 0), "Map<int, string>");

        let (_, cx) = refined("do touch(s) { s.add(2) } touch(Set())");
        let (params, _) = fn_sig(&cx, "touch");
        assert_eq!(params, vec![String::from("Set<int>")]);
    }

    #[test]
    fn test_indexing_implies_array() {
        let (_, cx) = refined("do first(xs) { return xs[0] } first([5])");
        assert_eq!(
            fn_sig(&cx, "first"),
            (vec![String::from("Array<int>")], String::from("int"))
        );
    }

    #[test]
    fn test_indexed_assignment_refines_elements() {
        let (program, _) = refined("let a = [] ; a[0] = 2");
        assert_eq!(decl_type(&program, 0), "Array<int>");

        let (program, _) = refined("let m = Map(); m[\"k\"] = 1.5");
        assert_eq!(decl_type(&program, 0), "Map<string, float>");
    }

    #[test]
    fn test_container_return_refines_nested() {
        let (_, cx) = refined(
            "do build() { let m = Map(); m.set(1, 2) return m } build()"
        );
        assert_eq!(fn_sig(&cx, "build").1, "Map<int, int>");
    }

    #[test]
    fn test_call_chain_converges() {
        let (_, cx) = refined(
            "do g(x) { return f(x) }
             do f(y) { return y + 1 }
             g(3)"
        );
        assert_eq!(
            fn_sig(&cx, "g"),
            (vec![String::from("int")], String::from("int"))
        );
        assert_eq!(
            fn_sig(&cx, "f"),
            (vec![String::from("int")], String::from("int"))
        );
    }

    #[test]
    fn test_dynamic_is_never_touched() {
        let program = parse("do f(x) { return x == 1 } f(2)").unwrap();
        let cx = Inference::new();
        cx.infer_program(&program).unwrap();
        // Force the parameter slot dynamic before refinement runs.
        let info = cx.function("f").unwrap();
        *info.params[0].borrow_mut() = Node::new(Type::Dynamic);
        refine(&program, &cx).unwrap();
        assert!(info.params[0].borrow().is_dynamic());
    }

    #[test]
    fn test_concrete_slots_never_regress() {
        let (_, cx) = refined(
            "do f(n: int) -> int { return n } f(1)"
        );
        assert_eq!(
            fn_sig(&cx, "f"),
            (vec![String::from("int")], String::from("int"))
        );
    }
}
