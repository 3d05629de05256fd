// (C) 2019 Brandon Lewis
//
// A small-step abstract machine for SchemA.
//
// *Execution model*
//
// The machine is a CEK evaluator: state is a Focus (the control), the
// current Environment, and a stack of Kontinuation frames. Each step
// either decomposes the focused syntax, pushing frames and narrowing
// the focus, or consumes a value under the topmost frame. `run` steps
// to completion; `step` returns after one atomic transition so a
// debugger can interleave observations between any two transitions.
//
// *Ordering*
//
// Operands, arguments, elements and fields are evaluated strictly in
// source order. && and || never evaluate their right operand unless
// the left one requires it. Statements complete by delivering the
// void value to the frame beneath them.
//
// *Control*
//
// `return` is not an error: it is an unwind that pops frames,
// restoring saved environments and closing loop trackers, until the
// nearest call-apply frame. All other aborts are reported through the
// error channel and leave the machine in a snapshot-accessible state.
//
// *Verification*
//
// The invariant engine is invoked cooperatively: at assert/invariant
// statement sites, at turnstile expressions, and at loop iteration
// boundaries, where registered invariants are re-checked (a disposable
// sub-machine sharing the environment chain evaluates the condition)
// and iteration state is recorded for predicate synthesis.

use std::rc::Rc;

use serde::Serialize;

use crate::ast::*;
use crate::trace;
use crate::builtins;
use crate::containers::{LazyRange, MapData, SetData};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::value::{
    expected,
    repr,
    Binding,
    BoundMethod,
    Closure,
    Tag,
    Value
};
use crate::verify::{snapshot as env_snapshot, Predicate, Tracker};


pub type EnvRef = Node<Env<Binding>>;


// What the machine is looking at.
#[derive(Clone, Debug)]
pub enum Focus {
    Stmt(Node<Stmt>),
    Expr(Node<Expr>),
    Value(Value),
    Done
}


// One frame of pending work: what to do with the next value.
#[derive(Debug)]
pub enum Kont {
    Halt,
    StmtSeq {
        stmts: Seq<Stmt>,
        index: usize,
        saved: EnvRef,
        restore: bool
    },
    Declare {
        decls: Rc<Vec<Declarator>>,
        index: usize,
        pos: Pos
    },
    Assign {
        name: String,
        pos: Pos
    },
    AssignIndexObj {
        obj: Node<Expr>,
        index: Node<Expr>
    },
    AssignIndexIdx {
        index: Node<Expr>,
        value: Value
    },
    AssignIndexFinal {
        obj: Value,
        value: Value,
        pos: Pos
    },
    IfCond {
        then: Seq<Stmt>,
        alt: Option<Seq<Stmt>>,
        pos: Pos
    },
    WhileCond {
        cond: Node<Expr>,
        body: Seq<Stmt>,
        pos: Pos
    },
    WhileBody {
        cond: Node<Expr>,
        body: Seq<Stmt>,
        pos: Pos
    },
    UntilCond {
        cond: Node<Expr>,
        body: Seq<Stmt>,
        pos: Pos
    },
    UntilBody {
        cond: Node<Expr>,
        body: Seq<Stmt>,
        pos: Pos
    },
    ForInit {
        var: String,
        body: Seq<Stmt>,
        saved: EnvRef,
        pos: Pos
    },
    ForNext {
        var: String,
        iter: MachineIter,
        body: Seq<Stmt>,
        saved: EnvRef,
        pos: Pos
    },
    Return {
        pos: Pos
    },
    BinopLeft {
        op: BinOp,
        right: Node<Expr>,
        pos: Pos
    },
    BinopRight {
        op: BinOp,
        left: Value,
        pos: Pos
    },
    And {
        right: Node<Expr>,
        pos: Pos
    },
    Or {
        right: Node<Expr>,
        pos: Pos
    },
    Unary {
        op: UnOp,
        pos: Pos
    },
    CallCallee {
        args: Seq<Expr>,
        pos: Pos
    },
    CallArgs {
        callee: Value,
        done: Vec<Value>,
        remaining: Vec<Node<Expr>>,
        pos: Pos
    },
    CallApply {
        saved: EnvRef
    },
    Member {
        prop: String,
        pos: Pos
    },
    IndexObj {
        index: Node<Expr>,
        pos: Pos
    },
    IndexIdx {
        obj: Value,
        pos: Pos
    },
    ArrayLit {
        done: Vec<Value>,
        remaining: Vec<Node<Expr>>
    },
    SetLitK {
        done: Vec<Value>,
        remaining: Vec<Node<Expr>>
    },
    MapKey {
        done: Vec<(Value, Value)>,
        value: Node<Expr>,
        remaining: Vec<(Node<Expr>, Node<Expr>)>
    },
    MapValue {
        done: Vec<(Value, Value)>,
        key: Value,
        remaining: Vec<(Node<Expr>, Node<Expr>)>
    },
    RangeStart {
        end: Option<Node<Expr>>,
        inclusive: bool,
        // Finite ranges normally materialize to eager arrays; in index
        // position they stay lazy so slicing can clamp.
        materialize: bool,
        pos: Pos
    },
    RangeEnd {
        start: Option<Value>,
        inclusive: bool,
        materialize: bool,
        pos: Pos
    },
    ExprStmt,
    TypeOfK,
    InvariantCheck {
        message: Option<String>,
        pos: Pos,
        saved: EnvRef
    },
    AssertCheck {
        message: Option<String>,
        pos: Pos,
        saved: EnvRef
    },
    PredicateArgs {
        name: String,
        subject: Node<Expr>,
        done: Vec<Value>,
        remaining: Vec<Node<Expr>>,
        pos: Pos
    },
    PredicateCheckK {
        name: String,
        args: Vec<Value>,
        subject: Node<Expr>,
        pos: Pos
    }
}


// The iteration contract: arrays iterate over an eager snapshot, sets
// materialize their members, lazy ranges generate (possibly without
// bound).
#[derive(Debug)]
pub enum MachineIter {
    Seq(std::vec::IntoIter<Value>),
    Range {
        next: i64,
        end: Option<i64>,
        inclusive: bool
    }
}

impl MachineIter {
    fn next(&mut self) -> Option<Value> {
        match self {
            MachineIter::Seq(items) => items.next(),
            MachineIter::Range {next, end, inclusive} => {
                if let Some(end) = end {
                    let stop = if *inclusive { *end + 1 } else { *end };
                    if *next >= stop {
                        return None;
                    }
                }
                let item = Value::Int(*next);
                *next += 1;
                Some(item)
            }
        }
    }
}

fn get_iterator(value: &Value) -> Result<MachineIter> {
    match value {
        Value::Array(items) => {
            Ok(MachineIter::Seq(items.borrow().clone().into_iter()))
        },
        Value::Set(s) => {
            Ok(MachineIter::Seq(s.borrow().values().to_vec().into_iter()))
        },
        Value::Range(r) => Ok(MachineIter::Range {
            next: r.start,
            end: r.end,
            inclusive: r.inclusive
        }),
        other => Err(expected(
            Tag::Array | Tag::Set | Tag::Range,
            other
        ))
    }
}


// One observable machine state, cheap enough to emit per step and
// serializable for debugger front-ends.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub focus: String,
    // Visible non-function bindings, one `name = value` per line.
    pub env: Vec<String>,
    pub kont_depth: usize,
    pub output: Vec<String>,
    pub finished: bool,
    pub line: u32,
    pub column: u32
}


// The entire machine state.
pub struct Machine {
    env: EnvRef,
    focus: Focus,
    kont: Vec<Kont>,
    output: Vec<String>,
    trackers: Vec<Tracker>,
    last_pos: Pos,
    result: Option<Value>
}

impl Machine {
    pub fn new() -> Machine {
        let env: EnvRef = Env::root();
        builtins::install(&env);
        Machine {
            env,
            focus: Focus::Done,
            kont: Vec::new(),
            output: Vec::new(),
            trackers: Vec::new(),
            last_pos: Pos::new(1, 1),
            result: None
        }
    }

    // Reset and point the machine at a program. Built-ins live in the
    // root frame; top-level declarations join them as they execute.
    pub fn initialize(&mut self, program: &Program) {
        let env: EnvRef = Env::root();
        builtins::install(&env);
        self.env = env;
        self.output.clear();
        self.trackers.clear();
        self.result = None;
        self.kont = vec![Kont::Halt];
        match program.body.first() {
            Some(first) => {
                self.kont.push(Kont::StmtSeq {
                    stmts: program.body.clone(),
                    index: 1,
                    saved: self.env.clone(),
                    restore: false
                });
                self.focus = Focus::Stmt(first.clone());
                self.last_pos = first.pos;
            },
            None => {
                self.focus = Focus::Done;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.focus, Focus::Done)
    }

    pub fn get_environment(&self) -> &EnvRef {
        &self.env
    }

    pub fn get_output(&self) -> &[String] {
        &self.output
    }

    pub fn get_state(&self) -> Snapshot {
        let focus = match &self.focus {
            Focus::Stmt(s) => format!("stmt {}", stmt_name(&s.kind)),
            Focus::Expr(e) => format!("expr {}", expr_name(&e.kind)),
            Focus::Value(v) => format!("value {}", repr(v)),
            Focus::Done => String::from("done")
        };
        Snapshot {
            focus,
            env: env_snapshot(&self.env),
            kont_depth: self.kont.len(),
            output: self.output.clone(),
            finished: self.is_finished(),
            line: self.last_pos.line,
            column: self.last_pos.column
        }
    }

    // Run the program to completion and hand back the output lines.
    pub fn run(&mut self) -> Result<Vec<String>> {
        while !self.is_finished() {
            self.step()?;
        }
        Ok(self.output.clone())
    }

    // Single atomic transition. On error the pre-step focus is
    // restored so debuggers can display the failing state.
    pub fn step(&mut self) -> Result<Snapshot> {
        let focus = std::mem::replace(&mut self.focus, Focus::Done);
        let backup = focus.clone();
        let stepped = match focus {
            Focus::Stmt(s) => {
                self.last_pos = s.pos;
                trace!("step stmt {}", stmt_name(&s.kind));
                self.step_stmt(s)
            },
            Focus::Expr(e) => {
                self.last_pos = e.pos;
                trace!("step expr {}", expr_name(&e.kind));
                self.step_expr(e)
            },
            Focus::Value(v) => self.apply(v),
            Focus::Done => Ok(())
        };
        match stepped {
            Ok(()) => Ok(self.get_state()),
            Err(e) => {
                self.focus = backup;
                Err(e)
            }
        }
    }

    // Evaluate an expression to a value in a disposable sub-machine
    // sharing this machine's environment chain. Used for invariant
    // re-checks at loop boundaries.
    fn eval_sub(&mut self, expr: &Node<Expr>) -> Result<Value> {
        let mut sub = Machine {
            env: self.env.clone(),
            focus: Focus::Expr(expr.clone()),
            kont: vec![Kont::Halt],
            output: Vec::new(),
            trackers: Vec::new(),
            last_pos: expr.pos,
            result: None
        };
        while !sub.is_finished() {
            sub.step()?;
        }
        self.output.extend(sub.output);
        sub.result
            .ok_or_else(|| Error::internal("sub-machine yielded no value"))
    }

    fn enter_block(&mut self, stmts: &Seq<Stmt>, restore: bool) {
        match stmts.first() {
            None => {
                self.focus = Focus::Value(Value::Void);
            },
            Some(first) => {
                let saved = self.env.clone();
                self.env = Env::chain(&saved);
                self.kont.push(Kont::StmtSeq {
                    stmts: stmts.clone(),
                    index: 1,
                    saved,
                    restore
                });
                self.focus = Focus::Stmt(first.clone());
            }
        }
    }

    fn step_stmt(&mut self, stmt: Node<Stmt>) -> Result<()> {
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Function(f) => {
                let value = Value::Closure(Rc::new(Closure {
                    decl: f.clone(),
                    env: self.env.clone()
                }));
                let ty = value.static_type();
                self.env.define(&f.name, Binding::new(value, ty));
                self.focus = Focus::Value(Value::Void);
                Ok(())
            },
            StmtKind::VarDecl(decls) => {
                let first = decls
                    .first()
                    .ok_or_else(|| Error::internal("empty declaration"))?;
                self.kont.push(Kont::Declare {
                    decls: decls.clone(),
                    index: 0,
                    pos
                });
                self.focus = Focus::Expr(first.init.clone());
                Ok(())
            },
            StmtKind::Assign(target, value) => {
                match target {
                    AssignTarget::Ident(name) => {
                        if name == "_" {
                            return Err(Error::name(
                                "`_` can never be assigned",
                                pos
                            ));
                        }
                        self.kont.push(Kont::Assign {
                            name: name.clone(),
                            pos
                        });
                    },
                    AssignTarget::Index(obj, idx) => {
                        self.kont.push(Kont::AssignIndexObj {
                            obj: obj.clone(),
                            index: idx.clone()
                        });
                    }
                }
                self.focus = Focus::Expr(value.clone());
                Ok(())
            },
            StmtKind::If {cond, then, alt} => {
                self.kont.push(Kont::IfCond {
                    then: then.clone(),
                    alt: alt.clone(),
                    pos: cond.pos
                });
                self.focus = Focus::Expr(cond.clone());
                Ok(())
            },
            StmtKind::While {cond, body} => {
                let mut tracker = Tracker::new("while");
                tracker.record_state(&self.env);
                self.trackers.push(tracker);
                self.kont.push(Kont::WhileCond {
                    cond: cond.clone(),
                    body: body.clone(),
                    pos: cond.pos
                });
                self.focus = Focus::Expr(cond.clone());
                Ok(())
            },
            StmtKind::Until {cond, body} => {
                let mut tracker = Tracker::new("until");
                tracker.record_state(&self.env);
                self.trackers.push(tracker);
                self.kont.push(Kont::UntilCond {
                    cond: cond.clone(),
                    body: body.clone(),
                    pos: cond.pos
                });
                self.focus = Focus::Expr(cond.clone());
                Ok(())
            },
            StmtKind::For {var, iter, body} => {
                let mut tracker = Tracker::new("for");
                tracker.record_state(&self.env);
                self.trackers.push(tracker);
                self.kont.push(Kont::ForInit {
                    var: var.clone(),
                    body: body.clone(),
                    saved: self.env.clone(),
                    pos: iter.pos
                });
                self.focus = Focus::Expr(iter.clone());
                Ok(())
            },
            StmtKind::Return(arg) => {
                self.kont.push(Kont::Return {pos});
                self.focus = match arg {
                    Some(e) => Focus::Expr(e.clone()),
                    None => Focus::Value(Value::Void)
                };
                Ok(())
            },
            StmtKind::Block(body) => {
                self.enter_block(body, true);
                Ok(())
            },
            StmtKind::Expr(e) => {
                self.kont.push(Kont::ExprStmt);
                self.focus = Focus::Expr(e.clone());
                Ok(())
            },
            StmtKind::Invariant {cond, message} => {
                if let Some(tracker) = self.trackers.last_mut() {
                    tracker.register_invariant(cond, message, pos);
                }
                self.kont.push(Kont::InvariantCheck {
                    message: message.clone(),
                    pos,
                    saved: self.env.clone()
                });
                self.focus = Focus::Expr(cond.clone());
                Ok(())
            },
            StmtKind::Assert {cond, message} => {
                self.kont.push(Kont::AssertCheck {
                    message: message.clone(),
                    pos,
                    saved: self.env.clone()
                });
                self.focus = Focus::Expr(cond.clone());
                Ok(())
            }
        }
    }

    fn step_expr(&mut self, expr: Node<Expr>) -> Result<()> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(n) => {
                self.focus = Focus::Value(Value::Int(*n));
                Ok(())
            },
            ExprKind::Float(x) => {
                self.focus = Focus::Value(Value::Float(*x));
                Ok(())
            },
            ExprKind::Str(s) => {
                self.focus =
                    Focus::Value(Value::Str(Rc::new(s.clone())));
                Ok(())
            },
            ExprKind::Bool(b) => {
                self.focus = Focus::Value(Value::Bool(*b));
                Ok(())
            },
            ExprKind::Ident(name) => {
                if name == "_" {
                    return Err(Error::name("`_` can never be read", pos));
                }
                match self.env.get(name) {
                    Some(binding) => {
                        self.focus = Focus::Value(binding.value);
                        Ok(())
                    },
                    None => Err(Error::name(
                        format!("undefined variable `{}`", name),
                        pos
                    ))
                }
            },
            ExprKind::MetaIdent(name) => {
                self.focus = Focus::Value(Value::Pred(Rc::new(
                    Predicate::new(name.clone(), vec![])
                )));
                Ok(())
            },
            ExprKind::Array(elems) => {
                match elems.first() {
                    None => {
                        self.focus = Focus::Value(Value::Array(Rc::new(
                            std::cell::RefCell::new(Vec::new())
                        )));
                    },
                    Some(first) => {
                        self.kont.push(Kont::ArrayLit {
                            done: Vec::new(),
                            remaining: elems[1..].to_vec()
                        });
                        self.focus = Focus::Expr(first.clone());
                    }
                }
                Ok(())
            },
            ExprKind::SetLit(elems) => {
                match elems.first() {
                    None => {
                        self.focus = Focus::Value(Value::Set(Rc::new(
                            std::cell::RefCell::new(SetData::new())
                        )));
                    },
                    Some(first) => {
                        self.kont.push(Kont::SetLitK {
                            done: Vec::new(),
                            remaining: elems[1..].to_vec()
                        });
                        self.focus = Focus::Expr(first.clone());
                    }
                }
                Ok(())
            },
            ExprKind::MapLit(pairs) => {
                match pairs.first() {
                    None => {
                        self.focus = Focus::Value(Value::Map(Rc::new(
                            std::cell::RefCell::new(MapData::new())
                        )));
                    },
                    Some((k, v)) => {
                        self.kont.push(Kont::MapKey {
                            done: Vec::new(),
                            value: v.clone(),
                            remaining: pairs[1..].to_vec()
                        });
                        self.focus = Focus::Expr(k.clone());
                    }
                }
                Ok(())
            },
            ExprKind::Binary(op, l, r) => {
                match op {
                    BinOp::And => self.kont.push(Kont::And {
                        right: r.clone(),
                        pos
                    }),
                    BinOp::Or => self.kont.push(Kont::Or {
                        right: r.clone(),
                        pos
                    }),
                    _ => self.kont.push(Kont::BinopLeft {
                        op: *op,
                        right: r.clone(),
                        pos
                    })
                }
                self.focus = Focus::Expr(l.clone());
                Ok(())
            },
            ExprKind::Unary(op, operand) => {
                self.kont.push(Kont::Unary {op: *op, pos});
                self.focus = Focus::Expr(operand.clone());
                Ok(())
            },
            ExprKind::Call(callee, args) => {
                self.kont.push(Kont::CallCallee {
                    args: args.clone(),
                    pos
                });
                self.focus = Focus::Expr(callee.clone());
                Ok(())
            },
            ExprKind::Member(obj, prop) => {
                self.kont.push(Kont::Member {
                    prop: prop.clone(),
                    pos
                });
                self.focus = Focus::Expr(obj.clone());
                Ok(())
            },
            ExprKind::Index(obj, idx) => {
                self.kont.push(Kont::IndexObj {
                    index: idx.clone(),
                    pos
                });
                self.focus = Focus::Expr(obj.clone());
                Ok(())
            },
            ExprKind::Range {..} => self.step_range(&expr, true),
            ExprKind::TypeOf(operand) => {
                self.kont.push(Kont::TypeOfK);
                self.focus = Focus::Expr(operand.clone());
                Ok(())
            },
            ExprKind::PredicateCheck {subject, name, args} => {
                match args.first() {
                    Some(first) => {
                        self.kont.push(Kont::PredicateArgs {
                            name: name.clone(),
                            subject: subject.clone(),
                            done: Vec::new(),
                            remaining: args[1..].to_vec(),
                            pos
                        });
                        self.focus = Focus::Expr(first.clone());
                    },
                    None => {
                        self.kont.push(Kont::PredicateCheckK {
                            name: name.clone(),
                            args: Vec::new(),
                            subject: subject.clone(),
                            pos
                        });
                        self.focus = Focus::Expr(subject.clone());
                    }
                }
                Ok(())
            }
        }
    }

    fn step_range(
        &mut self,
        expr: &Node<Expr>,
        materialize: bool
    ) -> Result<()> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Range {start, end, inclusive} => {
                match start {
                    Some(s) => {
                        self.kont.push(Kont::RangeStart {
                            end: end.clone(),
                            inclusive: *inclusive,
                            materialize,
                            pos
                        });
                        self.focus = Focus::Expr(s.clone());
                    },
                    None => {
                        let e = end.clone().ok_or_else(|| {
                            Error::internal("range with no endpoints")
                        })?;
                        self.kont.push(Kont::RangeEnd {
                            start: None,
                            inclusive: *inclusive,
                            materialize,
                            pos
                        });
                        self.focus = Focus::Expr(e);
                    }
                }
                Ok(())
            },
            _ => Err(Error::internal("step_range on a non-range"))
        }
    }

    // Close the innermost loop: pop its tracker, synthesize candidate
    // refinements, and merge them into the surviving bindings.
    fn close_loop(&mut self) -> Result<()> {
        let tracker = self
            .trackers
            .pop()
            .ok_or_else(|| Error::internal("tracker stack underflow"))?;
        for (name, predicates) in tracker.synthesize() {
            if let Some(mut binding) = self.env.get(&name) {
                for p in predicates {
                    let key = p.render();
                    if !binding
                        .refinements
                        .iter()
                        .any(|q| q.render() == key)
                    {
                        binding.refinements.push(p);
                    }
                }
                self.env.set(&name, binding);
            }
        }
        Ok(())
    }

    // Re-check every invariant registered with the active tracker.
    fn recheck_invariants(&mut self) -> Result<()> {
        let invariants = match self.trackers.last() {
            Some(t) => t.invariants(),
            None => return Ok(())
        };
        for inv in invariants {
            let value = self.eval_sub(&inv.cond)?;
            let holds = value.truthy().map_err(|e| e.at(inv.pos))?;
            if !holds {
                let message = inv
                    .message
                    .clone()
                    .unwrap_or_else(|| String::from("invariant violated"));
                return Err(Error::verification(
                    message,
                    inv.pos,
                    env_snapshot(&self.env)
                ));
            }
        }
        Ok(())
    }

    fn advance_for(
        &mut self,
        var: String,
        mut iter: MachineIter,
        body: Seq<Stmt>,
        saved: EnvRef,
        pos: Pos
    ) -> Result<()> {
        match iter.next() {
            Some(item) => {
                // The loop variable is rebound exactly once per
                // iteration, in a fresh child of the loop's
                // environment.
                let child = Env::chain(&saved);
                child.define(&var, Binding::of(item));
                self.env = child;
                let first = body.first().cloned();
                self.kont.push(Kont::ForNext {
                    var,
                    iter,
                    body: body.clone(),
                    saved,
                    pos
                });
                match first {
                    Some(first) => {
                        self.kont.push(Kont::StmtSeq {
                            stmts: body,
                            index: 1,
                            saved: self.env.clone(),
                            restore: false
                        });
                        self.focus = Focus::Stmt(first);
                    },
                    None => {
                        self.focus = Focus::Value(Value::Void);
                    }
                }
                Ok(())
            },
            None => {
                self.env = saved;
                self.close_loop()?;
                self.focus = Focus::Value(Value::Void);
                Ok(())
            }
        }
    }

    fn invoke_call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        pos: Pos
    ) -> Result<()> {
        match callee {
            Value::Native(native) => {
                let result =
                    builtins::native_call(native.name, &args, &mut self.output)
                        .map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Value::Bound(bound) => {
                let result =
                    builtins::invoke(&bound.recv, &bound.method, &args)
                        .map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Value::Pred(p) => {
                // Curried predicate construction.
                let mut all = p.args.clone();
                all.extend(args);
                self.focus = Focus::Value(Value::Pred(Rc::new(
                    Predicate::new(p.name.clone(), all)
                )));
                Ok(())
            },
            Value::Closure(closure) => {
                let params = &closure.decl.params;
                if params.len() != args.len() {
                    return Err(Error::type_error(
                        format!(
                            "{} expects {} argument(s), got {}",
                            closure.decl.name,
                            params.len(),
                            args.len()
                        ),
                        pos
                    ));
                }
                let child = Env::chain(&closure.env);
                for (param, arg) in params.iter().zip(args) {
                    child.define(
                        &param.name,
                        Binding::new(arg, param.ty.borrow().clone())
                    );
                }
                self.kont.push(Kont::CallApply {
                    saved: self.env.clone()
                });
                self.env = child;
                match closure.decl.body.first() {
                    Some(first) => {
                        self.kont.push(Kont::StmtSeq {
                            stmts: closure.decl.body.clone(),
                            index: 1,
                            saved: self.env.clone(),
                            restore: false
                        });
                        self.focus = Focus::Stmt(first.clone());
                    },
                    None => {
                        self.focus = Focus::Value(Value::Void);
                    }
                }
                Ok(())
            },
            other => Err(expected(
                enumflags2::BitFlags::from_flag(Tag::Function),
                &other
            )
            .at(pos))
        }
    }

    // Return unwinding: pop frames, restoring environments and closing
    // loops, until the nearest call boundary.
    fn unwind(&mut self, value: Value, pos: Pos) -> Result<()> {
        loop {
            match self.kont.pop() {
                None | Some(Kont::Halt) => {
                    return Err(Error::type_error(
                        "return outside of a function",
                        pos
                    ));
                },
                Some(Kont::CallApply {saved}) => {
                    self.env = saved;
                    self.focus = Focus::Value(value);
                    return Ok(());
                },
                Some(Kont::StmtSeq {saved, restore, ..}) => {
                    if restore {
                        self.env = saved;
                    }
                },
                Some(Kont::WhileBody {..}) | Some(Kont::UntilBody {..}) => {
                    // The body completed by escaping: invariants still
                    // get their after-body check before the loop closes.
                    if let Some(t) = self.trackers.last_mut() {
                        t.record_state(&self.env);
                    }
                    self.recheck_invariants()?;
                    self.close_loop()?;
                },
                Some(Kont::ForNext {saved, ..}) => {
                    if let Some(t) = self.trackers.last_mut() {
                        t.record_state(&self.env);
                    }
                    self.recheck_invariants()?;
                    self.env = saved;
                    self.close_loop()?;
                },
                Some(_) => {}
            }
        }
    }

    fn apply(&mut self, value: Value) -> Result<()> {
        let frame = self
            .kont
            .pop()
            .ok_or_else(|| Error::internal("missing continuation"))?;
        match frame {
            Kont::Halt => {
                self.result = Some(value);
                self.focus = Focus::Done;
                Ok(())
            },
            Kont::StmtSeq {stmts, index, saved, restore} => {
                if index < stmts.len() {
                    let next = stmts[index].clone();
                    self.kont.push(Kont::StmtSeq {
                        stmts,
                        index: index + 1,
                        saved,
                        restore
                    });
                    self.focus = Focus::Stmt(next);
                } else {
                    if restore {
                        self.env = saved;
                    }
                    self.focus = Focus::Value(Value::Void);
                }
                Ok(())
            },
            Kont::Declare {decls, index, pos} => {
                let decl = &decls[index];
                if decl.name == "_" {
                    return Err(Error::name("`_` can never be bound", pos));
                }
                self.env.define(
                    &decl.name,
                    Binding::new(value, decl.ty.borrow().clone())
                );
                match decls.get(index + 1) {
                    Some(next) => {
                        let init = next.init.clone();
                        self.kont.push(Kont::Declare {
                            decls,
                            index: index + 1,
                            pos
                        });
                        self.focus = Focus::Expr(init);
                    },
                    None => {
                        self.focus = Focus::Value(Value::Void);
                    }
                }
                Ok(())
            },
            Kont::Assign {name, pos} => {
                let mut binding = self.env.get(&name).ok_or_else(|| {
                    Error::name(
                        format!("undefined variable `{}`", name),
                        pos
                    )
                })?;
                binding.value = value;
                self.env.set(&name, binding);
                self.focus = Focus::Value(Value::Void);
                Ok(())
            },
            Kont::AssignIndexObj {obj, index} => {
                self.kont.push(Kont::AssignIndexIdx {
                    index,
                    value
                });
                self.focus = Focus::Expr(obj);
                Ok(())
            },
            Kont::AssignIndexIdx {index, value: rhs} => {
                self.kont.push(Kont::AssignIndexFinal {
                    obj: value,
                    value: rhs,
                    pos: index.pos
                });
                self.focus = Focus::Expr(index);
                Ok(())
            },
            Kont::AssignIndexFinal {obj, value: rhs, pos} => {
                index_store(&obj, &value, rhs).map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(Value::Void);
                Ok(())
            },
            Kont::IfCond {then, alt, pos} => {
                let test = value.truthy().map_err(|e| e.at(pos))?;
                if test {
                    self.enter_block(&then, true);
                } else {
                    match alt {
                        Some(alt) => self.enter_block(&alt, true),
                        None => {
                            self.focus = Focus::Value(Value::Void);
                        }
                    }
                }
                Ok(())
            },
            Kont::WhileCond {cond, body, pos} => {
                let test = value.truthy().map_err(|e| e.at(pos))?;
                if test {
                    self.recheck_invariants()?;
                    self.kont.push(Kont::WhileBody {cond, body: body.clone(), pos});
                    self.enter_block(&body, true);
                } else {
                    self.close_loop()?;
                    self.focus = Focus::Value(Value::Void);
                }
                Ok(())
            },
            Kont::WhileBody {cond, body, pos} => {
                if let Some(t) = self.trackers.last_mut() {
                    t.record_state(&self.env);
                }
                self.recheck_invariants()?;
                self.kont.push(Kont::WhileCond {
                    cond: cond.clone(),
                    body,
                    pos
                });
                self.focus = Focus::Expr(cond);
                Ok(())
            },
            Kont::UntilCond {cond, body, pos} => {
                let test = value.truthy().map_err(|e| e.at(pos))?;
                if !test {
                    self.recheck_invariants()?;
                    self.kont.push(Kont::UntilBody {cond, body: body.clone(), pos});
                    self.enter_block(&body, true);
                } else {
                    self.close_loop()?;
                    self.focus = Focus::Value(Value::Void);
                }
                Ok(())
            },
            Kont::UntilBody {cond, body, pos} => {
                if let Some(t) = self.trackers.last_mut() {
                    t.record_state(&self.env);
                }
                self.recheck_invariants()?;
                self.kont.push(Kont::UntilCond {
                    cond: cond.clone(),
                    body,
                    pos
                });
                self.focus = Focus::Expr(cond);
                Ok(())
            },
            Kont::ForInit {var, body, saved, pos} => {
                let iter = get_iterator(&value).map_err(|e| e.at(pos))?;
                self.advance_for(var, iter, body, saved, pos)
            },
            Kont::ForNext {var, iter, body, saved, pos} => {
                if let Some(t) = self.trackers.last_mut() {
                    t.record_state(&self.env);
                }
                self.recheck_invariants()?;
                self.env = saved.clone();
                self.advance_for(var, iter, body, saved, pos)
            },
            Kont::Return {pos} => self.unwind(value, pos),
            Kont::BinopLeft {op, right, pos} => {
                self.kont.push(Kont::BinopRight {
                    op,
                    left: value,
                    pos
                });
                self.focus = Focus::Expr(right);
                Ok(())
            },
            Kont::BinopRight {op, left, pos} => {
                let result = crate::value::binop(op, &left, &value)
                    .map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Kont::And {right, pos} => {
                let test = value.truthy().map_err(|e| e.at(pos))?;
                if test {
                    self.focus = Focus::Expr(right);
                } else {
                    self.focus = Focus::Value(Value::Bool(false));
                }
                Ok(())
            },
            Kont::Or {right, pos} => {
                let test = value.truthy().map_err(|e| e.at(pos))?;
                if test {
                    self.focus = Focus::Value(Value::Bool(true));
                } else {
                    self.focus = Focus::Expr(right);
                }
                Ok(())
            },
            Kont::Unary {op, pos} => {
                let result = match op {
                    UnOp::Neg => value.neg(),
                    UnOp::Not => value.not()
                }
                .map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Kont::CallCallee {args, pos} => match args.first() {
                Some(first) => {
                    self.kont.push(Kont::CallArgs {
                        callee: value,
                        done: Vec::new(),
                        remaining: args[1..].to_vec(),
                        pos
                    });
                    self.focus = Focus::Expr(first.clone());
                    Ok(())
                },
                None => self.invoke_call(value, Vec::new(), pos)
            },
            Kont::CallArgs {callee, mut done, mut remaining, pos} => {
                done.push(value);
                if remaining.is_empty() {
                    self.invoke_call(callee, done, pos)
                } else {
                    let next = remaining.remove(0);
                    self.kont.push(Kont::CallArgs {
                        callee,
                        done,
                        remaining,
                        pos
                    });
                    self.focus = Focus::Expr(next);
                    Ok(())
                }
            },
            Kont::CallApply {saved} => {
                self.env = saved;
                self.focus = Focus::Value(value);
                Ok(())
            },
            Kont::Member {prop, pos} => {
                match &value {
                    // Records are plain field reads.
                    Value::Record(fields) => {
                        let field = fields
                            .iter()
                            .find(|(n, _)| *n == prop)
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| {
                                Error::index(format!(
                                    "record field `{}` not present",
                                    prop
                                ))
                                .at(pos)
                            })?;
                        self.focus = Focus::Value(field);
                    },
                    _ => {
                        self.focus =
                            Focus::Value(Value::Bound(Rc::new(BoundMethod {
                                recv: value,
                                method: prop
                            })));
                    }
                }
                Ok(())
            },
            Kont::IndexObj {index, pos} => {
                self.kont.push(Kont::IndexIdx {obj: value, pos});
                if matches!(index.kind, ExprKind::Range {..}) {
                    self.step_range(&index, false)
                } else {
                    self.focus = Focus::Expr(index);
                    Ok(())
                }
            },
            Kont::IndexIdx {obj, pos} => {
                let result =
                    index_value(&obj, &value).map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Kont::ArrayLit {mut done, mut remaining} => {
                done.push(value);
                if remaining.is_empty() {
                    self.focus = Focus::Value(Value::Array(Rc::new(
                        std::cell::RefCell::new(done)
                    )));
                } else {
                    let next = remaining.remove(0);
                    self.kont.push(Kont::ArrayLit {done, remaining});
                    self.focus = Focus::Expr(next);
                }
                Ok(())
            },
            Kont::SetLitK {mut done, mut remaining} => {
                done.push(value);
                if remaining.is_empty() {
                    let mut set = SetData::new();
                    for item in done {
                        set.add(item);
                    }
                    self.focus = Focus::Value(Value::Set(Rc::new(
                        std::cell::RefCell::new(set)
                    )));
                } else {
                    let next = remaining.remove(0);
                    self.kont.push(Kont::SetLitK {done, remaining});
                    self.focus = Focus::Expr(next);
                }
                Ok(())
            },
            Kont::MapKey {done, value: value_expr, remaining} => {
                self.kont.push(Kont::MapValue {
                    done,
                    key: value,
                    remaining
                });
                self.focus = Focus::Expr(value_expr);
                Ok(())
            },
            Kont::MapValue {mut done, key, mut remaining} => {
                done.push((key, value));
                if remaining.is_empty() {
                    let mut map = MapData::new();
                    for (k, v) in done {
                        map.set(k, v);
                    }
                    self.focus = Focus::Value(Value::Map(Rc::new(
                        std::cell::RefCell::new(map)
                    )));
                } else {
                    let (k, v) = remaining.remove(0);
                    self.kont.push(Kont::MapKey {
                        done,
                        value: v,
                        remaining
                    });
                    self.focus = Focus::Expr(k);
                }
                Ok(())
            },
            Kont::RangeStart {end, inclusive, materialize, pos} => match end {
                Some(e) => {
                    self.kont.push(Kont::RangeEnd {
                        start: Some(value),
                        inclusive,
                        materialize,
                        pos
                    });
                    self.focus = Focus::Expr(e);
                    Ok(())
                },
                None => match value {
                    Value::Int(start) => {
                        self.focus =
                            Focus::Value(Value::Range(Rc::new(LazyRange {
                                start,
                                end: None,
                                inclusive: false
                            })));
                        Ok(())
                    },
                    other => Err(expected(
                        enumflags2::BitFlags::from_flag(Tag::Int),
                        &other
                    )
                    .at(pos))
                }
            },
            Kont::RangeEnd {start, inclusive, materialize, pos} => {
                let result = make_range(start, value, inclusive, materialize)
                    .map_err(|e| e.at(pos))?;
                self.focus = Focus::Value(result);
                Ok(())
            },
            Kont::ExprStmt => {
                self.focus = Focus::Value(Value::Void);
                Ok(())
            },
            Kont::TypeOfK => {
                self.focus = Focus::Value(Value::Str(Rc::new(
                    String::from(value.get_type().name())
                )));
                Ok(())
            },
            Kont::InvariantCheck {message, pos, saved} => {
                let holds = value.truthy().map_err(|e| e.at(pos))?;
                if holds {
                    self.focus = Focus::Value(Value::Void);
                    Ok(())
                } else {
                    Err(Error::verification(
                        message.unwrap_or_else(|| {
                            String::from("invariant violated")
                        }),
                        pos,
                        env_snapshot(&saved)
                    ))
                }
            },
            Kont::AssertCheck {message, pos, saved} => {
                let holds = value.truthy().map_err(|e| e.at(pos))?;
                if holds {
                    self.focus = Focus::Value(Value::Void);
                    Ok(())
                } else {
                    Err(Error::verification(
                        message.unwrap_or_else(|| {
                            String::from("assertion failed")
                        }),
                        pos,
                        env_snapshot(&saved)
                    ))
                }
            },
            Kont::PredicateArgs {
                name,
                subject,
                mut done,
                mut remaining,
                pos
            } => {
                done.push(value);
                if remaining.is_empty() {
                    self.kont.push(Kont::PredicateCheckK {
                        name,
                        args: done,
                        subject: subject.clone(),
                        pos
                    });
                    self.focus = Focus::Expr(subject);
                } else {
                    let next = remaining.remove(0);
                    self.kont.push(Kont::PredicateArgs {
                        name,
                        subject,
                        done,
                        remaining,
                        pos
                    });
                    self.focus = Focus::Expr(next);
                }
                Ok(())
            },
            Kont::PredicateCheckK {name, args, subject, pos} => {
                let predicate = Predicate::new(name, args);
                let held =
                    predicate.eval(&value).map_err(|e| e.at(pos))?;
                if let Some(bound_name) = subject.ident_name() {
                    if let Some(tracker) = self.trackers.last_mut() {
                        tracker.observe_check(bound_name, &predicate, held);
                    }
                }
                self.focus = Focus::Value(Value::Bool(held));
                Ok(())
            }
        }
    }

}


fn index_store(obj: &Value, index: &Value, rhs: Value) -> Result<()> {
    match (obj, index) {
        (Value::Array(items), Value::Int(n)) => {
            let mut items = items.borrow_mut();
            let n = *n;
            if n < 0 || n as usize >= items.len() {
                return Err(Error::index(format!(
                    "array index {} out of range for length {}",
                    n,
                    items.len()
                )));
            }
            items[n as usize] = rhs;
            Ok(())
        },
        (Value::Map(m), key) => {
            m.borrow_mut().set(key.clone(), rhs);
            Ok(())
        },
        (other, _) => Err(expected(Tag::Array | Tag::Map, other))
    }
}


fn index_value(obj: &Value, index: &Value) -> Result<Value> {
    match (obj, index) {
        (Value::Array(items), Value::Int(n)) => {
            let items = items.borrow();
            let n = *n;
            if n < 0 || n as usize >= items.len() {
                return Err(Error::index(format!(
                    "array index {} out of range for length {}",
                    n,
                    items.len()
                )));
            }
            Ok(items[n as usize].clone())
        },
        // A bounded range slices, clamped to [0, length].
        (Value::Array(items), Value::Range(r)) => {
            let items = items.borrow();
            let end = r.end.ok_or_else(|| {
                Error::index("cannot slice with an unbounded range")
            })?;
            let stop = if r.inclusive { end + 1 } else { end };
            let lo = r.start.max(0).min(items.len() as i64) as usize;
            let hi = stop.max(0).min(items.len() as i64) as usize;
            let slice: Vec<Value> = if lo < hi {
                items[lo..hi].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::Array(Rc::new(std::cell::RefCell::new(slice))))
        },
        (Value::Array(items), Value::Array(indices)) => {
            let items = items.borrow();
            let mut picked = Vec::new();
            for idx in indices.borrow().iter() {
                match idx {
                    Value::Int(n) => {
                        let n = *n;
                        if n < 0 || n as usize >= items.len() {
                            return Err(Error::index(format!(
                                "array index {} out of range for length {}",
                                n,
                                items.len()
                            )));
                        }
                        picked.push(items[n as usize].clone());
                    },
                    other => {
                        return Err(expected(
                            enumflags2::BitFlags::from_flag(Tag::Int),
                            other
                        ))
                    }
                }
            }
            Ok(Value::Array(Rc::new(std::cell::RefCell::new(picked))))
        },
        (Value::Map(m), key) => m.borrow().get(key).ok_or_else(|| {
            Error::index(format!("key {} not found", repr(key)))
        }),
        (Value::Tuple(elems), Value::Int(n)) => {
            let n = *n;
            if n < 0 || n as usize >= elems.len() {
                return Err(Error::index(format!(
                    "tuple index {} out of range",
                    n
                )));
            }
            Ok(elems[n as usize].clone())
        },
        (Value::Record(fields), Value::Str(name)) => fields
            .iter()
            .find(|(n, _)| n == name.as_ref())
            .map(|(_, v)| v.clone())
            .ok_or_else(|| {
                Error::index(format!(
                    "record field `{}` not present",
                    name
                ))
            }),
        (other, _) => Err(expected(
            Tag::Array | Tag::Map | Tag::Tuple | Tag::Record,
            other
        ))
    }
}


fn make_range(
    start: Option<Value>,
    end: Value,
    inclusive: bool,
    materialize: bool
) -> Result<Value> {
    match (&start, &end) {
        (None, Value::Int(e)) | (Some(Value::Int(_)), Value::Int(e)) => {
            let s = match start {
                Some(Value::Int(s)) => s,
                _ => 0
            };
            let range = LazyRange {
                start: s,
                end: Some(*e),
                inclusive
            };
            if !materialize {
                return Ok(Value::Range(Rc::new(range)));
            }
            let items = range.to_array()?;
            Ok(Value::Array(Rc::new(std::cell::RefCell::new(items))))
        },
        (Some(Value::Str(a)), Value::Str(b)) => {
            let (a, b) = match (char_endpoint(a), char_endpoint(b)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::index(
                        "string range endpoints must be single characters"
                    ))
                }
            };
            let stop = if inclusive { b as u32 + 1 } else { b as u32 };
            let mut items = Vec::new();
            for code in (a as u32)..stop {
                if let Some(c) = std::char::from_u32(code) {
                    items.push(Value::Str(Rc::new(c.to_string())));
                }
            }
            Ok(Value::Array(Rc::new(std::cell::RefCell::new(items))))
        },
        (Some(s), e) => Err(Error::mismatch(s.get_type(), e.get_type())),
        (None, other) => Err(expected(
            enumflags2::BitFlags::from_flag(Tag::Int),
            other
        ))
    }
}

fn char_endpoint(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_none() {
        Some(c)
    } else {
        None
    }
}


fn stmt_name(kind: &StmtKind) -> &'static str {
    match kind {
        StmtKind::Function(_) => "function",
        StmtKind::VarDecl(_) => "let",
        StmtKind::Assign(..) => "assign",
        StmtKind::If {..} => "if",
        StmtKind::While {..} => "while",
        StmtKind::Until {..} => "until",
        StmtKind::For {..} => "for",
        StmtKind::Return(_) => "return",
        StmtKind::Block(_) => "block",
        StmtKind::Expr(_) => "expression",
        StmtKind::Invariant {..} => "invariant",
        StmtKind::Assert {..} => "assert"
    }
}

fn expr_name(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Int(_) => "int",
        ExprKind::Float(_) => "float",
        ExprKind::Str(_) => "string",
        ExprKind::Bool(_) => "bool",
        ExprKind::Ident(_) => "identifier",
        ExprKind::MetaIdent(_) => "meta-identifier",
        ExprKind::Array(_) => "array",
        ExprKind::MapLit(_) => "map",
        ExprKind::SetLit(_) => "set",
        ExprKind::Binary(..) => "binary",
        ExprKind::Unary(..) => "unary",
        ExprKind::Call(..) => "call",
        ExprKind::Member(..) => "member",
        ExprKind::Index(..) => "index",
        ExprKind::Range {..} => "range",
        ExprKind::TypeOf(_) => "typeof",
        ExprKind::PredicateCheck {..} => "predicate-check"
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infer::Inference;
    use crate::parser::parse;
    use crate::refine::refine;

    // Full pipeline to a loaded machine.
    fn load(source: &str) -> (Machine, Program) {
        let program = parse(source).unwrap();
        let cx = Inference::new();
        cx.infer_program(&program).unwrap();
        refine(&program, &cx).unwrap();
        let mut machine = Machine::new();
        machine.initialize(&program);
        (machine, program)
    }

    fn run_src(source: &str) -> Vec<String> {
        let (mut machine, _) = load(source);
        machine.run().unwrap()
    }

    fn run_err(source: &str) -> Error {
        let (mut machine, _) = load(source);
        machine.run().unwrap_err()
    }

    #[test]
    fn test_array_round_trip() {
        // let a:Array<int>=[1,3,5]; print(a[1]) -> ["3"]
        assert_eq!(
            run_src("let a: Array<int> = [1, 3, 5]; print(a[1])"),
            vec!["3"]
        );
    }

    #[test]
    fn test_fibonacci_round_trip() {
        let source =
            "do f(n) { if n <= 1 { return n } return f(n - 1) + f(n - 2) }
             print(f(10))";
        assert_eq!(run_src(source), vec!["55"]);
    }

    #[test]
    fn test_binary_search_round_trip() {
        let source = r#"
            do search(arr, target) {
                let low = 0, high = arr.length() - 1
                while low <= high {
                    let mid = (low + high) / 2
                    if arr[mid] == target {
                        return mid
                    }
                    if arr[mid] < target {
                        low = mid + 1
                    } else {
                        high = mid - 1
                    }
                }
                return -1
            }
            print(search([1, 3, 5, 7, 9, 11, 13, 15], 7))
        "#;
        assert_eq!(run_src(source), vec!["3"]);
    }

    #[test]
    fn test_dijkstra_round_trip() {
        let source = r#"
            do dijkstra(g, source) {
                let dist = Map()
                let visited = Set()
                for v in g.getVertices() {
                    dist.set(v, inf)
                }
                dist.set(source, 0)
                let queue = MinHeapMap()
                queue.push(source, 0)
                while queue.size() > 0 {
                    let u = queue.pop()
                    if !visited.has(u) {
                        visited.add(u)
                        for e in g.getNeighbors(u) {
                            let alt = dist.get(u) + e["weight"]
                            if alt < dist.get(e["to"]) {
                                dist.set(e["to"], alt)
                                queue.push(e["to"], alt)
                            }
                        }
                    }
                }
                return dist
            }

            let g = Graph()
            g.addEdge(0, 1, 2)
            g.addEdge(0, 3, 5)
            g.addEdge(0, 4, 3)
            g.addEdge(0, 5, 3)
            g.addEdge(5, 6, 3)
            g.addEdge(6, 2, 3)
            g.addEdge(1, 2, 8)
            g.addEdge(3, 6, 2)
            g.addEdge(4, 5, 1)
            let dist = dijkstra(g, 0)
            for v in [0, 1, 2, 3, 4, 5, 6] {
                print(v, dist.get(v))
            }
        "#;
        assert_eq!(
            run_src(source),
            vec!["0 0", "1 2", "2 9", "3 5", "4 3", "5 3", "6 6"]
        );
    }

    #[test]
    fn test_assert_failure_carries_snapshot() {
        let source = r#"
            let arr = [1, 3, 2]
            @assert(arr |- @sorted, "must be sorted")
        "#;
        let e = run_err(source);
        match e.kind {
            ErrorKind::Verification {message, snapshot} => {
                assert_eq!(message, "must be sorted");
                assert!(snapshot.contains(&String::from("arr = [1, 3, 2]")));
            },
            other => panic!("expected a verification failure: {:?}", other)
        }
    }

    #[test]
    fn test_loop_synthesizes_non_negative() {
        let source = "let i = 0; while i < 3 { i = i + 1 }";
        let (mut machine, _) = load(source);
        machine.run().unwrap();
        let binding = machine.get_environment().get("i").unwrap();
        assert_eq!(binding.value, Value::Int(3));
        assert!(binding
            .refinements
            .iter()
            .any(|p| p.name == "non_negative"));
    }

    #[test]
    fn test_left_to_right_effects() {
        let source = r#"
            do a() { print("a") return 1 }
            do b() { print("b") return 2 }
            print(a() + b())
        "#;
        assert_eq!(run_src(source), vec!["a", "b", "3"]);
    }

    #[test]
    fn test_short_circuit_never_evaluates_right() {
        let source = r#"
            do boom() { print("boom") return true }
            let x = false && boom()
            let y = true || boom()
            print(x, y)
        "#;
        assert_eq!(run_src(source), vec!["false true"]);
    }

    #[test]
    fn test_container_aliasing() {
        let source = r#"
            do grow(xs) { xs.push(4) }
            let a = [1, 2, 3]
            let b = a
            grow(a)
            print(a.length(), b.length())
        "#;
        assert_eq!(run_src(source), vec!["4 4"]);
    }

    #[test]
    fn test_scope_discipline() {
        let source = r#"
            let outer = 1
            { let inner = 2; outer = inner }
            print(outer)
        "#;
        let (mut machine, _) = load(source);
        let output = machine.run().unwrap();
        assert_eq!(output, vec!["2"]);
        let env = machine.get_environment();
        assert!(env.get("outer").is_some());
        // The block's frame was popped on exit.
        assert!(env.get("inner").is_none());
        assert!(env.get("print").is_some());
    }

    #[test]
    fn test_for_loop_rebinds_per_iteration() {
        assert_eq!(
            run_src("for x in [1, 2, 3] { print(x) }"),
            vec!["1", "2", "3"]
        );
        // The loop variable does not survive the loop.
        let (mut machine, _) = load("for x in [1] { print(x) }");
        machine.run().unwrap();
        assert!(machine.get_environment().get("x").is_none());
    }

    #[test]
    fn test_unbounded_range_with_return() {
        let source = r#"
            do first_past(limit) {
                for x in 0.. {
                    if x > limit {
                        return x
                    }
                }
            }
            print(first_past(5))
        "#;
        assert_eq!(run_src(source), vec!["6"]);
    }

    #[test]
    fn test_until_loop() {
        assert_eq!(
            run_src("let i = 0; until i >= 3 { i = i + 1 }; print(i)"),
            vec!["3"]
        );
    }

    #[test]
    fn test_string_range() {
        assert_eq!(
            run_src("for c in \"a\"..\"d\" { print(c) }"),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            run_src("for c in \"a\"..=\"c\" { print(c) }"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_slicing() {
        assert_eq!(
            run_src("let a = [10, 20, 30, 40]; print(a[1..3])"),
            vec!["[20, 30]"]
        );
        assert_eq!(
            run_src("let a = [10, 20, 30, 40]; print(a[1..=100])"),
            vec!["[20, 30, 40]"]
        );
    }

    #[test]
    fn test_assertion_determinism() {
        assert_eq!(
            run_src("@assert(true); print(\"after\")"),
            vec!["after"]
        );
        let e = run_err("@assert(false, \"boom\")");
        match e.kind {
            ErrorKind::Verification {message, ..} => {
                assert_eq!(message, "boom");
            },
            other => panic!("expected a verification failure: {:?}", other)
        }
    }

    #[test]
    fn test_invariant_rechecked_at_boundaries() {
        let source = r#"
            let i = 0
            while i < 5 {
                @invariant(i < 3, "too big")
                i = i + 1
            }
        "#;
        let e = run_err(source);
        match e.kind {
            ErrorKind::Verification {message, ..} => {
                assert_eq!(message, "too big");
            },
            other => panic!("expected a verification failure: {:?}", other)
        }
    }

    #[test]
    fn test_return_unwinds_through_loops() {
        let source = r#"
            do find(xs, wanted) {
                for x in xs {
                    while true {
                        if x == wanted {
                            return "found"
                        }
                        x = x + 1
                    }
                }
            }
            print(find([5], 7))
        "#;
        assert_eq!(run_src(source), vec!["found"]);
    }

    #[test]
    fn test_typeof() {
        assert_eq!(
            run_src("print(typeof 1, typeof 1.5, typeof \"s\", typeof [1])"),
            vec!["int float string array"]
        );
    }

    #[test]
    fn test_turnstile_is_boolean_expression() {
        assert_eq!(
            run_src("print([1, 2] |- @sorted, 5 |- @greater_than(9))"),
            vec!["true false"]
        );
    }

    #[test]
    fn test_indexed_assignment() {
        assert_eq!(
            run_src("let a = [1, 2]; a[1] = 9; print(a)"),
            vec!["[1, 9]"]
        );
        assert_eq!(
            run_src("let m = Map(); m[\"k\"] = 3; print(m[\"k\"])"),
            vec!["3"]
        );
        let e = run_err("let a = [1]; a[5] = 0");
        assert!(matches!(e.kind, ErrorKind::Index(_)));
        assert!(e.pos.is_some());
    }

    #[test]
    fn test_stepping_observability() {
        let (mut machine, _) = load("let x = 1; print(x + 1)");
        let first = machine.step().unwrap();
        assert!(!first.finished);
        assert_eq!(first.line, 1);
        let mut steps = 1;
        while !machine.is_finished() {
            machine.step().unwrap();
            steps += 1;
            assert!(steps < 1000, "machine failed to terminate");
        }
        assert_eq!(machine.get_output(), &[String::from("2")]);
        let state = machine.get_state();
        assert!(state.finished);
        assert_eq!(state.kont_depth, 0);
        assert!(state.env.iter().any(|line| line == "x = 1"));
    }

    #[test]
    fn test_error_leaves_machine_observable() {
        let (mut machine, _) = load("let a = [1]; print(a[7])");
        let mut saw_error = false;
        for _ in 0..1000 {
            if machine.is_finished() {
                break;
            }
            if let Err(e) = machine.step() {
                assert!(matches!(e.kind, ErrorKind::Index(_)));
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        // The failing focus is still visible.
        assert!(!machine.get_state().finished);
    }

    #[test]
    fn test_heap_and_tree_programs() {
        let source = r#"
            let h = MinHeap()
            for n in [5, 1, 4] { h.push(n) }
            print(h.pop(), h.pop(), h.pop())

            let t = AVLTree()
            for n in [3, 1, 2, 5, 4, 6, 7] { t.insert(n) }
            print(t.getHeight())
            print(t.inOrderTraversal())
        "#;
        assert_eq!(
            run_src(source),
            vec!["1 4 5", "3", "[1, 2, 3, 4, 5, 6, 7]"]
        );
    }

    #[test]
    fn test_map_keys_in_insertion_order() {
        let source = r#"
            let m = Map()
            m.set("b", 2)
            m.set("a", 1)
            print(m.keys())
            print(m.deleteWithKey("b"), m.has("b"), m.size())
        "#;
        assert_eq!(
            run_src(source),
            vec!["[\"b\", \"a\"]", "true false 1"]
        );
    }

    #[test]
    fn test_curried_predicate() {
        let source = r#"
            let above = @greater_than(10)
            print(11 |- @greater_than(10))
            print(above)
        "#;
        assert_eq!(run_src(source), vec!["true", "@greater_than(10)"]);
    }

    #[test]
    fn test_run_on_empty_program() {
        let (mut machine, _) = load("");
        assert!(machine.is_finished());
        assert_eq!(machine.run().unwrap(), Vec::<String>::new());
    }
}
