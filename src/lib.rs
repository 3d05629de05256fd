// SchemA: a pedagogical language with first-class runtime verification.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

extern crate enumflags2;
extern crate regex;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod builtins;
pub mod containers;
pub mod env;
pub mod error;
pub mod infer;
pub mod lexer;
pub mod machine;
pub mod members;
pub mod parser;
pub mod refine;
pub mod types;
pub mod value;
pub mod verify;

#[macro_export]
macro_rules! trace(
    ( $($thing:expr),* ) => { if cfg!(test) { println! { $($thing),* } } };
);

use crate::machine::Machine;

// Front-to-back pipeline: source text in, output lines out.
pub fn interpret(source: &str) -> error::Result<Vec<String>> {
    let program = parser::parse(source)?;
    let cx = infer::Inference::new();
    cx.infer_program(&program)?;
    refine::refine(&program, &cx)?;
    let mut machine = Machine::new();
    machine.initialize(&program);
    machine.run()
}
