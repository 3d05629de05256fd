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

use std::env::args;
use std::fs;
use std::process::exit;

use schema::infer::Inference;
use schema::machine::Machine;
use schema::parser;
use schema::refine;

fn main() {
    let path = match args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: schema <file.schema> [--trace]");
            exit(2);
        }
    };
    let tracing = args().nth(2).as_deref() == Some("--trace");

    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            exit(2);
        }
    };

    let program = match parser::parse(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let cx = Inference::new();
    let checked = cx
        .infer_program(&program)
        .and_then(|_| refine::refine(&program, &cx));
    if let Err(e) = checked {
        eprintln!("{}", e);
        exit(1);
    }

    let mut machine = Machine::new();
    machine.initialize(&program);

    if tracing {
        // One JSON snapshot per step, for debugger front-ends.
        while !machine.is_finished() {
            match machine.step() {
                Ok(snapshot) => {
                    match serde_json::to_string(&snapshot) {
                        Ok(line) => println!("{}", line),
                        Err(e) => {
                            eprintln!("snapshot encoding failed: {}", e);
                            exit(1);
                        }
                    }
                },
                Err(e) => {
                    eprintln!("{}", e);
                    exit(1);
                }
            }
        }
    } else if let Err(e) = machine.run() {
        eprintln!("{}", e);
        exit(1);
    }

    for line in machine.get_output() {
        println!("{}", line);
    }
}
