use std::fmt;

use crate::ast::Pos;
use crate::value::{Tag, TagSet};


// The result of any phase of the pipeline.
pub type Result<T> = core::result::Result<T, Error>;


// Every kind of failure the interpreter can report. Type errors
// surface before the machine starts; the rest abort the current step,
// leaving the machine in a snapshot-accessible state.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    Type(String),
    Name(String),
    Index(String),
    // A container operation dispatched against the wrong receiver.
    RuntimeType {
        expect: TagSet,
        got: Tag
    },
    Mismatch(Tag, Tag),
    Verification {
        message: String,
        snapshot: Vec<String>
    },
    Internal(String)
}


#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub pos: Option<Pos>
}

impl Error {
    pub fn type_error(message: impl Into<String>, pos: Pos) -> Error {
        Error {kind: ErrorKind::Type(message.into()), pos: Some(pos)}
    }

    pub fn name(message: impl Into<String>, pos: Pos) -> Error {
        Error {kind: ErrorKind::Name(message.into()), pos: Some(pos)}
    }

    pub fn index(message: impl Into<String>) -> Error {
        Error {kind: ErrorKind::Index(message.into()), pos: None}
    }

    pub fn runtime(expect: TagSet, got: Tag) -> Error {
        Error {kind: ErrorKind::RuntimeType {expect, got}, pos: None}
    }

    pub fn mismatch(a: Tag, b: Tag) -> Error {
        Error {kind: ErrorKind::Mismatch(a, b), pos: None}
    }

    pub fn verification(
        message: impl Into<String>,
        pos: Pos,
        snapshot: Vec<String>
    ) -> Error {
        Error {
            kind: ErrorKind::Verification {
                message: message.into(),
                snapshot
            },
            pos: Some(pos)
        }
    }

    pub fn internal(message: impl Into<String>) -> Error {
        Error {kind: ErrorKind::Internal(message.into()), pos: None}
    }

    // Attach a position to an error raised below the AST (value ops,
    // container dispatch) without clobbering a more precise one.
    pub fn at(mut self, pos: Pos) -> Error {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    pub fn is_verification(&self) -> bool {
        match self.kind {
            ErrorKind::Verification {..} => true,
            _ => false
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Type(m) => write!(f, "TypeError: {}", m)?,
            ErrorKind::Name(m) => write!(f, "NameError: {}", m)?,
            ErrorKind::Index(m) => write!(f, "IndexError: {}", m)?,
            ErrorKind::RuntimeType {expect, got} => {
                let names: Vec<String> = expect
                    .iter()
                    .map(|t| format!("{:?}", t))
                    .collect();
                write!(
                    f,
                    "RuntimeTypeError: expected one of {{{}}}, got {:?}",
                    names.join(", "),
                    got
                )?
            },
            ErrorKind::Mismatch(a, b) => write!(
                f,
                "RuntimeTypeError: operands {:?} and {:?} do not agree",
                a,
                b
            )?,
            ErrorKind::Verification {message, snapshot} => {
                write!(f, "VerificationFailure: {}", message)?;
                for line in snapshot {
                    write!(f, "\n  {}", line)?;
                }
            },
            ErrorKind::Internal(m) => write!(f, "InternalError: {}", m)?
        }
        if let Some(pos) = self.pos {
            write!(f, " (line {}, column {})", pos.line, pos.column)?;
        }
        Ok(())
    }
}
