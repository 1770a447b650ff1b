//! Schema model
//!
//! A schema is an ordered list of remote functions. Each function carries an
//! ordered argument list; every argument is typed and flagged as travelling
//! in the command, in the reply, or being the value a blocking call returns.
//! Everything on the wire is derived from this model.

use serde::Serialize;

use crate::parser::{self, SchemaError};

/// Argument type as spelled after `TYPE` in a schema file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "spelling", rename_all = "lowercase")]
pub enum ArgType {
    /// `bool`, a 0/1 scalar on the wire
    Bool,
    /// Any other identifier (`int`, `long`, `Window`, ...), a 32-bit scalar on the wire
    Int(String),
    /// `string`, length in the record, raw bytes trailing
    String,
    /// `stringlist`, count in the record, length-prefixed items trailing
    StringList,
    /// `intlist`, count in the record, 32-bit items trailing
    IntList,
}

impl ArgType {
    /// Map a `TYPE` operand to an argument type.
    ///
    /// Unknown identifiers are int-like scalars, so this never fails.
    pub fn from_spelling(spelling: &str) -> Self {
        match spelling {
            "bool" => Self::Bool,
            "string" => Self::String,
            "stringlist" => Self::StringList,
            "intlist" => Self::IntList,
            other => Self::Int(other.to_string()),
        }
    }

    pub fn spelling(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Int(name) => name,
            Self::String => "string",
            Self::StringList => "stringlist",
            Self::IntList => "intlist",
        }
    }

    /// Whether values of this type need a trailing payload section
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::String | Self::StringList | Self::IntList)
    }
}

/// One function argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
    /// Travels server → caller
    pub out: bool,
    /// Value of the blocking call; implies `out`
    pub ret: bool,
}

impl Arg {
    pub fn new(name: impl Into<String>, ty: ArgType) -> Self {
        Self {
            name: name.into(),
            ty,
            out: false,
            ret: false,
        }
    }

    pub fn output(mut self) -> Self {
        self.out = true;
        self
    }

    pub fn returned(mut self) -> Self {
        self.out = true;
        self.ret = true;
        self
    }
}

/// A remote function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub name: String,
    pub args: Vec<Arg>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// The argument marked `RETURN`, if any
    pub fn return_arg(&self) -> Option<&Arg> {
        self.args.iter().find(|arg| arg.ret)
    }
}

/// A validated, ordered set of functions.
///
/// Only the parser builds one, so every schema in hand has unique function
/// names and at most one `RETURN` argument per function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    functions: Vec<Function>,
}

impl Schema {
    /// Parse schema text
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        parser::parse(text)
    }

    pub(crate) fn from_functions(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn into_functions(self) -> Vec<Function> {
        self.functions
    }
}
