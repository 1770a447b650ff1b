//! Schema parser
//!
//! Line-oriented reader for the schema language:
//!
//! ```text
//! FUNCTION <name>
//!  ARG <name>
//!   TYPE <type>   - bool, string, stringlist, intlist or any int-like identifier
//!   OUT           - travels in the reply
//!   RETURN        - the value of the blocking call, implies OUT
//!  ENDARG
//! ENDFUNCTION
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Anything else outside
//! this grammar is fatal.

use std::collections::HashSet;

use crate::schema::{Arg, ArgType, Function, Schema};
use crate::views::{self, MultipleReturns};

/// Fatal schema error, pointing at the offending line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}: `{text}`")]
pub struct SchemaError {
    /// 1-based line number (0 for an empty input)
    pub line: usize,
    pub text: String,
    pub kind: SchemaErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaErrorKind {
    #[error("unexpected line in {0}")]
    Unexpected(&'static str),
    #[error("{0} needs a name")]
    MissingName(&'static str),
    #[error("{0} takes no operand")]
    UnexpectedOperand(&'static str),
    #[error("TYPE given twice for argument `{0}`")]
    DuplicateType(String),
    #[error("argument `{0}` has no TYPE")]
    MissingType(String),
    #[error("argument `{0}` declared twice")]
    DuplicateArgument(String),
    #[error("ARG `{0}` lacks ENDARG")]
    UnterminatedArg(String),
    #[error("FUNCTION `{0}` lacks ENDFUNCTION")]
    UnterminatedFunction(String),
    #[error("function `{0}` declared twice")]
    DuplicateFunction(String),
    #[error("function `{function}`: {source}")]
    MultipleReturns {
        function: String,
        source: MultipleReturns,
    },
}

struct Line<'a> {
    number: usize,
    text: &'a str,
    keyword: &'a str,
    operand: &'a str,
}

impl<'a> Line<'a> {
    fn error(&self, kind: SchemaErrorKind) -> SchemaError {
        SchemaError {
            line: self.number,
            text: self.text.to_string(),
            kind,
        }
    }

    fn name(&self, keyword: &'static str) -> Result<&'a str, SchemaError> {
        if self.operand.is_empty() {
            return Err(self.error(SchemaErrorKind::MissingName(keyword)));
        }
        Ok(self.operand)
    }

    fn bare(&self, keyword: &'static str) -> Result<(), SchemaError> {
        if !self.operand.is_empty() {
            return Err(self.error(SchemaErrorKind::UnexpectedOperand(keyword)));
        }
        Ok(())
    }
}

/// Significant lines of the input, remembering the last one for EOF errors
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last_number: usize,
    last_text: &'a str,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last_number: 0,
            last_text: "",
        }
    }

    fn next(&mut self) -> Option<Line<'a>> {
        for (index, raw) in self.inner.by_ref() {
            let text = raw.trim();
            self.last_number = index + 1;
            self.last_text = text;
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let (keyword, operand) = match text.split_once(char::is_whitespace) {
                Some((keyword, operand)) => (keyword, operand.trim()),
                None => (text, ""),
            };
            return Some(Line {
                number: index + 1,
                text,
                keyword,
                operand,
            });
        }
        None
    }

    fn eof_error(&self, kind: SchemaErrorKind) -> SchemaError {
        SchemaError {
            line: self.last_number,
            text: self.last_text.to_string(),
            kind,
        }
    }
}

/// Parse schema text into a validated [`Schema`]
pub fn parse(text: &str) -> Result<Schema, SchemaError> {
    let mut lines = Lines::new(text);
    let mut functions = Vec::new();
    let mut names = HashSet::new();

    while let Some(line) = lines.next() {
        if line.keyword != "FUNCTION" {
            return Err(line.error(SchemaErrorKind::Unexpected("top level")));
        }
        let name = line.name("FUNCTION")?;
        if !names.insert(name.to_string()) {
            return Err(line.error(SchemaErrorKind::DuplicateFunction(name.to_string())));
        }
        functions.push(parse_function(&mut lines, name)?);
    }

    Ok(Schema::from_functions(functions))
}

fn parse_function(lines: &mut Lines<'_>, name: &str) -> Result<Function, SchemaError> {
    let mut function = Function::new(name);

    while let Some(line) = lines.next() {
        match line.keyword {
            "ENDFUNCTION" => {
                line.bare("ENDFUNCTION")?;
                if let Err(source) = views::drop_return(&function.args) {
                    return Err(line.error(SchemaErrorKind::MultipleReturns {
                        function: function.name,
                        source,
                    }));
                }
                return Ok(function);
            }
            "ARG" => {
                let arg_name = line.name("ARG")?;
                if function.args.iter().any(|arg| arg.name == arg_name) {
                    return Err(
                        line.error(SchemaErrorKind::DuplicateArgument(arg_name.to_string()))
                    );
                }
                let arg = parse_arg(lines, arg_name)?;
                function.args.push(arg);
            }
            _ => return Err(line.error(SchemaErrorKind::Unexpected("FUNCTION"))),
        }
    }

    Err(lines.eof_error(SchemaErrorKind::UnterminatedFunction(name.to_string())))
}

fn parse_arg(lines: &mut Lines<'_>, name: &str) -> Result<Arg, SchemaError> {
    let mut ty: Option<ArgType> = None;
    let mut out = false;
    let mut ret = false;

    while let Some(line) = lines.next() {
        match line.keyword {
            "ENDARG" => {
                line.bare("ENDARG")?;
                let Some(ty) = ty else {
                    return Err(line.error(SchemaErrorKind::MissingType(name.to_string())));
                };
                return Ok(Arg {
                    name: name.to_string(),
                    ty,
                    out,
                    ret,
                });
            }
            "TYPE" => {
                let spelling = line.name("TYPE")?;
                if ty.is_some() {
                    return Err(line.error(SchemaErrorKind::DuplicateType(name.to_string())));
                }
                ty = Some(ArgType::from_spelling(spelling));
            }
            "OUT" => {
                line.bare("OUT")?;
                out = true;
            }
            "RETURN" => {
                line.bare("RETURN")?;
                out = true;
                ret = true;
            }
            _ => return Err(line.error(SchemaErrorKind::Unexpected("ARG"))),
        }
    }

    Err(lines.eof_error(SchemaErrorKind::UnterminatedArg(name.to_string())))
}
