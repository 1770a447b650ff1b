//! Protocol derivation
//!
//! Turns a [`Schema`] into everything the wire needs: a command code and a
//! reply code per function, and the record layout each protocol role reads
//! or writes. The layouts are derived once, up front, so the codec is a
//! single routine driven by data instead of per-function generated code.

use std::collections::HashMap;

use serde::Serialize;

use crate::schema::{Arg, ArgType, Function, Schema};
use crate::views::{self, MultipleReturns};

/// Command or reply code carried in a frame header
pub type Code = i32;

/// Per-connection correlation id
pub type Sequence = i32;

/// Which side of an exchange a routine implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    ReadCommand,
    WriteCommand,
    ReadReply,
    WriteReply,
    HighLevelCall,
}

impl Role {
    /// The four roles that own a record codec
    pub const CODEC: [Role; 4] = [
        Role::ReadCommand,
        Role::WriteCommand,
        Role::ReadReply,
        Role::WriteReply,
    ];

    /// Arguments visible to this role, in declaration order.
    ///
    /// A blocking call takes the command view of the list without its
    /// return argument, which fails if more than one argument is `RETURN`.
    pub fn view(self, function: &Function) -> Result<Vec<&Arg>, MultipleReturns> {
        Ok(match self {
            Role::ReadCommand | Role::WriteCommand => views::command_view(&function.args),
            Role::ReadReply | Role::WriteReply => views::reply_view(&function.args),
            Role::HighLevelCall => views::command_view(views::drop_return(&function.args)?),
        })
    }

    pub fn is_reply(self) -> bool {
        matches!(self, Role::ReadReply | Role::WriteReply)
    }
}

/// How one record slot is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// 0 or 1
    Bool,
    /// The value itself
    Int,
    /// Byte length of a trailing string
    Length,
    /// Element count of a trailing list
    Count,
}

impl Slot {
    fn for_type(ty: &ArgType) -> Self {
        match ty {
            ArgType::Bool => Slot::Bool,
            ArgType::Int(_) => Slot::Int,
            ArgType::String => Slot::Length,
            ArgType::StringList | ArgType::IntList => Slot::Count,
        }
    }
}

/// One 32-bit record slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
    pub slot: Slot,
}

/// Fixed-size record of one direction of one function.
///
/// Fields appear in declared argument order; trailing payloads follow the
/// record in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    pub fields: Vec<RecordField>,
    /// Indices into `fields` of the simple view, in stream order
    #[serde(skip)]
    trailing: Vec<usize>,
}

impl RecordLayout {
    /// Width of every slot on the wire
    pub const SLOT_SIZE: usize = 4;

    /// Layout of a role view, one slot per argument
    pub fn from_view(view: Vec<&Arg>) -> Self {
        let variable = views::simple_view(view.iter().copied());
        let trailing = view
            .iter()
            .enumerate()
            .filter(|(_, arg)| variable.iter().any(|v| std::ptr::eq(*v, **arg)))
            .map(|(index, _)| index)
            .collect();
        let fields = view
            .into_iter()
            .map(|arg| RecordField {
                name: arg.name.clone(),
                ty: arg.ty.clone(),
                slot: Slot::for_type(&arg.ty),
            })
            .collect();
        Self { fields, trailing }
    }

    /// Size of the record in bytes.
    ///
    /// A record without fields still occupies one placeholder slot.
    pub fn size(&self) -> usize {
        self.fields.len().max(1) * Self::SLOT_SIZE
    }

    /// Fields followed by a trailing payload with their record index, in
    /// stream order
    pub fn trailing(&self) -> impl Iterator<Item = (usize, &RecordField)> {
        self.trailing.iter().map(|&index| (index, &self.fields[index]))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    function: Function,
    command: RecordLayout,
    reply: RecordLayout,
}

/// A function together with its codes and layouts
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    entry: &'a Entry,
    pub command_code: Code,
    pub reply_code: Code,
}

impl<'a> Operation<'a> {
    pub fn function(&self) -> &'a Function {
        &self.entry.function
    }

    pub fn name(&self) -> &'a str {
        &self.entry.function.name
    }

    /// Record layout used by `role`.
    ///
    /// Reading and writing a command share one layout, as do reading and
    /// writing a reply. A blocking call sends its inputs as the command record.
    pub fn layout(&self, role: Role) -> &'a RecordLayout {
        if role.is_reply() {
            &self.entry.reply
        } else {
            &self.entry.command
        }
    }

    /// Header code written by a `Write*` role
    pub fn code(&self, role: Role) -> Code {
        if role.is_reply() {
            self.reply_code
        } else {
            self.command_code
        }
    }
}

/// Code and layout tables for a whole schema
#[derive(Debug, Clone)]
pub struct Protocol {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl Protocol {
    pub fn new(schema: Schema) -> Self {
        let entries: Vec<Entry> = schema
            .into_functions()
            .into_iter()
            .map(|function| Entry {
                command: RecordLayout::from_view(views::command_view(&function.args)),
                reply: RecordLayout::from_view(views::reply_view(&function.args)),
                function,
            })
            .collect();
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.function.name.clone(), index))
            .collect();
        Self { entries, by_name }
    }

    /// Parse and derive in one step
    pub fn parse(text: &str) -> Result<Self, crate::SchemaError> {
        Ok(Self::new(Schema::parse(text)?))
    }

    /// The protocol spoken by the desktop daemon
    pub fn builtin() -> Result<Self, crate::SchemaError> {
        Self::parse(crate::BUILTIN_SCHEMA)
    }

    fn operation_at(&self, index: usize) -> Operation<'_> {
        // Function `i` owns command code 2i and reply code 2i + 1
        let base = (index as Code) * 2;
        Operation {
            entry: &self.entries[index],
            command_code: base,
            reply_code: base + 1,
        }
    }

    pub fn operation(&self, name: &str) -> Option<Operation<'_>> {
        self.by_name.get(name).map(|&index| self.operation_at(index))
    }

    /// Operation whose command code is `code`
    pub fn by_command_code(&self, code: Code) -> Option<Operation<'_>> {
        if code < 0 || code % 2 != 0 {
            return None;
        }
        let index = (code / 2) as usize;
        (index < self.entries.len()).then(|| self.operation_at(index))
    }

    /// Operation whose reply code is `code`
    pub fn by_reply_code(&self, code: Code) -> Option<Operation<'_>> {
        if code < 1 || code % 2 != 1 {
            return None;
        }
        self.by_command_code(code - 1)
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation<'_>> {
        (0..self.entries.len()).map(|index| self.operation_at(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "
FUNCTION Init
  ARG ok
    TYPE bool
    RETURN
  ENDARG
ENDFUNCTION
FUNCTION LocalFile
  ARG file
    TYPE string
  ENDARG
  ARG names
    TYPE stringlist
  ENDARG
  ARG allow_download
    TYPE bool
  ENDARG
  ARG result
    TYPE string
    RETURN
  ENDARG
ENDFUNCTION
";

    #[test]
    fn test_codes_are_disjoint() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let init = protocol.operation("Init").unwrap();
        let local = protocol.operation("LocalFile").unwrap();

        assert_eq!((init.command_code, init.reply_code), (0, 1));
        assert_eq!((local.command_code, local.reply_code), (2, 3));

        let commands: Vec<_> = protocol.operations().map(|op| op.command_code).collect();
        for op in protocol.operations() {
            assert!(!commands.contains(&op.reply_code));
        }
    }

    #[test]
    fn test_code_lookup() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        assert_eq!(protocol.by_command_code(2).map(|op| op.name()), Some("LocalFile"));
        assert_eq!(protocol.by_reply_code(3).map(|op| op.name()), Some("LocalFile"));
        assert!(protocol.by_command_code(3).is_none());
        assert!(protocol.by_reply_code(2).is_none());
        assert!(protocol.by_command_code(4).is_none());
        assert!(protocol.by_command_code(-2).is_none());
        assert!(protocol.by_reply_code(-1).is_none());
    }

    #[test]
    fn test_command_layout() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let local = protocol.operation("LocalFile").unwrap();
        let layout = local.layout(Role::WriteCommand);

        let slots: Vec<_> = layout.fields.iter().map(|f| (f.name.as_str(), f.slot)).collect();
        assert_eq!(
            slots,
            [("file", Slot::Length), ("names", Slot::Count), ("allow_download", Slot::Bool)]
        );
        assert_eq!(layout.size(), 12);
        let trailing: Vec<_> = layout
            .trailing()
            .map(|(index, f)| (index, f.name.as_str()))
            .collect();
        assert_eq!(trailing, [(0, "file"), (1, "names")]);
    }

    #[test]
    fn test_read_and_write_share_layouts() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        for op in protocol.operations() {
            assert_eq!(op.layout(Role::ReadCommand), op.layout(Role::WriteCommand));
            assert_eq!(op.layout(Role::ReadReply), op.layout(Role::WriteReply));
            assert_eq!(op.layout(Role::HighLevelCall), op.layout(Role::WriteCommand));
        }
    }

    #[test]
    fn test_empty_record_has_placeholder() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let init = protocol.operation("Init").unwrap();
        assert!(init.layout(Role::WriteCommand).fields.is_empty());
        assert_eq!(init.layout(Role::WriteCommand).size(), 4);
        assert_eq!(init.layout(Role::WriteReply).size(), 4);
    }

    #[test]
    fn test_high_level_view_drops_return() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let local = protocol.operation("LocalFile").unwrap();
        let inputs: Vec<_> = Role::HighLevelCall
            .view(local.function())
            .unwrap()
            .iter()
            .map(|arg| arg.name.as_str())
            .collect();
        assert_eq!(inputs, ["file", "names", "allow_download"]);
    }

    #[test]
    fn test_high_level_view_rejects_two_returns() {
        let function = Function::new("Broken")
            .with_arg(Arg::new("path", ArgType::String))
            .with_arg(Arg::new("a", ArgType::Bool).returned())
            .with_arg(Arg::new("b", ArgType::Bool).returned());

        let err = Role::HighLevelCall.view(&function).unwrap_err();
        assert_eq!((err.first.as_str(), err.second.as_str()), ("a", "b"));
        assert_eq!(Role::WriteCommand.view(&function).unwrap().len(), 1);
    }

    #[test]
    fn test_trailing_follows_simple_view() {
        let function = Function::new("Mixed")
            .with_arg(Arg::new("flag", ArgType::Bool))
            .with_arg(Arg::new("codes", ArgType::IntList))
            .with_arg(Arg::new("window", ArgType::Int("Window".into())))
            .with_arg(Arg::new("title", ArgType::String));
        let layout = RecordLayout::from_view(Role::WriteCommand.view(&function).unwrap());

        let trailing: Vec<_> = layout.trailing().map(|(index, _)| index).collect();
        assert_eq!(trailing, [1, 3]);
        let simple: Vec<_> = views::simple_view(&function.args)
            .iter()
            .map(|arg| arg.name.clone())
            .collect();
        let names: Vec<_> = layout.trailing().map(|(_, f)| f.name.clone()).collect();
        assert_eq!(names, simple);
    }

    #[test]
    fn test_write_codes() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let local = protocol.operation("LocalFile").unwrap();
        assert_eq!(local.code(Role::WriteCommand), 2);
        assert_eq!(local.code(Role::WriteReply), 3);
    }
}
