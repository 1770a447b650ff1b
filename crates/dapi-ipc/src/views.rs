//! Argument views
//!
//! Order-preserving filters over an argument list. Each protocol role sees
//! one composition of these: commands carry the command view, replies the
//! reply view, the trailing payload of either is its simple view, and a
//! blocking call takes the command view of the list without its return value.

use crate::schema::Arg;

/// Two arguments of one function are marked `RETURN`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("both `{first}` and `{second}` are marked RETURN")]
pub struct MultipleReturns {
    pub first: String,
    pub second: String,
}

/// Arguments travelling caller → server (`OUT` not set)
pub fn command_view<'a>(args: impl IntoIterator<Item = &'a Arg>) -> Vec<&'a Arg> {
    args.into_iter().filter(|arg| !arg.out).collect()
}

/// Arguments travelling server → caller (`OUT` set)
pub fn reply_view<'a>(args: impl IntoIterator<Item = &'a Arg>) -> Vec<&'a Arg> {
    args.into_iter().filter(|arg| arg.out).collect()
}

/// Arguments that need a trailing variable-length section
pub fn simple_view<'a>(args: impl IntoIterator<Item = &'a Arg>) -> Vec<&'a Arg> {
    args.into_iter().filter(|arg| arg.ty.is_variable()).collect()
}

/// All arguments except the one marked `RETURN`.
///
/// Fails if more than one argument is marked.
pub fn drop_return<'a>(
    args: impl IntoIterator<Item = &'a Arg>,
) -> Result<Vec<&'a Arg>, MultipleReturns> {
    let mut kept = Vec::new();
    let mut seen: Option<&Arg> = None;
    for arg in args {
        if !arg.ret {
            kept.push(arg);
            continue;
        }
        if let Some(first) = seen {
            return Err(MultipleReturns {
                first: first.name.clone(),
                second: arg.name.clone(),
            });
        }
        seen = Some(arg);
    }
    Ok(kept)
}
