//! Lookup instructions embedded in string constants.
//!
//! An instruction looks like `SRC(net.minecraft.world.Level)` and is
//! replaced by the name the [`SymbolTable`] resolves it to. The grammar is
//! `[A]SR(C|M|F)[/](body)`:
//!
//! * `A` selects advanced mode, where the body is a full table key
//!   (`a/B.foo()V` for methods, `a/B.count.I` for fields). Without it the
//!   body is a dotted class name followed by a space and a member name.
//! * `C`, `M` and `F` select a class, method or field lookup.
//! * `/` keeps slashes in the result instead of converting them to dots.
//!
//! Parentheses inside the body must be balanced; the instruction ends at the
//! matching closing parenthesis.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

use crate::table::{internal_name, RemapGoal, SymbolTable};

/// How the body of an instruction is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// `<dotted class> <member name>`, or a dotted class name.
    Simple,
    /// A full table key.
    Advanced,
}

/// The kind of symbol an instruction refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `SRC`
    Class,
    /// `SRM`
    Method,
    /// `SRF`
    Field,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Class => f.write_str("class"),
            Kind::Method => f.write_str("method"),
            Kind::Field => f.write_str("field"),
        }
    }
}

/// Errors raised while resolving the instructions of a string.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LookupError {
    /// An instruction opened at `start` has no matching closing parenthesis.
    #[error("lookup instruction at offset {start} is never closed")]
    Unterminated {
        /// Byte offset of the instruction start.
        start: usize,
    },
    /// The symbol table has no entry for the lookup.
    #[error("no {kind} mapping for {lookup:?}")]
    Unresolved {
        /// The kind of symbol looked up.
        kind: Kind,
        /// The lookup key as it was queried.
        lookup: String,
    },
    /// The instruction body does not have the shape its mode requires.
    #[error("malformed {kind} lookup {body:?}")]
    InvalidBody {
        /// The kind of symbol looked up.
        kind: Kind,
        /// The instruction body.
        body: String,
    },
}

/// One instruction found in a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupInstruction<'s> {
    /// Simple or advanced mode.
    pub mode: Mode,
    /// Class, method or field.
    pub kind: Kind,
    /// Whether the result keeps its slashes.
    pub use_slashes: bool,
    /// The text between the outer parentheses.
    pub body: &'s str,
    /// Byte range of the whole instruction in the scanned string.
    pub range: Range<usize>,
}

/// Finds the leftmost instruction in `value`.
///
/// Returns `None` when there is no instruction at all and an error when one
/// opens but is never closed.
///
/// ```
/// use string_remapper::lookup::{find_instruction, Kind, Mode};
///
/// let found = find_instruction("x ASRM/(a/B.foo(I)V) y").unwrap().unwrap();
/// assert_eq!(found.mode, Mode::Advanced);
/// assert_eq!(found.kind, Kind::Method);
/// assert!(found.use_slashes);
/// assert_eq!(found.body, "a/B.foo(I)V");
/// assert_eq!(found.range, 2..20);
/// ```
pub fn find_instruction(value: &str) -> Option<Result<LookupInstruction<'_>, LookupError>> {
    let bytes = value.as_bytes();
    let mut from = 0;

    while let Some(offset) = value[from..].find("SR") {
        let marker = from + offset;
        from = marker + 1;

        let kind = match bytes.get(marker + 2) {
            Some(b'C') => Kind::Class,
            Some(b'M') => Kind::Method,
            Some(b'F') => Kind::Field,
            _ => continue,
        };
        let mut open = marker + 3;
        let use_slashes = bytes.get(open) == Some(&b'/');
        if use_slashes {
            open += 1;
        }
        if bytes.get(open) != Some(&b'(') {
            continue;
        }

        let (mode, start) = match marker.checked_sub(1) {
            Some(prev) if bytes[prev] == b'A' => (Mode::Advanced, prev),
            _ => (Mode::Simple, marker),
        };

        let Some(close) = matching_paren(bytes, open) else {
            return Some(Err(LookupError::Unterminated { start }));
        };

        return Some(Ok(LookupInstruction {
            mode,
            kind,
            use_slashes,
            body: &value[open + 1..close],
            range: start..close + 1,
        }));
    }

    None
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Resolves every instruction in `value`.
///
/// After each substitution the string is scanned again from its start.
/// Returns `Ok(None)` when the string contains no instruction.
///
/// ```
/// use std::collections::BTreeMap;
/// use string_remapper::{lookup::process_string, RemapGoal, SymbolTable};
///
/// let classes = BTreeMap::from([("a/B".to_owned(), "e/D".to_owned())]);
/// let table = SymbolTable::new(classes, BTreeMap::new(), BTreeMap::new());
///
/// let remapped = process_string("SRC(a.B)", &table, RemapGoal::Production).unwrap();
/// assert_eq!(remapped.as_deref(), Some("e.D"));
/// assert_eq!(process_string("plain", &table, RemapGoal::Production), Ok(None));
/// ```
pub fn process_string(
    value: &str,
    table: &SymbolTable,
    goal: RemapGoal,
) -> Result<Option<String>, LookupError> {
    let mut current: Option<String> = None;

    loop {
        let text = current.as_deref().unwrap_or(value);
        let Some(found) = find_instruction(text) else {
            break;
        };
        let found = found?;
        let resolved = resolve(&found, table, goal)?;
        let mut next = String::with_capacity(text.len());
        next.push_str(&text[..found.range.start]);
        next.push_str(&resolved);
        next.push_str(&text[found.range.end..]);
        current = Some(next);
    }

    Ok(current)
}

/// Resolves a single instruction to its replacement text.
pub fn resolve(
    instruction: &LookupInstruction<'_>,
    table: &SymbolTable,
    goal: RemapGoal,
) -> Result<String, LookupError> {
    let LookupInstruction {
        mode, kind, body, ..
    } = *instruction;

    let resolved = match (goal, mode, kind) {
        (RemapGoal::DeveloperFacing, Mode::Advanced, Kind::Class) => body.to_owned(),
        (RemapGoal::DeveloperFacing, Mode::Simple, Kind::Class) => internal_name(body),
        (RemapGoal::DeveloperFacing, Mode::Advanced, kind) => {
            let (_, member) = split_advanced(kind, body)?;
            member.to_owned()
        }
        (RemapGoal::DeveloperFacing, Mode::Simple, kind) => {
            let (_, name) = split_simple(kind, body)?;
            name.to_owned()
        }
        (RemapGoal::Production, Mode::Advanced, Kind::Class) => {
            found(kind, body, table.class(body))?
        }
        (RemapGoal::Production, Mode::Simple, Kind::Class) => {
            let class = internal_name(body);
            found(kind, &class, table.class(&class))?
        }
        (RemapGoal::Production, Mode::Advanced, Kind::Method) => {
            split_advanced(kind, body)?;
            found(kind, body, table.method(body))?
        }
        (RemapGoal::Production, Mode::Advanced, Kind::Field) => {
            split_advanced(kind, body)?;
            found(kind, body, table.field(body))?
        }
        (RemapGoal::Production, Mode::Simple, Kind::Method) => {
            let (class, name) = split_simple(kind, body)?;
            found(kind, body, table.method_by_owner(&class, name))?
        }
        (RemapGoal::Production, Mode::Simple, Kind::Field) => {
            let (class, name) = split_simple(kind, body)?;
            found(kind, body, table.field_by_owner(&class, name))?
        }
    };

    Ok(if instruction.use_slashes {
        resolved
    } else {
        resolved.replace('/', ".")
    })
}

fn found(kind: Kind, lookup: &str, resolved: Option<&str>) -> Result<String, LookupError> {
    resolved
        .map(str::to_owned)
        .ok_or_else(|| LookupError::Unresolved {
            kind,
            lookup: lookup.to_owned(),
        })
}

/// Splits `<dotted class> <name>` into the internal class name and the
/// member name.
///
/// Tokens after the member name are ignored.
fn split_simple(kind: Kind, body: &str) -> Result<(String, &str), LookupError> {
    let mut tokens = body.split(' ');
    match (tokens.next(), tokens.next()) {
        (Some(class), Some(name)) if !class.is_empty() && !name.is_empty() => {
            Ok((internal_name(class), name))
        }
        _ => Err(invalid(kind, body)),
    }
}

/// Splits an advanced member key into its class and the bare member name.
fn split_advanced(kind: Kind, body: &str) -> Result<(&str, &str), LookupError> {
    let (class, rest) = body.split_once('.').ok_or_else(|| invalid(kind, body))?;
    let end = match kind {
        Kind::Method => '(',
        _ => '.',
    };
    let member = rest.split(end).next().unwrap_or(rest);
    if class.is_empty() || member.is_empty() {
        return Err(invalid(kind, body));
    }
    Ok((class, member))
}

fn invalid(kind: Kind, body: &str) -> LookupError {
    LookupError::InvalidBody {
        kind,
        body: body.to_owned(),
    }
}
