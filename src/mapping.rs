//! Line parsers for the two mapping sources.
//!
//! The debug mapping uses the proguard text format: a class header line
//! followed by indented field and method lines. The compact mapping lists
//! one class per line as `<obfuscated> <readable>` in internal (slash) form.
//!
//! Both parsers work line by line and yield one record or one
//! [`ParseError`] per non-blank line.

use std::fmt;
use std::str;

/// Error when parsing a mapping line.
///
/// Since mappings are parsed line-by-line, an error also contains the
/// offending line and its 1-based line number.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParseError<'s> {
    line_number: usize,
    line: &'s [u8],
    kind: ParseErrorKind,
}

impl<'s> ParseError<'s> {
    /// The 1-based number of the offending line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The offending line that caused the error.
    pub fn line(&self) -> &'s [u8] {
        self.line
    }

    /// The specific parse Error.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line_number)?;
        match self.kind {
            ParseErrorKind::Utf8Error(e) => e.fmt(f)?,
            ParseErrorKind::ParseError(d) => d.fmt(f)?,
            ParseErrorKind::MissingClass => f.write_str("member line without a class header")?,
        }
        write!(f, ": {:?}", String::from_utf8_lossy(self.line))
    }
}

impl std::error::Error for ParseError<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ParseErrorKind::Utf8Error(ref e) => Some(e),
            _ => None,
        }
    }
}

/// The specific parse Error.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    /// The line failed utf-8 conversion.
    Utf8Error(str::Utf8Error),
    /// The line matches none of the known record grammars.
    ParseError(&'static str),
    /// A member line appeared before any class header.
    MissingClass,
}

const INVALID_DEBUG_RECORD: &str = "line is not a valid debug mapping record";
const INVALID_COMPACT_RECORD: &str = "line is not a valid compact mapping record";

/// A debug mapping file in the proguard text format.
#[derive(Clone, Default)]
pub struct DebugMapping<'s> {
    source: &'s [u8],
}

impl fmt::Debug for DebugMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugMapping").finish()
    }
}

impl<'s> DebugMapping<'s> {
    /// Create a new debug mapping over the raw file contents.
    pub fn new(source: &'s [u8]) -> Self {
        Self { source }
    }

    /// Create an Iterator over [`DebugRecord`]s.
    pub fn iter(&self) -> DebugRecordIter<'s> {
        DebugRecordIter {
            lines: Lines::new(self.source),
        }
    }
}

/// A debug mapping record.
#[derive(Clone, Debug, PartialEq)]
pub enum DebugRecord<'s> {
    /// A `#` comment or header line.
    Comment(&'s str),
    /// A Class Mapping.
    Class {
        /// Readable name of the class.
        original: &'s str,
        /// Obfuscated name of the class.
        obfuscated: &'s str,
    },
    /// A Field Mapping.
    Field {
        /// Type of the field.
        ty: &'s str,
        /// Readable name of the field.
        original: &'s str,
        /// Obfuscated name of the field.
        obfuscated: &'s str,
    },
    /// A Method Mapping.
    Method {
        /// Return Type of the method.
        ty: &'s str,
        /// Readable name of the method.
        original: &'s str,
        /// Obfuscated name of the method.
        obfuscated: &'s str,
        /// Arguments of the method as raw string.
        arguments: &'s str,
        /// Original class of a foreign inlined method.
        original_class: Option<&'s str>,
    },
}

impl<'s> DebugRecord<'s> {
    /// Parses a single line of a debug mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// use string_remapper::DebugRecord;
    ///
    /// let parsed = DebugRecord::try_parse(b"net.minecraft.world.Level -> cmm:");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(DebugRecord::Class {
    ///         original: "net.minecraft.world.Level",
    ///         obfuscated: "cmm",
    ///     })
    /// );
    ///
    /// let parsed = DebugRecord::try_parse(b"    12:14:boolean isClientSide(int) -> y");
    /// assert!(matches!(
    ///     parsed,
    ///     Ok(DebugRecord::Method { original: "isClientSide", arguments: "int", .. })
    /// ));
    /// ```
    pub fn try_parse(line: &'s [u8]) -> Result<Self, ParseError<'s>> {
        parse_debug_line(line).map_err(|kind| ParseError {
            line_number: 1,
            line,
            kind,
        })
    }
}

/// An Iterator yielding [`DebugRecord`]s, created by [`DebugMapping::iter`].
#[derive(Clone, Debug)]
pub struct DebugRecordIter<'s> {
    lines: Lines<'s>,
}

impl<'s> DebugRecordIter<'s> {
    /// Creates an error pointing at the line of the last yielded record.
    pub(crate) fn error(&self, kind: ParseErrorKind) -> ParseError<'s> {
        ParseError {
            line_number: self.lines.line_number,
            line: self.lines.current,
            kind,
        }
    }
}

impl<'s> Iterator for DebugRecordIter<'s> {
    type Item = Result<DebugRecord<'s>, ParseError<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line_number, line) = self.lines.next()?;
        Some(parse_debug_line(line).map_err(|kind| ParseError {
            line_number,
            line,
            kind,
        }))
    }
}

/// A compact class mapping file (`<obfuscated> <readable>` per line).
#[derive(Clone, Default)]
pub struct CompactMapping<'s> {
    source: &'s [u8],
}

impl fmt::Debug for CompactMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactMapping").finish()
    }
}

impl<'s> CompactMapping<'s> {
    /// Create a new compact mapping over the raw file contents.
    pub fn new(source: &'s [u8]) -> Self {
        Self { source }
    }

    /// Create an Iterator over [`CompactRecord`]s.
    pub fn iter(&self) -> CompactRecordIter<'s> {
        CompactRecordIter {
            lines: Lines::new(self.source),
        }
    }
}

/// A compact mapping record.
#[derive(Clone, Debug, PartialEq)]
pub enum CompactRecord<'s> {
    /// A `#` comment line.
    Comment(&'s str),
    /// A Class Mapping.
    Class {
        /// Obfuscated internal name of the class.
        obfuscated: &'s str,
        /// Readable internal name of the class.
        original: &'s str,
    },
}

/// An Iterator yielding [`CompactRecord`]s, created by [`CompactMapping::iter`].
#[derive(Clone, Debug)]
pub struct CompactRecordIter<'s> {
    lines: Lines<'s>,
}

impl<'s> Iterator for CompactRecordIter<'s> {
    type Item = Result<CompactRecord<'s>, ParseError<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line_number, line) = self.lines.next()?;
        Some(parse_compact_line(line).map_err(|kind| ParseError {
            line_number,
            line,
            kind,
        }))
    }
}

/// Splits a buffer into numbered lines, skipping blank ones.
#[derive(Clone, Debug)]
struct Lines<'s> {
    rest: &'s [u8],
    current: &'s [u8],
    line_number: usize,
}

impl<'s> Lines<'s> {
    fn new(source: &'s [u8]) -> Self {
        Self {
            rest: source,
            current: &[],
            line_number: 0,
        }
    }
}

impl<'s> Iterator for Lines<'s> {
    type Item = (usize, &'s [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let (line, rest) = match self.rest.iter().position(|c| *c == b'\n') {
                Some(pos) => (&self.rest[..pos], &self.rest[pos + 1..]),
                None => (self.rest, &[] as &[u8]),
            };
            self.rest = rest;
            self.line_number += 1;

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.iter().all(u8::is_ascii_whitespace) {
                self.current = line;
                return Some((self.line_number, line));
            }
        }
        None
    }
}

fn parse_debug_line(line: &[u8]) -> Result<DebugRecord<'_>, ParseErrorKind> {
    let line = str::from_utf8(line).map_err(ParseErrorKind::Utf8Error)?;

    if let Some(comment) = line.strip_prefix('#') {
        Ok(DebugRecord::Comment(comment.trim()))
    } else if line.starts_with("    ") {
        parse_field_or_method(line)
    } else {
        parse_class(line)
    }
}

/// Parses a single field or method line.
fn parse_field_or_method(line: &str) -> Result<DebugRecord<'_>, ParseErrorKind> {
    // field line or method line:
    // `fieldtype fieldname -> obfuscatedfieldname`
    // `[startline:endline:]returntype [classname.]methodname(argumenttype,...)`
    //     `[:originalstartline[:originalendline]] -> obfuscatedmethodname`
    // Line numbers are validated and dropped.
    let rest = parse_prefix(line, "    ")?;

    let (has_lines, rest) = match parse_usize(rest) {
        Ok((_, rest)) => {
            let rest = parse_prefix(rest, ":")?;
            let (_, rest) = parse_usize(rest)?;
            (true, parse_prefix(rest, ":")?)
        }
        Err(_) => (false, rest),
    };

    let (ty, rest) = parse_until(rest, |c| c == ' ')?;
    let rest = parse_prefix(rest, " ")?;
    let (original, rest) = parse_until(rest, |c| c == ' ' || c == '(')?;

    let (arguments, rest) = match parse_prefix(rest, "(") {
        Ok(rest) => {
            let (arguments, rest) = rest
                .split_once(')')
                .ok_or(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD))?;
            (Some(arguments), rest)
        }
        Err(_) => (None, rest),
    };

    let rest = match arguments.and_then(|_| rest.strip_prefix(':')) {
        Some(rest) => {
            let (_, rest) = parse_usize(rest)?;
            match rest.strip_prefix(':') {
                Some(rest) => parse_usize(rest)?.1,
                None => rest,
            }
        }
        None => rest,
    };

    let rest = parse_prefix(rest, " -> ")?;
    let (obfuscated, rest) = parse_until(rest, char::is_whitespace)?;
    expect_end(rest)?;

    let record = match arguments {
        Some(arguments) => {
            let (original_class, original) = match original.rsplit_once('.') {
                Some((class, name)) => (Some(class), name),
                None => (None, original),
            };

            DebugRecord::Method {
                ty,
                original,
                obfuscated,
                arguments,
                original_class,
            }
        }
        None if !has_lines => DebugRecord::Field {
            ty,
            original,
            obfuscated,
        },
        // fields never carry line ranges
        None => return Err(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD)),
    };

    Ok(record)
}

/// Parses a single class header line.
fn parse_class(line: &str) -> Result<DebugRecord<'_>, ParseErrorKind> {
    // class line:
    // `classname -> obfuscatedclassname:`
    let (original, rest) = parse_until(line, |c| c == ' ')?;
    let rest = parse_prefix(rest, " -> ")?;
    let (obfuscated, rest) = parse_until(rest, |c| c == ':' || c.is_whitespace())?;
    let rest = parse_prefix(rest, ":")?;
    expect_end(rest)?;

    Ok(DebugRecord::Class {
        original,
        obfuscated,
    })
}

fn parse_compact_line(line: &[u8]) -> Result<CompactRecord<'_>, ParseErrorKind> {
    let line = str::from_utf8(line).map_err(ParseErrorKind::Utf8Error)?;

    if let Some(comment) = line.strip_prefix('#') {
        return Ok(CompactRecord::Comment(comment.trim()));
    }

    let mut tokens = line.split_ascii_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(obfuscated), Some(original), None) => Ok(CompactRecord::Class {
            obfuscated,
            original,
        }),
        _ => Err(ParseErrorKind::ParseError(INVALID_COMPACT_RECORD)),
    }
}

fn parse_usize(s: &str) -> Result<(usize, &str), ParseErrorKind> {
    let pos = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, rest) = s.split_at(pos);

    match digits.parse() {
        Ok(value) => Ok((value, rest)),
        Err(_) => Err(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD)),
    }
}

fn parse_prefix<'s>(s: &'s str, prefix: &str) -> Result<&'s str, ParseErrorKind> {
    s.strip_prefix(prefix)
        .ok_or(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD))
}

/// Splits off a non-empty token ending right before `predicate` matches.
fn parse_until<P>(s: &str, predicate: P) -> Result<(&str, &str), ParseErrorKind>
where
    P: Fn(char) -> bool,
{
    let (token, rest) = match s.find(predicate) {
        Some(pos) => s.split_at(pos),
        None => (s, ""),
    };

    if token.is_empty() {
        Err(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD))
    } else {
        Ok((token, rest))
    }
}

fn expect_end(rest: &str) -> Result<(), ParseErrorKind> {
    if rest.trim_end().is_empty() {
        Ok(())
    } else {
        Err(ParseErrorKind::ParseError(INVALID_DEBUG_RECORD))
    }
}
