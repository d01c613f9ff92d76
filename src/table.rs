//! The merged symbol table.
//!
//! A [`SymbolTable`] is built once from a debug mapping and a compact
//! mapping (or loaded from its serialized form) and then shared read-only by
//! every remapping pass.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::descriptor::{java_arguments_to_descriptor, java_type_to_descriptor, remap_descriptor};
use crate::mapping::{
    CompactMapping, CompactRecord, DebugMapping, DebugRecord, ParseError, ParseErrorKind,
};

/// Selects the naming scheme lookups resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemapGoal {
    /// Readable names, stable across releases. Lookups pass through.
    #[serde(rename = "developer", alias = "mojang")]
    DeveloperFacing,
    /// Obfuscated production names. Lookups must hit the table.
    #[serde(rename = "production", alias = "spigot")]
    Production,
}

impl fmt::Display for RemapGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemapGoal::DeveloperFacing => f.write_str("developer"),
            RemapGoal::Production => f.write_str("production"),
        }
    }
}

/// Error returned when a [`RemapGoal`] cannot be parsed from a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseRemapGoalError(String);

impl fmt::Display for ParseRemapGoalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown remap goal {:?}", self.0)
    }
}

impl std::error::Error for ParseRemapGoalError {}

impl FromStr for RemapGoal {
    type Err = ParseRemapGoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "developer" | "mojang" => Ok(RemapGoal::DeveloperFacing),
            "production" | "spigot" => Ok(RemapGoal::Production),
            _ => Err(ParseRemapGoalError(s.to_owned())),
        }
    }
}

/// The three tables parsed from a debug mapping, keyed by readable names.
///
/// Class keys and values are internal (slash separated) names. Field keys
/// are `class.name.descriptor`, method keys `class.name(params)return`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugTables {
    /// Readable class name to obfuscated class name.
    pub classes: BTreeMap<String, String>,
    /// Field key to obfuscated field name.
    pub fields: BTreeMap<String, String>,
    /// Method key to obfuscated method name.
    pub methods: BTreeMap<String, String>,
}

/// Parses a debug mapping into readable-to-obfuscated tables.
///
/// Constructors and static initializers are skipped, as are methods inlined
/// from a foreign class. Fails on the first malformed line or on a member
/// line that precedes every class header.
pub fn parse_debug_mapping(source: &[u8]) -> Result<DebugTables, ParseError<'_>> {
    let mut tables = DebugTables::default();
    let mut current_class: Option<String> = None;

    let mut records = DebugMapping::new(source).iter();
    while let Some(record) = records.next() {
        let record = record?;
        match record {
            DebugRecord::Comment(_) => {}
            DebugRecord::Class {
                original,
                obfuscated,
            } => {
                let class = internal_name(original);
                tables
                    .classes
                    .insert(class.clone(), internal_name(obfuscated));
                current_class = Some(class);
            }
            DebugRecord::Field {
                ty,
                original,
                obfuscated,
            } => {
                let Some(class) = current_class.as_deref() else {
                    return Err(records.error(ParseErrorKind::MissingClass));
                };
                let key = format!("{class}.{original}.{}", java_type_to_descriptor(ty));
                tables.fields.insert(key, obfuscated.to_owned());
            }
            DebugRecord::Method {
                ty,
                original,
                obfuscated,
                arguments,
                original_class,
                ..
            } => {
                if original == "<init>" || original == "<clinit>" {
                    continue;
                }
                let Some(class) = current_class.as_deref() else {
                    return Err(records.error(ParseErrorKind::MissingClass));
                };
                if original_class.is_some() {
                    continue;
                }
                let key = format!(
                    "{class}.{original}({}){}",
                    java_arguments_to_descriptor(arguments),
                    java_type_to_descriptor(ty)
                );
                tables.methods.insert(key, obfuscated.to_owned());
            }
        }
    }

    Ok(tables)
}

/// Parses a compact mapping into an obfuscated-to-readable class table.
pub fn parse_compact_mapping(source: &[u8]) -> Result<BTreeMap<String, String>, ParseError<'_>> {
    let mut classes = BTreeMap::new();
    for record in CompactMapping::new(source).iter() {
        if let CompactRecord::Class {
            obfuscated,
            original,
        } = record?
        {
            classes.insert(obfuscated.to_owned(), original.to_owned());
        }
    }
    Ok(classes)
}

/// Resolves a nested class through its outer classes.
///
/// The name is split on `$` and the longest proper outer prefix found in
/// `classes` wins; the stripped inner segments are appended to its mapping.
/// Returns `None` for top-level names and when no outer class is known.
///
/// ```
/// use std::collections::BTreeMap;
/// use string_remapper::resolve_nested_class;
///
/// let classes = BTreeMap::from([("abc".to_owned(), "net/Thing".to_owned())]);
/// assert_eq!(
///     resolve_nested_class("abc$a$b", &classes).as_deref(),
///     Some("net/Thing$a$b")
/// );
/// assert_eq!(resolve_nested_class("abc", &classes), None);
/// ```
pub fn resolve_nested_class(name: &str, classes: &BTreeMap<String, String>) -> Option<String> {
    let separators: Vec<usize> = name.match_indices('$').map(|(idx, _)| idx).collect();
    separators.iter().rev().find_map(|&idx| {
        let (outer, inner) = name.split_at(idx);
        classes.get(outer).map(|mapped| format!("{mapped}{inner}"))
    })
}

/// Merges the debug tables with the compact class table.
///
/// Every readable class resolves to its compact name when the obfuscated
/// name is listed, to the nested fallback chain otherwise, and finally to
/// the obfuscated name itself. Field and method tables carry through.
pub fn merge(debug: DebugTables, compact: &BTreeMap<String, String>) -> SymbolTable {
    let classes = debug
        .classes
        .into_iter()
        .map(|(readable, obfuscated)| {
            let resolved = match compact.get(&obfuscated) {
                Some(mapped) => mapped.clone(),
                None => resolve_nested_class(&obfuscated, compact).unwrap_or(obfuscated),
            };
            (readable, resolved)
        })
        .collect();

    SymbolTable::new(classes, debug.fields, debug.methods)
}

/// Converts a dotted class name into its internal form.
pub(crate) fn internal_name(class: &str) -> String {
    class.replace('.', "/")
}

/// Class, field and method mappings in one naming scheme.
///
/// The owner indexes used by simple lookups are derived lazily and at most
/// once, so a shared table is safe for concurrent readers.
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTable {
    class_mappings: BTreeMap<String, String>,
    field_mappings: BTreeMap<String, String>,
    method_mappings: BTreeMap<String, String>,
    #[serde(skip)]
    field_owners: OnceLock<HashMap<String, String>>,
    #[serde(skip)]
    method_owners: OnceLock<HashMap<String, String>>,
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("classes", &self.class_mappings.len())
            .field("fields", &self.field_mappings.len())
            .field("methods", &self.method_mappings.len())
            .finish()
    }
}

impl Clone for SymbolTable {
    fn clone(&self) -> Self {
        Self::new(
            self.class_mappings.clone(),
            self.field_mappings.clone(),
            self.method_mappings.clone(),
        )
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &Self) -> bool {
        self.class_mappings == other.class_mappings
            && self.field_mappings == other.field_mappings
            && self.method_mappings == other.method_mappings
    }
}

impl Eq for SymbolTable {}

impl SymbolTable {
    /// Creates a table from already resolved mappings.
    pub fn new(
        class_mappings: BTreeMap<String, String>,
        field_mappings: BTreeMap<String, String>,
        method_mappings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            class_mappings,
            field_mappings,
            method_mappings,
            field_owners: OnceLock::new(),
            method_owners: OnceLock::new(),
        }
    }

    /// Parses and merges a debug mapping and a compact mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// let debug = b"net.minecraft.world.Level -> cmm:\n    boolean isClientSide() -> y";
    /// let compact = b"cmm net/minecraft/world/level/World";
    ///
    /// let table = string_remapper::SymbolTable::from_mappings(debug, compact).unwrap();
    /// assert_eq!(
    ///     table.class("net/minecraft/world/Level"),
    ///     Some("net/minecraft/world/level/World")
    /// );
    /// assert_eq!(table.method("net/minecraft/world/Level.isClientSide()Z"), Some("y"));
    /// ```
    pub fn from_mappings<'s>(debug: &'s [u8], compact: &'s [u8]) -> Result<Self, ParseError<'s>> {
        let debug = parse_debug_mapping(debug)?;
        let compact = parse_compact_mapping(compact)?;
        Ok(merge(debug, &compact))
    }

    /// Loads a table from its JSON form.
    pub fn from_reader<R: io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(io::BufReader::new(reader))
    }

    /// Loads a table from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Writes the table as a JSON document with the three mapping sections.
    pub fn to_writer<W: io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    /// Serializes the table into a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The total number of class, field and method mappings.
    pub fn len(&self) -> usize {
        self.class_mappings.len() + self.field_mappings.len() + self.method_mappings.len()
    }

    /// Whether the table holds no mappings at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All class mappings.
    pub fn class_mappings(&self) -> &BTreeMap<String, String> {
        &self.class_mappings
    }

    /// All field mappings.
    pub fn field_mappings(&self) -> &BTreeMap<String, String> {
        &self.field_mappings
    }

    /// All method mappings.
    pub fn method_mappings(&self) -> &BTreeMap<String, String> {
        &self.method_mappings
    }

    /// Looks up a class by its internal name.
    pub fn class(&self, class: &str) -> Option<&str> {
        self.class_mappings.get(class).map(String::as_str)
    }

    /// Looks up a field by its `class.name.descriptor` key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.field_mappings.get(key).map(String::as_str)
    }

    /// Looks up a method by its `class.name(params)return` key.
    pub fn method(&self, key: &str) -> Option<&str> {
        self.method_mappings.get(key).map(String::as_str)
    }

    /// Looks up a field by owner and name only, ignoring its type.
    pub fn field_by_owner(&self, class: &str, name: &str) -> Option<&str> {
        self.field_owners()
            .get(&format!("{class}.{name}"))
            .map(String::as_str)
    }

    /// Looks up a method by owner and name only, ignoring its descriptor.
    ///
    /// When overloads map to different names, only one of them is reachable
    /// this way.
    pub fn method_by_owner(&self, class: &str, name: &str) -> Option<&str> {
        self.method_owners()
            .get(&format!("{class}.{name}"))
            .map(String::as_str)
    }

    /// Remaps the class portion of a field descriptor, keeping array
    /// dimensions. Unknown classes and primitives come back unchanged.
    pub fn remap_descriptor<'d>(&self, descriptor: &'d str) -> Cow<'d, str> {
        remap_descriptor(descriptor, |class| self.class(class))
    }

    fn field_owners(&self) -> &HashMap<String, String> {
        // `class.name.descriptor` -> `class.name`; later keys overwrite earlier ones
        self.field_owners.get_or_init(|| {
            owner_index(&self.field_mappings, |key| {
                key.rfind('.').map(|pos| &key[..pos])
            })
        })
    }

    fn method_owners(&self) -> &HashMap<String, String> {
        // `class.name(params)return` -> `class.name`; later keys overwrite earlier ones
        self.method_owners.get_or_init(|| {
            owner_index(&self.method_mappings, |key| {
                key.rfind('(').map(|pos| &key[..pos])
            })
        })
    }
}

fn owner_index<F>(mappings: &BTreeMap<String, String>, strip: F) -> HashMap<String, String>
where
    F: Fn(&str) -> Option<&str>,
{
    let mut index = HashMap::with_capacity(mappings.len());
    for (key, value) in mappings {
        if let Some(owner) = strip(key) {
            index.insert(owner.to_owned(), value.clone());
        }
    }
    index
}
