//! Rewriting of a single class file.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, trace};

use crate::classfile::{AttributeInfo, ClassError, ClassFile, Constant, ConstantPool, ElementValue};
use crate::lookup::{process_string, LookupError};
use crate::proxy;
use crate::table::{RemapGoal, SymbolTable};

const KOTLIN_METADATA: &str = "Lkotlin/Metadata;";
const METADATA_STRINGS: &str = "d2";

/// Errors remapping a class.
#[derive(Debug, Error)]
pub enum RemapError {
    /// The class could not be read or written.
    #[error(transparent)]
    Class(#[from] ClassError),
    /// A lookup in one of the class's strings failed.
    #[error("failed to remap {value:?} in {class}")]
    Lookup {
        /// Internal name of the class.
        class: String,
        /// The string holding the failed lookup.
        value: String,
        /// Why the lookup failed.
        #[source]
        source: LookupError,
    },
}

/// Counts the substitutions made while visiting a class.
///
/// Each visit returns its own tracker and callers [`merge`](Self::merge)
/// them, so one substitution anywhere marks the whole class as changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    changes: usize,
}

impl ChangeTracker {
    /// A tracker without changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one substitution.
    pub fn record(&mut self) {
        self.changes += 1;
    }

    /// Adds the substitutions of another tracker.
    pub fn merge(&mut self, other: ChangeTracker) {
        self.changes += other.changes;
    }

    /// Whether anything was substituted.
    pub fn is_changed(&self) -> bool {
        self.changes > 0
    }

    /// The number of substitutions.
    pub fn count(&self) -> usize {
        self.changes
    }
}

/// Remaps lookup strings, Kotlin metadata and reflection proxies in class
/// files.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use string_remapper::classfile::ClassFile;
/// use string_remapper::{ClassRemapper, RemapGoal, SymbolTable};
///
/// let table = SymbolTable::new(BTreeMap::new(), BTreeMap::new(), BTreeMap::new());
/// let remapper = ClassRemapper::new(&table, RemapGoal::Production);
///
/// let class = ClassFile::new("a/Plain", "java/lang/Object").unwrap();
/// assert_eq!(remapper.remap(&class.to_bytes().unwrap()).unwrap(), None);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ClassRemapper<'t> {
    table: &'t SymbolTable,
    goal: RemapGoal,
}

impl<'t> ClassRemapper<'t> {
    /// Creates a remapper resolving against `table`.
    pub fn new(table: &'t SymbolTable, goal: RemapGoal) -> Self {
        Self { table, goal }
    }

    /// The goal lookups resolve to.
    pub fn goal(&self) -> RemapGoal {
        self.goal
    }

    /// Remaps a class file.
    ///
    /// Returns `None` if nothing had to change, in which case the input
    /// bytes stay valid as they are.
    pub fn remap(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, RemapError> {
        let mut class = ClassFile::parse(bytes)?;
        let changes = self.remap_class(&mut class)?;
        if !changes.is_changed() {
            return Ok(None);
        }
        Ok(Some(class.to_bytes()?))
    }

    /// Remaps an already parsed class in place.
    pub fn remap_class(&self, class: &mut ClassFile) -> Result<ChangeTracker, RemapError> {
        let mut changes = ChangeTracker::new();
        if self.goal == RemapGoal::Production {
            changes.merge(proxy::patch(class, self.table)?);
            changes.merge(self.remap_metadata(class)?);
        }
        changes.merge(self.remap_strings(class)?);

        if changes.is_changed() {
            let name = class.name()?;
            debug!(class = %name, changes = changes.count(), "remapped class");
        }
        Ok(changes)
    }

    /// Resolves the lookups in every string loaded by `ldc` or used as a
    /// field's constant value.
    fn remap_strings(&self, class: &mut ClassFile) -> Result<ChangeTracker, RemapError> {
        let mut changes = ChangeTracker::new();
        let class_name = class.name()?.into_owned();
        let sites = string_sites(class)?;

        // String entry -> the Utf8 entry it pointed at before
        let mut redirected = BTreeMap::new();
        let pool = &mut class.constant_pool;
        for index in sites {
            let Constant::String { string_index } = *pool.get(index)? else {
                continue;
            };
            let Some(value) = decode(pool, string_index)? else {
                trace!(class = %class_name, index, "skipping undecodable string");
                continue;
            };
            let value = value.into_owned();

            let remapped = process_string(&value, self.table, self.goal).map_err(|source| {
                RemapError::Lookup {
                    class: class_name.clone(),
                    value: value.clone(),
                    source,
                }
            })?;
            let Some(remapped) = remapped else {
                continue;
            };

            let utf8_index = pool.add_utf8(&remapped)?;
            pool.redirect_string(index, utf8_index)?;
            redirected.insert(index, string_index);
            debug!(class = %class_name, from = %value, to = %remapped, "remapped string");
            changes.record();
        }

        if !redirected.is_empty() {
            detach_bootstrap_arguments(class, &redirected)?;
        }
        Ok(changes)
    }

    /// Remaps the type descriptors in the `d2` strings of `@kotlin.Metadata`.
    fn remap_metadata(&self, class: &mut ClassFile) -> Result<ChangeTracker, RemapError> {
        let mut changes = ChangeTracker::new();
        let ClassFile {
            constant_pool: pool,
            attributes,
            ..
        } = class;

        for attribute in attributes.iter_mut() {
            let AttributeInfo::RuntimeVisibleAnnotations(annotations) = &mut attribute.info else {
                continue;
            };
            for annotation in annotations.iter_mut() {
                if pool.utf8(annotation.type_index)? != KOTLIN_METADATA {
                    continue;
                }
                let strings = annotation.element_mut(|name_index| {
                    matches!(pool.utf8(name_index).as_deref(), Ok(METADATA_STRINGS))
                });
                let Some(ElementValue::Array(strings)) = strings else {
                    continue;
                };

                for element in strings.iter_mut() {
                    let ElementValue::Const {
                        tag: b's',
                        value_index,
                    } = element
                    else {
                        continue;
                    };
                    let Some(value) = decode(pool, *value_index)? else {
                        continue;
                    };
                    if !is_type_descriptor(&value) {
                        continue;
                    }
                    let remapped = match self.table.remap_descriptor(&value) {
                        Cow::Owned(remapped) if remapped != *value => remapped,
                        _ => continue,
                    };
                    trace!(from = %value, to = %remapped, "remapped metadata descriptor");
                    *value_index = pool.add_utf8(&remapped)?;
                    changes.record();
                }
            }
        }

        Ok(changes)
    }
}

/// Decodes a Utf8 entry, `None` if it holds a string Rust cannot represent.
fn decode(pool: &ConstantPool, index: u16) -> Result<Option<Cow<'_, str>>, ClassError> {
    match pool.utf8(index) {
        Ok(value) => Ok(Some(value)),
        Err(ClassError::InvalidUtf8 { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Matches `[*L<non-whitespace>;`.
fn is_type_descriptor(value: &str) -> bool {
    let element = value.trim_start_matches('[');
    match element.strip_prefix('L').and_then(|rest| rest.strip_suffix(';')) {
        Some(class) => !class.is_empty() && !class.chars().any(char::is_whitespace),
        None => false,
    }
}

/// The String entries loaded by `ldc` instructions or referenced as field
/// constant values.
fn string_sites(class: &ClassFile) -> Result<BTreeSet<u16>, ClassError> {
    let pool = &class.constant_pool;
    let is_string = |index: u16| -> Result<bool, ClassError> {
        Ok(matches!(pool.get(index)?, Constant::String { .. }))
    };

    let mut sites = BTreeSet::new();
    for field in &class.fields {
        if let Some(index) = field.constant_value() {
            if is_string(index)? {
                sites.insert(index);
            }
        }
    }
    for method in &class.methods {
        let Some(code) = method.code() else {
            continue;
        };
        for instruction in code.instructions() {
            let instruction = instruction?;
            if !instruction.is_ldc() {
                continue;
            }
            if let Some(index) = instruction.constant_index() {
                if is_string(index)? {
                    sites.insert(index);
                }
            }
        }
    }
    Ok(sites)
}

/// Points bootstrap arguments that shared a redirected String entry at a
/// copy of the old constant, so they keep their value.
fn detach_bootstrap_arguments(
    class: &mut ClassFile,
    redirected: &BTreeMap<u16, u16>,
) -> Result<(), ClassError> {
    let ClassFile {
        constant_pool: pool,
        attributes,
        ..
    } = class;
    let mut copies: BTreeMap<u16, u16> = BTreeMap::new();

    for attribute in attributes.iter_mut() {
        let AttributeInfo::BootstrapMethods(methods) = &mut attribute.info else {
            continue;
        };
        for argument in methods.iter_mut().flat_map(|method| method.arguments.iter_mut()) {
            let Some(&string_index) = redirected.get(&*argument) else {
                continue;
            };
            let copy = match copies.get(&*argument) {
                Some(&copy) => copy,
                None => {
                    let copy = pool.push(Constant::String { string_index })?;
                    copies.insert(*argument, copy);
                    copy
                }
            };
            trace!(from = *argument, to = copy, "detached bootstrap argument");
            *argument = copy;
        }
    }
    Ok(())
}
