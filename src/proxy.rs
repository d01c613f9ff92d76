//! Patching of Kotlin reflection proxies.
//!
//! For a callable reference like `Level::isClientSide` the Kotlin compiler
//! emits a nested class extending one of the `kotlin.jvm.internal`
//! reference implementations. Its constructor passes the owner class, the
//! member name and a signature string to the superclass:
//!
//! ```text
//! aload_0
//! ldc       Lnet/minecraft/world/Level;   // owner
//! ldc       "isClientSide"                // name
//! ldc       "isClientSide()Z"             // signature
//! iconst_0                                // flags
//! invokespecial PropertyReference1Impl.<init>
//! ```
//!
//! Those constants name the readable member, so they have to be remapped
//! alongside everything else when building for production.

use std::borrow::Cow;

use tracing::debug;

use crate::classfile::code::opcodes::{BIPUSH, ICONST_5, ICONST_M1, INVOKESPECIAL, LDC, SIPUSH};
use crate::classfile::{AttributeInfo, ClassError, ClassFile, Constant, Instruction};
use crate::descriptor::split_method_descriptor;
use crate::remapper::ChangeTracker;
use crate::table::SymbolTable;

/// What a reflection proxy refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReflectKind {
    /// A function reference.
    Function,
    /// A property reference, read through its getter.
    Property,
}

impl ReflectKind {
    /// The kind of proxy a superclass implements, if any.
    pub fn of_superclass(name: &str) -> Option<Self> {
        match name {
            "kotlin/jvm/internal/FunctionReferenceImpl" => Some(ReflectKind::Function),
            "kotlin/jvm/internal/PropertyReference0Impl"
            | "kotlin/jvm/internal/PropertyReference1Impl"
            | "kotlin/jvm/internal/PropertyReference2Impl"
            | "kotlin/jvm/internal/MutablePropertyReference0Impl"
            | "kotlin/jvm/internal/MutablePropertyReference1Impl"
            | "kotlin/jvm/internal/MutablePropertyReference2Impl" => Some(ReflectKind::Property),
            _ => None,
        }
    }
}

/// The constants a proxy constructor passes to its superclass.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ProxyOperands {
    method: usize,
    owner: String,
    name: LoadedString,
    signature: LoadedString,
}

/// A String constant and the `ldc` loading it.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LoadedString {
    offset: usize,
    opcode: u8,
    index: u16,
    value: String,
}

/// Remaps the owner, name and signature constants of a reflection proxy.
///
/// Classes that are not nested or do not extend a reference implementation
/// are left alone, as are constructors of an unexpected shape.
pub fn patch(class: &mut ClassFile, table: &SymbolTable) -> Result<ChangeTracker, ClassError> {
    let mut changes = ChangeTracker::new();
    let Some(super_name) = class.super_name()? else {
        return Ok(changes);
    };
    let Some(kind) = ReflectKind::of_superclass(&super_name) else {
        return Ok(changes);
    };
    if !class.is_nested() {
        return Ok(changes);
    }
    let super_name = super_name.into_owned();
    let class_name = class.name()?.into_owned();

    let Some(operands) = find_operands(class, &super_name)? else {
        debug!(class = %class_name, "unexpected reflection proxy constructor");
        return Ok(changes);
    };

    let name = operands.name.value.as_str();
    let (new_name, new_signature) = match kind {
        ReflectKind::Property => {
            let Some((_, descriptor)) = operands.signature.value.split_once(')') else {
                debug!(class = %class_name, "property signature without return type");
                return Ok(changes);
            };
            let key = format!("{}.{}.{}", operands.owner, name, descriptor);
            let new_name = table.field(&key).unwrap_or(name);
            let new_descriptor = table.remap_descriptor(descriptor);
            if new_name == name && new_descriptor == descriptor {
                return Ok(changes);
            }
            let signature = format!("get{}(){}", capitalize(new_name), new_descriptor);
            (new_name.to_owned(), signature)
        }
        ReflectKind::Function => {
            let Some((_, rest)) = operands.signature.value.split_once('(') else {
                debug!(class = %class_name, "function signature without parameters");
                return Ok(changes);
            };
            let descriptor = format!("({rest}");
            let key = format!("{}.{}{}", operands.owner, name, descriptor);
            let new_name = table.method(&key).unwrap_or(name);

            let Some((parameters, return_type)) = split_method_descriptor(&descriptor) else {
                debug!(class = %class_name, %descriptor, "malformed function signature");
                return Ok(changes);
            };
            let mut new_descriptor = String::with_capacity(descriptor.len());
            new_descriptor.push('(');
            for parameter in parameters {
                new_descriptor.push_str(&table.remap_descriptor(parameter));
            }
            new_descriptor.push(')');
            new_descriptor.push_str(&table.remap_descriptor(return_type));

            if new_name == name && new_descriptor == descriptor {
                return Ok(changes);
            }
            (new_name.to_owned(), format!("{new_name}{new_descriptor}"))
        }
    };

    debug!(
        class = %class_name,
        owner = %operands.owner,
        from = %operands.signature.value,
        to = %new_signature,
        "patched reflection proxy"
    );
    replace_loaded_string(class, operands.method, &operands.name, &new_name)?;
    replace_loaded_string(class, operands.method, &operands.signature, &new_signature)?;
    changes.record();
    Ok(changes)
}

/// Uppercases the first character, like Kotlin's getter names do.
fn capitalize(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            let mut capitalized: String = first.to_uppercase().collect();
            capitalized.push_str(chars.as_str());
            Cow::Owned(capitalized)
        }
        _ => Cow::Borrowed(name),
    }
}

/// Matches the four instructions in front of the superclass constructor
/// call: `ldc Class`, `ldc String`, `ldc String` and an int push.
fn find_operands(class: &ClassFile, super_name: &str) -> Result<Option<ProxyOperands>, ClassError> {
    let pool = &class.constant_pool;
    let mut constructor = None;
    for (position, method) in class.methods.iter().enumerate() {
        if class.member_name(method)? == "<init>" {
            constructor = method.code().map(|code| (position, code));
            break;
        }
    }
    let Some((method, code)) = constructor else {
        return Ok(None);
    };

    let instructions = code.instructions().collect::<Result<Vec<_>, _>>()?;
    let mut super_call = None;
    for (position, instruction) in instructions.iter().enumerate() {
        if instruction.opcode != INVOKESPECIAL {
            continue;
        }
        let Some(index) = instruction.constant_index() else {
            continue;
        };
        let (owner, name, _) = pool.member_ref(index)?;
        if owner == super_name && name == "<init>" {
            super_call = Some(position);
            break;
        }
    }
    let Some(position) = super_call else {
        return Ok(None);
    };
    let Some(window) = position.checked_sub(4).map(|start| &instructions[start..position]) else {
        return Ok(None);
    };

    let [owner, name, signature, flags] = window else {
        return Ok(None);
    };
    if !is_int_push(class, flags)? {
        return Ok(None);
    }
    let owner = match ldc_constant(class, owner)? {
        Some(Constant::Class { name_index }) => pool.utf8(*name_index)?.into_owned(),
        _ => return Ok(None),
    };
    let name = loaded_string(class, name)?;
    let signature = loaded_string(class, signature)?;
    let (Some(name), Some(signature)) = (name, signature) else {
        return Ok(None);
    };

    Ok(Some(ProxyOperands {
        method,
        owner,
        name,
        signature,
    }))
}

fn ldc_constant<'c>(
    class: &'c ClassFile,
    instruction: &Instruction<'_>,
) -> Result<Option<&'c Constant>, ClassError> {
    if !instruction.is_ldc() {
        return Ok(None);
    }
    match instruction.constant_index() {
        Some(index) => class.constant_pool.get(index).map(Some),
        None => Ok(None),
    }
}

fn loaded_string(
    class: &ClassFile,
    instruction: &Instruction<'_>,
) -> Result<Option<LoadedString>, ClassError> {
    let Some(&Constant::String { string_index }) = ldc_constant(class, instruction)? else {
        return Ok(None);
    };
    Ok(Some(LoadedString {
        offset: instruction.offset,
        opcode: instruction.opcode,
        index: instruction.constant_index().unwrap_or_default(),
        value: class.constant_pool.utf8(string_index)?.into_owned(),
    }))
}

fn is_int_push(class: &ClassFile, instruction: &Instruction<'_>) -> Result<bool, ClassError> {
    Ok(match instruction.opcode {
        ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => true,
        _ => matches!(ldc_constant(class, instruction)?, Some(Constant::Integer(_))),
    })
}

/// Makes the `ldc` at `loaded.offset` load `value`.
///
/// A String entry used only by this instruction is redirected in place.
/// A shared one is left alone and the instruction gets a new entry, unless
/// the new index does not fit a one byte `ldc` operand.
fn replace_loaded_string(
    class: &mut ClassFile,
    method: usize,
    loaded: &LoadedString,
    value: &str,
) -> Result<(), ClassError> {
    let shared = string_references(class, loaded.index)? > 1;
    let pool = &mut class.constant_pool;
    let utf8_index = pool.add_utf8(value)?;

    let fits = loaded.opcode != LDC || pool.len() <= u8::MAX as usize;
    if shared && fits {
        let string_index = pool.push(Constant::String {
            string_index: utf8_index,
        })?;
        let patched = class.methods[method]
            .code_mut()
            .map_or(false, |code| code.set_constant_index(loaded.offset, string_index));
        if patched {
            return Ok(());
        }
    }

    if shared {
        debug!(value, "redirecting shared proxy constant");
    }
    class.constant_pool.redirect_string(loaded.index, utf8_index)
}

/// Counts the instructions and attributes referring to a String entry.
fn string_references(class: &ClassFile, index: u16) -> Result<usize, ClassError> {
    let mut count = class
        .fields
        .iter()
        .filter(|field| field.constant_value() == Some(index))
        .count();

    for code in class.methods.iter().filter_map(|method| method.code()) {
        for instruction in code.instructions() {
            if instruction?.constant_index() == Some(index) {
                count += 1;
            }
        }
    }

    for attribute in &class.attributes {
        if let AttributeInfo::BootstrapMethods(methods) = &attribute.info {
            count += methods
                .iter()
                .flat_map(|method| &method.arguments)
                .filter(|argument| **argument == index)
                .count();
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_kind() {
        assert_eq!(
            ReflectKind::of_superclass("kotlin/jvm/internal/FunctionReferenceImpl"),
            Some(ReflectKind::Function)
        );
        assert_eq!(
            ReflectKind::of_superclass("kotlin/jvm/internal/MutablePropertyReference1Impl"),
            Some(ReflectKind::Property)
        );
        assert_eq!(
            ReflectKind::of_superclass("kotlin/jvm/internal/FunctionReference"),
            None
        );
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("level"), "Level");
        assert_eq!(capitalize("a"), "A");
        assert_eq!(capitalize("Level"), "Level");
        assert_eq!(capitalize("_x"), "_x");
        assert_eq!(capitalize(""), "");
    }
}
