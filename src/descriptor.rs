//! Conversions between readable Java type names and JVM descriptors.

use std::borrow::Cow;

fn java_base_type_descriptor(ty: &str) -> Option<&'static str> {
    match ty {
        "void" => Some("V"),
        "boolean" => Some("Z"),
        "byte" => Some("B"),
        "char" => Some("C"),
        "short" => Some("S"),
        "int" => Some("I"),
        "long" => Some("J"),
        "float" => Some("F"),
        "double" => Some("D"),
        _ => None,
    }
}

fn is_base_type(token: char) -> bool {
    matches!(token, 'Z' | 'B' | 'C' | 'S' | 'I' | 'J' | 'F' | 'D' | 'V')
}

/// Converts a readable Java type name into its descriptor.
///
/// Primitive keywords map to their single letter code, every `[]` suffix adds
/// one leading `[`, and everything else becomes `L<internal name>;`.
///
/// ```
/// use string_remapper::descriptor::java_type_to_descriptor;
///
/// assert_eq!(java_type_to_descriptor("int"), "I");
/// assert_eq!(java_type_to_descriptor("java.lang.String[][]"), "[[Ljava/lang/String;");
/// ```
pub fn java_type_to_descriptor(ty: &str) -> String {
    if let Some(descriptor) = java_base_type_descriptor(ty) {
        return descriptor.to_owned();
    }

    let dimensions = ty.matches("[]").count();
    if dimensions > 0 {
        let base = ty.split('[').next().unwrap_or(ty);
        let mut descriptor = "[".repeat(dimensions);
        descriptor.push_str(&java_type_to_descriptor(base));
        return descriptor;
    }

    class_name_to_descriptor(ty)
}

/// Converts a Java class name to its JVM descriptor format.
///
/// For example, `java.lang.NullPointerException` becomes `Ljava/lang/NullPointerException;`.
pub fn class_name_to_descriptor(class: &str) -> String {
    let mut descriptor = String::with_capacity(class.len() + 2);
    descriptor.push('L');
    descriptor.push_str(&class.replace('.', "/"));
    descriptor.push(';');
    descriptor
}

/// Converts a comma separated list of readable argument types into the
/// concatenated parameter descriptors.
pub fn java_arguments_to_descriptor(arguments: &str) -> String {
    arguments
        .split(',')
        .filter(|argument| !argument.is_empty())
        .map(|argument| java_type_to_descriptor(argument.trim()))
        .collect()
}

/// Splits a field descriptor into its array dimensions and the internal
/// class name it refers to, if it refers to a class at all.
///
/// `[[Lfoo/Bar;` yields `(2, "foo/Bar")`.
pub fn split_object_descriptor(descriptor: &str) -> Option<(usize, &str)> {
    let element = descriptor.trim_start_matches('[');
    let dimensions = descriptor.len() - element.len();
    let class = element.strip_prefix('L')?.strip_suffix(';')?;
    if class.is_empty() {
        return None;
    }
    Some((dimensions, class))
}

/// Remaps the class portion of a field descriptor.
///
/// Array dimensions are preserved. Primitive descriptors and classes that
/// `remap_class` does not know are returned untouched.
pub fn remap_descriptor<'d, 'm, F>(descriptor: &'d str, remap_class: F) -> Cow<'d, str>
where
    F: FnOnce(&str) -> Option<&'m str>,
{
    let Some((dimensions, class)) = split_object_descriptor(descriptor) else {
        return Cow::Borrowed(descriptor);
    };

    match remap_class(class) {
        Some(mapped) => {
            let mut remapped = String::with_capacity(dimensions + mapped.len() + 2);
            remapped.extend(std::iter::repeat('[').take(dimensions));
            remapped.push('L');
            remapped.push_str(mapped);
            remapped.push(';');
            Cow::Owned(remapped)
        }
        None => Cow::Borrowed(descriptor),
    }
}

/// Splits a method descriptor into the descriptors of its parameters and
/// its return type.
///
/// Returns `None` if the descriptor is malformed.
pub fn split_method_descriptor(descriptor: &str) -> Option<(Vec<&str>, &str)> {
    let descriptor = descriptor.strip_prefix('(')?;

    let (parameter_types, return_type) = descriptor.split_once(')')?;
    if !is_field_descriptor(return_type) {
        return None;
    }

    let mut types: Vec<&str> = Vec::new();
    let mut first_idx = 0;

    let mut param_chrs = parameter_types.char_indices();
    while let Some((idx, token)) = param_chrs.next() {
        if token == 'L' {
            let mut last_idx = None;
            for (i, c) in param_chrs.by_ref() {
                if c == ';' {
                    last_idx = Some(i);
                    break;
                }
            }
            let last_idx = last_idx?;
            types.push(parameter_types.get(first_idx..last_idx + 1)?);
            first_idx = last_idx + 1;
        } else if token == '[' {
            continue;
        } else if is_base_type(token) && token != 'V' {
            types.push(parameter_types.get(first_idx..idx + 1)?);
            first_idx = idx + 1;
        } else {
            return None;
        }
    }

    if first_idx != parameter_types.len() {
        // dangling array prefix
        return None;
    }

    Some((types, return_type))
}

fn is_field_descriptor(descriptor: &str) -> bool {
    let element = descriptor.trim_start_matches('[');
    match element.len() {
        0 => false,
        1 => element.chars().all(is_base_type),
        _ => split_object_descriptor(descriptor).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_java_type_to_descriptor() {
        let tests = HashMap::from([
            ("void", "V"),
            ("boolean", "Z"),
            ("long", "J"),
            ("int[]", "[I"),
            ("double[][]", "[[D"),
            ("java.lang.String", "Ljava/lang/String;"),
            ("java.util.Map$Entry[]", "[Ljava/util/Map$Entry;"),
        ]);

        for (ty, expected) in tests {
            assert_eq!(java_type_to_descriptor(ty), expected, "{ty}");
        }
    }

    #[test]
    fn test_java_arguments_to_descriptor() {
        assert_eq!(java_arguments_to_descriptor(""), "");
        assert_eq!(
            java_arguments_to_descriptor("int,java.lang.String,byte[]"),
            "ILjava/lang/String;[B"
        );
    }

    #[test]
    fn test_remap_descriptor() {
        let remap = |class: &str| match class {
            "net/minecraft/Thing" => Some("abc"),
            _ => None,
        };

        assert_eq!(remap_descriptor("Lnet/minecraft/Thing;", remap), "Labc;");
        assert_eq!(remap_descriptor("[[Lnet/minecraft/Thing;", remap), "[[Labc;");
        assert_eq!(remap_descriptor("Ljava/lang/Object;", remap), "Ljava/lang/Object;");
        assert_eq!(remap_descriptor("[I", remap), "[I");
        assert!(matches!(
            remap_descriptor("Z", remap),
            Cow::Borrowed("Z")
        ));
    }

    #[test]
    fn test_split_method_descriptor() {
        let tests_valid = HashMap::from([
            ("()V", (vec![], "V")),
            ("([I)V", (vec!["[I"], "V")),
            ("(IJZ)I", (vec!["I", "J", "Z"], "I")),
            (
                "(Ljava/lang/String;[[JLfoo/Bar;)Lfoo/Baz;",
                (vec!["Ljava/lang/String;", "[[J", "Lfoo/Bar;"], "Lfoo/Baz;"),
            ),
        ]);

        for (descriptor, expected) in tests_valid {
            assert_eq!(
                split_method_descriptor(descriptor),
                Some(expected),
                "{descriptor}"
            );
        }

        for descriptor in ["", "()", "(L)V", "(Lfoo)V", "([)V", "(V)V", "I)V", "()X"] {
            assert_eq!(split_method_descriptor(descriptor), None, "{descriptor}");
        }
    }
}
