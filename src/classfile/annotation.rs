use super::bytes::{ClassReader, ClassWriter};
use super::ClassError;

/// A runtime annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    /// Utf8 entry holding the annotation type descriptor.
    pub type_index: u16,
    /// The element-value pairs.
    pub elements: Vec<ElementPair>,
}

/// A named annotation element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementPair {
    /// Utf8 entry holding the element name.
    pub name_index: u16,
    /// The element value.
    pub value: ElementValue,
}

/// An annotation element value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementValue {
    /// A primitive or string constant. For tag `s` the index points at a
    /// Utf8 entry, for the others at a numeric constant.
    Const {
        /// One of `B C D F I J S Z s`.
        tag: u8,
        /// The constant pool entry.
        value_index: u16,
    },
    /// An enum constant.
    Enum {
        /// Utf8 entry holding the enum type descriptor.
        type_name_index: u16,
        /// Utf8 entry holding the constant name.
        const_name_index: u16,
    },
    /// A class literal.
    Class {
        /// Utf8 entry holding the return descriptor.
        class_info_index: u16,
    },
    /// A nested annotation.
    Annotation(Annotation),
    /// An array of values.
    Array(Vec<ElementValue>),
}

impl Annotation {
    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassError> {
        let type_index = reader.read_u2()?;
        let count = reader.read_u2()?;
        let elements = (0..count)
            .map(|_| {
                Ok(ElementPair {
                    name_index: reader.read_u2()?,
                    value: ElementValue::parse(reader)?,
                })
            })
            .collect::<Result<_, ClassError>>()?;
        Ok(Self {
            type_index,
            elements,
        })
    }

    pub(crate) fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        writer.write_u2(self.type_index);
        writer.write_count(self.elements.len(), "annotation elements")?;
        for pair in &self.elements {
            writer.write_u2(pair.name_index);
            pair.value.write(writer)?;
        }
        Ok(())
    }

    /// Finds an element by name.
    pub fn element_mut<F>(&mut self, mut is_name: F) -> Option<&mut ElementValue>
    where
        F: FnMut(u16) -> bool,
    {
        self.elements
            .iter_mut()
            .find(|pair| is_name(pair.name_index))
            .map(|pair| &mut pair.value)
    }
}

impl ElementValue {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassError> {
        let tag = reader.read_u1()?;
        let value = match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                value_index: reader.read_u2()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: reader.read_u2()?,
                const_name_index: reader.read_u2()?,
            },
            b'c' => ElementValue::Class {
                class_info_index: reader.read_u2()?,
            },
            b'@' => ElementValue::Annotation(Annotation::parse(reader)?),
            b'[' => {
                let count = reader.read_u2()?;
                let values = (0..count)
                    .map(|_| ElementValue::parse(reader))
                    .collect::<Result<_, _>>()?;
                ElementValue::Array(values)
            }
            other => return Err(ClassError::InvalidElementTag { tag: other }),
        };
        Ok(value)
    }

    fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        match self {
            ElementValue::Const { tag, value_index } => {
                writer.write_u1(*tag);
                writer.write_u2(*value_index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                writer.write_u1(b'e');
                writer.write_u2(*type_name_index);
                writer.write_u2(*const_name_index);
            }
            ElementValue::Class { class_info_index } => {
                writer.write_u1(b'c');
                writer.write_u2(*class_info_index);
            }
            ElementValue::Annotation(annotation) => {
                writer.write_u1(b'@');
                annotation.write(writer)?;
            }
            ElementValue::Array(values) => {
                writer.write_u1(b'[');
                writer.write_count(values.len(), "annotation array")?;
                for value in values {
                    value.write(writer)?;
                }
            }
        }
        Ok(())
    }
}
