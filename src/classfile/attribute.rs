use super::annotation::Annotation;
use super::bytes::{ClassReader, ClassWriter};
use super::code::Code;
use super::constant_pool::ConstantPool;
use super::ClassError;

/// An attribute of a class, member or `Code` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Utf8 entry holding the attribute name.
    pub name_index: u16,
    /// The decoded attribute body.
    pub info: AttributeInfo,
}

/// The body of an [`Attribute`].
///
/// Only the attributes the remapper looks into are decoded, every other one
/// is carried as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeInfo {
    /// `ConstantValue` of a field.
    ConstantValue {
        /// The constant pool entry holding the value.
        value_index: u16,
    },
    /// `Code` of a method.
    Code(Code),
    /// `RuntimeVisibleAnnotations`
    RuntimeVisibleAnnotations(Vec<Annotation>),
    /// `EnclosingMethod` of a local or anonymous class.
    EnclosingMethod {
        /// The enclosing class.
        class_index: u16,
        /// The enclosing method's NameAndType, or 0.
        method_index: u16,
    },
    /// `InnerClasses`
    InnerClasses(Vec<InnerClass>),
    /// `BootstrapMethods`
    BootstrapMethods(Vec<BootstrapMethod>),
    /// Any other attribute.
    Raw(Vec<u8>),
}

/// An entry of the `InnerClasses` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InnerClass {
    /// The nested class.
    pub inner_class_info_index: u16,
    /// The declaring class, or 0.
    pub outer_class_info_index: u16,
    /// The simple name, or 0 for anonymous classes.
    pub inner_name_index: u16,
    /// Access flags as declared in source.
    pub inner_class_access_flags: u16,
}

/// An entry of the `BootstrapMethods` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// The MethodHandle entry of the bootstrap method.
    pub method_ref: u16,
    /// Static arguments passed to the bootstrap method.
    pub arguments: Vec<u16>,
}

impl Attribute {
    pub(crate) fn parse_all(
        reader: &mut ClassReader<'_>,
        pool: &ConstantPool,
    ) -> Result<Vec<Self>, ClassError> {
        let count = reader.read_u2()?;
        (0..count).map(|_| Self::parse(reader, pool)).collect()
    }

    fn parse(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Self, ClassError> {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let body = reader.read_slice(length)?;
        let name = pool.utf8(name_index)?;

        let mut sub_reader = ClassReader::new(body);
        let info = match name.as_ref() {
            "ConstantValue" => AttributeInfo::ConstantValue {
                value_index: sub_reader.read_u2()?,
            },
            "Code" => AttributeInfo::Code(Code::parse(&mut sub_reader, pool)?),
            "RuntimeVisibleAnnotations" => {
                let count = sub_reader.read_u2()?;
                let annotations = (0..count)
                    .map(|_| Annotation::parse(&mut sub_reader))
                    .collect::<Result<_, _>>()?;
                AttributeInfo::RuntimeVisibleAnnotations(annotations)
            }
            "EnclosingMethod" => AttributeInfo::EnclosingMethod {
                class_index: sub_reader.read_u2()?,
                method_index: sub_reader.read_u2()?,
            },
            "InnerClasses" => {
                let count = sub_reader.read_u2()?;
                let classes = (0..count)
                    .map(|_| {
                        Ok(InnerClass {
                            inner_class_info_index: sub_reader.read_u2()?,
                            outer_class_info_index: sub_reader.read_u2()?,
                            inner_name_index: sub_reader.read_u2()?,
                            inner_class_access_flags: sub_reader.read_u2()?,
                        })
                    })
                    .collect::<Result<_, ClassError>>()?;
                AttributeInfo::InnerClasses(classes)
            }
            "BootstrapMethods" => {
                let count = sub_reader.read_u2()?;
                let methods = (0..count)
                    .map(|_| {
                        Ok(BootstrapMethod {
                            method_ref: sub_reader.read_u2()?,
                            arguments: sub_reader.read_u2_list()?,
                        })
                    })
                    .collect::<Result<_, ClassError>>()?;
                AttributeInfo::BootstrapMethods(methods)
            }
            _ => {
                return Ok(Self {
                    name_index,
                    info: AttributeInfo::Raw(body.to_vec()),
                })
            }
        };

        if sub_reader.remaining() != 0 {
            return Err(ClassError::AttributeLength {
                name: name.into_owned(),
            });
        }

        Ok(Self { name_index, info })
    }

    pub(crate) fn write_all(
        attributes: &[Self],
        writer: &mut ClassWriter,
    ) -> Result<(), ClassError> {
        writer.write_count(attributes.len(), "attributes")?;
        for attribute in attributes {
            attribute.write(writer)?;
        }
        Ok(())
    }

    fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        let mut body = ClassWriter::new();
        match &self.info {
            AttributeInfo::ConstantValue { value_index } => body.write_u2(*value_index),
            AttributeInfo::Code(code) => code.write(&mut body)?,
            AttributeInfo::RuntimeVisibleAnnotations(annotations) => {
                body.write_count(annotations.len(), "annotations")?;
                for annotation in annotations {
                    annotation.write(&mut body)?;
                }
            }
            AttributeInfo::EnclosingMethod {
                class_index,
                method_index,
            } => {
                body.write_u2(*class_index);
                body.write_u2(*method_index);
            }
            AttributeInfo::InnerClasses(classes) => {
                body.write_count(classes.len(), "inner classes")?;
                for class in classes {
                    body.write_u2(class.inner_class_info_index);
                    body.write_u2(class.outer_class_info_index);
                    body.write_u2(class.inner_name_index);
                    body.write_u2(class.inner_class_access_flags);
                }
            }
            AttributeInfo::BootstrapMethods(methods) => {
                body.write_count(methods.len(), "bootstrap methods")?;
                for method in methods {
                    body.write_u2(method.method_ref);
                    body.write_u2_list(&method.arguments, "bootstrap arguments")?;
                }
            }
            AttributeInfo::Raw(bytes) => body.write_slice(bytes),
        }

        writer.write_u2(self.name_index);
        writer.write_blob(&body.into_bytes(), "attribute")
    }
}
