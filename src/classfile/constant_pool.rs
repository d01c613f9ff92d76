use std::borrow::Cow;

use super::bytes::{ClassReader, ClassWriter};
use super::{mutf8, ClassError};

/// A single constant pool entry.
///
/// Numeric constants keep their raw bits so that writing reproduces them
/// exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes.
    Utf8(Vec<u8>),
    /// `CONSTANT_Integer`
    Integer(i32),
    /// `CONSTANT_Float` as IEEE 754 bits.
    Float(u32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double` as IEEE 754 bits.
    Double(u64),
    /// `CONSTANT_Class`
    Class {
        /// Utf8 entry holding the internal name.
        name_index: u16,
    },
    /// `CONSTANT_String`
    String {
        /// Utf8 entry holding the value.
        string_index: u16,
    },
    /// `CONSTANT_Fieldref`
    FieldRef {
        /// Owning class.
        class_index: u16,
        /// Name and descriptor.
        name_and_type_index: u16,
    },
    /// `CONSTANT_Methodref`
    MethodRef {
        /// Owning class.
        class_index: u16,
        /// Name and descriptor.
        name_and_type_index: u16,
    },
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethodRef {
        /// Owning interface.
        class_index: u16,
        /// Name and descriptor.
        name_and_type_index: u16,
    },
    /// `CONSTANT_NameAndType`
    NameAndType {
        /// Utf8 entry holding the name.
        name_index: u16,
        /// Utf8 entry holding the descriptor.
        descriptor_index: u16,
    },
    /// `CONSTANT_MethodHandle`
    MethodHandle {
        /// The handle kind.
        reference_kind: u8,
        /// The referenced member.
        reference_index: u16,
    },
    /// `CONSTANT_MethodType`
    MethodType {
        /// Utf8 entry holding the method descriptor.
        descriptor_index: u16,
    },
    /// `CONSTANT_Dynamic`
    Dynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap_method_attr_index: u16,
        /// Name and descriptor.
        name_and_type_index: u16,
    },
    /// `CONSTANT_InvokeDynamic`
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap_method_attr_index: u16,
        /// Name and descriptor.
        name_and_type_index: u16,
    },
    /// `CONSTANT_Module`
    Module {
        /// Utf8 entry holding the module name.
        name_index: u16,
    },
    /// `CONSTANT_Package`
    Package {
        /// Utf8 entry holding the package name.
        name_index: u16,
    },
    /// Index 0 and the slot following a long or double.
    Unusable,
}

impl Constant {
    /// Whether the entry takes up two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// The constant pool of a class file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(reader.read_slice(length)?.to_vec())
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => Constant::Float(reader.read_u4()?),
                5 => Constant::Long(reader.read_u8()? as i64),
                6 => Constant::Double(reader.read_u8()?),
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassError::UnsupportedConstant { tag: other }),
            };

            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        // a wide entry in the last slot overruns the declared count
        if entries.len() != count.max(1) {
            return Err(ClassError::InvalidConstantIndex {
                index: (entries.len() - 1) as u16,
            });
        }

        Ok(Self { entries })
    }

    pub(crate) fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        writer.write_count(self.entries.len(), "constant pool")?;
        for entry in &self.entries {
            match entry {
                Constant::Utf8(bytes) => {
                    writer.write_u1(1);
                    writer.write_count(bytes.len(), "utf8 constant")?;
                    writer.write_slice(bytes);
                }
                Constant::Integer(value) => {
                    writer.write_u1(3);
                    writer.write_u4(*value as u32);
                }
                Constant::Float(bits) => {
                    writer.write_u1(4);
                    writer.write_u4(*bits);
                }
                Constant::Long(value) => {
                    writer.write_u1(5);
                    writer.write_u8(*value as u64);
                }
                Constant::Double(bits) => {
                    writer.write_u1(6);
                    writer.write_u8(*bits);
                }
                Constant::Class { name_index } => {
                    writer.write_u1(7);
                    writer.write_u2(*name_index);
                }
                Constant::String { string_index } => {
                    writer.write_u1(8);
                    writer.write_u2(*string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(9);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(10);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(11);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    writer.write_u1(12);
                    writer.write_u2(*name_index);
                    writer.write_u2(*descriptor_index);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    writer.write_u1(15);
                    writer.write_u1(*reference_kind);
                    writer.write_u2(*reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    writer.write_u1(16);
                    writer.write_u2(*descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(17);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(18);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::Module { name_index } => {
                    writer.write_u1(19);
                    writer.write_u2(*name_index);
                }
                Constant::Package { name_index } => {
                    writer.write_u1(20);
                    writer.write_u2(*name_index);
                }
                Constant::Unusable => {}
            }
        }
        Ok(())
    }

    /// The `constant_pool_count`, which is also the index the next entry
    /// gets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no usable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterates over all usable entries with their indexes.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, Constant::Unusable))
            .map(|(index, entry)| (index as u16, entry))
    }

    /// Looks up an entry.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassError::InvalidConstantIndex { index }),
            Some(entry) => Ok(entry),
        }
    }

    /// Decodes a Utf8 entry.
    pub fn utf8(&self, index: u16) -> Result<Cow<'_, str>, ClassError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => {
                mutf8::decode(bytes).ok_or(ClassError::InvalidUtf8 { index })
            }
            _ => Err(ClassError::InvalidConstantIndex { index }),
        }
    }

    /// The internal name of a Class entry.
    pub fn class_name(&self, index: u16) -> Result<Cow<'_, str>, ClassError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassError::InvalidConstantIndex { index }),
        }
    }

    /// The value of a String entry.
    pub fn string(&self, index: u16) -> Result<Cow<'_, str>, ClassError> {
        match self.get(index)? {
            Constant::String { string_index } => self.utf8(*string_index),
            _ => Err(ClassError::InvalidConstantIndex { index }),
        }
    }

    /// The owner class, name and descriptor of a member reference.
    pub fn member_ref(
        &self,
        index: u16,
    ) -> Result<(Cow<'_, str>, Cow<'_, str>, Cow<'_, str>), ClassError> {
        let (class_index, name_and_type_index) = match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            _ => return Err(ClassError::InvalidConstantIndex { index }),
        };
        match self.get(name_and_type_index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.class_name(class_index)?,
                self.utf8(*name_index)?,
                self.utf8(*descriptor_index)?,
            )),
            _ => Err(ClassError::InvalidConstantIndex {
                index: name_and_type_index,
            }),
        }
    }

    /// Appends an entry and returns its index.
    pub fn push(&mut self, constant: Constant) -> Result<u16, ClassError> {
        let width = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + width > u16::MAX as usize {
            return Err(ClassError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        if width == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Returns the index of a Utf8 entry with this value, adding one if
    /// there is none.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16, ClassError> {
        let encoded = mutf8::encode(value);
        if encoded.len() > u16::MAX as usize {
            return Err(ClassError::StringTooLong {
                length: encoded.len(),
            });
        }
        let existing = self.iter().find_map(|(index, entry)| match entry {
            Constant::Utf8(bytes) if bytes[..] == encoded[..] => Some(index),
            _ => None,
        });
        match existing {
            Some(index) => Ok(index),
            None => self.push(Constant::Utf8(encoded.into_owned())),
        }
    }

    /// Adds a Class entry.
    pub fn add_class(&mut self, name: &str) -> Result<u16, ClassError> {
        let name_index = self.add_utf8(name)?;
        self.push(Constant::Class { name_index })
    }

    /// Adds a String entry.
    pub fn add_string(&mut self, value: &str) -> Result<u16, ClassError> {
        let string_index = self.add_utf8(value)?;
        self.push(Constant::String { string_index })
    }

    /// Adds a Methodref entry along with its Class and NameAndType entries.
    pub fn add_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassError> {
        let class_index = self.add_class(class)?;
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        let name_and_type_index = self.push(Constant::NameAndType {
            name_index,
            descriptor_index,
        })?;
        self.push(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Points an existing String entry at another Utf8 entry.
    ///
    /// Every instruction or attribute loading the String sees the new value.
    pub fn redirect_string(&mut self, index: u16, utf8_index: u16) -> Result<(), ClassError> {
        if !matches!(self.get(utf8_index)?, Constant::Utf8(_)) {
            return Err(ClassError::InvalidConstantIndex { index: utf8_index });
        }
        match self.entries.get_mut(index as usize) {
            Some(Constant::String { string_index }) => {
                *string_index = utf8_index;
                Ok(())
            }
            _ => Err(ClassError::InvalidConstantIndex { index }),
        }
    }
}
