//! A structural model of the JVM class file format.
//!
//! [`ClassFile::parse`] reads a class into a tree that keeps every structure
//! it does not understand as raw bytes, and [`ClassFile::to_bytes`] writes it
//! back. Writing an unmodified class reproduces its input byte for byte.

use std::borrow::Cow;

use thiserror::Error;

mod annotation;
mod attribute;
mod bytes;
pub mod code;
mod constant_pool;
pub mod mutf8;

pub use annotation::{Annotation, ElementPair, ElementValue};
pub use attribute::{Attribute, AttributeInfo, BootstrapMethod, InnerClass};
pub use code::{Code, ExceptionHandler, Instruction, Instructions};
pub use constant_pool::{Constant, ConstantPool};

use bytes::{ClassReader, ClassWriter};

/// Errors reading or writing a class file.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClassError {
    /// The input ends in the middle of a structure.
    #[error("unexpected end of class file")]
    UnexpectedEof,
    /// The input does not start with `0xCAFEBABE`.
    #[error("invalid class file magic header")]
    InvalidMagic,
    /// A constant pool tag this reader does not know.
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant {
        /// The tag byte.
        tag: u8,
    },
    /// An index pointing outside the pool or at an entry of the wrong kind.
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex {
        /// The offending index.
        index: u16,
    },
    /// A Utf8 entry that is not valid modified UTF-8.
    #[error("constant pool entry {index} is not valid modified UTF-8")]
    InvalidUtf8 {
        /// The offending index.
        index: u16,
    },
    /// An annotation element value with an unknown tag.
    #[error("invalid annotation element tag {tag:#04x}")]
    InvalidElementTag {
        /// The tag byte.
        tag: u8,
    },
    /// A decoded attribute did not consume exactly its declared length.
    #[error("attribute {name} does not match its declared length")]
    AttributeLength {
        /// The attribute name.
        name: String,
    },
    /// An undefined opcode or a malformed switch.
    #[error("invalid instruction {opcode:#04x} at offset {offset}")]
    InvalidOpcode {
        /// The opcode.
        opcode: u8,
        /// Offset in the code array.
        offset: usize,
    },
    /// Bytes left over after the last class attribute.
    #[error("{count} trailing bytes after class file")]
    TrailingBytes {
        /// Number of extra bytes.
        count: usize,
    },
    /// The constant pool has no room for another entry.
    #[error("constant pool is full")]
    ConstantPoolOverflow,
    /// A string whose encoding exceeds the Utf8 entry limit.
    #[error("string of {length} bytes exceeds the constant pool limit")]
    StringTooLong {
        /// The encoded length.
        length: usize,
    },
    /// A table exceeds the size its length field can express.
    #[error("{what} is too large for a class file")]
    TooLarge {
        /// The table that overflowed.
        what: &'static str,
    },
}

/// A field or method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Access flags.
    pub access_flags: u16,
    /// Utf8 entry holding the name.
    pub name_index: u16,
    /// Utf8 entry holding the descriptor.
    pub descriptor_index: u16,
    /// Attributes such as `Code` or `ConstantValue`.
    pub attributes: Vec<Attribute>,
}

impl Member {
    fn parse(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Self, ClassError> {
        Ok(Self {
            access_flags: reader.read_u2()?,
            name_index: reader.read_u2()?,
            descriptor_index: reader.read_u2()?,
            attributes: Attribute::parse_all(reader, pool)?,
        })
    }

    fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        writer.write_u2(self.access_flags);
        writer.write_u2(self.name_index);
        writer.write_u2(self.descriptor_index);
        Attribute::write_all(&self.attributes, writer)
    }

    /// The `Code` attribute of a method.
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attribute| match &attribute.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    /// The `Code` attribute of a method, mutably.
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes
            .iter_mut()
            .find_map(|attribute| match &mut attribute.info {
                AttributeInfo::Code(code) => Some(code),
                _ => None,
            })
    }

    /// The constant pool index of a field's `ConstantValue`.
    pub fn constant_value(&self) -> Option<u16> {
        self.attributes.iter().find_map(|attribute| match attribute.info {
            AttributeInfo::ConstantValue { value_index } => Some(value_index),
            _ => None,
        })
    }
}

/// A parsed class file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor version.
    pub minor_version: u16,
    /// Major version.
    pub major_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// Class access flags.
    pub access_flags: u16,
    /// Class entry of this class.
    pub this_class: u16,
    /// Class entry of the superclass, or 0 for `java/lang/Object`.
    pub super_class: u16,
    /// Class entries of the implemented interfaces.
    pub interfaces: Vec<u16>,
    /// Declared fields.
    pub fields: Vec<Member>,
    /// Declared methods.
    pub methods: Vec<Member>,
    /// Class attributes.
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Creates an empty public class targeting Java 8.
    pub fn new(name: &str, super_name: &str) -> Result<Self, ClassError> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.add_class(name)?;
        let super_class = constant_pool.add_class(super_name)?;
        Ok(Self {
            minor_version: 0,
            major_version: 52,
            constant_pool,
            access_flags: 0x0021,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Parses a class file.
    ///
    /// The whole input must be consumed; trailing bytes are an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassError> {
        let mut reader = ClassReader::new(bytes);
        reader.expect_magic()?;
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;
        let interfaces = reader.read_u2_list()?;

        let fields_count = reader.read_u2()?;
        let fields = (0..fields_count)
            .map(|_| Member::parse(&mut reader, &constant_pool))
            .collect::<Result<_, _>>()?;
        let methods_count = reader.read_u2()?;
        let methods = (0..methods_count)
            .map(|_| Member::parse(&mut reader, &constant_pool))
            .collect::<Result<_, _>>()?;
        let attributes = Attribute::parse_all(&mut reader, &constant_pool)?;

        if reader.remaining() != 0 {
            return Err(ClassError::TrailingBytes {
                count: reader.remaining(),
            });
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serializes the class file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassError> {
        let mut writer = ClassWriter::new();
        writer.write_u4(0xCAFEBABE);
        writer.write_u2(self.minor_version);
        writer.write_u2(self.major_version);
        self.constant_pool.write(&mut writer)?;
        writer.write_u2(self.access_flags);
        writer.write_u2(self.this_class);
        writer.write_u2(self.super_class);
        writer.write_u2_list(&self.interfaces, "interfaces")?;
        writer.write_count(self.fields.len(), "fields")?;
        for field in &self.fields {
            field.write(&mut writer)?;
        }
        writer.write_count(self.methods.len(), "methods")?;
        for method in &self.methods {
            method.write(&mut writer)?;
        }
        Attribute::write_all(&self.attributes, &mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The internal name of this class.
    pub fn name(&self) -> Result<Cow<'_, str>, ClassError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// The internal name of the superclass, `None` if there is none.
    pub fn super_name(&self) -> Result<Option<Cow<'_, str>>, ClassError> {
        match self.super_class {
            0 => Ok(None),
            index => self.constant_pool.class_name(index).map(Some),
        }
    }

    /// The name of a field or method.
    pub fn member_name(&self, member: &Member) -> Result<Cow<'_, str>, ClassError> {
        self.constant_pool.utf8(member.name_index)
    }

    /// Whether this class is nested in another one.
    ///
    /// Local and anonymous classes carry an `EnclosingMethod` attribute,
    /// member classes list themselves in `InnerClasses`.
    pub fn is_nested(&self) -> bool {
        self.attributes.iter().any(|attribute| match &attribute.info {
            AttributeInfo::EnclosingMethod { .. } => true,
            AttributeInfo::InnerClasses(classes) => classes
                .iter()
                .any(|class| class.inner_class_info_index == self.this_class),
            _ => false,
        })
    }

    /// Adds a field and returns its position in [`ClassFile::fields`].
    pub fn add_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<usize, ClassError> {
        let member = self.new_member(access_flags, name, descriptor)?;
        self.fields.push(member);
        Ok(self.fields.len() - 1)
    }

    /// Adds a method and returns its position in [`ClassFile::methods`].
    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<usize, ClassError> {
        let member = self.new_member(access_flags, name, descriptor)?;
        self.methods.push(member);
        Ok(self.methods.len() - 1)
    }

    /// Creates an attribute, registering its name in the pool.
    pub fn new_attribute(
        &mut self,
        name: &str,
        info: AttributeInfo,
    ) -> Result<Attribute, ClassError> {
        Ok(Attribute {
            name_index: self.constant_pool.add_utf8(name)?,
            info,
        })
    }

    fn new_member(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<Member, ClassError> {
        Ok(Member {
            access_flags,
            name_index: self.constant_pool.add_utf8(name)?,
            descriptor_index: self.constant_pool.add_utf8(descriptor)?,
            attributes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `public class a/B { static final String ID = "x"; }` compiled by hand.
    const MINIMAL: &[u8] = &[
        0xCA, 0xFE, 0xBA, 0xBE, // magic
        0x00, 0x00, 0x00, 0x34, // version 52.0
        0x00, 0x0A, // constant_pool_count
        0x07, 0x00, 0x02, // #1 Class #2
        0x01, 0x00, 0x03, b'a', b'/', b'B', // #2 Utf8
        0x07, 0x00, 0x04, // #3 Class #4
        0x01, 0x00, 0x10, b'j', b'a', b'v', b'a', b'/', b'l', b'a', b'n', b'g', b'/', b'O',
        b'b', b'j', b'e', b'c', b't', // #4 Utf8
        0x01, 0x00, 0x02, b'I', b'D', // #5 Utf8
        0x01, 0x00, 0x12, b'L', b'j', b'a', b'v', b'a', b'/', b'l', b'a', b'n', b'g', b'/',
        b'S', b't', b'r', b'i', b'n', b'g', b';', // #6 Utf8
        0x01, 0x00, 0x0D, b'C', b'o', b'n', b's', b't', b'a', b'n', b't', b'V', b'a', b'l',
        b'u', b'e', // #7 Utf8
        0x08, 0x00, 0x09, // #8 String #9
        0x01, 0x00, 0x01, b'x', // #9 Utf8
        0x00, 0x21, // access
        0x00, 0x01, // this
        0x00, 0x03, // super
        0x00, 0x00, // interfaces
        0x00, 0x01, // fields
        0x00, 0x19, 0x00, 0x05, 0x00, 0x06, 0x00, 0x01, // static final ID
        0x00, 0x07, 0x00, 0x00, 0x00, 0x02, 0x00, 0x08, // ConstantValue #8
        0x00, 0x00, // methods
        0x00, 0x00, // attributes
    ];

    #[test]
    fn test_parse_minimal() {
        let class = ClassFile::parse(MINIMAL).unwrap();
        assert_eq!(class.name().as_deref(), Ok("a/B"));
        assert_eq!(class.super_name().unwrap().as_deref(), Some("java/lang/Object"));
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.member_name(&class.fields[0]).as_deref(), Ok("ID"));
        assert_eq!(class.fields[0].constant_value(), Some(8));
        assert_eq!(class.constant_pool.string(8).as_deref(), Ok("x"));
        assert!(!class.is_nested());
    }

    #[test]
    fn test_write_is_byte_identical() {
        let class = ClassFile::parse(MINIMAL).unwrap();
        assert_eq!(class.to_bytes().unwrap(), MINIMAL);
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(ClassFile::parse(&MINIMAL[..20]), Err(ClassError::UnexpectedEof));

        let mut bad_magic = MINIMAL.to_vec();
        bad_magic[0] = 0;
        assert_eq!(ClassFile::parse(&bad_magic), Err(ClassError::InvalidMagic));

        let mut trailing = MINIMAL.to_vec();
        trailing.push(0);
        assert_eq!(
            ClassFile::parse(&trailing),
            Err(ClassError::TrailingBytes { count: 1 })
        );

        // ConstantValue declared one byte longer than its body
        let mut long_attribute = MINIMAL.to_vec();
        let pos = long_attribute.len() - 7;
        long_attribute[pos] = 0x03;
        long_attribute.insert(pos + 3, 0);
        assert_eq!(
            ClassFile::parse(&long_attribute),
            Err(ClassError::AttributeLength {
                name: "ConstantValue".to_owned()
            })
        );
    }

    #[test]
    fn test_build_and_reparse() {
        let mut class = ClassFile::new("a/Built", "java/lang/Object").unwrap();
        let method = class.add_method(0x0001, "run", "()V").unwrap();
        let code = Code {
            max_stack: 1,
            max_locals: 1,
            code: vec![code::opcodes::RETURN],
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        let attribute = class.new_attribute("Code", AttributeInfo::Code(code)).unwrap();
        class.methods[method].attributes.push(attribute);

        let bytes = class.to_bytes().unwrap();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed, class);
        assert_eq!(parsed.methods[0].code().map(|code| code.code.len()), Some(1));
    }
}
