#![allow(dead_code)]

use lazy_static::lazy_static;
use string_remapper::classfile::code::opcodes::*;
use string_remapper::classfile::{AttributeInfo, ClassFile, Code, Constant};
use string_remapper::SymbolTable;

pub static DEBUG_MAPPING: &[u8] = include_bytes!("../res/debug-mapping.txt");
pub static COMPACT_MAPPING: &[u8] = include_bytes!("../res/compact-mapping.csrg");

pub const PROPERTY_REFERENCE: &str = "kotlin/jvm/internal/PropertyReference1Impl";
pub const FUNCTION_REFERENCE: &str = "kotlin/jvm/internal/FunctionReferenceImpl";
pub const PROPERTY_INIT: &str = "(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/String;I)V";
pub const FUNCTION_INIT: &str = "(ILjava/lang/Class;Ljava/lang/String;Ljava/lang/String;I)V";

const ICONST_0: u8 = 0x03;
const ICONST_1: u8 = 0x04;

lazy_static! {
    pub static ref TABLE: SymbolTable =
        SymbolTable::from_mappings(DEBUG_MAPPING, COMPACT_MAPPING).unwrap();
}

/// Emits an `ldc` (or `ldc_w`) loading pool entry `index`.
pub fn ldc(code: &mut Vec<u8>, index: u16) {
    if index <= u8::MAX as u16 {
        code.extend_from_slice(&[LDC, index as u8]);
    } else {
        code.push(LDC_W);
        code.extend_from_slice(&index.to_be_bytes());
    }
}

/// Emits an instruction with a two byte constant pool operand.
pub fn op_u2(code: &mut Vec<u8>, opcode: u8, index: u16) {
    code.push(opcode);
    code.extend_from_slice(&index.to_be_bytes());
}

/// Adds a method with the given bytecode.
pub fn add_method(class: &mut ClassFile, name: &str, descriptor: &str, code: Vec<u8>) {
    let method = class.add_method(0x0001, name, descriptor).unwrap();
    let attribute = class
        .new_attribute(
            "Code",
            AttributeInfo::Code(Code {
                max_stack: 8,
                max_locals: 2,
                code,
                exception_table: Vec::new(),
                attributes: Vec::new(),
            }),
        )
        .unwrap();
    class.methods[method].attributes.push(attribute);
}

/// Adds a `static final String` field with a constant value.
pub fn add_constant_field(class: &mut ClassFile, name: &str, value: &str) {
    let field = class.add_field(0x0019, name, "Ljava/lang/String;").unwrap();
    let value_index = class.constant_pool.add_string(value).unwrap();
    let attribute = class
        .new_attribute("ConstantValue", AttributeInfo::ConstantValue { value_index })
        .unwrap();
    class.fields[field].attributes.push(attribute);
}

/// A class with one method loading each of `values` in turn.
pub fn class_loading(name: &str, values: &[&str]) -> ClassFile {
    let mut class = ClassFile::new(name, "java/lang/Object").unwrap();
    let mut code = Vec::new();
    for value in values {
        let index = class.constant_pool.add_string(value).unwrap();
        ldc(&mut code, index);
    }
    code.push(RETURN);
    add_method(&mut class, "run", "()V", code);
    class
}

/// Marks a class as local to a method of `outer`.
pub fn nest_in(class: &mut ClassFile, outer: &str) {
    let class_index = class.constant_pool.add_class(outer).unwrap();
    let attribute = class
        .new_attribute(
            "EnclosingMethod",
            AttributeInfo::EnclosingMethod {
                class_index,
                method_index: 0,
            },
        )
        .unwrap();
    class.attributes.push(attribute);
}

/// Builds a reflection proxy whose constructor passes `owner`, `name` and
/// `signature` to `super_name`.
pub fn reflection_proxy(super_name: &str, owner: &str, name: &str, signature: &str) -> ClassFile {
    let mut class = ClassFile::new("app/Main$reference$1", super_name).unwrap();
    nest_in(&mut class, "app/Main");

    let function = super_name == FUNCTION_REFERENCE;
    let pool = &mut class.constant_pool;
    let owner = pool.add_class(owner).unwrap();
    let name = pool.add_string(name).unwrap();
    let signature = pool.add_string(signature).unwrap();
    let init = pool
        .add_method_ref(
            super_name,
            "<init>",
            if function { FUNCTION_INIT } else { PROPERTY_INIT },
        )
        .unwrap();

    let mut code = vec![ALOAD_0];
    if function {
        // arity
        code.push(ICONST_1);
    }
    ldc(&mut code, owner);
    ldc(&mut code, name);
    ldc(&mut code, signature);
    code.push(ICONST_0);
    op_u2(&mut code, INVOKESPECIAL, init);
    code.push(RETURN);
    add_method(&mut class, "<init>", "()V", code);
    class
}

/// Every string loaded by an `ldc` in the class, in method order.
pub fn loaded_strings(class: &ClassFile) -> Vec<String> {
    let mut strings = Vec::new();
    for code in class.methods.iter().filter_map(|method| method.code()) {
        for instruction in code.instructions() {
            let instruction = instruction.unwrap();
            if !instruction.is_ldc() {
                continue;
            }
            let index = instruction.constant_index().unwrap();
            if let Constant::String { .. } = class.constant_pool.get(index).unwrap() {
                strings.push(class.constant_pool.string(index).unwrap().into_owned());
            }
        }
    }
    strings
}

/// The constant values of all fields, in declaration order.
pub fn constant_values(class: &ClassFile) -> Vec<String> {
    class
        .fields
        .iter()
        .filter_map(|field| field.constant_value())
        .map(|index| class.constant_pool.string(index).unwrap().into_owned())
        .collect()
}
