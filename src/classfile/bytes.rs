//! Big-endian cursor and sink over class file bytes.

use super::ClassError;

pub(crate) struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn expect_magic(&mut self) -> Result<(), ClassError> {
        const MAGIC: u32 = 0xCAFEBABE;
        let magic = self.read_u4()?;
        if magic != MAGIC {
            return Err(ClassError::InvalidMagic);
        }
        Ok(())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8, ClassError> {
        let value = *self.data.get(self.pos).ok_or(ClassError::UnexpectedEof)?;
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16, ClassError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32, ClassError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u8(&mut self) -> Result<u64, ClassError> {
        let high = self.read_u4()? as u64;
        let low = self.read_u4()? as u64;
        Ok(high << 32 | low)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassError> {
        if len > self.remaining() {
            return Err(ClassError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a `u2` count followed by that many `u2` values.
    pub(crate) fn read_u2_list(&mut self) -> Result<Vec<u16>, ClassError> {
        let count = self.read_u2()?;
        (0..count).map(|_| self.read_u2()).collect()
    }
}

#[derive(Default)]
pub(crate) struct ClassWriter {
    buf: Vec<u8>,
}

impl ClassWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_u1(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn write_u2(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_u4(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_u8(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a collection length as `u2`.
    pub(crate) fn write_count(&mut self, len: usize, what: &'static str) -> Result<(), ClassError> {
        let len = u16::try_from(len).map_err(|_| ClassError::TooLarge { what })?;
        self.write_u2(len);
        Ok(())
    }

    /// Writes a `u2` count followed by the values.
    pub(crate) fn write_u2_list(
        &mut self,
        values: &[u16],
        what: &'static str,
    ) -> Result<(), ClassError> {
        self.write_count(values.len(), what)?;
        for value in values {
            self.write_u2(*value);
        }
        Ok(())
    }

    /// Writes a `u4` length prefixed blob.
    pub(crate) fn write_blob(
        &mut self,
        bytes: &[u8],
        what: &'static str,
    ) -> Result<(), ClassError> {
        let len = u32::try_from(bytes.len()).map_err(|_| ClassError::TooLarge { what })?;
        self.write_u4(len);
        self.write_slice(bytes);
        Ok(())
    }
}
