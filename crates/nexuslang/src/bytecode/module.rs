//! The `.nxb` binary module: wire layout, writer, and reader.
//!
//! All multi-byte integers are little-endian; offsets and sizes are 32-bit
//! unsigned. The layout is fixed so a virtual machine can be written against
//! it later:
//!
//! ```text
//! Header (32 bytes):
//!   bytes 0..3    magic   = "NXB2"
//!   bytes 4..6    version = (major, minor, patch)
//!   byte  7       flags   (bit 0: has debug info)
//!   bytes 8..15   build timestamp (ms since epoch, u64)
//!   bytes 16..19  code section length
//!   bytes 20..23  constant pool section length
//!   bytes 24..27  symbol table section length
//!   bytes 28..31  reserved (0)
//! Code section: packed (opcode, operands) stream
//! Data section: u32 count, then tagged constants
//! Symbol table: u32 count, then (id, kind, name) entries
//! Debug info (iff flags bit 0): u32 count, then (offset, line, col)
//! Metadata trailer (optional): u32 length, then a UTF-8 JSON blob
//! ```
//!
//! The reader fails closed: a bad magic, a higher major version, an unknown
//! flag bit, or an unknown opcode in the code stream is a
//! `ModuleVersionError`.

use crate::{bytecode::op::Opcode, error::Exception, value::Intrinsic};

pub const MAGIC: [u8; 4] = *b"NXB2";
pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;
pub const FORMAT_PATCH: u8 = 0;

const FLAG_DEBUG_INFO: u8 = 0b0000_0001;
const HEADER_LEN: usize = 32;

/// A pooled constant. Tags on the wire: 1=int, 2=float, 3=string, 4=null.
///
/// Booleans are not pooled; `true`/`false` literals load through the
/// dedicated `LOAD_TRUE`/`LOAD_FALSE` opcodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

/// Symbol kinds on the wire: 0=user, 1=intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    User,
    Intrinsic,
}

/// One symbol table entry. The id is the entry's dense index `0..count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
}

/// One debug-info entry mapping a code offset back to a source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEntry {
    pub offset: u32,
    pub line: u32,
    pub col: u32,
}

/// An in-memory `.nxb` module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    pub symbols: Vec<SymbolEntry>,
    pub debug: Option<Vec<DebugEntry>>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamp_ms: u64,
}

impl Module {
    /// Serialises the module. Byte-identical output for identical contents.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.encode_constants();
        let symbols = self.encode_symbols();

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.code.len() + data.len() + symbols.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(FORMAT_MAJOR);
        bytes.push(FORMAT_MINOR);
        bytes.push(FORMAT_PATCH);
        bytes.push(if self.debug.is_some() { FLAG_DEBUG_INFO } else { 0 });
        bytes.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        bytes.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(symbols.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        bytes.extend_from_slice(&self.code);
        bytes.extend_from_slice(&data);
        bytes.extend_from_slice(&symbols);

        if let Some(debug) = &self.debug {
            bytes.extend_from_slice(&(debug.len() as u32).to_le_bytes());
            for entry in debug {
                bytes.extend_from_slice(&entry.offset.to_le_bytes());
                bytes.extend_from_slice(&entry.line.to_le_bytes());
                bytes.extend_from_slice(&entry.col.to_le_bytes());
            }
        }

        if let Some(metadata) = &self.metadata {
            let blob = serde_json::to_string(metadata).expect("metadata serialises");
            bytes.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            bytes.extend_from_slice(blob.as_bytes());
        }

        bytes
    }

    fn encode_constants(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for constant in &self.constants {
            match constant {
                Constant::Int(value) => {
                    data.push(1);
                    data.extend_from_slice(&value.to_le_bytes());
                }
                Constant::Float(value) => {
                    data.push(2);
                    data.extend_from_slice(&value.to_le_bytes());
                }
                Constant::Str(value) => {
                    data.push(3);
                    data.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    data.extend_from_slice(value.as_bytes());
                }
                Constant::Null => data.push(4),
            }
        }
        data
    }

    fn encode_symbols(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(self.symbols.len() as u32).to_le_bytes());
        for (id, symbol) in self.symbols.iter().enumerate() {
            data.extend_from_slice(&(id as u32).to_le_bytes());
            let kind: u32 = match symbol.kind {
                SymbolKind::User => 0,
                SymbolKind::Intrinsic => 1,
            };
            data.extend_from_slice(&kind.to_le_bytes());
            data.extend_from_slice(&(symbol.name.len() as u32).to_le_bytes());
            data.extend_from_slice(symbol.name.as_bytes());
        }
        data
    }

    /// Parses and validates a serialised module.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Exception> {
        if bytes.len() < HEADER_LEN {
            return Err(Exception::module_version("module is truncated (short header)"));
        }
        if bytes[0..4] != MAGIC {
            return Err(Exception::module_version("not a NexusLang module (bad magic)"));
        }
        let (major, minor, patch) = (bytes[4], bytes[5], bytes[6]);
        if major > FORMAT_MAJOR {
            return Err(Exception::module_version(format!(
                "unsupported module version {major}.{minor}.{patch} (reader supports up to {FORMAT_MAJOR}.x)"
            )));
        }
        let flags = bytes[7];
        if flags & !FLAG_DEBUG_INFO != 0 {
            return Err(Exception::module_version(format!("unknown flag bits 0x{flags:02X}")));
        }
        let timestamp_ms = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes"));
        let code_len = read_header_u32(bytes, 16);
        let data_len = read_header_u32(bytes, 20);
        let symbols_len = read_header_u32(bytes, 24);
        let reserved = read_header_u32(bytes, 28);
        if reserved != 0 {
            return Err(Exception::module_version("reserved header bytes are not zero"));
        }

        let mut cursor = Cursor::new(&bytes[HEADER_LEN..]);
        let code = cursor.take(code_len)?.to_vec();
        validate_code(&code)?;

        let mut data_cursor = Cursor::new(cursor.take(data_len)?);
        let constants = decode_constants(&mut data_cursor)?;
        data_cursor.expect_empty("constant pool")?;

        let mut symbols_cursor = Cursor::new(cursor.take(symbols_len)?);
        let symbols = decode_symbols(&mut symbols_cursor)?;
        symbols_cursor.expect_empty("symbol table")?;

        let debug = if flags & FLAG_DEBUG_INFO == 0 {
            None
        } else {
            let count = cursor.read_u32()? as usize;
            let mut entries = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                entries.push(DebugEntry {
                    offset: cursor.read_u32()?,
                    line: cursor.read_u32()?,
                    col: cursor.read_u32()?,
                });
            }
            Some(entries)
        };

        let metadata = if cursor.is_empty() {
            None
        } else {
            let len = cursor.read_u32()? as usize;
            let blob = cursor.take(len)?;
            let text = std::str::from_utf8(blob)
                .map_err(|_| Exception::module_version("metadata trailer is not UTF-8"))?;
            let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)
                .map_err(|err| Exception::module_version(format!("metadata trailer is not valid JSON: {err}")))?;
            Some(parsed)
        };
        cursor.expect_empty("module")?;

        Ok(Self {
            code,
            constants,
            symbols,
            debug,
            metadata,
            timestamp_ms,
        })
    }
}

fn read_header_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes(bytes[at..at + 4].try_into().expect("4 bytes")) as usize
}

/// Walks the code stream, rejecting unknown opcodes and truncated operands.
fn validate_code(code: &[u8]) -> Result<(), Exception> {
    let mut at = 0;
    while at < code.len() {
        let Some(op) = Opcode::from_repr(code[at]) else {
            return Err(Exception::module_version(format!(
                "unknown opcode 0x{:02X} at code offset {at}",
                code[at]
            )));
        };
        let width = op.operand_width();
        if at + 1 + width > code.len() {
            return Err(Exception::module_version(format!(
                "truncated operands for {op} at code offset {at}"
            )));
        }
        if op == Opcode::CallIntrinsic && Intrinsic::from_repr(code[at + 1]).is_none() {
            return Err(Exception::module_version(format!(
                "unknown intrinsic id {} at code offset {at}",
                code[at + 1]
            )));
        }
        at += 1 + width;
    }
    Ok(())
}

fn decode_constants(cursor: &mut Cursor<'_>) -> Result<Vec<Constant>, Exception> {
    let count = cursor.read_u32()? as usize;
    let mut constants = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let tag = cursor.read_u8()?;
        let constant = match tag {
            1 => Constant::Int(i64::from_le_bytes(cursor.take(8)?.try_into().expect("8 bytes"))),
            2 => Constant::Float(f64::from_le_bytes(cursor.take(8)?.try_into().expect("8 bytes"))),
            3 => {
                let len = cursor.read_u32()? as usize;
                let bytes = cursor.take(len)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| Exception::module_version("string constant is not UTF-8"))?;
                Constant::Str(text.to_owned())
            }
            4 => Constant::Null,
            other => {
                return Err(Exception::module_version(format!("unknown constant tag {other}")));
            }
        };
        constants.push(constant);
    }
    Ok(constants)
}

fn decode_symbols(cursor: &mut Cursor<'_>) -> Result<Vec<SymbolEntry>, Exception> {
    let count = cursor.read_u32()? as usize;
    let mut symbols = Vec::with_capacity(count.min(4096));
    for expected_id in 0..count {
        let id = cursor.read_u32()? as usize;
        if id != expected_id {
            return Err(Exception::module_version(format!(
                "symbol ids must be dense: expected {expected_id}, found {id}"
            )));
        }
        let kind = match cursor.read_u32()? {
            0 => SymbolKind::User,
            1 => SymbolKind::Intrinsic,
            other => {
                return Err(Exception::module_version(format!("unknown symbol kind {other}")));
            }
        };
        let len = cursor.read_u32()? as usize;
        let bytes = cursor.take(len)?;
        let name = std::str::from_utf8(bytes)
            .map_err(|_| Exception::module_version("symbol name is not UTF-8"))?
            .to_owned();
        symbols.push(SymbolEntry { name, kind });
    }
    Ok(symbols)
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn is_empty(&self) -> bool {
        self.at >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Exception> {
        if self.at + len > self.bytes.len() {
            return Err(Exception::module_version("module is truncated"));
        }
        let slice = &self.bytes[self.at..self.at + len];
        self.at += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, Exception> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, Exception> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn expect_empty(&self, what: &str) -> Result<(), Exception> {
        if self.is_empty() {
            return Ok(());
        }
        Err(Exception::module_version(format!("trailing bytes after {what}")))
    }
}
