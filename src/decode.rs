//! The Marshal 4.8 byte-stream decoder.

use std::str;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use byteorder::ReadBytesExt;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::error::{Error, Result};
use crate::tag::Tag;
use crate::value::{Value, Wrapper, WrapperKind};
use crate::{MAX_DEPTH, MAX_INPUT};

/// Decode one Marshal 4.8 value from a byte slice.
///
/// The input must start with the `0x04 0x08` version header and contain at
/// least one complete value; trailing bytes after the root value are
/// ignored. Inputs larger than [`MAX_INPUT`] are rejected before any
/// parsing happens. On failure no partial value escapes, only an [`Error`].
pub fn decode(data: &[u8]) -> Result<Value> {
    if data.is_empty() {
        return Err(Error::UnexpectedEof {
            step: "read header",
            actual: 0,
            expected: 2,
        });
    }
    if data.len() > MAX_INPUT {
        return Err(Error::OversizedField {
            field: "input",
            actual: data.len() as i64,
            max: MAX_INPUT,
        });
    }
    Decoder::new(data).load()
}

/// Decode one Marshal 4.8 value from standard base64 text.
pub fn decode_b64(data: &str) -> Result<Value> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::InvalidEnvelope(format!("invalid base64: {}", e)))?;
    decode(&bytes)
}

/// Per-decode state: the moving input cursor, the symbol table filled by
/// `:` tags and read by `;` back-references, and the recursion depth.
struct Decoder<'a> {
    data: &'a [u8],
    symbols: Vec<Arc<str>>,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Decoder<'a> {
        Decoder {
            data,
            symbols: Vec::new(),
            depth: 0,
        }
    }

    fn load(mut self) -> Result<Value> {
        let major = self.read_u8("read header")?;
        let minor = self.read_u8("read header")?;
        if major != 4 || minor != 8 {
            return Err(Error::UnsupportedVersion { major, minor });
        }
        self.read_value()
    }

    fn read_u8(&mut self, step: &'static str) -> Result<u8> {
        self.data.read_u8().map_err(|_| Error::UnexpectedEof {
            step,
            actual: 0,
            expected: 1,
        })
    }

    fn read_i8(&mut self, step: &'static str) -> Result<i8> {
        self.data.read_i8().map_err(|_| Error::UnexpectedEof {
            step,
            actual: 0,
            expected: 1,
        })
    }

    /// Take `len` bytes off the front of the input.
    fn take(&mut self, len: usize, step: &'static str) -> Result<&'a [u8]> {
        if len > self.data.len() {
            return Err(Error::UnexpectedEof {
                step,
                actual: self.data.len(),
                expected: len,
            });
        }
        let (bytes, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(bytes)
    }

    fn read_value(&mut self) -> Result<Value> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        let byte = self.read_u8("read tag")?;
        let tag = Tag::from_u8(byte).ok_or(Error::UnknownTag(byte))?;
        let value = match tag {
            Tag::Nil => Value::Nil,
            Tag::True => Value::Bool(true),
            Tag::False => Value::Bool(false),
            Tag::Int => Value::Int(self.read_packed_int()?),
            Tag::Bignum => self.read_bignum()?,
            Tag::Str => Value::Str(self.read_string()?),
            Tag::Symbol => Value::Sym(self.read_symbol()?),
            Tag::SymbolLink => Value::Sym(self.read_symbol_link()?),
            Tag::IVars => self.read_ivars()?,
            Tag::Seq => self.read_seq()?,
            Tag::Map => self.read_map()?,
            Tag::Link => self.read_link()?,
            Tag::Object => self.read_object()?,
            Tag::UserDef => self.read_user_def()?,
            Tag::UserMarshal => self.read_user_marshal()?,
            Tag::Extended => Value::Wrapper(Box::new(Wrapper {
                kind: WrapperKind::Extended,
                tag: Value::Nil,
                children: Vec::new(),
            })),
        };
        self.depth -= 1;
        Ok(value)
    }

    /// Decode one packed integer.
    ///
    /// The first byte `c` either carries an immediate value or selects a
    /// multi-byte scheme, eleven encodings in total: 0 encodes itself;
    /// `5..=127` encode `c - 5`; `-128..=-5` encode `c + 5`; `1..=4` are
    /// followed by that many little-endian bytes, zero-extended; `-4..=-1`
    /// are followed by `|c|` little-endian bytes overlaid onto an all-ones
    /// accumulator, which sign-extends the result.
    fn read_packed_int(&mut self) -> Result<i64> {
        let c = self.read_i8("packed int prefix")?;
        match c {
            0 => Ok(0),
            5..=127 => Ok(i64::from(c) - 5),
            -128..=-5 => Ok(i64::from(c) + 5),
            1..=4 => {
                let bytes = self.take(c as usize, "packed int payload")?;
                let mut x: i64 = 0;
                for (i, &b) in bytes.iter().enumerate() {
                    x |= i64::from(b) << (8 * i);
                }
                Ok(x)
            }
            -4..=-1 => {
                let bytes = self.take((-c) as usize, "packed int payload")?;
                let mut x: i64 = -1;
                for (i, &b) in bytes.iter().enumerate() {
                    x &= !(0xFF_i64 << (8 * i));
                    x |= i64::from(b) << (8 * i);
                }
                Ok(x)
            }
        }
    }

    /// Read a length prefix and bounds-check it against `max`. Negative
    /// lengths are treated the same as cap overruns.
    fn read_length(&mut self, field: &'static str, max: usize) -> Result<usize> {
        let n = self.read_packed_int()?;
        if n < 0 || n as u64 > max as u64 {
            return Err(Error::OversizedField {
                field,
                actual: n,
                max,
            });
        }
        Ok(n as usize)
    }

    fn read_bignum(&mut self) -> Result<Value> {
        let negative = match self.read_u8("bignum sign")? {
            b'+' => false,
            b'-' => true,
            other => {
                return Err(Error::EncodingError(format!(
                    "invalid bignum sign byte 0x{:02X}",
                    other
                )))
            }
        };
        let halfwords = self.read_length("bignum half-words", MAX_INPUT / 2)?;
        let bytes = self.take(halfwords * 2, "bignum magnitude")?;
        let mut result = BigInt::from_bytes_le(Sign::Plus, bytes);
        if negative {
            result = -result;
        }
        // Collapse to Int whenever the magnitude allows it, so callers see
        // one integer type for everything Ruby happened to emit as Bignum.
        match result.to_i64() {
            Some(v) => Ok(Value::Int(v)),
            None => Ok(Value::BigInt(result)),
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_length("string", MAX_INPUT)?;
        let bytes = self.take(len, "string content")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::EncodingError(format!("string is not valid UTF-8: {}", e)))
    }

    /// Read a new symbol, append it to the symbol table, and return it.
    /// The table is appended before returning so a back-reference emitted
    /// later in the stream always finds a fully materialized symbol.
    fn read_symbol(&mut self) -> Result<Arc<str>> {
        let len = self.read_length("symbol", MAX_INPUT / 10)?;
        let bytes = self.take(len, "symbol name")?;
        let name = str::from_utf8(bytes)
            .map_err(|e| Error::EncodingError(format!("symbol is not valid UTF-8: {}", e)))?;
        let sym: Arc<str> = Arc::from(format!(":{}", name));
        self.symbols.push(Arc::clone(&sym));
        Ok(sym)
    }

    fn read_symbol_link(&mut self) -> Result<Arc<str>> {
        let index = self.read_packed_int()?;
        if index < 0 || index as usize >= self.symbols.len() {
            return Err(Error::BadReference {
                index,
                available: self.symbols.len(),
            });
        }
        Ok(Arc::clone(&self.symbols[index as usize]))
    }

    /// Class tags of `o`/`u`/`U` shapes must be a symbol or a symbol link.
    fn read_symbol_or_link(&mut self) -> Result<Arc<str>> {
        let byte = self.read_u8("read class symbol")?;
        match Tag::from_u8(byte) {
            Some(Tag::Symbol) => self.read_symbol(),
            Some(Tag::SymbolLink) => self.read_symbol_link(),
            _ => Err(Error::UnknownTag(byte)),
        }
    }

    fn read_seq(&mut self) -> Result<Value> {
        let len = self.read_length("sequence", MAX_INPUT / 100)?;
        // Every element takes at least one byte, so a length beyond the
        // remaining input can never be satisfied.
        if len > self.data.len() {
            return Err(Error::UnexpectedEof {
                step: "sequence elements",
                actual: self.data.len(),
                expected: len,
            });
        }
        let mut seq = Vec::with_capacity(len);
        for _ in 0..len {
            seq.push(self.read_value()?);
        }
        Ok(Value::Seq(seq))
    }

    fn read_map(&mut self) -> Result<Value> {
        let len = self.read_length("mapping", MAX_INPUT / 100)?;
        if 2 * len > self.data.len() {
            return Err(Error::UnexpectedEof {
                step: "mapping entries",
                actual: self.data.len(),
                expected: 2 * len,
            });
        }
        let mut map = Vec::with_capacity(len);
        for _ in 0..len {
            let key = self.read_value()?;
            let value = self.read_value()?;
            map.push((key, value));
        }
        Ok(Value::Map(map))
    }

    /// An `I`-wrapped value: the inner value followed by instance-variable
    /// pairs. The pairs carry string-encoding markers in every observed
    /// payload, and strings are normalized to UTF-8 here anyway, so the
    /// attachments are decoded and dropped.
    fn read_ivars(&mut self) -> Result<Value> {
        let inner = self.read_value()?;
        let len = self.read_length("instance variable count", MAX_INPUT / 100)?;
        for _ in 0..len {
            let _name = self.read_value()?;
            let _value = self.read_value()?;
        }
        Ok(inner)
    }

    fn read_object(&mut self) -> Result<Value> {
        let class = self.read_symbol_or_link()?;
        let len = self.read_length("attribute count", MAX_INPUT / 100)?;
        let mut children = Vec::with_capacity(2 * len);
        for _ in 0..len {
            children.push(self.read_value()?);
            children.push(self.read_value()?);
        }
        Ok(Value::Wrapper(Box::new(Wrapper {
            kind: WrapperKind::Object,
            tag: Value::Sym(class),
            children,
        })))
    }

    fn read_user_def(&mut self) -> Result<Value> {
        let class = self.read_symbol_or_link()?;
        let len = self.read_length("user data", MAX_INPUT)?;
        let bytes = self.take(len, "user data content")?;
        // User data is whatever `_dump` produced, frequently raw binary
        // (Time serializes this way). Exposed as text on a best-effort
        // basis, invalid sequences replaced.
        let text = String::from_utf8_lossy(bytes).into_owned();
        Ok(Value::Wrapper(Box::new(Wrapper {
            kind: WrapperKind::UserDef,
            tag: Value::Sym(class),
            children: vec![Value::Str(text)],
        })))
    }

    fn read_user_marshal(&mut self) -> Result<Value> {
        let class = self.read_symbol_or_link()?;
        let inner = self.read_value()?;
        Ok(Value::Wrapper(Box::new(Wrapper {
            kind: WrapperKind::UserMarshal,
            tag: Value::Sym(class),
            children: vec![inner],
        })))
    }

    fn read_link(&mut self) -> Result<Value> {
        let index = self.read_packed_int()?;
        Ok(Value::Wrapper(Box::new(Wrapper {
            kind: WrapperKind::Link,
            tag: Value::Int(index),
            children: Vec::new(),
        })))
    }
}
