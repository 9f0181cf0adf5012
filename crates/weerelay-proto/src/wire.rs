//! Binary decoding of relay wire types.
//!
//! [`Cursor`] walks a byte slice and decodes exactly one value per call,
//! advancing past it. Numeric fields are big-endian and fixed-width;
//! strings and buffers carry a 4-byte length where `0xFFFFFFFF` denotes a
//! null value (distinct from a zero-length one); pointers, longs and times
//! are ASCII payloads behind a 1-byte length.
//!
//! Running out of bytes mid-value yields [`DecodeError::Incomplete`],
//! which the framer treats as "wait for more input" at the stream level -
//! it is not a corruption signal.

use smallvec::SmallVec;

use crate::error::DecodeError;
use crate::object::{Array, Hashtable, Hdata, HdataRow, Infolist, ObjType, Object, Pointer};

/// Wire-level null marker for string/buffer lengths.
const LEN_NULL: u32 = 0xffff_ffff;

/// A read cursor over one frame body.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Cursor<'a> {
        Cursor { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Incomplete {
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn i32_be(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 3-byte object type tag.
    pub fn type_tag(&mut self) -> Result<ObjType, DecodeError> {
        let bytes = self.take(ObjType::TAG_LEN)?;
        ObjType::from_tag(bytes).ok_or(DecodeError::UnknownTag {
            tag: [bytes[0], bytes[1], bytes[2]],
        })
    }

    /// Read a non-negative element/row count.
    fn count(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let count = self.i32_be()?;
        if count < 0 {
            return Err(DecodeError::InvalidLength {
                what,
                length: i64::from(count),
            });
        }
        Ok(count as usize)
    }

    /// ASCII payload behind a 1-byte length (pointer/long/time bodies).
    fn short_ascii(&mut self, what: &'static str) -> Result<&'a str, DecodeError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
            what,
            byte_pos: e.valid_up_to(),
        })
    }

    /// Decode a `chr` value.
    pub fn chr(&mut self) -> Result<i8, DecodeError> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Decode an `int` value.
    pub fn int(&mut self) -> Result<i32, DecodeError> {
        self.i32_be()
    }

    /// Decode a `lon` value.
    pub fn long(&mut self) -> Result<i64, DecodeError> {
        let ascii = self.short_ascii("long integer")?;
        ascii.parse().map_err(|_| DecodeError::InvalidNumber {
            what: "long integer",
            value: ascii.to_string(),
        })
    }

    /// Decode a `str` value. `None` is wire-level null.
    pub fn string(&mut self) -> Result<Option<String>, DecodeError> {
        match self.raw_bytes("string")? {
            None => Ok(None),
            Some(bytes) => {
                let s = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
                    what: "string",
                    byte_pos: e.valid_up_to(),
                })?;
                Ok(Some(s.to_string()))
            }
        }
    }

    /// Decode a `buf` value. `None` is wire-level null.
    pub fn buffer(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        Ok(self.raw_bytes("buffer")?.map(<[u8]>::to_vec))
    }

    fn raw_bytes(&mut self, what: &'static str) -> Result<Option<&'a [u8]>, DecodeError> {
        let len = self.u32_be()?;
        if len == LEN_NULL {
            return Ok(None);
        }
        // Lengths other than the null marker are unsigned but bounded by
        // the frame; anything above i32::MAX is length-field corruption.
        if len > i32::MAX as u32 {
            return Err(DecodeError::InvalidLength {
                what,
                length: i64::from(len),
            });
        }
        self.take(len as usize).map(Some)
    }

    /// Decode a `ptr` value. The wire form `0` yields [`Pointer::NULL`].
    pub fn pointer(&mut self) -> Result<Pointer, DecodeError> {
        let ascii = self.short_ascii("pointer")?;
        Pointer::from_hex(ascii).ok_or_else(|| DecodeError::InvalidNumber {
            what: "pointer",
            value: ascii.to_string(),
        })
    }

    /// Decode a `tim` value as epoch seconds.
    pub fn time(&mut self) -> Result<i64, DecodeError> {
        let ascii = self.short_ascii("time")?;
        ascii.parse().map_err(|_| DecodeError::InvalidNumber {
            what: "time",
            value: ascii.to_string(),
        })
    }

    /// Decode one object of the given type.
    pub fn object(&mut self, ty: ObjType) -> Result<Object, DecodeError> {
        match ty {
            ObjType::Char => self.chr().map(Object::Char),
            ObjType::Int => self.int().map(Object::Int),
            ObjType::Long => self.long().map(Object::Long),
            ObjType::Str => self.string().map(Object::Str),
            ObjType::Buffer => self.buffer().map(Object::Buffer),
            ObjType::Pointer => self.pointer().map(Object::Pointer),
            ObjType::Time => self.time().map(Object::Time),
            ObjType::Hashtable => self.hashtable().map(Object::Hashtable),
            ObjType::Hdata => self.hdata().map(Object::Hdata),
            ObjType::Info => {
                let name = self.string()?;
                let value = self.string()?;
                Ok(Object::Info { name, value })
            }
            ObjType::Infolist => self.infolist().map(Object::Infolist),
            ObjType::Array => self.array().map(Object::Array),
        }
    }

    /// Decode a tagged object: type tag then value.
    pub fn tagged_object(&mut self) -> Result<Object, DecodeError> {
        let ty = self.type_tag()?;
        self.object(ty)
    }

    /// Decode an `htb` value: key type + value type + count + entries.
    pub fn hashtable(&mut self) -> Result<Hashtable, DecodeError> {
        let key_type = self.type_tag()?;
        let value_type = self.type_tag()?;
        let count = self.count("hashtable")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.object(key_type)?;
            let value = self.object(value_type)?;
            entries.push((key, value));
        }
        Ok(Hashtable::new(entries))
    }

    /// Decode an `hda` value: h-path, key schema, then rows.
    ///
    /// Each row carries one pointer per path component followed by one
    /// value per declared key, in declaration order.
    pub fn hdata(&mut self) -> Result<Hdata, DecodeError> {
        let path = match self.string()? {
            Some(p) if !p.is_empty() => p.split('/').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let keys_spec = self.string()?.unwrap_or_default();
        let mut keys = Vec::new();
        for part in keys_spec.split(',').filter(|p| !p.is_empty()) {
            let (name, code) = part.split_once(':').ok_or_else(|| DecodeError::InvalidNumber {
                what: "hdata key spec",
                value: part.to_string(),
            })?;
            let ty = ObjType::from_key_code(code).ok_or_else(|| {
                let mut tag = [b' '; 3];
                for (dst, src) in tag.iter_mut().zip(code.bytes()) {
                    *dst = src;
                }
                DecodeError::UnknownTag { tag }
            })?;
            keys.push((name.to_string(), ty));
        }
        let count = self.count("hdata")?;
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            let mut pointers = SmallVec::new();
            for _ in 0..path.len() {
                pointers.push(self.pointer()?);
            }
            let mut values = Vec::with_capacity(keys.len());
            for (_, ty) in &keys {
                values.push(self.object(*ty)?);
            }
            rows.push(HdataRow::new(pointers, values));
        }
        Ok(Hdata::new(path, keys, rows))
    }

    /// Decode an `inl` value.
    pub fn infolist(&mut self) -> Result<Infolist, DecodeError> {
        let name = self.string()?;
        let item_count = self.count("infolist")?;
        let mut items = Vec::with_capacity(item_count);
        for _ in 0..item_count {
            let var_count = self.count("infolist item")?;
            let mut vars = Vec::with_capacity(var_count);
            for _ in 0..var_count {
                let var_name = self.string()?.unwrap_or_default();
                let value = self.tagged_object()?;
                vars.push((var_name, value));
            }
            items.push(vars);
        }
        Ok(Infolist::new(name, items))
    }

    /// Decode an `arr` value: element type + count + values.
    pub fn array(&mut self) -> Result<Array, DecodeError> {
        let elem = self.type_tag()?;
        let count = self.count("array")?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.object(elem)?);
        }
        Ok(Array::new(elem, values))
    }
}
