//! Typed representation of decoded relay objects.
//!
//! Every value on the wire carries a 3-byte ASCII type tag; [`ObjType`]
//! enumerates the tags and [`Object`] is the corresponding tagged variant.
//! Values are immutable once decoded: the structured accessors
//! (`expect_*`) either borrow the inner value or report a
//! [`DecodeError::TypeMismatch`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use smallvec::SmallVec;

use crate::error::DecodeError;

/// Render a (possibly non-ASCII) type tag for error messages.
pub(crate) fn tag_display(tag: &[u8; 3]) -> String {
    if tag.iter().all(|b| b.is_ascii_graphic()) {
        String::from_utf8_lossy(tag).into_owned()
    } else {
        format!("{:02x}{:02x}{:02x}", tag[0], tag[1], tag[2])
    }
}

/// Wire type of a relay object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjType {
    /// `chr` - one signed byte.
    Char,
    /// `int` - 4-byte big-endian signed integer.
    Int,
    /// `lon` - long integer as length-prefixed ASCII decimal.
    Long,
    /// `str` - length-prefixed UTF-8 string, nullable.
    Str,
    /// `buf` - length-prefixed raw bytes, nullable.
    Buffer,
    /// `ptr` - opaque handle as length-prefixed ASCII hex.
    Pointer,
    /// `tim` - epoch seconds as length-prefixed ASCII decimal.
    Time,
    /// `htb` - hashtable with uniformly-typed keys and values.
    Hashtable,
    /// `hda` - structured record set with a shared field schema.
    Hdata,
    /// `inf` - (name, value) string pair.
    Info,
    /// `inl` - named list of variable sets.
    Infolist,
    /// `arr` - array of uniformly-typed values.
    Array,
}

impl ObjType {
    /// Number of bytes in a wire type tag.
    pub const TAG_LEN: usize = 3;

    /// Parse a 3-byte wire tag.
    #[must_use]
    pub fn from_tag(tag: &[u8]) -> Option<ObjType> {
        match tag {
            b"chr" => Some(ObjType::Char),
            b"int" => Some(ObjType::Int),
            b"lon" => Some(ObjType::Long),
            b"str" => Some(ObjType::Str),
            b"buf" => Some(ObjType::Buffer),
            b"ptr" => Some(ObjType::Pointer),
            b"tim" => Some(ObjType::Time),
            b"htb" => Some(ObjType::Hashtable),
            b"hda" => Some(ObjType::Hdata),
            b"inf" => Some(ObjType::Info),
            b"inl" => Some(ObjType::Infolist),
            b"arr" => Some(ObjType::Array),
            _ => None,
        }
    }

    /// The wire tag for this type.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            ObjType::Char => "chr",
            ObjType::Int => "int",
            ObjType::Long => "lon",
            ObjType::Str => "str",
            ObjType::Buffer => "buf",
            ObjType::Pointer => "ptr",
            ObjType::Time => "tim",
            ObjType::Hashtable => "htb",
            ObjType::Hdata => "hda",
            ObjType::Info => "inf",
            ObjType::Infolist => "inl",
            ObjType::Array => "arr",
        }
    }

    /// Parse a single-letter type code from an hdata key list (`name:typ`).
    ///
    /// Key lists use the same 3-letter codes as wire tags.
    #[must_use]
    pub fn from_key_code(code: &str) -> Option<ObjType> {
        ObjType::from_tag(code.as_bytes())
    }
}

impl fmt::Display for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An opaque server-assigned handle.
///
/// Pointers identify buffers, lines and nicks on the relay side. They are
/// not client memory addresses; equality is the only meaningful operation
/// besides the null check. The null pointer (`0x0`) denotes "no object".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pointer(u64);

impl Pointer {
    /// The null pointer.
    pub const NULL: Pointer = Pointer(0);

    /// Build a pointer from its raw numeric value.
    #[must_use]
    pub fn new(value: u64) -> Pointer {
        Pointer(value)
    }

    /// Parse the ASCII-hex wire form (no `0x` prefix).
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Pointer> {
        u64::from_str_radix(hex, 16).ok().map(Pointer)
    }

    /// Raw numeric value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// True for the "no object" pointer.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// One decoded relay object.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    /// One signed byte.
    Char(i8),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// Nullable UTF-8 string. `None` is a wire-level null, distinct from
    /// `Some("")`.
    Str(Option<String>),
    /// Nullable raw byte buffer.
    Buffer(Option<Vec<u8>>),
    /// Opaque handle.
    Pointer(Pointer),
    /// Epoch seconds.
    Time(i64),
    /// Key/value mapping.
    Hashtable(Hashtable),
    /// Structured record set.
    Hdata(Hdata),
    /// Named info string.
    Info {
        /// Info name.
        name: Option<String>,
        /// Info value.
        value: Option<String>,
    },
    /// Named list of variable sets.
    Infolist(Infolist),
    /// Array of uniformly-typed values.
    Array(Array),
}

impl Object {
    /// Wire type of this object.
    #[must_use]
    pub fn obj_type(&self) -> ObjType {
        match self {
            Object::Char(_) => ObjType::Char,
            Object::Int(_) => ObjType::Int,
            Object::Long(_) => ObjType::Long,
            Object::Str(_) => ObjType::Str,
            Object::Buffer(_) => ObjType::Buffer,
            Object::Pointer(_) => ObjType::Pointer,
            Object::Time(_) => ObjType::Time,
            Object::Hashtable(_) => ObjType::Hashtable,
            Object::Hdata(_) => ObjType::Hdata,
            Object::Info { .. } => ObjType::Info,
            Object::Infolist(_) => ObjType::Infolist,
            Object::Array(_) => ObjType::Array,
        }
    }

    fn mismatch(&self, expected: &'static str) -> DecodeError {
        DecodeError::TypeMismatch {
            expected,
            found: self.obj_type().tag(),
        }
    }

    /// Borrow the string value, `None` meaning wire-level null.
    pub fn expect_str(&self) -> Result<Option<&str>, DecodeError> {
        match self {
            Object::Str(s) => Ok(s.as_deref()),
            other => Err(other.mismatch("str")),
        }
    }

    /// The integer value.
    pub fn expect_int(&self) -> Result<i32, DecodeError> {
        match self {
            Object::Int(v) => Ok(*v),
            other => Err(other.mismatch("int")),
        }
    }

    /// The long integer value.
    pub fn expect_long(&self) -> Result<i64, DecodeError> {
        match self {
            Object::Long(v) => Ok(*v),
            other => Err(other.mismatch("lon")),
        }
    }

    /// The char value.
    pub fn expect_char(&self) -> Result<i8, DecodeError> {
        match self {
            Object::Char(v) => Ok(*v),
            other => Err(other.mismatch("chr")),
        }
    }

    /// The pointer value.
    pub fn expect_pointer(&self) -> Result<Pointer, DecodeError> {
        match self {
            Object::Pointer(p) => Ok(*p),
            other => Err(other.mismatch("ptr")),
        }
    }

    /// The time value as epoch seconds.
    pub fn expect_time(&self) -> Result<i64, DecodeError> {
        match self {
            Object::Time(t) => Ok(*t),
            other => Err(other.mismatch("tim")),
        }
    }

    /// Borrow the hashtable.
    pub fn expect_hashtable(&self) -> Result<&Hashtable, DecodeError> {
        match self {
            Object::Hashtable(h) => Ok(h),
            other => Err(other.mismatch("htb")),
        }
    }

    /// Borrow the hdata record set.
    pub fn expect_hdata(&self) -> Result<&Hdata, DecodeError> {
        match self {
            Object::Hdata(h) => Ok(h),
            other => Err(other.mismatch("hda")),
        }
    }

    /// Borrow the hdata record set, also checking its record name.
    pub fn expect_hdata_named(&self, name: &'static str) -> Result<&Hdata, DecodeError> {
        let hdata = self.expect_hdata()?;
        if hdata.name() == name {
            Ok(hdata)
        } else {
            Err(DecodeError::TypeMismatch {
                expected: name,
                found: "hda",
            })
        }
    }

    /// Borrow the array.
    pub fn expect_array(&self) -> Result<&Array, DecodeError> {
        match self {
            Object::Array(a) => Ok(a),
            other => Err(other.mismatch("arr")),
        }
    }

    /// The time value as a UTC timestamp, if this is a time object.
    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Object::Time(t) => Utc.timestamp_opt(*t, 0).single(),
            _ => None,
        }
    }
}

/// A decoded hashtable.
///
/// Entries keep wire order. Keys and values are uniformly typed per the
/// frame's declaration; in practice relay servers only send string keys
/// (buffer local variables), which [`Hashtable::get`] and
/// [`Hashtable::string_entries`] cater to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hashtable {
    entries: Vec<(Object, Object)>,
}

impl Hashtable {
    /// Build a hashtable from decoded entries.
    #[must_use]
    pub fn new(entries: Vec<(Object, Object)>) -> Hashtable {
        Hashtable { entries }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &(Object, Object)> {
        self.entries.iter()
    }

    /// Look up a value by string key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.iter().find_map(|(k, v)| match k {
            Object::Str(Some(s)) if s == key => Some(v),
            _ => None,
        })
    }

    /// Iterate over entries whose key and value are both non-null strings.
    pub fn string_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(k, v)| match (k, v) {
            (Object::Str(Some(k)), Object::Str(Some(v))) => Some((k.as_str(), v.as_str())),
            _ => None,
        })
    }

    /// Collect the string entries into an owned map.
    #[must_use]
    pub fn to_string_map(&self) -> HashMap<String, String> {
        self.string_entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// One hdata row: the path pointers plus one value per declared key.
#[derive(Clone, Debug, PartialEq)]
pub struct HdataRow {
    pub(crate) pointers: SmallVec<[Pointer; 4]>,
    pub(crate) values: Vec<Object>,
}

impl HdataRow {
    /// Build a row from its decoded parts.
    #[must_use]
    pub fn new(pointers: impl Into<SmallVec<[Pointer; 4]>>, values: Vec<Object>) -> HdataRow {
        HdataRow {
            pointers: pointers.into(),
            values,
        }
    }
}

/// A decoded hdata: a record name path, a field schema declared once, and
/// rows sharing that schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Hdata {
    path: Vec<String>,
    keys: Vec<(String, ObjType)>,
    rows: Vec<HdataRow>,
}

impl Hdata {
    /// Build an hdata from its decoded parts.
    #[must_use]
    pub fn new(path: Vec<String>, keys: Vec<(String, ObjType)>, rows: Vec<HdataRow>) -> Hdata {
        Hdata { path, keys, rows }
    }

    /// The record name: the last h-path component (`buffer`, `line_data`,
    /// `nicklist_item`, ...). Empty for an empty path.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// The full h-path components.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The declared field schema, in wire order.
    #[must_use]
    pub fn keys(&self) -> &[(String, ObjType)] {
        &self.keys
    }

    /// Declared type of a field, if present.
    #[must_use]
    pub fn key_type(&self, name: &str) -> Option<ObjType> {
        self.keys
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, t)| *t)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow one row by index.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<HdataRowRef<'_>> {
        self.rows.get(index).map(|row| HdataRowRef { hdata: self, row })
    }

    /// Iterate over rows in wire order.
    pub fn rows(&self) -> impl Iterator<Item = HdataRowRef<'_>> {
        self.rows.iter().map(move |row| HdataRowRef { hdata: self, row })
    }
}

/// A borrowed view of one hdata row with access to the shared schema.
#[derive(Clone, Copy, Debug)]
pub struct HdataRowRef<'a> {
    hdata: &'a Hdata,
    row: &'a HdataRow,
}

impl<'a> HdataRowRef<'a> {
    /// Path pointer at the given depth (0 = the path root object).
    #[must_use]
    pub fn path_pointer(&self, depth: usize) -> Option<Pointer> {
        self.row.pointers.get(depth).copied()
    }

    /// The pointer of the path root object (depth 0).
    #[must_use]
    pub fn root_pointer(&self) -> Pointer {
        self.row.pointers.first().copied().unwrap_or(Pointer::NULL)
    }

    /// The pointer of the record itself (last path element).
    #[must_use]
    pub fn own_pointer(&self) -> Pointer {
        self.row.pointers.last().copied().unwrap_or(Pointer::NULL)
    }

    /// Borrow a field value by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Object> {
        self.hdata
            .keys
            .iter()
            .position(|(k, _)| k == key)
            .and_then(|i| self.row.values.get(i))
    }

    /// Borrow a field value by name, reporting a mismatch when absent.
    pub fn expect(&self, key: &'static str) -> Result<&'a Object, DecodeError> {
        self.get(key).ok_or(DecodeError::TypeMismatch {
            expected: key,
            found: "missing field",
        })
    }

    /// String field, `None` when absent or null.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&'a str> {
        match self.get(key) {
            Some(Object::Str(Some(s))) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer field, `None` when absent or mistyped.
    #[must_use]
    pub fn int_field(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(Object::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Char field, `None` when absent or mistyped.
    #[must_use]
    pub fn char_field(&self, key: &str) -> Option<i8> {
        match self.get(key) {
            Some(Object::Char(v)) => Some(*v),
            _ => None,
        }
    }

    /// Pointer field, `None` when absent or mistyped.
    #[must_use]
    pub fn pointer_field(&self, key: &str) -> Option<Pointer> {
        match self.get(key) {
            Some(Object::Pointer(p)) => Some(*p),
            _ => None,
        }
    }

    /// Time field as epoch seconds, `None` when absent or mistyped.
    #[must_use]
    pub fn time_field(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Object::Time(t)) => Some(*t),
            _ => None,
        }
    }

    /// Hashtable field, `None` when absent or mistyped.
    #[must_use]
    pub fn hashtable_field(&self, key: &str) -> Option<&'a Hashtable> {
        match self.get(key) {
            Some(Object::Hashtable(h)) => Some(h),
            _ => None,
        }
    }

    /// String-array field collected into owned strings, skipping nulls.
    /// `None` when the field is absent or not an array.
    #[must_use]
    pub fn str_array_field(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key) {
            Some(Object::Array(arr)) => Some(
                arr.values()
                    .iter()
                    .filter_map(|v| match v {
                        Object::Str(Some(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// A decoded infolist.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Infolist {
    name: Option<String>,
    items: Vec<Vec<(String, Object)>>,
}

impl Infolist {
    /// Build an infolist from its decoded parts.
    #[must_use]
    pub fn new(name: Option<String>, items: Vec<Vec<(String, Object)>>) -> Infolist {
        Infolist { name, items }
    }

    /// The infolist name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The item variable sets, in wire order.
    #[must_use]
    pub fn items(&self) -> &[Vec<(String, Object)>] {
        &self.items
    }
}

/// A decoded array of uniformly-typed values.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    elem: ObjType,
    values: Vec<Object>,
}

impl Array {
    /// Build an array from its decoded parts.
    #[must_use]
    pub fn new(elem: ObjType, values: Vec<Object>) -> Array {
        Array { elem, values }
    }

    /// Declared element type.
    #[must_use]
    pub fn elem_type(&self) -> ObjType {
        self.elem
    }

    /// The values, in wire order.
    #[must_use]
    pub fn values(&self) -> &[Object] {
        &self.values
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
