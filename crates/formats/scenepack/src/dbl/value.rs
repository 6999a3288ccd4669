use std::fmt;

use crate::arena::EntityRef;
use crate::audio::AudioRef;
use crate::cursor::{Cursor, Writer};
use crate::error::Result;
use crate::object::ObjId;

use super::DblList;

/// Type code in the low nibble of an entry header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    Undefined = 0,
    Double = 1,
    Float = 2,
    Int = 3,
    String = 4,
    File = 5,
    Terminator = 6,
    Data = 7,
    ObjRef = 8,
    ObjRefList = 9,
    MessageId = 10,
    SoundRef = 11,
    NestedList = 12,
}

impl EntryType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Undefined,
            1 => Self::Double,
            2 => Self::Float,
            3 => Self::Int,
            4 => Self::String,
            5 => Self::File,
            6 => Self::Terminator,
            7 => Self::Data,
            8 => Self::ObjRef,
            9 => Self::ObjRefList,
            10 => Self::MessageId,
            11 => Self::SoundRef,
            12 => Self::NestedList,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Double => "DOUBLE",
            Self::Float => "FLOAT",
            Self::Int => "INT",
            Self::String => "STRING",
            Self::File => "FILE",
            Self::Terminator => "TERMINATOR",
            Self::Data => "DATA",
            Self::ObjRef => "OBJREF",
            Self::ObjRefList => "OBJREF_LIST",
            Self::MessageId => "MESSAGE_ID",
            Self::SoundRef => "SOUND_REF",
            Self::NestedList => "NESTED_LIST",
        }
    }
}

/// Decoded payload of one DBL entry.
///
/// Object references read from disk hold the raw save handle until the owning
/// pack has indexed every object; see [`DblList::resolve_refs`].
#[derive(Debug, Clone, PartialEq)]
pub enum DblValue {
    Undefined,
    Double(f64),
    Float(f32),
    Int(u32),
    String(String),
    File(String),
    Terminator,
    Data(Vec<u8>),
    ObjRef(Option<ObjId>),
    ObjRefList(Vec<Option<ObjId>>),
    Message(u32),
    Sound(AudioRef),
    Nested(DblList),
    /// Entry with a type code this crate does not know. `raw` is everything
    /// that followed its header byte in the enclosing list.
    Unknown { code: u8, raw: Vec<u8> },
}

impl DblValue {
    /// Default value for a freshly added member of type `ty`.
    pub fn default_for(ty: EntryType) -> Self {
        match ty {
            EntryType::Undefined => Self::Undefined,
            EntryType::Double => Self::Double(0.0),
            EntryType::Float => Self::Float(0.0),
            EntryType::Int => Self::Int(0),
            EntryType::String => Self::String(String::new()),
            EntryType::File => Self::File(String::new()),
            EntryType::Terminator => Self::Terminator,
            EntryType::Data => Self::Data(Vec::new()),
            EntryType::ObjRef => Self::ObjRef(None),
            EntryType::ObjRefList => Self::ObjRefList(Vec::new()),
            EntryType::MessageId => Self::Message(0),
            EntryType::SoundRef => Self::Sound(AudioRef::NULL),
            EntryType::NestedList => Self::Nested(DblList::default()),
        }
    }

    /// Type code as stored in the header byte.
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Unknown { code, .. } => *code,
            known => known.entry_type().map_or(0, EntryType::code),
        }
    }

    /// `None` only for [`DblValue::Unknown`].
    pub fn entry_type(&self) -> Option<EntryType> {
        Some(match self {
            Self::Undefined => EntryType::Undefined,
            Self::Double(_) => EntryType::Double,
            Self::Float(_) => EntryType::Float,
            Self::Int(_) => EntryType::Int,
            Self::String(_) => EntryType::String,
            Self::File(_) => EntryType::File,
            Self::Terminator => EntryType::Terminator,
            Self::Data(_) => EntryType::Data,
            Self::ObjRef(_) => EntryType::ObjRef,
            Self::ObjRefList(_) => EntryType::ObjRefList,
            Self::Message(_) => EntryType::MessageId,
            Self::Sound(_) => EntryType::SoundRef,
            Self::Nested(_) => EntryType::NestedList,
            Self::Unknown { .. } => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::File(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Decode the payload for `code`. Unknown codes swallow the rest of the
    /// cursor, which is bounded by the enclosing list body.
    pub(crate) fn decode(code: u8, c: &mut Cursor<'_>) -> Result<Self> {
        let Some(ty) = EntryType::from_code(code) else {
            return Ok(Self::Unknown {
                code,
                raw: c.read_rest().to_vec(),
            });
        };
        Ok(match ty {
            EntryType::Undefined => Self::Undefined,
            EntryType::Double => Self::Double(c.read_f64()?),
            EntryType::Float => Self::Float(c.read_f32()?),
            EntryType::Int => Self::Int(c.read_u32()?),
            EntryType::String => Self::String(c.read_cstring()?),
            EntryType::File => Self::File(c.read_cstring()?),
            EntryType::Terminator => Self::Terminator,
            EntryType::Data => Self::Data(c.read_sized()?.to_vec()),
            EntryType::ObjRef => Self::ObjRef(raw_handle(c.read_u32()?)),
            EntryType::ObjRefList => {
                Self::ObjRefList(c.read_counted(4, |c| Ok(raw_handle(c.read_u32()?)))?)
            }
            EntryType::MessageId => Self::Message(c.read_u32()?),
            EntryType::SoundRef => Self::Sound(AudioRef { id: c.read_u32()? }),
            EntryType::NestedList => Self::Nested(DblList::read(c)?),
        })
    }

    /// Encode the payload. `handle_of` maps live objects to save handles.
    pub(crate) fn encode(&self, w: &mut Writer, handle_of: &dyn Fn(ObjId) -> u32) {
        match self {
            Self::Undefined | Self::Terminator => {}
            Self::Double(v) => w.write_f64(*v),
            Self::Float(v) => w.write_f32(*v),
            Self::Int(v) | Self::Message(v) => w.write_u32(*v),
            Self::String(s) | Self::File(s) => w.write_cstring(s),
            Self::Data(d) => w.write_sized(d),
            Self::ObjRef(r) => w.write_u32(r.map_or(0, handle_of)),
            Self::ObjRefList(refs) => {
                w.write_u32(refs.len() as u32);
                for r in refs {
                    w.write_u32(r.map_or(0, handle_of));
                }
            }
            Self::Sound(r) => w.write_u32(r.id),
            Self::Nested(list) => list.write(w, handle_of),
            Self::Unknown { raw, .. } => w.write_bytes(raw),
        }
    }
}

fn raw_handle(handle: u32) -> Option<ObjId> {
    (handle != 0).then(|| ObjId::new(handle))
}

impl fmt::Display for DblValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::File(s) => write!(f, "file {s:?}"),
            Self::Terminator => write!(f, "terminator"),
            Self::Data(d) => write!(f, "{} byte(s) of data", d.len()),
            Self::ObjRef(None) => write!(f, "null"),
            Self::ObjRef(Some(id)) => write!(f, "object #{}", id.index()),
            Self::ObjRefList(refs) => write!(f, "{} reference(s)", refs.len()),
            Self::Message(id) => write!(f, "message {id}"),
            Self::Sound(r) => write!(f, "sound #{}", r.id),
            Self::Nested(list) => write!(f, "list of {} entries", list.entries.len()),
            Self::Unknown { code, .. } => write!(f, "unknown type {code}"),
        }
    }
}
