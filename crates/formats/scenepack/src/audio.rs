use tracing::debug;

use crate::chunk::Chunk;
use crate::cursor::{Cursor, Writer};
use crate::error::Result;

/// Reference to an audio slot. Id 0 is the null reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AudioRef {
    pub id: u32,
}

impl AudioRef {
    pub const NULL: Self = Self { id: 0 };

    pub fn is_null(self) -> bool {
        self.id == 0
    }
}

/// Field-level access to an audio record.
///
/// Every variant lists its fields through these callbacks in a fixed order;
/// that order is also the binary layout of the record.
pub trait AudioFieldVisitor {
    fn visit_u32(&mut self, name: &'static str, value: &mut u32) -> Result<()>;
    fn visit_f32(&mut self, name: &'static str, value: &mut f32) -> Result<()>;
    fn visit_string(&mut self, name: &'static str, value: &mut String) -> Result<()>;
    fn visit_ref(&mut self, name: &'static str, value: &mut AudioRef) -> Result<()>;

    fn visit_refs(&mut self, name: &'static str, value: &mut Vec<AudioRef>) -> Result<()> {
        for r in value.iter_mut() {
            self.visit_ref(name, r)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wave {
    pub loop_start: u32,
    pub loop_end: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub wave: AudioRef,
    pub volume: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub flags: u32,
}

impl Default for Sound {
    fn default() -> Self {
        Self {
            wave: AudioRef::NULL,
            volume: 1.0,
            pitch: 1.0,
            min_distance: 100.0,
            max_distance: 1000.0,
            flags: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Set {
    pub mode: u32,
    pub sounds: Vec<AudioRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub label: String,
    pub footstep: AudioRef,
    pub scrape: AudioRef,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Impact {
    pub first: AudioRef,
    pub second: AudioRef,
    pub sound: AudioRef,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub reverb: u32,
    pub volume: f32,
    pub damping: f32,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            reverb: 0,
            volume: 1.0,
            damping: 0.5,
        }
    }
}

/// One audio slot's record.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioObject {
    Wave(Wave),
    Sound(Sound),
    Set(Set),
    Material(Material),
    Impact(Impact),
    Room(Room),
    /// A record kind this crate does not know; kept byte for byte.
    Opaque { kind: u32, raw: Vec<u8> },
}

impl AudioObject {
    pub const WAVE: u32 = 1;
    pub const SOUND: u32 = 2;
    pub const SET: u32 = 3;
    pub const MATERIAL: u32 = 4;
    pub const IMPACT: u32 = 5;
    pub const ROOM: u32 = 6;

    /// Default-valued record for a known kind.
    pub fn new(kind: u32) -> Option<Self> {
        Some(match kind {
            Self::WAVE => Self::Wave(Wave::default()),
            Self::SOUND => Self::Sound(Sound::default()),
            Self::SET => Self::Set(Set::default()),
            Self::MATERIAL => Self::Material(Material::default()),
            Self::IMPACT => Self::Impact(Impact::default()),
            Self::ROOM => Self::Room(Room::default()),
            _ => return None,
        })
    }

    pub fn kind(&self) -> u32 {
        match self {
            Self::Wave(_) => Self::WAVE,
            Self::Sound(_) => Self::SOUND,
            Self::Set(_) => Self::SET,
            Self::Material(_) => Self::MATERIAL,
            Self::Impact(_) => Self::IMPACT,
            Self::Room(_) => Self::ROOM,
            Self::Opaque { kind, .. } => *kind,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Wave(_) => "Wave",
            Self::Sound(_) => "Sound",
            Self::Set(_) => "Set",
            Self::Material(_) => "Material",
            Self::Impact(_) => "Impact",
            Self::Room(_) => "Room",
            Self::Opaque { .. } => "Unknown",
        }
    }

    pub fn is_wave(&self) -> bool {
        matches!(self, Self::Wave(_))
    }

    /// Visit every typed field of the record.
    pub fn visit(&mut self, v: &mut impl AudioFieldVisitor) -> Result<()> {
        match self {
            Self::Wave(w) => {
                v.visit_u32("loopStart", &mut w.loop_start)?;
                v.visit_u32("loopEnd", &mut w.loop_end)
            }
            Self::Sound(s) => {
                v.visit_ref("wave", &mut s.wave)?;
                v.visit_f32("volume", &mut s.volume)?;
                v.visit_f32("pitch", &mut s.pitch)?;
                v.visit_f32("minDistance", &mut s.min_distance)?;
                v.visit_f32("maxDistance", &mut s.max_distance)?;
                v.visit_u32("flags", &mut s.flags)
            }
            Self::Set(s) => {
                v.visit_u32("mode", &mut s.mode)?;
                v.visit_refs("sounds", &mut s.sounds)
            }
            Self::Material(m) => {
                v.visit_string("label", &mut m.label)?;
                v.visit_ref("footstep", &mut m.footstep)?;
                v.visit_ref("scrape", &mut m.scrape)
            }
            Self::Impact(i) => {
                v.visit_ref("first", &mut i.first)?;
                v.visit_ref("second", &mut i.second)?;
                v.visit_ref("sound", &mut i.sound)?;
                v.visit_f32("threshold", &mut i.threshold)
            }
            Self::Room(r) => {
                v.visit_u32("reverb", &mut r.reverb)?;
                v.visit_f32("volume", &mut r.volume)?;
                v.visit_f32("damping", &mut r.damping)
            }
            Self::Opaque { .. } => Ok(()),
        }
    }

    /// Textual `(field, value)` pairs, for display.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut lister = FieldLister::default();
        let mut copy = self.clone();
        // FieldLister never fails.
        let _ = copy.visit(&mut lister);
        lister.fields
    }

    fn read(c: &mut Cursor<'_>, kind: u32) -> Result<Self> {
        let Some(mut obj) = Self::new(kind) else {
            return Ok(Self::Opaque {
                kind,
                raw: c.read_rest().to_vec(),
            });
        };
        obj.visit(&mut FieldReader { c })?;
        Ok(obj)
    }

    fn write(&self, w: &mut Writer) {
        if let Self::Opaque { raw, .. } = self {
            w.write_bytes(raw);
            return;
        }
        let mut copy = self.clone();
        // FieldWriter never fails.
        let _ = copy.visit(&mut FieldWriter { w });
    }
}

struct FieldReader<'c, 'a> {
    c: &'c mut Cursor<'a>,
}

impl AudioFieldVisitor for FieldReader<'_, '_> {
    fn visit_u32(&mut self, _: &'static str, value: &mut u32) -> Result<()> {
        *value = self.c.read_u32()?;
        Ok(())
    }
    fn visit_f32(&mut self, _: &'static str, value: &mut f32) -> Result<()> {
        *value = self.c.read_f32()?;
        Ok(())
    }
    fn visit_string(&mut self, _: &'static str, value: &mut String) -> Result<()> {
        *value = self.c.read_cstring()?;
        Ok(())
    }
    fn visit_ref(&mut self, _: &'static str, value: &mut AudioRef) -> Result<()> {
        value.id = self.c.read_u32()?;
        Ok(())
    }
    fn visit_refs(&mut self, _: &'static str, value: &mut Vec<AudioRef>) -> Result<()> {
        *value = self.c.read_counted(4, |c| Ok(AudioRef { id: c.read_u32()? }))?;
        Ok(())
    }
}

struct FieldWriter<'w> {
    w: &'w mut Writer,
}

impl AudioFieldVisitor for FieldWriter<'_> {
    fn visit_u32(&mut self, _: &'static str, value: &mut u32) -> Result<()> {
        self.w.write_u32(*value);
        Ok(())
    }
    fn visit_f32(&mut self, _: &'static str, value: &mut f32) -> Result<()> {
        self.w.write_f32(*value);
        Ok(())
    }
    fn visit_string(&mut self, _: &'static str, value: &mut String) -> Result<()> {
        self.w.write_cstring(value);
        Ok(())
    }
    fn visit_ref(&mut self, _: &'static str, value: &mut AudioRef) -> Result<()> {
        self.w.write_u32(value.id);
        Ok(())
    }
    fn visit_refs(&mut self, _: &'static str, value: &mut Vec<AudioRef>) -> Result<()> {
        self.w.write_u32(value.len() as u32);
        for r in value.iter() {
            self.w.write_u32(r.id);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FieldLister {
    fields: Vec<(&'static str, String)>,
}

impl AudioFieldVisitor for FieldLister {
    fn visit_u32(&mut self, name: &'static str, value: &mut u32) -> Result<()> {
        self.fields.push((name, value.to_string()));
        Ok(())
    }
    fn visit_f32(&mut self, name: &'static str, value: &mut f32) -> Result<()> {
        self.fields.push((name, value.to_string()));
        Ok(())
    }
    fn visit_string(&mut self, name: &'static str, value: &mut String) -> Result<()> {
        self.fields.push((name, value.clone()));
        Ok(())
    }
    fn visit_ref(&mut self, name: &'static str, value: &mut AudioRef) -> Result<()> {
        self.fields.push((name, format!("#{}", value.id)));
        Ok(())
    }
}

/// Index-stable audio slots: names and records in parallel arrays.
///
/// Bytes a record carries past its known fields are kept per slot and
/// written back after the fields. Slot 0 is reserved. Slots are never
/// removed, because ids are embedded in DBL entries and other audio records
/// throughout the scene.
#[derive(Debug, Clone)]
pub struct AudioRegistry {
    names: Vec<String>,
    objects: Vec<Option<AudioObject>>,
    tails: Vec<Vec<u8>>,
}

impl Default for AudioRegistry {
    fn default() -> Self {
        Self {
            names: vec![String::new()],
            objects: vec![None],
            tails: vec![Vec::new()],
        }
    }
}

impl AudioRegistry {
    pub const TAG: [u8; 4] = *b"AUDI";

    /// Number of slots including the reserved slot 0.
    pub fn slot_count(&self) -> usize {
        self.objects.len()
    }

    /// Make sure slot `id` exists.
    pub fn allocate_slot(&mut self, id: u32) {
        let len = id as usize + 1;
        if self.objects.len() < len {
            self.objects.resize(len, None);
            self.names.resize(len, String::new());
            self.tails.resize(len, Vec::new());
        }
    }

    /// Append a new slot and return its id.
    pub fn push(&mut self, name: impl Into<String>, object: AudioObject) -> u32 {
        let id = self.objects.len() as u32;
        self.allocate_slot(id);
        self.names[id as usize] = name.into();
        self.objects[id as usize] = Some(object);
        id
    }

    /// Put `object` into an existing (or newly allocated) slot. The slot's
    /// trailing bytes are kept.
    pub fn replace(&mut self, id: u32, object: AudioObject) {
        self.allocate_slot(id);
        self.objects[id as usize] = Some(object);
    }

    /// Bytes stored after the known fields of slot `id`'s record.
    pub fn tail(&self, id: u32) -> &[u8] {
        self.tails.get(id as usize).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_tail(&mut self, id: u32, tail: Vec<u8>) {
        self.allocate_slot(id);
        self.tails[id as usize] = tail;
    }

    pub fn get(&self, id: u32) -> Option<&AudioObject> {
        if id == 0 {
            return None;
        }
        self.objects.get(id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut AudioObject> {
        if id == 0 {
            return None;
        }
        self.objects.get_mut(id as usize)?.as_mut()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn set_name(&mut self, id: u32, name: impl Into<String>) {
        self.allocate_slot(id);
        self.names[id as usize] = name.into();
    }

    /// First non-reserved slot carrying `name`, occupied or not.
    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, n)| n.as_str() == name)
            .map(|(i, _)| i as u32)
    }

    /// Position of a Wave slot among all Wave slots; this is its index in the
    /// wave pack.
    pub fn wave_index(&self, id: u32) -> Option<usize> {
        if !self.get(id)?.is_wave() {
            return None;
        }
        Some(
            self.objects[..id as usize]
                .iter()
                .filter(|o| o.as_ref().is_some_and(AudioObject::is_wave))
                .count(),
        )
    }

    pub fn wave_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|o| o.as_ref().is_some_and(AudioObject::is_wave))
            .count()
    }

    /// Occupied slots as `(id, name, record)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str, &AudioObject)> {
        self.objects
            .iter()
            .zip(&self.names)
            .enumerate()
            .skip(1)
            .filter_map(|(i, (o, n))| o.as_ref().map(|o| (i as u32, n.as_str(), o)))
    }

    /// Parse the `AUDI` chunk: one multi-data record per slot.
    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        chunk.expect_tag(&Self::TAG)?;
        let mut reg = Self {
            names: Vec::with_capacity(chunk.multi_data.len()),
            objects: Vec::with_capacity(chunk.multi_data.len()),
            tails: Vec::with_capacity(chunk.multi_data.len()),
        };
        for record in &chunk.multi_data {
            let mut c = Cursor::new(record);
            let kind = c.read_u32()?;
            let name = c.read_cstring()?;
            let object = match kind {
                0 => None,
                kind => Some(AudioObject::read(&mut c, kind)?),
            };
            let tail = c.read_rest().to_vec();
            if !tail.is_empty() {
                debug!("audio slot {name:?} has {} trailing bytes", tail.len());
            }
            reg.names.push(name);
            reg.objects.push(object);
            reg.tails.push(tail);
        }
        if reg.objects.is_empty() {
            return Ok(Self::default());
        }
        Ok(reg)
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut chunk = Chunk::new(Self::TAG);
        for ((object, name), tail) in self.objects.iter().zip(&self.names).zip(&self.tails) {
            let mut w = Writer::new();
            w.write_u32(object.as_ref().map_or(0, AudioObject::kind));
            w.write_cstring(name);
            if let Some(object) = object {
                object.write(&mut w);
            }
            w.write_bytes(tail);
            chunk.multi_data.push(w.into_bytes());
        }
        chunk
    }
}
