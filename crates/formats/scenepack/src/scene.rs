//! A whole scene: the object pack plus its texture, audio and animation
//! packs, loaded from and saved to one ZIP archive.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor as IoCursor, Read, Write};
use std::path::Path;
use std::rc::Rc;

use glam::Mat4;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::audio::{AudioObject, AudioRegistry, Wave};
use crate::chunk::Chunk;
use crate::cursor::{Cursor, Writer};
use crate::dbl::{member_layout, remove_routine, ClassSchema, DblList, DblValue};
use crate::error::{Error, Result};
use crate::mesh::{Light, Line, Mesh};
use crate::object::{GameObject, ObjId, ObjectGraph, ZDefines};
use crate::pathfinder::{PfInfo, PATHFINDER_CLASS};
use crate::texture::{build_texture_pair, split, texture_name, unsplit, PixelType};

pub const SPK_STREAM: &str = "Pack.SPK";
pub const PAL_STREAM: &str = "Pack.PAL";
pub const DXT_STREAM: &str = "Pack.DXT";
pub const LGT_STREAM: &str = "Pack.LGT";
pub const WAV_STREAM: &str = "Pack.WAV";
pub const EXC_STREAM: &str = "Pack.EXC";

const PACK_TAG: [u8; 4] = *b"PACK";
const OBJS_TAG: [u8; 4] = *b"OBJS";
const MSHS_TAG: [u8; 4] = *b"MSHS";
const MSGD_TAG: [u8; 4] = *b"MSGD";
const ZDEF_TAG: [u8; 4] = *b"ZDEF";
const GOBJ_TAG: [u8; 4] = *b"GOBJ";
const PDBL_TAG: [u8; 4] = *b"PDBL";
/// Wave payloads in the wave pack.
pub const WAVE_TAG: [u8; 4] = *b"WPCM";

/// Edit queued while the scene is being walked, applied afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DeleteObject(ObjId),
    RemoveRoutine { object: ObjId, index: usize },
}

/// Notification for whoever caches GPU-side copies of scene data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// Pixels of the texture with this id changed.
    Texture(u32),
    /// The mesh of this object changed.
    Mesh(ObjId),
    AllTextures,
}

pub struct SceneStore {
    pub graph: ObjectGraph,
    pub audio: AudioRegistry,
    /// Message definitions: id → (name, description).
    pub messages: BTreeMap<u32, (String, String)>,
    pub pal_pack: Chunk,
    /// Parallel to `pal_pack`.
    pub dxt_pack: Chunk,
    pub lgt_pack: Chunk,
    /// Parallel to the Wave slots of `audio`.
    pub wav_pack: Chunk,
    pub exc_pack: Chunk,
    /// Subchunks of `Pack.SPK` that are not interpreted.
    pub extra_pack: Vec<Chunk>,
    /// ZIP entries that are not interpreted, in archive order.
    pub extra_streams: Vec<(String, Vec<u8>)>,
    /// Highest texture id handed out so far.
    pub num_textures: u32,
    deferred: Vec<Command>,
    invalidations: Vec<Invalidation>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl SceneStore {
    /// A scene with no objects and empty packs.
    pub fn empty() -> Self {
        Self {
            graph: ObjectGraph::new(),
            audio: AudioRegistry::default(),
            messages: BTreeMap::new(),
            pal_pack: Chunk::new(PACK_TAG),
            dxt_pack: Chunk::new(PACK_TAG),
            lgt_pack: Chunk::new(PACK_TAG),
            wav_pack: Chunk::new(PACK_TAG),
            exc_pack: Chunk::new(PACK_TAG),
            extra_pack: Vec::new(),
            extra_streams: Vec::new(),
            num_textures: 0,
            deferred: Vec::new(),
            invalidations: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_zip_bytes(&data).map_err(|e| e.in_file(path.display().to_string()))
    }

    pub fn from_zip_bytes(data: &[u8]) -> Result<Self> {
        let streams = read_streams(data)?;
        let mut scene = Self::empty();
        let mut spk = None;
        for (name, bytes) in streams {
            let slot = match name.as_str() {
                SPK_STREAM => {
                    spk = Some(bytes);
                    continue;
                }
                PAL_STREAM => &mut scene.pal_pack,
                DXT_STREAM => &mut scene.dxt_pack,
                LGT_STREAM => &mut scene.lgt_pack,
                WAV_STREAM => &mut scene.wav_pack,
                EXC_STREAM => &mut scene.exc_pack,
                _ => {
                    debug!("keeping unknown archive entry {name}");
                    scene.extra_streams.push((name, bytes));
                    continue;
                }
            };
            *slot = Chunk::parse(&bytes).map_err(|e| e.in_file(name.as_str()))?;
        }
        let spk = spk.ok_or_else(|| Error::MissingStream {
            name: SPK_STREAM.into(),
        })?;
        scene.read_object_pack(&spk).map_err(|e| e.in_file(SPK_STREAM))?;

        scene.num_textures = scene
            .pal_pack
            .subchunks
            .iter()
            .chain(&scene.lgt_pack.subchunks)
            .filter_map(Chunk::leading_u32)
            .max()
            .unwrap_or(0);
        if scene.pal_pack.subchunks.len() != scene.dxt_pack.subchunks.len() {
            warn!(
                "{} palette textures but {} DXT textures",
                scene.pal_pack.subchunks.len(),
                scene.dxt_pack.subchunks.len()
            );
        }
        if scene.audio.wave_count() != scene.wav_pack.subchunks.len() {
            warn!(
                "{} wave slots but {} wave payloads",
                scene.audio.wave_count(),
                scene.wav_pack.subchunks.len()
            );
        }
        debug!(
            "loaded scene: {} objects, {} textures, {} audio slots",
            scene.graph.len(),
            scene.pal_pack.subchunks.len(),
            scene.audio.slot_count()
        );
        Ok(scene)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_zip_bytes()?)?;
        debug!("saved scene to {}", path.display());
        Ok(())
    }

    pub fn to_zip_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(IoCursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        // Animation chunks copied in from other scenes join the pack here.
        let mut exc_pack = self.exc_pack.clone();
        let spk = self.write_object_pack(&mut exc_pack);
        let streams = [
            (SPK_STREAM, spk),
            (PAL_STREAM, self.pal_pack.to_bytes()),
            (DXT_STREAM, self.dxt_pack.to_bytes()),
            (LGT_STREAM, self.lgt_pack.to_bytes()),
            (WAV_STREAM, self.wav_pack.to_bytes()),
            (EXC_STREAM, exc_pack.to_bytes()),
        ];
        for (name, bytes) in &streams {
            zip.start_file(*name, options)?;
            zip.write_all(bytes)?;
        }
        for (name, bytes) in &self.extra_streams {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn read_object_pack(&mut self, data: &[u8]) -> Result<()> {
        let pack = Chunk::parse(data)?;
        pack.expect_tag(&PACK_TAG)?;

        let mut meshes = Vec::new();
        let mut objs = None;
        for sub in pack.subchunks {
            let tag = sub.tag;
            match &tag {
                b"OBJS" => objs = Some(sub),
                b"MSHS" => {
                    meshes = sub
                        .subchunks
                        .iter()
                        .map(|c| Mesh::from_chunk(c).map(Rc::new))
                        .collect::<Result<Vec<_>>>()?;
                }
                b"MSGD" => self.messages = read_messages(&sub)?,
                b"ZDEF" => self.graph.zdefines = Some(read_zdefines(&sub)?),
                b"AUDI" => self.audio = AudioRegistry::from_chunk(&sub)?,
                _ => self.extra_pack.push(sub),
            }
        }

        // Objects are created in save order, so `order[handle - 1]` is the
        // object a handle names.
        let mut order = Vec::new();
        if let Some(objs) = objs {
            let top = self.graph.super_root();
            for chunk in &objs.subchunks {
                self.read_object(chunk, top, &meshes, &mut order)?;
            }
        }
        for id in &order {
            if let Some(object) = self.graph.get_mut(*id) {
                object.dbl.resolve_refs(&|handle| {
                    (handle as usize).checked_sub(1).and_then(|i| order.get(i)).copied()
                })?;
            }
        }
        if let Some(z) = &mut self.graph.zdefines {
            z.values.resolve_refs(&|handle| {
                (handle as usize).checked_sub(1).and_then(|i| order.get(i)).copied()
            })?;
        }
        Ok(())
    }

    fn read_object(
        &mut self,
        chunk: &Chunk,
        parent: ObjId,
        meshes: &[Rc<Mesh>],
        order: &mut Vec<ObjId>,
    ) -> Result<()> {
        chunk.expect_tag(&GOBJ_TAG)?;
        let mut c = Cursor::new(&chunk.main_data);
        let type_id = c.read_u32()?;
        let flags = c.read_u32()?;
        let color = c.read_u32()?;
        let mut cols = [0f32; 16];
        for v in &mut cols {
            *v = c.read_f32()?;
        }
        let mesh_index = c.read_i32()?;
        let exc_index = c.read_i32()?;
        let name = c.read_cstring()?;

        let mut object = GameObject::new(type_id, name);
        object.flags = flags;
        object.color = color;
        object.matrix = Mat4::from_cols_array(&cols);
        object.mesh = match usize::try_from(mesh_index) {
            Ok(i) => Some(meshes.get(i).cloned().ok_or_else(|| Error::Parse {
                context: "GOBJ",
                message: format!("mesh index {i} out of range ({} meshes)", meshes.len()),
            })?),
            Err(_) => None,
        };
        object.exc = match usize::try_from(exc_index) {
            Ok(i) => Some(self.exc_pack.subchunks.get(i).cloned().ok_or_else(|| {
                Error::Parse {
                    context: "GOBJ",
                    message: format!("EXC index {i} out of range"),
                }
            })?),
            Err(_) => None,
        };

        let mut children = Vec::new();
        for sub in &chunk.subchunks {
            match &sub.tag {
                b"PDBL" => object.dbl = DblList::parse(&sub.main_data)?,
                b"LINE" => object.line = Some(Line::from_chunk(sub)?),
                b"LGHT" => object.light = Some(Light::from_chunk(sub)?),
                b"GOBJ" => children.push(sub),
                _ => object.extra.push(sub.clone()),
            }
        }

        let id = self.graph.add_child(parent, object)?;
        order.push(id);
        for child in children {
            self.read_object(child, id, meshes, order)?;
        }
        Ok(())
    }

    fn write_object_pack(&self, exc_pack: &mut Chunk) -> Vec<u8> {
        let order = self.graph.preorder();
        let handles: HashMap<ObjId, u32> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i as u32 + 1))
            .collect();
        let handle_of = |id: ObjId| handles.get(&id).copied().unwrap_or(0);

        // Shared meshes are written once.
        let mut mesh_index: HashMap<*const Mesh, i32> = HashMap::new();
        let mut meshes = Chunk::new(MSHS_TAG);
        for id in &order {
            if let Some(mesh) = self.graph.get(*id).and_then(|o| o.mesh.as_ref()) {
                mesh_index.entry(Rc::as_ptr(mesh)).or_insert_with(|| {
                    meshes.subchunks.push(mesh.to_chunk());
                    meshes.subchunks.len() as i32 - 1
                });
            }
        }

        let mut objs = Chunk::new(OBJS_TAG);
        for top in self.graph.children(self.graph.super_root()) {
            objs.subchunks
                .push(self.write_object(*top, &handle_of, &mesh_index, exc_pack));
        }

        let mut pack = Chunk::new(PACK_TAG);
        pack.subchunks.push(objs);
        pack.subchunks.push(meshes);
        pack.subchunks.push(write_messages(&self.messages));
        if let Some(z) = &self.graph.zdefines {
            let mut w = Writer::new();
            w.write_cstring(&z.types);
            let mut zdef = Chunk::with_main(ZDEF_TAG, w.into_bytes());
            zdef.subchunks
                .push(Chunk::with_main(PDBL_TAG, z.values.to_bytes(&handle_of)));
            pack.subchunks.push(zdef);
        }
        pack.subchunks.push(self.audio.to_chunk());
        pack.subchunks.extend(self.extra_pack.iter().cloned());
        pack.to_bytes()
    }

    fn write_object(
        &self,
        id: ObjId,
        handle_of: &dyn Fn(ObjId) -> u32,
        mesh_index: &HashMap<*const Mesh, i32>,
        exc_pack: &mut Chunk,
    ) -> Chunk {
        let Some(object) = self.graph.get(id) else {
            return Chunk::new(GOBJ_TAG);
        };
        let exc_index = object.exc.as_ref().map_or(-1, |exc| {
            let i = match exc_pack.subchunks.iter().position(|c| c == exc) {
                Some(i) => i,
                None => {
                    exc_pack.subchunks.push(exc.clone());
                    exc_pack.subchunks.len() - 1
                }
            };
            i as i32
        });
        let mut w = Writer::new();
        w.write_u32(object.type_id);
        w.write_u32(object.flags);
        w.write_u32(object.color);
        for v in object.matrix.to_cols_array() {
            w.write_f32(v);
        }
        w.write_i32(
            object
                .mesh
                .as_ref()
                .and_then(|m| mesh_index.get(&Rc::as_ptr(m)))
                .copied()
                .unwrap_or(-1),
        );
        w.write_i32(exc_index);
        w.write_cstring(&object.name);

        let mut chunk = Chunk::with_main(GOBJ_TAG, w.into_bytes());
        chunk
            .subchunks
            .push(Chunk::with_main(PDBL_TAG, object.dbl.to_bytes(handle_of)));
        if let Some(line) = &object.line {
            chunk.subchunks.push(line.to_chunk());
        }
        if let Some(light) = &object.light {
            chunk.subchunks.push(light.to_chunk());
        }
        chunk.subchunks.extend(object.extra.iter().cloned());
        for child in &object.children {
            chunk
                .subchunks
                .push(self.write_object(*child, handle_of, mesh_index, exc_pack));
        }
        chunk
    }

    pub fn defer(&mut self, command: Command) {
        self.deferred.push(command);
    }

    /// Run every queued command in order. All commands are attempted; the
    /// first failure is returned.
    pub fn apply_deferred(&mut self, schema: &ClassSchema) -> Result<()> {
        let mut first_error = None;
        for command in std::mem::take(&mut self.deferred) {
            let result = match &command {
                Command::DeleteObject(id) => self.graph.delete(*id),
                Command::RemoveRoutine { object, index } => {
                    self.remove_routine(schema, *object, *index)
                }
            };
            if let Err(err) = result {
                warn!("{command:?} failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn remove_routine(&mut self, schema: &ClassSchema, id: ObjId, index: usize) -> Result<()> {
        let object = self.graph.get_mut(id).ok_or(Error::NoSuchObject)?;
        let layout = member_layout(schema, object.type_id, &object.dbl);
        remove_routine(&mut object.dbl, &layout, index)
    }

    pub fn invalidate(&mut self, what: Invalidation) {
        if !self.invalidations.contains(&what) {
            self.invalidations.push(what);
        }
    }

    pub fn drain_invalidations(&mut self) -> Vec<Invalidation> {
        std::mem::take(&mut self.invalidations)
    }

    /// Edit an object's mesh, copying it first if other objects share it.
    pub fn edit_mesh(&mut self, id: ObjId, edit: impl FnOnce(&mut Mesh)) -> Result<()> {
        let mesh = self.graph.mesh_mut(id).ok_or(Error::NoSuchObject)?;
        edit(mesh);
        self.invalidate(Invalidation::Mesh(id));
        Ok(())
    }

    /// Texture chunk with `id`: a palette texture with its DXT twin, or a
    /// light texture.
    pub fn find_texture(&self, id: u32) -> Option<(&Chunk, Option<&Chunk>)> {
        if let Some(i) = position_of(&self.pal_pack, id) {
            return Some((&self.pal_pack.subchunks[i], self.dxt_pack.subchunks.get(i)));
        }
        let i = position_of(&self.lgt_pack, id)?;
        Some((&self.lgt_pack.subchunks[i], None))
    }

    /// First palette texture whose header carries `name`.
    pub fn find_texture_by_name(&self, name: &str) -> Option<&Chunk> {
        self.pal_pack
            .subchunks
            .iter()
            .find(|c| texture_name(c).is_ok_and(|n| n == name))
    }

    /// Import `image` as a new palette-pack texture. Returns its id.
    pub fn add_texture(&mut self, image: &RgbaImage, name: &str) -> u32 {
        self.num_textures += 1;
        let id = self.num_textures;
        let (rgba, dxt) = build_texture_pair(image, name, id);
        self.pal_pack.subchunks.push(rgba);
        self.dxt_pack.subchunks.push(dxt);
        self.invalidate(Invalidation::Texture(id));
        id
    }

    /// Replace the pixels of palette texture `id`, keeping its id and name.
    pub fn replace_texture(&mut self, id: u32, image: &RgbaImage) -> Result<()> {
        let i = position_of(&self.pal_pack, id).ok_or(Error::NoSuchTexture(id))?;
        let name = texture_name(&self.pal_pack.subchunks[i])?;
        let (rgba, dxt) = build_texture_pair(image, &name, id);
        self.pal_pack.subchunks[i] = rgba;
        match self.dxt_pack.subchunks.get_mut(i) {
            Some(slot) => *slot = dxt,
            None => self.dxt_pack.subchunks.push(dxt),
        }
        self.invalidate(Invalidation::Texture(id));
        Ok(())
    }

    /// Add a Wave slot named `name` with its payload. Returns the slot id.
    pub fn add_wave(&mut self, name: impl Into<String>, data: Vec<u8>) -> u32 {
        let id = self.audio.push(name, AudioObject::Wave(Wave::default()));
        let at = self
            .audio
            .wave_index(id)
            .unwrap_or(self.wav_pack.subchunks.len())
            .min(self.wav_pack.subchunks.len());
        self.wav_pack
            .subchunks
            .insert(at, Chunk::with_main(WAVE_TAG, data));
        id
    }

    /// Payload of Wave slot `id`.
    pub fn wave_data(&self, id: u32) -> Option<&[u8]> {
        let i = self.audio.wave_index(id)?;
        Some(&self.wav_pack.subchunks.get(i)?.main_data)
    }

    pub fn pathfinder_objects(&self) -> Vec<ObjId> {
        self.graph
            .preorder()
            .into_iter()
            .filter(|id| self.graph.get(*id).is_some_and(|o| o.type_id == PATHFINDER_CLASS))
            .collect()
    }

    pub fn pathfinder(&self, id: ObjId) -> Result<PfInfo> {
        let object = self.graph.get(id).ok_or(Error::NoSuchObject)?;
        PfInfo::from_dbl(&object.dbl)
    }

    pub fn set_pathfinder(&mut self, id: ObjId, info: &PfInfo) -> Result<()> {
        let object = self.graph.get_mut(id).ok_or(Error::NoSuchObject)?;
        info.store_in(&mut object.dbl)
    }

    /// Decode the image member whose DATA entry is `entry` on object `id`.
    ///
    /// Its siblings follow at fixed offsets: name, width, height, two split
    /// sizes, opacity, and at +12 the pixel format.
    pub fn export_dbl_image(&self, id: ObjId, entry: usize) -> Result<RgbaImage> {
        let dbl = &self.graph.get(id).ok_or(Error::NoSuchObject)?.dbl;
        let data = dbl
            .entries
            .get(entry)
            .and_then(|e| e.value.as_data())
            .ok_or_else(|| image_error(format!("entry {entry} is not a DATA entry")))?;
        let width = image_field(dbl, entry, IMAGE_WIDTH)?;
        let height = image_field(dbl, entry, IMAGE_HEIGHT)?;
        let opacity = image_field(dbl, entry, IMAGE_OPACITY)?;
        let format = image_field(dbl, entry, IMAGE_FORMAT)?;
        unsplit(data, width, height, PixelType::from_code(format), opacity == 0)
    }

    /// Replace the image member at `entry` with `image`, stored as 32-bit
    /// tiles. Opacity is left as is.
    pub fn import_dbl_image(&mut self, id: ObjId, entry: usize, image: &RgbaImage) -> Result<()> {
        let dbl = &mut self.graph.get_mut(id).ok_or(Error::NoSuchObject)?.dbl;
        if !matches!(dbl.entries.get(entry).map(|e| &e.value), Some(DblValue::Data(_))) {
            return Err(image_error(format!("entry {entry} is not a DATA entry")));
        }
        let fields = [
            (IMAGE_WIDTH, image.width()),
            (IMAGE_HEIGHT, image.height()),
            (IMAGE_SPLIT_X, 0),
            (IMAGE_SPLIT_Y, 0),
            (IMAGE_FORMAT, PixelType::Rgba32.code()),
            (IMAGE_SIZE, 0),
        ];
        for (offset, _) in fields {
            image_field(dbl, entry, offset)?;
        }
        for (offset, value) in fields {
            dbl.entries[entry + offset].value = DblValue::Int(value);
        }
        dbl.entries[entry].value = DblValue::Data(split(image));
        Ok(())
    }

    /// Name stored beside the image member at `entry`, if any.
    pub fn dbl_image_name(&self, id: ObjId, entry: usize) -> Option<&str> {
        self.graph.get(id)?.dbl.entries.get(entry.checked_add(IMAGE_NAME)?)?.value.as_str()
    }
}

const IMAGE_NAME: usize = 1;
const IMAGE_WIDTH: usize = 2;
const IMAGE_HEIGHT: usize = 3;
const IMAGE_SPLIT_X: usize = 4;
const IMAGE_SPLIT_Y: usize = 5;
const IMAGE_OPACITY: usize = 6;
const IMAGE_FORMAT: usize = 12;
const IMAGE_SIZE: usize = 13;

fn image_error(message: String) -> Error {
    Error::Parse { context: "image", message }
}

fn image_field(dbl: &DblList, entry: usize, offset: usize) -> Result<u32> {
    let index = entry.saturating_add(offset);
    match dbl.entries.get(index).map(|e| &e.value) {
        Some(DblValue::Int(v)) => Ok(*v),
        _ => Err(image_error(format!("entry {index} is not an INT entry"))),
    }
}

/// Every file entry of a scene archive as `(name, bytes)`, in archive order.
pub fn read_streams(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(IoCursor::new(data))?;
    let mut streams = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        streams.push((file.name().to_string(), bytes));
    }
    Ok(streams)
}

fn position_of(pack: &Chunk, id: u32) -> Option<usize> {
    pack.subchunks
        .iter()
        .position(|c| c.leading_u32() == Some(id))
}

fn read_messages(chunk: &Chunk) -> Result<BTreeMap<u32, (String, String)>> {
    let mut messages = BTreeMap::new();
    for record in &chunk.multi_data {
        let mut c = Cursor::new(record);
        let id = c.read_u32()?;
        let name = c.read_cstring()?;
        let desc = c.read_cstring()?;
        messages.insert(id, (name, desc));
    }
    Ok(messages)
}

fn write_messages(messages: &BTreeMap<u32, (String, String)>) -> Chunk {
    let mut chunk = Chunk::new(MSGD_TAG);
    for (id, (name, desc)) in messages {
        let mut w = Writer::new();
        w.write_u32(*id);
        w.write_cstring(name);
        w.write_cstring(desc);
        chunk.multi_data.push(w.into_bytes());
    }
    chunk
}

fn read_zdefines(chunk: &Chunk) -> Result<ZDefines> {
    let types = Cursor::new(&chunk.main_data).read_cstring()?;
    let values = match chunk.find_subchunk(&PDBL_TAG) {
        Some(pdbl) => DblList::parse(&pdbl.main_data)?,
        None => DblList::default(),
    };
    Ok(ZDefines { types, values })
}
