//! Copying a subtree from one scene into another.
//!
//! Object references must stay inside the copied subtree. Sounds and
//! messages are matched by name in the destination and created there if
//! missing. Meshes are deep-copied, and the textures they use are copied
//! once per call under fresh ids.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::audio::{AudioFieldVisitor, AudioRef};
use crate::dbl::DblValue;
use crate::error::{Error, Result};
use crate::mesh::{Mesh, FTX_LIGHTMAP, FTX_NO_TEXTURE, FTX_TEXTURE};
use crate::object::ObjId;
use crate::scene::{Invalidation, SceneStore};

/// Face flag and the face word holding the id it governs.
const TEXTURE_SLOTS: [(u16, usize); 2] = [(FTX_TEXTURE, 2), (FTX_LIGHTMAP, 3)];

/// Copy the subtree at `root` of `src` under the root object of `dest`.
/// Returns the id of the copy.
///
/// Fails without touching `dest` if anything in the subtree references an
/// object outside of it, or names a sound or message `src` does not define.
pub fn copy_to_scene(src: &SceneStore, dest: &mut SceneStore, root: ObjId) -> Result<ObjId> {
    if !src.graph.contains(root) {
        return Err(Error::NoSuchObject);
    }
    validate(src, root)?;

    let parent = dest.graph.root().unwrap_or(dest.graph.super_root());
    let order = src.graph.subtree(root);
    let map = dest
        .graph
        .insert_copies(src.graph.copy_subtree(root), parent, None)?;

    if !src.lgt_pack.subchunks.is_empty() && dest.lgt_pack.subchunks.is_empty() {
        let seed = src.lgt_pack.subchunks[0].clone();
        if let Some(id) = seed.leading_u32() {
            dest.num_textures = dest.num_textures.max(id);
        }
        dest.lgt_pack.subchunks.push(seed);
        dest.invalidate(Invalidation::AllTextures);
    }

    let mut copier = Copier {
        src,
        textures: HashMap::new(),
        meshes: HashMap::new(),
    };
    for old in &order {
        let Some(new) = map.get(old).copied() else {
            continue;
        };
        copier.fix_object(dest, new)?;
    }
    debug!(
        "copied {} object(s) from {} into the destination scene, {} texture(s)",
        order.len(),
        src.graph.path(root),
        copier.textures.len()
    );
    map.get(&root).copied().ok_or(Error::NoSuchObject)
}

fn validate(src: &SceneStore, root: ObjId) -> Result<()> {
    let subtree = src.graph.subtree(root);
    let inside: HashSet<ObjId> = subtree.iter().copied().collect();
    for id in &subtree {
        let Some(object) = src.graph.get(*id) else {
            continue;
        };
        if let Some(target) = object
            .dbl
            .object_refs()
            .into_iter()
            .find(|r| !inside.contains(r))
        {
            return Err(Error::ReferenceOutOfScope {
                from: src.graph.path(*id),
                to: src.graph.path(target),
            });
        }
        let mut problem = None;
        object.dbl.visit_values(&mut |v| match v {
            DblValue::Message(m) if *m != 0 && !src.messages.contains_key(m) => {
                problem.get_or_insert(format!("message {m} is not defined"));
            }
            DblValue::Sound(r) if !sound_defined(src, r.id) => {
                problem.get_or_insert(format!("sound {} is not defined", r.id));
            }
            _ => {}
        });
        if let Some(message) = problem {
            return Err(Error::Parse {
                context: "copy",
                message: format!("{}: {message}", src.graph.path(*id)),
            });
        }
    }
    Ok(())
}

/// Whether `id` and every sound it reaches has a slot in `src`.
fn sound_defined(src: &SceneStore, id: u32) -> bool {
    let mut seen = HashSet::new();
    let mut pending = vec![id];
    while let Some(id) = pending.pop() {
        if id == 0 || !seen.insert(id) {
            continue;
        }
        if src.audio.name(id).is_none() {
            return false;
        }
        if let Some(object) = src.audio.get(id) {
            let mut refs = RefCollector::default();
            // Visiting a clone only reads.
            if object.clone().visit(&mut refs).is_err() {
                return false;
            }
            pending.extend(refs.ids);
        }
    }
    true
}

#[derive(Default)]
struct RefCollector {
    ids: Vec<u32>,
}

impl AudioFieldVisitor for RefCollector {
    fn visit_u32(&mut self, _: &'static str, _: &mut u32) -> Result<()> {
        Ok(())
    }

    fn visit_f32(&mut self, _: &'static str, _: &mut f32) -> Result<()> {
        Ok(())
    }

    fn visit_string(&mut self, _: &'static str, _: &mut String) -> Result<()> {
        Ok(())
    }

    fn visit_ref(&mut self, _: &'static str, value: &mut AudioRef) -> Result<()> {
        self.ids.push(value.id);
        Ok(())
    }
}

struct Copier<'a> {
    src: &'a SceneStore,
    /// Source texture id → destination texture id.
    textures: HashMap<u16, u16>,
    /// Source mesh → its copy.
    meshes: HashMap<*const Mesh, Rc<Mesh>>,
}

impl Copier<'_> {
    fn fix_object(&mut self, dest: &mut SceneStore, id: ObjId) -> Result<()> {
        let Some(object) = dest.graph.get_mut(id) else {
            return Ok(());
        };
        let mut dbl = std::mem::take(&mut object.dbl);
        let mesh = object.mesh.take();

        let src = self.src;
        let result = dbl.try_visit_values_mut(&mut |v| {
            match v {
                DblValue::Sound(r) => r.id = copy_sound(src, dest, r.id)?,
                DblValue::Message(m) => *m = copy_message(src, dest, *m),
                _ => {}
            }
            Ok::<(), Error>(())
        });
        let mesh = mesh.map(|m| self.copy_mesh(dest, &m));

        if let Some(object) = dest.graph.get_mut(id) {
            object.dbl = dbl;
            object.mesh = mesh;
        }
        result
    }

    fn copy_mesh(&mut self, dest: &mut SceneStore, mesh: &Rc<Mesh>) -> Rc<Mesh> {
        if let Some(copy) = self.meshes.get(&Rc::as_ptr(mesh)) {
            return copy.clone();
        }
        let mut copy = Mesh::clone(mesh);
        for face in &mut copy.ftx_faces {
            for (flag, word) in TEXTURE_SLOTS {
                if face[0] & flag == 0 || face[word] & FTX_NO_TEXTURE != 0 {
                    continue;
                }
                if let Some(new) = self.copy_texture(dest, face[word]) {
                    face[word] = new;
                }
            }
        }
        let copy = Rc::new(copy);
        self.meshes.insert(Rc::as_ptr(mesh), copy.clone());
        copy
    }

    fn copy_texture(&mut self, dest: &mut SceneStore, id: u16) -> Option<u16> {
        if let Some(new) = self.textures.get(&id) {
            return Some(*new);
        }
        let Some((pal, dxt)) = self.src.find_texture(id as u32) else {
            warn!("texture {id} is missing from the source scene, face left as is");
            return None;
        };
        dest.num_textures += 1;
        let new = dest.num_textures;
        let mut pal = pal.clone();
        pal.set_leading_u32(new);
        match dxt {
            Some(dxt) => {
                let mut dxt = dxt.clone();
                dxt.set_leading_u32(new);
                dest.pal_pack.subchunks.push(pal);
                dest.dxt_pack.subchunks.push(dxt);
            }
            None => dest.lgt_pack.subchunks.push(pal),
        }
        dest.invalidate(Invalidation::Texture(new));
        self.textures.insert(id, new as u16);
        Some(new as u16)
    }
}

/// Destination id of source sound `id`, creating it (and every sound it
/// references) when the destination has no occupied slot of that name.
fn copy_sound(src: &SceneStore, dest: &mut SceneStore, id: u32) -> Result<u32> {
    if id == 0 {
        return Ok(0);
    }
    let name = src.audio.name(id).ok_or_else(|| Error::Parse {
        context: "copy",
        message: format!("sound {id} is not defined"),
    })?;
    let existing = dest.audio.find_by_name(name);
    if let Some(found) = existing {
        if dest.audio.get(found).is_some() {
            return Ok(found);
        }
    }
    let dest_id = existing.unwrap_or_else(|| {
        let new = dest.audio.slot_count() as u32;
        dest.audio.set_name(new, name);
        new
    });
    let Some(object) = src.audio.get(id) else {
        return Ok(dest_id);
    };

    // Occupy the slot before following references so that cycles end here.
    let mut copy = object.clone();
    dest.audio.replace(dest_id, copy.clone());
    dest.audio.set_tail(dest_id, src.audio.tail(id).to_vec());
    if object.is_wave() {
        let payload = src
            .audio
            .wave_index(id)
            .and_then(|i| src.wav_pack.subchunks.get(i));
        match (payload, dest.audio.wave_index(dest_id)) {
            (Some(payload), Some(at)) => {
                let at = at.min(dest.wav_pack.subchunks.len());
                dest.wav_pack.subchunks.insert(at, payload.clone());
            }
            _ => warn!("wave {name} has no payload in the source scene"),
        }
    }
    copy.visit(&mut SoundCopier { src, dest })?;
    dest.audio.replace(dest_id, copy);
    Ok(dest_id)
}

struct SoundCopier<'a> {
    src: &'a SceneStore,
    dest: &'a mut SceneStore,
}

impl AudioFieldVisitor for SoundCopier<'_> {
    fn visit_u32(&mut self, _: &'static str, _: &mut u32) -> Result<()> {
        Ok(())
    }

    fn visit_f32(&mut self, _: &'static str, _: &mut f32) -> Result<()> {
        Ok(())
    }

    fn visit_string(&mut self, _: &'static str, _: &mut String) -> Result<()> {
        Ok(())
    }

    fn visit_ref(&mut self, _: &'static str, value: &mut AudioRef) -> Result<()> {
        value.id = copy_sound(self.src, self.dest, value.id)?;
        Ok(())
    }
}

/// Destination id of source message `id`: the definition with the same
/// name, or a new one after the highest id.
fn copy_message(src: &SceneStore, dest: &mut SceneStore, id: u32) -> u32 {
    let Some((name, desc)) = src.messages.get(&id) else {
        return id;
    };
    if let Some(found) = dest
        .messages
        .iter()
        .find(|(_, (n, _))| n == name)
        .map(|(id, _)| *id)
    {
        return found;
    }
    let new = dest.messages.keys().next_back().map_or(1, |max| max + 1);
    dest.messages.insert(new, (name.clone(), desc.clone()));
    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioObject, Set, Sound};
    use crate::dbl::DblEntry;
    use crate::object::GameObject;

    fn with_root() -> SceneStore {
        let mut scene = SceneStore::empty();
        let top = scene.graph.super_root();
        scene.graph.add_child(top, GameObject::new(1, "Root")).unwrap();
        scene
    }

    fn object_with(src: &mut SceneStore, name: &str, values: Vec<DblValue>) -> ObjId {
        let root = src.graph.root().unwrap();
        let mut object = GameObject::new(2, name);
        object.dbl.entries = values.into_iter().map(DblEntry::new).collect();
        src.graph.add_child(root, object).unwrap()
    }

    #[test]
    fn messages_match_by_name_or_get_the_next_id() {
        let mut src = with_root();
        src.messages.insert(3, ("Open".into(), "".into()));
        src.messages.insert(4, ("Close".into(), "shuts".into()));
        let id = object_with(
            &mut src,
            "door",
            vec![DblValue::Message(3), DblValue::Message(4), DblValue::Message(0)],
        );
        let mut dest = with_root();
        dest.messages.insert(9, ("Open".into(), "".into()));

        let copy = copy_to_scene(&src, &mut dest, id).unwrap();
        let values: Vec<_> = dest
            .graph
            .get(copy)
            .unwrap()
            .dbl
            .entries
            .iter()
            .map(|e| e.value.clone())
            .collect();
        assert_eq!(
            values,
            vec![DblValue::Message(9), DblValue::Message(10), DblValue::Message(0)]
        );
        assert_eq!(dest.messages[&10], ("Close".to_string(), "shuts".to_string()));
    }

    #[test]
    fn nested_sounds_follow_their_parent() {
        let mut src = with_root();
        let wave = src.add_wave("hit.wav", vec![7; 3]);
        let sound = src.audio.push(
            "Hit",
            AudioObject::Sound(Sound {
                wave: AudioRef { id: wave },
                ..Sound::default()
            }),
        );
        let set = src.audio.push(
            "Hits",
            AudioObject::Set(Set {
                mode: 0,
                sounds: vec![AudioRef { id: sound }, AudioRef { id: sound }],
            }),
        );
        let id = object_with(&mut src, "crate", vec![DblValue::Sound(AudioRef { id: set })]);

        let mut dest = with_root();
        dest.audio.push("Hit", AudioObject::Sound(Sound::default()));
        let copy = copy_to_scene(&src, &mut dest, id).unwrap();

        let DblValue::Sound(r) = &dest.graph.get(copy).unwrap().dbl.entries[0].value else {
            panic!("expected a sound reference");
        };
        let Some(AudioObject::Set(copied)) = dest.audio.get(r.id) else {
            panic!("expected a set");
        };
        // "Hit" already existed, so the set points at it and no wave is copied.
        let hit = dest.audio.find_by_name("Hit").unwrap();
        assert_eq!(copied.sounds, vec![AudioRef { id: hit }; 2]);
        assert!(dest.wav_pack.subchunks.is_empty());
    }

    #[test]
    fn copied_sound_keeps_its_trailing_bytes() {
        let mut src = with_root();
        let sound = src.audio.push("Hum", AudioObject::Sound(Sound::default()));
        src.audio.set_tail(sound, vec![4, 5, 6]);
        let id = object_with(&mut src, "fan", vec![DblValue::Sound(AudioRef { id: sound })]);

        let mut dest = with_root();
        copy_to_scene(&src, &mut dest, id).unwrap();
        let hum = dest.audio.find_by_name("Hum").unwrap();
        assert_eq!(dest.audio.tail(hum), &[4, 5, 6]);
    }

    #[test]
    fn shared_textures_are_copied_once() {
        let mut src = with_root();
        let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        let tex = src.add_texture(&image, "wood") as u16;
        let mesh = Rc::new(Mesh {
            ftx_faces: vec![
                [FTX_TEXTURE, 0, tex, 0, 0, 0],
                [FTX_TEXTURE, 0, tex, 0, 0, 0],
                [FTX_TEXTURE | FTX_LIGHTMAP, 0, FTX_NO_TEXTURE, 55, 0, 0],
            ],
            ..Mesh::default()
        });
        let id = object_with(&mut src, "box", Vec::new());
        src.graph.get_mut(id).unwrap().mesh = Some(mesh);

        let mut dest = with_root();
        dest.num_textures = 20;
        let copy = copy_to_scene(&src, &mut dest, id).unwrap();
        let faces = &dest.graph.get(copy).unwrap().mesh.as_ref().unwrap().ftx_faces;
        assert_eq!(faces[0][2], 21);
        assert_eq!(faces[1][2], 21);
        // No-texture bit and a missing lightmap leave the words alone.
        assert_eq!(faces[2][2], FTX_NO_TEXTURE);
        assert_eq!(faces[2][3], 55);
        assert_eq!(dest.pal_pack.subchunks.len(), 1);
        assert_eq!(dest.dxt_pack.subchunks[0].leading_u32(), Some(21));
        assert!(dest.find_texture(21).is_some());
    }

    #[test]
    fn undefined_message_rejects_the_copy() {
        let mut src = with_root();
        let id = object_with(&mut src, "door", vec![DblValue::Message(5)]);
        let mut dest = with_root();
        assert!(copy_to_scene(&src, &mut dest, id).is_err());
        assert_eq!(dest.graph.len(), 1);
    }
}
