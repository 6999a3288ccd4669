use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Mat4;

use crate::arena::Arena;
use crate::chunk::Chunk;
use crate::dbl::{ClassSchema, DblList};
use crate::error::{Error, Result};
use crate::mesh::{Light, Line, Mesh};

crate::define_entity!(ObjId);

/// Attempts made to find a free sibling name for a duplicate.
const NAME_ATTEMPTS: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct GameObject {
    pub type_id: u32,
    pub name: String,
    pub flags: u32,
    pub color: u32,
    pub matrix: Mat4,
    /// Shared between objects until made unique.
    pub mesh: Option<Rc<Mesh>>,
    pub line: Option<Line>,
    pub light: Option<Light>,
    pub exc: Option<Chunk>,
    pub dbl: DblList,
    pub parent: Option<ObjId>,
    pub children: Vec<ObjId>,
    /// Unrecognized subchunks of the object record.
    pub extra: Vec<Chunk>,
}

impl GameObject {
    /// Drawn and pickable.
    pub const FLAG_ENABLED: u32 = 0x20;
    /// Group node that accepts children in the editor.
    pub const FLAG_GROUP: u32 = 0x10;

    pub fn new(type_id: u32, name: impl Into<String>) -> Self {
        Self {
            type_id,
            name: name.into(),
            flags: 0,
            color: 0xFFFF_FFFF,
            matrix: Mat4::IDENTITY,
            mesh: None,
            line: None,
            light: None,
            exc: None,
            dbl: DblList::default(),
            parent: None,
            children: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.flags & Self::FLAG_GROUP != 0
    }
}

/// Scene-wide definitions list stored beside the object tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZDefines {
    pub types: String,
    pub values: DblList,
}

/// The object tree of one scene.
///
/// Slot 0 is a synthetic super-root; the scene's top-level objects are its
/// children and the first of them is the scene root.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    objects: Arena<ObjId, GameObject>,
    super_root: ObjId,
    pub zdefines: Option<ZDefines>,
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectGraph {
    pub fn new() -> Self {
        let mut objects = Arena::new();
        let super_root = objects.push(GameObject::new(0, ""));
        Self {
            objects,
            super_root,
            zdefines: None,
        }
    }

    pub fn super_root(&self) -> ObjId {
        self.super_root
    }

    /// The first top-level object.
    pub fn root(&self) -> Option<ObjId> {
        self.children(self.super_root).first().copied()
    }

    pub fn get(&self, id: ObjId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    fn obj(&self, id: ObjId) -> Result<&GameObject> {
        self.objects.get(id).ok_or(Error::NoSuchObject)
    }

    pub fn contains(&self, id: ObjId) -> bool {
        id != self.super_root && self.objects.contains_key(id)
    }

    /// Number of live objects, not counting the super-root.
    pub fn len(&self) -> usize {
        self.objects.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: ObjId) -> &[ObjId] {
        match self.objects.get(id) {
            Some(o) => &o.children,
            None => &[],
        }
    }

    pub fn parent(&self, id: ObjId) -> Option<ObjId> {
        self.objects.get(id)?.parent
    }

    /// No parent, or parented directly to the super-root.
    pub fn is_root_object(&self, id: ObjId) -> bool {
        match self.parent(id) {
            None => true,
            Some(p) => p == self.super_root,
        }
    }

    /// Append `object` as the last child of `parent`.
    pub fn add_child(&mut self, parent: ObjId, object: GameObject) -> Result<ObjId> {
        self.insert_child(parent, object, None)
    }

    fn insert_child(
        &mut self,
        parent: ObjId,
        mut object: GameObject,
        position: Option<usize>,
    ) -> Result<ObjId> {
        self.obj(parent)?;
        object.parent = Some(parent);
        let id = self.objects.push(object);
        if let Some(p) = self.objects.get_mut(parent) {
            let at = position.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, id);
        }
        Ok(id)
    }

    /// New object of class `type_id` with its class members at default values.
    pub fn create(
        &mut self,
        parent: ObjId,
        type_id: u32,
        name: impl Into<String>,
        schema: &ClassSchema,
    ) -> Result<ObjId> {
        let mut object = GameObject::new(type_id, name);
        object.flags = GameObject::FLAG_ENABLED;
        object.dbl.add_members(&schema.lookup(type_id));
        self.add_child(parent, object)
    }

    /// `id` and all of its descendants, pre-order.
    pub fn subtree(&self, id: ObjId) -> Vec<ObjId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.objects.contains_key(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Every object except the super-root, pre-order. Save handles are
    /// positions in this order plus one.
    pub fn preorder(&self) -> Vec<ObjId> {
        let mut all = self.subtree(self.super_root);
        all.remove(0);
        all
    }

    pub fn is_ancestor(&self, ancestor: ObjId, id: ObjId) -> bool {
        let mut next = Some(id);
        while let Some(cur) = next {
            if cur == ancestor {
                return true;
            }
            next = self.parent(cur);
        }
        false
    }

    /// Slash-separated names from the top-level object down.
    pub fn path(&self, id: ObjId) -> String {
        let mut names = Vec::new();
        let mut next = Some(id);
        while let Some(cur) = next {
            if cur == self.super_root {
                break;
            }
            let Some(o) = self.objects.get(cur) else { break };
            names.push(o.name.as_str());
            next = o.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Resolve `a/b/c` relative to `start`. An empty path names `start`.
    pub fn find_by_path(&self, start: ObjId, path: &str) -> Option<ObjId> {
        let mut cur = start;
        for name in path.split('/').filter(|s| !s.is_empty()) {
            cur = *self
                .children(cur)
                .iter()
                .find(|c| self.objects.get(**c).is_some_and(|o| o.name == name))?;
        }
        self.objects.contains_key(cur).then_some(cur)
    }

    /// First object named `name`, depth-first.
    pub fn find_named(&self, name: &str) -> Option<ObjId> {
        self.preorder()
            .into_iter()
            .find(|id| self.objects.get(*id).is_some_and(|o| o.name == name))
    }

    fn all_lists(&self) -> impl Iterator<Item = (Option<ObjId>, &DblList)> {
        self.objects
            .iter()
            .map(|(id, o)| (Some(id), &o.dbl))
            .chain(self.zdefines.iter().map(|z| (None, &z.values)))
    }

    /// Inbound OBJREF/OBJREF_LIST occurrences anywhere in the scene,
    /// ZDefines and nested lists included.
    pub fn ref_count(&self, id: ObjId) -> usize {
        self.all_lists()
            .map(|(_, dbl)| dbl.object_refs().into_iter().filter(|r| *r == id).count())
            .sum()
    }

    /// Objects whose DBL lists reference `id`.
    pub fn referrers(&self, id: ObjId) -> Vec<ObjId> {
        self.all_lists()
            .filter_map(|(owner, dbl)| {
                let owner = owner?;
                dbl.object_refs().contains(&id).then_some(owner)
            })
            .collect()
    }

    /// Deep-copy the subtree at `id` as its next sibling.
    ///
    /// References inside the copy that pointed into the original subtree are
    /// redirected to the matching clone. The copy's name gets its trailing
    /// number incremented until it is free among its siblings.
    pub fn duplicate(&mut self, id: ObjId) -> Result<ObjId> {
        if self.is_root_object(id) {
            return Err(Error::RootObject {
                path: self.path(id),
            });
        }
        let parent = self.parent(id).ok_or(Error::NoSuchObject)?;
        let position = self
            .children(parent)
            .iter()
            .position(|c| *c == id)
            .map(|p| p + 1);
        let copies = self.copy_subtree(id);
        let map = self.insert_copies(copies, parent, position)?;
        let clone = map.get(&id).copied().ok_or(Error::NoSuchObject)?;
        let name = self.obj(id)?.name.clone();
        if let Some(new_name) = self.free_sibling_name(parent, &name) {
            if let Some(o) = self.objects.get_mut(clone) {
                o.name = new_name;
            }
        }
        Ok(clone)
    }

    fn free_sibling_name(&self, parent: ObjId, name: &str) -> Option<String> {
        let stem_len = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (stem, digits) = name.split_at(stem_len);
        let mut number: u64 = digits.parse().unwrap_or(0);
        for _ in 0..NAME_ATTEMPTS {
            number += 1;
            let candidate = format!("{stem}{number:0width$}", width = digits.len());
            if self.find_by_path(parent, &candidate).is_none() {
                return Some(candidate);
            }
        }
        None
    }

    /// Clones of the subtree at `id`, pre-order, keyed by their source ids.
    pub(crate) fn copy_subtree(&self, id: ObjId) -> Vec<(ObjId, GameObject)> {
        self.subtree(id)
            .into_iter()
            .filter_map(|old| Some((old, self.objects.get(old)?.clone())))
            .collect()
    }

    /// Insert pre-order copies under `parent` and redirect references
    /// between them. Returns the old → new id map.
    pub(crate) fn insert_copies(
        &mut self,
        copies: Vec<(ObjId, GameObject)>,
        parent: ObjId,
        position: Option<usize>,
    ) -> Result<HashMap<ObjId, ObjId>> {
        let mut map = HashMap::with_capacity(copies.len());
        let mut first = true;
        for (old, mut object) in copies {
            object.children.clear();
            let new = if first {
                first = false;
                self.insert_child(parent, object, position)?
            } else {
                let old_parent = object.parent.ok_or(Error::NoSuchObject)?;
                let new_parent = *map.get(&old_parent).ok_or(Error::NoSuchObject)?;
                self.insert_child(new_parent, object, None)?
            };
            map.insert(old, new);
        }
        for new in map.values() {
            if let Some(o) = self.objects.get_mut(*new) {
                o.dbl.map_refs(&mut |r| map.get(&r).copied().unwrap_or(r));
            }
        }
        Ok(map)
    }

    /// Remove the subtree at `id`.
    ///
    /// Refused for root objects, for an object with any inbound reference, and
    /// when something outside the subtree references one of its descendants.
    /// A refusal changes nothing.
    pub fn delete(&mut self, id: ObjId) -> Result<()> {
        self.obj(id)?;
        if self.is_root_object(id) {
            return Err(Error::RootObject {
                path: self.path(id),
            });
        }
        let count = self.ref_count(id);
        if count > 0 {
            return Err(Error::ReferencedObject {
                path: self.path(id),
                count,
            });
        }
        let subtree = self.subtree(id);
        let inside: HashSet<ObjId> = subtree.iter().copied().collect();
        for (owner, dbl) in self.all_lists() {
            if owner.is_some_and(|o| inside.contains(&o)) {
                continue;
            }
            if let Some(target) = dbl.object_refs().into_iter().find(|r| inside.contains(r)) {
                return Err(Error::ReferencedObject {
                    path: self.path(target),
                    count: self.ref_count(target),
                });
            }
        }
        if let Some(parent) = self.parent(id).and_then(|p| self.objects.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        for obj in subtree {
            self.objects.remove(obj);
        }
        Ok(())
    }

    /// Move `id` with its subtree to the end of `new_parent`'s children.
    pub fn reparent(&mut self, id: ObjId, new_parent: ObjId) -> Result<()> {
        self.obj(id)?;
        self.obj(new_parent)?;
        if self.is_root_object(id) {
            return Err(Error::RootObject {
                path: self.path(id),
            });
        }
        if self.is_ancestor(id, new_parent) {
            return Err(Error::WouldCreateCycle {
                object: self.path(id),
                new_parent: self.path(new_parent),
            });
        }
        if let Some(old) = self.parent(id).and_then(|p| self.objects.get_mut(p)) {
            old.children.retain(|c| *c != id);
        }
        if let Some(p) = self.objects.get_mut(new_parent) {
            p.children.push(id);
        }
        if let Some(o) = self.objects.get_mut(id) {
            o.parent = Some(new_parent);
        }
        Ok(())
    }

    /// World transform: ancestors' matrices applied outside-in.
    pub fn global_transform(&self, id: ObjId) -> Mat4 {
        let mut m = Mat4::IDENTITY;
        let mut next = Some(id);
        while let Some(cur) = next {
            if cur == self.super_root {
                break;
            }
            let Some(o) = self.objects.get(cur) else { break };
            m = o.matrix * m;
            next = o.parent;
        }
        m
    }

    /// The object's mesh, copied first if it is shared.
    pub fn mesh_mut(&mut self, id: ObjId) -> Option<&mut Mesh> {
        self.objects.get_mut(id)?.mesh.as_mut().map(Rc::make_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjId, &GameObject)> {
        let super_root = self.super_root;
        self.objects.iter().filter(move |(id, _)| *id != super_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbl::{DblEntry, DblValue};
    use glam::Vec3;

    fn with_ref(name: &str, target: Option<ObjId>) -> GameObject {
        let mut o = GameObject::new(1, name);
        o.dbl.entries.push(DblEntry::new(DblValue::ObjRef(target)));
        o
    }

    /// root / { group / { door07, switch -> door07 }, lamp }
    fn scene() -> (ObjectGraph, [ObjId; 5]) {
        let mut g = ObjectGraph::new();
        let root = g.add_child(g.super_root(), GameObject::new(1, "Root")).unwrap();
        let group = g.add_child(root, GameObject::new(1, "group")).unwrap();
        let door = g.add_child(group, with_ref("door07", None)).unwrap();
        let switch = g.add_child(group, with_ref("switch", Some(door))).unwrap();
        let lamp = g.add_child(root, with_ref("lamp", None)).unwrap();
        (g, [root, group, door, switch, lamp])
    }

    #[test]
    fn paths_resolve_both_ways() {
        let (g, [root, _, door, ..]) = scene();
        assert_eq!(g.path(door), "Root/group/door07");
        assert_eq!(g.find_by_path(g.super_root(), "Root/group/door07"), Some(door));
        assert_eq!(g.find_by_path(root, "group/nothing"), None);
        assert_eq!(g.find_named("lamp"), g.find_by_path(root, "lamp"));
        assert_eq!(g.root(), Some(root));
    }

    #[test]
    fn roots_cannot_be_duplicated_or_deleted() {
        let (mut g, [root, ..]) = scene();
        assert!(matches!(g.duplicate(root), Err(Error::RootObject { .. })));
        assert!(matches!(g.delete(root), Err(Error::RootObject { .. })));
        assert_eq!(g.len(), 5);
    }

    #[test]
    fn duplicate_redirects_internal_refs_and_renames() {
        let (mut g, [root, group, door, switch, lamp]) = scene();
        g.get_mut(lamp).unwrap().dbl.entries[0].value = DblValue::ObjRef(Some(door));
        let copy = g.duplicate(group).unwrap();
        assert_eq!(g.children(root), [group, copy, lamp]);
        assert_eq!(g.get(copy).unwrap().name, "group1");

        let copy_door = g.find_by_path(copy, "door07").unwrap();
        let copy_switch = g.find_by_path(copy, "switch").unwrap();
        assert_ne!(copy_door, door);
        assert_eq!(g.get(copy_switch).unwrap().dbl.object_refs(), [copy_door]);
        assert_eq!(g.get(switch).unwrap().dbl.object_refs(), [door]);
        assert_eq!(g.ref_count(door), 2);
    }

    #[test]
    fn duplicate_keeps_zero_padding_and_skips_taken_names() {
        let (mut g, [_, group, door, ..]) = scene();
        g.add_child(group, GameObject::new(1, "door08")).unwrap();
        let copy = g.duplicate(door).unwrap();
        assert_eq!(g.get(copy).unwrap().name, "door09");
        assert_eq!(g.children(group)[1], copy);
    }

    #[test]
    fn duplicate_then_delete_restores_count() {
        let (mut g, [_, group, ..]) = scene();
        let before = g.len();
        let copy = g.duplicate(group).unwrap();
        assert_eq!(g.len(), before + 3);
        g.delete(copy).unwrap();
        assert_eq!(g.len(), before);
        for (_, o) in g.iter() {
            for r in o.dbl.object_refs() {
                assert!(g.contains(r));
            }
        }
    }

    #[test]
    fn referenced_objects_are_not_deleted() {
        let (mut g, [_, group, door, ..]) = scene();
        assert_eq!(g.ref_count(door), 1);
        assert!(matches!(
            g.delete(door),
            Err(Error::ReferencedObject { count: 1, .. })
        ));
        assert_eq!(g.len(), 5);
        assert!(g.contains(door));
        // The only reference comes from inside the group.
        g.delete(group).unwrap();
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn outside_reference_to_descendant_blocks_delete() {
        let (mut g, [_, group, door, _, lamp]) = scene();
        g.get_mut(lamp).unwrap().dbl.entries[0].value = DblValue::ObjRef(Some(door));
        assert!(matches!(g.delete(group), Err(Error::ReferencedObject { .. })));
        assert_eq!(g.len(), 5);
    }

    #[test]
    fn zdefines_count_as_referrers() {
        let (mut g, [.., lamp]) = scene();
        let mut values = DblList::default();
        values
            .entries
            .push(DblEntry::new(DblValue::ObjRefList(vec![Some(lamp), Some(lamp)])));
        g.zdefines = Some(ZDefines {
            types: "OBJREF_LIST Lamps".into(),
            values,
        });
        assert_eq!(g.ref_count(lamp), 2);
        assert!(g.referrers(lamp).is_empty());
        assert!(g.delete(lamp).is_err());
    }

    #[test]
    fn reparent_rejects_cycles() {
        let (mut g, [root, group, door, _, lamp]) = scene();
        assert!(matches!(
            g.reparent(group, door),
            Err(Error::WouldCreateCycle { .. })
        ));
        assert!(matches!(g.reparent(group, group), Err(Error::WouldCreateCycle { .. })));
        g.reparent(lamp, group).unwrap();
        assert_eq!(g.path(lamp), "Root/group/lamp");
        assert_eq!(g.children(root), [group]);
    }

    #[test]
    fn global_transform_composes_parents() {
        let (mut g, [root, group, door, ..]) = scene();
        g.get_mut(root).unwrap().matrix = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        g.get_mut(group).unwrap().matrix = Mat4::from_scale(Vec3::splat(2.0));
        g.get_mut(door).unwrap().matrix = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let p = g.global_transform(door).transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(12.0, 0.0, 0.0));
    }

    #[test]
    fn mesh_mut_unshares() {
        let (mut g, [_, group, door, ..]) = scene();
        let mesh = Rc::new(Mesh::default());
        g.get_mut(group).unwrap().mesh = Some(mesh.clone());
        g.get_mut(door).unwrap().mesh = Some(mesh);
        g.mesh_mut(door).unwrap().weird = 5;
        assert_eq!(g.get(group).unwrap().mesh.as_ref().unwrap().weird, 0);
        assert_eq!(g.get(door).unwrap().mesh.as_ref().unwrap().weird, 5);
    }

    #[test]
    fn create_fills_class_defaults() {
        let schema = ClassSchema::from_json(
            r#"{ "classes": [
                { "id": 4, "name": "ZBOX", "members": "STRING Routines, FLOAT W" }
            ] }"#,
        )
        .unwrap();
        let (mut g, [root, ..]) = scene();
        let id = g.create(root, 4, "box", &schema).unwrap();
        let o = g.get(id).unwrap();
        assert_eq!(o.dbl.entries.len(), 2);
        assert_eq!(o.dbl.entries[1].value, DblValue::Float(0.0));
    }
}
