//! DBL property lists: positional typed entries named by a class schema.

mod schema;
mod value;

pub use schema::{parse_members, ClassDef, ClassSchema, MemberType, SchemaMember};
pub use value::{DblValue, EntryType};

use std::convert::Infallible;

use tracing::warn;

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::object::ObjId;

/// One property: metadata flags in the high nibble plus a typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct DblEntry {
    pub flags: u8,
    pub value: DblValue,
}

impl DblEntry {
    pub fn new(value: DblValue) -> Self {
        Self { flags: 0, value }
    }
}

/// Ordered property list. Layout: `flags:u32 | body_len:u32 | entries`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DblList {
    pub flags: u32,
    pub entries: Vec<DblEntry>,
}

impl DblList {
    /// Parse a standalone list (the main data of a `PDBL` chunk).
    ///
    /// Object references come back holding raw save handles.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(data);
        let list = Self::read(&mut c)?;
        if !c.is_empty() {
            return Err(Error::TrailingData {
                offset: c.position(),
                extra: c.remaining(),
            });
        }
        Ok(list)
    }

    pub(crate) fn read(c: &mut Cursor<'_>) -> Result<Self> {
        let flags = c.read_u32()?;
        let body = c.read_sized()?;
        let mut body = Cursor::new(body);
        let mut entries = Vec::new();
        while !body.is_empty() {
            let header = body.read_u8()?;
            let code = header & 0x0F;
            let value = DblValue::decode(code, &mut body)?;
            if let DblValue::Unknown { raw, .. } = &value {
                warn!("unknown DBL entry type {code}, keeping {} raw byte(s)", raw.len());
            }
            entries.push(DblEntry {
                flags: header & 0xF0,
                value,
            });
        }
        Ok(Self { flags, entries })
    }

    /// Serialize with `handle_of` mapping each referenced object to its save handle.
    pub fn to_bytes(&self, handle_of: &dyn Fn(ObjId) -> u32) -> Vec<u8> {
        let mut w = Writer::new();
        self.write(&mut w, handle_of);
        w.into_bytes()
    }

    pub(crate) fn write(&self, w: &mut Writer, handle_of: &dyn Fn(ObjId) -> u32) {
        w.write_u32(self.flags);
        let len_pos = w.position();
        w.write_u32(0);
        for entry in &self.entries {
            w.write_u8((entry.flags & 0xF0) | (entry.value.type_code() & 0x0F));
            entry.value.encode(w, handle_of);
        }
        let body_len = w.position() - len_pos - 4;
        w.patch_u32(len_pos, body_len as u32);
    }

    /// Append one default-valued entry per member.
    pub fn add_members(&mut self, members: &[SchemaMember]) {
        self.entries.extend(
            members
                .iter()
                .map(|m| DblEntry::new(DblValue::default_for(m.ty.entry_type()))),
        );
    }

    /// The routine header string (entry 0), if present.
    pub fn routine_header(&self) -> Option<&str> {
        match &self.entries.first()?.value {
            DblValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Call `f` on every value, descending into nested lists.
    pub fn visit_values(&self, f: &mut impl FnMut(&DblValue)) {
        for entry in &self.entries {
            f(&entry.value);
            if let DblValue::Nested(list) = &entry.value {
                list.visit_values(f);
            }
        }
    }

    pub fn try_visit_values_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut DblValue) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        for entry in &mut self.entries {
            f(&mut entry.value)?;
            if let DblValue::Nested(list) = &mut entry.value {
                list.try_visit_values_mut(f)?;
            }
        }
        Ok(())
    }

    pub fn visit_values_mut(&mut self, f: &mut impl FnMut(&mut DblValue)) {
        let _ = self.try_visit_values_mut(&mut |v| {
            f(v);
            Ok::<(), Infallible>(())
        });
    }

    /// Every non-null object reference, nested lists included.
    pub fn object_refs(&self) -> Vec<ObjId> {
        let mut refs = Vec::new();
        self.visit_values(&mut |v| match v {
            DblValue::ObjRef(Some(id)) => refs.push(*id),
            DblValue::ObjRefList(list) => refs.extend(list.iter().flatten()),
            _ => {}
        });
        refs
    }

    /// Rewrite every non-null object reference through `f`.
    pub fn try_map_refs(&mut self, f: &mut impl FnMut(ObjId) -> Result<ObjId>) -> Result<()> {
        self.try_visit_values_mut(&mut |v| {
            match v {
                DblValue::ObjRef(Some(id)) => *id = f(*id)?,
                DblValue::ObjRefList(list) => {
                    for id in list.iter_mut().flatten() {
                        *id = f(*id)?;
                    }
                }
                _ => {}
            }
            Ok(())
        })
    }

    pub fn map_refs(&mut self, f: &mut impl FnMut(ObjId) -> ObjId) {
        // The closure never fails.
        let _ = self.try_map_refs(&mut |id| Ok(f(id)));
    }

    /// Deferred resolution pass: turn raw save handles into live object ids.
    pub fn resolve_refs(&mut self, resolve: &dyn Fn(u32) -> Option<ObjId>) -> Result<()> {
        use crate::arena::EntityRef;
        self.try_map_refs(&mut |raw| {
            let handle = raw.index();
            resolve(handle).ok_or(Error::DanglingReference { handle })
        })
    }
}

/// A component (routine) instance within an object's DBL list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRun {
    pub name: String,
    pub number: u32,
    pub start: usize,
    pub len: usize,
}

/// Members an object's DBL list should contain: class chain first, then one
/// run per routine in header order.
#[derive(Debug, Clone, Default)]
pub struct MemberLayout {
    pub members: Vec<SchemaMember>,
    pub components: Vec<ComponentRun>,
}

/// Parse `"Name N,Name N"`. Items without a number get 0.
pub fn parse_routine_header(header: &str) -> Vec<(String, u32)> {
    header
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.rsplit_once(' ') {
            Some((name, n)) => match n.parse() {
                Ok(n) => (name.trim().to_string(), n),
                Err(_) => (item.to_string(), 0),
            },
            None => (item.to_string(), 0),
        })
        .collect()
}

fn format_routine_header(routines: &[(String, u32)]) -> String {
    routines
        .iter()
        .map(|(name, n)| format!("{name} {n}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn member_layout(schema: &ClassSchema, type_id: u32, dbl: &DblList) -> MemberLayout {
    let mut layout = MemberLayout {
        members: schema.lookup(type_id),
        components: Vec::new(),
    };
    let Some(header) = dbl.routine_header() else {
        return layout;
    };
    for (name, number) in parse_routine_header(header) {
        let members: &[SchemaMember] = match schema.component(&name) {
            Some(m) => m,
            None => {
                warn!("routine {name} is not described by the class schema");
                &[]
            }
        };
        layout.components.push(ComponentRun {
            name,
            number,
            start: layout.members.len(),
            len: members.len(),
        });
        layout.members.extend(members.iter().cloned());
    }
    layout
}

/// Labels for each entry of a list under a given layout.
#[derive(Debug, Clone)]
pub struct Binding {
    pub labels: Vec<String>,
    expected: usize,
    found: usize,
}

impl Binding {
    pub fn is_bound(&self) -> bool {
        self.expected == self.found
    }

    /// The `SchemaMismatch` condition, if names could not be trusted.
    pub fn mismatch(&self) -> Option<Error> {
        (!self.is_bound()).then_some(Error::SchemaMismatch {
            expected: self.expected,
            found: self.found,
        })
    }
}

/// Name entries by position. On a count mismatch every entry is labeled by
/// index only.
pub fn bind(dbl: &DblList, layout: &MemberLayout) -> Binding {
    let expected = layout.members.len();
    let found = dbl.entries.len();
    let labels = if expected == found {
        layout.members.iter().map(SchemaMember::label).collect()
    } else {
        warn!("DBL list has {found} entries but the schema describes {expected}");
        (0..found).map(|i| format!("#{i}")).collect()
    };
    Binding {
        labels,
        expected,
        found,
    }
}

/// Append routine `component` to an object of class `type_id`.
pub fn add_routine(
    dbl: &mut DblList,
    schema: &ClassSchema,
    type_id: u32,
    component: &str,
) -> Result<()> {
    if !schema.component_allowed(type_id, component) {
        return Err(Error::Schema(format!(
            "{component} cannot be added to {}",
            schema.type_name(type_id).unwrap_or("this class")
        )));
    }
    let members = schema
        .component(component)
        .ok_or_else(|| Error::Schema(format!("unknown component {component}")))?
        .to_vec();
    let Some(DblEntry {
        value: DblValue::String(header),
        ..
    }) = dbl.entries.first_mut()
    else {
        return Err(Error::SchemaMismatch {
            expected: 1,
            found: 0,
        });
    };
    if !header.is_empty() {
        header.push(',');
    }
    header.push_str(component);
    header.push_str(" 0");
    dbl.add_members(&members);
    Ok(())
}

fn set_header(dbl: &mut DblList, header: String) -> Result<()> {
    match dbl.entries.first_mut() {
        Some(DblEntry {
            value: DblValue::String(s),
            ..
        }) => {
            *s = header;
            Ok(())
        }
        _ => Err(Error::SchemaMismatch {
            expected: 1,
            found: 0,
        }),
    }
}

pub fn set_routine_number(
    dbl: &mut DblList,
    layout: &MemberLayout,
    index: usize,
    number: u32,
) -> Result<()> {
    let mut routines: Vec<_> = layout
        .components
        .iter()
        .map(|c| (c.name.clone(), c.number))
        .collect();
    let Some(routine) = routines.get_mut(index) else {
        return Err(Error::NoSuchObject);
    };
    routine.1 = number;
    set_header(dbl, format_routine_header(&routines))
}

/// Remove routine `index` and splice out its entry run.
pub fn remove_routine(dbl: &mut DblList, layout: &MemberLayout, index: usize) -> Result<()> {
    if let Some(err) = bind(dbl, layout).mismatch() {
        return Err(err);
    }
    let Some(run) = layout.components.get(index) else {
        return Err(Error::NoSuchObject);
    };
    let routines: Vec<_> = layout
        .components
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, c)| (c.name.clone(), c.number))
        .collect();
    set_header(dbl, format_routine_header(&routines))?;
    dbl.entries.drain(run.start..run.start + run.len);
    Ok(())
}

/// Members of an attached script list: the script file, the member string,
/// then the members that string declares.
pub fn script_layout(script: &DblList) -> Result<Vec<SchemaMember>> {
    let mut members = vec![
        SchemaMember::new("ScriptFile", MemberType::File),
        SchemaMember {
            protected: true,
            ..SchemaMember::new("ScriptMembers", MemberType::String)
        },
    ];
    members.extend(parse_members(script_member_string(script)?)?);
    Ok(members)
}

fn script_member_string(script: &DblList) -> Result<&str> {
    script
        .entries
        .get(1)
        .and_then(|e| e.value.as_str())
        .ok_or(Error::SchemaMismatch {
            expected: 2,
            found: script.entries.len(),
        })
}

/// Rebuild a script list for a new member string, keeping the values of
/// members whose name, array index and entry type are unchanged.
pub fn rebind_script(script: &mut DblList, new_members: &str) -> Result<()> {
    let old = parse_members(script_member_string(script)?)?;
    if script.entries.len() != old.len() + 2 {
        return Err(Error::SchemaMismatch {
            expected: old.len() + 2,
            found: script.entries.len(),
        });
    }
    let new = parse_members(new_members)?;
    let mut entries = Vec::with_capacity(new.len() + 2);
    entries.push(script.entries[0].clone());
    entries.push(DblEntry {
        flags: script.entries[1].flags,
        value: DblValue::String(new_members.to_string()),
    });
    for member in &new {
        let ty = member.ty.entry_type();
        let kept = old
            .iter()
            .position(|o| {
                o.name == member.name
                    && o.array_index == member.array_index
                    && o.ty.entry_type() == ty
            })
            .map(|j| script.entries[j + 2].clone())
            .filter(|e| e.value.entry_type() == Some(ty));
        entries.push(kept.unwrap_or_else(|| DblEntry::new(DblValue::default_for(ty))));
    }
    script.entries = entries;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::EntityRef;
    use crate::audio::AudioRef;

    fn schema() -> ClassSchema {
        ClassSchema::from_json(
            r#"{
                "classes": [ { "id": 3, "name": "ZGEOM",
                               "members": "STRING Routines, FLOAT Size, INT Mode" } ],
                "components": [ { "name": "ZGEOM_Blink", "members": "FLOAT Rate, INT Count" },
                                { "name": "ZGEOM_Spin", "members": "FLOAT Speed" } ]
            }"#,
        )
        .unwrap()
    }

    fn object_list(schema: &ClassSchema) -> DblList {
        let mut dbl = DblList::default();
        dbl.add_members(&schema.lookup(3));
        dbl
    }

    #[test]
    fn list_bytes_roundtrip_with_nested_and_flags() {
        let mut nested = DblList::default();
        nested.entries.push(DblEntry::new(DblValue::File("door.scr".into())));
        let list = DblList {
            flags: 0x55,
            entries: vec![
                DblEntry {
                    flags: 0x30,
                    value: DblValue::Float(2.5),
                },
                DblEntry::new(DblValue::Sound(AudioRef { id: 9 })),
                DblEntry::new(DblValue::Data(vec![1, 2])),
                DblEntry::new(DblValue::Nested(nested)),
            ],
        };
        let bytes = list.to_bytes(&|id| id.index());
        assert_eq!(bytes[8], 0x32);
        assert_eq!(DblList::parse(&bytes).unwrap(), list);
    }

    #[test]
    fn unknown_entry_bytes_are_written_back() {
        let mut w = Writer::new();
        w.write_u32(0);
        w.write_u32(10);
        w.write_u8(0x03);
        w.write_u32(5);
        w.write_u8(0x1E);
        w.write_bytes(&[0xAA, 0xBB, 0xCC, 0xDD]);
        let bytes = w.into_bytes();
        let list = DblList::parse(&bytes).unwrap();
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.entries[1].value.to_string(), "unknown type 14");
        assert_eq!(list.to_bytes(&|id| id.index()), bytes);
    }

    #[test]
    fn truncated_body_fails() {
        let list = DblList {
            flags: 0,
            entries: vec![DblEntry::new(DblValue::Double(1.0))],
        };
        let bytes = list.to_bytes(&|id| id.index());
        assert!(DblList::parse(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn dangling_handles_are_reported() {
        let mut list = DblList {
            flags: 0,
            entries: vec![DblEntry::new(DblValue::ObjRefList(vec![
                Some(ObjId::new(1)),
                None,
                Some(ObjId::new(4)),
            ]))],
        };
        let err = list
            .clone()
            .resolve_refs(&|h| (h == 1).then(|| ObjId::new(100)))
            .unwrap_err();
        assert!(matches!(err, Error::DanglingReference { handle: 4 }));
        list.resolve_refs(&|h| Some(ObjId::new(h + 10))).unwrap();
        assert_eq!(list.object_refs(), vec![ObjId::new(11), ObjId::new(14)]);
    }

    #[test]
    fn mismatched_binding_labels_by_index() {
        let schema = ClassSchema::from_json(
            r#"{ "classes": [ { "id": 1, "name": "A",
                 "members": "INT A, INT B, INT C, INT D, INT E, INT F, INT G" } ] }"#,
        )
        .unwrap();
        let mut dbl = DblList::default();
        dbl.add_members(&schema.lookup(1)[..5]);
        let layout = member_layout(&schema, 1, &dbl);
        let binding = bind(&dbl, &layout);
        assert_eq!(binding.labels, ["#0", "#1", "#2", "#3", "#4"]);
        assert!(matches!(
            binding.mismatch(),
            Some(Error::SchemaMismatch {
                expected: 7,
                found: 5
            })
        ));
    }

    #[test]
    fn routines_add_renumber_and_remove() {
        let schema = schema();
        let mut dbl = object_list(&schema);
        add_routine(&mut dbl, &schema, 3, "ZGEOM_Blink").unwrap();
        add_routine(&mut dbl, &schema, 3, "ZGEOM_Spin").unwrap();
        assert_eq!(dbl.routine_header(), Some("ZGEOM_Blink 0,ZGEOM_Spin 0"));
        assert_eq!(dbl.entries.len(), 6);

        let layout = member_layout(&schema, 3, &dbl);
        assert!(bind(&dbl, &layout).is_bound());
        assert_eq!(layout.components[1].start, 5);
        set_routine_number(&mut dbl, &layout, 1, 4).unwrap();
        assert_eq!(dbl.routine_header(), Some("ZGEOM_Blink 0,ZGEOM_Spin 4"));

        dbl.entries[5].value = DblValue::Float(9.0);
        let layout = member_layout(&schema, 3, &dbl);
        remove_routine(&mut dbl, &layout, 0).unwrap();
        assert_eq!(dbl.routine_header(), Some("ZGEOM_Spin 4"));
        assert_eq!(dbl.entries.len(), 4);
        assert_eq!(dbl.entries[3].value, DblValue::Float(9.0));
    }

    #[test]
    fn remove_routine_requires_matching_binding() {
        let schema = schema();
        let mut dbl = object_list(&schema);
        add_routine(&mut dbl, &schema, 3, "ZGEOM_Blink").unwrap();
        dbl.entries.pop();
        let layout = member_layout(&schema, 3, &dbl);
        let before = dbl.clone();
        assert!(matches!(
            remove_routine(&mut dbl, &layout, 0),
            Err(Error::SchemaMismatch { .. })
        ));
        assert_eq!(dbl, before);
    }

    #[test]
    fn routine_from_other_class_is_refused() {
        let schema = ClassSchema::from_json(
            r#"{ "classes": [ { "id": 3, "name": "ZGEOM", "members": "STRING Routines" } ],
                 "components": [ { "name": "ZLIGHT_Flicker", "members": "INT Seed" } ] }"#,
        )
        .unwrap();
        let mut dbl = DblList::default();
        dbl.add_members(&schema.lookup(3));
        assert!(add_routine(&mut dbl, &schema, 3, "ZLIGHT_Flicker").is_err());
        assert_eq!(dbl.entries.len(), 1);
    }

    #[test]
    fn rebinding_a_script_keeps_matching_values() {
        let mut script = DblList::default();
        script.entries = vec![
            DblEntry::new(DblValue::File("lift.scr".into())),
            DblEntry::new(DblValue::String("FLOAT Speed, INT Floor[2]".into())),
            DblEntry::new(DblValue::Float(3.0)),
            DblEntry::new(DblValue::Int(1)),
            DblEntry::new(DblValue::Int(2)),
        ];
        rebind_script(&mut script, "INT Floor[3], STRING Speed").unwrap();
        let values: Vec<_> = script.entries.iter().map(|e| e.value.clone()).collect();
        assert_eq!(
            values[2..],
            [
                DblValue::Int(1),
                DblValue::Int(2),
                DblValue::Int(0),
                DblValue::String(String::new()),
            ]
        );
        assert_eq!(script_layout(&script).unwrap().len(), 6);
    }

    #[test]
    fn rebinding_a_damaged_script_is_refused() {
        let mut script = DblList::default();
        script.entries = vec![
            DblEntry::new(DblValue::File("lift.scr".into())),
            DblEntry::new(DblValue::String("FLOAT Speed".into())),
        ];
        assert!(matches!(
            rebind_script(&mut script, "FLOAT Speed"),
            Err(Error::SchemaMismatch { .. })
        ));
    }
}
