//! Class member descriptions loaded from `classes.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::EntryType;

/// Declared member type. `Bool` and `Enum` are stored as `INT` entries,
/// `Script` as a nested list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Undefined,
    Double,
    Float,
    Int,
    Bool,
    Enum,
    String,
    File,
    Terminator,
    Data,
    ObjRef,
    ObjRefList,
    Message,
    SoundRef,
    Script,
}

impl MemberType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "UNDEFINED" => Self::Undefined,
            "DOUBLE" => Self::Double,
            "FLOAT" => Self::Float,
            "INT" => Self::Int,
            "BOOL" => Self::Bool,
            "ENUM" => Self::Enum,
            "STRING" => Self::String,
            "FILE" => Self::File,
            "TERMINATOR" => Self::Terminator,
            "DATA" => Self::Data,
            "OBJREF" => Self::ObjRef,
            "OBJREF_LIST" => Self::ObjRefList,
            "MESSAGE" => Self::Message,
            "SOUNDREF" => Self::SoundRef,
            "SCRIPT" => Self::Script,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Double => "DOUBLE",
            Self::Float => "FLOAT",
            Self::Int => "INT",
            Self::Bool => "BOOL",
            Self::Enum => "ENUM",
            Self::String => "STRING",
            Self::File => "FILE",
            Self::Terminator => "TERMINATOR",
            Self::Data => "DATA",
            Self::ObjRef => "OBJREF",
            Self::ObjRefList => "OBJREF_LIST",
            Self::Message => "MESSAGE",
            Self::SoundRef => "SOUNDREF",
            Self::Script => "SCRIPT",
        }
    }

    pub fn entry_type(self) -> EntryType {
        match self {
            Self::Undefined => EntryType::Undefined,
            Self::Double => EntryType::Double,
            Self::Float => EntryType::Float,
            Self::Int | Self::Bool | Self::Enum => EntryType::Int,
            Self::String => EntryType::String,
            Self::File => EntryType::File,
            Self::Terminator => EntryType::Terminator,
            Self::Data => EntryType::Data,
            Self::ObjRef => EntryType::ObjRef,
            Self::ObjRefList => EntryType::ObjRefList,
            Self::Message => EntryType::MessageId,
            Self::SoundRef => EntryType::SoundRef,
            Self::Script => EntryType::NestedList,
        }
    }
}

/// One positional member. Array members expand to one member per element.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMember {
    pub name: String,
    pub ty: MemberType,
    pub array_index: Option<usize>,
    pub protected: bool,
    /// Value names for `ENUM` members.
    pub enum_values: Vec<String>,
}

impl SchemaMember {
    pub fn new(name: impl Into<String>, ty: MemberType) -> Self {
        Self {
            name: name.into(),
            ty,
            array_index: None,
            protected: false,
            enum_values: Vec::new(),
        }
    }

    /// Display label: `Name` or `Name[i]`.
    pub fn label(&self) -> String {
        match self.array_index {
            Some(i) => format!("{}[{i}]", self.name),
            None => self.name.clone(),
        }
    }
}

/// Parse the textual member grammar `TYPE Name, TYPE Name[N], ...`.
pub fn parse_members(text: &str) -> Result<Vec<SchemaMember>> {
    let mut members = Vec::new();
    for decl in text.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let Some((ty, name)) = decl.split_once(char::is_whitespace) else {
            return Err(Error::Schema(format!("member declaration without a name: {decl:?}")));
        };
        let ty = MemberType::parse(ty)
            .ok_or_else(|| Error::Schema(format!("unknown member type {ty:?} in {decl:?}")))?;
        let name = name.trim();
        match name.split_once('[') {
            Some((base, count)) => {
                let count = count
                    .strip_suffix(']')
                    .and_then(|n| n.trim().parse::<usize>().ok())
                    .ok_or_else(|| Error::Schema(format!("bad array size in {decl:?}")))?;
                for i in 0..count {
                    members.push(SchemaMember {
                        array_index: Some(i),
                        ..SchemaMember::new(base.trim(), ty)
                    });
                }
            }
            None => members.push(SchemaMember::new(name, ty)),
        }
    }
    Ok(members)
}

#[derive(Deserialize)]
struct SchemaDocument {
    classes: Vec<ClassDocument>,
    #[serde(default)]
    components: Vec<ComponentDocument>,
}

#[derive(Deserialize)]
struct ClassDocument {
    id: u32,
    name: String,
    #[serde(default)]
    parent: Option<u32>,
    #[serde(default)]
    members: String,
    #[serde(default)]
    enums: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    protected: Vec<String>,
}

#[derive(Deserialize)]
struct ComponentDocument {
    name: String,
    #[serde(default)]
    members: String,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub id: u32,
    pub name: String,
    pub parent: Option<u32>,
    /// Members declared by this class only, not its ancestors.
    pub members: Vec<SchemaMember>,
}

/// Object type id → ordered members, plus the routine components.
#[derive(Debug, Clone, Default)]
pub struct ClassSchema {
    classes: BTreeMap<u32, ClassDef>,
    components: BTreeMap<String, Vec<SchemaMember>>,
}

impl ClassSchema {
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(text)?;
        let mut schema = Self::default();
        for class in doc.classes {
            let mut members = parse_members(&class.members)
                .map_err(|e| Error::Schema(format!("class {}: {e}", class.name)))?;
            for m in &mut members {
                m.protected = class.protected.contains(&m.name);
                if m.ty == MemberType::Enum {
                    m.enum_values = class.enums.get(&m.name).cloned().unwrap_or_default();
                }
            }
            let def = ClassDef {
                id: class.id,
                name: class.name,
                parent: class.parent,
                members,
            };
            if let Some(old) = schema.classes.insert(def.id, def) {
                return Err(Error::Schema(format!("class id {} declared twice", old.id)));
            }
        }
        for component in doc.components {
            let members = parse_members(&component.members)
                .map_err(|e| Error::Schema(format!("component {}: {e}", component.name)))?;
            schema.components.insert(component.name, members);
        }
        for class in schema.classes.values() {
            if let Some(parent) = class.parent {
                if !schema.classes.contains_key(&parent) {
                    return Err(Error::Schema(format!(
                        "class {} has unknown parent {parent}",
                        class.name
                    )));
                }
            }
        }
        Ok(schema)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn class(&self, type_id: u32) -> Option<&ClassDef> {
        self.classes.get(&type_id)
    }

    pub fn type_name(&self, type_id: u32) -> Option<&str> {
        self.class(type_id).map(|c| c.name.as_str())
    }

    pub fn parent(&self, type_id: u32) -> Option<u32> {
        self.class(type_id)?.parent
    }

    /// `type_id` and its ancestors, base class first.
    pub fn class_chain(&self, type_id: u32) -> Vec<&ClassDef> {
        let mut chain = Vec::new();
        let mut next = Some(type_id);
        while let Some(id) = next {
            let Some(class) = self.class(id) else { break };
            if chain.iter().any(|c: &&ClassDef| c.id == id) {
                break;
            }
            chain.push(class);
            next = class.parent;
        }
        chain.reverse();
        chain
    }

    /// Ordered class members, base class first. Unknown ids have none.
    pub fn lookup(&self, type_id: u32) -> Vec<SchemaMember> {
        self.class_chain(type_id)
            .into_iter()
            .flat_map(|c| c.members.iter().cloned())
            .collect()
    }

    pub fn component(&self, name: &str) -> Option<&[SchemaMember]> {
        self.components.get(name).map(Vec::as_slice)
    }

    /// Whether a `Class_Routine` component applies to objects of `type_id`.
    pub fn component_allowed(&self, type_id: u32, component: &str) -> bool {
        let Some((class, _)) = component.split_once('_') else {
            return false;
        };
        self.class_chain(type_id).iter().any(|c| c.name == class)
    }

    /// Components that may be added to objects of `type_id`.
    pub fn components_for(&self, type_id: u32) -> Vec<&str> {
        self.components
            .keys()
            .filter(|name| self.component_allowed(type_id, name))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "classes": [
            { "id": 1, "name": "ZGEOM", "parent": null,
              "members": "STRING Routines, FLOAT Position[3]",
              "protected": ["Routines"] },
            { "id": 7, "name": "ZDOOR", "parent": 1,
              "members": "ENUM Mode, OBJREF Target",
              "enums": { "Mode": ["Closed", "Open"] } }
        ],
        "components": [
            { "name": "ZGEOM_Blink", "members": "FLOAT Rate, BOOL On" },
            { "name": "ZLIGHT_Flicker", "members": "INT Seed" }
        ]
    }"#;

    #[test]
    fn member_grammar_expands_arrays() {
        let members = parse_members("FLOAT Pos[3], INT Count").unwrap();
        assert_eq!(members.len(), 4);
        assert_eq!(members[2].label(), "Pos[2]");
        assert_eq!(members[3].ty.entry_type(), EntryType::Int);
    }

    #[test]
    fn member_grammar_rejects_junk() {
        assert!(parse_members("WIBBLE Name").is_err());
        assert!(parse_members("INT").is_err());
        assert!(parse_members("INT Pos[x]").is_err());
        assert!(parse_members("").unwrap().is_empty());
    }

    #[test]
    fn lookup_walks_parents_base_first() {
        let schema = ClassSchema::from_json(DOC).unwrap();
        let members = schema.lookup(7);
        let labels: Vec<_> = members.iter().map(SchemaMember::label).collect();
        assert_eq!(
            labels,
            ["Routines", "Position[0]", "Position[1]", "Position[2]", "Mode", "Target"]
        );
        assert!(members[0].protected);
        assert_eq!(members[4].enum_values, ["Closed", "Open"]);
        assert_eq!(schema.type_name(7), Some("ZDOOR"));
        assert_eq!(schema.parent(7), Some(1));
        assert!(schema.lookup(99).is_empty());
    }

    #[test]
    fn components_follow_class_chain() {
        let schema = ClassSchema::from_json(DOC).unwrap();
        assert!(schema.component_allowed(7, "ZGEOM_Blink"));
        assert!(!schema.component_allowed(7, "ZLIGHT_Flicker"));
        assert_eq!(schema.components_for(1), ["ZGEOM_Blink"]);
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(ClassSchema::from_json("{").is_err());
        let orphan = r#"{ "classes": [ { "id": 2, "name": "X", "parent": 5 } ] }"#;
        assert!(matches!(ClassSchema::from_json(orphan), Err(Error::Schema(_))));
    }
}
