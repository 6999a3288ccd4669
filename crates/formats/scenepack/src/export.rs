//! JSON description of the scene tree for external model exporters.

use std::path::Path;

use glam::{Mat4, Vec4};
use serde_json::{json, Map, Value};

use crate::object::ObjId;
use crate::scene::SceneStore;

/// The tree under the super-root, keeping only objects that have a mesh or
/// children. Mesh entries name the `.glb` file an exporter should write for
/// that object, relative to its output directory.
pub fn export_tree(scene: &SceneStore) -> Value {
    export_object(scene, scene.graph.super_root()).unwrap_or(Value::Null)
}

fn export_object(scene: &SceneStore, id: ObjId) -> Option<Value> {
    let graph = &scene.graph;
    let object = graph.get(id)?;
    if object.mesh.is_none() && object.children.is_empty() {
        return None;
    }
    let path = graph.path(id);
    let mut out = Map::new();
    out.insert("name".into(), json!(object.name));
    out.insert("path".into(), json!(path));
    out.insert("transform".into(), transform(&object.matrix));
    if object.mesh.is_some() {
        let file = Path::new(&path).with_extension("glb");
        out.insert("mesh".into(), json!(file.to_string_lossy()));
    }
    let children: Vec<Value> = object
        .children
        .iter()
        .filter_map(|c| export_object(scene, *c))
        .collect();
    if !children.is_empty() {
        out.insert("children".into(), Value::Array(children));
    }
    Some(Value::Object(out))
}

fn axis(v: Vec4) -> Value {
    json!({ "x": v.x, "y": v.y, "z": v.z, "w": v.w })
}

fn transform(m: &Mat4) -> Value {
    json!({
        "rotation": {
            "xAxis": axis(m.x_axis),
            "yAxis": axis(m.y_axis),
            "zAxis": axis(m.z_axis),
        },
        "position": axis(m.w_axis),
    })
}
