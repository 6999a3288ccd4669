//! Text output for the inspection commands.

use scenepack::dbl::{bind, member_layout, script_layout, ClassSchema, DblList, DblValue};
use scenepack::pathfinder::PfInfo;
use scenepack::{ObjId, SceneStore};

pub fn print_tree(scene: &SceneStore, schema: &ClassSchema, id: ObjId, depth: usize) {
    let Some(object) = scene.graph.get(id) else {
        return;
    };
    let class = schema.type_name(object.type_id).unwrap_or("?");
    let refs = scene.graph.ref_count(id);
    let mut notes = String::new();
    if object.mesh.is_some() {
        notes.push_str(" [mesh]");
    }
    if refs > 0 {
        notes.push_str(&format!(" [{refs} ref(s)]"));
    }
    println!("{:indent$}{} ({class}){notes}", "", object.name, indent = depth * 2);
    for child in &object.children {
        print_tree(scene, schema, *child, depth + 1);
    }
}

fn value_text(scene: &SceneStore, value: &DblValue) -> String {
    match value {
        DblValue::ObjRef(Some(id)) => format!("-> {}", scene.graph.path(*id)),
        DblValue::ObjRefList(list) => {
            let paths: Vec<String> = list
                .iter()
                .map(|r| r.map_or_else(|| "null".to_string(), |id| scene.graph.path(id)))
                .collect();
            format!("[{}]", paths.join(", "))
        }
        DblValue::Sound(r) if !r.is_null() => {
            let name = scene.audio.name(r.id).unwrap_or("?");
            let kind = scene.audio.get(r.id).map_or("empty", |o| o.kind_name());
            format!("sound {name:?} ({kind})")
        }
        DblValue::Message(id) if *id != 0 => match scene.messages.get(id) {
            Some((name, _)) => format!("message {name:?}"),
            None => format!("message {id} (undefined)"),
        },
        other => other.to_string(),
    }
}

fn print_list(scene: &SceneStore, dbl: &DblList, labels: &[String], depth: usize) {
    for (entry, label) in dbl.entries.iter().zip(labels) {
        println!(
            "{:indent$}{label} = {}",
            "",
            value_text(scene, &entry.value),
            indent = depth * 2
        );
        if let DblValue::Nested(nested) = &entry.value {
            let labels: Vec<String> = match script_layout(nested) {
                Ok(members) if members.len() == nested.entries.len() => {
                    members.iter().map(|m| m.label()).collect()
                }
                _ => (0..nested.entries.len()).map(|i| format!("#{i}")).collect(),
            };
            print_list(scene, nested, &labels, depth + 1);
        }
    }
}

pub fn print_props(scene: &SceneStore, schema: &ClassSchema, id: ObjId) {
    let Some(object) = scene.graph.get(id) else {
        return;
    };
    println!("{}", scene.graph.path(id));
    println!(
        "  class {} ({}), flags {:#x}, color {:#010x}",
        object.type_id,
        schema.type_name(object.type_id).unwrap_or("unknown"),
        object.flags,
        object.color
    );
    let position = scene.graph.global_transform(id).w_axis;
    println!("  world position ({}, {}, {})", position.x, position.y, position.z);
    if let Some(mesh) = &object.mesh {
        println!(
            "  mesh: {} vertices, {} triangles, {} quads",
            mesh.vertex_count(),
            mesh.tri_count(),
            mesh.quad_count()
        );
    }
    let referrers = scene.graph.referrers(id);
    if !referrers.is_empty() {
        let paths: Vec<String> = referrers.iter().map(|r| scene.graph.path(*r)).collect();
        println!("  referenced by {}", paths.join(", "));
    }

    let layout = member_layout(schema, object.type_id, &object.dbl);
    for c in &layout.components {
        println!("  routine {} {} (entries {}..{})", c.name, c.number, c.start, c.start + c.len);
    }
    let binding = bind(&object.dbl, &layout);
    if let Some(mismatch) = binding.mismatch() {
        println!("  {mismatch}");
    }
    print_list(scene, &object.dbl, &binding.labels, 1);
}

pub fn print_pathfinder(path: &str, info: &PfInfo) {
    println!("{path}: {} room(s), {} door link(s)", info.rooms.len(), info.door_instances.len());
    for instance in &info.room_instances {
        println!("  instance {:?} of room {}", instance.name, instance.room_index);
    }
    for (i, room) in info.rooms.iter().enumerate() {
        let (bx, by, bz) = room.block_counts();
        println!(
            "  room {i} {:?}: {bx}x{by}x{bz} blocks, {} node(s), {} leaf(s), {} door(s)",
            room.label,
            room.nodes.len(),
            room.leaf_nodes.len(),
            room.doors.len()
        );
        for layer in 0..room.layers.len() {
            let cells = room.cells(layer);
            if cells.is_empty() {
                continue;
            }
            println!("    layer {layer}: {} cell(s)", cells.len());
            for cell in cells {
                println!(
                    "      leaf {} x {}..{} z {}..{}, {} neighbor(s)",
                    cell.leaf,
                    cell.x0,
                    cell.x1,
                    cell.z0,
                    cell.z1,
                    room.neighbors(cell.leaf).len()
                );
            }
        }
    }
}
