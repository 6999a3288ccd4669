use glam::Vec3;
use scenepack::audio::{AudioObject, AudioRef, Sound};
use scenepack::copy::copy_to_scene;
use scenepack::dbl::{bind, member_layout, ClassSchema, DblEntry, DblValue};
use scenepack::object::ZDefines;
use scenepack::pathfinder::{PfInfo, PATHFINDER_CLASS, PATHFINDER_ENTRY};
use scenepack::{Error, GameObject, ObjId, SceneStore};

const CLASSES: &str = r#"{
    "classes": [
        { "id": 1, "name": "ZGEOM", "members": "STRING Routines, FLOAT Scale[3]" },
        { "id": 2, "name": "ZDOOR", "parent": 1, "members": "OBJREF Partner, SOUNDREF Creak" }
    ],
    "components": [ { "name": "ZGEOM_Blink", "members": "FLOAT Rate, BOOL On" } ]
}"#;

/// Root/{doors/{door1, door2 → door1}, lamp}
fn sample(schema: &ClassSchema) -> (SceneStore, ObjId, ObjId) {
    let mut scene = SceneStore::empty();
    let top = scene.graph.super_root();
    let root = scene.graph.create(top, 1, "Root", schema).unwrap();
    let doors = scene.graph.create(root, 1, "doors", schema).unwrap();
    let door1 = scene.graph.create(doors, 2, "door1", schema).unwrap();
    let door2 = scene.graph.create(doors, 2, "door2", schema).unwrap();
    scene.graph.create(root, 1, "lamp", schema).unwrap();

    let creak = scene.add_wave("creak.wav", b"RIFF creak".to_vec());
    let sound = scene.audio.push(
        "Creak",
        AudioObject::Sound(Sound {
            wave: AudioRef { id: creak },
            ..Sound::default()
        }),
    );
    let dbl = &mut scene.graph.get_mut(door2).unwrap().dbl;
    dbl.entries[4].value = DblValue::ObjRef(Some(door1));
    dbl.entries[5].value = DblValue::Sound(AudioRef { id: sound });
    (scene, door1, door2)
}

#[test]
fn scene_survives_a_save_to_disk() {
    let schema = ClassSchema::from_json(CLASSES).unwrap();
    let (mut scene, door1, _) = sample(&schema);
    scene.messages.insert(1, ("Open".into(), "".into()));
    scene.graph.zdefines = Some(ZDefines {
        types: "OBJREF Spawn".into(),
        values: scenepack::dbl::DblList {
            flags: 0,
            entries: vec![DblEntry::new(DblValue::ObjRef(Some(door1)))],
        },
    });
    let root = scene.graph.root().unwrap();
    let lamp = scene.graph.find_by_path(root, "lamp").unwrap();
    scene
        .graph
        .get_mut(lamp)
        .unwrap()
        .dbl
        .entries
        .push(DblEntry::new(DblValue::Unknown {
            code: 14,
            raw: vec![1, 2, 3],
        }));
    let image = image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 255]));
    let tex = scene.add_texture(&image, "brick");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("level.zip");
    scene.save(&path).unwrap();
    let loaded = SceneStore::load(&path).unwrap();

    assert_eq!(loaded.graph.len(), 5);
    let root = loaded.graph.root().unwrap();
    let door1 = loaded.graph.find_by_path(root, "doors/door1").unwrap();
    let door2 = loaded.graph.find_by_path(root, "doors/door2").unwrap();
    assert_eq!(loaded.graph.get(door2).unwrap().dbl.object_refs(), vec![door1]);
    // One from door2, one from the ZDefines list.
    assert_eq!(loaded.graph.ref_count(door1), 2);
    assert_eq!(loaded.graph.referrers(door1), vec![door2]);

    let lamp = loaded.graph.find_by_path(root, "lamp").unwrap();
    assert_eq!(
        loaded.graph.get(lamp).unwrap().dbl.entries.last().unwrap().value,
        DblValue::Unknown {
            code: 14,
            raw: vec![1, 2, 3]
        }
    );
    let creak = loaded.audio.find_by_name("creak.wav").unwrap();
    assert_eq!(loaded.wave_data(creak), Some(&b"RIFF creak"[..]));
    assert_eq!(loaded.messages[&1].0, "Open");
    assert_eq!(loaded.num_textures, tex);
    assert!(loaded.find_texture(tex).unwrap().1.is_some());

    let layout = member_layout(&schema, 2, &loaded.graph.get(door2).unwrap().dbl);
    let binding = bind(&loaded.graph.get(door2).unwrap().dbl, &layout);
    assert!(binding.is_bound());
    assert_eq!(binding.labels[4], "Partner");
}

#[test]
fn copy_with_outside_reference_changes_nothing() {
    let schema = ClassSchema::from_json(CLASSES).unwrap();
    let (src, _, door2) = sample(&schema);
    let (mut dest, _, _) = sample(&schema);
    let before = dest.graph.len();
    let slots = dest.audio.slot_count();

    let err = copy_to_scene(&src, &mut dest, door2).unwrap_err();
    assert!(matches!(err, Error::ReferenceOutOfScope { .. }));
    assert!(err.to_string().contains("Root/doors/door1"));
    assert_eq!(dest.graph.len(), before);
    assert_eq!(dest.audio.slot_count(), slots);
}

#[test]
fn copied_wave_lands_between_existing_waves() {
    let schema = ClassSchema::from_json(CLASSES).unwrap();
    let (src, _, door2) = sample(&schema);
    let mut dest = SceneStore::empty();
    let top = dest.graph.super_root();
    dest.graph.create(top, 1, "Root", &schema).unwrap();
    let wind = dest.add_wave("wind.wav", b"wind".to_vec());
    // Named but empty slot, filled by the copy.
    dest.audio.set_name(2, "creak.wav");
    let rain = dest.add_wave("rain.wav", b"rain".to_vec());
    assert_eq!(rain, 3);

    let doors = src.graph.parent(door2).unwrap();
    copy_to_scene(&src, &mut dest, doors).unwrap();

    assert_eq!(dest.audio.find_by_name("creak.wav"), Some(2));
    assert_eq!(dest.audio.wave_index(2), Some(1));
    assert_eq!(dest.wav_pack.subchunks.len(), 3);
    let saved = SceneStore::from_zip_bytes(&dest.to_zip_bytes().unwrap()).unwrap();
    for scene in [&dest, &saved] {
        assert_eq!(scene.wave_data(wind), Some(&b"wind"[..]));
        assert_eq!(scene.wave_data(2), Some(&b"RIFF creak"[..]));
        assert_eq!(scene.wave_data(rain), Some(&b"rain"[..]));
    }
    let creak = dest.audio.find_by_name("Creak").unwrap();
    let Some(AudioObject::Sound(s)) = dest.audio.get(creak) else {
        panic!("expected a sound");
    };
    assert_eq!(s.wave, AudioRef { id: 2 });
}

#[test]
fn copying_a_wave_lines_up_its_payload() {
    let schema = ClassSchema::from_json(CLASSES).unwrap();
    let (src, _, _) = sample(&schema);
    let mut dest = SceneStore::empty();
    let top = dest.graph.super_root();
    dest.graph.create(top, 1, "Root", &schema).unwrap();
    let other = dest.add_wave("wind.wav", b"wind".to_vec());

    let doors = src
        .graph
        .find_by_path(src.graph.root().unwrap(), "doors")
        .unwrap();
    let copy = copy_to_scene(&src, &mut dest, doors).unwrap();
    assert_eq!(dest.graph.path(copy), "Root/doors");

    // Sound "Creak" and wave "creak.wav" are new in the destination.
    assert_eq!(dest.audio.slot_count(), 4);
    assert_eq!(dest.wav_pack.subchunks.len(), 2);
    let creak = dest.audio.find_by_name("creak.wav").unwrap();
    assert_eq!(dest.wave_data(creak), Some(&b"RIFF creak"[..]));
    assert_eq!(dest.wave_data(other), Some(&b"wind"[..]));

    let door2 = dest.graph.find_by_path(copy, "door2").unwrap();
    let door1 = dest.graph.find_by_path(copy, "door1").unwrap();
    let dbl = &dest.graph.get(door2).unwrap().dbl;
    assert_eq!(dbl.entries[4].value, DblValue::ObjRef(Some(door1)));
    let DblValue::Sound(sound) = dbl.entries[5].value else {
        panic!("expected a sound reference");
    };
    assert_eq!(dest.audio.name(sound.id), Some("Creak"));
    let Some(AudioObject::Sound(s)) = dest.audio.get(sound.id) else {
        panic!("expected a sound");
    };
    assert_eq!(s.wave, AudioRef { id: creak });
}

#[test]
fn duplicate_then_delete_restores_the_tree() {
    let schema = ClassSchema::from_json(CLASSES).unwrap();
    let (mut scene, door1, door2) = sample(&schema);
    let doors = scene.graph.parent(door1).unwrap();

    let copy = scene.graph.duplicate(doors).unwrap();
    assert_eq!(scene.graph.path(copy), "Root/doors1");
    let copy1 = scene.graph.find_by_path(copy, "door1").unwrap();
    let copy2 = scene.graph.find_by_path(copy, "door2").unwrap();
    assert_eq!(scene.graph.get(copy2).unwrap().dbl.object_refs(), vec![copy1]);
    assert_eq!(scene.graph.ref_count(door1), 1);

    // The copy's door1 is still referenced from inside its own subtree only.
    assert!(matches!(
        scene.graph.delete(copy1),
        Err(Error::ReferencedObject { count: 1, .. })
    ));
    scene.graph.delete(copy).unwrap();
    assert_eq!(scene.graph.len(), 5);
    assert_eq!(scene.graph.get(door2).unwrap().dbl.object_refs(), vec![door1]);
}

#[test]
fn pathfinder_room_is_stored_in_its_object() {
    let mut scene = SceneStore::empty();
    let top = scene.graph.super_root();
    let root = scene.graph.add_child(top, GameObject::new(1, "Root")).unwrap();
    let mut pf = GameObject::new(PATHFINDER_CLASS, "pathfinder");
    pf.dbl.entries = (0..=PATHFINDER_ENTRY)
        .map(|_| DblEntry::new(DblValue::Int(0)))
        .collect();
    pf.dbl.entries[PATHFINDER_ENTRY].value = DblValue::Data(PfInfo::default().to_bytes());
    let pf = scene.graph.add_child(root, pf).unwrap();
    assert_eq!(scene.pathfinder_objects(), vec![pf]);

    let mut info = scene.pathfinder(pf).unwrap();
    let room = info.add_room(Vec3::splat(10.0), [4, 2, 4]);
    scene.set_pathfinder(pf, &info).unwrap();

    let loaded = SceneStore::from_zip_bytes(&scene.to_zip_bytes().unwrap()).unwrap();
    let pf = loaded.pathfinder_objects()[0];
    let back = loaded.pathfinder(pf).unwrap();
    assert_eq!(back, info);
    assert_eq!(back.rooms[room].cells(1).len(), 1);
}
