mod classes;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scenepack::copy::copy_to_scene;
use scenepack::dbl::ClassSchema;
use scenepack::scene::read_streams;
use scenepack::texture::{conformance, texture_rgba, uses_transparency, Conformance};
use scenepack::{Chunk, ObjId, SceneStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scenepack", about = "Inspect and edit scene pack archives")]
struct Cli {
    /// Path to the class schema (default: search for classes.json).
    #[arg(long, global = true)]
    classes: Option<PathBuf>,
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a scene archive.
    Info { scene: PathBuf },
    /// Print the object tree.
    Tree { scene: PathBuf },
    /// Print the chunk structure of every pack stream.
    Chunks { scene: PathBuf },
    /// Print an object's properties named by the class schema.
    Props { scene: PathBuf, path: String },
    /// Duplicate an object with its subtree next to itself.
    Duplicate {
        scene: PathBuf,
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object with its subtree.
    Delete {
        scene: PathBuf,
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Move an object under a new parent.
    Move {
        scene: PathBuf,
        path: String,
        new_parent: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy an object with its subtree into another scene.
    Copy {
        scene: PathBuf,
        path: String,
        /// Scene receiving the copy.
        dest: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a texture to a PNG file.
    ExportTexture {
        scene: PathBuf,
        id: u32,
        png: PathBuf,
    },
    /// Import a PNG file as a new texture, or over an existing one.
    ImportTexture {
        scene: PathBuf,
        png: PathBuf,
        /// Texture name (default: the file stem).
        #[arg(long)]
        name: Option<String>,
        /// Replace the pixels of this texture id instead of adding one.
        #[arg(long)]
        replace: Option<u32>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write an object's image member to a PNG file.
    ExportImage {
        scene: PathBuf,
        path: String,
        /// Index of the member's DATA entry.
        entry: usize,
        /// Output file (default: the member's name with a .png extension).
        png: Option<PathBuf>,
    },
    /// Replace an object's image member with a PNG file.
    ImportImage {
        scene: PathBuf,
        path: String,
        /// Index of the member's DATA entry.
        entry: usize,
        png: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the scene tree as JSON for model exporters.
    ExportTree { scene: PathBuf, json: PathBuf },
    /// Print the pathfinder rooms of a scene.
    Pathfinder {
        scene: PathBuf,
        /// Only this pathfinder object.
        path: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_scene(path: &Path) -> Result<SceneStore> {
    SceneStore::load(path).with_context(|| format!("failed to load scene: {}", path.display()))
}

fn save_scene(scene: &SceneStore, input: &Path, output: Option<&Path>) -> Result<()> {
    let path = output.unwrap_or(input);
    scene
        .save(path)
        .with_context(|| format!("failed to save scene: {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn find_object(scene: &SceneStore, path: &str) -> Result<ObjId> {
    let top = scene.graph.super_root();
    match scene.graph.find_by_path(top, path) {
        Some(id) if id != top => Ok(id),
        _ => bail!("no object at path {path:?}"),
    }
}

fn cmd_info(scene_path: &Path) -> Result<()> {
    let scene = load_scene(scene_path)?;
    println!("Scene:     {}", scene_path.display());
    println!("Objects:   {}", scene.graph.len());
    if let Some(root) = scene.graph.root() {
        println!("Root:      {}", scene.graph.path(root));
    }
    println!(
        "Textures:  {} palette, {} light",
        scene.pal_pack.subchunks.len(),
        scene.lgt_pack.subchunks.len()
    );
    println!(
        "Audio:     {} slot(s), {} wave(s)",
        scene.audio.slot_count() - 1,
        scene.audio.wave_count()
    );
    println!("Messages:  {}", scene.messages.len());
    println!("EXC:       {}", scene.exc_pack.subchunks.len());
    if let Some(z) = &scene.graph.zdefines {
        println!("ZDefines:  {} entries", z.values.entries.len());
    }
    for (name, bytes) in &scene.extra_streams {
        println!("Extra:     {name} ({} bytes)", bytes.len());
    }
    Ok(())
}

fn cmd_tree(scene_path: &Path, schema: &ClassSchema) -> Result<()> {
    let scene = load_scene(scene_path)?;
    for top in scene.graph.children(scene.graph.super_root()) {
        render::print_tree(&scene, schema, *top, 0);
    }
    Ok(())
}

fn print_chunk(chunk: &Chunk, depth: usize) {
    println!(
        "{:indent$}{} main={} multi={} sub={}",
        "",
        chunk.tag_str(),
        chunk.main_data.len(),
        chunk.multi_data.len(),
        chunk.subchunks.len(),
        indent = depth * 2
    );
    // Long texture and mesh lists are summarized by their counts.
    if depth < 3 {
        for sub in &chunk.subchunks {
            print_chunk(sub, depth + 1);
        }
    }
}

fn cmd_chunks(scene_path: &Path) -> Result<()> {
    let data = std::fs::read(scene_path)
        .with_context(|| format!("failed to read {}", scene_path.display()))?;
    for (name, bytes) in read_streams(&data)? {
        if !name.starts_with("Pack.") {
            println!("{name}: {} bytes (not a pack)", bytes.len());
            continue;
        }
        let chunk = Chunk::parse(&bytes).with_context(|| format!("failed to parse {name}"))?;
        println!("{name}:");
        print_chunk(&chunk, 1);
    }
    Ok(())
}

fn cmd_props(scene_path: &Path, path: &str, schema: &ClassSchema) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    render::print_props(&scene, schema, id);
    Ok(())
}

fn cmd_duplicate(scene_path: &Path, path: &str, output: Option<&Path>) -> Result<()> {
    let mut scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    let copy = scene.graph.duplicate(id)?;
    println!("{}", scene.graph.path(copy));
    save_scene(&scene, scene_path, output)
}

fn cmd_delete(scene_path: &Path, path: &str, output: Option<&Path>) -> Result<()> {
    let mut scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    if let Err(err) = scene.graph.delete(id) {
        for referrer in scene.graph.referrers(id) {
            eprintln!("  referenced by {}", scene.graph.path(referrer));
        }
        return Err(err).with_context(|| format!("cannot delete {path}"));
    }
    save_scene(&scene, scene_path, output)
}

fn cmd_move(scene_path: &Path, path: &str, new_parent: &str, output: Option<&Path>) -> Result<()> {
    let mut scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    let parent = find_object(&scene, new_parent)?;
    scene
        .graph
        .reparent(id, parent)
        .with_context(|| format!("cannot move {path} under {new_parent}"))?;
    println!("{}", scene.graph.path(id));
    save_scene(&scene, scene_path, output)
}

fn cmd_copy(scene_path: &Path, path: &str, dest_path: &Path, output: Option<&Path>) -> Result<()> {
    let src = load_scene(scene_path)?;
    let mut dest = load_scene(dest_path)?;
    let id = find_object(&src, path)?;
    let copy = copy_to_scene(&src, &mut dest, id)
        .with_context(|| format!("cannot copy {path} into {}", dest_path.display()))?;
    println!("{}", dest.graph.path(copy));
    save_scene(&dest, dest_path, output)
}

fn cmd_export_texture(scene_path: &Path, id: u32, png: &Path) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let Some((chunk, _)) = scene.find_texture(id) else {
        bail!("no texture with id {id}");
    };
    let image = texture_rgba(chunk).with_context(|| format!("failed to decode texture {id}"))?;
    image
        .save(png)
        .with_context(|| format!("failed to write {}", png.display()))?;
    if uses_transparency(chunk)? {
        info!("texture {id} has transparent pixels");
    }
    Ok(())
}

fn cmd_import_texture(
    scene_path: &Path,
    png: &Path,
    name: Option<&str>,
    replace: Option<u32>,
    output: Option<&Path>,
) -> Result<()> {
    let mut scene = load_scene(scene_path)?;
    let image = image::open(png)
        .with_context(|| format!("failed to read {}", png.display()))?
        .to_rgba8();
    match conformance(image.width(), image.height()) {
        Conformance::Conforming => {}
        Conformance::NotPowerOfTwo => warn!(
            "{}x{} is not a power of two; some renderers will rescale it",
            image.width(),
            image.height()
        ),
        Conformance::NotMultipleOfFour => warn!(
            "{}x{} is not a multiple of 4; DXT compression pads it",
            image.width(),
            image.height()
        ),
    }
    let id = match replace {
        Some(id) => {
            scene.replace_texture(id, &image)?;
            id
        }
        None => {
            let stem = png.file_stem().map(|s| s.to_string_lossy().into_owned());
            let name = name.map(str::to_string).or(stem).unwrap_or_default();
            scene.add_texture(&image, &name)
        }
    };
    println!("texture {id}");
    save_scene(&scene, scene_path, output)
}

fn cmd_export_image(scene_path: &Path, path: &str, entry: usize, png: Option<&Path>) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    let image = scene
        .export_dbl_image(id, entry)
        .with_context(|| format!("failed to decode image {entry} of {path}"))?;
    let png = match png {
        Some(png) => png.to_path_buf(),
        None => {
            let name = scene.dbl_image_name(id, entry).unwrap_or_default();
            let stem = Path::new(name).file_stem().map(|s| s.to_string_lossy().into_owned());
            PathBuf::from(format!("{}.png", stem.unwrap_or_else(|| format!("image{entry}"))))
        }
    };
    image
        .save(&png)
        .with_context(|| format!("failed to write {}", png.display()))?;
    println!("{}", png.display());
    Ok(())
}

fn cmd_import_image(
    scene_path: &Path,
    path: &str,
    entry: usize,
    png: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let mut scene = load_scene(scene_path)?;
    let id = find_object(&scene, path)?;
    let image = image::open(png)
        .with_context(|| format!("failed to read {}", png.display()))?
        .to_rgba8();
    scene
        .import_dbl_image(id, entry, &image)
        .with_context(|| format!("cannot store image {entry} of {path}"))?;
    save_scene(&scene, scene_path, output)
}

fn cmd_export_tree(scene_path: &Path, json: &Path) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let tree = scenepack::export::export_tree(&scene);
    let text = serde_json::to_string_pretty(&tree)?;
    std::fs::write(json, text).with_context(|| format!("failed to write {}", json.display()))?;
    Ok(())
}

fn cmd_pathfinder(scene_path: &Path, path: Option<&str>) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let objects = match path {
        Some(path) => vec![find_object(&scene, path)?],
        None => scene.pathfinder_objects(),
    };
    if objects.is_empty() {
        println!("no pathfinder objects");
    }
    for id in objects {
        let info = scene
            .pathfinder(id)
            .with_context(|| format!("failed to read pathfinder of {}", scene.graph.path(id)))?;
        render::print_pathfinder(&scene.graph.path(id), &info);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let classes_path = classes::resolve(cli.classes.as_deref())?;
    let schema = ClassSchema::load(&classes_path)
        .with_context(|| format!("failed to read class schema: {}", classes_path.display()))?;

    match cli.command {
        Command::Info { scene } => cmd_info(&scene),
        Command::Tree { scene } => cmd_tree(&scene, &schema),
        Command::Chunks { scene } => cmd_chunks(&scene),
        Command::Props { scene, path } => cmd_props(&scene, &path, &schema),
        Command::Duplicate {
            scene,
            path,
            output,
        } => cmd_duplicate(&scene, &path, output.as_deref()),
        Command::Delete {
            scene,
            path,
            output,
        } => cmd_delete(&scene, &path, output.as_deref()),
        Command::Move {
            scene,
            path,
            new_parent,
            output,
        } => cmd_move(&scene, &path, &new_parent, output.as_deref()),
        Command::Copy {
            scene,
            path,
            dest,
            output,
        } => cmd_copy(&scene, &path, &dest, output.as_deref()),
        Command::ExportTexture { scene, id, png } => cmd_export_texture(&scene, id, &png),
        Command::ImportTexture {
            scene,
            png,
            name,
            replace,
            output,
        } => cmd_import_texture(&scene, &png, name.as_deref(), replace, output.as_deref()),
        Command::ExportImage {
            scene,
            path,
            entry,
            png,
        } => cmd_export_image(&scene, &path, entry, png.as_deref()),
        Command::ImportImage {
            scene,
            path,
            entry,
            png,
            output,
        } => cmd_import_image(&scene, &path, entry, &png, output.as_deref()),
        Command::ExportTree { scene, json } => cmd_export_tree(&scene, &json),
        Command::Pathfinder { scene, path } => cmd_pathfinder(&scene, path.as_deref()),
    }
}
