//! Reader/writer for chunked scene packs.
//!
//! Layered like the container itself:
//! - **Layer 1** (`cursor`, `chunk`): raw tagged chunk I/O
//! - **Layer 2** (`dbl`, `audio`, `mesh`, `pathfinder`, `texture`): typed payloads
//! - **Layer 3** (`object`, `scene`, `copy`, `export`): the editable scene model

pub mod arena;
pub mod audio;
pub mod chunk;
pub mod copy;
pub mod cursor;
pub mod dbl;
pub mod error;
pub mod export;
pub mod mesh;
pub mod object;
pub mod pathfinder;
pub mod scene;
pub mod texture;

pub use chunk::Chunk;
pub use error::{Error, Result};
pub use object::{GameObject, ObjId, ObjectGraph};
pub use scene::SceneStore;
