//! Pathfinder room partitions stored in a DATA entry of the pathfinder object.
//!
//! Each room is a grid of blocks partitioned per Y layer by a binary tree.
//! Node indices are signed: `> 0` is an internal node in `nodes`, `0` means
//! no walkable geometry and `< 0` is a leaf at `leaf_nodes[-index]`.

use std::collections::HashSet;

use glam::Vec3;

use crate::cursor::{Cursor, Writer};
use crate::dbl::{DblList, DblValue};
use crate::error::{Error, Result};

/// Class id of the object holding the pathfinder buffer.
pub const PATHFINDER_CLASS: u32 = 111;
/// DBL entry of that object holding the buffer.
pub const PATHFINDER_ENTRY: usize = 14;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PfNode {
    /// Split direction; 0, 2, 5 and 7 split along Z, all others along X.
    pub comparison: u32,
    /// Split coordinate in blocks.
    pub value: i32,
    pub left: i32,
    pub right: i32,
}

impl PfNode {
    pub fn splits_z(&self) -> bool {
        matches!(self.comparison, 0 | 2 | 5 | 7)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PfLeafNode {
    pub center: Vec3,
    pub first_edge: u32,
    pub edge_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PfLayer {
    pub start_node_index: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PfLeafEdge {
    pub neighbor: u32,
    pub cost: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PfDoor {
    pub position: Vec3,
    pub leaf_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PfRoom {
    pub min_coords: Vec3,
    pub max_coords: Vec3,
    pub resolution: Vec3,
    pub label: String,
    pub nodes: Vec<PfNode>,
    pub leaf_nodes: Vec<PfLeafNode>,
    pub layers: Vec<PfLayer>,
    pub leaf_edges: Vec<PfLeafEdge>,
    pub kongs: Vec<Vec3>,
    pub doors: Vec<PfDoor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PfRoomInstance {
    pub name: String,
    pub room_index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PfDoorInstance {
    pub room_a: u32,
    pub door_a: u32,
    pub room_b: u32,
    pub door_b: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PfInfo {
    pub rooms: Vec<PfRoom>,
    pub room_instances: Vec<PfRoomInstance>,
    pub door_instances: Vec<PfDoorInstance>,
    pub last_value: u32,
}

/// A leaf reached by walking a layer's tree, with its block rectangle.
/// `x1`/`z1` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfCell {
    pub leaf: usize,
    pub layer: usize,
    pub x0: i32,
    pub z0: i32,
    pub x1: i32,
    pub z1: i32,
}

fn read_vec3(c: &mut Cursor<'_>) -> Result<Vec3> {
    Ok(Vec3::new(c.read_f32()?, c.read_f32()?, c.read_f32()?))
}

fn write_vec3(w: &mut Writer, v: Vec3) {
    w.write_f32(v.x);
    w.write_f32(v.y);
    w.write_f32(v.z);
}

fn write_counted<T>(w: &mut Writer, items: &[T], mut write: impl FnMut(&mut Writer, &T)) {
    w.write_u32(items.len() as u32);
    for item in items {
        write(w, item);
    }
}

impl PfRoom {
    fn read(c: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            min_coords: read_vec3(c)?,
            max_coords: read_vec3(c)?,
            resolution: read_vec3(c)?,
            label: c.read_cstring()?,
            nodes: c.read_counted(16, |c| {
                Ok(PfNode {
                    comparison: c.read_u32()?,
                    value: c.read_i32()?,
                    left: c.read_i32()?,
                    right: c.read_i32()?,
                })
            })?,
            leaf_nodes: c.read_counted(20, |c| {
                Ok(PfLeafNode {
                    center: read_vec3(c)?,
                    first_edge: c.read_u32()?,
                    edge_count: c.read_u32()?,
                })
            })?,
            layers: c.read_counted(4, |c| {
                Ok(PfLayer {
                    start_node_index: c.read_i32()?,
                })
            })?,
            leaf_edges: c.read_counted(8, |c| {
                Ok(PfLeafEdge {
                    neighbor: c.read_u32()?,
                    cost: c.read_f32()?,
                })
            })?,
            kongs: c.read_counted(12, read_vec3)?,
            doors: c.read_counted(16, |c| {
                Ok(PfDoor {
                    position: read_vec3(c)?,
                    leaf_index: c.read_u32()?,
                })
            })?,
        })
    }

    fn write(&self, w: &mut Writer) {
        write_vec3(w, self.min_coords);
        write_vec3(w, self.max_coords);
        write_vec3(w, self.resolution);
        w.write_cstring(&self.label);
        write_counted(w, &self.nodes, |w, n| {
            w.write_u32(n.comparison);
            w.write_i32(n.value);
            w.write_i32(n.left);
            w.write_i32(n.right);
        });
        write_counted(w, &self.leaf_nodes, |w, l| {
            write_vec3(w, l.center);
            w.write_u32(l.first_edge);
            w.write_u32(l.edge_count);
        });
        write_counted(w, &self.layers, |w, l| w.write_i32(l.start_node_index));
        write_counted(w, &self.leaf_edges, |w, e| {
            w.write_u32(e.neighbor);
            w.write_f32(e.cost);
        });
        write_counted(w, &self.kongs, |w, k| write_vec3(w, *k));
        write_counted(w, &self.doors, |w, d| {
            write_vec3(w, d.position);
            w.write_u32(d.leaf_index);
        });
    }

    /// Room size in blocks per axis, truncated.
    pub fn block_counts(&self) -> (i32, i32, i32) {
        let n = (self.max_coords - self.min_coords) / self.resolution;
        (n.x as i32, n.y as i32, n.z as i32)
    }

    /// Leaves of `layer`'s tree with their block rectangles.
    ///
    /// Out-of-range indices are skipped and each node is entered at most once,
    /// so corrupt trees terminate. A node reachable from two parents
    /// contributes its cells once, under the first parent visited.
    pub fn cells(&self, layer: usize) -> Vec<PfCell> {
        let mut cells = Vec::new();
        let Some(start) = self.layers.get(layer) else {
            return cells;
        };
        let (bx, _, bz) = self.block_counts();
        let mut visited = HashSet::new();
        let mut stack = vec![(start.start_node_index, 0, 0, bx, bz)];
        while let Some((index, x0, z0, x1, z1)) = stack.pop() {
            if index < 0 {
                let leaf = index.unsigned_abs() as usize;
                if leaf < self.leaf_nodes.len() {
                    cells.push(PfCell {
                        leaf,
                        layer,
                        x0,
                        z0,
                        x1,
                        z1,
                    });
                }
                continue;
            }
            if index == 0 || !visited.insert(index) {
                continue;
            }
            let Some(node) = self.nodes.get(index as usize) else {
                continue;
            };
            // Pushed right first so the lower half comes out first.
            if node.splits_z() {
                stack.push((node.right, x0, node.value, x1, z1));
                stack.push((node.left, x0, z0, x1, node.value));
            } else {
                stack.push((node.right, node.value, z0, x1, z1));
                stack.push((node.left, x0, z0, node.value, z1));
            }
        }
        cells
    }

    /// World-space box of a cell.
    pub fn cell_bounds(&self, cell: &PfCell) -> (Vec3, Vec3) {
        let lo = Vec3::new(cell.x0 as f32, cell.layer as f32, cell.z0 as f32);
        let hi = Vec3::new(cell.x1 as f32, cell.layer as f32 + 1.0, cell.z1 as f32);
        (
            self.min_coords + lo * self.resolution,
            self.min_coords + hi * self.resolution,
        )
    }

    /// Leaf edges leaving `leaf`, clipped to the edge array.
    pub fn neighbors(&self, leaf: usize) -> &[PfLeafEdge] {
        let Some(l) = self.leaf_nodes.get(leaf) else {
            return &[];
        };
        let start = (l.first_edge as usize).min(self.leaf_edges.len());
        let end = start
            .saturating_add(l.edge_count as usize)
            .min(self.leaf_edges.len());
        &self.leaf_edges[start..end]
    }

    /// Move the room so its minimum corner is `min`; the maximum corner
    /// moves with it.
    pub fn translate_to(&mut self, min: Vec3) {
        self.max_coords += min - self.min_coords;
        self.min_coords = min;
    }
}

impl PfInfo {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(data);
        let info = Self {
            rooms: c.read_counted(40, PfRoom::read)?,
            room_instances: c.read_counted(5, |c| {
                Ok(PfRoomInstance {
                    name: c.read_cstring()?,
                    room_index: c.read_u32()?,
                })
            })?,
            door_instances: c.read_counted(16, |c| {
                Ok(PfDoorInstance {
                    room_a: c.read_u32()?,
                    door_a: c.read_u32()?,
                    room_b: c.read_u32()?,
                    door_b: c.read_u32()?,
                })
            })?,
            last_value: c.read_u32()?,
        };
        if !c.is_empty() {
            return Err(Error::TrailingData {
                offset: c.position(),
                extra: c.remaining(),
            });
        }
        Ok(info)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(self.rooms.len() as u32);
        for room in &self.rooms {
            room.write(&mut w);
        }
        write_counted(&mut w, &self.room_instances, |w, r| {
            w.write_cstring(&r.name);
            w.write_u32(r.room_index);
        });
        write_counted(&mut w, &self.door_instances, |w, d| {
            w.write_u32(d.room_a);
            w.write_u32(d.door_a);
            w.write_u32(d.room_b);
            w.write_u32(d.door_b);
        });
        w.write_u32(self.last_value);
        w.into_bytes()
    }

    /// Read the buffer out of a pathfinder object's DBL list.
    pub fn from_dbl(dbl: &DblList) -> Result<Self> {
        let data = dbl
            .entries
            .get(PATHFINDER_ENTRY)
            .and_then(|e| e.value.as_data())
            .ok_or_else(|| Error::Parse {
                context: "pathfinder",
                message: format!("entry {PATHFINDER_ENTRY} is not a DATA entry"),
            })?;
        Self::from_bytes(data)
    }

    pub fn store_in(&self, dbl: &mut DblList) -> Result<()> {
        let entry = dbl
            .entries
            .get_mut(PATHFINDER_ENTRY)
            .filter(|e| matches!(e.value, DblValue::Data(_)))
            .ok_or_else(|| Error::Parse {
                context: "pathfinder",
                message: format!("entry {PATHFINDER_ENTRY} is not a DATA entry"),
            })?;
        entry.value = DblValue::Data(self.to_bytes());
        Ok(())
    }

    /// Append a single-leaf room of `blocks` (x, y, z) cells of size
    /// `resolution` and an instance of it. Returns the new room's index.
    pub fn add_room(&mut self, resolution: Vec3, blocks: [i32; 3]) -> usize {
        let [bx, by, bz] = blocks;
        let split_x = PfNode {
            comparison: 1,
            value: bx,
            left: 3,
            right: 0,
        };
        let split_z = PfNode {
            comparison: 2,
            value: bz,
            left: -2,
            right: 0,
        };
        let leaf = PfLeafNode {
            center: Vec3::new(bx as f32 / 2.0, 1.0, bz as f32 / 2.0),
            ..PfLeafNode::default()
        };
        let mut layers = vec![PfLayer::default(); by.max(2) as usize];
        layers[1].start_node_index = 2;
        let index = self.rooms.len();
        self.rooms.push(PfRoom {
            min_coords: Vec3::ZERO,
            max_coords: Vec3::new(bx as f32, by as f32, bz as f32) * resolution,
            resolution,
            label: "huh".into(),
            nodes: vec![PfNode::default(), PfNode::default(), split_x, split_z],
            leaf_nodes: vec![PfLeafNode::default(), PfLeafNode::default(), leaf],
            layers,
            ..PfRoom::default()
        });
        self.room_instances.push(PfRoomInstance {
            name: "New room instance".into(),
            room_index: index as u32,
        });
        index
    }
}
