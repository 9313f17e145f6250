//! Scene layouts: the blocks and slots a run starts from.
//!
//! A layout is either one of the built-in presets or a TOML file:
//!
//! ```toml
//! [[blocks]]
//! id = "r"
//! position = [0.65, 0.0, 0.02]
//!
//! [[slots]]
//! id = "s1"
//! position = [0.45, -0.25, 0.02]
//! ```
//!
//! Preset xy noise is drawn from a seeded [`StdRng`] so runs are reproducible.

use std::collections::BTreeSet;
use std::path::Path;

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::world::{EntityId, Slot};

/// Edge length of the demo cubes.
pub const BLOCK_SIZE: f64 = 0.04;

/// Preset names accepted by [`SceneLayout::preset`].
pub const PRESETS: [&str; 4] = ["six-blocks", "stacked", "special-1", "special-2"];

fn default_size() -> f64 {
    BLOCK_SIZE
}

/// Initial placement of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub id: EntityId,
    /// Centre of the cube.
    pub position: Vector3<f64>,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default = "default_size")]
    pub size: f64,
}

impl BlockSpec {
    pub fn new(id: impl Into<EntityId>, position: Vector3<f64>) -> Self {
        Self {
            id: id.into(),
            position,
            yaw: 0.0,
            size: BLOCK_SIZE,
        }
    }
}

/// Blocks and slots of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneLayout {
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl SceneLayout {
    pub fn new(blocks: Vec<BlockSpec>, slots: Vec<Slot>) -> Result<Self, SceneError> {
        let layout = Self { blocks, slots };
        layout.validate()?;
        Ok(layout)
    }

    /// Build a named preset, drawing xy noise from `seed`.
    pub fn preset(name: &str, seed: u64) -> Result<Self, SceneError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let layout = match name {
            "six-blocks" => six_blocks(&mut rng),
            "stacked" => stacked(&mut rng),
            "special-1" => special_one(&mut rng),
            "special-2" => special_two(&mut rng),
            _ => return Err(SceneError::UnknownPreset { name: name.into() }),
        };
        tracing::debug!(
            preset = name,
            seed,
            blocks = layout.blocks.len(),
            slots = layout.slots.len(),
            "built scene preset"
        );
        Self::new(layout.blocks, layout.slots)
    }

    /// Load a layout from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(path).map_err(|e| SceneError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let layout: Self = toml::from_str(&content).map_err(|e| SceneError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        layout.validate()?;
        Ok(layout)
    }

    /// Resolve a CLI argument: a `.toml` path or a preset name.
    pub fn resolve(spec: &str, seed: u64) -> Result<Self, SceneError> {
        let path = Path::new(spec);
        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::load(path)
        } else {
            Self::preset(spec, seed)
        }
    }

    pub fn block_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.blocks.iter().map(|b| &b.id)
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.slots.iter().map(|s| &s.id)
    }

    pub fn has_slots(&self) -> bool {
        !self.slots.is_empty()
    }

    /// At least one block, and block and slot ids share one namespace.
    fn validate(&self) -> Result<(), SceneError> {
        if self.blocks.is_empty() {
            return Err(SceneError::NoBlocks);
        }
        let mut seen = BTreeSet::new();
        for id in self.block_ids().chain(self.slot_ids()) {
            if !seen.insert(id) {
                return Err(SceneError::DuplicateId {
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn jitter(rng: &mut StdRng, base: Vector3<f64>, noise: f64) -> Vector3<f64> {
    let dx = rng.gen_range(-noise..=noise);
    let dy = rng.gen_range(-noise..=noise);
    base + Vector3::new(dx, dy, 0.0)
}

fn on_table(x: f64, y: f64) -> Vector3<f64> {
    Vector3::new(x, y, BLOCK_SIZE / 2.0)
}

/// Six loose blocks in a 2×3 grid. `r` stays at its nominal position.
fn six_blocks(rng: &mut StdRng) -> SceneLayout {
    let mut blocks = vec![BlockSpec::new("r", on_table(0.65, 0.0))];
    for (id, x, y) in [
        ("g", 0.65, 0.2),
        ("b", 0.65, 0.4),
        ("y", 0.45, 0.0),
        ("m", 0.45, 0.2),
        ("c", 0.45, 0.4),
    ] {
        blocks.push(BlockSpec::new(id, jitter(rng, on_table(x, y), 0.05)));
    }
    SceneLayout {
        blocks,
        slots: Vec::new(),
    }
}

/// One six-block tower, `r` at the bottom and `c` on top.
fn stacked(rng: &mut StdRng) -> SceneLayout {
    let base = jitter(rng, on_table(0.45, 0.0), 0.2);
    let blocks = ["r", "g", "b", "y", "m", "c"]
        .into_iter()
        .enumerate()
        .map(|(level, id)| {
            BlockSpec::new(id, base + Vector3::new(0.0, 0.0, level as f64 * BLOCK_SIZE))
        })
        .collect();
    SceneLayout {
        blocks,
        slots: Vec::new(),
    }
}

fn loose_six(rng: &mut StdRng) -> Vec<BlockSpec> {
    [
        ("r", 0.65, 0.0),
        ("g", 0.65, 0.2),
        ("b", 0.65, 0.4),
        ("y", 0.45, 0.0),
        ("m", 0.45, 0.2),
        ("c", 0.45, 0.4),
    ]
    .into_iter()
    .map(|(id, x, y)| BlockSpec::new(id, jitter(rng, on_table(x, y), 0.05)))
    .collect()
}

fn slot(id: &str, position: Vector3<f64>) -> Slot {
    Slot {
        id: id.into(),
        position,
    }
}

/// Six loose blocks and a six-slot floor grid.
fn special_one(rng: &mut StdRng) -> SceneLayout {
    let blocks = loose_six(rng);
    let step = BLOCK_SIZE;
    let s1 = jitter(rng, on_table(0.45, -0.25), 0.05);
    let s2 = s1 + Vector3::new(step, 0.0, 0.0);
    let s3 = s1 + Vector3::new(0.0, step, 0.0);
    let s4 = s2 + Vector3::new(step, step, 0.0);
    let s5 = s3 + Vector3::new(step, step, 0.0);
    let s6 = s5 + Vector3::new(step, 0.0, 0.0);
    let slots = vec![
        slot("s1", s1),
        slot("s2", s2),
        slot("s3", s3),
        slot("s4", s4),
        slot("s5", s5),
        slot("s6", s6),
    ];
    SceneLayout { blocks, slots }
}

/// Ten loose blocks and ten slots over three layers.
fn special_two(rng: &mut StdRng) -> SceneLayout {
    let mut blocks = loose_six(rng);
    for (id, x, y) in [
        ("o", 0.45, -0.2),
        ("p", 0.45, -0.4),
        ("br", 0.65, -0.2),
        ("w", 0.65, -0.4),
    ] {
        blocks.push(BlockSpec::new(id, jitter(rng, on_table(x, y), 0.05)));
    }

    let step = BLOCK_SIZE;
    let up = Vector3::new(0.0, 0.0, step);
    let s11 = jitter(rng, on_table(0.45, -0.25), 0.05);
    let s12 = s11 + Vector3::new(step, 0.0, 0.0);
    let s13 = s11 + Vector3::new(0.0, step, 0.0);
    let s14 = s11 + Vector3::new(step, step, 0.0);
    let s15 = s12 + Vector3::new(step, 0.0, 0.0);
    let s16 = s13 + Vector3::new(0.0, step, 0.0);
    let s21 = s11 + up;
    let s22 = s12 + up;
    let s23 = s13 + up;
    let s31 = s21 + up;
    let slots = vec![
        slot("s11", s11),
        slot("s12", s12),
        slot("s13", s13),
        slot("s14", s14),
        slot("s15", s15),
        slot("s16", s16),
        slot("s21", s21),
        slot("s22", s22),
        slot("s23", s23),
        slot("s31", s31),
    ];
    SceneLayout { blocks, slots }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_have_expected_shape() {
        let counts: Vec<(usize, usize)> = PRESETS
            .iter()
            .map(|p| {
                let l = SceneLayout::preset(p, 7).unwrap();
                (l.blocks.len(), l.slots.len())
            })
            .collect();
        assert_eq!(counts, [(6, 0), (6, 0), (6, 6), (10, 10)]);
        assert!(matches!(
            SceneLayout::preset("pyramid", 0),
            Err(SceneError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn presets_are_reproducible_per_seed() {
        let a = SceneLayout::preset("six-blocks", 42).unwrap();
        let b = SceneLayout::preset("six-blocks", 42).unwrap();
        let c = SceneLayout::preset("six-blocks", 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.blocks[0].position, on_table(0.65, 0.0));
    }

    #[test]
    fn noise_stays_within_bounds() {
        for seed in 0..50 {
            let l = SceneLayout::preset("six-blocks", seed).unwrap();
            let g = &l.blocks[1];
            assert!((g.position.x - 0.65).abs() <= 0.05);
            assert!((g.position.y - 0.2).abs() <= 0.05);
            assert!((g.position.z - 0.02).abs() < 1e-12);
        }
    }

    #[test]
    fn stacked_tower_levels() {
        let l = SceneLayout::preset("stacked", 3).unwrap();
        for (level, b) in l.blocks.iter().enumerate() {
            let expected = 0.02 + level as f64 * BLOCK_SIZE;
            assert!((b.position.z - expected).abs() < 1e-12);
            assert_eq!(b.position.xy(), l.blocks[0].position.xy());
        }
    }

    #[test]
    fn load_from_toml_and_reject_duplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.toml");
        std::fs::write(
            &path,
            "[[blocks]]\nid = \"r\"\nposition = [0.5, 0.0, 0.02]\n\n\
             [[slots]]\nid = \"s1\"\nposition = [0.4, 0.0, 0.02]\n",
        )
        .unwrap();
        let layout = SceneLayout::resolve(path.to_str().unwrap(), 0).unwrap();
        assert_eq!(layout.blocks[0].size, BLOCK_SIZE);
        assert_eq!(layout.slots.len(), 1);

        std::fs::write(
            &path,
            "[[blocks]]\nid = \"r\"\nposition = [0.5, 0.0, 0.02]\n\n\
             [[slots]]\nid = \"r\"\nposition = [0.4, 0.0, 0.02]\n",
        )
        .unwrap();
        assert!(matches!(
            SceneLayout::load(&path),
            Err(SceneError::DuplicateId { .. })
        ));
    }

    #[test]
    fn scene_without_blocks_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("slots-only.toml");
        std::fs::write(&path, "[[slots]]\nid = \"s1\"\nposition = [0.4, 0.0, 0.02]\n").unwrap();
        assert!(matches!(SceneLayout::load(&path), Err(SceneError::NoBlocks)));
        assert!(matches!(
            SceneLayout::new(Vec::new(), Vec::new()),
            Err(SceneError::NoBlocks)
        ));
    }
}
