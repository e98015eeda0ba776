use crate::io::naming::{ImageKind, TileImageName};
use crate::types::TilingResult;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Snapshot of the canonical images present in a tile directory.
///
/// Stages consult it instead of probing the filesystem one name at a time.
/// Rebuild it with [`OutputIndex::scan`] after a stage has written files.
#[derive(Debug, Clone, Default)]
pub struct OutputIndex {
    tile_dir: PathBuf,
    images: BTreeSet<TileImageName>,
}

impl OutputIndex {
    /// Index every file of `tile_dir` whose name parses; a missing directory is empty
    pub fn scan(tile_dir: &Path) -> TilingResult<Self> {
        let mut images = BTreeSet::new();
        if tile_dir.is_dir() {
            for entry in std::fs::read_dir(tile_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().to_string();
                if let Ok(name) = file_name.parse::<TileImageName>() {
                    images.insert(name);
                }
            }
        }
        Ok(Self {
            tile_dir: tile_dir.to_path_buf(),
            images,
        })
    }

    pub fn tile_dir(&self) -> &Path {
        &self.tile_dir
    }

    pub fn path_of(&self, name: &TileImageName) -> PathBuf {
        self.tile_dir.join(name.to_string())
    }

    pub fn contains(&self, name: &TileImageName) -> bool {
        self.images.contains(name)
    }

    /// True if `name` or the composite it was merged into is present
    pub fn has_output_for(&self, name: &TileImageName) -> bool {
        self.contains(name) || self.contains(&name.composite())
    }

    /// Backscatter images, single acquisitions and composites.
    ///
    /// Ordered by platform and name fields, not by date.
    pub fn backscatter_images(&self) -> impl Iterator<Item = &TileImageName> {
        self.images.iter().filter(|n| n.kind == ImageKind::Backscatter)
    }

    /// Every indexed image, border masks included
    pub fn images(&self) -> impl Iterator<Item = &TileImageName> {
        self.images.iter()
    }

    pub fn single_acquisitions(&self) -> impl Iterator<Item = &TileImageName> {
        self.images.iter().filter(|n| n.is_single_acquisition())
    }

    pub fn composites(&self) -> impl Iterator<Item = &TileImageName> {
        self.backscatter_images().filter(|n| n.stamp.is_composite())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
