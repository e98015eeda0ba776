//! Same-day concatenation of the slices of one pass into a composite

use crate::core::command::{CommandUnit, OtbCommand, OtbResources};
use crate::core::index::OutputIndex;
use crate::core::scheduler::ProcessPool;
use crate::io::naming::TileImageName;
use crate::types::TilingResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TITLE: &str = "Concatenation";

/// Per-pixel selection of the first non-zero input, zero if every input is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstNonZero {
    inputs: usize,
}

impl FirstNonZero {
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }

    /// BandMath expression over `im1b1 .. imNb1`
    pub fn expression(&self) -> String {
        (1..=self.inputs).rev().fold("0".to_string(), |inner, i| {
            format!("(im{i}b1!=0 ? im{i}b1 : {inner})", i = i, inner = inner)
        })
    }

    /// Value the expression yields for one pixel
    pub fn select(values: &[f64]) -> f64 {
        values.iter().copied().find(|&v| v != 0.0).unwrap_or(0.0)
    }
}

/// Single acquisitions grouped by the composite they merge into.
///
/// Only groups with several members are returned, each sorted
/// chronologically.
pub fn concatenation_groups(index: &OutputIndex) -> BTreeMap<TileImageName, Vec<TileImageName>> {
    let mut groups: BTreeMap<TileImageName, Vec<TileImageName>> = BTreeMap::new();
    for image in index.single_acquisitions() {
        groups.entry(image.composite()).or_default().push(image.clone());
    }
    groups.retain(|_, members| members.len() > 1);
    for members in groups.values_mut() {
        members.sort_by_key(|name| name.to_string());
    }
    groups
}

/// One merge: inputs and the composite written from them
#[derive(Debug, Clone)]
struct Merge {
    inputs: Vec<PathBuf>,
    output: PathBuf,
}

impl Merge {
    fn command(&self, resources: OtbResources) -> CommandUnit {
        OtbCommand::new("otbcli_BandMath", resources)
            .arg("-progress", "false")
            .paths("-il", &self.inputs)
            .path("-out", &self.output)
            .arg("-exp", FirstNonZero::new(self.inputs.len()).expression())
            .build(TITLE)
    }
}

/// Merges same-day acquisitions of a tile and their border masks
pub struct Concatenator {
    border_masks: bool,
    resources: OtbResources,
}

impl Concatenator {
    pub fn new(border_masks: bool, resources: OtbResources) -> Self {
        Self { border_masks, resources }
    }

    fn merges(&self, index: &OutputIndex) -> Vec<Merge> {
        let mut merges = Vec::new();
        for (composite, members) in concatenation_groups(index) {
            merges.push(Merge {
                inputs: members.iter().map(|m| index.path_of(m)).collect(),
                output: index.path_of(&composite),
            });
            if self.border_masks && composite.polarization.is_co_polarized() {
                merges.push(Merge {
                    inputs: members.iter().map(|m| index.path_of(&m.border_mask())).collect(),
                    output: index.path_of(&composite.border_mask()),
                });
            }
        }
        merges
    }

    pub fn commands(&self, index: &OutputIndex) -> Vec<CommandUnit> {
        self.merges(index).iter().map(|m| m.command(self.resources)).collect()
    }

    pub fn run(&self, pool: &ProcessPool, tile_dir: &Path) -> TilingResult<()> {
        let index = OutputIndex::scan(tile_dir)?;
        let merges = self.merges(&index);
        log::info!("Concatenating {} groups in {}", merges.len(), tile_dir.display());

        let commands: Vec<CommandUnit> = merges.iter().map(|m| m.command(self.resources)).collect();
        pool.run(&commands)?;

        // inputs of a failed merge stay for the next run
        for merge in merges.iter().filter(|m| m.output.exists()) {
            for input in merge.inputs.iter().filter(|p| p.exists()) {
                if let Err(e) = std::fs::remove_file(input) {
                    log::warn!("Cannot remove {}: {}", input.display(), e);
                }
            }
        }
        Ok(())
    }
}
