use crate::types::{TilingError, TilingResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Where an elevation tile was found in the elevation directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationSource {
    Plain(PathBuf),
    /// `<name>.gz`, decompressed when copied into an arena
    Gzipped(PathBuf),
}

/// Find an elevation tile, falling back to its gzipped form
pub fn locate_elevation_tile(elevation_dir: &Path, name: &str) -> Option<ElevationSource> {
    let plain = elevation_dir.join(name);
    if plain.exists() {
        return Some(ElevationSource::Plain(plain));
    }
    let gzipped = elevation_dir.join(format!("{}.gz", name));
    if gzipped.exists() {
        return Some(ElevationSource::Gzipped(gzipped));
    }
    None
}

/// Names of the tiles absent from the elevation directory
pub fn missing_elevation_tiles<'a, I>(elevation_dir: &Path, names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .filter(|name| locate_elevation_tile(elevation_dir, name).is_none())
        .cloned()
        .collect()
}

/// Scratch directory holding exactly the elevation tiles one output tile needs.
///
/// Orthorectification reads it through `-elev.dem`. The directory is removed
/// when the arena is released or dropped.
#[derive(Debug)]
pub struct ElevationArena {
    dir: TempDir,
    tiles: Vec<String>,
}

impl ElevationArena {
    /// Create a fresh arena under `scratch_root` and copy `tiles` into it
    pub fn populate(scratch_root: &Path, elevation_dir: &Path, tiles: &[String]) -> TilingResult<Self> {
        let dir = tempfile::Builder::new().prefix("srtm_").tempdir_in(scratch_root)?;
        log::debug!("Elevation arena: {}", dir.path().display());

        for name in tiles {
            let source = locate_elevation_tile(elevation_dir, name).ok_or_else(|| {
                TilingError::MissingElevation(format!("{} in {}", name, elevation_dir.display()))
            })?;
            let target = dir.path().join(name);
            match source {
                ElevationSource::Plain(path) => {
                    std::fs::copy(&path, &target)?;
                }
                ElevationSource::Gzipped(path) => {
                    log::debug!("Decompressing {}", path.display());
                    let mut decoder = GzDecoder::new(File::open(&path)?);
                    let mut output = File::create(&target)?;
                    std::io::copy(&mut decoder, &mut output)?;
                }
            }
        }

        log::info!("Copied {} elevation tiles to {}", tiles.len(), dir.path().display());
        Ok(Self {
            dir,
            tiles: tiles.to_vec(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tiles(&self) -> &[String] {
        &self.tiles
    }

    /// Remove the scratch directory now, reporting failures
    pub fn release(self) -> TilingResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        log::debug!("Removed elevation arena {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_arena_holds_requested_tiles_only() {
        let elevation = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::write(elevation.path().join("N43E001.hgt"), b"plain").unwrap();
        std::fs::write(elevation.path().join("N44E001.hgt"), b"unused").unwrap();
        let mut encoder = GzEncoder::new(
            File::create(elevation.path().join("N43E002.hgt.gz")).unwrap(),
            Compression::default(),
        );
        encoder.write_all(b"compressed").unwrap();
        encoder.finish().unwrap();

        let wanted = vec!["N43E001.hgt".to_string(), "N43E002.hgt".to_string()];
        let arena = ElevationArena::populate(scratch.path(), elevation.path(), &wanted).unwrap();
        let arena_path = arena.path().to_path_buf();

        let mut names: Vec<String> = std::fs::read_dir(&arena_path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, wanted);
        assert_eq!(std::fs::read(arena_path.join("N43E002.hgt")).unwrap(), b"compressed");

        arena.release().unwrap();
        assert!(!arena_path.exists());
    }

    #[test]
    fn test_missing_tiles_are_reported() {
        let elevation = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::write(elevation.path().join("N43E001.hgt"), b"plain").unwrap();

        let names = vec!["N43E001.hgt".to_string(), "S01W070.hgt".to_string()];
        assert_eq!(missing_elevation_tiles(elevation.path(), &names), vec!["S01W070.hgt".to_string()]);
        assert!(ElevationArena::populate(scratch.path(), elevation.path(), &names).is_err());
        // the failed arena was cleaned up on drop
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_arena_removed_on_drop() {
        let elevation = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let path = {
            let arena = ElevationArena::populate(scratch.path(), elevation.path(), &[]).unwrap();
            arena.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
