//! NVM normal-map tile files
//!
//! One file per DTM tile, holding the precomputed unit surface normal of
//! every cell. Layout (little-endian):
//!
//! ```text
//! b"NVM1"            (4)
//! cols: i32          (4)
//! rows: i32          (4)
//! cell_size: i32     (4)  micrometres
//! xmin: i64          (8)  micrometres, west edge
//! ymin: i64          (8)  micrometres, south edge
//! rows*cols normals as (nx: f32, ny: f32, nz: f32), row-major,
//! row 0 north-most
//! ```

use amrel_core::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// File suffix of normal-map tiles.
pub const NVM_SUFFIX: &str = ".nvm";

const NVM_MAGIC: &[u8; 4] = b"NVM1";

/// Fixed-size header of a normal-map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalMapHeader {
    pub cols: i32,
    pub rows: i32,
    /// Cell size in micrometres
    pub cell_size: i32,
    /// World x of the west edge, micrometres
    pub xmin: i64,
    /// World y of the south edge, micrometres
    pub ymin: i64,
}

/// A normal-map tile: header plus (possibly unloaded) normals.
#[derive(Debug, Clone)]
pub struct NormalMap {
    path: PathBuf,
    header: NormalMapHeader,
    normals: Option<Vec<[f32; 3]>>,
}

impl NormalMap {
    /// Reads only the header, leaving the normals on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut r = BufReader::new(file);
        let header = read_header(&mut r, &path)?;
        Ok(Self {
            path,
            header,
            normals: None,
        })
    }

    /// Builds an in-memory tile (importer path).
    pub fn from_normals(header: NormalMapHeader, normals: Vec<[f32; 3]>) -> Result<Self> {
        if normals.len() != (header.cols as usize) * (header.rows as usize) {
            return Err(Error::InvalidDimensions {
                width: header.cols as usize,
                height: header.rows as usize,
            });
        }
        Ok(Self {
            path: PathBuf::new(),
            header,
            normals: Some(normals),
        })
    }

    pub fn header(&self) -> &NormalMapHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.normals.is_some()
    }

    /// Loads the normal payload if it is not resident yet.
    pub fn load(&mut self) -> Result<()> {
        if self.normals.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut r = BufReader::new(file);
        let header = read_header(&mut r, &self.path)?;
        if header != self.header {
            return Err(Error::format(&self.path, "header changed on disk"));
        }
        let count = (header.cols as usize) * (header.rows as usize);
        let mut normals = Vec::with_capacity(count);
        for _ in 0..count {
            let nx = r
                .read_f32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            let ny = r
                .read_f32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            let nz = r
                .read_f32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            normals.push([nx, ny, nz]);
        }
        self.normals = Some(normals);
        Ok(())
    }

    /// Drops the normal payload, keeping the header.
    pub fn release(&mut self) {
        if !self.path.as_os_str().is_empty() {
            self.normals = None;
        }
    }

    /// Normal of cell `(col, row)`, row 0 north-most. The payload must be
    /// resident.
    pub fn normal(&self, col: usize, row: usize) -> [f32; 3] {
        let normals = self.normals.as_ref().expect("normals not loaded");
        normals[row * self.header.cols as usize + col]
    }

    /// Writes the tile to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let normals = self
            .normals
            .as_ref()
            .ok_or_else(|| Error::format(path, "cannot save a tile without normals"))?;
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut w = BufWriter::new(file);
        use std::io::Write;
        w.write_all(NVM_MAGIC).map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(self.header.cols)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(self.header.rows)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(self.header.cell_size)
            .map_err(|e| Error::io(path, e))?;
        w.write_i64::<LittleEndian>(self.header.xmin)
            .map_err(|e| Error::io(path, e))?;
        w.write_i64::<LittleEndian>(self.header.ymin)
            .map_err(|e| Error::io(path, e))?;
        for n in normals {
            for c in n {
                w.write_f32::<LittleEndian>(*c)
                    .map_err(|e| Error::io(path, e))?;
            }
        }
        Ok(())
    }
}

fn read_header(r: &mut impl std::io::Read, path: &Path) -> Result<NormalMapHeader> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|e| Error::io(path, e))?;
    if &magic != NVM_MAGIC {
        return Err(Error::format(path, "not an NVM file"));
    }
    let cols = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let rows = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let cell_size = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let xmin = r.read_i64::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let ymin = r.read_i64::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    if cols <= 0 || rows <= 0 || cell_size <= 0 {
        return Err(Error::format(path, "degenerate NVM header"));
    }
    Ok(NormalMapHeader {
        cols,
        rows,
        cell_size,
        xmin,
        ymin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_tile(cols: i32, rows: i32) -> NormalMap {
        let header = NormalMapHeader {
            cols,
            rows,
            cell_size: 500_000,
            xmin: 1_000_000,
            ymin: 2_000_000,
        };
        let normals = vec![[0.0, 0.0, 1.0]; (cols * rows) as usize];
        NormalMap::from_normals(header, normals).unwrap()
    }

    #[test]
    fn test_save_open_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t0.nvm");
        let mut src = flat_tile(4, 3);
        // mark one cell so orientation is observable
        {
            let normals = src.normals.as_mut().unwrap();
            normals[2 * 4 + 1] = [0.6, 0.0, 0.8];
        }
        src.save(&path).unwrap();

        let mut loaded = NormalMap::open(&path).unwrap();
        assert_eq!(loaded.header(), src.header());
        assert!(!loaded.is_loaded());
        loaded.load().unwrap();
        let n = loaded.normal(1, 2);
        assert_relative_eq!(n[0], 0.6);
        assert_relative_eq!(n[2], 0.8);
    }

    #[test]
    fn test_rejects_foreign_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.nvm");
        std::fs::write(&path, b"PNG0rest-of-file").unwrap();
        assert!(NormalMap::open(&path).is_err());
    }

    #[test]
    fn test_release_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.nvm");
        flat_tile(2, 2).save(&path).unwrap();
        let mut tile = NormalMap::open(&path).unwrap();
        tile.load().unwrap();
        tile.release();
        assert!(!tile.is_loaded());
        assert_eq!(tile.header().cols, 2);
        tile.load().unwrap();
        assert!(tile.is_loaded());
    }
}
