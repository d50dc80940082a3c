//! Point tile files
//!
//! One binary file per tile and per resolution class, holding the raw 3-D
//! ground points binned on a regular cell grid. Layout (little-endian):
//!
//! ```text
//! b"TIL1"            (4)
//! access: i32        (4)  1 = TOP, 2 = MID, 4 = ECO
//! cols: i32          (4)  point cells per row
//! rows: i32          (4)  point cell rows
//! xref: i64          (8)  micrometres, west edge
//! yref: i64          (8)  micrometres, south edge
//! zref: i64          (8)  micrometres, height reference
//! cell_size: i32     (4)  micrometres
//! count: u32         (4)  total point count
//! cols*rows cell counts (u32), row-major from the south-west
//! count points as (x: i32, y: i32, z: i32) relative to the reference
//! corner, grouped by cell in the same order
//! ```
//!
//! Any class can be rebuilt from any other by re-binning the points on
//! the coarser or denser grid ([`PointTile::set_points_from`]).

use amrel_core::{Error, Result, GRID_SUBDIVISION};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File suffix of point tiles.
pub const TIL_SUFFIX: &str = ".til";

/// Micrometres per metre (XYZ import unit).
pub const XYZ_UNIT: i64 = 1_000_000;

const TIL_MAGIC: &[u8; 4] = b"TIL1";

/// Point-cloud resolution class. The class constant divides the
/// sub-divided DTM grid: a tile holds `Tw*S/A x Th*S/A` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudAccess {
    /// Densest class (divisor 1)
    #[default]
    Top,
    /// Intermediate class (divisor 2)
    Mid,
    /// Sparsest class (divisor 4)
    Eco,
}

impl CloudAccess {
    pub fn divisor(self) -> i32 {
        match self {
            CloudAccess::Top => 1,
            CloudAccess::Mid => 2,
            CloudAccess::Eco => 4,
        }
    }

    pub fn from_divisor(d: i32) -> Option<Self> {
        match d {
            1 => Some(CloudAccess::Top),
            2 => Some(CloudAccess::Mid),
            4 => Some(CloudAccess::Eco),
            _ => None,
        }
    }

    pub fn dir(self) -> &'static str {
        match self {
            CloudAccess::Top => "top/",
            CloudAccess::Mid => "mid/",
            CloudAccess::Eco => "eco/",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            CloudAccess::Top => "top_",
            CloudAccess::Mid => "mid_",
            CloudAccess::Eco => "eco_",
        }
    }

    /// `til/<class>/<class>_<name>.til` under `til_dir`.
    pub fn til_path(self, til_dir: &Path, name: &str) -> PathBuf {
        til_dir.join(format!("{}{}{}{}", self.dir(), self.prefix(), name, TIL_SUFFIX))
    }

    /// The two other classes, densest first (fallback search order).
    pub fn others(self) -> [CloudAccess; 2] {
        match self {
            CloudAccess::Top => [CloudAccess::Mid, CloudAccess::Eco],
            CloudAccess::Mid => [CloudAccess::Top, CloudAccess::Eco],
            CloudAccess::Eco => [CloudAccess::Mid, CloudAccess::Top],
        }
    }
}

/// Fixed-size header of a point tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointTileHeader {
    pub access: i32,
    pub cols: i32,
    pub rows: i32,
    pub xref: i64,
    pub yref: i64,
    pub zref: i64,
    /// Point cell size in micrometres
    pub cell_size: i32,
    pub count: u32,
}

impl PointTileHeader {
    /// Tile span along x in micrometres.
    pub fn span_x(&self) -> i64 {
        self.cols as i64 * self.cell_size as i64
    }

    /// Tile span along y in micrometres.
    pub fn span_y(&self) -> i64 {
        self.rows as i64 * self.cell_size as i64
    }
}

/// A point tile: header, per-cell index and (possibly unloaded) points.
#[derive(Debug, Clone)]
pub struct PointTile {
    path: PathBuf,
    header: PointTileHeader,
    /// Prefix sums over cell counts, `cols*rows + 1` entries
    starts: Option<Vec<u32>>,
    /// Points relative to the reference corner, micrometres
    points: Option<Vec<[i32; 3]>>,
}

impl PointTile {
    /// Reads only the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut r = BufReader::new(file);
        let header = read_header(&mut r, &path)?;
        Ok(Self {
            path,
            header,
            starts: None,
            points: None,
        })
    }

    /// An empty in-memory tile over the given grid.
    pub fn empty(
        access: CloudAccess,
        cols: i32,
        rows: i32,
        xref: i64,
        yref: i64,
        zref: i64,
        cell_size: i32,
    ) -> Self {
        Self {
            path: PathBuf::new(),
            header: PointTileHeader {
                access: access.divisor(),
                cols,
                rows,
                xref,
                yref,
                zref,
                cell_size,
                count: 0,
            },
            starts: Some(vec![0; (cols * rows) as usize + 1]),
            points: Some(Vec::new()),
        }
    }

    /// Grid for one DTM tile of `tile_w x tile_h` cells of `dtm_cell`
    /// micrometres at the given class.
    pub fn for_dtm_tile(
        access: CloudAccess,
        tile_w: usize,
        tile_h: usize,
        dtm_cell: i32,
        xref: i64,
        yref: i64,
        zref: i64,
    ) -> Self {
        let a = access.divisor();
        Self::empty(
            access,
            (tile_w as i32 * GRID_SUBDIVISION) / a,
            (tile_h as i32 * GRID_SUBDIVISION) / a,
            xref,
            yref,
            zref,
            (dtm_cell * a) / GRID_SUBDIVISION,
        )
    }

    pub fn header(&self) -> &PointTileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.points.is_some()
    }

    /// Bins absolute points (micrometres) onto the cell grid. Points
    /// outside the tile are dropped; within a cell the input order is
    /// kept.
    pub fn set_points(&mut self, pts: &[(i64, i64, i64)]) {
        let h = self.header;
        let ncells = (h.cols * h.rows) as usize;
        let mut cells: Vec<Vec<[i32; 3]>> = vec![Vec::new(); ncells];
        for &(x, y, z) in pts {
            let cx = (x - h.xref).div_euclid(h.cell_size as i64);
            let cy = (y - h.yref).div_euclid(h.cell_size as i64);
            if cx < 0 || cy < 0 || cx >= h.cols as i64 || cy >= h.rows as i64 {
                continue;
            }
            cells[(cy * h.cols as i64 + cx) as usize].push([
                (x - h.xref) as i32,
                (y - h.yref) as i32,
                (z - h.zref) as i32,
            ]);
        }
        let mut starts = Vec::with_capacity(ncells + 1);
        let mut points = Vec::new();
        starts.push(0u32);
        for cell in &cells {
            points.extend_from_slice(cell);
            starts.push(points.len() as u32);
        }
        self.header.count = points.len() as u32;
        self.starts = Some(starts);
        self.points = Some(points);
    }

    /// Re-bins another tile's points onto this tile's grid, the
    /// derivation used to recover a missing class from an existing one.
    pub fn set_points_from(&mut self, other: &PointTile) {
        let pts: Vec<(i64, i64, i64)> = other.iter_points_abs().collect();
        self.set_points(&pts);
    }

    /// All points in absolute micrometres.
    pub fn iter_points_abs(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        let h = self.header;
        self.points
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(move |p| {
                (
                    h.xref + p[0] as i64,
                    h.yref + p[1] as i64,
                    h.zref + p[2] as i64,
                )
            })
    }

    /// Points of cell `(cx, cy)` (row 0 south), relative micrometres.
    pub fn cell_points(&self, cx: usize, cy: usize) -> &[[i32; 3]] {
        match (&self.starts, &self.points) {
            (Some(starts), Some(points)) => {
                let c = cy * self.header.cols as usize + cx;
                &points[starts[c] as usize..starts[c + 1] as usize]
            }
            _ => &[],
        }
    }

    /// Loads the payload if it is not resident.
    pub fn load(&mut self) -> Result<()> {
        if self.points.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut r = BufReader::new(file);
        let header = read_header(&mut r, &self.path)?;
        if header != self.header {
            return Err(Error::format(&self.path, "header changed on disk"));
        }
        let ncells = (header.cols * header.rows) as usize;
        let mut starts = Vec::with_capacity(ncells + 1);
        starts.push(0u32);
        let mut acc = 0u32;
        for _ in 0..ncells {
            acc += r
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            starts.push(acc);
        }
        if acc != header.count {
            return Err(Error::format(&self.path, "cell counts disagree with point count"));
        }
        let mut points = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let x = r
                .read_i32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            let y = r
                .read_i32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            let z = r
                .read_i32::<LittleEndian>()
                .map_err(|e| Error::io(&self.path, e))?;
            points.push([x, y, z]);
        }
        self.starts = Some(starts);
        self.points = Some(points);
        Ok(())
    }

    /// Drops the payload, keeping the header. In-memory tiles keep their
    /// points since nothing could reload them.
    pub fn release_points(&mut self) {
        if !self.path.as_os_str().is_empty() {
            self.starts = None;
            self.points = None;
        }
    }

    /// Writes the tile to `path` and remembers it as its backing file.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (starts, points) = match (&self.starts, &self.points) {
            (Some(s), Some(p)) => (s, p),
            _ => return Err(Error::format(path, "cannot save a tile without points")),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut w = BufWriter::new(file);
        let h = &self.header;
        w.write_all(TIL_MAGIC).map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(h.access)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(h.cols)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(h.rows)
            .map_err(|e| Error::io(path, e))?;
        w.write_i64::<LittleEndian>(h.xref)
            .map_err(|e| Error::io(path, e))?;
        w.write_i64::<LittleEndian>(h.yref)
            .map_err(|e| Error::io(path, e))?;
        w.write_i64::<LittleEndian>(h.zref)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(h.cell_size)
            .map_err(|e| Error::io(path, e))?;
        w.write_u32::<LittleEndian>(h.count)
            .map_err(|e| Error::io(path, e))?;
        for c in starts.windows(2) {
            w.write_u32::<LittleEndian>(c[1] - c[0])
                .map_err(|e| Error::io(path, e))?;
        }
        for p in points {
            for c in p {
                w.write_i32::<LittleEndian>(*c)
                    .map_err(|e| Error::io(path, e))?;
            }
        }
        drop(w);
        self.path = path.to_path_buf();
        Ok(())
    }
}

fn read_header(r: &mut impl std::io::Read, path: &Path) -> Result<PointTileHeader> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|e| Error::io(path, e))?;
    if &magic != TIL_MAGIC {
        return Err(Error::format(path, "not a TIL file"));
    }
    let access = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let cols = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let rows = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let xref = r.read_i64::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let yref = r.read_i64::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let zref = r.read_i64::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let cell_size = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    let count = r.read_u32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
    if CloudAccess::from_divisor(access).is_none() || cols <= 0 || rows <= 0 || cell_size <= 0 {
        return Err(Error::format(path, "degenerate TIL header"));
    }
    Ok(PointTileHeader {
        access,
        cols,
        rows,
        xref,
        yref,
        zref,
        cell_size,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<(i64, i64, i64)> {
        vec![
            (150_000, 150_000, 300_000_000),
            (450_000, 150_000, 300_100_000),
            (950_000, 950_000, 300_200_000),
            (2_000_000, 0, 0), // outside the 1 m tile, dropped
        ]
    }

    #[test]
    fn test_binning_and_cell_access() {
        let mut tile = PointTile::empty(CloudAccess::Top, 10, 10, 0, 0, 0, 100_000);
        tile.set_points(&sample_points());
        assert_eq!(tile.header().count, 3);
        assert_eq!(tile.cell_points(1, 1).len(), 1);
        assert_eq!(tile.cell_points(4, 1).len(), 1);
        assert_eq!(tile.cell_points(9, 9).len(), 1);
        assert_eq!(tile.cell_points(0, 0).len(), 0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top_t0.til");
        let mut tile = PointTile::empty(CloudAccess::Top, 10, 10, 0, 0, 0, 100_000);
        tile.set_points(&sample_points());
        tile.save(&path).unwrap();

        let mut back = PointTile::open(&path).unwrap();
        assert_eq!(back.header(), tile.header());
        assert!(!back.is_loaded());
        back.load().unwrap();
        assert_eq!(back.cell_points(1, 1), tile.cell_points(1, 1));
        let abs: Vec<_> = back.iter_points_abs().collect();
        assert!(abs.contains(&(150_000, 150_000, 300_000_000)));
    }

    #[test]
    fn test_class_derivation_keeps_points() {
        let mut top = PointTile::for_dtm_tile(CloudAccess::Top, 4, 4, 500_000, 0, 0, 0);
        let pts: Vec<_> = (0..40)
            .map(|i| (i as i64 * 45_000, i as i64 * 45_000, 1_000_000 + i as i64))
            .collect();
        top.set_points(&pts);

        let mut mid = PointTile::for_dtm_tile(CloudAccess::Mid, 4, 4, 500_000, 0, 0, 0);
        mid.set_points_from(&top);
        // half the cell count per axis, double the cell size
        assert_eq!(mid.header().cols * 2, top.header().cols);
        assert_eq!(mid.header().cell_size, top.header().cell_size * 2);
        assert_eq!(mid.header().count, top.header().count);
    }

    #[test]
    fn test_release_points_noop_in_memory() {
        let mut tile = PointTile::empty(CloudAccess::Mid, 2, 2, 0, 0, 0, 100_000);
        tile.set_points(&[(50_000, 50_000, 7)]);
        tile.release_points();
        assert!(tile.is_loaded(), "in-memory tiles cannot be reloaded");
    }
}
