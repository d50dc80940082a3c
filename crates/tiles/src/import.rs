//! DTM and raw-point imports
//!
//! Turns external interchange files into the tile formats the pipeline
//! reads: ESRI ASC elevation grids become NVM normal-map tiles, raw
//! whitespace-separated XYZ clouds become `.til` point tiles.

use crate::nvm::{NormalMap, NormalMapHeader};
use crate::til::{CloudAccess, PointTile, XYZ_UNIT};
use amrel_core::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// An ESRI ASC elevation grid, rows north-down, elevations in metres.
#[derive(Debug, Clone)]
pub struct AscGrid {
    pub ncols: usize,
    pub nrows: usize,
    /// West edge, metres
    pub xllcorner: f64,
    /// South edge, metres
    pub yllcorner: f64,
    /// Cell size, metres
    pub cellsize: f64,
    pub nodata: f64,
    pub values: Vec<f64>,
}

impl AscGrid {
    fn z(&self, col: usize, row: usize) -> f64 {
        self.values[row * self.ncols + col]
    }
}

/// Parses an ESRI ASC grid file.
pub fn read_asc(path: impl AsRef<Path>) -> Result<AscGrid> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut tokens = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(path, e))?;
        tokens.extend(line.split_whitespace().map(str::to_owned));
    }
    let mut it = tokens.iter();
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut cell = None;
    let mut nodata = -9999.0;
    // header: KEY VALUE pairs until the first bare number
    let mut values: Vec<f64> = Vec::new();
    while let Some(tok) = it.next() {
        if let Ok(v) = tok.parse::<f64>() {
            values.push(v);
            break;
        }
        let val = it
            .next()
            .ok_or_else(|| Error::format(path, format!("missing value for {tok}")))?;
        let val: f64 = val
            .parse()
            .map_err(|_| Error::format(path, format!("bad value for {tok}")))?;
        match tok.to_ascii_lowercase().as_str() {
            "ncols" => ncols = Some(val as usize),
            "nrows" => nrows = Some(val as usize),
            "xllcorner" => xll = Some(val),
            "yllcorner" => yll = Some(val),
            "cellsize" => cell = Some(val),
            "nodata_value" => nodata = val,
            other => return Err(Error::format(path, format!("unknown ASC key {other}"))),
        }
    }
    for tok in it {
        values.push(
            tok.parse()
                .map_err(|_| Error::format(path, format!("bad elevation {tok}")))?,
        );
    }
    let (ncols, nrows, xllcorner, yllcorner, cellsize) =
        match (ncols, nrows, xll, yll, cell) {
            (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b, c, d, e),
            _ => return Err(Error::format(path, "incomplete ASC header")),
        };
    if values.len() != ncols * nrows {
        return Err(Error::format(
            path,
            format!("expected {} elevations, found {}", ncols * nrows, values.len()),
        ));
    }
    Ok(AscGrid {
        ncols,
        nrows,
        xllcorner,
        yllcorner,
        cellsize,
        nodata,
        values,
    })
}

/// Computes per-cell unit normals from an elevation grid by central
/// differences (borders one-sided).
pub fn asc_to_normal_map(grid: &AscGrid) -> NormalMap {
    let (w, h) = (grid.ncols, grid.nrows);
    let mut normals = Vec::with_capacity(w * h);
    for j in 0..h {
        for i in 0..w {
            let (il, ir) = (i.saturating_sub(1), (i + 1).min(w - 1));
            let (ju, jd) = (j.saturating_sub(1), (j + 1).min(h - 1));
            let dx_span = (ir - il) as f64 * grid.cellsize;
            let dy_span = (jd - ju) as f64 * grid.cellsize;
            let dzdx = (grid.z(ir, j) - grid.z(il, j)) / dx_span;
            // grid rows go north-down, world y goes north-up
            let dzdy = (grid.z(i, ju) - grid.z(i, jd)) / dy_span;
            let norm = (dzdx * dzdx + dzdy * dzdy + 1.0).sqrt();
            normals.push([
                (-dzdx / norm) as f32,
                (-dzdy / norm) as f32,
                (1.0 / norm) as f32,
            ]);
        }
    }
    let header = NormalMapHeader {
        cols: w as i32,
        rows: h as i32,
        cell_size: (grid.cellsize * XYZ_UNIT as f64 + 0.5) as i32,
        xmin: (grid.xllcorner * XYZ_UNIT as f64 + 0.5) as i64,
        ymin: (grid.yllcorner * XYZ_UNIT as f64 + 0.5) as i64,
    };
    NormalMap::from_normals(header, normals).expect("normal count matches header")
}

/// Imports the first declared ASC file as an NVM tile at `out`.
pub fn import_dtm(asc_paths: &[impl AsRef<Path>], out: impl AsRef<Path>) -> Result<()> {
    let first = asc_paths
        .first()
        .ok_or_else(|| Error::Config("no DTM file to import".into()))?;
    let grid = read_asc(first)?;
    let map = asc_to_normal_map(&grid);
    map.save(&out)?;
    info!(path = %out.as_ref().display(), "saved normal map");
    Ok(())
}

/// Imports a raw XYZ cloud (metres, one `x y z` triple per line) as a
/// `.til` tile of the given class, using the geometry of the matching NVM
/// tile.
pub fn import_xyz(
    xyz_path: impl AsRef<Path>,
    nvm_path: impl AsRef<Path>,
    access: CloudAccess,
    out: impl AsRef<Path>,
) -> Result<()> {
    let nvm = NormalMap::open(&nvm_path)?;
    let h = *nvm.header();
    let mut tile = PointTile::for_dtm_tile(
        access,
        h.cols as usize,
        h.rows as usize,
        h.cell_size,
        h.xmin,
        h.ymin,
        0,
    );

    let xyz_path = xyz_path.as_ref();
    let file = File::open(xyz_path).map_err(|e| Error::io(xyz_path, e))?;
    let mut pts = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(xyz_path, e))?;
        let mut it = line.split_whitespace();
        let (Some(x), Some(y), Some(z)) = (it.next(), it.next(), it.next()) else {
            continue;
        };
        let parse = |s: &str| -> Result<i64> {
            s.parse::<f64>()
                .map(|v| (v * XYZ_UNIT as f64 + 0.5) as i64)
                .map_err(|_| Error::format(xyz_path, format!("bad coordinate {s}")))
        };
        pts.push((parse(x)?, parse(y)?, parse(z)?));
    }
    tile.set_points(&pts);
    tile.save(&out)?;
    info!(
        path = %out.as_ref().display(),
        points = tile.header().count,
        "saved point tile"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_asc(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("t0.asc");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "ncols 4").unwrap();
        writeln!(f, "nrows 3").unwrap();
        writeln!(f, "xllcorner 1000.0").unwrap();
        writeln!(f, "yllcorner 2000.0").unwrap();
        writeln!(f, "cellsize 0.5").unwrap();
        writeln!(f, "NODATA_value -9999").unwrap();
        // plane rising eastward by 1 m per cell
        for _ in 0..3 {
            writeln!(f, "0.0 1.0 2.0 3.0").unwrap();
        }
        path
    }

    #[test]
    fn test_read_asc() {
        let dir = tempfile::tempdir().unwrap();
        let grid = read_asc(write_asc(dir.path())).unwrap();
        assert_eq!(grid.ncols, 4);
        assert_eq!(grid.nrows, 3);
        assert_eq!(grid.z(2, 1), 2.0);
    }

    #[test]
    fn test_normals_face_away_from_rise() {
        let dir = tempfile::tempdir().unwrap();
        let grid = read_asc(write_asc(dir.path())).unwrap();
        let map = asc_to_normal_map(&grid);
        let n = map.normal(1, 1);
        assert!(n[0] < 0.0, "surface rises eastward, normal leans west");
        assert!(n[2] > 0.0);
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_import_xyz_bins_points() {
        let dir = tempfile::tempdir().unwrap();
        let asc = write_asc(dir.path());
        let nvm = dir.path().join("t0.nvm");
        import_dtm(&[asc], &nvm).unwrap();

        let xyz = dir.path().join("t0.xyz");
        std::fs::write(&xyz, "1000.1 2000.1 4.5\n1000.9 2000.9 4.6\n").unwrap();
        let til = dir.path().join("mid_t0.til");
        import_xyz(&xyz, &nvm, CloudAccess::Mid, &til).unwrap();

        let mut tile = PointTile::open(&til).unwrap();
        tile.load().unwrap();
        assert_eq!(tile.header().count, 2);
        assert_eq!(tile.header().access, 2);
    }
}
