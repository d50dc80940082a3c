//! Stage persistence
//!
//! Every adjacent stage pair communicates through one fixed-name binary
//! artifact under the results directory, so the pipeline can be resumed
//! or run stage by stage. All files are little-endian and start with the
//! `(width: i32, height: i32, cell_size: f32)` triple.

use amrel_core::{DigitalStraightSegment, Error, Pt2i, RationalPoint, Raster, Result, Vr2i};
use amrel_algorithms::GradientMap;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SHADE_MAP: &str = "shade.map";
pub const RORPO_MAP: &str = "rorpo.map";
pub const SOBEL_MAP: &str = "sobel.map";
pub const FBSD_DSS: &str = "fbsd.dss";
pub const SEEDS_PTS: &str = "seeds.pts";
pub const SUCSEEDS_TXT: &str = "sucseeds.txt";

pub const HILL_PNG: &str = "hill.png";
pub const SHADE_PNG: &str = "shade.png";
pub const RORPO_PNG: &str = "rorpo.png";
pub const SOBEL_PNG: &str = "sobel.png";
pub const FBSD_PNG: &str = "fbsd.png";
pub const SEEDS_PNG: &str = "seeds.png";
pub const ROADS_PNG: &str = "roads.png";

/// Common header of every binary artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapHeader {
    pub width: i32,
    pub height: i32,
    /// DTM cell size in metres
    pub cell_size: f32,
}

/// Persists and restores the artifacts between pipeline stages.
#[derive(Debug, Clone)]
pub struct StageStore {
    dir: PathBuf,
}

impl StageStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn create(&self, name: &str) -> Result<BufWriter<File>> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.path(name);
        Ok(BufWriter::new(
            File::create(&path).map_err(|e| Error::io(&path, e))?,
        ))
    }

    fn open(&self, name: &str) -> Result<BufReader<File>> {
        let path = self.path(name);
        match File::open(&path) {
            Ok(f) => Ok(BufReader::new(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::StageMissing(path.display().to_string()))
            }
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn write_header(w: &mut impl Write, h: &MapHeader, path: &Path) -> Result<()> {
        w.write_i32::<LittleEndian>(h.width)
            .map_err(|e| Error::io(path, e))?;
        w.write_i32::<LittleEndian>(h.height)
            .map_err(|e| Error::io(path, e))?;
        w.write_f32::<LittleEndian>(h.cell_size)
            .map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    fn read_header(r: &mut impl std::io::Read, path: &Path) -> Result<MapHeader> {
        let width = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
        let height = r.read_i32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
        let cell_size = r.read_f32::<LittleEndian>().map_err(|e| Error::io(path, e))?;
        if width <= 0 || height <= 0 {
            return Err(Error::format(path, "degenerate artifact header"));
        }
        Ok(MapHeader {
            width,
            height,
            cell_size,
        })
    }

    // Byte maps (shading and RORPO)

    pub fn save_byte_map(&self, name: &str, header: &MapHeader, map: &Raster<u8>) -> Result<()> {
        let path = self.path(name);
        let mut w = self.create(name)?;
        Self::write_header(&mut w, header, &path)?;
        w.write_all(map.as_slice()).map_err(|e| Error::io(&path, e))?;
        Ok(())
    }

    pub fn load_byte_map(&self, name: &str) -> Result<(MapHeader, Raster<u8>)> {
        let path = self.path(name);
        let mut r = self.open(name)?;
        let header = Self::read_header(&mut r, &path)?;
        let count = header.width as usize * header.height as usize;
        let mut data = vec![0u8; count];
        use std::io::Read;
        r.read_exact(&mut data).map_err(|e| Error::io(&path, e))?;
        let map = Raster::from_vec(data, header.height as usize, header.width as usize)?;
        Ok((header, map))
    }

    // Gradient map

    pub fn save_sobel_map(&self, header: &MapHeader, gmap: &GradientMap) -> Result<()> {
        let path = self.path(SOBEL_MAP);
        let mut w = self.create(SOBEL_MAP)?;
        Self::write_header(&mut w, header, &path)?;
        for v in gmap.as_slice() {
            w.write_i32::<LittleEndian>(v.x).map_err(|e| Error::io(&path, e))?;
            w.write_i32::<LittleEndian>(v.y).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }

    pub fn load_sobel_map(&self) -> Result<(MapHeader, GradientMap)> {
        let path = self.path(SOBEL_MAP);
        let mut r = self.open(SOBEL_MAP)?;
        let header = Self::read_header(&mut r, &path)?;
        let count = header.width as usize * header.height as usize;
        let mut vecs = Vec::with_capacity(count);
        for _ in 0..count {
            let x = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            let y = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            vecs.push(Vr2i::new(x, y));
        }
        Ok((
            header,
            GradientMap::from_raw(header.width as usize, header.height as usize, vecs),
        ))
    }

    // Digital straight segments

    pub fn save_fbsd_segments(
        &self,
        header: &MapHeader,
        tsw: i32,
        tsh: i32,
        dss: &[DigitalStraightSegment],
    ) -> Result<()> {
        let path = self.path(FBSD_DSS);
        let mut w = self.create(FBSD_DSS)?;
        Self::write_header(&mut w, header, &path)?;
        w.write_i32::<LittleEndian>(tsw).map_err(|e| Error::io(&path, e))?;
        w.write_i32::<LittleEndian>(tsh).map_err(|e| Error::io(&path, e))?;
        w.write_i32::<LittleEndian>(dss.len() as i32)
            .map_err(|e| Error::io(&path, e))?;
        for seg in dss {
            let (a, b) = seg.naive_line();
            for v in [
                a.x_num, a.x_den, a.y_num, a.y_den, b.x_num, b.x_den, b.y_num, b.y_den,
                seg.length2(),
            ] {
                w.write_i64::<LittleEndian>(v).map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }

    pub fn load_fbsd_segments(
        &self,
    ) -> Result<(MapHeader, i32, i32, Vec<DigitalStraightSegment>)> {
        let path = self.path(FBSD_DSS);
        let mut r = self.open(FBSD_DSS)?;
        let header = Self::read_header(&mut r, &path)?;
        let tsw = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        let tsh = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        let count = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        let mut dss = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let mut v = [0i64; 9];
            for slot in v.iter_mut() {
                *slot = r.read_i64::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            }
            dss.push(DigitalStraightSegment::new(
                RationalPoint::new(v[0], v[1], v[2], v[3]),
                RationalPoint::new(v[4], v[5], v[6], v[7]),
                v[8],
            ));
        }
        Ok((header, tsw, tsh, dss))
    }

    // Seeds

    /// Saves the seed buckets. Plain mode writes the seeds in serpentine
    /// tile order; half-size mode doubles coordinates (nudging the upper
    /// endpoint to preserve orientation) and doubles the declared
    /// geometry.
    #[allow(clippy::too_many_arguments)]
    pub fn save_seeds(
        &self,
        header: &MapHeader,
        tsw: i32,
        tsh: i32,
        buckets: &[Vec<(Pt2i, Pt2i)>],
        half_size: bool,
    ) -> Result<()> {
        let path = self.path(SEEDS_PTS);
        let mut w = self.create(SEEDS_PTS)?;
        let out_header = if half_size {
            MapHeader {
                width: header.width * 2,
                height: header.height * 2,
                cell_size: header.cell_size / 2.0,
            }
        } else {
            *header
        };
        Self::write_header(&mut w, &out_header, &path)?;
        let (out_tsw, out_tsh) = if half_size { (tsw * 2, tsh * 2) } else { (tsw, tsh) };
        w.write_i32::<LittleEndian>(out_tsw).map_err(|e| Error::io(&path, e))?;
        w.write_i32::<LittleEndian>(out_tsh).map_err(|e| Error::io(&path, e))?;

        let ordered: Vec<(Pt2i, Pt2i)> = if half_size {
            rebucket_doubled(header, tsw, tsh, buckets)
        } else {
            amrel_core::serpentine(tsw as usize, tsh as usize)
                .flat_map(|k| buckets[k].iter().copied())
                .collect()
        };
        w.write_i32::<LittleEndian>(ordered.len() as i32 * 2)
            .map_err(|e| Error::io(&path, e))?;
        for (p1, p2) in ordered {
            for p in [p1, p2] {
                w.write_i32::<LittleEndian>(p.x).map_err(|e| Error::io(&path, e))?;
                w.write_i32::<LittleEndian>(p.y).map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }

    pub fn load_seeds(&self) -> Result<(MapHeader, i32, i32, Vec<(Pt2i, Pt2i)>)> {
        let path = self.path(SEEDS_PTS);
        let mut r = self.open(SEEDS_PTS)?;
        let header = Self::read_header(&mut r, &path)?;
        let tsw = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        let tsh = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        let count = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
        if count % 2 != 0 {
            return Err(Error::format(&path, "odd seed point count"));
        }
        let mut seeds = Vec::with_capacity((count / 2).max(0) as usize);
        for _ in 0..count / 2 {
            let x1 = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            let y1 = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            let x2 = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            let y2 = r.read_i32::<LittleEndian>().map_err(|e| Error::io(&path, e))?;
            seeds.push((Pt2i::new(x1, y1), Pt2i::new(x2, y2)));
        }
        Ok((header, tsw, tsh, seeds))
    }

    /// Writes the successful seeds as world-coordinate endpoint pairs
    /// (micrometres, cell centres), serpentine tile order.
    #[allow(clippy::too_many_arguments)]
    pub fn save_successful_seeds(
        &self,
        buckets: &[Vec<(Pt2i, Pt2i)>],
        tsw: usize,
        tsh: usize,
        xref: i64,
        yref: i64,
        cell_um: i64,
    ) -> Result<()> {
        let path = self.path(SUCSEEDS_TXT);
        let mut w = self.create(SUCSEEDS_TXT)?;
        let world = |p: Pt2i| {
            (
                xref + p.x as i64 * cell_um + cell_um / 2,
                yref + p.y as i64 * cell_um + cell_um / 2,
            )
        };
        for k in amrel_core::serpentine(tsw, tsh) {
            for &(p1, p2) in &buckets[k] {
                let (x1, y1) = world(p1);
                let (x2, y2) = world(p2);
                writeln!(w, "{x1} {y1} {x2} {y2}").map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }
}

/// Re-buckets seeds onto the doubled tile grid with doubled coordinates,
/// nudging the east/north endpoint one pixel outward so the pair keeps
/// its orientation.
fn rebucket_doubled(
    header: &MapHeader,
    tsw: i32,
    tsh: i32,
    buckets: &[Vec<(Pt2i, Pt2i)>],
) -> Vec<(Pt2i, Pt2i)> {
    let tw = header.width / (2 * tsw);
    let th = header.height / (2 * tsh);
    let mut rebucketed: Vec<Vec<(Pt2i, Pt2i)>> =
        vec![Vec::new(); (tsw * tsh * 4) as usize];
    for bucket in buckets {
        for &(p1, p2) in bucket {
            let kx = ((p1.x + p2.x) / 2) / tw;
            let ky = ((p1.y + p2.y) / 2) / th;
            if kx < 0 || ky < 0 || kx >= 2 * tsw || ky >= 2 * tsh {
                continue;
            }
            let (mut q1, mut q2) = (
                Pt2i::new(p1.x * 2, p1.y * 2),
                Pt2i::new(p2.x * 2, p2.y * 2),
            );
            if q2.x < q1.x {
                q1.x += 1;
            } else {
                q2.x += 1;
            }
            if q2.y < q1.y {
                q1.y += 1;
            } else {
                q2.y += 1;
            }
            rebucketed[(ky * tsw * 2 + kx) as usize].push((q1, q2));
        }
    }
    rebucketed.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> MapHeader {
        MapHeader {
            width: 8,
            height: 6,
            cell_size: 0.5,
        }
    }

    fn store() -> (tempfile::TempDir, StageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StageStore::new(dir.path().join("steps"));
        (dir, store)
    }

    #[test]
    fn test_byte_map_roundtrip() {
        let (_dir, store) = store();
        let data: Vec<u8> = (0..48).collect();
        let map = Raster::from_vec(data, 6, 8).unwrap();
        store.save_byte_map(SHADE_MAP, &header(), &map).unwrap();
        let (h, back) = store.load_byte_map(SHADE_MAP).unwrap();
        assert_eq!(h, header());
        assert_eq!(back.as_slice(), map.as_slice());
    }

    #[test]
    fn test_missing_artifact_is_stage_missing() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load_byte_map(RORPO_MAP),
            Err(Error::StageMissing(_))
        ));
    }

    #[test]
    fn test_sobel_roundtrip() {
        let (_dir, store) = store();
        let vecs: Vec<Vr2i> = (0..48).map(|i| Vr2i::new(i, -i)).collect();
        let gmap = GradientMap::from_raw(8, 6, vecs);
        store.save_sobel_map(&header(), &gmap).unwrap();
        let (h, back) = store.load_sobel_map().unwrap();
        assert_eq!(h, header());
        assert_eq!(back.as_slice(), gmap.as_slice());
    }

    #[test]
    fn test_fbsd_roundtrip() {
        let (_dir, store) = store();
        let dss = vec![
            DigitalStraightSegment::from_subpixel((1.0, 2.0), (11.0, 2.0), 512),
            DigitalStraightSegment::from_subpixel((0.5, 0.5), (0.5, 20.5), 512),
        ];
        store.save_fbsd_segments(&header(), 2, 3, &dss).unwrap();
        let (h, tsw, tsh, back) = store.load_fbsd_segments().unwrap();
        assert_eq!(h, header());
        assert_eq!((tsw, tsh), (2, 3));
        assert_eq!(back, dss);
    }

    #[test]
    fn test_seeds_roundtrip_serpentine_order() {
        let (_dir, store) = store();
        // 2x2 tile grid, one seed per tile
        let buckets: Vec<Vec<(Pt2i, Pt2i)>> = (0..4)
            .map(|k| vec![(Pt2i::new(k, 0), Pt2i::new(k, 2))])
            .collect();
        let h = MapHeader {
            width: 8,
            height: 8,
            cell_size: 0.5,
        };
        store.save_seeds(&h, 2, 2, &buckets, false).unwrap();
        let (_, tsw, tsh, seeds) = store.load_seeds().unwrap();
        assert_eq!((tsw, tsh), (2, 2));
        // serpentine over 2x2: tiles 0, 1, 3, 2
        let xs: Vec<i32> = seeds.iter().map(|(p1, _)| p1.x).collect();
        assert_eq!(xs, vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_half_size_seeds_double_and_nudge() {
        let (_dir, store) = store();
        let buckets = vec![vec![(Pt2i::new(1, 1), Pt2i::new(1, 3))]];
        let h = MapHeader {
            width: 8,
            height: 8,
            cell_size: 0.5,
        };
        store.save_seeds(&h, 1, 1, &buckets, true).unwrap();
        let (hh, tsw, tsh, seeds) = store.load_seeds().unwrap();
        assert_eq!(hh.width, 16);
        assert_eq!(hh.height, 16);
        assert!((hh.cell_size - 0.25).abs() < 1e-6);
        assert_eq!((tsw, tsh), (2, 2));
        let (q1, q2) = seeds[0];
        // coordinates doubled, upper endpoint nudged outward
        assert_eq!(q1, Pt2i::new(2, 2));
        assert_eq!(q2, Pt2i::new(3, 7));
        assert!(q2.y > q1.y, "orientation preserved");
    }

    #[test]
    fn test_successful_seeds_world_coordinates() {
        let (_dir, store) = store();
        let buckets = vec![vec![(Pt2i::new(0, 0), Pt2i::new(2, 0))]];
        store
            .save_successful_seeds(&buckets, 1, 1, 1_000_000, 2_000_000, 500_000)
            .unwrap();
        let text = std::fs::read_to_string(store.path(SUCSEEDS_TXT)).unwrap();
        assert_eq!(text.trim(), "1250000 2250000 2250000 2250000");
    }
}
