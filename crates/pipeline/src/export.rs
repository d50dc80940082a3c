//! Vector export of detected roads
//!
//! Writes ESRI polyline shapefiles (`.shp` plus its `.shx` index) of the
//! road centerlines or the left/right road bounds, in world coordinates.

use amrel_core::{Error, Result};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const SHAPE_POLYLINE: i32 = 3;
const HEADER_WORDS: i32 = 50; // 100-byte header in 16-bit words

/// A polyline in world metres.
pub type Polyline = Vec<(f64, f64)>;

/// Writes `base.shp` and `base.shx` holding the given polylines.
/// Degenerate lines (fewer than two points) are skipped.
pub fn write_polylines(base: &Path, lines: &[Polyline]) -> Result<()> {
    let lines: Vec<&Polyline> = lines.iter().filter(|l| l.len() >= 2).collect();
    let bbox = bounding_box(&lines);

    // record content length in 16-bit words: shape type + bbox + part
    // and point counts + one part offset + points
    let content_words =
        |l: &Polyline| -> i32 { ((4 + 32 + 8 + 4 + 16 * l.len()) / 2) as i32 };

    let shp_path = base.with_extension("shp");
    let shx_path = base.with_extension("shx");
    let mut shp = BufWriter::new(File::create(&shp_path).map_err(|e| Error::io(&shp_path, e))?);
    let mut shx = BufWriter::new(File::create(&shx_path).map_err(|e| Error::io(&shx_path, e))?);

    let total_words: i32 = HEADER_WORDS
        + lines
            .iter()
            .map(|l| 4 + content_words(l))
            .sum::<i32>();
    write_main_header(&mut shp, total_words, bbox, &shp_path)?;
    write_main_header(
        &mut shx,
        HEADER_WORDS + 4 * lines.len() as i32,
        bbox,
        &shx_path,
    )?;

    let mut offset = HEADER_WORDS;
    for (n, line) in lines.iter().enumerate() {
        let words = content_words(line);
        let e = |err| Error::io(&shx_path, err);
        shx.write_i32::<BigEndian>(offset).map_err(e)?;
        shx.write_i32::<BigEndian>(words).map_err(e)?;
        offset += 4 + words;

        let e = |err| Error::io(&shp_path, err);
        shp.write_i32::<BigEndian>(n as i32 + 1).map_err(e)?;
        shp.write_i32::<BigEndian>(words).map_err(e)?;
        shp.write_i32::<LittleEndian>(SHAPE_POLYLINE).map_err(e)?;
        let (xmin, ymin, xmax, ymax) = line_box(line);
        for v in [xmin, ymin, xmax, ymax] {
            shp.write_f64::<LittleEndian>(v).map_err(e)?;
        }
        shp.write_i32::<LittleEndian>(1).map_err(e)?; // one part
        shp.write_i32::<LittleEndian>(line.len() as i32).map_err(e)?;
        shp.write_i32::<LittleEndian>(0).map_err(e)?; // part offset
        for &(x, y) in line.iter() {
            shp.write_f64::<LittleEndian>(x).map_err(e)?;
            shp.write_f64::<LittleEndian>(y).map_err(e)?;
        }
    }
    Ok(())
}

fn write_main_header(
    w: &mut impl std::io::Write,
    length_words: i32,
    bbox: (f64, f64, f64, f64),
    path: &Path,
) -> Result<()> {
    let e = |err| Error::io(path, err);
    w.write_i32::<BigEndian>(9994).map_err(e)?;
    for _ in 0..5 {
        w.write_i32::<BigEndian>(0).map_err(e)?;
    }
    w.write_i32::<BigEndian>(length_words).map_err(e)?;
    w.write_i32::<LittleEndian>(1000).map_err(e)?; // version
    w.write_i32::<LittleEndian>(SHAPE_POLYLINE).map_err(e)?;
    let (xmin, ymin, xmax, ymax) = bbox;
    for v in [xmin, ymin, xmax, ymax, 0.0, 0.0, 0.0, 0.0] {
        w.write_f64::<LittleEndian>(v).map_err(e)?;
    }
    Ok(())
}

fn line_box(line: &Polyline) -> (f64, f64, f64, f64) {
    let mut b = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in line {
        b.0 = b.0.min(x);
        b.1 = b.1.min(y);
        b.2 = b.2.max(x);
        b.3 = b.3.max(y);
    }
    b
}

fn bounding_box(lines: &[&Polyline]) -> (f64, f64, f64, f64) {
    let mut b = (0.0, 0.0, 0.0, 0.0);
    let mut first = true;
    for line in lines {
        let lb = line_box(line);
        if first {
            b = lb;
            first = false;
        } else {
            b = (b.0.min(lb.0), b.1.min(lb.1), b.2.max(lb.2), b.3.max(lb.3));
        }
    }
    b
}
