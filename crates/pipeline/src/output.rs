//! Stage PNG renderings
//!
//! Human-readable images of every stage output under the results
//! directory. The false-color palette derives from the label value, so
//! two identical runs produce identical images.

use crate::road_map::RoadMap;
use crate::store::StageStore;
use amrel_core::{DigitalStraightSegment, Error, Pt2i, Raster, Result};
use amrel_algorithms::GradientMap;
use amrel_tiles::{ShadingMode, TerrainMap};
use image::{GrayImage, RgbImage};
use std::path::Path;

fn write_gray(path: &Path, w: usize, h: usize, data: Vec<u8>) -> Result<()> {
    let img = GrayImage::from_raw(w as u32, h as u32, data)
        .ok_or_else(|| Error::format(path, "image buffer size mismatch"))?;
    img.save(path)
        .map_err(|e| Error::Other(format!("cannot write {}: {e}", path.display())))
}

fn write_rgb(path: &Path, w: usize, h: usize, data: Vec<u8>) -> Result<()> {
    let img = RgbImage::from_raw(w as u32, h as u32, data)
        .ok_or_else(|| Error::format(path, "image buffer size mismatch"))?;
    img.save(path)
        .map_err(|e| Error::Other(format!("cannot write {}: {e}", path.display())))
}

/// Deterministic dark color of road label `k` (channel sum capped so the
/// roads stay readable on a white background).
pub fn label_color(k: u16) -> [u8; 3] {
    let h = (k as u32).wrapping_mul(0x9E37_79B9).wrapping_add(0x85EB_CA6B);
    let mut c = [
        (h & 0xFF) as u32,
        ((h >> 8) & 0xFF) as u32,
        ((h >> 16) & 0xFF) as u32,
    ];
    let sum: u32 = c.iter().sum();
    if sum > 300 {
        for v in c.iter_mut() {
            *v = *v * 300 / sum;
        }
    }
    [c[0] as u8, c[1] as u8, c[2] as u8]
}

/// Hill-shade background bytes, or white when no DTM is attached.
fn background(dtm: Option<&TerrainMap>, w: usize, h: usize) -> Vec<u8> {
    match dtm {
        Some(tm) => {
            let mut data = Vec::with_capacity(w * h);
            for j in 0..h {
                for i in 0..w {
                    data.push(tm.get(i, j, ShadingMode::Hill));
                }
            }
            data
        }
        None => vec![255u8; w * h],
    }
}

/// Writes a byte raster as a grayscale PNG.
pub fn save_byte_image(store: &StageStore, name: &str, map: &Raster<u8>) -> Result<()> {
    write_gray(
        &store.path(name),
        map.cols(),
        map.rows(),
        map.as_slice().to_vec(),
    )
}

/// Writes the gradient magnitude, stretched over the full byte range.
pub fn save_sobel_image(store: &StageStore, name: &str, gmap: &GradientMap) -> Result<()> {
    let (w, h) = (gmap.width(), gmap.height());
    let mags: Vec<f64> = gmap.as_slice().iter().map(|v| (v.sq_norm() as f64).sqrt()).collect();
    let min = mags.iter().copied().fold(f64::INFINITY, f64::min);
    let max = mags.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(1e-12);
    let data: Vec<u8> = mags
        .iter()
        .map(|m| ((m - min) * 255.0 / span) as u8)
        .collect();
    write_gray(&store.path(name), w, h, data)
}

/// Draws the detected segments over white or the hill-shaded DTM.
#[allow(clippy::too_many_arguments)]
pub fn save_fbsd_image(
    store: &StageStore,
    name: &str,
    w: usize,
    h: usize,
    dss: &[DigitalStraightSegment],
    false_color: bool,
    dtm: Option<&TerrainMap>,
) -> Result<()> {
    let pixels_of = |seg: &DigitalStraightSegment| -> Vec<Pt2i> {
        let (a, b) = seg.naive_line();
        let (ax, ay) = a.to_f32();
        let (bx, by) = b.to_f32();
        Pt2i::new(ax as i32, ay as i32)
            .draw_to(Pt2i::new(bx as i32, by as i32))
            .into_iter()
            .filter(|p| p.x >= 0 && (p.x as usize) < w && p.y >= 0 && (p.y as usize) < h)
            .collect()
    };
    if false_color {
        let gray = background(dtm, w, h);
        let mut data: Vec<u8> = gray.iter().flat_map(|&v| [v, v, v]).collect();
        for (n, seg) in dss.iter().enumerate() {
            let c = label_color(n as u16 + 1);
            for p in pixels_of(seg) {
                let at = (p.y as usize * w + p.x as usize) * 3;
                data[at..at + 3].copy_from_slice(&c);
            }
        }
        write_rgb(&store.path(name), w, h, data)
    } else {
        let mut data = background(dtm, w, h);
        for seg in dss {
            for p in pixels_of(seg) {
                data[p.y as usize * w + p.x as usize] = 0;
            }
        }
        write_gray(&store.path(name), w, h, data)
    }
}

/// Draws the seed segments (sector coordinates, y up) over white or the
/// hill-shaded DTM.
pub fn save_seeds_image(
    store: &StageStore,
    name: &str,
    w: usize,
    h: usize,
    buckets: &[Vec<(Pt2i, Pt2i)>],
    dtm: Option<&TerrainMap>,
) -> Result<()> {
    let mut data = background(dtm, w, h);
    for bucket in buckets {
        for &(p1, p2) in bucket {
            for p in p1.draw_to(p2) {
                if p.x >= 0 && (p.x as usize) < w && p.y >= 0 && (p.y as usize) < h {
                    data[(h - 1 - p.y as usize) * w + p.x as usize] = 0;
                }
            }
        }
    }
    write_gray(&store.path(name), w, h, data)
}

/// Writes the road label map: white roads on the background, or one
/// deterministic color per label.
pub fn save_asd_image(
    store: &StageStore,
    name: &str,
    map: &RoadMap,
    false_color: bool,
    back_dtm: bool,
    dtm: Option<&TerrainMap>,
) -> Result<()> {
    let (w, h) = (map.width(), map.height());
    let labels = map.as_slice();
    if false_color {
        let gray = if back_dtm {
            background(dtm, w, h)
        } else {
            vec![255u8; w * h]
        };
        let mut data: Vec<u8> = gray.iter().flat_map(|&v| [v, v, v]).collect();
        for (i, &label) in labels.iter().enumerate() {
            if label != 0 || !back_dtm {
                let c = if label == 0 {
                    [255, 255, 255]
                } else {
                    label_color(label)
                };
                data[i * 3..i * 3 + 3].copy_from_slice(&c);
            }
        }
        write_rgb(&store.path(name), w, h, data)
    } else {
        let mut data = if back_dtm {
            background(dtm, w, h)
        } else {
            vec![0u8; w * h]
        };
        for (i, &label) in labels.iter().enumerate() {
            if label != 0 {
                data[i] = 255;
            }
        }
        write_gray(&store.path(name), w, h, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ROADS_PNG;

    #[test]
    fn test_label_colors_are_dark_and_stable() {
        for k in 1..200u16 {
            let c = label_color(k);
            assert!(c[0] as u32 + c[1] as u32 + c[2] as u32 <= 300);
            assert_eq!(c, label_color(k));
        }
    }

    #[test]
    fn test_roads_png_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageStore::new(dir.path());
        let mut map = RoadMap::new(8, 8);
        map.add(&[vec![Pt2i::new(2, 2), Pt2i::new(3, 2)]]);
        save_asd_image(&store, ROADS_PNG, &map, false, false, None).unwrap();
        let img = image::open(store.path(ROADS_PNG)).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (8, 8));
        // south-up (2, 2) lands on image row h-1-2 = 5
        assert_eq!(img.get_pixel(2, 5).0[0], 255);
        assert_eq!(img.get_pixel(6, 6).0[0], 0);
    }

    #[test]
    fn test_seeds_image_flips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageStore::new(dir.path());
        let buckets = vec![vec![(Pt2i::new(1, 1), Pt2i::new(5, 1))]];
        save_seeds_image(&store, "seeds.png", 8, 8, &buckets, None).unwrap();
        let img = image::open(store.path("seeds.png")).unwrap().to_luma8();
        assert_eq!(img.get_pixel(3, 6).0[0], 0);
        assert_eq!(img.get_pixel(3, 1).0[0], 255);
    }
}
