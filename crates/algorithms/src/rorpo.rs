//! Elongated-structure enhancement
//!
//! Ranking of orientation responses of path operators: grayscale linear
//! openings along the four principal orientations, combined per pixel as
//! the top response minus the third. Thin elongated structures answer
//! strongly in one orientation only and survive the ranking; compact
//! blobs answer in all four and cancel out.

use amrel_core::Raster;
use rayon::prelude::*;

/// Filters `src` with path operators of the given length. `dilation`
/// pre-dilates the input with a 3x3 maximum filter that many times.
pub fn rorpo(src: &Raster<u8>, length: usize, dilation: usize) -> Raster<u8> {
    let (h, w) = (src.rows(), src.cols());
    let mut base = src.as_slice().to_vec();
    for _ in 0..dilation {
        base = dilate3x3(&base, w, h);
    }

    let responses = [
        open_horizontal(&base, w, h, length),
        open_vertical(&base, w, h, length),
        open_diagonal(&base, w, h, length, true),
        open_diagonal(&base, w, h, length, false),
    ];

    let data: Vec<u8> = (0..w * h)
        .into_par_iter()
        .map(|i| {
            let mut r = [
                responses[0][i],
                responses[1][i],
                responses[2][i],
                responses[3][i],
            ];
            r.sort_unstable_by(|a, b| b.cmp(a));
            r[0] - r[2]
        })
        .collect();
    Raster::from_vec(data, h, w).expect("rorpo output dimensions")
}

/// 3x3 grayscale dilation (maximum filter).
fn dilate3x3(v: &[u8], w: usize, h: usize) -> Vec<u8> {
    (0..h)
        .into_par_iter()
        .flat_map(|j| {
            let mut row = vec![0u8; w];
            for (i, out) in row.iter_mut().enumerate() {
                let mut m = 0u8;
                for dj in j.saturating_sub(1)..(j + 2).min(h) {
                    for di in i.saturating_sub(1)..(i + 2).min(w) {
                        m = m.max(v[dj * w + di]);
                    }
                }
                *out = m;
            }
            row
        })
        .collect()
}

/// Grayscale opening of a 1-D line with a flat segment of `len` samples.
/// Lines shorter than the segment have no surviving path and open to 0.
fn open_line(v: &[u8], len: usize) -> Vec<u8> {
    let n = v.len();
    let mut out = vec![0u8; n];
    if n < len {
        return out;
    }
    // erosion: e[i] = min(v[i..i+len])
    let mut eroded = vec![0u8; n - len + 1];
    for (i, e) in eroded.iter_mut().enumerate() {
        *e = *v[i..i + len].iter().min().unwrap();
    }
    // dilation by the reflected segment: out[i] = max(e[j]), j in the
    // windows containing i
    for (i, o) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(len - 1).min(n - len);
        let hi = i.min(n - len);
        *o = *eroded[lo..=hi].iter().max().unwrap();
    }
    out
}

fn open_horizontal(v: &[u8], w: usize, h: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(j, row)| {
        row.copy_from_slice(&open_line(&v[j * w..(j + 1) * w], len));
    });
    out
}

fn open_vertical(v: &[u8], w: usize, h: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    for i in 0..w {
        let col: Vec<u8> = (0..h).map(|j| v[j * w + i]).collect();
        let opened = open_line(&col, len);
        for (j, o) in opened.into_iter().enumerate() {
            out[j * w + i] = o;
        }
    }
    out
}

/// Opening along diagonals; `down_right` selects the (1, 1) direction,
/// otherwise (1, -1).
fn open_diagonal(v: &[u8], w: usize, h: usize, len: usize, down_right: bool) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    // every diagonal starts on the top row or on a side column
    let mut starts: Vec<(usize, usize)> = (0..w).map(|i| (i, 0)).collect();
    if down_right {
        starts.extend((1..h).map(|j| (0, j)));
    } else {
        starts.extend((1..h).map(|j| (w - 1, j)));
    }
    for (si, sj) in starts {
        let mut cells = Vec::new();
        let (mut i, mut j) = (si as isize, sj as isize);
        let di = if down_right { 1 } else { -1 };
        while i >= 0 && (i as usize) < w && (j as usize) < h {
            cells.push(j as usize * w + i as usize);
            i += di;
            j += 1;
        }
        let line: Vec<u8> = cells.iter().map(|&c| v[c]).collect();
        let opened = open_line(&line, len);
        for (c, o) in cells.into_iter().zip(opened) {
            out[c] = o;
        }
    }
    out
}
