//! Plateau detection on one cross-section scan
//!
//! A plateau is a run of scan samples whose heights stay within the
//! thickness tolerance over a road-like extent: the flat corridor a
//! carriage track cuts into a hillside.

/// A plateau on the cross-section axis, positions in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plateau {
    pub start: f64,
    pub end: f64,
    pub center: f64,
    /// Mean height of the run, metres
    pub height: f64,
    /// Number of supporting points
    pub support: usize,
}

impl Plateau {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Acceptance bounds for plateau search.
#[derive(Debug, Clone, Copy)]
pub struct PlateauModel {
    /// Minimal plateau extent, metres
    pub min_length: f64,
    /// Maximal plateau extent, metres
    pub max_length: f64,
    /// Height spread allowed inside the run, metres
    pub thickness_tolerance: f64,
    /// Maximal cross slope of the run (tangent)
    pub max_tilt_tan: f64,
}

/// Finds the best plateau in `samples` (`(position, height)` pairs along
/// the scan axis). With `center_ref = (c, shift)` only runs whose centre
/// stays within `shift` of `c` qualify. The best run carries the most
/// points; ties go to the longer, then the left-most run, so the result
/// only depends on the sample set.
pub fn find_plateau(
    samples: &mut Vec<(f64, f64)>,
    model: &PlateauModel,
    center_ref: Option<(f64, f64)>,
) -> Option<Plateau> {
    if samples.len() < 3 {
        return None;
    }
    samples.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let n = samples.len();
    let mut best: Option<Plateau> = None;
    for i in 0..n {
        let (mut zmin, mut zmax) = (samples[i].1, samples[i].1);
        let mut j = i + 1;
        while j < n {
            let z = samples[j].1;
            let lo = zmin.min(z);
            let hi = zmax.max(z);
            if hi - lo > model.thickness_tolerance
                || samples[j].0 - samples[i].0 > model.max_length
            {
                break;
            }
            zmin = lo;
            zmax = hi;
            j += 1;
        }
        let run = &samples[i..j];
        let extent = run[run.len() - 1].0 - run[0].0;
        if extent < model.min_length {
            continue;
        }
        if cross_slope(run).abs() > model.max_tilt_tan {
            continue;
        }
        let center = (run[0].0 + run[run.len() - 1].0) / 2.0;
        if let Some((c, shift)) = center_ref {
            if (center - c).abs() > shift {
                continue;
            }
        }
        let height = run.iter().map(|s| s.1).sum::<f64>() / run.len() as f64;
        let cand = Plateau {
            start: run[0].0,
            end: run[run.len() - 1].0,
            center,
            height,
            support: run.len(),
        };
        let better = match &best {
            None => true,
            Some(b) => {
                cand.support > b.support
                    || (cand.support == b.support && cand.length() > b.length())
            }
        };
        if better {
            best = Some(cand);
        }
    }
    best
}

/// Regression slope of heights over positions.
fn cross_slope(run: &[(f64, f64)]) -> f64 {
    let n = run.len() as f64;
    let (mut st, mut sz, mut stt, mut stz) = (0.0, 0.0, 0.0, 0.0);
    for &(t, z) in run {
        st += t;
        sz += z;
        stt += t * t;
        stz += t * z;
    }
    let den = stt - st * st / n;
    if den.abs() < 1e-12 {
        0.0
    } else {
        (stz - st * sz / n) / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PlateauModel {
        PlateauModel {
            min_length: 2.0,
            max_length: 6.0,
            thickness_tolerance: 0.25,
            max_tilt_tan: (10f64).to_radians().tan(),
        }
    }

    /// Hillside with a flat shelf between 4 m and 7 m.
    fn shelf_samples() -> Vec<(f64, f64)> {
        let mut s = Vec::new();
        let mut t = 0.0;
        while t <= 10.0 {
            let z = if (4.0..=7.0).contains(&t) {
                100.0
            } else if t < 4.0 {
                100.0 + (4.0 - t) * 0.8
            } else {
                100.0 - (t - 7.0) * 0.8
            };
            s.push((t, z));
            t += 0.2;
        }
        s
    }

    #[test]
    fn test_finds_the_shelf() {
        let mut s = shelf_samples();
        let p = find_plateau(&mut s, &model(), None).expect("plateau");
        assert!((p.start - 4.0).abs() < 0.5, "start {p:?}");
        assert!((p.end - 7.0).abs() < 0.5);
        assert!((p.height - 100.0).abs() < 0.2);
    }

    #[test]
    fn test_steady_slope_has_no_plateau() {
        let mut s: Vec<(f64, f64)> = (0..50).map(|i| (i as f64 * 0.2, i as f64 * 0.1)).collect();
        assert!(find_plateau(&mut s, &model(), None).is_none());
    }

    #[test]
    fn test_center_reference_filters_runs() {
        let mut s = shelf_samples();
        let near = find_plateau(&mut s, &model(), Some((5.5, 1.0)));
        assert!(near.is_some());
        let far = find_plateau(&mut s, &model(), Some((0.5, 0.5)));
        assert!(far.is_none());
    }

    #[test]
    fn test_too_short_shelf_is_rejected() {
        let mut s: Vec<(f64, f64)> = Vec::new();
        let mut t = 0.0;
        while t <= 6.0 {
            let z = if (2.0..=3.0).contains(&t) { 50.0 } else { 50.0 + t };
            s.push((t, z));
            t += 0.2;
        }
        // shelf is only 1 m long, below the 2 m floor
        assert!(find_plateau(&mut s, &model(), None).is_none());
    }
}
