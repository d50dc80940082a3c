//! End-to-end pipeline scenarios over synthetic sectors

use amrel_core::Pt2i;
use amrel_pipeline::{AmrelConfig, AmrelTool, MapHeader, StageStore, Step};
use amrel_tiles::nvm::{NormalMap, NormalMapHeader};
use amrel_tiles::{CloudAccess, PointTile};
use std::fs;
use std::path::Path;

const CELL: i32 = 500_000; // 0.5 m in micrometres
const TILE: i32 = 64;

/// Writes a 2x1 sector whose first tile carries a 12-cell-wide band of
/// steeper ground running north-south: slope shading turns it into an
/// elongated bright stripe the whole pipeline can chew on.
fn write_stripe_sector(dir: &Path) {
    fs::create_dir_all(dir.join("nvm")).unwrap();
    fs::create_dir_all(dir.join("til/mid")).unwrap();
    fs::create_dir_all(dir.join("tilesets")).unwrap();

    for tx in 0..2i64 {
        let mut normals = Vec::with_capacity((TILE * TILE) as usize);
        for _row in 0..TILE {
            for col in 0..TILE {
                let steep = tx == 0 && (30..42).contains(&col);
                normals.push(if steep {
                    [0.6, 0.0, 0.8]
                } else {
                    [0.0, 0.0, 1.0]
                });
            }
        }
        let header = NormalMapHeader {
            cols: TILE,
            rows: TILE,
            cell_size: CELL,
            xmin: tx * TILE as i64 * CELL as i64,
            ymin: 0,
        };
        let name = format!("t{tx}");
        NormalMap::from_normals(header, normals)
            .unwrap()
            .save(dir.join(format!("nvm/{name}.nvm")))
            .unwrap();

        let mut til = PointTile::for_dtm_tile(
            CloudAccess::Mid,
            TILE as usize,
            TILE as usize,
            CELL,
            tx * TILE as i64 * CELL as i64,
            0,
            0,
        );
        til.set_points(&[]);
        til.save(dir.join(format!("til/mid/mid_{name}.til"))).unwrap();
    }

    fs::write(dir.join("tilesets/stripe.txt"), "t0\nt1\n").unwrap();
    fs::write(dir.join("tilesets/last_set.txt"), "stripe\n").unwrap();
}

fn stripe_config(dir: &Path) -> AmrelConfig {
    let mut cfg = AmrelConfig::load(dir).unwrap();
    cfg.set_cloud_access(CloudAccess::Mid);
    cfg.set_min_bs_length(0);
    cfg.set_verbose(false);
    cfg
}

fn read_artifact(dir: &Path, name: &str) -> Vec<u8> {
    fs::read(dir.join("steps").join(name)).unwrap()
}

#[test]
fn test_sawing_produces_seeds() {
    let tmp = tempfile::tempdir().unwrap();
    write_stripe_sector(tmp.path());
    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Sawing);
    AmrelTool::new(cfg).run().unwrap();

    let store = StageStore::new(tmp.path().join("steps"));
    let (h, tsw, tsh, seeds) = store.load_seeds().unwrap();
    assert_eq!(h.width, 128);
    assert_eq!(h.height, 64);
    assert_eq!((tsw, tsh), (2, 1));
    assert!(!seeds.is_empty(), "the stripe should yield seeds");
    // all seeds straddle the stripe in the first tile
    for (p1, p2) in &seeds {
        let mid = Pt2i::midpoint(*p1, *p2);
        assert!(mid.x < 64, "seed strayed to {mid:?}");
    }
}

#[test]
fn test_stage_by_stage_matches_sawing() {
    let tmp = tempfile::tempdir().unwrap();
    write_stripe_sector(tmp.path());

    // one-shot sawing, flat path
    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Sawing);
    AmrelTool::new(cfg).run().unwrap();
    let flat_seeds = read_artifact(tmp.path(), "seeds.pts");

    // the same stages, one process per stage
    for step in [Step::Shade, Step::Rorpo, Step::Sobel, Step::Fbsd, Step::Seeds] {
        let mut cfg = stripe_config(tmp.path());
        cfg.set_step(step);
        AmrelTool::new(cfg).run().unwrap();
    }
    let staged_seeds = read_artifact(tmp.path(), "seeds.pts");
    assert_eq!(flat_seeds, staged_seeds);
}

#[test]
fn test_pad_covering_the_sector_matches_flat() {
    let tmp = tempfile::tempdir().unwrap();
    write_stripe_sector(tmp.path());

    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Sawing);
    AmrelTool::new(cfg).run().unwrap();
    let flat_seeds = read_artifact(tmp.path(), "seeds.pts");

    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Sawing);
    cfg.set_pad_size(3).unwrap(); // larger than the 2x1 sector: one pad
    AmrelTool::new(cfg).run().unwrap();
    let pad_seeds = read_artifact(tmp.path(), "seeds.pts");
    assert_eq!(flat_seeds, pad_seeds);
}

#[test]
fn test_shade_stage_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    write_stripe_sector(tmp.path());
    for _ in 0..2 {
        let mut cfg = stripe_config(tmp.path());
        cfg.set_step(Step::Shade);
        AmrelTool::new(cfg).run().unwrap();
    }
    let first = read_artifact(tmp.path(), "shade.map");
    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Shade);
    AmrelTool::new(cfg).run().unwrap();
    assert_eq!(first, read_artifact(tmp.path(), "shade.map"));
}

#[test]
fn test_missing_upstream_artifact_halts() {
    let tmp = tempfile::tempdir().unwrap();
    write_stripe_sector(tmp.path());
    let mut cfg = stripe_config(tmp.path());
    cfg.set_step(Step::Rorpo); // no shade.map yet
    assert!(AmrelTool::new(cfg).run().is_err());
}

/// Writes a single-tile sector with a point cloud carrying a flat road
/// corridor, plus a ready-made seed file, so ASD runs in isolation.
fn write_road_sector(dir: &Path, seeds: &[(Pt2i, Pt2i)]) {
    fs::create_dir_all(dir.join("til/mid")).unwrap();
    fs::create_dir_all(dir.join("tilesets")).unwrap();

    let mut pts = Vec::new();
    for iy in 0..50 {
        for ix in 0..50 {
            let x = 0.1 + ix as f64 * 0.2;
            let y = 0.1 + iy as f64 * 0.2;
            let z = 100.0 + ((y - 5.0).abs() - 1.5).max(0.0) * 0.8;
            pts.push(((x * 1e6) as i64, (y * 1e6) as i64, (z * 1e6) as i64));
        }
    }
    let mut til = PointTile::for_dtm_tile(CloudAccess::Mid, 20, 20, CELL, 0, 0, 0);
    til.set_points(&pts);
    til.save(dir.join("til/mid/mid_t0.til")).unwrap();

    fs::write(dir.join("tilesets/road.txt"), "t0\n").unwrap();
    fs::write(dir.join("tilesets/last_set.txt"), "road\n").unwrap();

    let store = StageStore::new(dir.join("steps"));
    let header = MapHeader {
        width: 20,
        height: 20,
        cell_size: 0.5,
    };
    let buckets = vec![seeds.to_vec()];
    store.save_seeds(&header, 1, 1, &buckets, false).unwrap();
}

fn road_config(dir: &Path) -> AmrelConfig {
    let mut cfg = AmrelConfig::load(dir).unwrap();
    cfg.set_cloud_access(CloudAccess::Mid);
    cfg.set_step(Step::Asd);
    cfg.set_verbose(false);
    cfg
}

#[test]
fn test_asd_extracts_the_road() {
    let tmp = tempfile::tempdir().unwrap();
    let seed = (Pt2i::new(10, 2), Pt2i::new(10, 18));
    write_road_sector(tmp.path(), &[seed]);

    let mut tool = AmrelTool::new(road_config(tmp.path()));
    tool.run().unwrap();
    let map = tool.road_map().expect("road map produced");
    assert_eq!(map.number_of_roads(), 1);

    // final artifacts of the run
    let autodet = fs::read_to_string(tmp.path().join("steps/autodet.ini")).unwrap();
    assert!(autodet.starts_with("[AMREL]"));
    let sucseeds = fs::read_to_string(tmp.path().join("steps/sucseeds.txt")).unwrap();
    assert_eq!(sucseeds.lines().count(), 1);
    let png = image::open(tmp.path().join("steps/roads.png")).unwrap().to_luma8();
    assert!(png.pixels().any(|p| p.0[0] == 255), "no road pixel painted");
}

#[test]
fn test_occupied_center_suppresses_second_seed() {
    let tmp = tempfile::tempdir().unwrap();
    let seeds = [
        (Pt2i::new(10, 2), Pt2i::new(10, 18)),
        (Pt2i::new(11, 2), Pt2i::new(11, 18)),
    ];
    write_road_sector(tmp.path(), &seeds);

    let mut tool = AmrelTool::new(road_config(tmp.path()));
    tool.run().unwrap();
    // the first seed paints the corridor; the second one's centre is
    // already labelled
    assert_eq!(tool.road_map().unwrap().number_of_roads(), 1);
    let sucseeds = fs::read_to_string(tmp.path().join("steps/sucseeds.txt")).unwrap();
    assert_eq!(sucseeds.lines().count(), 1);
}

#[test]
fn test_asd_runs_are_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let seed = (Pt2i::new(10, 2), Pt2i::new(10, 18));
    write_road_sector(tmp.path(), &[seed]);

    AmrelTool::new(road_config(tmp.path())).run().unwrap();
    let first = fs::read(tmp.path().join("steps/roads.png")).unwrap();
    AmrelTool::new(road_config(tmp.path())).run().unwrap();
    let second = fs::read(tmp.path().join("steps/roads.png")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_buffered_asd_matches_unbuffered() {
    let tmp = tempfile::tempdir().unwrap();
    let seed = (Pt2i::new(10, 2), Pt2i::new(10, 18));
    write_road_sector(tmp.path(), &[seed]);

    AmrelTool::new(road_config(tmp.path())).run().unwrap();
    let unbuffered = fs::read(tmp.path().join("steps/roads.png")).unwrap();

    let mut cfg = road_config(tmp.path());
    cfg.set_buffer_size(3).unwrap();
    AmrelTool::new(cfg).run().unwrap();
    let buffered = fs::read(tmp.path().join("steps/roads.png")).unwrap();
    assert_eq!(unbuffered, buffered);
}
