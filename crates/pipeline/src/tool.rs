//! Pipeline orchestrator
//!
//! Drives the six detection stages over a tile sector, persisting every
//! stage boundary through the stage store so any stage can be rerun in
//! isolation. The ASD driver at the end owns the road label map and the
//! occupied-centre seed suppression rule.

use crate::config::{AmrelConfig, ExportMode, Step};
use crate::export;
use crate::output;
use crate::road_map::RoadMap;
use crate::store::{
    MapHeader, StageStore, FBSD_PNG, HILL_PNG, RORPO_MAP, RORPO_PNG, SEEDS_PNG, SEEDS_PTS,
    SHADE_MAP, SHADE_PNG, SOBEL_PNG,
};
use amrel_core::{
    serpentine, DigitalStraightSegment, Error, Pt2i, Raster, Result, GRID_SUBDIVISION,
};
use amrel_algorithms::{
    rorpo, BsDetector, CTrackDetector, CarriageTrack, GradientMap, PadRef, SeedBuilder,
};
use amrel_tiles::{PointTileSet, ShadingMode, TerrainMap, XYZ_UNIT};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// Nominal detector tuning for automatic road extraction.
const NOMINAL_PLATEAU_LACK_TOLERANCE: u32 = 5;
const NOMINAL_PLATEAU_MAX_TILT: i32 = 10;
const NOMINAL_MAX_SHIFT_LENGTH: f64 = 0.5;
const NOMINAL_PLATEAU_MIN_LENGTH: f64 = 2.0;
const NOMINAL_PLATEAU_THICKNESS_TOLERANCE: f64 = 0.25;
const NOMINAL_SLOPE_TOLERANCE: f64 = 0.10;
const NOMINAL_SIDE_SHIFT_TOLERANCE: f64 = 0.5;

/// RORPO path length and pre-dilation used by the pipeline.
const RORPO_LENGTH: usize = 30;
const RORPO_DILATION: usize = 1;

/// Automatic mountain road extractor.
pub struct AmrelTool {
    cfg: AmrelConfig,
    store: StageStore,

    /// Sector raster width in cells
    vm_width: usize,
    /// Sector raster height in cells
    vm_height: usize,
    /// DTM cell size in metres
    csize: f32,
    sub_div: i32,

    dtm_in: Option<TerrainMap>,
    dtm_map: Option<Raster<u8>>,
    rorpo_map: Option<Raster<u8>>,
    gmap: Option<GradientMap>,
    bsdet: BsDetector,
    dss: Vec<DigitalStraightSegment>,

    ptset: Option<PointTileSet>,
    tile_loaded: bool,
    buf_created: bool,

    out_seeds: Vec<Vec<(Pt2i, Pt2i)>>,
    out_sucseeds: Vec<Vec<(Pt2i, Pt2i)>>,
    ctdet: Option<CTrackDetector>,
    road_map: Option<RoadMap>,
    road_sections: Vec<CarriageTrack>,
    save_seeds_on: bool,
}

impl AmrelTool {
    pub fn new(cfg: AmrelConfig) -> Self {
        let store = StageStore::new(cfg.steps_dir());
        Self {
            cfg,
            store,
            vm_width: 0,
            vm_height: 0,
            csize: 0.5,
            sub_div: GRID_SUBDIVISION,
            dtm_in: None,
            dtm_map: None,
            rorpo_map: None,
            gmap: None,
            bsdet: BsDetector::new(),
            dss: Vec::new(),
            ptset: None,
            tile_loaded: false,
            buf_created: false,
            out_seeds: Vec::new(),
            out_sucseeds: Vec::new(),
            ctdet: None,
            road_map: None,
            road_sections: Vec::new(),
            save_seeds_on: true,
        }
    }

    pub fn config(&self) -> &AmrelConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut AmrelConfig {
        &mut self.cfg
    }

    /// Map of detected roads, present after a successful ASD stage.
    pub fn road_map(&self) -> Option<&RoadMap> {
        self.road_map.as_ref()
    }

    pub fn vm_width(&self) -> usize {
        self.vm_width
    }

    pub fn vm_height(&self) -> usize {
        self.vm_height
    }

    // Buffer releases, in stage order

    pub fn clear_dtm(&mut self) {
        self.dtm_in = None;
    }

    pub fn clear_shading(&mut self) {
        self.dtm_map = None;
    }

    pub fn clear_rorpo(&mut self) {
        self.rorpo_map = None;
    }

    pub fn clear_sobel(&mut self) {
        self.gmap = None;
    }

    pub fn clear_fbsd(&mut self) {
        self.dss.clear();
    }

    pub fn clear_seeds(&mut self) {
        self.out_seeds.clear();
    }

    /// Builds the track detector with the nominal automatic tuning.
    fn add_track_detector(&mut self) {
        let mut det = CTrackDetector::new();
        det.set_plateau_lack_tolerance(NOMINAL_PLATEAU_LACK_TOLERANCE);
        det.set_max_shift_length(NOMINAL_MAX_SHIFT_LENGTH);
        det.set_initial_detection(false);
        det.set_min_length(NOMINAL_PLATEAU_MIN_LENGTH);
        det.set_thickness_tolerance(NOMINAL_PLATEAU_THICKNESS_TOLERANCE);
        det.set_slope_tolerance(NOMINAL_SLOPE_TOLERANCE);
        det.set_side_shift_tolerance(NOMINAL_SIDE_SHIFT_TOLERANCE);
        det.set_max_tilt(NOMINAL_PLATEAU_MAX_TILT);
        if let Some(tail) = self.cfg.tail_min_size() {
            det.set_tail_min_size(tail);
        }
        det.set_points_grid(
            self.vm_width as i32,
            self.vm_height as i32,
            self.sub_div,
            self.csize as f64,
        );
        det.set_automatic(true);
        self.ctdet = Some(det);
    }

    /// Loads the tile set to process: normal maps when `dtm_on`, point
    /// payloads when `pts_on` (headers only otherwise).
    pub fn load_tile_set(&mut self, dtm_on: bool, pts_on: bool) -> Result<()> {
        if dtm_on && self.dtm_in.is_none() {
            self.dtm_in = Some(TerrainMap::new());
        }
        if self.ptset.is_none() {
            self.ptset = Some(PointTileSet::new(self.cfg.buffer_size()));
        }

        let list = self.cfg.tiles()?;
        let text = std::fs::read_to_string(&list).map_err(|e| Error::io(&list, e))?;
        for name in text.split_whitespace() {
            let nvm = self.cfg.nvm_path(name);
            let til = self.cfg.til_path(name);
            if dtm_on {
                info!(file = %nvm.display(), "reading");
                self.dtm_in.as_mut().unwrap().add_normal_map_file(&nvm)?;
            }
            if self.ptset.as_mut().unwrap().add_tile(&til, pts_on).is_err() {
                // derive the missing class once, then retry
                self.cfg.create_alt_til(name)?;
                self.ptset
                    .as_mut()
                    .unwrap()
                    .add_tile(&til, pts_on)
                    .map_err(|_| Error::format(&til, "header inconsistent with the tile set"))?;
            }
            info!(file = %til.display(), "reading");
        }

        let ptset = self.ptset.as_mut().unwrap();
        ptset.create()?;
        info!(points = ptset.size(), "tile set loaded");
        if dtm_on {
            let (cols, rows) = (ptset.columns_of_tiles(), ptset.rows_of_tiles());
            let (xref, yref) = (ptset.xref(), ptset.yref());
            let dtm = self.dtm_in.as_mut().unwrap();
            dtm.assemble(cols, rows, xref, yref, true)?;
            let geometry = dtm.geometry();
            self.vm_width = geometry.width();
            self.vm_height = geometry.height();
            self.csize = geometry.cell_size as f32 / XYZ_UNIT as f32;
        }
        if let Some(det) = self.ctdet.as_mut() {
            det.set_points_grid(
                self.vm_width as i32,
                self.vm_height as i32,
                self.sub_div,
                self.csize as f64,
            );
        }
        Ok(())
    }

    fn header(&self) -> MapHeader {
        MapHeader {
            width: self.vm_width as i32,
            height: self.vm_height as i32,
            cell_size: self.csize,
        }
    }

    fn apply_header(&mut self, h: &MapHeader) {
        self.vm_width = h.width as usize;
        self.vm_height = h.height as usize;
        self.csize = h.cell_size;
    }

    // Stage kernels

    /// Step 1: slope shading of the DTM.
    pub fn process_shading(&mut self) {
        info!("shading ...");
        let dtm = self.dtm_in.as_ref().expect("terrain map loaded");
        self.dtm_map = Some(dtm.shade_sector(ShadingMode::Slope));
        info!("shading OK");
    }

    /// Step 2: RORPO filtering of the shaded raster.
    pub fn process_rorpo(&mut self) {
        info!("rorpo ...");
        let src = self.dtm_map.as_ref().expect("shading raster present");
        self.rorpo_map = Some(rorpo(src, RORPO_LENGTH, RORPO_DILATION));
        info!("rorpo OK");
    }

    /// Step 3: Sobel 5x5 gradient map, from the RORPO raster or straight
    /// from the shading when RORPO was skipped.
    pub fn process_sobel(&mut self) {
        info!("sobel 5x5 ...");
        let src = self
            .rorpo_map
            .as_ref()
            .or(self.dtm_map.as_ref())
            .expect("input raster present");
        self.gmap = Some(GradientMap::sobel5(src));
        info!("sobel 5x5 OK");
    }

    /// Step 4: FBSD blurred segment detection.
    pub fn process_fbsd(&mut self) {
        info!("fbsd ...");
        let thickness = if self.cfg.is_half_size_seeds_on() {
            self.cfg.max_bs_thickness() / 2
        } else {
            self.cfg.max_bs_thickness()
        };
        self.bsdet.set_assigned_thickness(thickness);
        let gmap = self.gmap.as_ref().expect("gradient map present");
        self.dss = self.bsdet.detect_all(gmap);
        info!(segments = self.dss.len(), "fbsd OK");
    }

    /// Step 5: seed production, sector-wide or for one pad.
    pub fn process_seeds(&mut self, pad: Option<PadRef>) {
        info!("seeds ...");
        let ptset = self.ptset.as_ref().expect("point tile set present");
        let (tsw, tsh) = (ptset.columns_of_tiles(), ptset.rows_of_tiles());
        if self.out_seeds.len() != tsw * tsh {
            self.out_seeds = vec![Vec::new(); tsw * tsh];
        }
        let (tw, th) = match self.dtm_in.as_ref() {
            Some(dtm) => (dtm.tile_width(), dtm.tile_height()),
            None => (self.vm_width / tsw, self.vm_height / tsh),
        };
        let mut builder = SeedBuilder::new(
            self.cfg.min_bs_length(),
            self.cfg.seed_shift(),
            self.cfg.seed_width(),
        );
        if self.cfg.is_half_size_seeds_on() {
            builder = builder.halved();
        }
        let stats = builder.build(
            &self.dss,
            tsw,
            tsh,
            tw,
            th,
            pad,
            &|k| ptset.is_declared(k),
            &mut self.out_seeds,
        );
        info!(
            seeds = stats.seeds,
            rejected = stats.rejected_segments,
            "seeds OK"
        );
    }

    /// Step 6: road extraction from seeds.
    pub fn process_asd(&mut self) -> Result<()> {
        info!("asd ...");
        self.road_sections.clear();
        if self.cfg.buffer_size() == 0 && !self.tile_loaded {
            self.ptset
                .as_mut()
                .ok_or(Error::EmptySector)?
                .load_points()?;
            self.tile_loaded = true;
        }
        let (cot, rot) = {
            let p = self.ptset.as_ref().ok_or(Error::EmptySector)?;
            (p.columns_of_tiles(), p.rows_of_tiles())
        };
        self.out_sucseeds = vec![Vec::new(); cot * rot];
        self.road_map = Some(RoadMap::new(self.vm_width, self.vm_height));
        if self.ctdet.is_none() {
            self.add_track_detector();
        }

        let bar = if self.cfg.is_verbose_on() {
            let b = ProgressBar::new((cot * rot) as u64);
            b.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} tiles").expect("style"),
            );
            b
        } else {
            ProgressBar::hidden()
        };

        let mut unused = 0usize;
        let mut tried = 0usize;
        if self.cfg.buffer_size() != 0 {
            if !self.buf_created {
                self.ptset.as_mut().unwrap().create_buffers();
                self.buf_created = true;
            }
            loop {
                let k = match self.ptset.as_mut().unwrap().next_tile()? {
                    Some(k) => k,
                    None => break,
                };
                self.run_tile_seeds(k, &mut tried, &mut unused);
                let det = self.ctdet.as_mut().unwrap();
                if det.outs() != 0 {
                    warn!(outs = det.outs(), tile = k, "point requests outside grid");
                    det.reset_outs();
                }
                bar.inc(1);
            }
        } else {
            for k in serpentine(cot, rot) {
                self.run_tile_seeds(k, &mut tried, &mut unused);
                bar.inc(1);
            }
        }
        bar.finish_and_clear();

        if self.save_seeds_on {
            let p = self.ptset.as_ref().unwrap();
            self.store.save_successful_seeds(
                &self.out_sucseeds,
                cot,
                rot,
                p.xref(),
                p.yref(),
                (self.csize as f64 * XYZ_UNIT as f64) as i64,
            )?;
            self.cfg
                .save_detector_status(self.ctdet.as_ref().unwrap())?;
        }
        info!(
            roads = self.road_map.as_ref().unwrap().number_of_roads(),
            tried,
            unused,
            "asd OK"
        );
        Ok(())
    }

    /// Runs every seed of tile `k` through the detector.
    fn run_tile_seeds(&mut self, k: usize, tried: &mut usize, unused: &mut usize) {
        let seeds = self.out_seeds.get(k).cloned().unwrap_or_default();
        for (p1, p2) in seeds {
            *tried += 1;
            let center = Pt2i::midpoint(p1, p2);
            if center.x < 0
                || center.x >= self.vm_width as i32
                || center.y < 0
                || center.y >= self.vm_height as i32
            {
                *unused += 1;
                continue;
            }
            if self.road_map.as_ref().unwrap().occupied(center) {
                *unused += 1;
                continue;
            }
            let det = self.ctdet.as_mut().unwrap();
            let ptset = self.ptset.as_ref().unwrap();
            let Some(ct) = det.detect(ptset, p1, p2) else {
                continue;
            };
            if ct.plateau(0).is_none() {
                continue;
            }
            let strips = if self.cfg.is_connected_on() {
                ct.connected_points(self.vm_width as i32, self.vm_height as i32)
            } else {
                ct.points(self.vm_width as i32, self.vm_height as i32)
            };
            if strips.iter().all(|s| s.is_empty()) {
                continue;
            }
            self.road_map.as_mut().unwrap().add(&strips);
            self.out_sucseeds[k].push((p1, p2));
            if self.cfg.export().is_some() {
                self.road_sections.push(ct);
            }
        }
    }

    /// Steps 1 to 5 in one sweep, pad by pad when sawing is enabled.
    pub fn process_sawing(&mut self) -> Result<()> {
        if self.cfg.pad_size() == 0 {
            self.load_tile_set(true, false)?;
            self.process_shading();
            self.clear_dtm();
            self.process_rorpo();
            self.clear_shading();
            self.process_sobel();
            self.clear_rorpo();
            self.process_fbsd();
            self.clear_sobel();
            self.process_seeds(None);
            self.clear_fbsd();
            return Ok(());
        }

        let mut dtm = TerrainMap::new();
        dtm.set_pad_size(self.cfg.pad_size());
        let mut ptset = PointTileSet::new(0);
        let list = self.cfg.tiles()?;
        let text = std::fs::read_to_string(&list).map_err(|e| Error::io(&list, e))?;
        for name in text.split_whitespace() {
            let nvm = self.cfg.nvm_path(name);
            let til = self.cfg.til_path(name);
            dtm.add_normal_map_file(&nvm)?;
            info!(file = %nvm.display(), "reading");
            ptset.add_tile(&til, false)?;
        }
        ptset.create()?;
        dtm.assemble(
            ptset.columns_of_tiles(),
            ptset.rows_of_tiles(),
            ptset.xref(),
            ptset.yref(),
            false,
        )?;
        dtm.adjust_pad_size();
        let (pad_w, pad_h) = (dtm.pad_width(), dtm.pad_height());
        let geometry = dtm.geometry();
        let (tw, th) = (geometry.tile_width, geometry.tile_height);
        self.vm_width = geometry.width();
        self.vm_height = geometry.height();
        self.csize = geometry.cell_size as f32 / XYZ_UNIT as f32;
        let tsw = ptset.columns_of_tiles();
        self.out_seeds = vec![Vec::new(); tsw * ptset.rows_of_tiles()];
        self.ptset = Some(ptset);
        self.dtm_in = Some(dtm);

        let mut pad_buf = vec![0u8; pad_w * tw * pad_h * th];
        loop {
            let kref = match self.dtm_in.as_mut().unwrap().next_pad(&mut pad_buf)? {
                Some(k) => k,
                None => break,
            };
            let (kx, ky) = (kref % tsw, kref / tsw);
            info!(pad = kref, kx, ky, "processing pad");
            self.dtm_map = Some(Raster::from_vec(
                pad_buf.clone(),
                pad_h * th,
                pad_w * tw,
            )?);
            self.process_rorpo();
            self.clear_shading();
            self.process_sobel();
            self.clear_rorpo();
            self.process_fbsd();
            self.clear_sobel();
            self.process_seeds(Some(PadRef {
                kx,
                ky,
                pad_height: pad_h,
            }));
            self.clear_fbsd();
        }
        self.clear_rorpo();
        self.clear_shading();
        Ok(())
    }

    // Stage persistence wrappers

    pub fn save_shading_map(&self) -> Result<()> {
        let map = self.dtm_map.as_ref().expect("shading raster present");
        self.store.save_byte_map(SHADE_MAP, &self.header(), map)
    }

    pub fn load_shading_map(&mut self) -> Result<()> {
        let (h, map) = self.store.load_byte_map(SHADE_MAP)?;
        self.apply_header(&h);
        self.dtm_map = Some(map);
        Ok(())
    }

    pub fn save_rorpo_map(&self) -> Result<()> {
        let map = self.rorpo_map.as_ref().expect("rorpo raster present");
        self.store.save_byte_map(RORPO_MAP, &self.header(), map)
    }

    pub fn load_rorpo_map(&mut self) -> Result<()> {
        let (h, map) = self.store.load_byte_map(RORPO_MAP)?;
        self.apply_header(&h);
        self.rorpo_map = Some(map);
        Ok(())
    }

    pub fn save_sobel_map(&self) -> Result<()> {
        let gmap = self.gmap.as_ref().expect("gradient map present");
        self.store.save_sobel_map(&self.header(), gmap)
    }

    pub fn load_sobel_map(&mut self) -> Result<()> {
        let (h, gmap) = self.store.load_sobel_map()?;
        self.apply_header(&h);
        self.gmap = Some(gmap);
        Ok(())
    }

    pub fn save_fbsd_segments(&self) -> Result<()> {
        let (tsw, tsh) = match self.ptset.as_ref() {
            Some(p) => (p.columns_of_tiles() as i32, p.rows_of_tiles() as i32),
            None => (1, 1),
        };
        self.store
            .save_fbsd_segments(&self.header(), tsw, tsh, &self.dss)
    }

    pub fn load_fbsd_segments(&mut self) -> Result<()> {
        let (h, _tsw, _tsh, dss) = self.store.load_fbsd_segments()?;
        self.apply_header(&h);
        self.dss = dss;
        Ok(())
    }

    pub fn save_seeds(&self) -> Result<()> {
        let p = self.ptset.as_ref().expect("point tile set present");
        self.store.save_seeds(
            &self.header(),
            p.columns_of_tiles() as i32,
            p.rows_of_tiles() as i32,
            &self.out_seeds,
            self.cfg.is_half_size_seeds_on(),
        )
    }

    /// Loads persisted seeds and re-buckets them per midpoint tile.
    pub fn load_seeds(&mut self) -> Result<()> {
        let (h, tsw, tsh, seeds) = self.store.load_seeds()?;
        self.apply_header(&h);
        let (tsw, tsh) = (tsw as usize, tsh as usize);
        let tw = (self.vm_width / tsw) as i32;
        let th = (self.vm_height / tsh) as i32;
        self.out_seeds = vec![Vec::new(); tsw * tsh];
        for (p1, p2) in seeds {
            let tilex = (((p1.x + p2.x) / 2) / tw).clamp(0, tsw as i32 - 1);
            let tiley = (((p1.y + p2.y) / 2) / th).clamp(0, tsh as i32 - 1);
            self.out_seeds[(tiley as usize) * tsw + tilex as usize].push((p1, p2));
        }
        Ok(())
    }

    /// Lists generated seeds per tile.
    pub fn check_seeds(&self) {
        let Some(p) = self.ptset.as_ref() else { return };
        for k in serpentine(p.columns_of_tiles(), p.rows_of_tiles()) {
            let bucket = &self.out_seeds[k];
            info!(tile = k, seeds = bucket.len(), "seed bucket");
            for (p1, p2) in bucket {
                info!("  seed ({}, {}) ({}, {})", p1.x, p1.y, p2.x, p2.y);
            }
        }
    }

    // Image outputs

    pub fn save_hill_image(&mut self) -> Result<()> {
        self.load_tile_set(true, false)?;
        let dtm = self.dtm_in.as_ref().unwrap();
        let map = dtm.shade_sector(ShadingMode::Hill);
        output::save_byte_image(&self.store, HILL_PNG, &map)?;
        self.dtm_in = None;
        self.ptset = None;
        self.tile_loaded = false;
        self.buf_created = false;
        Ok(())
    }

    pub fn save_shading_image(&self) -> Result<()> {
        let map = self.dtm_map.as_ref().expect("shading raster present");
        output::save_byte_image(&self.store, SHADE_PNG, map)
    }

    pub fn save_rorpo_image(&self) -> Result<()> {
        let map = self.rorpo_map.as_ref().expect("rorpo raster present");
        output::save_byte_image(&self.store, RORPO_PNG, map)
    }

    pub fn save_sobel_image(&self) -> Result<()> {
        let gmap = self.gmap.as_ref().expect("gradient map present");
        output::save_sobel_image(&self.store, SOBEL_PNG, gmap)
    }

    pub fn save_fbsd_image(&mut self) -> Result<()> {
        if self.cfg.is_back_dtm_on() && self.dtm_in.is_none() {
            self.load_tile_set(true, false)?;
        }
        output::save_fbsd_image(
            &self.store,
            FBSD_PNG,
            self.vm_width,
            self.vm_height,
            &self.dss,
            self.cfg.is_false_color_on(),
            self.dtm_in.as_ref().filter(|_| self.cfg.is_back_dtm_on()),
        )
    }

    pub fn save_seeds_image(&mut self) -> Result<()> {
        if self.cfg.is_back_dtm_on() && self.dtm_in.is_none() {
            self.load_tile_set(true, false)?;
        }
        output::save_seeds_image(
            &self.store,
            SEEDS_PNG,
            self.vm_width,
            self.vm_height,
            &self.out_seeds,
            self.dtm_in.as_ref().filter(|_| self.cfg.is_back_dtm_on()),
        )
    }

    pub fn save_asd_image(&mut self) -> Result<()> {
        if self.road_map.is_none() {
            return Ok(());
        }
        if self.cfg.is_back_dtm_on() && self.dtm_in.is_none() {
            self.load_tile_set(true, false)?;
        }
        let map = self.road_map.as_ref().unwrap();
        output::save_asd_image(
            &self.store,
            crate::store::ROADS_PNG,
            map,
            self.cfg.is_false_color_on(),
            self.cfg.is_back_dtm_on(),
            self.dtm_in.as_ref(),
        )
    }

    /// Shapefile export of the retained road sections.
    fn export_roads(&self, mode: ExportMode) -> Result<()> {
        let p = self.ptset.as_ref().ok_or(Error::EmptySector)?;
        let (x0, y0) = (
            p.xref() as f64 / XYZ_UNIT as f64,
            p.yref() as f64 / XYZ_UNIT as f64,
        );
        let to_world = |pts: Vec<(f64, f64)>| -> export::Polyline {
            pts.into_iter().map(|(x, y)| (x0 + x, y0 + y)).collect()
        };
        let (name, lines): (&str, Vec<export::Polyline>) = match mode {
            ExportMode::Centerlines => (
                "road_lines",
                self.road_sections
                    .iter()
                    .map(|ct| to_world(ct.centerline()))
                    .collect(),
            ),
            ExportMode::Bounds => (
                "roads",
                self.road_sections
                    .iter()
                    .flat_map(|ct| {
                        let (left, right) = ct.side_bounds();
                        [to_world(left), to_world(right)]
                    })
                    .collect(),
            ),
        };
        export::write_polylines(&self.store.path(name), &lines)?;
        info!(sections = self.road_sections.len(), "vector export done");
        Ok(())
    }

    /// Runs the configured step.
    pub fn run(&mut self) -> Result<()> {
        if self.cfg.is_dtm_import_on() || self.cfg.is_xyz_import_on() {
            if self.cfg.is_dtm_import_on() {
                self.cfg.import_dtm()?;
            }
            if self.cfg.is_xyz_import_on() {
                self.cfg.import_xyz()?;
            }
            return Ok(());
        }
        self.cfg.set_tiles()?;

        if self.cfg.is_seed_check_on() {
            self.load_tile_set(false, false)?;
            if self.store.path(SEEDS_PTS).is_file() {
                self.load_seeds()?;
            }
            self.check_seeds();
            return Ok(());
        }
        if self.cfg.is_hill_map_on() {
            return self.save_hill_image();
        }

        match self.cfg.step() {
            Step::All => {
                self.process_sawing()?;
                self.process_asd()?;
                self.save_asd_image()?;
                if let Some(mode) = self.cfg.export() {
                    self.export_roads(mode)?;
                }
            }
            Step::Sawing => {
                self.process_sawing()?;
                self.save_seeds()?;
                if self.cfg.is_out_map_on() {
                    warn!("--map only applies to single-stage runs");
                }
            }
            Step::Shade => {
                self.load_tile_set(true, false)?;
                self.process_shading();
                self.save_shading_map()?;
                if self.cfg.is_out_map_on() {
                    self.save_shading_image()?;
                }
                self.clear_dtm();
            }
            Step::Rorpo => {
                self.load_shading_map()?;
                self.process_rorpo();
                self.save_rorpo_map()?;
                if self.cfg.is_out_map_on() {
                    self.save_rorpo_image()?;
                }
                self.clear_shading();
            }
            Step::Sobel => {
                self.load_rorpo_map()?;
                self.process_sobel();
                self.save_sobel_map()?;
                if self.cfg.is_out_map_on() {
                    self.save_sobel_image()?;
                }
                self.clear_rorpo();
            }
            Step::Fbsd => {
                self.load_sobel_map()?;
                self.process_fbsd();
                self.save_fbsd_segments()?;
                if self.cfg.is_out_map_on() {
                    self.save_fbsd_image()?;
                }
                self.clear_sobel();
            }
            Step::Seeds => {
                self.load_tile_set(false, false)?;
                self.load_fbsd_segments()?;
                self.process_seeds(None);
                self.save_seeds()?;
                if self.cfg.is_out_map_on() {
                    self.save_seeds_image()?;
                }
            }
            Step::Asd => {
                self.load_seeds()?;
                self.load_tile_set(false, false)?;
                self.process_asd()?;
                self.save_asd_image()?;
                if let Some(mode) = self.cfg.export() {
                    self.export_roads(mode)?;
                }
            }
        }
        Ok(())
    }
}
