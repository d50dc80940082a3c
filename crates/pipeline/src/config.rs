//! Tool configuration
//!
//! One immutable-after-startup record of every knob, loaded from
//! `config.ini` key/value tokens and command-line setters. Also owns the
//! tile-set bookkeeping under `tilesets/` and the derivation of missing
//! point-tile resolution classes.

use amrel_core::{Error, Result};
use amrel_tiles::import;
use amrel_tiles::{CloudAccess, PointTile, NVM_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Version number reported in the detector snapshot.
pub const VERSION: &str = "1.1.1";

const CONFIG_FILE: &str = "config.ini";
const TILE_FILE_DIR: &str = "tilesets";
const LAST_SET: &str = "last_set";
const LAST_TILES: &str = "last_tiles";
const NVM_DEFAULT_DIR: &str = "nvm";
const TIL_DEFAULT_DIR: &str = "til";
const RES_DIR: &str = "steps";

const DEFAULT_MAX_BS_THICKNESS: i32 = 7;
const DEFAULT_MIN_BS_LENGTH: i32 = 80;
const DEFAULT_SEED_SHIFT: i32 = 24;
const DEFAULT_SEED_WIDTH: i32 = 40;

/// Road detection step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    /// Complete automatic mode
    #[default]
    All,
    /// Stages 1 to 5, producing seeds
    Sawing,
    Shade,
    Rorpo,
    Sobel,
    Fbsd,
    Seeds,
    Asd,
}

/// Requested vector export of the detected roads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Left/right road bounds
    Bounds,
    /// Road centerlines
    Centerlines,
}

/// Configuration of one AMREL run.
#[derive(Debug, Clone)]
pub struct AmrelConfig {
    base_dir: PathBuf,
    sector_name: String,
    tile_names: Vec<String>,
    cloud_access: CloudAccess,
    max_bs_thickness: i32,
    min_bs_length: i32,
    seed_shift: i32,
    seed_width: i32,
    pad_size: usize,
    buf_size: usize,
    step: Step,
    connected_mode: bool,
    hill_map: bool,
    out_map: bool,
    back_dtm: bool,
    false_color: bool,
    seed_check: bool,
    half_size_seeds: bool,
    export: Option<ExportMode>,
    tail_min_size: Option<u32>,
    verbose: bool,

    dtm_import: bool,
    dtm_dir: PathBuf,
    dtm_files: Vec<String>,
    xyz_import: bool,
    xyz_dir: PathBuf,
    xyz_file: String,
}

impl Default for AmrelConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            sector_name: LAST_SET.to_string(),
            tile_names: Vec::new(),
            cloud_access: CloudAccess::Top,
            max_bs_thickness: DEFAULT_MAX_BS_THICKNESS,
            min_bs_length: DEFAULT_MIN_BS_LENGTH,
            seed_shift: DEFAULT_SEED_SHIFT,
            seed_width: DEFAULT_SEED_WIDTH,
            pad_size: 0,
            buf_size: 0,
            step: Step::All,
            connected_mode: true,
            hill_map: false,
            out_map: false,
            back_dtm: false,
            false_color: false,
            seed_check: false,
            half_size_seeds: false,
            export: None,
            tail_min_size: None,
            verbose: true,
            dtm_import: false,
            dtm_dir: PathBuf::new(),
            dtm_files: Vec::new(),
            xyz_import: false,
            xyz_dir: PathBuf::new(),
            xyz_file: String::new(),
        }
    }
}

impl AmrelConfig {
    /// Configuration for the given working directory, with `config.ini`
    /// applied when present.
    pub fn load(base_dir: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        };
        let ini = cfg.base_dir.join(CONFIG_FILE);
        if ini.is_file() {
            cfg.apply_ini(&ini)?;
        }
        Ok(cfg)
    }

    /// Applies whitespace-separated `KEY VALUE` tokens from an ini file.
    fn apply_ini(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut tokens = text.split_whitespace();
        while let Some(key) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| Error::Config(format!("missing value for {key} in {CONFIG_FILE}")))?;
            match key {
                "CLOUD_ACCESS" => {
                    self.cloud_access = match value {
                        "TOP" => CloudAccess::Top,
                        "MID" => CloudAccess::Mid,
                        "ECO" => CloudAccess::Eco,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "MAX_BS_THICKNESS" => self.set_max_bs_thickness(int_value(key, value)?),
                "MIN_BS_LENGTH" => self.set_min_bs_length(int_value(key, value)?),
                "SEED_SHIFT" => self.set_seed_shift(int_value(key, value)?),
                "SEED_WIDTH" => self.set_seed_width(int_value(key, value)?),
                "PAD_SIZE" => self.set_pad_size(int_value(key, value)?)?,
                "BUFFER_SIZE" => self.set_buffer_size(int_value(key, value)?)?,
                "TAIL_MIN_SIZE" => self.tail_min_size = Some(int_value(key, value)?.max(0) as u32),
                "CONNECTED" => self.connected_mode = status_value(key, value)?,
                "STEP" => {
                    self.step = match value {
                        "ALL" => Step::All,
                        "SHADING" => Step::Shade,
                        "RORPO" => Step::Rorpo,
                        "SOBEL" => Step::Sobel,
                        "FBSD" => Step::Fbsd,
                        "SEEDS" => Step::Seeds,
                        "ASD" => Step::Asd,
                        "SAWING" => Step::Sawing,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "OUT_MAP" => self.out_map = status_value(key, value)?,
                "BACK_DTM" => self.back_dtm = status_value(key, value)?,
                "FALSE_COLOR" => self.false_color = status_value(key, value)?,
                "VERBOSE" => self.verbose = status_value(key, value)?,
                _ => {
                    return Err(Error::Config(format!(
                        "unknown key {key} in {CONFIG_FILE}"
                    )))
                }
            }
        }
        Ok(())
    }

    // Directories

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn nvm_dir(&self) -> PathBuf {
        self.base_dir.join(NVM_DEFAULT_DIR)
    }

    pub fn til_dir(&self) -> PathBuf {
        self.base_dir.join(TIL_DEFAULT_DIR)
    }

    pub fn steps_dir(&self) -> PathBuf {
        self.base_dir.join(RES_DIR)
    }

    fn tilesets_dir(&self) -> PathBuf {
        self.base_dir.join(TILE_FILE_DIR)
    }

    /// NVM file of a tile name.
    pub fn nvm_path(&self, name: &str) -> PathBuf {
        self.nvm_dir().join(format!("{name}{NVM_SUFFIX}"))
    }

    /// Point tile file of a tile name at the configured class.
    pub fn til_path(&self, name: &str) -> PathBuf {
        self.cloud_access.til_path(&self.til_dir(), name)
    }

    // Knobs

    pub fn cloud_access(&self) -> CloudAccess {
        self.cloud_access
    }

    pub fn set_cloud_access(&mut self, access: CloudAccess) {
        self.cloud_access = access;
    }

    pub fn max_bs_thickness(&self) -> i32 {
        self.max_bs_thickness
    }

    pub fn set_max_bs_thickness(&mut self, val: i32) {
        self.max_bs_thickness = val.max(3);
    }

    pub fn min_bs_length(&self) -> i32 {
        self.min_bs_length
    }

    pub fn set_min_bs_length(&mut self, val: i32) {
        self.min_bs_length = val.max(0);
    }

    pub fn seed_shift(&self) -> i32 {
        self.seed_shift
    }

    pub fn set_seed_shift(&mut self, val: i32) {
        self.seed_shift = val.max(10);
    }

    pub fn seed_width(&self) -> i32 {
        self.seed_width
    }

    pub fn set_seed_width(&mut self, val: i32) {
        self.seed_width = val.max(10);
    }

    pub fn pad_size(&self) -> usize {
        self.pad_size
    }

    /// Only 0 or positive odd values are accepted.
    pub fn set_pad_size(&mut self, size: i32) -> Result<()> {
        if size < 0 || (size > 0 && size % 2 == 0) {
            return Err(Error::InvalidParameter {
                name: "PAD_SIZE",
                value: size.to_string(),
                reason: "only 0 or positive odd values".into(),
            });
        }
        self.pad_size = size as usize;
        Ok(())
    }

    pub fn buffer_size(&self) -> usize {
        self.buf_size
    }

    /// Only 0 or positive odd values are accepted.
    pub fn set_buffer_size(&mut self, size: i32) -> Result<()> {
        if size < 0 || (size > 0 && size % 2 == 0) {
            return Err(Error::InvalidParameter {
                name: "BUFFER_SIZE",
                value: size.to_string(),
                reason: "only 0 or positive odd values".into(),
            });
        }
        self.buf_size = size as usize;
        Ok(())
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn set_step(&mut self, step: Step) {
        self.step = step;
    }

    pub fn is_connected_on(&self) -> bool {
        self.connected_mode
    }

    pub fn set_connected(&mut self, on: bool) {
        self.connected_mode = on;
    }

    pub fn is_hill_map_on(&self) -> bool {
        self.hill_map
    }

    pub fn set_hill_map(&mut self, on: bool) {
        self.hill_map = on;
    }

    pub fn is_out_map_on(&self) -> bool {
        self.out_map
    }

    pub fn set_out_map(&mut self, on: bool) {
        self.out_map = on;
    }

    pub fn is_back_dtm_on(&self) -> bool {
        self.back_dtm
    }

    pub fn set_back_dtm(&mut self, on: bool) {
        self.back_dtm = on;
    }

    pub fn is_false_color_on(&self) -> bool {
        self.false_color
    }

    pub fn set_false_color(&mut self, on: bool) {
        self.false_color = on;
    }

    pub fn is_seed_check_on(&self) -> bool {
        self.seed_check
    }

    pub fn set_seed_check(&mut self, on: bool) {
        self.seed_check = on;
    }

    pub fn is_half_size_seeds_on(&self) -> bool {
        self.half_size_seeds
    }

    pub fn set_half_size_seeds(&mut self, on: bool) {
        self.half_size_seeds = on;
    }

    pub fn export(&self) -> Option<ExportMode> {
        self.export
    }

    pub fn set_export(&mut self, mode: Option<ExportMode>) {
        self.export = mode;
    }

    pub fn tail_min_size(&self) -> Option<u32> {
        self.tail_min_size
    }

    pub fn set_tail_min_size(&mut self, val: u32) {
        self.tail_min_size = Some(val);
    }

    pub fn is_verbose_on(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, on: bool) {
        self.verbose = on;
    }

    // Tile set management

    /// The name of the tile or tile set to process.
    pub fn input_name(&self) -> &str {
        &self.sector_name
    }

    /// Accepts the positional input name; refuses a second one.
    pub fn set_input_name(&mut self, name: &str) -> bool {
        if self.sector_name != LAST_SET {
            return false;
        }
        self.sector_name = name.to_string();
        true
    }

    /// Declares a tile to add to the current set.
    pub fn add_tile_name(&mut self, name: &str) {
        self.tile_names.push(name.to_string());
    }

    /// Path of the tile-set file currently in force, resolved through
    /// `tilesets/last_set.txt`.
    pub fn tiles(&self) -> Result<PathBuf> {
        let last = self.tilesets_dir().join(format!("{LAST_SET}.txt"));
        let text = fs::read_to_string(&last).map_err(|e| Error::io(&last, e))?;
        let name = text
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::Config(format!("{} is empty", last.display())))?;
        Ok(self.tilesets_dir().join(format!("{name}.txt")))
    }

    /// Prepares the tile set to process: resolves the requested sector
    /// file, or verifies and registers tiles declared on the command
    /// line. Returns an error when no usable tile set remains.
    pub fn set_tiles(&mut self) -> Result<()> {
        let dir = self.tilesets_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let tsname = dir.join(format!("{}.txt", self.sector_name));
        let mut unspec = true;
        if let Ok(text) = fs::read_to_string(&tsname) {
            if text.split_whitespace().next().is_some() {
                if self.verbose {
                    info!(file = %tsname.display(), "using tile set");
                }
                if self.sector_name != LAST_SET {
                    self.write_last_set(&self.sector_name)?;
                    unspec = false;
                } else if self.tile_names.is_empty() {
                    unspec = false;
                }
            }
        }
        if !unspec {
            return Ok(());
        }
        if self.tile_names.is_empty() {
            return Err(Error::Config(format!(
                "no tile specified in {}",
                self.sector_name
            )));
        }
        // every declared tile needs its NVM file and at least one class
        for name in &self.tile_names {
            let nvm = self.nvm_path(name);
            if !nvm.is_file() {
                return Err(Error::Config(format!("unknown file {}", nvm.display())));
            }
            let til_dir = self.til_dir();
            let any_class = [CloudAccess::Eco, CloudAccess::Mid, CloudAccess::Top]
                .iter()
                .any(|a| a.til_path(&til_dir, name).is_file());
            if !any_class {
                return Err(Error::Config(format!("unknown til file for {name}")));
            }
        }
        if self.sector_name == LAST_SET {
            self.sector_name = LAST_TILES.to_string();
        }
        let deft = dir.join(format!("{}.txt", self.sector_name));
        let body = self.tile_names.join("\n") + "\n";
        fs::write(&deft, body).map_err(|e| Error::io(&deft, e))?;
        self.write_last_set(&self.sector_name)?;
        if self.verbose {
            info!(sector = %self.sector_name, "using tile set");
        }
        Ok(())
    }

    fn write_last_set(&self, name: &str) -> Result<()> {
        let last = self.tilesets_dir().join(format!("{LAST_SET}.txt"));
        fs::write(&last, format!("{name}\n")).map_err(|e| Error::io(&last, e))
    }

    /// Derives the missing point tile of `name` at the configured class
    /// from any other class present on disk, densest candidate first.
    pub fn create_alt_til(&self, name: &str) -> Result<()> {
        let til_dir = self.til_dir();
        let target = self.cloud_access;
        for source in target.others() {
            let src_path = source.til_path(&til_dir, name);
            let mut src = match PointTile::open(&src_path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if src.load().is_err() {
                continue;
            }
            if self.verbose {
                info!(from = %src_path.display(), "creating point tile");
            }
            let h = *src.header();
            let ratio_num = h.access;
            let ratio_den = target.divisor();
            let mut dst = PointTile::empty(
                target,
                (h.cols * ratio_num) / ratio_den,
                (h.rows * ratio_num) / ratio_den,
                h.xref,
                h.yref,
                h.zref,
                (h.cell_size * ratio_den) / ratio_num,
            );
            dst.set_points_from(&src);
            dst.save(target.til_path(&til_dir, name))?;
            return Ok(());
        }
        Err(Error::Config(format!("no point tile class found for {name}")))
    }

    /// Registers the run parameters and detector status in
    /// `steps/autodet.ini`.
    pub fn save_detector_status(&self, det: &amrel_algorithms::CTrackDetector) -> Result<()> {
        let dir = self.steps_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let path = dir.join("autodet.ini");
        let mut s = String::new();
        s.push_str("[AMREL]\n");
        s.push_str(&format!("Version={VERSION}\n"));
        s.push_str(&format!("Tile={}\n", self.sector_name));
        s.push_str(&format!("MaxBSThickness={}\n", self.max_bs_thickness));
        s.push_str(&format!("MinBSLength={}\n", self.min_bs_length));
        s.push_str(&format!("SeedShift={}\n", self.seed_shift));
        s.push_str(&format!("SeedWidth={}\n", self.seed_width));
        s.push_str(&format!("PadSize={}\n", self.pad_size));
        s.push_str(&format!("BufferSize={}\n", self.buf_size));
        s.push_str(&format!("Connected={}\n\n", self.connected_mode));
        s.push_str("[ASD]\n");
        s.push_str(&format!("CloudAccess={}\n", self.cloud_access.divisor()));
        s.push_str("DetectionMode=1\n\n");
        s.push_str("[CTrack]\n");
        s.push_str(&format!(
            "InitialDetection={}\n",
            det.is_initial_detection_on()
        ));
        s.push_str(&format!(
            "PlateauLackTolerance={}\n",
            det.plateau_lack_tolerance()
        ));
        s.push_str(&format!("PlateauMaxTilt={}\n", det.max_tilt()));
        s.push_str(&format!("PlateauMinLength={}\n", det.min_length()));
        s.push_str(&format!("PlateauMaxLength={}\n", det.max_length()));
        s.push_str(&format!("MaxThicknessShift={}\n", det.thickness_tolerance()));
        s.push_str(&format!("MaxSlopeShift={}\n", det.slope_tolerance()));
        s.push_str(&format!("MaxPositionShift={}\n", det.side_shift_tolerance()));
        s.push_str(&format!("MaxCenterShift={}\n", det.max_shift_length()));
        s.push_str(&format!(
            "MinTailLength={}\n",
            det.tail_min_size().unwrap_or(0)
        ));
        fs::write(&path, s).map_err(|e| Error::io(&path, e))
    }

    // Imports

    pub fn is_dtm_import_on(&self) -> bool {
        self.dtm_import
    }

    pub fn set_dtm_dir(&mut self, name: &str) {
        self.dtm_dir = PathBuf::from(name);
        self.dtm_import = true;
    }

    pub fn is_xyz_import_on(&self) -> bool {
        self.xyz_import
    }

    pub fn set_xyz_dir(&mut self, name: &str) {
        self.xyz_dir = PathBuf::from(name);
        self.xyz_import = true;
    }

    /// Routes an import file by extension: `.asc` to the DTM list,
    /// anything else to the XYZ slot.
    pub fn set_import_file(&mut self, name: &str) {
        if name.ends_with(".asc") {
            self.dtm_files.push(name.to_string());
        } else {
            self.xyz_file = name.to_string();
        }
    }

    /// Converts the declared ASC files into the tile's NVM file.
    pub fn import_dtm(&self) -> Result<()> {
        let tn = self.first_import_name()?;
        let paths: Vec<PathBuf> = self.dtm_files.iter().map(|f| self.dtm_dir.join(f)).collect();
        let out = self.nvm_path(&tn);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        import::import_dtm(&paths, &out)
    }

    /// Converts the declared XYZ file into a point tile of the
    /// configured class.
    pub fn import_xyz(&self) -> Result<()> {
        let tn = self.first_import_name()?;
        import::import_xyz(
            self.xyz_dir.join(&self.xyz_file),
            self.nvm_path(&tn),
            self.cloud_access,
            self.til_path(&tn),
        )
    }

    fn first_import_name(&self) -> Result<String> {
        if let Some(name) = self.tile_names.first() {
            return Ok(name.clone());
        }
        let file = self
            .dtm_files
            .first()
            .cloned()
            .or_else(|| (!self.xyz_file.is_empty()).then(|| self.xyz_file.clone()))
            .ok_or_else(|| Error::Config("no file to import".into()))?;
        Ok(file
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(file))
    }
}

fn int_value(key: &str, value: &str) -> Result<i32> {
    value.parse().map_err(|_| bad_value(key, value))
}

fn status_value(key: &str, value: &str) -> Result<bool> {
    match value {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(bad_value(key, value)),
    }
}

fn bad_value(key: &str, value: &str) -> Error {
    Error::Config(format!("bad value {value} for {key} in {CONFIG_FILE}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use amrel_tiles::CloudAccess;

    fn config_in(dir: &Path, ini: &str) -> Result<AmrelConfig> {
        std::fs::write(dir.join(CONFIG_FILE), ini).unwrap();
        AmrelConfig::load(dir)
    }

    #[test]
    fn test_defaults() {
        let cfg = AmrelConfig::default();
        assert_eq!(cfg.step(), Step::All);
        assert_eq!(cfg.cloud_access(), CloudAccess::Top);
        assert_eq!(cfg.max_bs_thickness(), 7);
        assert_eq!(cfg.min_bs_length(), 80);
        assert_eq!(cfg.seed_shift(), 24);
        assert_eq!(cfg.seed_width(), 40);
        assert!(cfg.is_connected_on());
        assert!(cfg.is_verbose_on());
    }

    #[test]
    fn test_ini_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(
            dir.path(),
            "CLOUD_ACCESS MID\nSTEP SEEDS\nSEED_SHIFT 30\nPAD_SIZE 5\nCONNECTED OFF\n",
        )
        .unwrap();
        assert_eq!(cfg.cloud_access(), CloudAccess::Mid);
        assert_eq!(cfg.step(), Step::Seeds);
        assert_eq!(cfg.seed_shift(), 30);
        assert_eq!(cfg.pad_size(), 5);
        assert!(!cfg.is_connected_on());
    }

    #[test]
    fn test_ini_rejects_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_in(dir.path(), "NO_SUCH_KEY 1\n").is_err());
    }

    #[test]
    fn test_ini_rejects_even_pad() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_in(dir.path(), "PAD_SIZE 4\n").is_err());
    }

    #[test]
    fn test_knob_floors() {
        let mut cfg = AmrelConfig::default();
        cfg.set_max_bs_thickness(1);
        cfg.set_min_bs_length(-4);
        cfg.set_seed_shift(2);
        cfg.set_seed_width(3);
        assert_eq!(cfg.max_bs_thickness(), 3);
        assert_eq!(cfg.min_bs_length(), 0);
        assert_eq!(cfg.seed_shift(), 10);
        assert_eq!(cfg.seed_width(), 10);
    }

    #[test]
    fn test_input_name_conflict() {
        let mut cfg = AmrelConfig::default();
        assert!(cfg.set_input_name("sector_a"));
        assert!(!cfg.set_input_name("sector_b"));
        assert_eq!(cfg.input_name(), "sector_a");
    }

    #[test]
    fn test_set_tiles_registers_cli_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AmrelConfig::load(dir.path()).unwrap();
        // fabricate the tile inputs the names point to
        std::fs::create_dir_all(dir.path().join("nvm")).unwrap();
        std::fs::create_dir_all(dir.path().join("til/mid")).unwrap();
        std::fs::write(dir.path().join("nvm/t0.nvm"), b"stub").unwrap();
        std::fs::write(dir.path().join("til/mid/mid_t0.til"), b"stub").unwrap();
        cfg.add_tile_name("t0");
        cfg.set_tiles().unwrap();

        assert_eq!(cfg.input_name(), "last_tiles");
        let listed = std::fs::read_to_string(dir.path().join("tilesets/last_tiles.txt")).unwrap();
        assert_eq!(listed.trim(), "t0");
        let last = std::fs::read_to_string(dir.path().join("tilesets/last_set.txt")).unwrap();
        assert_eq!(last.trim(), "last_tiles");
        assert!(cfg.tiles().unwrap().ends_with("tilesets/last_tiles.txt"));
    }

    #[test]
    fn test_set_tiles_requires_known_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AmrelConfig::load(dir.path()).unwrap();
        cfg.add_tile_name("ghost");
        assert!(cfg.set_tiles().is_err());
    }

    #[test]
    fn test_create_alt_til_derives_missing_class() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AmrelConfig::load(dir.path()).unwrap();
        cfg.set_cloud_access(CloudAccess::Mid);
        // only a TOP tile exists on disk
        let mut top = PointTile::for_dtm_tile(CloudAccess::Top, 4, 4, 500_000, 0, 0, 0);
        top.set_points(&[(250_000, 250_000, 1_000_000), (1_250_000, 750_000, 2_000_000)]);
        top.save(CloudAccess::Top.til_path(&cfg.til_dir(), "t7")).unwrap();

        cfg.create_alt_til("t7").unwrap();
        let mut mid = PointTile::open(cfg.til_path("t7")).unwrap();
        mid.load().unwrap();
        assert_eq!(mid.header().access, 2);
        assert_eq!(mid.header().count, 2);
        assert_eq!(mid.header().cols * 2, 4 * 5);
    }

    #[test]
    fn test_import_name_from_file_stem() {
        let mut cfg = AmrelConfig::default();
        cfg.set_import_file("zone4.asc");
        assert!(cfg.dtm_files.contains(&"zone4.asc".to_string()));
        assert_eq!(cfg.first_import_name().unwrap(), "zone4");
        cfg.set_import_file("cloud.xyz");
        assert_eq!(cfg.xyz_file, "cloud.xyz");
    }
}
