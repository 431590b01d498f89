use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::store::{Point3, DROP_POINT, PICKUP_POINT, SAFE_POINT};

/// Main configuration structure for slotkeeper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotkeeperConfig {
    /// Arm connection and default speed
    pub device: DeviceConfig,
    /// Waypoint clearances
    pub motion: MotionConfig,
    /// Barcode identification retry policy
    pub identification: IdentificationConfig,
    /// Vision probe source
    pub vision: VisionConfig,
    /// Coordinate store settings
    pub database: DatabaseConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
    /// Reference points and slots seeded at startup
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceBackend {
    /// In-process simulated arm
    Simulated,
    /// JSON-lines device bridge over TCP
    Bridge,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub backend: DeviceBackend,
    /// Address of the device bridge (bridge backend only)
    pub bridge_addr: String,
    /// Time a single command may take before it is reported as failed
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Default velocity applied at the start of every task
    pub velocity: f64,
    /// Default acceleration applied at the start of every task
    pub acceleration: f64,
    /// Connect when `run` starts (failure leaves the device unavailable).
    /// One-shot arm commands always connect.
    pub connect_on_startup: bool,
}

impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Height above a storage slot used for approach and departure
    pub slot_clearance: f64,
    /// Height above the pickup point used for approach and departure
    pub pickup_clearance: f64,
    /// Height above the drop point used for approach and departure
    pub drop_clearance: f64,
    /// Lift above the pickup point once an item has been identified
    pub identification_lift: f64,
    /// End-effector rotation used for all regular travel
    pub travel_rotation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Every maneuver turns the item by the same offset from the grip rotation
    Fixed,
    /// The n-th maneuver turns the item by n times the offset
    Cumulative,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentificationConfig {
    pub max_attempts: u32,
    pub delay_between_attempts_ms: u64,
    /// Frames sampled per attempt before the attempt counts as failed
    pub samples_per_attempt: u32,
    pub sample_interval_ms: u64,
    /// Upper bound for the sampling phase of a single attempt
    pub attempt_timeout_ms: Option<u64>,
    /// Rotation used to grip the item during a compensating maneuver
    pub maneuver_rotation: f64,
    /// Rotation applied to the item before setting it back down
    pub rotation_offset: f64,
    pub rotation_mode: RotationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionBackend {
    /// Codes dropped into a file by an external decoder
    DropFile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisionConfig {
    pub backend: VisionBackend,
    pub drop_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit structured JSON log lines instead of compact text
    pub json_logs: bool,
    /// Log task completion and failure counts at shutdown
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PointSeed {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PointSeed {
    fn new(name: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            z,
        }
    }

    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    pub reference_points: Vec<PointSeed>,
    pub slots: Vec<PointSeed>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            reference_points: vec![
                PointSeed::new(PICKUP_POINT, -10.702980995178223, -292.842529296875, -77.93537902832031),
                PointSeed::new(DROP_POINT, -14.7539701461792, 226.28904724121094, -71.42035675048828),
                PointSeed::new(SAFE_POINT, 247.40579223632812, -0.2371116727590561, 126.39020538330078),
            ],
            slots: vec![
                PointSeed::new("A1", 285.9593200683594, 108.25691223144531, -72.0),
                PointSeed::new("A2", 285.9593200683594, -3.4887490272521973, -72.0),
                PointSeed::new("A3", 285.9593200683594, -103.77864074707031, -72.0),
                PointSeed::new("B1", 190.71324157714844, 103.214599609375, -72.0),
                PointSeed::new("B3", 190.71324157714844, -114.82876586914062, -72.0),
            ],
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            slot_clearance: 110.0,
            pickup_clearance: 150.0,
            drop_clearance: 110.0,
            identification_lift: 50.0,
            travel_rotation: 0.0,
        }
    }
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_between_attempts_ms: 10_000,
            samples_per_attempt: 100,
            sample_interval_ms: 0,
            attempt_timeout_ms: None,
            maneuver_rotation: 50.0,
            rotation_offset: 90.0,
            rotation_mode: RotationMode::Fixed,
        }
    }
}

impl Default for SlotkeeperConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                backend: DeviceBackend::Simulated,
                bridge_addr: "127.0.0.1:7878".to_string(),
                command_timeout_ms: 5_000,
                connect_timeout_ms: 3_000,
                velocity: 50.0,
                acceleration: 50.0,
                connect_on_startup: true,
            },
            motion: MotionConfig::default(),
            identification: IdentificationConfig::default(),
            vision: VisionConfig {
                backend: VisionBackend::DropFile,
                drop_file: ".slotkeeper/detections.txt".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite:robot_zones.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
                metrics_enabled: true,
            },
            layout: LayoutConfig::default(),
        }
    }
}

impl SlotkeeperConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (slotkeeper.toml)
    /// 3. Environment variables (SLOTKEEPER__SECTION__KEY)
    pub fn load() -> Result<Self> {
        let file = Path::new("slotkeeper.toml");
        Self::load_from(file.exists().then_some(file))
    }

    /// Same precedence as [`SlotkeeperConfig::load`] with an explicit file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("SLOTKEEPER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<SlotkeeperConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = SlotkeeperConfig::load_env_file();
        SlotkeeperConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static SlotkeeperConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_installation() {
        let cfg = SlotkeeperConfig::default();
        assert_eq!(cfg.motion.slot_clearance, 110.0);
        assert_eq!(cfg.motion.pickup_clearance, 150.0);
        assert_eq!(cfg.identification.max_attempts, 3);
        assert_eq!(cfg.identification.rotation_mode, RotationMode::Fixed);
        assert_eq!(cfg.layout.slots.len(), 5);
        assert!(cfg.layout.reference_points.iter().any(|p| p.name == SAFE_POINT));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[identification]\nmax_attempts = 5\nrotation_mode = \"cumulative\"\n\n[motion]\nslot_clearance = 90.0"
        )
        .unwrap();

        let cfg = SlotkeeperConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(cfg.identification.max_attempts, 5);
        assert_eq!(cfg.identification.rotation_mode, RotationMode::Cumulative);
        assert_eq!(cfg.motion.slot_clearance, 90.0);
        // untouched sections keep their defaults
        assert_eq!(cfg.motion.pickup_clearance, 150.0);
        assert_eq!(cfg.device.velocity, 50.0);
    }

    #[test]
    fn test_toml_round_trip_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotkeeper.toml");
        SlotkeeperConfig::default().save_to_file(&path).unwrap();

        let cfg = SlotkeeperConfig::load_from(Some(&path)).unwrap();
        assert_eq!(cfg.layout.slots[0].name, "A1");
        assert_eq!(cfg.database.url, "sqlite:robot_zones.db");
    }
}
