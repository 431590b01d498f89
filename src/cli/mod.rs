use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "slotkeeper")]
#[command(about = "Store and retrieve packages in fixed zones with a single robotic arm")]
#[command(long_about = "Slotkeeper drives a pick-and-place arm between a pickup point, a set of storage \
                       zones and a drop point. Packages are identified by their printed code before \
                       they are stored. Start with 'slotkeeper zones' to see the storage layout.")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Configuration file
    #[arg(long, global = true, help = "Configuration file (defaults to slotkeeper.toml when present)")]
    pub config: Option<PathBuf>,

    /// Keep zone state in memory only
    #[arg(long, global = true, help = "Use an in-memory zone store seeded from configuration")]
    pub ephemeral: bool,

    /// Drive a simulated arm instead of the configured device
    #[arg(long, global = true, help = "Use the in-process simulated arm")]
    pub simulate: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the package at the pickup point and store it in a zone
    Store {
        /// Target zone
        zone: String,
        /// Product type recorded with the package
        #[arg(long = "type", help = "Product type recorded with the package")]
        product_type: String,
        /// Free-form note recorded with the package
        #[arg(long, default_value = "", help = "Additional information recorded with the package")]
        info: String,
        /// Identification attempts before giving up
        #[arg(long, help = "Override the configured number of identification attempts")]
        max_attempts: Option<u32>,
        #[command(flatten)]
        speed: SpeedArgs,
    },
    /// Move the package in a zone to the drop point
    Retrieve {
        /// Zone to empty
        zone: String,
        #[command(flatten)]
        speed: SpeedArgs,
    },
    /// List all zones with their contents
    Zones,
    /// List the names of available zones
    Available,
    /// Check the arm connection
    Status,
    /// Show the current arm position and joint angles
    Pose,
    /// Run the arm's homing routine
    Home,
    /// Connect to the arm and report the outcome
    Connect,
    /// Move the arm to a position
    MoveTo {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
        /// End-effector rotation
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        r: f64,
        #[command(flatten)]
        speed: SpeedArgs,
    },
    /// Set arm velocity and acceleration
    SetSpeed { velocity: f64, acceleration: f64 },
    /// Serve JSON-lines requests from stdin until EOF or ctrl-c
    ///
    /// Connects at startup only when `device.connect_on_startup` is set;
    /// otherwise send a `connect` request first. Every other arm command
    /// connects for the duration of the process.
    Run,
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this file
        #[arg(long, help = "Write the effective configuration to this file")]
        save: Option<PathBuf>,
    },
}

impl Commands {
    /// Whether the process should connect the arm before running this command
    pub fn connects_arm(&self, connect_on_startup: bool) -> bool {
        match self {
            Commands::Zones | Commands::Available | Commands::Config { .. } => false,
            // `connect` reports its own outcome
            Commands::Connect => false,
            Commands::Run => connect_on_startup,
            _ => true,
        }
    }
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct SpeedArgs {
    /// Arm velocity for this operation
    #[arg(long, help = "Velocity for this operation (defaults to the configured velocity)")]
    pub velocity: Option<f64>,
    /// Arm acceleration for this operation
    #[arg(long, help = "Acceleration for this operation (defaults to the configured acceleration)")]
    pub acceleration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Commands {
        let mut argv = vec!["slotkeeper"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.unwrap()
    }

    #[test]
    fn test_one_shot_arm_commands_connect_regardless_of_startup_flag() {
        for args in [
            &["store", "A1", "--type", "books"][..],
            &["retrieve", "A1"][..],
            &["home"][..],
            &["pose"][..],
            &["status"][..],
        ] {
            assert!(command(args).connects_arm(false), "{args:?}");
        }
    }

    #[test]
    fn test_connect_on_startup_only_governs_run() {
        assert!(!command(&["run"]).connects_arm(false));
        assert!(command(&["run"]).connects_arm(true));
        assert!(!command(&["zones"]).connects_arm(true));
        assert!(!command(&["available"]).connects_arm(true));
        assert!(!command(&["connect"]).connects_arm(true));
    }
}
