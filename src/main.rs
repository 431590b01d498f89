use anyhow::Result;
use clap::Parser;

use slotkeeper::boundary::Request;
use slotkeeper::cli::commands::config::ConfigCommand;
use slotkeeper::cli::commands::device::DeviceCommand;
use slotkeeper::cli::commands::run::RunCommand;
use slotkeeper::cli::commands::tasks::{RetrieveCommand, StoreCommand};
use slotkeeper::cli::commands::zones::ZonesCommand;
use slotkeeper::cli::commands::{show_how_to_get_started, AppContext, Command};
use slotkeeper::cli::{Cli, Commands, GlobalOptions};
use slotkeeper::config::SlotkeeperConfig;
use slotkeeper::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    SlotkeeperConfig::load_env_file()?;
    let config = match cli.global.config.as_deref() {
        Some(path) => SlotkeeperConfig::load_from(Some(path))?,
        None => SlotkeeperConfig::load()?,
    };

    let Some(command) = cli.command else {
        return tokio::runtime::Runtime::new()?.block_on(show_how_to_get_started());
    };

    if let Commands::Config { save } = command {
        return ConfigCommand::new(save).execute(&config);
    }

    init_telemetry(&config.observability)?;
    let result = tokio::runtime::Runtime::new()?.block_on(run_command(command, config, &cli.global));
    shutdown_telemetry();
    result
}

async fn run_command(command: Commands, config: SlotkeeperConfig, global: &GlobalOptions) -> Result<()> {
    let needs_arm = command.connects_arm(config.device.connect_on_startup);
    let context = AppContext::start(config, global, needs_arm).await?;

    let result = match command {
        Commands::Store {
            zone,
            product_type,
            info,
            max_attempts,
            speed,
        } => {
            StoreCommand::new(zone, product_type)
                .with_info(info)
                .with_max_attempts(max_attempts)
                .with_speed(speed)
                .execute(&context)
                .await
        }
        Commands::Retrieve { zone, speed } => RetrieveCommand::new(zone).with_speed(speed).execute(&context).await,
        Commands::Zones => ZonesCommand::new().execute(&context).await,
        Commands::Available => ZonesCommand::new().available_only(true).execute(&context).await,
        Commands::Status => DeviceCommand::new(Request::Status).execute(&context).await,
        Commands::Pose => DeviceCommand::new(Request::Pose).execute(&context).await,
        Commands::Home => DeviceCommand::new(Request::Home).execute(&context).await,
        Commands::Connect => DeviceCommand::new(Request::Connect).execute(&context).await,
        Commands::MoveTo { x, y, z, r, speed } => {
            DeviceCommand::new(Request::MoveTo {
                x,
                y,
                z,
                r,
                speed: context.speed(&speed),
            })
            .execute(&context)
            .await
        }
        Commands::SetSpeed {
            velocity,
            acceleration,
        } => {
            DeviceCommand::new(Request::SetSpeed {
                velocity,
                acceleration,
            })
            .execute(&context)
            .await
        }
        Commands::Run => RunCommand.execute(&context).await,
        Commands::Config { .. } => Ok(()),
    };

    // the arm is released even when the command failed
    context.shutdown().await?;
    result
}
