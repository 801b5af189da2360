mod cli;

use onair::{config, fixture};
use onair_core::events::EventBus;
use onair_core::{
    AdLibPieceId, Clock, ClientResponse, PartId, RundownId, StudioId, SystemClock,
};
use onair_db::init_pool;
use onair_playout::service::part_id_for;
use onair_playout::{PlayoutService, UserActions};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "onair=trace,onair_playout=trace,onair_resolver=debug,onair_db=debug,onair_core=debug".to_string()
        } else {
            "onair=info,onair_playout=info,onair_resolver=warn,onair_db=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("onair {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let service = open_service(&config)?;
            run_command(&service, command)
        }
    }
}

fn open_service(config: &config::Config) -> Result<Arc<PlayoutService>> {
    let db_path = config.database.path.to_string_lossy();
    tracing::debug!("Opening database at {}", db_path);
    let pool = init_pool(&db_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::default());
    Ok(PlayoutService::new(pool, config.playout.clone(), clock, bus))
}

fn print_response<T: Serialize>(response: &ClientResponse<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

fn respond<T: Serialize>(result: onair_core::Result<T>) -> Result<()> {
    let response: ClientResponse<T> = result.into();
    print_response(&response)
}

/// Accept either a stored part id or the external id it was ingested under.
fn resolve_part(service: &PlayoutService, rundown: &RundownId, arg: &str) -> onair_core::Result<PartId> {
    let parts = service.parts(rundown)?;
    if parts.iter().any(|p| p.id.as_str() == arg) {
        return Ok(PartId::from(arg));
    }
    Ok(part_id_for(rundown, arg))
}

fn run_command(service: &Arc<PlayoutService>, command: Commands) -> Result<()> {
    let actions = UserActions::new(service.clone());

    match command {
        Commands::Import { fixture: path } => {
            let loaded = fixture::load_fixture(&path)?;
            respond(fixture::import_fixture(service, &loaded))
        }
        Commands::Show { rundown } => {
            let rundown = RundownId::from(rundown);
            let shown = service.rundown(&rundown).and_then(|r| {
                Ok(serde_json::json!({
                    "rundown": r,
                    "parts": service.parts(&rundown)?,
                    "adlibs": service.adlibs(&rundown)?,
                }))
            });
            respond(shown)
        }
        Commands::Activate { rundown, rehearsal } => {
            print_response(&actions.activate(&rundown.into(), rehearsal))
        }
        Commands::Deactivate { rundown } => print_response(&actions.deactivate(&rundown.into())),
        Commands::Reset { rundown } => print_response(&actions.reset(&rundown.into())),
        Commands::Take { rundown } => print_response(&actions.take(&rundown.into())),
        Commands::SetNext { rundown, part } => {
            let rundown = RundownId::from(rundown);
            let response = match part {
                None => actions.set_next(&rundown, None),
                Some(arg) => match resolve_part(service, &rundown, &arg) {
                    Ok(part) => actions.set_next(&rundown, Some(&part)),
                    Err(e) => ClientResponse::error(&e),
                },
            };
            print_response(&response)
        }
        Commands::MoveNext {
            rundown,
            parts,
            segments,
        } => print_response(&actions.move_next(&rundown.into(), parts, segments)),
        Commands::Hold { rundown } => print_response(&actions.activate_hold(&rundown.into())),
        Commands::Adlib { rundown, adlib } => {
            print_response(&actions.start_adlib(&rundown.into(), &AdLibPieceId::from(adlib)))
        }
        Commands::Timeline { studio } => {
            respond(service.timeline(&StudioId::from(studio)))
        }
        Commands::State { studio, at } => {
            let at = at.unwrap_or_else(|| service.now());
            respond(service.state_at(&StudioId::from(studio), at))
        }
        Commands::Validate { .. } | Commands::Version => Ok(()),
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
            for warning in config.validate() {
                println!("  warning: {}", warning);
            }
        }
        None => {
            println!("No config file specified, using defaults");
            print_summary(&config::Config::default());
        }
    }

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Database: {}", config.database.path.display());
    println!("  Min take span: {}ms", config.playout.min_take_span_ms);
    println!("  Recompute debounce: {}ms", config.playout.recompute_debounce_ms);
    println!("  Lookahead parts: {}", config.playout.max_lookahead_parts);
    println!("  Strict mappings: {}", config.playout.strict_mappings);
}
