//! `skyradar` - CLI for the skyradar service
//!
//! This binary runs the radar service and manages the flight history
//! archive it writes to.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use skyradar::cli::{Cli, Command, ConfigCommand, FlightsCommand, UsersCommand};
use skyradar::{init_logging, Config, FlightRecord, Role, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(serve_cmd) => {
            let bind = match serve_cmd.bind {
                Some(addr) => addr
                    .parse()
                    .with_context(|| format!("invalid bind address: {addr}"))?,
                None => config.bind_addr()?,
            };
            skyradar::server::run(config, bind).await?;
            Ok(())
        }
        Command::Flights(flights_cmd) => handle_flights(&config, flights_cmd),
        Command::Users(users_cmd) => handle_users(&config, users_cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn handle_flights(config: &Config, cmd: FlightsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        FlightsCommand::List {
            callsign,
            limit,
            json,
        } => {
            let flights = match callsign {
                Some(cs) => storage.flights_by_callsign(&cs, limit)?,
                None => storage.recent_flights(limit)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&flights)?);
            } else if flights.is_empty() {
                println!("No archived flights.");
            } else {
                for flight in &flights {
                    print_flight(flight);
                }
            }
        }
        FlightsCommand::Prune => {
            let Some(max_age) = config.max_age() else {
                println!("history.max_age_days is 0, nothing to prune.");
                return Ok(());
            };
            let max_age = chrono::Duration::from_std(max_age)?;
            let removed = storage.prune_older_than(max_age)?;
            println!("Pruned {removed} flights.");
        }
    }
    Ok(())
}

fn print_flight(flight: &FlightRecord) {
    let takeoff = flight
        .takeoff_time
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    let route = if flight.departure.is_empty() && flight.arrival.is_empty() {
        String::new()
    } else {
        format!(" {}-{}", flight.departure, flight.arrival)
    };
    println!(
        "{:>6}  {:<10} {:<6}{}  takeoff {}  ended {}  {} points",
        flight.id.unwrap_or_default(),
        flight.callsign,
        flight.aircraft_type,
        route,
        takeoff,
        flight.ended_at.format("%Y-%m-%d %H:%M"),
        flight.path_len(),
    );
}

fn handle_users(config: &Config, cmd: UsersCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        UsersCommand::SetRole { identity, role } => {
            let role = Role::from(role);
            storage.set_user_role(&identity, role)?;
            println!("{identity}: {role}");
        }
        UsersCommand::Show { identity } => match storage.user_role(&identity)? {
            Some(role) => println!(
                "{identity}: {role}{}",
                if role.keeps_history() {
                    " (flights archived)"
                } else {
                    ""
                }
            ),
            None => println!("{identity}: unknown (treated as guest)"),
        },
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let path = config.database_path();
    let stats = if path.exists() {
        Some(open_storage(config)?.stats()?)
    } else {
        None
    };

    if json {
        let status = serde_json::json!({
            "bind_addr": config.server.bind_addr,
            "history_enabled": config.history.enabled,
            "database_path": path,
            "database_exists": stats.is_some(),
            "flights": stats.as_ref().map(|s| s.total_flights),
            "users": stats.as_ref().map(|s| s.total_users),
            "oldest_flight": stats.as_ref().and_then(|s| s.oldest_flight),
            "newest_flight": stats.as_ref().and_then(|s| s.newest_flight),
            "db_size_bytes": stats.as_ref().map(|s| s.db_size_bytes),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("skyradar status");
        println!("---------------");
        println!("Listen address: {}", config.server.bind_addr);
        println!("History:        {}", if config.history.enabled { "enabled" } else { "disabled" });
        println!("Database:       {}", path.display());
        match stats {
            Some(stats) => {
                println!("Flights:        {}", stats.total_flights);
                println!("Users:          {}", stats.total_users);
                if let (Some(oldest), Some(newest)) = (stats.oldest_flight, stats.newest_flight) {
                    println!("Range:          {oldest} .. {newest}");
                }
                println!("Size:           {} bytes", stats.db_size_bytes);
            }
            None => println!("                (not created yet)"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.server.bind_addr);
                println!("  Heartbeat (s):      {}", config.server.heartbeat_secs);
                println!("  Broadcast capacity: {}", config.server.broadcast_capacity);
                println!();
                println!("[Tracker]");
                println!("  Stale timeout (s):  {}", config.tracker.stale_timeout_secs);
                println!("  Reap interval (s):  {}", config.tracker.reap_interval_secs);
                println!("  Path cap:           {}", config.tracker.path_cap);
                println!("  Require reporter:   {}", config.tracker.require_reporter);
                println!("  Airborne AGL (ft):  {}", config.tracker.airborne_agl_ft);
                println!();
                println!("[Incidents]");
                println!("  Window (hours):     {}", config.incidents.window_hours);
                println!("  Capacity:           {}", config.incidents.capacity);
                println!();
                println!("[History]");
                println!("  Enabled:            {}", config.history.enabled);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Min path points:    {}", config.history.min_path_points);
                println!("  Max age (days):     {}", config.history.max_age_days);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
