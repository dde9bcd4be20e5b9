use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use events_hub::{
    config::ConfigStore,
    models::{EventRecord, User},
    view::{TimeWindow, ViewQuery},
    EventStatus, EventsHub,
};

#[derive(Parser)]
#[command(name = "events-hub", version, about = "City event sync and curation")]
struct Cli {
    /// Config file (defaults to config.json in the data root)
    #[arg(long, env = "EVENTS_HUB_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation cycle
    Sync {
        #[arg(long)]
        city: Option<String>,
    },
    /// Sync the active city on a timer until interrupted
    Watch {
        #[arg(long)]
        city: Option<String>,
    },
    /// Dashboard listing for a city
    List {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        status: Option<EventStatus>,
        #[arg(long, default_value = "all")]
        window: TimeWindow,
    },
    /// Per-status totals for a city
    Counts {
        #[arg(long)]
        city: Option<String>,
    },
    /// Curated events as the public sees them
    Feed {
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Promote an event to imported
    Import {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete an event from the catalog
    Remove { id: String },
    /// Record a ticket request for an event
    Lead {
        event_id: String,
        email: String,
        #[arg(long)]
        consent: bool,
    },
    /// Store the signed-in user's profile
    Login {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        picture: String,
    },
    Logout,
    Whoami,
    /// Show or toggle the theme preference
    Theme {
        #[arg(long)]
        toggle: bool,
    },
    /// Show or change the active city
    Config {
        #[arg(long)]
        active_city: Option<String>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("events_hub=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config_store = match cli.config {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    };

    if let Command::Config {
        active_city,
        interval_secs,
    } = &cli.command
    {
        let mut config = config_store.read();
        if active_city.is_some() || interval_secs.is_some() {
            let active_city = match active_city {
                Some(city) => match config.canonical_city(city) {
                    Some(known) => Some(known.to_string()),
                    None => bail!("unknown city {city}; known: {}", config.cities.join(", ")),
                },
                None => None,
            };
            config = config_store.update(|config| {
                if let Some(city) = active_city {
                    config.active_city = city;
                }
                if let Some(secs) = interval_secs {
                    config.sync_interval_secs = *secs;
                }
            })?;
        }
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = config_store.read();
    let hub = EventsHub::open(config.clone())?;
    let city_or_active = |city: Option<String>| city.unwrap_or_else(|| config.active_city.clone());

    match cli.command {
        Command::Sync { city } => {
            let outcome = hub.sync_city(&city_or_active(city)).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Watch { city } => {
            let scheduler = hub.start_scheduler(&city_or_active(city))?;
            tokio::signal::ctrl_c().await?;
            info!(city = %scheduler.active_city(), "shutting down scheduler");
            scheduler.shutdown().await;
        }
        Command::List {
            city,
            status,
            window,
        } => {
            let query = ViewQuery {
                city: city_or_active(city),
                status,
                window,
            };
            print_events(&hub.dashboard(&query)?);
        }
        Command::Counts { city } => {
            let counts = hub.counts(&city_or_active(city))?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Feed { search } => print_events(&hub.public_feed(&search)?),
        Command::Import { id, notes } => {
            let record = hub.import_event(&id, notes)?;
            println!("imported {} ({})", record.id, record.title);
        }
        Command::Remove { id } => {
            let record = hub.remove_event(&id)?;
            println!("removed {} ({})", record.id, record.title);
        }
        Command::Lead {
            event_id,
            email,
            consent,
        } => {
            hub.submit_ticket_lead(&event_id, &email, consent)?;
            println!("lead recorded for {event_id}");
        }
        Command::Login {
            id,
            name,
            email,
            picture,
        } => {
            hub.login(&User {
                id,
                name,
                email,
                picture,
            })?;
            println!("signed in");
        }
        Command::Logout => {
            hub.logout()?;
            println!("signed out");
        }
        Command::Whoami => match hub.current_user()? {
            Some(user) => println!("{} <{}>", user.name, user.email),
            None => println!("not signed in"),
        },
        Command::Theme { toggle } => {
            let theme = if toggle {
                hub.toggle_theme()?
            } else {
                hub.theme()?
            };
            println!("{}", theme.as_str());
        }
        // handled before the store is opened
        Command::Config { .. } => {}
    }

    Ok(())
}

fn print_events(events: &[EventRecord]) {
    if events.is_empty() {
        println!("no events");
        return;
    }
    for event in events {
        println!(
            "{:<20} {:<9} {:<24} {} @ {}",
            event.id,
            event.status,
            event.date_time,
            event.title,
            event.venue_name
        );
    }
}
