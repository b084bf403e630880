use anyhow::Result;
use clap::{Parser, Subcommand};
use murmur_sync::config::MurmurConfig;
use murmur_sync::database::models::NotificationType;
use murmur_sync::database::Database;
use murmur_sync::events::EventBus;
use murmur_sync::groups::GroupService;
use murmur_sync::node_api::{NodeApi, NodeClient};
use murmur_sync::notifications::NotificationService;
use murmur_sync::poller::SyncPoller;
use murmur_sync::profiles::{ProfileInput, ProfileService};
use murmur_sync::reconcile::{ActiveView, ContentReconciler};
use murmur_sync::telemetry;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(author, version, about = "Murmur sync daemon and CLI")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync daemon against the local node process
    Run,
    /// Register a group for syncing
    AddGroup { group_id: String },
    /// Mark all content in a group as read
    MarkRead { group_id: String },
    /// Show recent notifications and unread badges for a group
    Notifications { group_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let config = MurmurConfig::from_env()?;
    let database = Database::connect(&config.paths)?;
    if database.ensure_migrations()? {
        tracing::info!(db = %config.paths.db_path.display(), "database initialized");
    }
    let events = EventBus::default();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(config, database, events).await,
        Command::AddGroup { group_id } => {
            GroupService::new(database, events).register(&group_id)?;
            println!("registered group {group_id}");
            Ok(())
        }
        Command::MarkRead { group_id } => {
            let cursor = GroupService::new(database, events).mark_read(&group_id)?;
            println!(
                "group {group_id} marked read at {}",
                cursor.latest_read_timestamp
            );
            Ok(())
        }
        Command::Notifications { group_id } => {
            let service =
                NotificationService::new(database, events, config.sync.optimistic_timeout);
            let unread = service.unread_count_map(&group_id)?;
            let rows = service.list(&group_id, &NotificationType::ALL, 20, 0)?;
            println!("{}", serde_json::to_string_pretty(&unread)?);
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
    }
}

async fn run_daemon(config: MurmurConfig, database: Database, events: EventBus) -> Result<()> {
    let client = NodeClient::new(&config.node)?;
    let groups = GroupService::new(database.clone(), events.clone());
    let profiles = ProfileService::new(database.clone());

    // refresh our own profile record for every registered group
    for cursor in groups.list()? {
        match client.fetch_my_profile(&cursor.group_id).await {
            Ok(Some(profile)) => {
                profiles.submit(
                    &cursor.group_id,
                    &profile.publisher,
                    ProfileInput {
                        name: profile.name,
                        avatar: profile.avatar,
                        external_account_id: profile.external_account_id,
                    },
                    false,
                )?;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(error = ?err, group_id = %cursor.group_id, "own profile not available yet");
            }
        }
    }

    let reconciler = ContentReconciler::new(database.clone(), config.node.local_pubkey.clone());
    let poller = SyncPoller::new(
        database,
        reconciler,
        client,
        events.clone(),
        config.sync.clone(),
        ActiveView::default(),
    );

    let stop = poller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            tracing::info!(event = ?event, "sync event");
        }
    });

    poller.run().await;
    Ok(())
}
