use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_notify::api::RestClient;
use realtime_notify::channel::{ChannelAdapter, RealtimeChannel};
use realtime_notify::cli::{self, Commands};
use realtime_notify::config::{self, Config};
use realtime_notify::initializer::RealtimeInitializer;
use realtime_notify::models::Notification;
use realtime_notify::store::{FileSnapshotStore, NotificationStore};
use realtime_notify::transport::{ConnectionState, TransportClient};
use realtime_notify::views::NotificationCenter;

/// Process-wide collaborators, built once and shared by reference.
struct Runtime {
    cfg: Config,
    store: NotificationStore,
    channel: Arc<ChannelAdapter>,
    sync: Arc<RestClient>,
}

impl Runtime {
    fn build(cfg: Config) -> anyhow::Result<Self> {
        // Hydrate before anything reads the badge or the list.
        let snapshot = FileSnapshotStore::new(&cfg.store_dir);
        tracing::debug!(path = %snapshot.path().display(), "notification snapshot location");
        let store = NotificationStore::hydrate(Arc::new(snapshot));

        let transport = Arc::new(TransportClient::new(cfg.reconnect()));
        let channel = Arc::new(ChannelAdapter::new(transport, cfg.realtime_url.clone()));
        let sync = Arc::new(
            RestClient::new(&cfg.api_base_url, cfg.api_token.clone())
                .context("invalid NOTIFY_API_BASE_URL")?,
        );

        Ok(Self {
            cfg,
            store,
            channel,
            sync,
        })
    }

    fn center(&self, company: String) -> NotificationCenter {
        NotificationCenter::new(
            company,
            self.store.clone(),
            self.sync.clone(),
            self.channel.clone(),
        )
        .with_page_size(self.cfg.page_size)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(&cfg.log_format);

    let args = cli::Cli::parse();
    let runtime = Runtime::build(cfg)?;

    let result = match args.command {
        Some(Commands::Listen) | None => {
            let company = runtime.cfg.company(args.company)?;
            listen(&runtime, company).await
        }
        Some(Commands::List { unread }) => {
            list(&runtime.store.notifications(), unread);
            Ok(())
        }
        Some(Commands::Fetch { more }) => {
            let center = runtime.center(runtime.cfg.company(args.company)?);
            let count = if more {
                center.load_more().await?
            } else {
                center.refresh().await?
            };
            println!(
                "{} notification(s) loaded, {} unread{}",
                count,
                center.unread_count(),
                if center.has_more() { ", more available" } else { "" }
            );
            Ok(())
        }
        Some(Commands::MarkRead { id }) => {
            let center = runtime.center(runtime.cfg.company(args.company)?);
            center.mark_as_read(&id).await.context("sync task failed")?;
            println!("{} unread", center.unread_count());
            Ok(())
        }
        Some(Commands::MarkAllRead) => {
            let center = runtime.center(runtime.cfg.company(args.company)?);
            center.mark_all_as_read().await.context("sync task failed")?;
            println!("all notifications marked as read");
            Ok(())
        }
        Some(Commands::Remove { id }) => {
            let center = runtime.center(runtime.cfg.company(args.company)?);
            center
                .remove_notification(&id)
                .await
                .context("sync task failed")?;
            println!("{} notification(s) left", center.notifications().len());
            Ok(())
        }
        Some(Commands::Clear) => {
            let center = runtime.center(runtime.cfg.company(args.company)?);
            center.clear_all().await.context("sync task failed")?;
            println!("notifications cleared");
            Ok(())
        }
        Some(Commands::Echo { message, timeout }) => {
            let company = runtime.cfg.company(args.company)?;
            echo(&runtime, &company, &message, Duration::from_secs(timeout)).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "realtime_notify=debug,notifyd=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_notification(n: &Notification) {
    println!(
        "{} [{}] {}  {}: {}",
        if n.read { " " } else { "*" },
        n.r#type,
        n.timestamp,
        n.title,
        n.message
    );
}

fn list(notifications: &[Notification], unread_only: bool) {
    let shown: Vec<_> = notifications
        .iter()
        .filter(|n| !unread_only || !n.read)
        .collect();
    if shown.is_empty() {
        println!("no notifications");
        return;
    }
    for n in shown {
        print_notification(n);
    }
}

async fn listen(runtime: &Runtime, company: String) -> anyhow::Result<()> {
    let initializer = RealtimeInitializer::new(runtime.channel.clone(), runtime.store.clone());
    initializer.set_tenant(Some(company.clone())).await?;

    let mut seen: HashSet<String> = runtime
        .store
        .notifications()
        .into_iter()
        .map(|n| n.id)
        .collect();
    let mut store_rx = runtime.store.subscribe();
    let mut state_rx = runtime.channel.transport().state_changes();

    tracing::info!(tenant = %company, "listening for notifications, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = store_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = store_rx.borrow_and_update().clone();
                for n in state.notifications.iter().filter(|n| !seen.contains(&n.id)) {
                    print_notification(n);
                }
                seen = state.notifications.into_iter().map(|n| n.id).collect();
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected { tenant } => {
                        tracing::info!(tenant = %tenant, "realtime channel connected");
                    }
                    ConnectionState::Connecting { tenant, attempt } if attempt > 1 => {
                        tracing::info!(tenant = %tenant, attempt, "realtime channel reconnecting");
                    }
                    ConnectionState::Disconnected => {
                        tracing::warn!("realtime channel disconnected, live updates paused");
                    }
                    ConnectionState::Connecting { .. } => {}
                }
            }
        }
    }

    initializer.shutdown().await;
    Ok(())
}

async fn echo(
    runtime: &Runtime,
    company: &str,
    message: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let channel = &runtime.channel;
    channel.initialize(company).await?;

    let mut state_rx = channel.transport().state_changes();
    let connected = matches!(
        tokio::time::timeout(timeout, state_rx.wait_for(|s| s.is_connected())).await,
        Ok(Ok(_))
    );
    if !connected {
        channel.disconnect().await;
        anyhow::bail!("could not connect to {} within {:?}", runtime.cfg.realtime_url, timeout);
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    let sub = channel.on_test_response(move |data| {
        if let Some(tx) = tx.lock().ok().and_then(|mut g| g.take()) {
            let _ = tx.send(data);
        }
    });

    channel.send_test_message(message);
    let reply = tokio::time::timeout(timeout, rx).await;
    sub.unsubscribe();
    channel.disconnect().await;

    match reply {
        Ok(Ok(data)) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        _ => anyhow::bail!("no test-response within {:?}", timeout),
    }
}
