use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bookingdesk::auth::{self, Role};
use bookingdesk::config::{AppConfig, DEFAULT_AUTH_SECRET};
use bookingdesk::db;
use bookingdesk::handlers;
use bookingdesk::services::calendar::SystemClock;
use bookingdesk::services::notify::mail_api::MailApiNotifier;
use bookingdesk::services::notify::{self, LogNotifier, Notifier};
use bookingdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("issue-token") {
        return issue_token(&config, &args[1..]);
    }

    if config.auth_secret == DEFAULT_AUTH_SECRET {
        tracing::warn!("AUTH_SECRET is not set, using the default secret; do not run like this in production");
    }

    let conn = db::init_db(&config.database_url)?;

    let notifier: Arc<dyn Notifier> = if config.mail_api_url.is_empty() {
        tracing::info!("MAIL_API_URL not set, notifications will only be logged");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("sending notifications through mail relay (url: {})", config.mail_api_url);
        Arc::new(MailApiNotifier::new(
            config.mail_api_url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        ))
    };

    let (events_tx, events_rx) = mpsc::channel(config.notify_queue_capacity);
    tokio::spawn(notify::run_notification_worker(events_rx, notifier));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        clock: Arc::new(SystemClock),
        events: events_tx,
    });

    let app = handlers::routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `bookingdesk issue-token <actor-id> <username> <ADMIN|STAFF>`
fn issue_token(config: &AppConfig, args: &[String]) -> anyhow::Result<()> {
    let [actor_id, username, role] = args else {
        anyhow::bail!("usage: bookingdesk issue-token <actor-id> <username> <ADMIN|STAFF>");
    };
    let role: Role = role.parse()?;
    let token = auth::issue_token(&config.auth_secret, actor_id, username, role)?;
    println!("{token}");
    Ok(())
}
