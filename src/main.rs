use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sponsor_assist::config::AppConfig;
use sponsor_assist::dashboard::{self, DashboardState};
use sponsor_assist::llm::{ImageModel, LanguageModel, OpenAiClient};
use sponsor_assist::mailbox::imap_smtp::ImapMailbox;
use sponsor_assist::mailbox::Mailbox;
use sponsor_assist::pipeline::{EmailClassifier, Illustrator};
use sponsor_assist::poller::{Poller, PollerConfig};
use sponsor_assist::store::DecisionLog;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: OPENAI_API_KEY, TARGET_SENDER,");
        eprintln!("            EMAIL_IMAP_HOST, EMAIL_USERNAME, EMAIL_PASSWORD");
        std::process::exit(1);
    });

    eprintln!("📬 Sponsor Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Watching: {}", config.target_sender);
    eprintln!("   Model: {} / {}", config.chat_model, config.image_model);
    eprintln!("   Dashboard: http://0.0.0.0:{}/api/decisions", config.dashboard_port);
    eprintln!("   Database: {}\n", config.db_path.display());

    // ── Decision log ─────────────────────────────────────────────────────
    let log = Arc::new(DecisionLog::open(&config.db_path).await.unwrap_or_else(|e| {
        eprintln!(
            "Error: Failed to open database at {}: {}",
            config.db_path.display(),
            e
        );
        std::process::exit(1);
    }));

    // ── Model clients and pipeline ───────────────────────────────────────
    let client = Arc::new(OpenAiClient::new(
        config.api_key.clone(),
        config.chat_model.clone(),
        config.image_model.clone(),
    ));
    let llm: Arc<dyn LanguageModel> = client.clone();
    let image: Arc<dyn ImageModel> = client;

    let illustrator = Arc::new(Illustrator::new(
        image,
        config.image_prompt_template.clone(),
        config.image_fallback_detail.clone(),
        config.image_output_dir.clone(),
    ));
    let classifier = Arc::new(EmailClassifier::new(
        llm,
        illustrator,
        config.keywords.clone(),
        config.reply_instructions.clone(),
    ));

    let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(config.mailbox.clone()));

    // ── Dashboard ────────────────────────────────────────────────────────
    let dashboard_state = DashboardState {
        log: Arc::clone(&log),
    };
    let dashboard_port = config.dashboard_port;
    tokio::spawn(async move {
        if let Err(e) = dashboard::serve(dashboard_state, dashboard_port).await {
            tracing::error!(error = %e, port = dashboard_port, "Dashboard server failed");
        }
    });

    // ── Shutdown handling ────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    // ── Polling loop ─────────────────────────────────────────────────────
    let poller_config = PollerConfig {
        target_sender: config.target_sender.clone(),
        max_batch: config.max_batch,
        message_delay: config.message_delay,
        poll_interval: config.poll_interval,
    };
    let mut poller = Poller::new(mailbox, classifier, log, poller_config);
    poller.run(shutdown).await;

    Ok(())
}
