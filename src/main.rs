use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use farm_advisor::{
    config::Config,
    delivery::{Channel, ConsoleDelivery, Delivery, RetryingDelivery, TelegramDelivery},
    evidence::{EvidenceStore, InMemoryEvidenceStore, PgEvidenceStore},
    intent::{IntentClassifier, IntentResolver, LlmIntentClassifier},
    llm::LLM,
    pipeline::{Pipeline, PipelineHandle, RequestContext},
    routes::create_router,
    scheduler::{ScheduleKind, Scheduler},
    translation::{LlmTranslator, Translator},
    utils::init_logging,
    AppState,
};

/// Bilingual irrigation and crop-health advisories for small farm plots
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the scheduled advisories (default)
    Serve,

    /// Ask one question and print the reply
    Ask {
        /// The question, in English or Telugu
        text: String,

        /// Plot id to use when the question names none
        #[arg(long)]
        plot: Option<String>,
    },

    /// Run one scheduled firing now: morning, satellite or weekly
    Trigger { kind: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _log_guard = init_logging(&config.logging);
    info!("Configuration loaded: {:?}", config.server);

    let store: Arc<dyn EvidenceStore> = match &config.database.url {
        Some(url) => {
            let store = PgEvidenceStore::connect(&config.database, url).await?;
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(store.pool())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            info!("Database migrations completed");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory demo plots");
            Arc::new(InMemoryEvidenceStore::demo().await)
        }
    };

    let llm = LLM::from_config(&config.llm).map(Arc::new);
    match &llm {
        Some(llm) => info!("LLM provider: {}", llm.provider_name()),
        None => warn!("No LLM configured, intent falls back to keywords and replies stay English"),
    }
    let classifier = llm
        .clone()
        .map(|llm| Arc::new(LlmIntentClassifier::new(llm)) as Arc<dyn IntentClassifier>);
    let translator = llm.map(|llm| Arc::new(LlmTranslator::new(llm)) as Arc<dyn Translator>);

    let intents = IntentResolver::new(classifier, Duration::from_millis(config.llm.timeout_ms));
    let pipeline = PipelineHandle::new(Pipeline::new(&config.advisory, intents, store.clone(), translator));

    let (outbound, recipients): (Arc<dyn Delivery>, Vec<String>) = match &config.delivery.telegram_bot_token {
        Some(token) => (
            Arc::new(TelegramDelivery::new(&config.delivery.telegram_api_base, token)),
            config.delivery.telegram_chat_ids.clone(),
        ),
        None => (Arc::new(ConsoleDelivery), vec!["console".to_string()]),
    };
    let delivery = Arc::new(RetryingDelivery::new(
        outbound,
        config.delivery.max_attempts,
        Duration::from_millis(config.delivery.base_delay_ms),
    ));
    let scheduler = Scheduler::new(
        pipeline.clone(),
        store.clone(),
        delivery,
        recipients,
        config.scheduler.utc_offset_minutes,
    )?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Ask { text, plot } => {
            let ctx = pipeline
                .run(RequestContext::interactive(text, Channel::Console, plot))
                .await?;
            println!("{}", ctx.formatted.get().map(String::as_str).unwrap_or_default());
        }
        Commands::Trigger { kind } => {
            let kind = ScheduleKind::from_slug(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown schedule kind: {} (morning, satellite, weekly)", kind))?;
            for report in scheduler.run_kind(kind).await? {
                info!(
                    plot_id = %report.plot_id,
                    alert = report.alert,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Trigger finished"
                );
            }
        }
        Commands::Serve => {
            if config.scheduler.enabled {
                let handles = scheduler.clone().spawn();
                info!("Scheduler started with {} timers", handles.len());
            }

            let state = AppState {
                pipeline,
                store,
                config: config.clone(),
                scheduler,
            };
            let app = create_router(state);

            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
            info!("Server listening on {}", addr);

            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
    }

    Ok(())
}
