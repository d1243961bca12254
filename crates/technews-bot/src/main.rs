mod console;
mod ingress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use technews_core::config::Config;
use technews_core::metrics::init_metrics_from_env;
use technews_core::security::require_env;
use technews_core::{
    ArticleQuery, ArticleSource, ConfigLoader, DeliveryMode, DeliveryScheduler, DiscordTransport,
    NewsApiClient, OllamaGenerator, Pipeline, ReportProducer, ReporterAgent, TelemetryOptions,
    Transport, init_telemetry, truncate_report,
};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::console::{CONSOLE_CHANNEL, ConsoleTransport, spawn_stdin_reader};
use crate::ingress::{IngressState, spawn_ingress};

#[derive(Parser, Debug)]
#[command(name = "technews", version, about = "Technology news reporter")]
struct Cli {
    /// Configuration file (defaults to $TECHNEWS_CONFIG, then ./config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the command, start the timer and answer inbound events.
    Serve(ServeArgs),
    /// Produce one report and print it.
    Report(ReportArgs),
    /// Run a single timer tick against the configured transport.
    Tick,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Read events from stdin and print outbound messages instead of using Discord.
    #[arg(long)]
    console: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Topic to report on.
    #[arg(long)]
    topic: String,

    /// Go through the reporter agent instead of the plain pipeline.
    #[arg(long)]
    agent: bool,
}

fn main() -> Result<()> {
    // Deployments keep their settings in a .env file; a missing file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;

    init_telemetry(TelemetryOptions {
        default_level: config.logging.level.clone(),
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("technews");

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Serve(args) => serve_command(config, args).await?,
            Command::Report(args) => report_command(config, args).await?,
            Command::Tick => tick_command(config).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let explicit = path.is_some() || std::env::var_os("TECHNEWS_CONFIG").is_some();
    match ConfigLoader::load(path) {
        Ok(config) => Ok(config),
        Err(technews_core::TechNewsError::ConfigIo { path, .. }) if !explicit => {
            eprintln!("{} not found; using built-in defaults", path.display());
            Ok(Config::default())
        }
        Err(err) => Err(err).context("failed to load configuration"),
    }
}

fn build_producer(config: &Config, mode: DeliveryMode) -> Result<Arc<dyn ReportProducer>> {
    let generator = Arc::new(OllamaGenerator::from_config(config)?);
    let backend = Arc::new(NewsApiClient::from_config(config));
    let source = Arc::new(ArticleSource::new(backend, config.news.language.clone()));
    let query = ArticleQuery {
        window: config.news.window(),
        limit: config.news.page_size,
        sort_by: config.news.sort_by,
    };

    let pipeline = Arc::new(Pipeline::from_parts(
        generator.clone(),
        source,
        query,
        config.news.headlines_tool,
    ));

    let producer: Arc<dyn ReportProducer> = match mode {
        DeliveryMode::Pipeline => pipeline,
        DeliveryMode::Agent => Arc::new(ReporterAgent::new(generator, pipeline)),
    };
    Ok(producer)
}

/// Where inbound events come from while serving.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InboundSource {
    Console,
    Ingress(String),
    Detached,
}

impl InboundSource {
    fn select(console: bool, config: &Config) -> Self {
        if console {
            return Self::Console;
        }
        match &config.transport.ingress_bind {
            Some(addr) => Self::Ingress(addr.clone()),
            None => Self::Detached,
        }
    }

    /// A published command nobody listens for would go unanswered.
    fn registers_commands(&self) -> bool {
        !matches!(self, Self::Detached)
    }
}

async fn serve_command(config: Config, args: ServeArgs) -> Result<()> {
    let producer = build_producer(&config, config.delivery.mode)?;
    let mut scheduler_config = config.scheduler_config();
    let source = InboundSource::select(args.console, &config);

    let transport: Arc<dyn Transport> = if source == InboundSource::Console {
        if scheduler_config.channel_id.is_none() {
            scheduler_config.channel_id = Some(CONSOLE_CHANNEL.to_string());
        }
        Arc::new(ConsoleTransport)
    } else {
        Arc::new(DiscordTransport::from_config(&config)?)
    };

    let scheduler = Arc::new(DeliveryScheduler::new(
        producer,
        transport,
        scheduler_config,
    ));

    let (events, receiver) = mpsc::channel(64);
    let dispatcher = scheduler.clone().dispatch(receiver);
    let (stop_ingress, ingress_stopped) = oneshot::channel::<()>();

    let reader = match &source {
        InboundSource::Console => Some(spawn_stdin_reader(events)),
        InboundSource::Ingress(addr) => {
            let token = require_env(&config.transport.ingress_token_env)?;
            let state = IngressState::new(events, token);
            let shutdown = async move {
                let _ = ingress_stopped.await;
            };
            Some(spawn_ingress(addr, state, shutdown).await?)
        }
        InboundSource::Detached => {
            warn!(
                "transport.ingress_bind is not set; serving timer reports only and leaving \
                 /technews unregistered"
            );
            drop(events);
            None
        }
    };

    if source.registers_commands() {
        if let Err(err) = scheduler.register_commands().await {
            warn!(error = %err, "command registration failed; continuing without it");
        }
    }

    let timer = scheduler.clone().start_timer();
    info!(mode = ?config.delivery.mode, source = ?source, "technews serving");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    timer.stop().await;
    let _ = stop_ingress.send(());
    if let Some(reader) = reader {
        if source == InboundSource::Console {
            reader.abort();
        } else {
            let _ = reader.await;
        }
    }
    dispatcher.abort();
    Ok(())
}

async fn report_command(config: Config, args: ReportArgs) -> Result<()> {
    let mode = if args.agent {
        DeliveryMode::Agent
    } else {
        config.delivery.mode
    };
    let producer = build_producer(&config, mode)?;

    info!(topic = %args.topic, ?mode, "producing report");
    let report = producer.produce(&args.topic).await?;
    println!(
        "{}",
        truncate_report(&report, config.delivery.max_report_chars)
    );
    Ok(())
}

async fn tick_command(config: Config) -> Result<()> {
    let producer = build_producer(&config, config.delivery.mode)?;
    let transport = Arc::new(DiscordTransport::from_config(&config)?);
    let scheduler = DeliveryScheduler::new(producer, transport, config.scheduler_config());

    let outcome = scheduler.tick().await;
    println!("tick {outcome}");
    Ok(())
}
