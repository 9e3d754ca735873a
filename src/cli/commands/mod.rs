
use crate::agent::{AgentLoop, AgentLoopConfig};
use crate::bus::MessageBus;
use crate::channels::ChannelManager;
use crate::channels::feishu::FeishuChannel;
use crate::channels::wechat::WechatChannel;
use crate::config::credentials::missing_credentials;
use crate::config::{Config, load_config, save_config};
use crate::gateway::GatewayState;
use crate::providers::base::{LLMProvider, ReplyGenerator};
use crate::providers::bridge::Bridge;
use crate::providers::dashscope::DashScopeSpeech;
use crate::providers::openai::{OpenAiClassifier, OpenAiImageProvider, OpenAiProvider};
use crate::safety::moderation::{ModerationChecker, ModerationScope, SafetyClassifier};
use crate::utils::task_tracker::TaskTracker;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chatgate")]
#[command(about = "Multi-channel chat-bot gateway with image moderation", version)]
pub struct Cli {
    /// Config file (defaults to ~/.chatgate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run channels, webhooks and the worker pool until Ctrl-C
    Gateway,
    /// Run one moderation check and print the verdict as JSON
    Moderate { prompt: String },
    /// Load and validate the configuration
    ConfigCheck,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => {
            let path = init(config_path, force)?;
            println!("Created config at {}", path.display());
            println!("Next: set providers.openai.apiKey and enable a channel.");
        }
        Commands::Gateway => gateway(config_path).await?,
        Commands::Moderate { prompt } => {
            let config = load_config(config_path)?;
            println!("{}", moderate(&config, &prompt).await?);
        }
        Commands::ConfigCheck => {
            let config = load_config(config_path)?;
            for line in config_summary(&config) {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => crate::config::get_config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    save_config(&Config::default(), Some(path.as_path()))?;
    Ok(path)
}

fn config_summary(config: &Config) -> Vec<String> {
    let mut channels = Vec::new();
    if config.channels.feishu.enabled {
        channels.push("feishu");
    }
    if config.channels.wechat.enabled {
        channels.push("wechat");
    }
    let mut lines = vec![
        "config ok".to_string(),
        format!(
            "channels: {}",
            if channels.is_empty() {
                "none".to_string()
            } else {
                channels.join(", ")
            }
        ),
        format!(
            "moderation: {} ({} attempts, await {}s)",
            if config.moderation.enabled { "on" } else { "off" },
            config.moderation.retry_offsets_secs.len(),
            config.moderation.await_timeout_secs
        ),
        format!("workers: {}", config.agent.workers),
        format!("webhooks: {}:{}", config.gateway.host, config.gateway.port),
    ];
    let missing = missing_credentials(config);
    if !missing.is_empty() {
        lines.push(format!("unset credentials: {}", missing.join(", ")));
    }
    lines
}

/// Providers and the reply generator shared by the gateway and `moderate`.
struct Providers {
    chat: Arc<dyn LLMProvider>,
    generator: Arc<dyn ReplyGenerator>,
}

fn setup_providers(config: &Config) -> Providers {
    let openai = &config.providers.openai;
    if openai.api_key.is_empty() {
        warn!("providers.openai.apiKey is empty; requests rely on per-message keys");
    }
    let chat: Arc<dyn LLMProvider> = Arc::new(OpenAiProvider::new(openai));

    let mut images = OpenAiImageProvider::new(openai);
    if openai.image_create_use_chat_model {
        images = images.with_chat_model(chat.clone());
    }
    let mut bridge = Bridge::new(chat.clone(), &config.agent, openai).with_images(Arc::new(images));
    if config.providers.dashscope.api_key.is_empty() {
        if config.agent.voice_reply {
            warn!("voiceReply is on but providers.dashscope.apiKey is empty; replying with text");
        }
    } else {
        bridge = bridge.with_speech(Arc::new(DashScopeSpeech::new(
            config.providers.dashscope.clone(),
        )));
    }

    Providers {
        chat,
        generator: Arc::new(bridge),
    }
}

fn setup_checker(config: &Config, providers: &Providers) -> Result<Option<Arc<ModerationChecker>>> {
    if !config.moderation.enabled {
        info!("image moderation disabled");
        return Ok(None);
    }
    let classifier: Arc<dyn SafetyClassifier> = Arc::new(OpenAiClassifier::new(
        providers.chat.clone(),
        config.moderation.classifier_model.clone(),
    ));
    let checker = ModerationChecker::from_config(
        &config.moderation,
        Some(classifier),
        Some(providers.generator.clone()),
    )?;
    Ok(Some(Arc::new(checker)))
}

struct Channels {
    manager: ChannelManager,
    feishu: Option<Arc<FeishuChannel>>,
    wechat: Option<Arc<WechatChannel>>,
}

fn setup_channels(config: &Config) -> Channels {
    let mut manager = ChannelManager::new();
    let feishu = config
        .channels
        .feishu
        .enabled
        .then(|| Arc::new(FeishuChannel::new(config.channels.feishu.clone())));
    let wechat = config
        .channels
        .wechat
        .enabled
        .then(|| Arc::new(WechatChannel::new(config.channels.wechat.clone())));
    if let Some(ch) = &feishu {
        manager.register(ch.clone());
    }
    if let Some(ch) = &wechat {
        manager.register(ch.clone());
    }
    Channels {
        manager,
        feishu,
        wechat,
    }
}

async fn moderate(config: &Config, prompt: &str) -> Result<String> {
    let providers = setup_providers(config);
    let checker = setup_checker(config, &providers)?
        .context("moderation is disabled in the configuration")?;
    let verdict = checker.check(prompt, &ModerationScope::default()).await;
    Ok(serde_json::to_string_pretty(&verdict)?)
}

async fn gateway(config_path: Option<&Path>) -> Result<()> {
    info!("Loading configuration...");
    let config = load_config(config_path)?;

    let providers = setup_providers(&config);
    let checker = setup_checker(&config, &providers)?;
    let channels = setup_channels(&config);
    if channels.manager.is_empty() {
        warn!("no channels enabled; webhooks will answer 404");
    }

    let bus = Arc::new(Mutex::new(MessageBus::from_config(&config.agent)));
    let tasks = Arc::new(TaskTracker::new());
    let agent = Arc::new(
        AgentLoop::new(AgentLoopConfig {
            bus: bus.clone(),
            generator: providers.generator.clone(),
            checker,
            channels: channels.manager.clone(),
            tasks,
            agent: config.agent.clone(),
            moderation: config.moderation.clone(),
        })
        .await?,
    );

    let mut state = GatewayState::new(bus);
    if let Some(ch) = channels.feishu {
        state = state.with_feishu(ch);
    }
    if let Some(ch) = channels.wechat {
        state = state.with_wechat(ch);
    }

    channels.manager.start_all().await?;
    println!("Starting chatgate gateway...");
    println!("Enabled channels: {:?}", channels.manager.enabled_channels());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let mut server = tokio::spawn(async move {
        crate::gateway::serve(&host, port, state, shutdown_rx).await
    });
    let agent_task = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };

    info!("All services started, gateway is running");

    let server_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
            None
        }
        res = agent_task => {
            warn!("agent loop exited: {:?}", res);
            None
        }
        res = &mut server => Some(res),
    };

    agent.stop().await;
    shutdown_tx.send_replace(true);
    channels.manager.stop_all().await;
    let server_result = match server_result {
        Some(res) => res,
        None => server.await,
    };
    server_result.context("webhook server task failed")?
}
