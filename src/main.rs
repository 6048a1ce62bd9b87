//! Push Event Bridge CLI
//!
//! 在本机模拟消息传输层和平台交互：路由入站消息、路由通知操作、
//! 唤醒并执行 spool 中的延迟任务。事件以 JSON 行输出到 stdout，日志走 stderr。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use push_event_bridge::{
    AppStateOracle, Bridge, BridgeConfig, Event, InboundMessage, NotificationContent, Payload,
    Subscriber,
};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "peb")]
#[command(about = "Push Event Bridge - 推送消息/通知事件路由")]
#[command(version)]
struct Cli {
    /// 输出 debug 日志
    #[arg(long, short, global = true)]
    verbose: bool,

    /// 覆盖延迟任务时限（毫秒）
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// 覆盖 spool 文件路径
    #[arg(long, global = true)]
    spool: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 路由一条入站消息（JSON，文件或 stdin）
    Route {
        /// 消息 JSON 文件，缺省读 stdin
        file: Option<PathBuf>,
        /// 视为应用在前台
        #[arg(long)]
        foreground: bool,
    },
    /// 路由一次通知操作（平台原始 payload JSON）
    Action {
        file: Option<PathBuf>,
        #[arg(long)]
        foreground: bool,
    },
    /// 唤醒：执行 spool 中积压的延迟任务
    Wake,
    /// 为通知生成正文和操作的 pending intent
    Intent {
        /// 通知内容 JSON 文件，缺省读 stdin
        file: Option<PathBuf>,
        /// 操作 ID，可多次指定
        #[arg(long = "action", short)]
        actions: Vec<String>,
        /// 点击正文时使用的 intent action
        #[arg(long)]
        launch_action: Option<String>,
    },
    /// 打印生效的配置
    Config,
}

/// 把事件以 JSON 行打印到 stdout
struct StdoutSubscriber;

impl Subscriber for StdoutSubscriber {
    fn name(&self) -> &str {
        "stdout"
    }

    fn on_event(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_bridge(config: BridgeConfig, foreground: bool, launch_action: Option<String>) -> Bridge {
    let oracle: Arc<dyn AppStateOracle> = Arc::new(move || foreground);
    let mut builder = Bridge::builder(config).oracle(oracle);
    if let Some(action) = launch_action {
        builder = builder.launch_action(action);
    }
    let bridge = builder.build();
    bridge.emitter().subscribe(Arc::new(StdoutSubscriber));
    bridge
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("push_event_bridge={0},peb={0}", default_level))
    });

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = BridgeConfig::auto_load();
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_deferred_task_timeout_ms(timeout_ms);
    }
    if let Some(spool) = cli.spool {
        config = config.with_spool_path(spool);
    }
    debug!(?config, "Effective configuration");

    match cli.command {
        Commands::Route { file, foreground } => {
            let input = read_input(file.as_ref())?;
            let message: InboundMessage =
                serde_json::from_str(&input).context("Invalid inbound message JSON")?;
            let bridge = build_bridge(config, foreground, None);
            let outcome = bridge.router().route_message(&message)?;
            eprintln!("{}", serde_json::to_string(&outcome)?);
            bridge.shutdown();
        }
        Commands::Action { file, foreground } => {
            let input = read_input(file.as_ref())?;
            let raw: Payload =
                serde_json::from_str(&input).context("Action payload must be a JSON object")?;
            let bridge = build_bridge(config, foreground, None);
            let outcome = bridge.router().route_action(&raw)?;
            eprintln!("{}", serde_json::to_string(&outcome)?);
            bridge.shutdown();
        }
        Commands::Wake => {
            let bridge = build_bridge(config, false, None);
            let results = bridge.drain_spool().await?;
            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                warn!(failed, total = results.len(), "Some deferred tasks were not delivered");
            }
            bridge.shutdown();
        }
        Commands::Intent {
            file,
            actions,
            launch_action,
        } => {
            let input = read_input(file.as_ref())?;
            let content: NotificationContent =
                serde_json::from_str(&input).context("Invalid notification JSON")?;
            let bridge = build_bridge(config, false, launch_action);
            let action_ids: Vec<&str> = actions.iter().map(String::as_str).collect();
            let presentation = bridge.present(&content, &action_ids)?;
            print_json(&presentation)?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}
