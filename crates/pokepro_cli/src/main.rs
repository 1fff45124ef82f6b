mod app;
mod logging;

use anyhow::Context;
use clap::Parser;
use pokepro_core::{PokeConfig, ResponseModule};
use pokepro_onebot::OneBotClient;
use std::path::PathBuf;
use tracing::info;

use crate::logging::LogFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "pokepro.toml", env = "POKEPRO_CONFIG")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "POKEPRO_LOG_FORMAT")]
    log_format: LogFormat,

    /// Load and validate the configuration, print a summary and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init(args.log_format);

    let config = PokeConfig::load_or_default(&args.config);
    if args.check {
        print_summary(&config);
        return Ok(());
    }

    let onebot = config
        .onebot
        .clone()
        .context("No [onebot] section configured; set ws_url there or ONEBOT_WS_URL")?;

    info!("Starting pokepro, OneBot at {}", onebot.ws_url);
    let (client, events) = OneBotClient::connect(&onebot)?;
    let app = app::App::new(config, args.config, client);
    app.run(events).await
}

fn print_summary(config: &PokeConfig) {
    println!("on_poke: {}", config.on_poke);
    println!("poke_cd: {}s", config.poke_cd);
    println!("follow_prob: {}", config.follow_prob);
    for module in ResponseModule::ALL {
        println!("weight.{}: {}", module, config.weight_of(module));
    }
    println!("meme_pool: {} file(s)", config.meme.pool.len());
    println!(
        "scheduler: {}",
        if config.scheduler.enabled {
            config.scheduler.cron.as_str()
        } else {
            "disabled"
        }
    );
    println!(
        "onebot: {}",
        config.onebot.as_ref().map_or("not configured", |o| o.ws_url.as_str())
    );
}
