use anyhow::Result;
use clap::Parser;
use rustsiprec::app::AppBuilder;
use rustsiprec::config::{Cli, Config};
use rustsiprec::version;
use std::fs::File;
use tokio::select;
use tracing::{error, info, level_filters::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.conf {
        Some(ref conf) if std::path::Path::new(conf).exists() => Config::load(conf)?,
        _ => Config::default(),
    };

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    let _guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file)
            .map_err(|e| anyhow::anyhow!("failed to create log file {}: {}", log_file, e))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };

    info!("{}", version::version());

    let app = AppBuilder::new().config(config).build()?;

    if cli.check {
        return match app.check().await {
            Ok(()) => {
                info!("all rtpengines reachable");
                Ok(())
            }
            Err(e) => {
                error!("preflight failed: {}", e);
                Err(e)
            }
        };
    }

    info!("recorder starting");
    select! {
        result = app.run() => {
            if let Err(e) = result {
                error!("recorder stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down");
            app.stop();
        }
    }
    Ok(())
}
