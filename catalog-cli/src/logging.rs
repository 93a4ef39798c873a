use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

/// Логи идут в stderr, чтобы не смешиваться с выводом команд.
///
/// `RUST_LOG` перекрывает уровень целиком; иначе `LOG_LEVEL` относится только
/// к крейтам клиента, а сторонние (reqwest, hyper) пишут с `warn`.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

fn default_directives(level: &str) -> String {
    format!("warn,catalog_cli={level},catalog_client={level}")
}
