use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(&settings.telemetry().log_level)))
        .map_err(|err| anyhow::anyhow!("invalid LOG_LEVEL: {err}"))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let installed = if settings.telemetry().json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "Tracing initialised"
    );

    Ok(())
}

/// A bare level applies to this crate and the HTTP layer while keeping sqlx
/// query logs at warn. Full directive strings pass through untouched.
fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        return "testprep_rust=info,tower_http=info,sqlx=warn".to_string();
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("{level},testprep_rust={level},tower_http={level},sqlx=warn")
}
