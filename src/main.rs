use std::env;
use std::sync::Arc;

use log::{error, info, warn};
use resmon::{
    health_score, AgentConfig, AgentError, ElasticsearchSink, HostSampler, MemorySink, Pipeline,
    Sampler, SinkBackend, SnapshotSink,
};

const DEFAULT_CONFIG_PATH: &str = "config/agent.yaml";

#[tokio::main]
async fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    if let Err(e) = run().await {
        error!("agent failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AgentError> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AgentConfig::load_or_default(&config_path)?;
    info!(
        "sampling every {}s into {:?} sink",
        config.interval_secs, config.sink.backend
    );

    let mut memory_sink: Option<Arc<MemorySink>> = None;
    let sink: Arc<dyn SnapshotSink> = match config.sink.backend {
        SinkBackend::Elasticsearch => Arc::new(ElasticsearchSink::new(
            &config.sink.host,
            config.sink.port,
            config.sink.username.as_deref(),
            config.sink.password.as_deref(),
            config.sink.index.clone(),
        )?),
        SinkBackend::Memory => {
            let sink = Arc::new(MemorySink::new());
            memory_sink = Some(Arc::clone(&sink));
            sink
        }
    };

    if !sink.health_check().await {
        warn!("sink is not reachable yet, stores will be retried per tick");
    }

    let sampler = HostSampler::new();
    if !sampler.health_check() {
        warn!("sampler cannot read cpu state yet, early ticks may record failures");
    }
    let mut pipeline = Pipeline::start(config.pipeline_settings(), sampler, Arc::clone(&sink))?;
    info!("pipeline started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("could not listen for shutdown signal: {}", e);
    }
    info!("shutting down");
    pipeline.stop().await?;

    let status = pipeline.status();
    match serde_json::to_string(&status) {
        Ok(rendered) => info!("final status: {}", rendered),
        Err(e) => warn!("could not render final status: {}", e),
    }

    if let Some(memory) = memory_sink {
        let snapshots = memory.snapshots().await;
        if let Some(report) = health_score(&snapshots) {
            info!(
                "session health {:.1} ({:?}) across {} samples",
                report.score, report.severity, report.samples
            );
        }
    }

    Ok(())
}
