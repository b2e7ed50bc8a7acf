use anyhow::{Context, Result};
use smartmeter_collector::{telemetry, Collector, Config, GatewayClient, InfluxSink};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init_tracing(&config)?;
    tracing::info!(
        gateway = %config.gateway.address,
        influx = %config.sink.url,
        database = %config.sink.database,
        retention_policy = %config.sink.retention_policy,
        measurement = %config.sink.measurement,
        "starting smartmeter collector"
    );

    let gateway = GatewayClient::new(config.gateway.clone(), config.gateway_timeout)
        .context("failed to build gateway client")?;
    let sink = InfluxSink::new(config.sink.clone()).context("failed to build influx client")?;
    if let Err(err) = sink.ping().await {
        tracing::warn!(error = %err, "influx not reachable at startup");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let collector = Collector::new(gateway, sink, config.interval);
    let result = collector.run(shutdown_rx).await;

    telemetry::shutdown_tracing();
    result.context("collector stopped on an unexpected failure")
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(err) => tracing::warn!(error = %err, "failed to install SIGTERM handler"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
