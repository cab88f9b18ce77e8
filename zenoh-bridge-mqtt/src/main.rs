//! Zenoh bridge for MQTT-driven virtual devices.
//!
//! Without positional arguments every device section of the store is run;
//! with `<KIND> <SECTION>` only that device is.

use anyhow::{Context, Result, anyhow, bail};
use tracing::{error, info, warn};
use virtdev_bridge_framework::{
    BridgeArgs, BridgeConfig, BridgeRunner, resolve_logging, spawn_store_writer,
};
use virtdev_common::ConfigStore;
use zenoh_bridge_mqtt::config::MqttBridgeConfig;
use zenoh_bridge_mqtt::instance::InstanceContext;
use zenoh_bridge_mqtt::registry::{self, DeviceEntry};
use zenoh_bridge_mqtt::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let config = MqttBridgeConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let store_path = args
        .store
        .clone()
        .unwrap_or_else(|| config.store.path.clone());
    let store = ConfigStore::load(&store_path)
        .with_context(|| format!("Failed to load device store {:?}", store_path))?;

    let logging = resolve_logging(
        config.logging(),
        args.log_level.as_deref(),
        registry::store_log_level(&store),
    );
    let runner = BridgeRunner::new("zenoh-bridge-mqtt", config, &logging)
        .await
        .map_err(|e| anyhow!("Failed to start bridge: {}", e))?;

    info!("Loaded device store from {:?}", store_path);

    let single = args.single_instance().is_some();
    let entries = match select_entries(&args, &store) {
        Ok(entries) => entries,
        Err(e) => {
            runner.close().await;
            return Err(e);
        }
    };
    if entries.is_empty() {
        warn!("No device sections found in the store, nothing to do");
    }

    let (store_handle, writer_task) = spawn_store_writer(store, store_path);
    let supervisor = Supervisor::new(
        InstanceContext {
            session: runner.session().clone(),
            key_prefix: runner.config().key_prefix.clone(),
            store: store_handle.clone(),
            transport: runner.config().transport.clone(),
            shutdown: runner.shutdown_receiver(),
        },
        runner.config().supervisor.clone(),
    );

    let reports = runner.run_until_signal(supervisor.run(entries)).await;
    drop(supervisor);

    // Instances are down; write out whatever they persisted.
    if let Err(e) = store_handle.flush().await {
        error!("Failed to flush device store: {}", e);
    }
    drop(store_handle);
    if let Err(e) = writer_task.await {
        error!("Store writer task failed: {}", e);
    }

    runner.close().await;

    for report in reports.iter().filter(|r| r.outcome.is_fatal()) {
        warn!(section = %report.section, outcome = ?report.outcome, "Instance ended with an error");
    }
    if single {
        if let Some(report) = reports.iter().find(|r| r.outcome.is_fatal()) {
            bail!("Instance {} failed: {:?}", report.section, report.outcome);
        }
    }

    info!("MQTT bridge stopped");
    Ok(())
}

/// Entries to run: one for single-instance mode, otherwise every device
/// section that is well formed.
fn select_entries(args: &BridgeArgs, store: &ConfigStore) -> Result<Vec<DeviceEntry>> {
    if let Some((kind, section)) = args.single_instance() {
        let entry = registry::entry_for(store, kind, section)
            .with_context(|| format!("Cannot run {} {}", kind, section))?;
        return Ok(vec![entry]);
    }

    let mut entries = Vec::new();
    for result in registry::discover(store) {
        match result {
            Ok(entry) => entries.push(entry),
            Err(e) => error!("Skipping device: {}", e),
        }
    }
    info!("Discovered {} device(s)", entries.len());
    Ok(entries)
}
