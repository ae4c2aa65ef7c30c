use settings::Settings;

use crate::server::ServerRunner;

mod adapter;
mod command;
mod core;
mod entity;
mod polling;
mod server;
mod settings;
mod switch;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");
    settings.monitoring.init().expect("Error initializing monitoring");
    settings.validate().expect("Invalid configuration");

    let mut runners: Vec<ServerRunner> = Vec::new();

    for server in &settings.servers {
        let runner = ServerRunner::new(server.to_config()).expect("Error initializing server runner");

        match runner.connect().await {
            Ok(()) => {
                for sensor in runner.sensor_entities() {
                    tracing::info!("Registered sensor {} [{}]", sensor.unique_id(), sensor.unit());
                }
                for action in runner.action_entities() {
                    tracing::info!("Registered action {}", action.unique_id());
                }
                tracing::info!("Registered switch {}", runner.switch_entity().unique_id());
            }
            Err(e) => {
                // polling keeps retrying; entities appear once discovery succeeds
                tracing::warn!("Setup of {} incomplete: {:?}", runner.alias(), e);
            }
        }

        runners.push(runner);
    }

    tokio::signal::ctrl_c().await.expect("Error waiting for shutdown signal");
    tracing::info!("Shutting down");

    futures::future::join_all(runners.into_iter().map(ServerRunner::shutdown)).await;
}
