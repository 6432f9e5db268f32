mod agent;
mod app;
mod event;
mod host;
mod payload;
mod session;
mod theme;
mod ui;

use agent::{AgentClient, AgentConfig};
use app::MantleApp;
use eframe::egui;
use host::ChannelBridge;
use std::sync::mpsc;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AgentConfig::from_env();
    let (tx, rx) = mpsc::channel();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("mantle-runtime")
        .build()?;

    let agent = runtime.block_on(async { AgentClient::new(config, tx.clone()) })?;
    agent.start();

    let bridge = Arc::new(ChannelBridge::new(tx.clone()));
    let app = MantleApp::new(rx, agent, bridge);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Mantle",
        native_options,
        Box::new(move |creation_context| {
            app.theme().apply_visuals(&creation_context.egui_ctx);
            Ok(Box::new(app))
        }),
    )?;

    Ok(())
}
