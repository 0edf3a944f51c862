//! Interview Panel - mock-interview answers with live expression feedback.
//!
//! This is the main library crate. The record-answer panel and all of its
//! collaborators build without Tauri; the desktop shell and IPC commands are
//! added by the `desktop` feature.

pub mod answer;
pub mod capture;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod notify;
pub mod panel;
pub mod perception;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_panel_lib=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Initialize the application
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(e) = try_run() {
        tracing::error!("Interview Panel failed: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "desktop")]
fn try_run() -> anyhow::Result<()> {
    use answer::JsonAnswerStore;
    use capture::NokhwaMediaService;
    use commands::panel::{forward_panel_events, PanelState, TauriNotifier};
    use config::PanelConfig;
    use panel::{PanelServices, RecordAnswerPanel};
    use perception::SidecarModel;
    use std::sync::Arc;
    use tauri::Manager;

    init_tracing();

    tracing::info!("Starting Interview Panel v{}", env!("CARGO_PKG_VERSION"));

    let config = PanelConfig::from_env()?;

    let app = tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            commands::panel::initialize_panel,
            commands::panel::toggle_camera,
            commands::panel::set_answer_text,
            commands::panel::set_interview_context,
            commands::panel::save_answer,
            commands::panel::get_panel_snapshot,
            commands::panel::get_cameras,
            commands::panel::list_answers,
        ])
        .setup(move |app| {
            let handle = app.handle().clone();
            let answers = JsonAnswerStore::new(&config.answers_dir);

            let services = PanelServices {
                model: Arc::new(SidecarModel::new(config.detector.clone())),
                media: Arc::new(NokhwaMediaService::new()),
                notifier: Arc::new(TauriNotifier::new(handle.clone())),
                store: Arc::new(answers.clone()),
            };
            let panel = RecordAnswerPanel::new(config.clone(), services);

            forward_panel_events(handle, &panel);
            app.manage(PanelState { panel, answers });
            Ok(())
        })
        .build(tauri::generate_context!())?;

    app.run(|app, event| {
        if let tauri::RunEvent::Exit = event {
            if let Some(state) = app.try_state::<PanelState>() {
                state.panel.shutdown();
            }
        }
    });

    Ok(())
}
