mod config;

use notifylight_bridge::mock::{AuthorizationScript, RegistrationScript, ScriptedPlatform};
use notifylight_bridge::{token_prefix, BridgeConfig, NotificationBridge, PlatformError};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SimConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let sim = SimConfig::from_env()?;
    init_tracing(sim.json_logs);

    let bridge_config = BridgeConfig::from_env()?;
    tracing::info!("Starting NotifyLight host simulator: {:?}", sim);

    let registration = if sim.fail_registration {
        RegistrationScript::Fail(PlatformError::new("network", "simulated registration failure"))
    } else {
        RegistrationScript::IssueToken(sim.token.clone())
    };
    let authorization = if sim.deny_permission {
        AuthorizationScript::Deny
    } else {
        AuthorizationScript::Grant
    };
    let platform = Arc::new(ScriptedPlatform::new(registration, authorization));
    let bridge = NotificationBridge::start(platform.clone(), bridge_config);

    // Host listener: one JSON line per delivered event on stdout
    let mut events = bridge.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            let (name, payload) = envelope.event.to_host_payload();
            let line = json!({
                "sequence": envelope.sequence,
                "emittedAt": envelope.emitted_at,
                "event": name,
                "payload": payload,
            });
            println!("{}", line);
        }
    });

    let outcome = bridge
        .initialize_with_value(&json!({
            "showNotificationsWhenInForeground": sim.show_in_foreground
        }))
        .await?;
    tracing::info!("initialize -> {:?} {}", outcome, outcome.to_host_payload());

    match bridge.request_permissions().await {
        Ok(granted) => tracing::info!("requestPermissions -> {}", granted),
        Err(e) => tracing::warn!("requestPermissions rejected ({}): {}", e.code(), e),
    }

    report_token(&bridge).await;

    if let Some(refresh) = &sim.refresh_token {
        match platform.sink() {
            Some(sink) => {
                sink.token_refreshed(refresh.clone());
                report_token(&bridge).await;
            }
            None => tracing::warn!("No registration sink captured, skipping refresh"),
        }
    }

    let sink = bridge.platform_sink();
    sink.notification_received(
        json!({
            "title": "Welcome",
            "body": "Thanks for installing NotifyLight",
            "data": { "id": "sim-1", "type": "in-app" }
        }),
        true,
    );
    sink.notification_opened(json!({
        "title": "Welcome",
        "body": "Thanks for installing NotifyLight",
        "data": { "id": "sim-1" }
    }));

    let snapshot = bridge.snapshot().await?;
    tracing::info!("Session snapshot: {}", serde_json::to_string(&snapshot)?);

    bridge.shutdown().await;
    printer.await?;

    Ok(())
}

async fn report_token(bridge: &NotificationBridge) {
    match bridge.get_token().await {
        Ok(token) => tracing::info!("getToken -> {}", token_prefix(&token)),
        Err(e) => tracing::warn!("getToken rejected ({}): {}", e.code(), e),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,notifylight_bridge=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
