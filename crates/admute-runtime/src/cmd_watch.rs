//! `admute watch`: live status and per-surface mute directives.

use std::time::Duration;

use admute_core::status::{StatusSnapshot, format_status_line};

use crate::client::rpc_subscribe;

const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Entry point for `admute watch`.
pub async fn cmd_watch(socket_path: &str) -> anyhow::Result<()> {
    loop {
        match rpc_subscribe(socket_path).await {
            Ok(mut sub) => loop {
                tokio::select! {
                    next = sub.next() => match next {
                        Ok(Some(notification)) => {
                            if let Some(line) = format_notification(&notification) {
                                println!("{line}");
                            }
                        }
                        Ok(None) => {
                            println!("daemon closed the stream");
                            break;
                        }
                        Err(e) => {
                            println!("stream error: {e}");
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                }
            },
            Err(e) => {
                println!("Cannot connect to daemon: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => { break; }
        }
    }

    Ok(())
}

/// One display line per notification; unknown methods are skipped.
pub(crate) fn format_notification(notification: &serde_json::Value) -> Option<String> {
    let params = notification.get("params")?;
    match notification["method"].as_str()? {
        "status" => {
            let status: StatusSnapshot = serde_json::from_value(params.clone()).ok()?;
            Some(format_status_line(&status))
        }
        "surface_mute" => {
            let surface = params["surface"].as_str()?;
            let verb = if params["muted"].as_bool()? {
                "mute"
            } else {
                "unmute"
            };
            Some(format!("{verb} surface {surface}"))
        }
        _ => None,
    }
}
