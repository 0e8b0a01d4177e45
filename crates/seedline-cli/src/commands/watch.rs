use std::future::Future;

use anyhow::anyhow;
use seedline_events::{Connectivity, EngineEvent};
use serde_json::json;
use tracing::debug;

use crate::cli::OutputFormat;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::{SessionRow, render_sessions};

/// Run the poll loop and re-render on every store change until `stop` resolves.
pub(crate) async fn handle_watch<F>(ctx: &AppContext, stop: F) -> CliResult<()>
where
    F: Future<Output = ()>,
{
    let mut events = ctx.engine.subscribe(None);
    ctx.engine.start();
    tokio::pin!(stop);

    let result = loop {
        tokio::select! {
            () = &mut stop => break Ok(()),
            next = events.next() => match next {
                Some(envelope) => {
                    if let Err(err) = render_event(ctx, &envelope.event) {
                        break Err(err);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    debug!("watch finished; stopping poll loop");
    ctx.engine.stop_polling().await;
    result
}

fn render_event(ctx: &AppContext, event: &EngineEvent) -> CliResult<()> {
    match event {
        EngineEvent::SnapshotChanged { revision, .. } => match ctx.output {
            OutputFormat::Table => {
                println!("-- revision {revision} --");
                render_sessions(&ctx.engine.snapshot(), OutputFormat::Table)?;
            }
            OutputFormat::Json => {
                let sessions = ctx.engine.snapshot();
                let rows: Vec<SessionRow<'_>> = sessions.iter().map(SessionRow::from).collect();
                let line = serde_json::to_string(&json!({ "revision": revision, "sessions": rows }))
                    .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
                println!("{line}");
            }
        },
        EngineEvent::ConnectivityChanged { connectivity } => match connectivity {
            Connectivity::Online => eprintln!("backend reachable again"),
            Connectivity::Reconnecting { detail, .. } => {
                eprintln!("backend unreachable, retrying: {detail}");
            }
        },
        EngineEvent::MutationRejected {
            session_id,
            operation,
            message,
            ..
        } => eprintln!("{operation} on {session_id} was reverted: {message}"),
        EngineEvent::AddProgress { .. } | EngineEvent::AddSettled { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use seedline_core::GatewayError;
    use seedline_runtime::EngineOptions;
    use seedline_test_support::fixtures::{downloading, seeding};
    use seedline_test_support::mocks::{GatewayOp, ScriptedGateway};

    fn context(gateway: &ScriptedGateway, output: OutputFormat) -> AppContext {
        AppContext::with_gateway(Arc::new(gateway.clone()), EngineOptions::default(), output)
    }

    #[tokio::test(start_paused = true)]
    async fn watch_polls_until_stopped() -> Result<()> {
        let gateway = ScriptedGateway::with_sessions(vec![downloading("t1", 0.4)]);
        let ctx = context(&gateway, OutputFormat::Json);

        handle_watch(&ctx, tokio::time::sleep(Duration::from_millis(3_500)))
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        assert!(gateway.count(GatewayOp::List) >= 3);
        assert!(!ctx.engine.is_polling());
        assert_eq!(ctx.engine.snapshot().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn watch_survives_a_failed_poll() -> Result<()> {
        let gateway = ScriptedGateway::with_sessions(vec![seeding("t1")]);
        gateway.push_list(Err(GatewayError::unavailable("list", "connection refused")));
        let ctx = context(&gateway, OutputFormat::Table);

        handle_watch(&ctx, tokio::time::sleep(Duration::from_secs(12)))
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        assert_eq!(ctx.engine.connectivity(), Connectivity::Online);
        assert_eq!(ctx.engine.snapshot().len(), 1);
        Ok(())
    }
}
