use seedline_core::{SessionId, TorrentSource};
use seedline_events::EngineEvent;
use serde_json::json;
use tracing::debug;

use crate::cli::{AddArgs, OutputFormat, RemoveArgs, TargetArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::{render_action, render_added, render_sessions, to_json};

pub(crate) async fn handle_list(ctx: &AppContext) -> CliResult<()> {
    ctx.engine.poll_once().await?;
    render_sessions(&ctx.engine.snapshot(), ctx.output)
}

pub(crate) async fn handle_add(ctx: &AppContext, args: AddArgs) -> CliResult<()> {
    let source = args.source.trim();
    if source.is_empty() {
        return Err(CliError::validation("source must not be empty"));
    }
    let source = TorrentSource::from_input(source);
    debug!(?source, "submitting torrent");

    let mut events = ctx.engine.subscribe(None);
    let add = ctx.engine.add(source);
    tokio::pin!(add);
    let outcome = loop {
        tokio::select! {
            result = &mut add => break result?,
            Some(envelope) = events.next() => {
                if let EngineEvent::AddProgress { message, .. } = envelope.event
                    && ctx.output == OutputFormat::Table
                {
                    eprintln!("{message}");
                }
            }
        }
    };

    render_added(&outcome.session_id, &outcome.receipt, ctx.output)
}

pub(crate) async fn handle_pause(ctx: &AppContext, args: TargetArgs) -> CliResult<()> {
    let id = resolve_target(ctx, &args.id).await?;
    ctx.engine.pause(&id).await?;
    render_action(&args.id, "pause", ctx.output)
}

pub(crate) async fn handle_resume(ctx: &AppContext, args: TargetArgs) -> CliResult<()> {
    let id = resolve_target(ctx, &args.id).await?;
    ctx.engine.resume(&id).await?;
    render_action(&args.id, "resume", ctx.output)
}

pub(crate) async fn handle_remove(ctx: &AppContext, args: RemoveArgs) -> CliResult<()> {
    let id = resolve_target(ctx, &args.id).await?;
    ctx.engine.remove(&id, args.delete_files).await?;
    let action = if args.delete_files {
        "remove with data"
    } else {
        "remove"
    };
    render_action(&args.id, action, ctx.output)
}

pub(crate) async fn handle_open_downloads(ctx: &AppContext) -> CliResult<()> {
    ctx.engine.open_downloads_folder().await?;
    match ctx.output {
        OutputFormat::Json => println!("{}", to_json(&json!({ "status": "accepted" }))?),
        OutputFormat::Table => println!("Download folder opened on the backend host"),
    }
    Ok(())
}

pub(crate) async fn handle_downloads_path(ctx: &AppContext) -> CliResult<()> {
    let path = ctx.engine.downloads_path().await?;
    match ctx.output {
        OutputFormat::Json => println!("{}", to_json(&json!({ "path": path }))?),
        OutputFormat::Table => println!("{path}"),
    }
    Ok(())
}

/// Commands address sessions by backend id, so the store is loaded first.
async fn resolve_target(ctx: &AppContext, raw: &str) -> CliResult<SessionId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CliError::validation("torrent id must not be empty"));
    }
    ctx.engine.poll_once().await?;
    Ok(SessionId::confirmed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use httpmock::prelude::*;
    use seedline_config::SyncConfig;
    use seedline_core::SessionState;
    use seedline_test_support::fixtures::SAMPLE_MAGNET;

    fn context_with(server: &MockServer, output: OutputFormat) -> Result<AppContext> {
        let mut config = SyncConfig::default();
        config.api.base_url = server.url("/api");
        AppContext::from_config(&config, output).map_err(|err| anyhow!(err.display_message()))
    }

    fn mock_list(server: &MockServer, body: serde_json::Value) {
        server.mock(|when, then| {
            when.method(GET).path("/api/torrent/list");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(body);
        });
    }

    fn check(result: CliResult<()>) -> Result<()> {
        result.map_err(|err| anyhow!(err.display_message()))
    }

    #[tokio::test]
    async fn list_loads_the_backend_snapshot() -> Result<()> {
        let server = MockServer::start_async().await;
        mock_list(
            &server,
            json!([
                {"id": "t1", "name": "ubuntu.iso", "progress": 0.5, "state": "downloading"},
                {"id": 7, "name": "debian.iso", "progress": 1.0, "state": "seeding"}
            ]),
        );
        let ctx = context_with(&server, OutputFormat::Json)?;

        check(handle_list(&ctx).await)?;
        let snapshot = ctx.engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, SessionId::confirmed("7"));
        Ok(())
    }

    #[tokio::test]
    async fn pause_posts_to_the_backend_and_shows_paused() -> Result<()> {
        let server = MockServer::start_async().await;
        mock_list(
            &server,
            json!([{"id": "t1", "name": "ubuntu.iso", "progress": 0.5, "state": "downloading"}]),
        );
        let pause = server.mock(|when, then| {
            when.method(POST).path("/api/torrent/pause/t1");
            then.status(200);
        });
        let ctx = context_with(&server, OutputFormat::Table)?;

        check(handle_pause(&ctx, TargetArgs { id: "t1".into() }).await)?;
        pause.assert();
        let session = ctx
            .engine
            .session(&SessionId::confirmed("t1"))
            .ok_or_else(|| anyhow!("session missing"))?;
        assert_eq!(session.state, SessionState::Paused);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_id_is_a_validation_error() -> Result<()> {
        let server = MockServer::start_async().await;
        mock_list(&server, json!([]));
        let ctx = context_with(&server, OutputFormat::Table)?;

        let Err(err) = handle_resume(&ctx, TargetArgs { id: "t9".into() }).await else {
            return Err(anyhow!("resume of an unknown id should fail"));
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "no torrent with id 't9'");
        Ok(())
    }

    #[tokio::test]
    async fn blank_id_never_reaches_the_backend() -> Result<()> {
        let server = MockServer::start_async().await;
        let list = server.mock(|when, then| {
            when.method(GET).path("/api/torrent/list");
            then.status(200).json_body(json!([]));
        });
        let ctx = context_with(&server, OutputFormat::Table)?;

        let Err(err) = handle_pause(&ctx, TargetArgs { id: "  ".into() }).await else {
            return Err(anyhow!("blank id should fail"));
        };
        assert_eq!(err.exit_code(), 2);
        list.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn remove_forwards_the_delete_flag_and_hides_the_session() -> Result<()> {
        let server = MockServer::start_async().await;
        mock_list(
            &server,
            json!([{"id": "t1", "name": "ubuntu.iso", "progress": 1.0, "state": "seeding"}]),
        );
        let remove = server.mock(|when, then| {
            when.method(DELETE)
                .path("/api/torrent/t1")
                .query_param("delete_files", "true");
            then.status(200);
        });
        let ctx = context_with(&server, OutputFormat::Json)?;

        check(
            handle_remove(
                &ctx,
                RemoveArgs {
                    id: "t1".into(),
                    delete_files: true,
                },
            )
            .await,
        )?;
        remove.assert();
        assert!(ctx.engine.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn add_submits_the_magnet() -> Result<()> {
        let server = MockServer::start_async().await;
        let add = server.mock(|when, then| {
            when.method(POST)
                .path("/api/torrent/add")
                .json_body(json!({ "magnet_link": SAMPLE_MAGNET }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "t1", "message": "Torrent added"}));
        });
        let ctx = context_with(&server, OutputFormat::Table)?;

        check(
            handle_add(
                &ctx,
                AddArgs {
                    source: format!("  {SAMPLE_MAGNET} "),
                },
            )
            .await,
        )?;
        add.assert();
        Ok(())
    }

    #[tokio::test]
    async fn backend_duplicate_exits_with_validation_code() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/torrent/add");
            then.status(409)
                .header("content-type", "application/json")
                .json_body(json!({"detail": "Torrent already exists"}));
        });
        let ctx = context_with(&server, OutputFormat::Table)?;

        let Err(err) = handle_add(
            &ctx,
            AddArgs {
                source: SAMPLE_MAGNET.into(),
            },
        )
        .await
        else {
            return Err(anyhow!("duplicate add should fail"));
        };
        assert_eq!(err.exit_code(), 2);
        assert!(ctx.engine.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_torrent_file_is_a_validation_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.torrent");
        let ctx = context_with(&server, OutputFormat::Table)?;

        let Err(err) = handle_add(
            &ctx,
            AddArgs {
                source: missing.display().to_string(),
            },
        )
        .await
        else {
            return Err(anyhow!("missing file should fail"));
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("missing.torrent"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_source_is_rejected_locally() -> Result<()> {
        let server = MockServer::start_async().await;
        let ctx = context_with(&server, OutputFormat::Table)?;
        let Err(err) = handle_add(&ctx, AddArgs { source: " ".into() }).await else {
            return Err(anyhow!("empty source should fail"));
        };
        assert_eq!(err.display_message(), "source must not be empty");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_operational_failure() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/downloads/path");
            then.status(503);
        });
        let ctx = context_with(&server, OutputFormat::Table)?;

        let Err(err) = handle_downloads_path(&ctx).await else {
            return Err(anyhow!("503 should fail"));
        };
        assert_eq!(err.exit_code(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn downloads_helpers_pass_through() -> Result<()> {
        let server = MockServer::start_async().await;
        let open = server.mock(|when, then| {
            when.method(POST).path("/api/downloads/open");
            then.status(200).json_body(json!({"status": "success"}));
        });
        let path = server.mock(|when, then| {
            when.method(GET).path("/api/downloads/path");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"path": "/srv/downloads"}));
        });
        let ctx = context_with(&server, OutputFormat::Json)?;

        check(handle_open_downloads(&ctx).await)?;
        check(handle_downloads_path(&ctx).await)?;
        open.assert();
        path.assert();
        Ok(())
    }
}
