//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use seedline_core::{AddReceipt, SessionId, TorrentSession};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Flattened session used for JSON output.
#[derive(Debug, Serialize)]
pub(crate) struct SessionRow<'a> {
    id: String,
    provisional: bool,
    name: &'a str,
    state: &'static str,
    progress: f64,
    download_rate: u64,
    upload_rate: u64,
    total_size: u64,
    downloaded_size: u64,
    peer_count: u32,
    eta_seconds: Option<u64>,
    last_error: Option<&'a str>,
}

impl<'a> From<&'a TorrentSession> for SessionRow<'a> {
    fn from(session: &'a TorrentSession) -> Self {
        Self {
            id: session.id.to_string(),
            provisional: session.id.is_provisional(),
            name: &session.name,
            state: session.state.as_str(),
            progress: session.progress,
            download_rate: session.download_rate,
            upload_rate: session.upload_rate,
            total_size: session.total_size,
            downloaded_size: session.downloaded_size,
            peer_count: session.peer_count,
            eta_seconds: session.eta_seconds,
            last_error: session.last_error.as_deref(),
        }
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn format_sessions(sessions: &[TorrentSession], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<SessionRow<'_>> = sessions.iter().map(SessionRow::from).collect();
            to_json(&rows)
        }
        OutputFormat::Table => {
            let mut text = format!(
                "{:<20} {:<17} {:>6} {:>12} {:>12} {:>5} {:>8}  NAME\n",
                "ID", "STATE", "PROG", "DOWN", "UP", "PEERS", "ETA"
            );
            for session in sessions {
                text.push_str(&format!(
                    "{:<20} {:<17} {:>6} {:>12} {:>12} {:>5} {:>8}  {}\n",
                    session.id.to_string(),
                    session.state.as_str(),
                    format_percent(session.progress),
                    format_rate(session.download_rate),
                    format_rate(session.upload_rate),
                    session.peer_count,
                    format_eta(session.eta_seconds),
                    session.name
                ));
                if let Some(error) = &session.last_error {
                    text.push_str(&format!("{:<20} error: {error}\n", ""));
                }
            }
            if sessions.is_empty() {
                text.push_str("(no torrents)\n");
            }
            Ok(text)
        }
    }
}

pub(crate) fn render_sessions(sessions: &[TorrentSession], format: OutputFormat) -> CliResult<()> {
    let text = format_sessions(sessions, format)?;
    print!("{text}");
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

#[derive(Serialize)]
struct AddedView<'a> {
    id: &'a str,
    tracking_id: String,
    name: Option<&'a str>,
    message: Option<&'a str>,
}

pub(crate) fn render_added(
    tracking_id: &SessionId,
    receipt: &AddReceipt,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let view = AddedView {
                id: &receipt.id,
                tracking_id: tracking_id.to_string(),
                name: receipt.name.as_deref(),
                message: receipt.message.as_deref(),
            };
            println!("{}", to_json(&view)?);
        }
        OutputFormat::Table => {
            let message = receipt.message.as_deref().unwrap_or("Torrent added");
            println!("{message} (id: {})", receipt.id);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ActionView<'a> {
    id: &'a str,
    action: &'a str,
    status: &'static str,
}

pub(crate) fn render_action(id: &str, action: &str, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let view = ActionView {
                id,
                action,
                status: "accepted",
            };
            println!("{}", to_json(&view)?);
        }
        OutputFormat::Table => println!("{action} requested (id: {id})"),
    }
    Ok(())
}

#[must_use]
pub(crate) fn format_percent(progress: f64) -> String {
    let percent = if progress.is_finite() {
        progress.clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    };
    format!("{percent:.1}%")
}

#[must_use]
pub(crate) fn format_rate(bytes_per_second: u64) -> String {
    if bytes_per_second == 0 {
        return "-".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_second))
}

#[must_use]
pub(crate) fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        None => "-".to_string(),
        Some(total) if total >= 3_600 => format!("{}h{:02}m", total / 3_600, (total % 3_600) / 60),
        Some(total) if total >= 60 => format!("{}m{:02}s", total / 60, total % 60),
        Some(total) => format!("{total}s"),
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedline_test_support::fixtures::{downloading, seeding};

    #[test]
    fn table_lists_each_session() -> anyhow::Result<()> {
        let mut failed = seeding("t2");
        failed.last_error = Some("tracker unreachable".into());
        let text = format_sessions(&[downloading("t1", 0.5), failed], OutputFormat::Table)
            .map_err(|err| anyhow!(err.display_message()))?;
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("downloading"));
        assert!(lines[1].contains("50.0%"));
        assert!(lines[1].contains("1.00 KiB/s"));
        assert!(lines[1].ends_with("t1.iso"));
        assert!(lines[2].contains("seeding"));
        assert!(lines[3].contains("error: tracker unreachable"));
        Ok(())
    }

    #[test]
    fn json_rows_flatten_ids() -> anyhow::Result<()> {
        let text = format_sessions(&[downloading("t1", 0.25)], OutputFormat::Json)
            .map_err(|err| anyhow!(err.display_message()))?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value[0]["id"], "t1");
        assert_eq!(value[0]["provisional"], false);
        assert_eq!(value[0]["state"], "downloading");
        Ok(())
    }

    #[test]
    fn empty_table_says_so() -> anyhow::Result<()> {
        let text = format_sessions(&[], OutputFormat::Table)
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(text.ends_with("(no torrents)\n"));
        Ok(())
    }

    #[test]
    fn humanised_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1_536), "1.50 KiB");
        assert_eq!(format_rate(0), "-");
        assert_eq!(format_eta(None), "-");
        assert_eq!(format_eta(Some(45)), "45s");
        assert_eq!(format_eta(Some(185)), "3m05s");
        assert_eq!(format_eta(Some(7_320)), "2h02m");
        assert_eq!(format_percent(f64::NAN), "0.0%");
    }
}
