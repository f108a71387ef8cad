use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use presenter_channel::{ChannelRegistry, MediaKind};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One row of the periodic `serve` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub name: String,
    pub busy: bool,
    pub media_kind: Option<MediaKind>,
    pub fps: u32,
    pub frames: u64,
    pub dropped: u64,
}

/// Snapshot every registered channel without consuming any frame.
pub fn channel_reports(registry: &ChannelRegistry) -> Vec<ChannelReport> {
    registry
        .list_channels()
        .into_iter()
        .map(|info| {
            let runtime = registry.runtime_for_channel(&info.name);
            ChannelReport {
                busy: info.busy,
                media_kind: info.media_kind,
                fps: runtime.as_ref().map_or(0, |r| r.fps()),
                frames: runtime.as_ref().map_or(0, |r| r.generation()),
                dropped: runtime.as_ref().map_or(0, |r| r.dropped_frames()),
                name: info.name,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ChannelsOutput<'a> {
    channels: &'a [ChannelReport],
    timestamp: String,
}

pub fn print_channels(reports: &[ChannelReport], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ChannelsOutput {
                channels: reports,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "STATE", "KIND", "FPS", "FRAMES", "DROPPED"]);
            for report in reports {
                table.add_row(vec![
                    report.name.clone(),
                    busy_label(report.busy).to_string(),
                    kind_label(report.media_kind).to_string(),
                    report.fps.to_string(),
                    report.frames.to_string(),
                    report.dropped.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if reports.is_empty() {
                println!("no channels");
            }
            for report in reports {
                println!(
                    "channel={} state={} kind={} fps={} frames={} dropped={}",
                    report.name,
                    busy_label(report.busy),
                    kind_label(report.media_kind),
                    report.fps,
                    report.frames,
                    report.dropped
                );
            }
        }
    }
}

/// Result of a `send` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendSummary {
    pub channel: String,
    pub media_kind: MediaKind,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "KIND", "FRAMES", "BYTES"])
                .add_row(vec![
                    summary.channel.clone(),
                    summary.media_kind.to_string(),
                    summary.frames_sent.to_string(),
                    summary.bytes_sent.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} kind={} frames={} bytes={}",
                summary.channel, summary.media_kind, summary.frames_sent, summary.bytes_sent
            );
        }
    }
}

fn busy_label(busy: bool) -> &'static str {
    if busy {
        "busy"
    } else {
        "idle"
    }
}

fn kind_label(kind: Option<MediaKind>) -> &'static str {
    kind.map_or("-", MediaKind::as_str)
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_cover_unbound_channels() {
        let registry = ChannelRegistry::new();
        registry.register("cam1").unwrap();

        let reports = channel_reports(&registry);
        assert_eq!(
            reports,
            vec![ChannelReport {
                name: "cam1".to_string(),
                busy: false,
                media_kind: None,
                fps: 0,
                frames: 0,
                dropped: 0,
            }]
        );
    }

    #[test]
    fn report_json_shape() {
        let report = ChannelReport {
            name: "cam1".to_string(),
            busy: true,
            media_kind: Some(MediaKind::Video),
            fps: 25,
            frames: 300,
            dropped: 2,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["media_kind"], "video");
        assert_eq!(value["fps"], 25);
    }
}
