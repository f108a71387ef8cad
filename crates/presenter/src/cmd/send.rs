use std::fs;
use std::time::{Duration, Instant};

use presenter_channel::{validate_channel_name, MediaKind, VideoFrame};
use presenter_frame::DEFAULT_MAX_FRAME;
use presenter_server::{AgentConfig, PresenterAgent};
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, server_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

const JPEG_MAGIC: [u8; 2] = [0xff, 0xd8];

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    validate_channel_name(&args.channel)
        .map_err(|err| CliError::new(USAGE, format!("--channel: {err}")))?;
    if args.count == 0 || args.fps == 0 {
        return Err(CliError::new(USAGE, "--count and --fps must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;

    let image = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;
    if !image.starts_with(&JPEG_MAGIC) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} is not a JPEG image", args.file.display()),
        ));
    }

    let config = AgentConfig {
        connect_timeout: Some(timeout),
        io_timeout: Some(timeout),
        max_frame_size: DEFAULT_MAX_FRAME,
    };
    let mut agent = PresenterAgent::connect(args.addr, &config)
        .map_err(|err| server_error("connect failed", err))?;

    let kind = MediaKind::from(args.content_type);
    agent
        .open_channel(&args.channel, kind)
        .map_err(|err| server_error("open failed", err))?;

    let frame = VideoFrame::new(image, args.width, args.height);
    let period = frame_period(args.fps);
    let mut summary = SendSummary {
        channel: args.channel.clone(),
        media_kind: kind,
        frames_sent: 0,
        bytes_sent: 0,
    };

    let mut next = Instant::now();
    for _ in 0..args.count {
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
        next += period;

        agent
            .present_image(&frame)
            .map_err(|err| server_error("present failed", err))?;
        summary.frames_sent += 1;
        summary.bytes_sent += frame.data.len() as u64;
        debug!(channel = %args.channel, sent = summary.frames_sent, "frame presented");
    }

    agent.close();
    print_send_summary(&summary, format);
    Ok(SUCCESS)
}

fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_period_follows_fps() {
        assert_eq!(frame_period(1), Duration::from_secs(1));
        assert_eq!(frame_period(25), Duration::from_millis(40));
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }
}
