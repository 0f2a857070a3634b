//! `specedit stop`: cut a text stream at the first stop sequence.

use std::collections::VecDeque;

use specedit_core::stop::{StopBuffer, StopMatcher};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Copy `reader` to `writer` line by line until a stop sequence completes.
///
/// Returns the stop sequence that ended the copy, if any.
pub async fn copy_until_stop<R, W>(
    mut reader: R,
    mut writer: W,
    matcher: StopMatcher,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = StopBuffer::new(matcher);
    let mut ready = VecDeque::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            if let Some(rest) = buffer.finish() {
                writer.write_all(rest.as_bytes()).await?;
            }
            break;
        }
        buffer.push(&line, &mut ready);
        while let Some(fragment) = ready.pop_front() {
            writer.write_all(fragment.as_bytes()).await?;
        }
        if buffer.is_stopped() {
            break;
        }
    }
    writer.flush().await?;

    let stop = buffer.stop_match().map(str::to_string);
    if let Some(stop) = &stop {
        info!(stop = %stop, "stop sequence reached");
    }
    Ok(stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(input: &str, patterns: &[&str]) -> (String, Option<String>) {
        let mut out = Vec::new();
        let stop = copy_until_stop(input.as_bytes(), &mut out, StopMatcher::new(patterns))
            .await
            .unwrap();
        (String::from_utf8(out).unwrap(), stop)
    }

    #[tokio::test]
    async fn copies_everything_without_a_stop() {
        let (out, stop) = run("one\ntwo\nthree", &["END"]).await;
        assert_eq!(out, "one\ntwo\nthree");
        assert_eq!(stop, None);
    }

    #[tokio::test]
    async fn stops_mid_line() {
        let (out, stop) = run("keep this\nand this END but not this\nnor this\n", &["END"]).await;
        assert_eq!(out, "keep this\nand this ");
        assert_eq!(stop.as_deref(), Some("END"));
    }

    #[tokio::test]
    async fn stop_spanning_lines() {
        let (out, stop) = run("code\n```\nmore\n", &[r"r/\n```/"]).await;
        assert_eq!(out, "code");
        assert_eq!(stop.as_deref(), Some("\n```"));
    }

    #[tokio::test]
    async fn withheld_prefix_is_flushed_at_eof() {
        let (out, stop) = run("tail EN", &["END"]).await;
        assert_eq!(out, "tail EN");
        assert_eq!(stop, None);
    }
}
