//! Integration tests for stop detection over streamed model output.

use futures::stream::{self, StreamExt};
use specedit_core::stop::{
    classify, stream_stop, trim_last_stop, AsyncStopStream, StopMatch, StopMatcher, StopStream,
};

/// Split `text` into fragments of `size` characters.
fn fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

// ─── Literal stops ───────────────────────────────────────────────────────────

#[test]
fn output_ends_before_the_stop_for_any_fragmenting() {
    let text = "The answer is 42.</answer> trailing text";
    for size in 1..=text.len() {
        let mut stream = stream_stop(fragments(text, size), &["</answer>"]);
        let emitted: String = stream.by_ref().collect();
        assert_eq!(emitted, "The answer is 42.", "fragment size {size}");
        assert_eq!(stream.stop_match(), Some("</answer>"));
    }
}

#[test]
fn nothing_is_lost_without_a_stop() {
    let text = "partial </ans and more </answe";
    for size in [1, 2, 5, 100] {
        let emitted: String = stream_stop(fragments(text, size), &["</answer>"]).collect();
        assert_eq!(emitted, text, "fragment size {size}");
    }
}

#[test]
fn stop_starting_inside_a_repeated_opener_is_caught() {
    for (text, stop, kept) in [
        ("<</s> leaked", "</s>", "<"),
        ("aab tail", "ab", "a"),
        ("x <<<|end|> y", "<|end|>", "x <<"),
    ] {
        for size in 1..=text.len() {
            let mut stream = stream_stop(fragments(text, size), &[stop]);
            let emitted: String = stream.by_ref().collect();
            assert_eq!(emitted, kept, "{text:?} in fragments of {size}");
            assert_eq!(stream.stop_match(), Some(stop));
        }
    }
}

#[test]
fn earliest_completed_pattern_stops_the_stream() {
    let emitted: String = stream_stop(["alpha END beta STOP"], &["STOP", "END"]).collect();
    assert_eq!(emitted, "alpha ");
}

// ─── Regex stops ─────────────────────────────────────────────────────────────

#[test]
fn regex_stop_cuts_at_the_match() {
    let text = "id: 7 then code 123 and more";
    let mut stream = StopStream::new(
        fragments(text, 3).into_iter(),
        StopMatcher::new([r"r/\d{3}/"]),
    );
    let emitted: String = stream.by_ref().collect();
    assert_eq!(emitted, "id: 7 then code ");
    assert_eq!(stream.stop_match(), Some("123"));
}

#[test]
fn one_shot_helpers() {
    assert_eq!(classify("done</", &["</done>"]), StopMatch::Prefix);
    assert_eq!(classify("done", &["</done>"]), StopMatch::NotMatch);
    assert_eq!(classify("</do", &["</done>"]), StopMatch::Prefix);
    assert_eq!(
        classify("all </done>", &["</done>"]),
        StopMatch::Whole("</done>".to_string())
    );
    assert_eq!(trim_last_stop("value=12; rest", &[r"r/\d+;/"]), "value=");
    assert_eq!(trim_last_stop("nothing here", &["X"]), "nothing here");
}

#[test]
fn malformed_regex_never_stops() {
    let emitted: String = stream_stop(["a(b", "c"], &["r/(/"]).collect();
    assert_eq!(emitted, "a(bc");
}

// ─── Async ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn async_stream_matches_the_sync_stream() {
    let text = "line one\nline two\n```\nafter fence";
    let stops = ["```"];

    let sync: Vec<String> = stream_stop(fragments(text, 4), &stops).collect();
    let mut stream = AsyncStopStream::new(stream::iter(fragments(text, 4)), StopMatcher::new(stops));
    let mut async_fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        async_fragments.push(fragment);
    }

    assert_eq!(sync.concat(), "line one\nline two\n");
    assert_eq!(async_fragments.concat(), sync.concat());
    assert_eq!(stream.stop_match(), Some("```"));
}

#[tokio::test]
async fn async_stream_from_a_channel() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let producer = tokio::spawn(async move {
        for piece in ["hel", "lo <", "|end|", "> ignored"] {
            if tx.send(piece.to_string()).is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    let source = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|piece| (piece, rx)) });
    let stopped = AsyncStopStream::new(Box::pin(source), StopMatcher::new(["<|end|>"]));
    let emitted: String = stopped.collect::<Vec<_>>().await.concat();

    assert_eq!(emitted, "hello ");
    producer.await.unwrap();
}
