//! Framing must not depend on how the byte stream was chunked

use micro3d_communication::LineFramer;
use proptest::prelude::*;

fn frame_in_chunks(stream: &[u8], cuts: &[usize]) -> (Vec<String>, Vec<u8>) {
    let mut framer = LineFramer::new();
    let mut lines = Vec::new();
    let mut start = 0;
    for cut in cuts {
        let end = (*cut).clamp(start, stream.len());
        lines.extend(framer.push(&stream[start..end]));
        start = end;
    }
    lines.extend(framer.push(&stream[start..]));
    (lines, framer.pending().to_vec())
}

proptest! {
    #[test]
    fn chunking_never_changes_lines(
        lines in prop::collection::vec("[ -~]{0,24}", 0..12),
        tail in "[ -~]{0,8}",
        crlf in any::<bool>(),
        mut cuts in prop::collection::vec(0usize..400, 0..16),
    ) {
        let ending = if crlf { "\r\n" } else { "\n" };
        let mut text = String::new();
        for line in &lines {
            text.push_str(line);
            text.push_str(ending);
        }
        text.push_str(&tail);
        let stream = text.into_bytes();

        cuts.sort_unstable();
        let (whole, whole_pending) = frame_in_chunks(&stream, &[]);
        let (chunked, chunked_pending) = frame_in_chunks(&stream, &cuts);

        prop_assert_eq!(&whole, &chunked);
        prop_assert_eq!(whole_pending, chunked_pending);
        prop_assert_eq!(whole.len(), lines.len());
    }

    #[test]
    fn byte_at_a_time_matches_single_push(text in "[ -~\n]{0,200}") {
        let stream = text.as_bytes();
        let cuts: Vec<usize> = (1..stream.len()).collect();
        prop_assert_eq!(frame_in_chunks(stream, &[]), frame_in_chunks(stream, &cuts));
    }
}
