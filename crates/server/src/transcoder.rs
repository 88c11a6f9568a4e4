//! Streaming insight-tag transcoder
//!
//! Pure state machine: fragments in, fragments out, no I/O. Detects the
//! literal `<insight>` / `</insight>` markers anywhere across chunk
//! boundaries and replaces each 1:1 with the fixed wrapper markup. The raw
//! (untransformed) fragments are logged elsewhere; this machine only shapes
//! what the live UI sees.
//!
//! The one subtle requirement is chunk-invariance: an unmatched buffer tail
//! that could still grow into a marker must be retained, never flushed as
//! plain text. So on a failed search we keep the longest buffer suffix that
//! is a prefix of the marker currently being looked for.

use lantern_protocol::{
    INSIGHT_CLOSE_TAG, INSIGHT_OPEN_TAG, INSIGHT_WRAPPER_CLOSE, INSIGHT_WRAPPER_OPEN,
};

/// One transcoder instance lives for exactly one turn.
#[derive(Debug, Default)]
pub struct TagTranscoder {
    /// Unconsumed text awaiting a decision.
    buffer: String,
    in_tag: bool,
    /// Text accumulated since the current tag opened. Not consumed by the
    /// transform itself; exposed for observability.
    tag_content: String,
}

impl TagTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one input fragment, producing zero or more output fragments.
    pub fn process(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        let mut out = Vec::new();

        // Resolve the first fully visible marker, then re-scan the remainder;
        // tags may follow each other with no text in between.
        loop {
            if self.buffer.is_empty() {
                break;
            }
            let marker = if self.in_tag {
                INSIGHT_CLOSE_TAG
            } else {
                INSIGHT_OPEN_TAG
            };

            match self.buffer.find(marker) {
                Some(idx) => {
                    if idx > 0 {
                        let text: String = self.buffer.drain(..idx).collect();
                        if self.in_tag {
                            self.tag_content.push_str(&text);
                        }
                        out.push(text);
                    }
                    self.buffer.drain(..marker.len());
                    if self.in_tag {
                        out.push(INSIGHT_WRAPPER_CLOSE.to_string());
                        self.in_tag = false;
                    } else {
                        out.push(INSIGHT_WRAPPER_OPEN.to_string());
                        self.in_tag = true;
                        self.tag_content.clear();
                    }
                }
                None => {
                    let keep = partial_marker_suffix(&self.buffer, marker);
                    let flush = self.buffer.len() - keep;
                    if flush > 0 {
                        let text: String = self.buffer.drain(..flush).collect();
                        if self.in_tag {
                            self.tag_content.push_str(&text);
                        }
                        out.push(text);
                    }
                    break;
                }
            }
        }

        out
    }

    /// Flush trailing buffered text and force-close an unterminated tag.
    /// Consuming `self` makes the exactly-once contract structural.
    pub fn finalize(mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
        if self.in_tag {
            // An unterminated tag is not an error; close it silently so the
            // output markup stays well-formed even for a truncated stream.
            out.push(INSIGHT_WRAPPER_CLOSE.to_string());
        }
        out
    }

    /// Content accumulated inside the most recent insight span.
    pub fn captured_insight(&self) -> &str {
        &self.tag_content
    }

    pub fn in_tag(&self) -> bool {
        self.in_tag
    }
}

/// Length of the longest suffix of `buffer` that is a proper prefix of
/// `marker`. That suffix might still be completed by a future fragment, so it
/// must not be flushed as plain text. Markers are ASCII, so the returned
/// length is always a char boundary in `buffer`.
fn partial_marker_suffix(buffer: &str, marker: &str) -> usize {
    let max = buffer.len().min(marker.len() - 1);
    for len in (1..=max).rev() {
        if buffer.ends_with(&marker[..len]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `input` split into the given pieces, concatenating all outputs
    /// including `finalize()`.
    fn run_pieces(pieces: &[&str]) -> String {
        let mut transcoder = TagTranscoder::new();
        let mut out = String::new();
        for piece in pieces {
            for fragment in transcoder.process(piece) {
                out.push_str(&fragment);
            }
        }
        for fragment in transcoder.finalize() {
            out.push_str(&fragment);
        }
        out
    }

    fn run_whole(input: &str) -> String {
        run_pieces(&[input])
    }

    #[test]
    fn no_tag_passthrough() {
        assert_eq!(run_whole("plain text, nothing special"), "plain text, nothing special");
    }

    #[test]
    fn single_span_is_rewrapped() {
        let out = run_whole("before <insight>key point</insight> after");
        assert_eq!(
            out,
            format!(
                "before {INSIGHT_WRAPPER_OPEN}key point{INSIGHT_WRAPPER_CLOSE} after"
            )
        );
    }

    #[test]
    fn adjacent_spans_with_no_text_between() {
        let out = run_whole("<insight>a</insight><insight>b</insight>");
        assert_eq!(
            out,
            format!(
                "{INSIGHT_WRAPPER_OPEN}a{INSIGHT_WRAPPER_CLOSE}{INSIGHT_WRAPPER_OPEN}b{INSIGHT_WRAPPER_CLOSE}"
            )
        );
    }

    #[test]
    fn unterminated_tag_is_closed_at_finalize() {
        let mut transcoder = TagTranscoder::new();
        let mut out = Vec::new();
        out.extend(transcoder.process("abc<insight>def"));
        out.extend(transcoder.finalize());
        assert_eq!(
            out,
            vec![
                "abc".to_string(),
                INSIGHT_WRAPPER_OPEN.to_string(),
                "def".to_string(),
                INSIGHT_WRAPPER_CLOSE.to_string(),
            ]
        );
    }

    #[test]
    fn open_marker_inside_open_tag_is_ordinary_content() {
        let out = run_whole("<insight>a <insight> b</insight>");
        assert_eq!(
            out,
            format!("{INSIGHT_WRAPPER_OPEN}a <insight> b{INSIGHT_WRAPPER_CLOSE}")
        );
    }

    #[test]
    fn close_marker_without_open_is_ordinary_content() {
        assert_eq!(run_whole("a </insight> b"), "a </insight> b");
    }

    #[test]
    fn marker_split_mid_marker_is_still_recognized() {
        let out = run_pieces(&["before <ins", "ight>tip</insi", "ght> after"]);
        assert_eq!(
            out,
            format!("before {INSIGHT_WRAPPER_OPEN}tip{INSIGHT_WRAPPER_CLOSE} after")
        );
    }

    #[test]
    fn lone_angle_bracket_is_not_held_forever() {
        let mut transcoder = TagTranscoder::new();
        // "<" could start a marker, so it is retained...
        assert!(transcoder.process("a <").concat().ends_with("a "));
        // ...until the next byte rules the marker out.
        assert_eq!(transcoder.process("3").concat(), "<3");
    }

    #[test]
    fn empty_fragments_produce_no_output() {
        let mut transcoder = TagTranscoder::new();
        assert!(transcoder.process("").is_empty());
        assert!(transcoder.finalize().is_empty());
    }

    #[test]
    fn partial_marker_prefix_flushes_at_finalize() {
        let out = run_pieces(&["abc<insi"]);
        assert_eq!(out, "abc<insi");
    }

    #[test]
    fn captured_insight_accumulates_span_content() {
        let mut transcoder = TagTranscoder::new();
        transcoder.process("<insight>split ");
        transcoder.process("content");
        assert_eq!(transcoder.captured_insight(), "split content");
        assert!(transcoder.in_tag());
    }

    #[test]
    fn chunk_invariance_character_by_character() {
        let cases = [
            "no tags at all",
            "x<insight>y</insight>z",
            "<insight>only</insight>",
            "a<insight>b",
            "tail partial <insi",
            "in-tag partial <insight>abc</insi",
            "<insight>a</insight> mid <insight>b</insight>",
            "fake <ins tag and real <insight>one</insight>",
            "<<insight>><</insight>>",
            "unicode héllo <insight>emoji ✨ inside</insight> done",
        ];

        for input in cases {
            let whole = run_whole(input);
            let mut transcoder = TagTranscoder::new();
            let mut split_out = String::new();
            let mut buf = [0u8; 4];
            for ch in input.chars() {
                for fragment in transcoder.process(ch.encode_utf8(&mut buf)) {
                    split_out.push_str(&fragment);
                }
            }
            for fragment in transcoder.finalize() {
                split_out.push_str(&fragment);
            }
            assert_eq!(split_out, whole, "per-char split diverged for {input:?}");
        }
    }

    #[test]
    fn chunk_invariance_every_single_split_point() {
        let input = "a<insight>bb</insight>c<insight>d";
        let whole = run_whole(input);
        for split in 0..=input.len() {
            if !input.is_char_boundary(split) {
                continue;
            }
            let out = run_pieces(&[&input[..split], &input[split..]]);
            assert_eq!(out, whole, "split at byte {split} diverged");
        }
    }
}
