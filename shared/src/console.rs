/// Console output reconstruction.
///
/// Download tools redraw their progress line with carriage returns and log
/// everything else one line at a time. `reconstruct` turns raw output chunks
/// into lines that will never change again plus the line still being drawn.
use tracing::trace;

/// Make `\r` and `\n` visible in trace output.
fn mask_control(s: &str) -> String {
    s.replace('\r', "<r>").replace('\n', "<n>")
}

/// Split one chunk of console output into committed lines and a new remainder.
///
/// `remainder` is the pending text returned by the previous call for the same
/// stream. A `\n` commits the pending text as a line. A `\r` throws the pending
/// text away because the producer is about to redraw that line. Anything after
/// the last control character becomes the new remainder; when the chunk has no
/// control character at all the carried-in remainder is kept in front of it.
pub fn reconstruct(remainder: &str, chunk: &str) -> (Vec<String>, String) {
    trace!(
        remainder = %mask_control(remainder),
        chunk = %mask_control(chunk),
        "reconstructing chunk"
    );

    let mut lines = Vec::new();
    let mut pending = remainder.to_string();
    let mut start = 0;

    for (i, byte) in chunk.bytes().enumerate() {
        match byte {
            b'\r' => {
                pending.clear();
                start = i + 1;
            }
            b'\n' => {
                pending.push_str(&chunk[start..i]);
                lines.push(std::mem::take(&mut pending));
                start = i + 1;
            }
            _ => {}
        }
    }

    // Control characters are ASCII, so `start` always sits on a char boundary.
    pending.push_str(&chunk[start..]);

    trace!(lines = lines.len(), remainder = %mask_control(&pending), "chunk reconstructed");
    (lines, pending)
}

/// Running transcript of one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
    remainder: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns how many lines it committed.
    pub fn push(&mut self, chunk: &str) -> usize {
        let (lines, remainder) = reconstruct(&self.remainder, chunk);
        let committed = lines.len();
        self.lines.extend(lines);
        self.remainder = remainder;
        committed
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.remainder.is_empty()
    }

    /// Each committed line followed by a newline, then the remainder.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.remainder);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(remainder: &str, chunk: &str) -> String {
        let (lines, rest) = reconstruct(remainder, chunk);
        let mut out = String::new();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out + &rest
    }

    #[test]
    fn test_empty_chunk() {
        assert_eq!(reconstruct("", ""), (Vec::<String>::new(), String::new()));
        assert_eq!(reconstruct("abc", ""), (Vec::<String>::new(), "abc".to_string()));
    }

    #[test]
    fn test_carriage_return_discards() {
        assert_eq!(reconstruct("", "\rabc"), (Vec::<String>::new(), "abc".to_string()));
        assert_eq!(reconstruct("", "\rabc\rdef"), (Vec::<String>::new(), "def".to_string()));
        assert_eq!(reconstruct("abc", "\rdef"), (Vec::<String>::new(), "def".to_string()));
        assert_eq!(reconstruct("abc", "\r\r\r"), (Vec::<String>::new(), String::new()));
    }

    #[test]
    fn test_newline_commits() {
        assert_eq!(
            reconstruct("abc", "\ndef"),
            (vec!["abc".to_string()], "def".to_string())
        );
        assert_eq!(
            reconstruct("abc", "\ndef\r\n"),
            (vec!["abc".to_string(), String::new()], String::new())
        );
    }

    #[test]
    fn test_joined_output() {
        assert_eq!(joined("", ""), "");
        assert_eq!(joined("", "\rabc"), "abc");
        assert_eq!(joined("", "\rabc\rdef"), "def");
        assert_eq!(joined("abc", "\rdef"), "def");
        assert_eq!(joined("abc", "\ndef"), "abc\ndef");
        assert_eq!(joined("abc", "\ndef\r\n"), "abc\n\n");
    }

    #[test]
    fn test_no_control_characters_accumulate() {
        assert_eq!(reconstruct("[download] ", "12.5%"), (Vec::<String>::new(), "[download] 12.5%".to_string()));
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let output = "[youtube] abc: Downloading webpage\n\
                      [download]   0.0% of 10MiB\r[download]  50.0% of 10MiB\r[download] 100% of 10MiB\n\
                      [Merger] Merging formats into \"clip.mp4\"\r\n\
                      trailing ünïcode";

        let mut whole = Transcript::new();
        whole.push(output);

        let mut by_char = Transcript::new();
        let mut buf = [0u8; 4];
        for c in output.chars() {
            by_char.push(c.encode_utf8(&mut buf));
        }

        assert_eq!(whole, by_char);
        assert_eq!(whole.lines().len(), 3);
        assert_eq!(whole.lines()[1], "[download] 100% of 10MiB");
        assert_eq!(whole.lines()[2], "");
        assert_eq!(whole.remainder(), "trailing ünïcode");
    }

    #[test]
    fn test_empty_chunk_is_idempotent() {
        let mut transcript = Transcript::new();
        transcript.push("one\ntwo");
        let before = transcript.clone();
        assert_eq!(transcript.push(""), 0);
        assert_eq!(transcript, before);
    }

    #[test]
    fn test_render() {
        let mut transcript = Transcript::new();
        assert!(transcript.is_empty());
        transcript.push("first\nsecond\n\rprogress 10%\rprogress 20%");
        assert_eq!(transcript.render(), "first\nsecond\nprogress 20%");
    }
}
