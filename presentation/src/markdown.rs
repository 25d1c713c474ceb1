//! Streaming Markdown block detector. Ported from
//! `original_source/gptsh/core/runner.py`'s `MarkdownBuffer`: buffers
//! streamed text and yields only complete blocks — a fenced code block
//! once its closing marker has arrived, plain text at a paragraph
//! boundary — so a renderer never has to repaint a partially printed
//! block. A fence, once opened, is never flushed before its closing
//! marker is seen, even if the latency guard would otherwise fire.

const DEFAULT_LATENCY_CHARS: usize = 1200;

pub struct MarkdownBuffer {
    buf: String,
    in_fence: bool,
    fence_marker: Option<&'static str>,
    latency_chars: usize,
}

impl MarkdownBuffer {
    pub fn new() -> Self {
        Self::with_latency_chars(DEFAULT_LATENCY_CHARS)
    }

    pub fn with_latency_chars(latency_chars: usize) -> Self {
        Self { buf: String::new(), in_fence: false, fence_marker: None, latency_chars }
    }

    fn fence_marker_of(line: &str) -> Option<&'static str> {
        let stripped = line.trim_start();
        if stripped.starts_with("```") {
            Some("```")
        } else if stripped.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        }
    }

    /// Push streamed text and return zero or more complete blocks, in
    /// arrival order, ready to render.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.buf.push_str(chunk);

        let mut cursor = 0usize;
        while cursor < self.buf.len() {
            if !self.in_fence {
                let para = self.buf[cursor..].find("\n\n").map(|i| cursor + i);
                let fence_a = self.buf[cursor..].find("```").map(|i| cursor + i);
                let fence_b = self.buf[cursor..].find("~~~").map(|i| cursor + i);
                let nearest_fence = [fence_a, fence_b].into_iter().flatten().min();

                if let Some(idx) = para {
                    let takes_paragraph = match nearest_fence {
                        None => true,
                        Some(fence_idx) => idx < fence_idx,
                    };
                    if takes_paragraph {
                        out.push(self.buf[..idx + 2].to_string());
                        self.buf.drain(..idx + 2);
                        cursor = 0;
                        continue;
                    }
                }

                let line_start = self.buf[..cursor].rfind('\n').map(|i| i + 1).unwrap_or(0);
                let Some(next_nl) = self.buf[cursor..].find('\n').map(|i| cursor + i) else {
                    break;
                };
                let line = &self.buf[line_start..=next_nl];
                if let Some(marker) = Self::fence_marker_of(line) {
                    let before = self.buf[..line_start].to_string();
                    if !before.trim().is_empty() {
                        out.push(before);
                    }
                    self.buf.drain(..line_start);
                    self.in_fence = true;
                    self.fence_marker = Some(marker);
                    cursor = 0;
                    continue;
                }
                break;
            }

            let marker = self.fence_marker.expect("in_fence implies a marker");
            if !(self.buf.starts_with(marker) || self.buf.contains(&format!("\n{marker}"))) {
                break;
            }

            let mut closed_through = None;
            let mut acc_len = 0usize;
            for (i, line) in split_keepends(&self.buf).enumerate() {
                acc_len += line.len();
                if i != 0 && line.trim_start().starts_with(marker) {
                    closed_through = Some(acc_len);
                    break;
                }
            }
            match closed_through {
                Some(len) => {
                    out.push(self.buf[..len].to_string());
                    self.buf.drain(..len);
                    self.in_fence = false;
                    self.fence_marker = None;
                    cursor = 0;
                }
                None => break,
            }
        }

        if !self.in_fence && self.buf.len() >= self.latency_chars && self.buf.ends_with('\n') {
            match self.buf.rfind("\n\n") {
                Some(idx) => {
                    out.push(self.buf[..idx + 2].to_string());
                    self.buf.drain(..idx + 2);
                }
                None => out.push(std::mem::take(&mut self.buf)),
            }
        }

        out
    }

    /// Flush whatever remains at end of stream. Returns `None` if the
    /// remainder is blank.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.trim().is_empty() {
            return None;
        }
        self.in_fence = false;
        self.fence_marker = None;
        Some(std::mem::take(&mut self.buf))
    }
}

impl Default for MarkdownBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_keepends(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find('\n') {
            Some(i) => {
                let (line, tail) = rest.split_at(i + 1);
                rest = tail;
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_plain_paragraph_on_blank_line() {
        let mut buf = MarkdownBuffer::new();
        let blocks = buf.push("first paragraph\n\nsecond");
        assert_eq!(blocks, vec!["first paragraph\n\n".to_string()]);
        assert_eq!(buf.flush(), Some("second".to_string()));
    }

    #[test]
    fn withholds_text_until_paragraph_boundary_arrives() {
        let mut buf = MarkdownBuffer::new();
        assert!(buf.push("partial line, no boundary yet").is_empty());
        let blocks = buf.push("\n\nnow flushed");
        assert_eq!(blocks, vec!["partial line, no boundary yet\n\n".to_string()]);
    }

    #[test]
    fn never_splits_an_open_fence() {
        let mut buf = MarkdownBuffer::new();
        let blocks = buf.push("before\n\n```rust\nfn x() {}\n\nstill inside\n");
        // The paragraph before the fence flushes; the fence itself,
        // still open, does not — even though it contains a blank line.
        assert_eq!(blocks, vec!["before\n\n".to_string()]);
        assert!(buf.push("more code\n").is_empty());
        let blocks = buf.push("```\n\nafter");
        assert_eq!(blocks, vec!["```rust\nfn x() {}\n\nstill inside\nmore code\n```\n".to_string()]);
    }

    #[test]
    fn tilde_fences_close_on_tilde_marker_only() {
        let mut buf = MarkdownBuffer::new();
        assert!(buf.push("~~~\ncode with ``` inside\n").is_empty());
        let blocks = buf.push("~~~\n");
        assert_eq!(blocks, vec!["~~~\ncode with ``` inside\n~~~\n".to_string()]);
    }

    #[test]
    fn latency_guard_flushes_long_unbounded_text() {
        let mut buf = MarkdownBuffer::with_latency_chars(20);
        let blocks = buf.push("this line has no paragraph boundary at all\n");
        assert_eq!(blocks, vec!["this line has no paragraph boundary at all\n".to_string()]);
    }

    #[test]
    fn latency_guard_never_fires_inside_an_open_fence() {
        let mut buf = MarkdownBuffer::with_latency_chars(10);
        let blocks = buf.push("```\nlong enough to trip the guard\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn flush_of_blank_remainder_is_none() {
        let mut buf = MarkdownBuffer::new();
        buf.push("   \n  ");
        assert_eq!(buf.flush(), None);
    }
}
