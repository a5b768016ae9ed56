//! Reasoning extraction for models that think inline.
//!
//! DeepSeek-R1 and its distillations write their chain of thought into the
//! answer, wrapped in a tag such as `<think>...</think>`. [`ReasoningBackend`]
//! moves that text out: into [`GenerateResult::reasoning`] for single-shot
//! calls and into [`StreamPart::Reasoning`] frames for streams.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use super::traits::ModelBackend;
use crate::Result;
use crate::types::{CallParams, GenerateResult, StreamPart, StreamResponse};

/// Tag used by DeepSeek-R1 style models.
pub const DEFAULT_REASONING_TAG: &str = "think";

const DEFAULT_SEPARATOR: &str = "\n";

/// A [`ModelBackend`] that splits tagged reasoning out of another backend's
/// text.
///
/// Provider name and model id are forwarded. The qualified id carries the
/// tag, since the same upstream model answers differently with and without
/// extraction.
pub struct ReasoningBackend {
    inner: Arc<dyn ModelBackend>,
    tag: String,
    separator: String,
}

impl ReasoningBackend {
    /// Extract `<{tag}>...</{tag}>` sections.
    pub fn new(inner: Arc<dyn ModelBackend>, tag: impl Into<String>) -> Self {
        Self {
            inner,
            tag: tag.into(),
            separator: DEFAULT_SEPARATOR.to_owned(),
        }
    }

    /// Text placed between pieces that were separated by a tagged section
    /// (default `"\n"`).
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn inner(&self) -> &Arc<dyn ModelBackend> {
        &self.inner
    }

    fn opening(&self) -> String {
        format!("<{}>", self.tag)
    }

    fn closing(&self) -> String {
        format!("</{}>", self.tag)
    }

    /// Split `text` into `(reasoning, answer)`, or `None` when it holds no
    /// complete tagged section.
    fn split(&self, text: &str) -> Option<(String, String)> {
        let (opening, closing) = (self.opening(), self.closing());
        let mut reasoning = Vec::new();
        let mut outside = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find(&opening) {
            let body = &rest[start + opening.len()..];
            let Some(end) = body.find(&closing) else {
                break;
            };
            outside.push(&rest[..start]);
            reasoning.push(&body[..end]);
            rest = &body[end + closing.len()..];
        }
        if reasoning.is_empty() {
            return None;
        }
        outside.push(rest);

        let answer = outside
            .into_iter()
            .filter(|piece| !piece.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator);
        Some((reasoning.join(&self.separator), answer))
    }
}

#[async_trait]
impl ModelBackend for ReasoningBackend {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn qualified_id(&self) -> String {
        format!("{}#{}", self.inner.qualified_id(), self.tag)
    }

    async fn generate(&self, params: &CallParams) -> Result<GenerateResult> {
        let mut result = self.inner.generate(params).await?;
        if let Some((reasoning, answer)) = self.split(&result.text) {
            result.text = answer;
            result.reasoning = Some(match result.reasoning.take() {
                Some(existing) if !existing.is_empty() => {
                    format!("{existing}{}{reasoning}", self.separator)
                }
                _ => reasoning,
            });
        }
        Ok(result)
    }

    async fn stream(&self, params: &CallParams) -> Result<StreamResponse> {
        let StreamResponse {
            stream: live,
            raw_call,
        } = self.inner.stream(params).await?;
        let mut splitter = TagSplitter::new(self.opening(), self.closing(), &self.separator);

        // A trailing `None` marks the end so a held-back partial tag is flushed.
        let parts = live
            .map(Some)
            .chain(stream::once(async { None }))
            .flat_map(move |item| stream::iter(splitter.feed(item)));
        Ok(StreamResponse::new(Box::pin(parts), raw_call))
    }
}

/// Incremental splitter over text deltas.
///
/// A tag may arrive split across deltas, so a suffix that could still become
/// a tag is held back until the next delta decides it.
struct TagSplitter {
    opening: String,
    closing: String,
    separator: String,
    buffer: String,
    in_reasoning: bool,
    after_switch: bool,
    first_text: bool,
    first_reasoning: bool,
}

impl TagSplitter {
    fn new(opening: String, closing: String, separator: &str) -> Self {
        Self {
            opening,
            closing,
            separator: separator.to_owned(),
            buffer: String::new(),
            in_reasoning: false,
            after_switch: false,
            first_text: true,
            first_reasoning: true,
        }
    }

    fn feed(&mut self, item: Option<Result<StreamPart>>) -> Vec<Result<StreamPart>> {
        let mut out = Vec::new();
        match item {
            Some(Ok(StreamPart::TextDelta { delta })) => self.push(&delta, &mut out),
            Some(Ok(part @ StreamPart::Finish { .. })) => {
                self.flush(&mut out);
                out.push(part);
            }
            Some(Ok(part)) => out.push(part),
            Some(Err(e)) => return vec![Err(e)],
            None => self.flush(&mut out),
        }
        out.into_iter().map(Ok).collect()
    }

    fn push(&mut self, delta: &str, out: &mut Vec<StreamPart>) {
        self.buffer.push_str(delta);
        loop {
            let tag = if self.in_reasoning {
                &self.closing
            } else {
                &self.opening
            };
            let tag_len = tag.len();
            let Some((start, complete)) = tag_start(&self.buffer, tag) else {
                let text = std::mem::take(&mut self.buffer);
                self.emit(text, out);
                return;
            };

            let head = self.buffer[..start].to_owned();
            self.emit(head, out);
            if complete {
                self.buffer.drain(..start + tag_len);
                self.in_reasoning = !self.in_reasoning;
                self.after_switch = true;
            } else {
                self.buffer.drain(..start);
                return;
            }
        }
    }

    fn flush(&mut self, out: &mut Vec<StreamPart>) {
        let text = std::mem::take(&mut self.buffer);
        self.emit(text, out);
    }

    fn emit(&mut self, text: String, out: &mut Vec<StreamPart>) {
        if text.is_empty() {
            return;
        }
        let first = if self.in_reasoning {
            &mut self.first_reasoning
        } else {
            &mut self.first_text
        };
        let delta = if self.after_switch && !*first {
            format!("{}{text}", self.separator)
        } else {
            text
        };
        *first = false;
        self.after_switch = false;

        out.push(if self.in_reasoning {
            StreamPart::Reasoning { delta }
        } else {
            StreamPart::TextDelta { delta }
        });
    }
}

/// Where `tag` starts in `text`, and whether it is complete. A suffix of
/// `text` that is a prefix of `tag` counts as an incomplete start.
fn tag_start(text: &str, tag: &str) -> Option<(usize, bool)> {
    if let Some(index) = text.find(tag) {
        return Some((index, true));
    }
    text.char_indices()
        .map(|(i, _)| i)
        .find(|&i| tag.starts_with(&text[i..]))
        .map(|i| (i, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> TagSplitter {
        TagSplitter::new("<think>".into(), "</think>".into(), "\n")
    }

    fn run(deltas: &[&str]) -> Vec<StreamPart> {
        let mut splitter = splitter();
        let mut parts: Vec<StreamPart> = deltas
            .iter()
            .flat_map(|d| {
                splitter.feed(Some(Ok(StreamPart::TextDelta {
                    delta: (*d).to_owned(),
                })))
            })
            .map(|p| p.unwrap())
            .collect();
        parts.extend(splitter.feed(None).into_iter().map(|p| p.unwrap()));
        parts
    }

    #[test]
    fn tag_start_finds_complete_and_partial_tags() {
        assert_eq!(tag_start("ab<think>c", "<think>"), Some((2, true)));
        assert_eq!(tag_start("ab<thi", "<think>"), Some((2, false)));
        assert_eq!(tag_start("ab<", "<think>"), Some((2, false)));
        assert_eq!(tag_start("abc", "<think>"), None);
        assert_eq!(tag_start("", "<think>"), None);
    }

    #[test]
    fn tag_split_across_deltas() {
        let parts = run(&["<th", "ink>plan", "</thi", "nk>answer"]);
        assert_eq!(
            parts,
            vec![
                StreamPart::Reasoning {
                    delta: "plan".into()
                },
                StreamPart::TextDelta {
                    delta: "answer".into()
                },
            ]
        );
    }

    #[test]
    fn separator_only_between_pieces_of_the_same_kind() {
        let parts = run(&["a<think>x</think>b<think>y</think>c"]);
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                StreamPart::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        let reasoning: String = parts
            .iter()
            .filter_map(|p| match p {
                StreamPart::Reasoning { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "a\nb\nc");
        assert_eq!(reasoning, "x\ny");
    }

    #[test]
    fn unfinished_partial_tag_is_flushed_as_text() {
        let parts = run(&["less than <th"]);
        let text: String = parts
            .iter()
            .map(|p| match p {
                StreamPart::TextDelta { delta } => delta.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(text, "less than <th");
    }
}
