//! Plain-text documents and replace steps.
//!
//! Positions count Unicode scalar values, so a position is always a valid
//! place to cut the text.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::mapping::{Assoc, ChangedRange, Mappable, StepMap};
use crate::step::{self, Document, Step, StepError};

/// An immutable text document. Serialized as a plain JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextDoc {
    text: String,
}

impl TextDoc {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The text between two positions.
    pub fn slice(&self, from: usize, to: usize) -> &str {
        &self.text[byte_offset(&self.text, from)..byte_offset(&self.text, to)]
    }
}

impl Document for TextDoc {
    fn size(&self) -> usize {
        self.text.chars().count()
    }
}

impl Display for TextDoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for TextDoc {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

fn byte_offset(text: &str, pos: usize) -> usize {
    text.char_indices()
        .nth(pos)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Replace the text between `from` and `to` with `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireStep", from = "WireStep")]
pub struct ReplaceStep {
    pub from: usize,
    pub to: usize,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "stepType")]
enum WireStep {
    #[serde(rename = "replace")]
    Replace {
        from: usize,
        to: usize,
        #[serde(default)]
        text: String,
    },
}

impl From<ReplaceStep> for WireStep {
    fn from(step: ReplaceStep) -> Self {
        WireStep::Replace {
            from: step.from,
            to: step.to,
            text: step.text,
        }
    }
}

impl From<WireStep> for ReplaceStep {
    fn from(wire: WireStep) -> Self {
        match wire {
            WireStep::Replace { from, to, text } => Self { from, to, text },
        }
    }
}

impl ReplaceStep {
    pub fn new(from: usize, to: usize, text: impl Into<String>) -> Self {
        Self {
            from,
            to,
            text: text.into(),
        }
    }

    pub fn insert(pos: usize, text: impl Into<String>) -> Self {
        Self::new(pos, pos, text)
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self::new(from, to, "")
    }

    fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl Step for ReplaceStep {
    type Doc = TextDoc;

    fn apply(&self, doc: &TextDoc) -> step::Result<TextDoc> {
        if self.from > self.to {
            return Err(StepError::InvalidRange {
                from: self.from,
                to: self.to,
            });
        }
        let size = doc.size();
        if self.to > size {
            return Err(StepError::OutOfBounds {
                from: self.from,
                to: self.to,
                size,
            });
        }

        let text = doc.as_str();
        let start = byte_offset(text, self.from);
        let end = byte_offset(text, self.to);
        let mut out = String::with_capacity(text.len() - (end - start) + self.text.len());
        out.push_str(&text[..start]);
        out.push_str(&self.text);
        out.push_str(&text[end..]);
        Ok(TextDoc::new(out))
    }

    fn invert(&self, doc: &TextDoc) -> Self {
        Self::new(
            self.from,
            self.from + self.text_len(),
            doc.slice(self.from, self.to),
        )
    }

    fn get_map(&self) -> StepMap {
        StepMap::new(vec![ChangedRange {
            start: self.from,
            old_size: self.to - self.from,
            new_size: self.text_len(),
        }])
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Self> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        if from.deleted && to.deleted {
            return None;
        }
        Some(Self::new(from.pos, from.pos.max(to.pos), self.text.clone()))
    }
}
