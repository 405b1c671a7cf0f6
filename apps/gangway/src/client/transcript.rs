use crate::client::input::BufferOp;

/// Append-only session history. Fragments are never reordered or truncated;
/// how much of it fits on screen is the renderer's concern.
#[derive(Debug, Default)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn append(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Characters typed but not yet transmitted, rendered as an overlay after
/// the transcript. Cleared on submission, on interrupt, and on teardown.
#[derive(Debug, Default)]
pub struct PendingInput {
    text: String,
}

impl PendingInput {
    pub fn apply(&mut self, op: BufferOp) {
        match op {
            BufferOp::Retain => {}
            BufferOp::Push(ch) => self.text.push(ch),
            BufferOp::Pop => {
                self.text.pop();
            }
            BufferOp::Clear => self.text.clear(),
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
