use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// One step from a JSON value to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

/// Location of a value inside the input document, printed slash-joined
/// (`/items/3/name`; the document itself is `/`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// The document root.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// The path of a JSON pointer such as `/data/items`.
    pub fn from_pointer(pointer: &str) -> Self {
        let segments = pointer
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| PathSegment::Key(s.replace("~1", "/").replace("~0", "~")))
            .collect();
        Self { segments }
    }

    pub(crate) fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The segments, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, "/{key}")?,
                PathSegment::Index(index) => write!(f, "/{index}")?,
            }
        }
        Ok(())
    }
}
