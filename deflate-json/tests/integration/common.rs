use deflate_core::{Arena, Container, Reader, Target};
use deflate_json::DeflateOptions;
use deflate_schema::{CompileOptions, compile};
use serde_json::Value;

/// A compiled schema together with its serialized container.
pub struct Compiled {
    pub container: Container<'static>,
    pub blob: Vec<u8>,
}

impl Compiled {
    pub fn new(schema: Value) -> Self {
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        let blob = container.to_bytes().unwrap();
        Self { container, blob }
    }

    /// Options matching this schema exactly.
    pub fn options(&self, target: Target) -> DeflateOptions {
        let schema = self.container.schema();
        let root = schema.root(self.container.context(target)).unwrap();
        let size = schema.ty(root).unwrap().size;
        DeflateOptions::new(target, size, self.container.metadata.schema_hash)
    }

    pub fn reader<'a>(&'a self, target: Target, data: &'a Arena<'a>) -> Reader<'a> {
        Reader::new(
            self.container.schema(),
            *self.container.context(target),
            target,
            data,
        )
    }
}
