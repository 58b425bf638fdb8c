//! Integration tests for deflate-json: text schemas compiled with
//! deflate-schema, documents deflated and read back through `Peek`.

mod common;
mod documents;
mod entry;
