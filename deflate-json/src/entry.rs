//! Entry points for the transport layer.

use deflate_core::{Arena, ArenaConfig, Container, Offset, Schema, SchemaContext, Target, TypeId};
use serde_json::Value;

use crate::deserializer::DEFAULT_MAX_DEPTH;
use crate::{DeflateError, Deserializer, JsonPath, ViolationKind};

/// Preconditions and settings for one [`deflate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateOptions {
    /// Target the instance is written for.
    pub target: Target,
    /// Size of the root type the caller was built against.
    pub expected_size: u32,
    /// Schema hash the caller was built against.
    pub expected_schema_hash: u32,
    /// Nesting limit.
    pub max_depth: usize,
    /// Value added to every written pointer; derived from the target and
    /// destination when unset.
    pub pointer_base: Option<u64>,
}

impl DeflateOptions {
    /// Options for a caller built against a root of `expected_size` bytes
    /// and schema hash `expected_schema_hash`.
    pub const fn new(target: Target, expected_size: u32, expected_schema_hash: u32) -> Self {
        Self {
            target,
            expected_size,
            expected_schema_hash,
            max_depth: DEFAULT_MAX_DEPTH,
            pointer_base: None,
        }
    }

    /// Sets the nesting limit.
    pub const fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the pointer base, e.g. the guest address of the destination.
    pub const fn pointer_base(mut self, base: u64) -> Self {
        self.pointer_base = Some(base);
        self
    }
}

/// What a successful call wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateOutput {
    /// Offset of the root instance in the destination.
    pub root: Offset,
    /// End of the written region.
    pub end: usize,
}

/// Deserializes `json` as an instance of `root` into `data`.
pub fn process_document(
    data: &mut Arena<'_>,
    schema: Schema<'_>,
    ctx: &SchemaContext,
    target: Target,
    root: TypeId,
    json: &Value,
) -> Result<Offset, DeflateError> {
    Deserializer::new(schema, *ctx, target, data).deserialize_root(root, json)
}

/// The root type of the schema, after checking the caller's expectations.
fn checked_root(container: &Container<'_>, options: &DeflateOptions) -> Result<TypeId, DeflateError> {
    if container.metadata.schema_hash != options.expected_schema_hash {
        return Err(DeflateError::SchemaMismatch {
            what: "schema hash",
            expected: options.expected_schema_hash.into(),
            actual: container.metadata.schema_hash.into(),
        });
    }
    let schema = container.schema();
    let root = schema.root(container.context(options.target))?;
    let size = schema.ty(root)?.size;
    if size != options.expected_size {
        return Err(DeflateError::SchemaMismatch {
            what: "root size",
            expected: options.expected_size.into(),
            actual: size.into(),
        });
    }
    Ok(root)
}

/// The part of `doc` the schema root applies to.
fn document_slice<'v>(
    container: &Container<'_>,
    ctx: &SchemaContext,
    doc: &'v Value,
) -> Result<&'v Value, DeflateError> {
    let slice = container.schema().str(ctx.slice)?;
    if slice.is_empty() {
        return Ok(doc);
    }
    doc.pointer(slice).ok_or_else(|| {
        DeflateError::validation(ViolationKind::MissingSlice, &JsonPath::from_pointer(slice))
    })
}

fn run(
    container: &Container<'_>,
    root: TypeId,
    json: &[u8],
    data: &mut Arena<'_>,
    options: &DeflateOptions,
) -> Result<Offset, DeflateError> {
    let doc: Value = serde_json::from_slice(json)?;
    let ctx = container.context(options.target);
    let value = document_slice(container, ctx, &doc)?;
    let mut de = Deserializer::new(container.schema(), *ctx, options.target, data)
        .max_depth(options.max_depth);
    if let Some(base) = options.pointer_base {
        de = de.pointer_base(base);
    }
    de.deserialize_root(root, value)
}

/// Deserializes the JSON bytes `json` into `dest`, as the root type of the
/// container `schema`.
///
/// The schema hash and root size must match `options` exactly.
/// [`DeflateError::OutOfTargetMemory`] means `dest` was too small.
pub fn deflate(
    schema: &[u8],
    json: &[u8],
    dest: &mut [u8],
    options: &DeflateOptions,
) -> Result<DeflateOutput, DeflateError> {
    let container = Container::read(schema)?;
    let root = checked_root(&container, options)?;
    let mut data = Arena::borrowed(dest);
    let root = run(&container, root, json, &mut data, options)?;
    let end = data.used();
    debug!(%root, end, target = %options.target, "document deflated");
    Ok(DeflateOutput { root, end })
}

/// Like [`deflate`], into a fresh owned arena configured by `config`.
pub fn deflate_owned(
    schema: &[u8],
    json: &[u8],
    config: ArenaConfig,
    options: &DeflateOptions,
) -> Result<(Arena<'static>, DeflateOutput), DeflateError> {
    let container = Container::read(schema)?;
    let root = checked_root(&container, options)?;
    let mut data = Arena::owned(config)?;
    let root = run(&container, root, json, &mut data, options)?;
    let end = data.used();
    debug!(%root, end, target = %options.target, "document deflated into owned arena");
    Ok((data, DeflateOutput { root, end }))
}
