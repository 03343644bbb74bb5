//! Content hashing for cache keys and compiled-template identity.

use std::hash::Hasher;

use pyxm_syntax::Node;
use rapidhash::fast::RapidHasher;

use crate::error::CompileError;

/// Hashes bytes to 16 lowercase hex characters.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = RapidHasher::default();
    hasher.write(content);
    format!("{:016x}", hasher.finish())
}

/// Hash of the tree's canonical serialization.
///
/// Source positions are not part of the serialized form, so moving a
/// template around without changing its structure keeps the hash.
pub fn ast_hash(root: &Node) -> Result<String, CompileError> {
    let canonical = serde_json::to_vec(root)?;
    Ok(content_hash(&canonical))
}

/// Cache key for a template: `"{name}:{hash}"`.
///
/// The hash covers the source text and `settings`, a fingerprint of the
/// compile options, so one cache can serve differently configured callers.
pub fn cache_key(name: &str, source: &str, settings: u64) -> String {
    let mut hasher = RapidHasher::default();
    hasher.write(source.as_bytes());
    hasher.write_u64(settings);
    format!("{name}:{:016x}", hasher.finish())
}
