// [libs/infra/blobstore/src/safe_path.rs]
/*!
 * =================================================================
 * APARATO: SAFE PATH CONSTRUCTOR
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: GARANTIZAR QUE NINGÚN PATH ESCAPE LA RAÍZ DEL STORE
 *
 * Layout: <root>/builds/<build_id>/{source,certs,result}
 *
 * `SafePath` es el único constructor de rutas del store: ninguna otra
 * función de este crate acepta una `&str`/`PathBuf` suelta. El build_id
 * se trata como entrada hostil (viene de la URL) y nunca se concatena
 * directamente; se valida componente por componente y el resultado final
 * se verifica contra la raíz canonicalizada antes de tocar el disco.
 * =================================================================
 */

use crate::errors::BlobError;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Source,
    Certs,
    Result,
}

impl Kind {
    pub fn filename(self) -> &'static str {
        match self {
            Kind::Source => "source",
            Kind::Certs => "certs",
            Kind::Result => "result",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafePath {
    root: PathBuf,
    path: PathBuf,
}

impl SafePath {
    /// Builds the path for `<root>/builds/<build_id>/<kind>`. Rejects any
    /// `build_id` that is not a single, plain path component: no `..`,
    /// no embedded separators (`/`, `\`), no absolute prefix, no NUL byte.
    pub fn new(root: impl AsRef<Path>, build_id: &str, kind: Kind) -> Result<Self, BlobError> {
        let root = root.as_ref().to_path_buf();
        validate_component(build_id)?;

        let path = root.join("builds").join(build_id).join(kind.filename());
        ensure_contained(&root, &path)?;

        Ok(Self { root, path })
    }

    /// Builds the directory `<root>/builds/<build_id>` without a file kind,
    /// for recursive delete.
    pub fn build_dir(root: impl AsRef<Path>, build_id: &str) -> Result<Self, BlobError> {
        let root = root.as_ref().to_path_buf();
        validate_component(build_id)?;
        let path = root.join("builds").join(build_id);
        ensure_contained(&root, &path)?;
        Ok(Self { root, path })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A path component must be a single normal segment: rejects `..`, `.`,
/// root/prefix components, embedded separators, NUL bytes, and `%` (since
/// a percent-encoded traversal string like `%2e%2e%2f` parses as one
/// innocuous `Component::Normal` segment here — legitimate build ids are
/// UUIDs and never contain the character). This runs *before* any
/// filesystem canonicalization, so it also covers components that don't
/// exist yet (e.g. the destination of a `save`).
fn validate_component(raw: &str) -> Result<(), BlobError> {
    if raw.is_empty() || raw.contains('\0') || raw.contains('%') {
        return Err(BlobError::InvalidPath(raw.to_string()));
    }

    let candidate = Path::new(raw);
    let mut components = candidate.components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == raw => Ok(()),
        _ => Err(BlobError::InvalidPath(raw.to_string())),
    }
}

/// Canonicalizes the root (which must exist) and verifies the constructed
/// path's closest existing ancestor is still contained within it, using a
/// prefix check on the canonical forms rather than trusting string
/// concatenation. This is the last line of defense against any traversal
/// that `validate_component` didn't already reject outright.
fn ensure_contained(root: &Path, candidate: &Path) -> Result<(), BlobError> {
    let canonical_root = root
        .canonicalize()
        .map_err(|e| BlobError::InvalidPath(format!("root does not exist: {e}")))?;

    let mut probe = candidate.to_path_buf();
    let canonical_ancestor = loop {
        if let Ok(canon) = probe.canonicalize() {
            break canon;
        }
        if !probe.pop() {
            return Err(BlobError::InvalidPath(candidate.display().to_string()));
        }
    };

    if !canonical_ancestor.starts_with(&canonical_root) {
        return Err(BlobError::InvalidPath(candidate.display().to_string()));
    }

    Ok(())
}
