// [libs/infra/blobstore/src/store.rs]
/*!
 * =================================================================
 * APARATO: BLOB STORE
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: I/O DE ARTEFACTOS CON MEMORIA ACOTADA
 * =================================================================
 */

use crate::errors::BlobError;
use crate::safe_path::{Kind, SafePath};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join("builds")).await?;
        Ok(Self { root })
    }

    /// Streams `reader` into `<root>/builds/<build_id>/<kind>`, never
    /// buffering more than one chunk in memory. Source and certs are
    /// write-once: a second `save` for the same key fails rather than
    /// silently overwriting a submitter's artifact. Results may be
    /// overwritten, since a worker's own retry of its own upload is
    /// expected to replace the previous attempt.
    #[instrument(skip(self, reader))]
    pub async fn save(
        &self,
        build_id: &str,
        kind: Kind,
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<String, BlobError> {
        let safe = SafePath::new(&self.root, build_id, kind)?;
        let path = safe.as_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true);
        match kind {
            Kind::Result => {
                options.create(true);
            }
            Kind::Source | Kind::Certs => {
                options.create_new(true);
            }
        }

        let mut file = options.open(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                BlobError::InvalidPath(format!("{build_id}/{kind:?} already exists"))
            } else {
                BlobError::Io(e)
            }
        })?;

        tokio::io::copy_buf(&mut tokio::io::BufReader::with_capacity(CHUNK_SIZE, &mut reader), &mut file)
            .await?;

        info!(%build_id, kind = ?kind, "artifact saved");
        Ok(path.display().to_string())
    }

    /// Streams the artifact back out in bounded chunks, suitable for
    /// `axum::body::Body::from_stream`. Restartable: each call re-opens the
    /// file, so it holds no cursor state across requests.
    pub async fn read_stream(
        &self,
        build_id: &str,
        kind: Kind,
    ) -> Result<impl Stream<Item = io::Result<Bytes>>, BlobError> {
        let safe = SafePath::new(&self.root, build_id, kind)?;
        let file = fs::File::open(safe.as_path()).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BlobError::NotFound(safe.as_path().display().to_string())
            } else {
                BlobError::Io(e)
            }
        })?;
        Ok(ReaderStream::with_capacity(file, CHUNK_SIZE))
    }

    pub async fn exists(&self, build_id: &str, kind: Kind) -> Result<bool, BlobError> {
        let safe = SafePath::new(&self.root, build_id, kind)?;
        Ok(fs::metadata(safe.as_path()).await.is_ok())
    }

    pub async fn size(&self, build_id: &str, kind: Kind) -> Result<u64, BlobError> {
        let safe = SafePath::new(&self.root, build_id, kind)?;
        let meta = fs::metadata(safe.as_path()).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BlobError::NotFound(safe.as_path().display().to_string())
            } else {
                BlobError::Io(e)
            }
        })?;
        Ok(meta.len())
    }

    pub async fn delete(&self, build_id: &str, kind: Kind) -> Result<(), BlobError> {
        let safe = SafePath::new(&self.root, build_id, kind)?;
        match fs::remove_file(safe.as_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    /// Recursively removes `<root>/builds/<build_id>`.
    #[instrument(skip(self))]
    pub async fn delete_build(&self, build_id: &str) -> Result<(), BlobError> {
        let safe = SafePath::build_dir(&self.root, build_id)?;
        match fs::remove_dir_all(safe.as_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    /// Copies `<from_build_id>/<kind>` to `<to_build_id>/<kind>`, used by
    /// the retry flow to hand a fresh build its own copy of the original
    /// source/certs rather than sharing a file between two build rows.
    #[instrument(skip(self))]
    pub async fn copy(
        &self,
        from_build_id: &str,
        to_build_id: &str,
        kind: Kind,
    ) -> Result<(), BlobError> {
        let source = SafePath::new(&self.root, from_build_id, kind)?;
        let destination = SafePath::new(&self.root, to_build_id, kind)?;

        if let Some(parent) = destination.as_path().parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::copy(source.as_path(), destination.as_path())
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    BlobError::NotFound(source.as_path().display().to_string())
                } else {
                    BlobError::Io(e)
                }
            })?;
        Ok(())
    }
}
