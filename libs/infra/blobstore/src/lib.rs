// [libs/infra/blobstore/src/lib.rs]
pub mod errors;
pub mod safe_path;
pub mod store;

pub use errors::BlobError;
pub use safe_path::{Kind, SafePath};
pub use store::BlobStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn fresh_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_and_read_round_trips_bytes() {
        let (_dir, store) = fresh_store().await;
        store
            .save("build-1", Kind::Source, Cursor::new(b"hello world".to_vec()))
            .await
            .unwrap();

        assert!(store.exists("build-1", Kind::Source).await.unwrap());
        assert_eq!(store.size("build-1", Kind::Source).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn second_save_of_source_is_rejected() {
        let (_dir, store) = fresh_store().await;
        store
            .save("build-2", Kind::Source, Cursor::new(b"first".to_vec()))
            .await
            .unwrap();

        let second = store
            .save("build-2", Kind::Source, Cursor::new(b"second".to_vec()))
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn traversal_attempts_are_rejected_without_touching_disk() {
        let (_dir, store) = fresh_store().await;
        for hostile in [
            "..",
            "../etc",
            "a/../../b",
            "/etc/passwd",
            "a/b",
            "%2e%2e%2f",
            "..%2fetc",
            "a\0b",
        ] {
            let result = store
                .save(hostile, Kind::Source, Cursor::new(b"x".to_vec()))
                .await;
            assert!(result.is_err(), "expected {hostile:?} to be rejected");
        }
    }

    #[tokio::test]
    async fn copy_duplicates_an_artifact_for_a_retry() {
        let (_dir, store) = fresh_store().await;
        store
            .save("build-3", Kind::Source, Cursor::new(b"payload".to_vec()))
            .await
            .unwrap();

        store.copy("build-3", "build-4", Kind::Source).await.unwrap();
        assert!(store.exists("build-4", Kind::Source).await.unwrap());
    }

    #[tokio::test]
    async fn delete_build_removes_the_whole_directory() {
        let (_dir, store) = fresh_store().await;
        store
            .save("build-5", Kind::Source, Cursor::new(b"x".to_vec()))
            .await
            .unwrap();
        store
            .save("build-5", Kind::Certs, Cursor::new(b"y".to_vec()))
            .await
            .unwrap();

        store.delete_build("build-5").await.unwrap();
        assert!(!store.exists("build-5", Kind::Source).await.unwrap());
        assert!(!store.exists("build-5", Kind::Certs).await.unwrap());
    }
}

#[cfg(test)]
mod path_safety_properties {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};

    /// Strings built from a charset weighted toward the characters that
    /// actually matter for traversal: separators, dots, percent signs, NUL,
    /// plus a spread of ordinary printable characters.
    fn hostile_build_id() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                3 => Just('.'),
                3 => Just('/'),
                2 => Just('\\'),
                2 => Just('%'),
                1 => Just('\0'),
                6 => any::<char>().prop_filter("printable", |c| !c.is_control()),
            ],
            0..24,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    fn files_under(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Whatever a hostile build id does to `save`, nothing it produces
        /// ever lands outside the store's root. Checked by walking the
        /// whole tree after the call and verifying every file's canonical
        /// path is still contained — the same property the curated test
        /// above checks for a fixed input set, here swept over arbitrary
        /// ones.
        #[test]
        fn hostile_build_ids_never_create_files_outside_root(raw in hostile_build_id()) {
            let dir = tempfile::tempdir().unwrap();
            let canonical_root = dir.path().canonicalize().unwrap();
            let rt = tokio::runtime::Runtime::new().unwrap();

            rt.block_on(async {
                let store = BlobStore::new(dir.path()).await.unwrap();
                let _ = store.save(&raw, Kind::Source, Cursor::new(b"x".to_vec())).await;
            });

            for path in files_under(dir.path()) {
                let canonical = path.canonicalize().unwrap();
                prop_assert!(canonical.starts_with(&canonical_root));
            }
        }
    }
}
