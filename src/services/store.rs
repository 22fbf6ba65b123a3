use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::get_config;
use crate::entities::file::FileType;
use crate::error::AppError;

/// Filesystem-backed object store. Uploads land under the configured root,
/// namespaced by content kind, one file per upload named by its id. Paths are
/// immutable once written.
#[derive(Clone)]
pub struct ObjectStore {
    root: PathBuf,
    mbtiles_root: PathBuf,
}

pub struct StoredObject {
    pub path: String,
    pub size: i64,
}

impl ObjectStore {
    pub fn new() -> Self {
        let config = get_config();
        Self {
            root: PathBuf::from(&config.upload_root),
            mbtiles_root: PathBuf::from(&config.mbtiles_root),
        }
    }

    pub async fn ensure_roots(&self) -> Result<(), AppError> {
        for kind in ["vector", "raster", "archive", "mbtiles"] {
            fs::create_dir_all(self.root.join("uploads").join(kind)).await?;
        }
        fs::create_dir_all(&self.mbtiles_root).await?;
        Ok(())
    }

    pub fn mbtiles_root(&self) -> &Path {
        &self.mbtiles_root
    }

    pub fn mbtiles_path(&self, basename: &str) -> PathBuf {
        self.mbtiles_root.join(format!("{}.mbtiles", basename))
    }

    fn namespace(kind: &FileType) -> &'static str {
        match kind {
            FileType::Vector => "vector",
            FileType::Raster => "raster",
            FileType::Archive => "archive",
            FileType::Mbtiles => "mbtiles",
        }
    }

    /// Writes the upload to its permanent location and fsyncs before
    /// returning. The file id makes the name unique by construction.
    pub async fn save(
        &self,
        file_id: i64,
        kind: &FileType,
        extension: &str,
        data: &[u8],
    ) -> Result<StoredObject, AppError> {
        let dir = self.root.join("uploads").join(Self::namespace(kind));
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.{}", file_id, extension));
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        let absolute = fs::canonicalize(&path).await?;

        Ok(StoredObject {
            path: absolute.to_string_lossy().into_owned(),
            size: data.len() as i64,
        })
    }

    /// Best-effort, idempotent delete. A missing file is success.
    pub async fn delete(&self, path: &str) -> Result<(), AppError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                eprintln!("ObjectStore | delete {} failed: {}", path, e);
                Ok(())
            }
        }
    }

    /// Copies an uploaded .mbtiles into the MBTiles root so Martin can serve
    /// it. Returns the source basename.
    pub async fn adopt_mbtiles(&self, file_id: i64, source_path: &str) -> Result<String, AppError> {
        let basename = format!("tiles_{}", file_id);
        let dest = self.mbtiles_path(&basename);
        fs::create_dir_all(&self.mbtiles_root).await?;
        fs::copy(source_path, &dest).await?;
        Ok(basename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(root: &Path) -> ObjectStore {
        ObjectStore {
            root: root.to_path_buf(),
            mbtiles_root: root.join("mbtiles"),
        }
    }

    #[tokio::test]
    async fn save_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());

        let saved = store
            .save(42, &FileType::Vector, "geojson", b"{\"type\":\"FeatureCollection\"}")
            .await
            .unwrap();
        assert_eq!(saved.size, 28);
        assert!(saved.path.ends_with("42.geojson"));
        assert!(std::path::Path::new(&saved.path).exists());

        store.delete(&saved.path).await.unwrap();
        assert!(!std::path::Path::new(&saved.path).exists());
        // Idempotent second delete
        store.delete(&saved.path).await.unwrap();
    }

    #[tokio::test]
    async fn adopt_mbtiles_copies_into_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());

        let src = dir.path().join("upload.mbtiles");
        std::fs::write(&src, b"sqlite").unwrap();

        let basename = store
            .adopt_mbtiles(7, src.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(basename, "tiles_7");
        assert!(store.mbtiles_path(&basename).exists());
    }
}
