use crate::{Error, Result};
use rocksdb::{IteratorMode, Options, DB};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Datastore {
    db: DB,
    #[allow(dead_code)]
    path: PathBuf,
    // Kept alive so the backing directory of an in-memory store is not
    // removed while the database is open.
    #[allow(dead_code)]
    tempdir: Option<TempDir>,
}

impl Datastore {
    pub fn new(path: &Path) -> Result<Self> {
        let db = DB::open_default(path)?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
            tempdir: None,
        })
    }

    pub fn create_in_directory(path: &Path) -> Result<Self> {
        Self::new(path)
    }

    // "in-memory" database
    pub fn create_in_memory() -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_allow_mmap_reads(false);
        opts.set_compression_type(rocksdb::DBCompressionType::None);
        let tempdir = tempfile::tempdir()?;
        let path = PathBuf::from(tempdir.path());
        let db = DB::open(&opts, &path)?;
        Ok(Self {
            db,
            path,
            tempdir: Some(tempdir),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.db.get(key)? {
            Some(value) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key).await? {
            Some(data) => Ok(Some(String::from_utf8(data)?)),
            None => Ok(None),
        }
    }

    pub async fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        match self.get_string(key).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn iterator(
        &self,
        prefix: &str,
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + '_ {
        let mut readopts = rocksdb::ReadOptions::default();
        readopts.set_iterate_lower_bound(format!("{}/", prefix).as_bytes());
        readopts.set_iterate_upper_bound(format!("{}0", prefix).as_bytes());
        let iter = self.db.iterator_opt(IteratorMode::Start, readopts);
        iter.map(|result| result.map_err(|e| Error::Database(e.to_string())))
    }

    pub async fn count(&self, prefix: &str) -> Result<usize> {
        let mut count = 0;
        for result in self.iterator(prefix) {
            result?;
            count += 1;
        }
        Ok(count)
    }
}
