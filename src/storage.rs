//! # Storage Abstraction Module
//!
//! Unified interface for reading, writing and listing objects on the local
//! filesystem and on Amazon S3. Every tier of the pipeline (raw, structured,
//! curated) sits on one of these backends, chosen from the path prefix.
//!
//! ## Path Patterns
//!
//! - **S3 paths**: `s3://bucket-name/path/to/file.csv`
//! - **Local paths**: `/absolute/path/to/file.csv` or `relative/path/to/file.csv`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use forestcarbon::storage::{StorageFactory, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = StorageFactory::from_path("s3://tp-bronze/emission/data.csv").await?;
//!     let data = storage.read("s3://tp-bronze/emission/data.csv").await?;
//!     storage.write("s3://tp-silver/emission/copy.csv", &data).await?;
//!     Ok(())
//! }
//! ```

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS S3 GetObject error: {0}")]
    S3GetObject(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>),

    #[error("AWS S3 PutObject error: {0}")]
    S3PutObject(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>),

    #[error("AWS S3 HeadObject error: {0}")]
    S3HeadObject(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>),

    #[error("AWS S3 HeadBucket error: {0}")]
    S3HeadBucket(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::head_bucket::HeadBucketError>),

    #[error("AWS S3 ListObjectsV2 error: {0}")]
    S3ListObjects(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error>),

    #[error("AWS ByteStream error: {0}")]
    ByteStream(String),

    #[error("Invalid S3 path format: {0}")]
    InvalidS3Path(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid path format: {0}")]
    InvalidPath(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait defining the interface for storage backends
///
/// All operations are async so local and remote backends share one calling
/// convention.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the entire contents of a file
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Writes data to a file, replacing any previous content.
    ///
    /// The previous content stays visible until the new content is fully
    /// written.
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Checks if a file exists at the given path
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Lists the files directly or transitively under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Checks that the container behind `root` (a directory or a bucket) exists
    async fn container_exists(&self, root: &str) -> StorageResult<bool>;
}

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage;

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::PathNotFound(path.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let parent = match Path::new(path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        fs::create_dir_all(&parent).await.map_err(StorageError::Io)?;

        // Stage next to the target so the final rename stays on one filesystem
        let mut staged = tempfile::NamedTempFile::new_in(&parent).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                StorageError::PermissionDenied(path.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        staged.write_all(data)?;
        staged.flush()?;
        staged
            .persist(path)
            .map_err(|e| StorageError::Io(e.error))?;

        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![prefix.trim_end_matches('/').to_string()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::PathNotFound(dir));
                }
                Err(e) => return Err(StorageError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path().to_string_lossy().to_string();
                if entry.file_type().await?.is_dir() {
                    pending.push(entry_path);
                } else {
                    files.push(entry_path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn container_exists(&self, root: &str) -> StorageResult<bool> {
        match fs::metadata(root).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Amazon S3 storage backend
///
/// Credentials are loaded from the default AWS provider chain.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    /// Creates a new S3Storage instance with default AWS configuration
    ///
    /// This will load AWS credentials from:
    /// - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
    /// - AWS credentials file
    /// - IAM roles (when running on AWS infrastructure)
    pub async fn new() -> StorageResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = S3Client::new(&config);

        Ok(S3Storage { client })
    }

    /// Parses an S3 object path into bucket and key components
    ///
    /// # Errors
    /// Returns `StorageError::InvalidS3Path` if the path is not `s3://bucket/key`
    fn parse_s3_path(s3_path: &str) -> StorageResult<(String, String)> {
        let (bucket, key) = Self::split_s3_path(s3_path)?;
        if key.is_empty() {
            return Err(StorageError::InvalidS3Path(format!(
                "Invalid S3 path format. Expected 's3://bucket/key': {}",
                s3_path
            )));
        }
        Ok((bucket, key))
    }

    /// Splits an S3 path into bucket and a possibly empty key prefix
    fn split_s3_path(s3_path: &str) -> StorageResult<(String, String)> {
        let Some(path_without_scheme) = s3_path.strip_prefix("s3://") else {
            return Err(StorageError::InvalidS3Path(format!(
                "S3 path must start with 's3://': {}",
                s3_path
            )));
        };

        let (bucket, key) = match path_without_scheme.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (path_without_scheme, ""),
        };

        if bucket.is_empty() {
            return Err(StorageError::InvalidS3Path(format!(
                "Missing bucket name in S3 path: {}",
                s3_path
            )));
        }

        Ok((bucket.to_string(), key.to_string()))
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                aws_sdk_s3::error::SdkError::ServiceError(service_err)
                    if service_err.err().is_no_such_key() =>
                {
                    StorageError::PathNotFound(path.to_string())
                }
                _ => StorageError::S3GetObject(e),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ByteStream(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(StorageError::S3PutObject)?;

        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(aws_sdk_s3::error::SdkError::ServiceError(service_err))
                if service_err.err().is_not_found() =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::S3HeadObject(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let (bucket, key_prefix) = Self::split_s3_path(prefix)?;
        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&key_prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(StorageError::S3ListObjects)?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    files.push(format!("s3://{}/{}", bucket, key));
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        files.sort();
        Ok(files)
    }

    async fn container_exists(&self, root: &str) -> StorageResult<bool> {
        let (bucket, _) = Self::split_s3_path(root)?;

        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(aws_sdk_s3::error::SdkError::ServiceError(service_err))
                if service_err.err().is_not_found() =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::S3HeadBucket(e)),
        }
    }
}

/// Storage backend enumeration
#[derive(Debug)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

#[async_trait::async_trait]
impl StorageBackend for Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match self {
            Storage::Local(storage) => storage.read(path).await,
            Storage::S3(storage) => storage.read(path).await,
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.write(path, data).await,
            Storage::S3(storage) => storage.write(path, data).await,
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self {
            Storage::Local(storage) => storage.exists(path).await,
            Storage::S3(storage) => storage.exists(path).await,
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        match self {
            Storage::Local(storage) => storage.list(prefix).await,
            Storage::S3(storage) => storage.list(prefix).await,
        }
    }

    async fn container_exists(&self, root: &str) -> StorageResult<bool> {
        match self {
            Storage::Local(storage) => storage.container_exists(root).await,
            Storage::S3(storage) => storage.container_exists(root).await,
        }
    }
}

/// Factory for creating storage backends based on path patterns
///
/// - Paths starting with "s3://" use S3Storage
/// - All other paths use LocalStorage
pub struct StorageFactory;

impl StorageFactory {
    /// Creates a storage backend based on the path format
    pub async fn from_path(path: &str) -> StorageResult<Storage> {
        if Self::is_s3_path(path) {
            let s3_storage = S3Storage::new().await?;
            Ok(Storage::S3(s3_storage))
        } else if path.trim().is_empty() {
            Err(StorageError::InvalidPath("empty storage path".to_string()))
        } else {
            Ok(Storage::Local(LocalStorage))
        }
    }

    /// Determines if a path is an S3 path
    pub fn is_s3_path(path: &str) -> bool {
        path.starts_with("s3://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_write_read() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("nested").join("test_file.csv");
        let file_path_str = file_path.to_str().unwrap();

        let test_data = b"country_name,year\nBrazil,1990\n";

        storage.write(file_path_str, test_data).await?;

        let read_data = storage.read(file_path_str).await?;
        assert_eq!(read_data, test_data);
        assert!(storage.exists(file_path_str).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_local_storage_overwrite_replaces_content() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("table.parquet");
        let file_path_str = file_path.to_str().unwrap();

        storage.write(file_path_str, b"first version, longer").await?;
        storage.write(file_path_str, b"second").await?;

        assert_eq!(storage.read(file_path_str).await?, b"second");

        // No staging files are left behind
        let listed = storage.list(temp_dir.path().to_str().unwrap()).await?;
        assert_eq!(listed, vec![file_path_str.to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn test_local_storage_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;

        let result = storage.read("/nonexistent/path/file.csv").await;
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));

        assert!(!storage.exists("/nonexistent/path/file.csv").await?);

        let result = storage.list("/nonexistent/path").await;
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_local_storage_list_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        storage.write(root.join("forest_area/b.csv").to_str().unwrap(), b"b").await?;
        storage.write(root.join("forest_area/a.csv").to_str().unwrap(), b"a").await?;
        storage.write(root.join("emission/c.csv").to_str().unwrap(), b"c").await?;

        let listed = storage.list(root.to_str().unwrap()).await?;
        assert_eq!(
            listed,
            vec![
                root.join("emission/c.csv").to_string_lossy().to_string(),
                root.join("forest_area/a.csv").to_string_lossy().to_string(),
                root.join("forest_area/b.csv").to_string_lossy().to_string(),
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_local_container_exists() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("file.csv");
        storage.write(file_path.to_str().unwrap(), b"x").await?;

        assert!(storage.container_exists(temp_dir.path().to_str().unwrap()).await?);
        // A plain file is not a container
        assert!(!storage.container_exists(file_path.to_str().unwrap()).await?);
        assert!(!storage.container_exists("/nonexistent/container").await?);

        Ok(())
    }

    #[test]
    fn test_s3_path_parsing() {
        let (bucket, key) = S3Storage::parse_s3_path("s3://tp-bronze/emission/file.csv").unwrap();
        assert_eq!(bucket, "tp-bronze");
        assert_eq!(key, "emission/file.csv");

        let (bucket, key) = S3Storage::parse_s3_path("s3://bucket/file.csv").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "file.csv");

        assert!(S3Storage::parse_s3_path("http://bucket/file.csv").is_err());
        assert!(S3Storage::parse_s3_path("s3://").is_err());
        assert!(S3Storage::parse_s3_path("s3://bucket").is_err());
        assert!(S3Storage::parse_s3_path("s3:///file.csv").is_err());
    }

    #[test]
    fn test_s3_split_allows_bucket_only() {
        let (bucket, prefix) = S3Storage::split_s3_path("s3://tp-gold").unwrap();
        assert_eq!(bucket, "tp-gold");
        assert_eq!(prefix, "");

        let (bucket, prefix) = S3Storage::split_s3_path("s3://tp-gold/sweet_golden_data/").unwrap();
        assert_eq!(bucket, "tp-gold");
        assert_eq!(prefix, "sweet_golden_data/");

        assert!(S3Storage::split_s3_path("s3://").is_err());
    }

    #[tokio::test]
    async fn test_storage_factory_path_detection() -> Result<(), Box<dyn std::error::Error>> {
        assert!(StorageFactory::is_s3_path("s3://my-bucket/file.csv"));
        assert!(!StorageFactory::is_s3_path("/local/path/file.csv"));
        assert!(!StorageFactory::is_s3_path("relative/path/file.csv"));

        let local_storage = StorageFactory::from_path("/local/path/file.csv").await?;
        assert!(matches!(local_storage, Storage::Local(_)));

        let empty = StorageFactory::from_path("  ").await;
        assert!(matches!(empty, Err(StorageError::InvalidPath(_))));

        Ok(())
    }
}
