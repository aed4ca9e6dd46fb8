//! src/store/local.rs
//!
//! LocalStore: S3-like object store backed by SQLite for bucket/object/tag
//! rows and local disk for object payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Pre-signed links are
//! HMAC-SHA256 signatures served back by the `/objects` route.

use super::{
    ByteStream, ObjectHead, ObjectStore, ProgressSink, PresignedUrl, PutOptions, StoreError, StoreResult,
    StoredObject, UrlProtocol, percent_of,
};
use crate::models::{bucket::Bucket, metadata::MetadataTag, object::ObjectRecord};
use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use futures::StreamExt;
use hmac::{Hmac, Mac, digest::InvalidLength};
use md5::Context;
use sha2::Sha256;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Signs and verifies `/objects/{bucket}/{key}` download links.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Arc<Vec<u8>>,
    public_url: Url,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, public_url: Url) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            public_url,
        }
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> Result<HmacSha256, InvalidLength> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)?;
        mac.update(format!("GET\n{bucket}\n{key}\n{expires}").as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> StoreResult<String> {
        let mac = self
            .mac(bucket, key, expires)
            .map_err(|err| StoreError::Presign {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// True when `signature` matches and `expires` (unix seconds) is not past `now`.
    pub fn verify(&self, bucket: &str, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        let (Ok(raw), Ok(mac)) = (hex::decode(signature), self.mac(bucket, key, expires)) else {
            return false;
        };
        mac.verify_slice(&raw).is_ok()
    }

    fn link(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        protocol: UrlProtocol,
    ) -> StoreResult<String> {
        let mut url = self.public_url.clone();
        url.set_scheme(protocol.scheme())
            .map_err(|_| StoreError::Presign {
                key: key.to_string(),
                reason: format!("cannot use scheme {}", protocol.scheme()),
            })?;
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/objects/{bucket}/{key}"));
        url.query_pairs_mut()
            .clear()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.sign(bucket, key, expires)?);
        Ok(url.to_string())
    }
}

/// LocalStore provides the S3-like operations the file services need:
/// - Buckets: list and create (SQLite rows + a directory per bucket)
/// - Objects: streamed upload with tags, streamed download, prefix listing,
///   delete
/// - Pre-signed GET links verified by [`UrlSigner`]
#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    signer: UrlSigner,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
        }
    }

    /// Open (creating if needed) the SQLite database at `database_url` and the
    /// payload directory at `base_path`.
    pub async fn open(
        database_url: &str,
        base_path: impl Into<PathBuf>,
        signer: UrlSigner,
    ) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("created missing directory {:?}", parent);
            }
        }
        debug!("connecting to {}", database_url);

        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self::new(Arc::new(db), base_path, signer))
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<u64> {
        self.apply_script(SCHEMA).await
    }

    /// Run a multi-statement SQL script as-is; SQLite does the statement
    /// splitting, so comments and string literals may contain `;`.
    async fn apply_script(&self, script: &str) -> StoreResult<u64> {
        info!("applying schema script ({} bytes)", script.len());
        let result = sqlx::raw_sql(script).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }
        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/bucket/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::BucketNotFound(bucket.to_string()),
                other => StoreError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<ObjectRecord> {
        sqlx::query_as::<_, ObjectRecord>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    /// Object row plus tags; the payload is not touched.
    async fn lookup(&self, bucket: &str, key: &str) -> StoreResult<(String, ObjectHead)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;
        let tags = self.fetch_tags(object.id).await?;
        let head = ObjectHead {
            key: object.key,
            content_type: object.content_type,
            content_length: object.size_bytes.max(0) as u64,
            last_modified: object.last_modified,
            metadata: tags.into_iter().map(|t| (t.name, t.value)).collect(),
        };
        Ok((bucket_rec.name, head))
    }

    async fn fetch_tags(&self, object_id: Uuid) -> StoreResult<Vec<MetadataTag>> {
        Ok(sqlx::query_as::<_, MetadataTag>(
            "SELECT name, value FROM object_metadata WHERE object_id = ? ORDER BY name",
        )
        .bind(object_id)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Stream the body into a temp file next to its final location, reporting
    /// progress per chunk. Returns `(size, etag)`.
    async fn write_payload(
        &self,
        tmp_path: &Path,
        mut body: ByteStream,
        content_length: Option<u64>,
        progress: &dyn ProgressSink,
    ) -> StoreResult<(i64, String)> {
        let mut file = File::create(tmp_path).await?;
        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
            if let Some(total) = content_length {
                progress.report(percent_of(size_bytes, total).min(99));
            }
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok((size_bytes as i64, format!("{:x}", digest.compute())))
    }

    /// Upsert the object row and replace its tags in one transaction.
    async fn record_object(
        &self,
        bucket: &Bucket,
        key: &str,
        size_bytes: i64,
        etag: &str,
        options: &PutOptions,
    ) -> StoreResult<ObjectRecord> {
        let mut tx = self.db.begin().await?;

        let object = sqlx::query_as::<_, ObjectRecord>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket_id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket.id)
        .bind(key)
        .bind(&options.content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        for (name, value) in &options.metadata {
            sqlx::query("INSERT INTO object_metadata (object_id, name, value) VALUES (?, ?, ?)")
                .bind(object.id)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(object)
    }

    /// Recursively remove empty directories up to bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT name FROM buckets ORDER BY name")
                .fetch_all(&*self.db)
                .await?,
        )
    }

    async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(Utc::now())
            .execute(&*self.db)
            .await
        {
            Ok(_) => {
                info!(bucket = name, "created bucket");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Stream-upload an object to disk and record it.
    ///
    /// Writes to a temp file, renames it into place, then upserts the object
    /// row and its tags (S3-like overwrite semantics). The temp file is
    /// removed on any error.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        progress.report(0);
        let (size_bytes, etag) = match self
            .write_payload(&tmp_path, body, options.content_length, progress)
            .await
        {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = self
            .record_object(&bucket_rec, key, size_bytes, &etag, &options)
            .await
        {
            let _ = fs::remove_file(&file_path).await;
            return Err(err);
        }

        debug!(bucket, key, size_bytes, "stored object");
        progress.report(100);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        let (bucket_name, head) = self.lookup(bucket, key).await?;

        let file_path = self.object_path(&bucket_name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok(StoredObject {
            key: head.key,
            content_type: head.content_type,
            content_length: head.content_length,
            last_modified: head.last_modified,
            metadata: head.metadata,
            body: ReaderStream::new(file).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        Ok(self.lookup(bucket, key).await?.1)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        // substr() instead of LIKE so `_` and `%` in prefixes stay literal.
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT key FROM objects
             WHERE bucket_id = ? AND substr(key, 1, ?) = ?
             ORDER BY key ASC",
        )
        .bind(bucket_rec.id)
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Remove the object row (tags cascade) and its payload, pruning empty
    /// shard directories. A missing object answers `404 Not Found`.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<StatusCode> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = match self.fetch_object(&bucket_rec, key).await {
            Ok(object) => object,
            Err(StoreError::ObjectNotFound { .. }) => return Ok(StatusCode::NOT_FOUND),
            Err(err) => return Err(err),
        };

        sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(object.id)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(StatusCode::NO_CONTENT)
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        protocol: UrlProtocol,
    ) -> StoreResult<PresignedUrl> {
        self.ensure_key_safe(key)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).map_err(|err| StoreError::Presign {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        let url = self
            .signer
            .link(bucket, key, expires_at.timestamp(), protocol)?;

        Ok(PresignedUrl {
            url,
            key: key.to_string(),
            expires_at,
        })
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NoProgress;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    async fn store() -> (LocalStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_url = format!("sqlite://{}", dir.path().join("meta.db").display());
        let signer = UrlSigner::new(
            b"test-secret".to_vec(),
            Url::parse("https://files.example.com").unwrap(),
        );
        let store = LocalStore::open(&db_url, dir.path().join("objects"), signer)
            .await
            .unwrap();
        store.migrate().await.unwrap();
        (store, dir)
    }

    fn body(data: &'static [u8]) -> ByteStream {
        stream::once(async move { Ok(Bytes::from_static(data)) }).boxed()
    }

    async fn read_all(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn schema_applies_twice_and_tolerates_semicolons_in_comments() {
        let (store, _dir) = store().await;
        store.migrate().await.unwrap();

        store
            .apply_script(
                "-- scratch table; kept only for this check\n\
                 CREATE TABLE IF NOT EXISTS scratch (note TEXT NOT NULL); -- trailing; comment\n\
                 INSERT INTO scratch (note) VALUES ('a;b');",
            )
            .await
            .unwrap();
        let note: String = sqlx::query_scalar("SELECT note FROM scratch")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(note, "a;b");

        store.create_bucket("common-bucket").await.unwrap();
        assert_eq!(store.list_buckets().await.unwrap(), vec!["common-bucket"]);
    }

    #[tokio::test]
    async fn rejects_bad_bucket_names() {
        let signer = UrlSigner::new(Vec::new(), Url::parse("http://localhost").unwrap());
        let pool = SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        let store = LocalStore::new(Arc::new(pool), "/tmp/unused", signer);

        assert!(store.ensure_bucket_name_safe("common-bucket").is_ok());
        assert!(store.ensure_bucket_name_safe("ab").is_err());
        assert!(store.ensure_bucket_name_safe("Upper").is_err());
        assert!(store.ensure_bucket_name_safe("-dash").is_err());
        assert!(store.ensure_bucket_name_safe("a..b").is_err());
        assert!(store.ensure_bucket_name_safe("192.168.1.1").is_err());
    }

    #[test]
    fn signatures_bind_key_and_expiry() {
        let signer = UrlSigner::new(b"k".to_vec(), Url::parse("http://localhost:3000").unwrap());
        let sig = signer.sign("b", "o/g/f", 1_000).unwrap();
        assert!(signer.verify("b", "o/g/f", 1_000, &sig, 999));
        assert!(!signer.verify("b", "o/g/other", 1_000, &sig, 999));
        assert!(!signer.verify("b", "o/g/f", 1_001, &sig, 999));
        assert!(!signer.verify("b", "o/g/f", 1_000, &sig, 1_001));
        assert!(!signer.verify("b", "o/g/f", 1_000, "zz", 999));
    }

    #[tokio::test]
    async fn put_get_roundtrip_keeps_tags() {
        let (store, _dir) = store().await;
        store.create_bucket("common-bucket").await.unwrap();

        let options = PutOptions {
            content_type: "text/plain".into(),
            metadata: [("File-Name".to_string(), "YS50eHQ=".to_string())].into(),
            content_length: Some(5),
        };
        store
            .put_object("common-bucket", "o/g/f", body(b"hello"), options, &NoProgress)
            .await
            .unwrap();

        let object = store.get_object("common-bucket", "o/g/f").await.unwrap();
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(object.content_length, 5);
        assert_eq!(object.metadata["File-Name"], "YS50eHQ=");
        assert_eq!(read_all(object.body).await, b"hello");

        let head = store.head_object("common-bucket", "o/g/f").await.unwrap();
        assert_eq!(head.content_length, 5);
        assert_eq!(head.metadata["File-Name"], "YS50eHQ=");
        assert!(
            store
                .head_object("common-bucket", "o/g/missing")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn overwrite_replaces_payload_and_tags() {
        let (store, _dir) = store().await;
        store.create_bucket("common-bucket").await.unwrap();

        let put = |data: &'static [u8], name: &str| {
            let options = PutOptions {
                content_type: "text/plain".into(),
                metadata: [("Name".to_string(), name.to_string())].into(),
                content_length: None,
            };
            store.put_object("common-bucket", "k", body(data), options, &NoProgress)
        };
        put(b"one", "first").await.unwrap();
        put(b"second", "second").await.unwrap();

        let object = store.get_object("common-bucket", "k").await.unwrap();
        assert_eq!(object.metadata.len(), 1);
        assert_eq!(object.metadata["Name"], "second");
        assert_eq!(read_all(object.body).await, b"second");
    }

    #[tokio::test]
    async fn listing_is_scoped_to_prefix() {
        let (store, _dir) = store().await;
        store.create_bucket("common-bucket").await.unwrap();
        for key in ["o/g1/a", "o/g1/b", "o/g2/c", "x/g1/d"] {
            store
                .put_object(
                    "common-bucket",
                    key,
                    body(b"x"),
                    PutOptions::default(),
                    &NoProgress,
                )
                .await
                .unwrap();
        }

        let keys = store.list_keys("common-bucket", "o/g1/").await.unwrap();
        assert_eq!(keys, vec!["o/g1/a".to_string(), "o/g1/b".to_string()]);
        assert!(store.list_keys("common-bucket", "z/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (store, _dir) = store().await;
        store.create_bucket("common-bucket").await.unwrap();
        store
            .put_object(
                "common-bucket",
                "o/g/f",
                body(b"x"),
                PutOptions::default(),
                &NoProgress,
            )
            .await
            .unwrap();

        assert_eq!(
            store.delete_object("common-bucket", "o/g/f").await.unwrap(),
            StatusCode::NO_CONTENT
        );
        assert!(
            store
                .get_object("common-bucket", "o/g/f")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(
            store.delete_object("common-bucket", "o/g/f").await.unwrap(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn second_create_reports_existing_bucket() {
        let (store, _dir) = store().await;
        store.create_bucket("common-bucket").await.unwrap();
        assert!(matches!(
            store.create_bucket("common-bucket").await,
            Err(StoreError::BucketAlreadyExists(_))
        ));
        assert_eq!(
            store.list_buckets().await.unwrap(),
            vec!["common-bucket".to_string()]
        );
    }

    #[tokio::test]
    async fn presigned_link_points_at_objects_route() {
        let (store, _dir) = store().await;
        let link = store
            .presign_get(
                "common-bucket",
                "o/g/f",
                Duration::from_secs(60),
                UrlProtocol::Http,
            )
            .await
            .unwrap();

        let url = Url::parse(&link.url).unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), "/objects/common-bucket/o/g/f");
        let expires: i64 = url
            .query_pairs()
            .find(|(k, _)| k == "expires")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert_eq!(expires, link.expires_at.timestamp());
        let signature = url
            .query_pairs()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(store.signer().verify(
            "common-bucket",
            "o/g/f",
            expires,
            &signature,
            Utc::now().timestamp()
        ));
    }
}
