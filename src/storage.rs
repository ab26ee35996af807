//! Compression and multipart upload of captured dumps.
//!
//! The storage service sits behind the [`ObjectStore`] trait so the upload
//! logic (chunking, completion, abort-on-failure) can be exercised against
//! a fake without network access. Production uses [`S3Store`], which
//! resolves credentials ambiently — environment variables, the credential
//! file, or an instance role, in the SDK's own order.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use crate::errors::StoreError;

/// Receipt for one uploaded part, fed back into completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    pub part_number: i32,
    pub etag: String,
}

/// The slice of an object store the uploader needs.
///
/// 1-based part numbers, explicit completion, explicit abort — the shape
/// of a multipart upload protocol, with nothing SDK-specific in it. The
/// bucket is fixed at connect time.
#[async_trait]
pub trait ObjectStore {
    /// Start a multipart transaction for `key`, returning its upload id.
    async fn create_multipart(&self, key: &str) -> Result<String, StoreError>;

    /// Upload one part. `part_number` starts at 1.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<PartReceipt, StoreError>;

    /// Finalize the transaction. `parts` may be empty for a zero-byte
    /// object; the store decides whether that succeeds, but it must be a
    /// defined outcome either way.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<PartReceipt>,
    ) -> Result<(), StoreError>;

    /// Abandon the transaction so the bucket doesn't accumulate
    /// half-finished objects.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;

    /// A time-limited retrieval URL for an uploaded object.
    async fn presigned_get_url(&self, key: &str, expiry: Duration) -> Result<String, StoreError>;
}

/// An [`ObjectStore`] backed by S3-compatible storage via the AWS SDK.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Connect with ambient credentials and verify the bucket is reachable.
    ///
    /// Credential resolution is the SDK's concern, not ours. An
    /// unreachable service or bucket is a defined degraded outcome for the
    /// pipeline, reported as [`StoreError::Connect`].
    pub async fn connect(bucket: &str) -> Result<S3Store, StoreError> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&aws_config);
        client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        info!("connected to object storage, bucket {bucket}");
        Ok(S3Store {
            client,
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_multipart(&self, key: &str) -> Result<String, StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StoreError::Create(err.to_string()))?;
        created
            .upload_id()
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Create("no upload id returned".to_string()))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<PartReceipt, StoreError> {
        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| StoreError::Part {
                part: part_number,
                msg: err.to_string(),
            })?;
        Ok(PartReceipt {
            part_number,
            etag: uploaded.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<PartReceipt>,
    ) -> Result<(), StoreError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .into_iter()
                    .map(|part| {
                        CompletedPart::builder()
                            .part_number(part.part_number)
                            .e_tag(part.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| StoreError::Complete(err.to_string()))?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| StoreError::Abort(err.to_string()))?;
        Ok(())
    }

    async fn presigned_get_url(&self, key: &str, expiry: Duration) -> Result<String, StoreError> {
        let presigning =
            PresigningConfig::expires_in(expiry).map_err(|err| StoreError::Presign(err.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| StoreError::Presign(err.to_string()))?;
        Ok(request.uri().to_string())
    }
}

/// A dump ready for upload: the local file to read and its remote key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDump {
    pub path: PathBuf,
    pub key: String,
}

/// Gzip the dump if it is strictly larger than `threshold` bytes.
///
/// A file exactly at the threshold is left alone. The compressed sibling
/// sits next to the original with a `.gz` suffix, and the suffix carries
/// through to the remote key so downloads are honestly named.
pub fn prepare_dump(path: &Path, threshold: u64) -> Result<PreparedDump, StoreError> {
    let size = std::fs::metadata(path)?.len();
    let key = file_key(path)?;
    if size <= threshold {
        return Ok(PreparedDump {
            path: path.to_owned(),
            key,
        });
    }

    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);
    compress_file(path, &gz_path)?;
    let compressed = std::fs::metadata(&gz_path)?.len();
    info!("compressed {size} byte dump to {compressed} bytes");
    Ok(PreparedDump {
        path: gz_path,
        key: format!("{key}.gz"),
    })
}

fn file_key(path: &Path) -> Result<String, StoreError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("dump path has no usable file name: {}", path.display()),
            ))
        })
}

fn compress_file(src: &Path, dst: &Path) -> Result<(), StoreError> {
    let mut input = File::open(src)?;
    let output = File::create(dst)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Number of `chunk_size` parts needed for `size` bytes.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size)
}

/// Upload `dump` in `chunk_size` parts and return a presigned GET URL.
///
/// A zero-byte dump is a defined case: zero parts, then completion. Any
/// failure after the transaction starts aborts the multipart upload before
/// the error is returned.
pub async fn upload_dump(
    store: &dyn ObjectStore,
    dump: &PreparedDump,
    chunk_size: u64,
    expiry: Duration,
) -> Result<String, StoreError> {
    let size = std::fs::metadata(&dump.path)?.len();
    let count = chunk_count(size, chunk_size);
    let upload_id = store.create_multipart(&dump.key).await?;

    match upload_parts(store, dump, &upload_id, size, chunk_size, count).await {
        Ok(()) => {
            info!("uploading {} completed", dump.key);
            store.presigned_get_url(&dump.key, expiry).await
        }
        Err(err) => {
            warn!("aborting multipart upload of {}: {err}", dump.key);
            if let Err(abort_err) = store.abort_multipart(&dump.key, &upload_id).await {
                warn!("{} - abort failed as well: {abort_err}", abort_err.name());
            }
            Err(err)
        }
    }
}

async fn upload_parts(
    store: &dyn ObjectStore,
    dump: &PreparedDump,
    upload_id: &str,
    size: u64,
    chunk_size: u64,
    count: u64,
) -> Result<(), StoreError> {
    let mut file = File::open(&dump.path)?;
    let mut parts = Vec::with_capacity(count as usize);
    for index in 0..count {
        let offset = index * chunk_size;
        let len = chunk_size.min(size - offset) as usize;
        let mut data = vec![0u8; len];
        file.read_exact(&mut data)?;
        let part_number = (index + 1) as i32;
        let receipt = store
            .upload_part(&dump.key, upload_id, part_number, data)
            .await?;
        info!("uploaded part {part_number}/{count} of {}", dump.key);
        parts.push(receipt);
    }
    store.complete_multipart(&dump.key, upload_id, parts).await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory [`ObjectStore`] that records every call.
    #[derive(Default)]
    pub struct FakeStore {
        pub parts: Mutex<Vec<(i32, Vec<u8>)>>,
        pub completed: Mutex<Option<Vec<PartReceipt>>>,
        pub aborted: Mutex<bool>,
        /// Inject a failure into this part number.
        pub fail_part: Option<i32>,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn create_multipart(&self, _key: &str) -> Result<String, StoreError> {
            Ok("upload-1".to_string())
        }

        async fn upload_part(
            &self,
            _key: &str,
            _upload_id: &str,
            part_number: i32,
            data: Vec<u8>,
        ) -> Result<PartReceipt, StoreError> {
            if self.fail_part == Some(part_number) {
                return Err(StoreError::Part {
                    part: part_number,
                    msg: "injected failure".to_string(),
                });
            }
            self.parts.lock().unwrap().push((part_number, data));
            Ok(PartReceipt {
                part_number,
                etag: format!("etag-{part_number}"),
            })
        }

        async fn complete_multipart(
            &self,
            _key: &str,
            _upload_id: &str,
            parts: Vec<PartReceipt>,
        ) -> Result<(), StoreError> {
            *self.completed.lock().unwrap() = Some(parts);
            Ok(())
        }

        async fn abort_multipart(&self, _key: &str, _upload_id: &str) -> Result<(), StoreError> {
            *self.aborted.lock().unwrap() = true;
            Ok(())
        }

        async fn presigned_get_url(
            &self,
            key: &str,
            expiry: Duration,
        ) -> Result<String, StoreError> {
            Ok(format!(
                "https://storage.test/{key}?expires={}",
                expiry.as_secs()
            ))
        }
    }
}
