use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use tracing::info;

use super::StorageError;
use crate::config::{StorageBackend, StorageSettings};

/// Build the object store selected by `settings`.
pub fn build_object_store(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match settings.backend {
        StorageBackend::Memory => {
            info!("using in-memory object store; artifacts are lost on restart");
            Ok(Arc::new(InMemory::new()))
        }
        StorageBackend::S3 => {
            let bucket = settings
                .bucket
                .as_deref()
                .ok_or_else(|| StorageError::Backend("STORAGE_BUCKET is not set".to_string()))?;

            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(endpoint) = &settings.endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"))
                    .with_virtual_hosted_style_request(false);
            }
            if let Some(region) = &settings.region {
                builder = builder.with_region(region);
            }
            if let (Some(key), Some(secret)) = (&settings.access_key, &settings.secret_key) {
                builder = builder.with_access_key_id(key).with_secret_access_key(secret);
            }

            let store = builder.build()?;
            info!(bucket, endpoint = ?settings.endpoint, "using S3-compatible object store");
            Ok(Arc::new(store))
        }
    }
}
