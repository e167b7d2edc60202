use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use chat_core::error::InfraResultExt;

use crate::config::ObjectStoreSettings;
use crate::domain::repository::FileUrlSigner;

/// 预签名最长有效期（S3 限制 7 天）
const MAX_PRESIGN_SECONDS: u64 = 7 * 24 * 3600;

/// S3 兼容存储（MinIO）的文件 URL 签名
#[derive(Clone)]
pub struct S3FileUrlSigner {
    client: S3Client,
    bucket: String,
    presign_ttl: Duration,
}

impl S3FileUrlSigner {
    pub async fn from_settings(settings: &ObjectStoreSettings) -> Result<Self> {
        let region = Region::new(settings.region.clone());
        let region_provider = RegionProviderChain::first_try(region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

        if let (Some(access_key), Some(secret_key)) =
            (settings.access_key.clone(), settings.secret_key.clone())
        {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "static-credentials");
            loader = loader.credentials_provider(credentials);
        }
        let aws_cfg = loader.load().await;

        let mut s3_builder = S3ConfigBuilder::from(&aws_cfg).region(region);
        if let Some(endpoint) = settings.endpoint.as_deref().map(normalize_endpoint) {
            s3_builder = s3_builder.endpoint_url(endpoint);
        }
        if settings.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = S3Client::from_conf(s3_builder.build());

        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
            presign_ttl: Duration::from_secs(settings.presign_ttl_seconds.clamp(1, MAX_PRESIGN_SECONDS)),
        })
    }
}

#[async_trait]
impl FileUrlSigner for S3FileUrlSigner {
    async fn presigned_url(&self, object_path: &str) -> Result<String> {
        let key = object_path.trim_start_matches('/');
        if key.is_empty() {
            return Err(anyhow!("empty object path"));
        }

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(
                PresigningConfig::expires_in(self.presign_ttl)
                    .map_err(|e| anyhow!("invalid presign config: {}", e))?,
            )
            .await
            .with_context(|| format!("failed to presign s3 get url, key={}", key))
            .into_dependency("object_store")?;

        let url = presigned.uri().to_string();
        tracing::debug!(key = %key, bucket = %self.bucket, "Presigned file url");
        Ok(url)
    }
}

/// 未带协议的端点按 http 处理
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_scheme_defaults_to_http() {
        assert_eq!(normalize_endpoint("minio:9000/"), "http://minio:9000");
        assert_eq!(normalize_endpoint("https://s3.example.com"), "https://s3.example.com");
    }

    #[tokio::test]
    async fn presigned_url_embeds_bucket_key_and_expiry() {
        let signer = S3FileUrlSigner::from_settings(&ObjectStoreSettings {
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            access_key: Some("minio".to_string()),
            secret_key: Some("minio-secret".to_string()),
            bucket: "chat-files".to_string(),
            region: "us-east-1".to_string(),
            force_path_style: true,
            presign_ttl_seconds: 3600,
        })
        .await
        .unwrap();

        let url = signer.presigned_url("uploads/a.png").await.unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/chat-files/uploads/a.png?"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(signer.presigned_url("").await.is_err());
    }
}
