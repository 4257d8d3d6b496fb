// backupcron/src/uploader/s3.rs
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::config::http::HttpResponse;
use s3::error::{DisplayErrorContext, SdkError};
use s3::primitives::ByteStream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use super::{DIGEST_METADATA_KEY, RemoteLocation, Uploader, sha1_file};
use crate::config::S3Settings;
use crate::errors::{AppError, Result};

pub const S3_SCHEME: &str = "s3";

/// Uploader backed by an S3-compatible object store.
///
/// The SDK client is built on first use and reused for the lifetime of the
/// uploader.
pub struct S3Uploader {
    settings: S3Settings,
    client: OnceCell<s3::Client>,
}

impl S3Uploader {
    pub fn new(settings: S3Settings) -> Self {
        S3Uploader {
            settings,
            client: OnceCell::new(),
        }
    }

    /// Uploader around an already configured client.
    pub fn with_client(settings: S3Settings, client: s3::Client) -> Self {
        S3Uploader {
            settings,
            client: OnceCell::new_with(Some(client)),
        }
    }

    /// Builds an uploader from the credential variables, failing on empty values.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(S3Settings::from_env()?))
    }

    async fn client(&self) -> &s3::Client {
        self.client
            .get_or_init(|| async {
                log::debug!(
                    "Initialising S3 client (endpoint: {})",
                    self.settings.endpoint_url.as_deref().unwrap_or("default")
                );
                let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
                    .region(Region::new(self.settings.region.clone()))
                    .credentials_provider(s3::config::Credentials::new(
                        &self.settings.access_key_id,
                        &self.settings.secret_access_key,
                        None,     // session_token
                        None,     // expiry
                        "Static", // provider_name
                    ));
                if let Some(endpoint) = &self.settings.endpoint_url {
                    loader = loader.endpoint_url(endpoint);
                }
                let sdk_config = loader.load().await;

                let s3_config = s3::config::Builder::from(&sdk_config)
                    .force_path_style(self.settings.endpoint_url.is_some())
                    .build();
                s3::Client::from_conf(s3_config)
            })
            .await
    }

    /// Digest stored on the remote object, `None` when the object does not exist.
    async fn remote_digest(&self, location: &RemoteLocation) -> Result<Option<String>> {
        let client = self.client().await;
        match client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(
                head.metadata()
                    .and_then(|m| m.get(DIGEST_METADATA_KEY))
                    .cloned()
                    .unwrap_or_default(),
            )),
            Err(err)
                if err.as_service_error().is_some_and(|e| e.is_not_found())
                    || status_of(&err) == Some(404) =>
            {
                Ok(None)
            }
            Err(err) => Err(remote_error(
                &err,
                format!("Failed to look up s3://{}/{}", location.bucket, location.key),
            )),
        }
    }
}

impl Uploader for S3Uploader {
    async fn upload(&self, src: &Path, dst: &str) -> Result<bool> {
        let location = RemoteLocation::parse(dst, S3_SCHEME)?;
        let digest = sha1_file(src)?;

        if self.remote_digest(&location).await?.as_deref() == Some(digest.as_str()) {
            log::debug!("{} already holds content {}", dst, digest);
            return Ok(false);
        }

        let body = ByteStream::from_path(src).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to create ByteStream from file {}: {}",
                src.display(),
                e
            ))
        })?;

        self.client()
            .await
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .metadata(DIGEST_METADATA_KEY, &digest)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                remote_error(
                    &err,
                    format!("Failed to upload {} to {}", src.display(), dst),
                )
            })?;

        Ok(true)
    }

    async fn download_if_exists(&self, src: &str, dst: &Path) -> Result<bool> {
        let location = RemoteLocation::parse(src, S3_SCHEME)?;

        let mut object = match self
            .client()
            .await
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
        {
            Ok(object) => object,
            Err(err)
                if err.as_service_error().is_some_and(|e| e.is_no_such_key())
                    || status_of(&err) == Some(404) =>
            {
                return Ok(false);
            }
            Err(err) => {
                return Err(remote_error(&err, format!("Failed to get object {}", src)));
            }
        };

        let mut output_file = File::create(dst).await?;
        let mut total_bytes_downloaded = 0;
        while let Some(bytes_chunk) = object.body.try_next().await.map_err(|e| {
            AppError::Storage(format!("Failed to read body of {}: {}", src, e))
        })? {
            output_file.write_all(&bytes_chunk).await?;
            total_bytes_downloaded += bytes_chunk.len();
        }
        output_file.flush().await?;

        log::debug!(
            "Downloaded {} bytes from {} to {}",
            total_bytes_downloaded,
            src,
            dst.display()
        );
        Ok(true)
    }
}

fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

fn remote_error<E>(err: &SdkError<E, HttpResponse>, what: String) -> AppError
where
    E: std::error::Error + 'static,
{
    let detail = format!("{}: {}", what, DisplayErrorContext(err));
    match status_of(err) {
        Some(401) | Some(403) => AppError::Auth(detail),
        _ => AppError::Storage(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_smithy_http_client::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_runtime_api::http::StatusCode;
    use s3::config::http::HttpRequest;
    use s3::config::retry::RetryConfig;
    use s3::config::{BehaviorVersion, Credentials};
    use s3::primitives::SdkBody;
    use std::io::Write;

    const DESTINATION: &str = "s3://bucket/backups/app.tar.xz";
    const CONTENT: &[u8] = b"archive bytes";
    const CONTENT_SHA1: &str = "c7406ff5b3bb4e6bd8ba3ac8b8669c7421919fa7";

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> ReplayEvent {
        let mut response = HttpResponse::new(
            StatusCode::try_from(status).expect("valid status"),
            SdkBody::from(body),
        );
        for (name, value) in headers {
            response.headers_mut().insert(name.to_string(), value.to_string());
        }
        ReplayEvent::new(HttpRequest::new(SdkBody::empty()), response)
    }

    fn replay_uploader(events: Vec<ReplayEvent>) -> (S3Uploader, StaticReplayClient) {
        let http_client = StaticReplayClient::new(events);
        let config = s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("key-id", "key", None, None, "test"))
            .endpoint_url("http://127.0.0.1:9")
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .http_client(http_client.clone())
            .build();
        let uploader = S3Uploader::with_client(settings(), s3::Client::from_conf(config));
        (uploader, http_client)
    }

    fn local_archive() -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(CONTENT)?;
        file.flush()?;
        assert_eq!(sha1_file(file.path())?, CONTENT_SHA1);
        Ok(file)
    }

    fn methods(http_client: &StaticReplayClient) -> Vec<String> {
        http_client
            .actual_requests()
            .map(|r| r.method().to_string())
            .collect()
    }

    #[tokio::test]
    async fn uploads_with_digest_metadata_when_remote_is_missing() -> anyhow::Result<()> {
        let file = local_archive()?;
        let (uploader, http_client) = replay_uploader(vec![
            response(404, &[], ""),
            response(200, &[("etag", "\"abc\"")], ""),
        ]);

        assert!(uploader.upload(file.path(), DESTINATION).await?);

        assert_eq!(methods(&http_client), ["HEAD", "PUT"]);
        let put = http_client.actual_requests().nth(1).expect("put request");
        assert!(put.uri().contains("/bucket/backups/app.tar.xz"), "{}", put.uri());
        assert_eq!(put.headers().get("x-amz-meta-sha1"), Some(CONTENT_SHA1));
        Ok(())
    }

    #[tokio::test]
    async fn skips_upload_when_remote_digest_matches() -> anyhow::Result<()> {
        let file = local_archive()?;
        let (uploader, http_client) =
            replay_uploader(vec![response(200, &[("x-amz-meta-sha1", CONTENT_SHA1)], "")]);

        assert!(!uploader.upload(file.path(), DESTINATION).await?);
        assert_eq!(methods(&http_client), ["HEAD"]);
        Ok(())
    }

    #[tokio::test]
    async fn reuploads_when_remote_digest_differs() -> anyhow::Result<()> {
        let file = local_archive()?;
        let (uploader, http_client) = replay_uploader(vec![
            response(200, &[("x-amz-meta-sha1", "0000")], ""),
            response(200, &[], ""),
        ]);

        assert!(uploader.upload(file.path(), DESTINATION).await?);
        assert_eq!(methods(&http_client), ["HEAD", "PUT"]);
        Ok(())
    }

    #[tokio::test]
    async fn lookup_failures_map_to_storage_and_auth_errors() -> anyhow::Result<()> {
        let file = local_archive()?;

        let (uploader, http_client) = replay_uploader(vec![response(500, &[], "")]);
        let err = uploader.upload(file.path(), DESTINATION).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)), "{err:?}");
        assert_eq!(methods(&http_client), ["HEAD"]);

        let (uploader, http_client) = replay_uploader(vec![response(403, &[], "")]);
        let err = uploader.upload(file.path(), DESTINATION).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "{err:?}");
        assert_eq!(methods(&http_client), ["HEAD"]);
        Ok(())
    }

    #[tokio::test]
    async fn download_of_missing_object_is_not_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("restore.tar.xz");
        let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";
        let (uploader, http_client) = replay_uploader(vec![response(404, &[], body)]);

        assert!(!uploader.download_if_exists(DESTINATION, &out).await?);
        assert!(!out.exists());
        assert_eq!(methods(&http_client), ["GET"]);
        Ok(())
    }

    #[tokio::test]
    async fn download_streams_object_body() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("restore.tar.xz");
        let (uploader, _http_client) =
            replay_uploader(vec![response(200, &[], "archive bytes")]);

        assert!(uploader.download_if_exists(DESTINATION, &out).await?);
        assert_eq!(std::fs::read(&out)?, CONTENT);
        Ok(())
    }

    fn settings() -> S3Settings {
        S3Settings {
            endpoint_url: Some("http://127.0.0.1:9".to_string()),
            region: "us-east-1".to_string(),
            access_key_id: "key-id".to_string(),
            secret_access_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn upload_rejects_foreign_scheme_before_any_request() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let uploader = S3Uploader::new(settings());

        let err = uploader
            .upload(file.path(), "b2://bucket/key")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDestination(_)));
        assert!(uploader.client.get().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn download_rejects_missing_key() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let uploader = S3Uploader::new(settings());

        let err = uploader
            .download_if_exists("s3://bucket/", &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDestination(_)));
        assert!(!dir.path().join("out").exists());
        Ok(())
    }
}
