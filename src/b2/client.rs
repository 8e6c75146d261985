//! Backblaze B2 API Client
//!
//! One client serves one bucket. JSON calls share a single request helper
//! and are retried with exponential backoff; an expired token triggers a
//! re-authorization before the next attempt. Uploads are sent once, since a
//! streamed body cannot be replayed.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::Engine;
use futures::StreamExt;
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::errors::B2Error;
use super::types::{
    Authorization, BucketList, DeleteFileVersion, FileNames, FileVersion, GetUploadUrl, ListBuckets,
    ListFileNames, UploadTarget, UploadedFile,
};

/// Account authorization endpoint (v3 response layout)
const AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// Transfers themselves are bounded by the caller's deadline
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts after the first one
const MAX_RETRIES: u32 = 3;

/// First backoff delay; doubles on each retry
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Token and endpoints handed out by `b2_authorize_account`
struct Session {
    token: String,
    api_url: String,
    download_url: String,
}

impl From<&Authorization> for Session {
    fn from(auth: &Authorization) -> Self {
        Self {
            token: auth.authorization_token.clone(),
            api_url: auth.api_info.storage_api.api_url.clone(),
            download_url: auth.api_info.storage_api.download_url.clone(),
        }
    }
}

struct Credentials {
    key_id: String,
    key: String,
}

impl Credentials {
    fn basic_auth(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", self.key_id, self.key));
        format!("Basic {}", encoded)
    }
}

/// Authorized handle on a single bucket
#[derive(Clone)]
pub struct B2Client {
    http: Client,
    credentials: Arc<Credentials>,
    /// Replaced wholesale on re-authorization
    session: Arc<RwLock<Session>>,
    bucket_id: String,
    bucket_name: String,
}

/// Pass 2xx responses through, classify the rest
async fn check_status(response: Response) -> Result<Response, B2Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(B2Error::from_response(status.as_u16(), &body))
}

/// Delay before retry number `attempt` (0-based)
fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt)
}

impl B2Client {
    /// Authorize the account and resolve `bucket_name` to its id
    pub async fn authorize(key_id: &str, key: &str, bucket_name: &str) -> Result<Self, B2Error> {
        info!(bucket = bucket_name, "Authorizing with B2");

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(B2Error::from_transport)?;
        let credentials = Credentials {
            key_id: key_id.to_string(),
            key: key.to_string(),
        };

        let auth = Self::authorize_account(&http, &credentials).await?;
        debug!(api_url = %auth.api_info.storage_api.api_url, "B2 account authorized");

        let mut client = Self {
            http,
            credentials: Arc::new(credentials),
            session: Arc::new(RwLock::new(Session::from(&auth))),
            bucket_id: String::new(),
            bucket_name: bucket_name.to_string(),
        };
        client.bucket_id = client.find_bucket_id(&auth.account_id).await?;

        info!(bucket = bucket_name, bucket_id = %client.bucket_id, "B2 client ready");
        Ok(client)
    }

    async fn authorize_account(http: &Client, credentials: &Credentials) -> Result<Authorization, B2Error> {
        let response = http
            .get(AUTHORIZE_URL)
            .header("Authorization", credentials.basic_auth())
            .send()
            .await
            .map_err(B2Error::from_transport)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(B2Error::from_transport)
    }

    /// Replace the session with a freshly authorized one
    async fn reauthorize(&self) -> Result<(), B2Error> {
        let auth = Self::authorize_account(&self.http, &self.credentials).await?;
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Session::from(&auth);
        info!("B2 session renewed");
        Ok(())
    }

    fn token(&self) -> String {
        self.session.read().unwrap_or_else(|e| e.into_inner()).token.clone()
    }

    fn endpoint(&self, call: &str) -> String {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        format!("{}/b2api/v2/{}", session.api_url, call)
    }

    fn download_url(&self, file_name: &str) -> String {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        format!(
            "{}/file/{}/{}",
            session.download_url,
            self.bucket_name,
            urlencoding::encode(file_name)
        )
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out
    async fn with_retry<F, Fut, T>(&self, call: &str, target: &str, attempt: F) -> Result<T, B2Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, B2Error>>,
    {
        let mut retries = 0;

        loop {
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() || retries == MAX_RETRIES {
                error!(call = call, target = target, error = %err, "B2 call failed");
                return Err(err);
            }

            if matches!(err, B2Error::AuthExpired) {
                if let Err(auth_err) = self.reauthorize().await {
                    error!(error = %auth_err, "B2 re-authorization failed");
                    return Err(auth_err);
                }
            }

            let delay = backoff(retries);
            retries += 1;
            warn!(
                call = call,
                target = target,
                retry = retries,
                max = MAX_RETRIES,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying B2 call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// POST a JSON body to a `b2api/v2` call and decode the JSON reply
    async fn call<B, R>(&self, call: &str, body: &B) -> Result<R, B2Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(call))
            .header("Authorization", self.token())
            .json(body)
            .send()
            .await
            .map_err(B2Error::from_transport)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(B2Error::from_transport)
    }

    async fn find_bucket_id(&self, account_id: &str) -> Result<String, B2Error> {
        let request = ListBuckets {
            account_id,
            bucket_name: &self.bucket_name,
        };
        let list: BucketList = self
            .with_retry("b2_list_buckets", &self.bucket_name, || self.call("b2_list_buckets", &request))
            .await?;

        list.buckets
            .into_iter()
            .find(|b| b.bucket_name == self.bucket_name)
            .map(|b| b.bucket_id)
            .ok_or_else(|| B2Error::NotFound(format!("bucket {:?}", self.bucket_name)))
    }

    /// Live version of the file named exactly `file_name`, if any
    pub async fn find_file(&self, file_name: &str) -> Result<Option<FileVersion>, B2Error> {
        // Names sort lexically, so starting at the name itself yields it first
        let request = ListFileNames {
            bucket_id: &self.bucket_id,
            prefix: file_name,
            start_file_name: file_name,
            max_file_count: 1,
        };
        let page: FileNames = self
            .with_retry("b2_list_file_names", file_name, || self.call("b2_list_file_names", &request))
            .await?;

        Ok(page
            .files
            .into_iter()
            .find(|f| f.file_name == file_name && f.is_live()))
    }

    /// Upload a streamed body of exactly `size` bytes
    pub async fn upload(
        &self,
        file_name: &str,
        body: Body,
        size: u64,
        content_type: &str,
    ) -> Result<UploadedFile, B2Error> {
        let request = GetUploadUrl {
            bucket_id: &self.bucket_id,
        };
        let target: UploadTarget = self
            .with_retry("b2_get_upload_url", file_name, || self.call("b2_get_upload_url", &request))
            .await?;

        debug!(file = file_name, size = size, "Uploading to B2");
        let response = self
            .http
            .post(&target.upload_url)
            .header("Authorization", &target.authorization_token)
            .header("X-Bz-File-Name", urlencoding::encode(file_name).into_owned())
            .header("Content-Type", content_type)
            .header("Content-Length", size)
            // The body is streamed, so no SHA1 is known up front
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .body(body)
            .send()
            .await
            .map_err(B2Error::from_transport)?;

        let uploaded: UploadedFile = check_status(response)
            .await?
            .json()
            .await
            .map_err(B2Error::from_transport)?;

        info!(file = file_name, file_id = %uploaded.file_id, size = uploaded.content_length, "Uploaded to B2");
        Ok(uploaded)
    }

    /// Stream the named file into `out`, returning the bytes written
    pub async fn download_into<W>(&self, file_name: &str, out: &mut W) -> Result<u64, B2Error>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let response = self
            .with_retry("download_file_by_name", file_name, || async {
                let response = self
                    .http
                    .get(self.download_url(file_name))
                    .header("Authorization", self.token())
                    .send()
                    .await
                    .map_err(B2Error::from_transport)?;
                check_status(response).await
            })
            .await?;

        let mut written = 0u64;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(B2Error::from_transport)?;
            out.write_all(&chunk)
                .await
                .map_err(|e| B2Error::Transport(e.to_string()))?;
            written += chunk.len() as u64;
        }
        out.flush().await.map_err(|e| B2Error::Transport(e.to_string()))?;

        debug!(file = file_name, size = written, "Downloaded from B2");
        Ok(written)
    }

    /// Permanently delete one file version
    pub async fn delete_version(&self, file_name: &str, file_id: &str) -> Result<(), B2Error> {
        let request = DeleteFileVersion { file_name, file_id };
        let _: serde_json::Value = self
            .with_retry("b2_delete_file_version", file_name, || {
                self.call("b2_delete_file_version", &request)
            })
            .await?;

        debug!(file = file_name, file_id = file_id, "Deleted B2 file version");
        Ok(())
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials {
            key_id: "id".to_string(),
            key: "secret".to_string(),
        };
        assert_eq!(credentials.basic_auth(), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(500));
        assert_eq!(backoff(1), Duration::from_millis(1000));
        assert_eq!(backoff(2), Duration::from_millis(2000));
    }
}
