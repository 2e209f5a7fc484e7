//! Seams between the sync controller and the outside world.

use async_trait::async_trait;
use tvision_api::{
    Credentials, Identity, SendMessageRequest, SessionSummary, ShareResponse, StartChatResponse,
    StoredMessage, UploadResponse,
};
use tvision_api_client::{ApiClient, AssistantReply, ImageUpload, Result};

/// Backend operations the controller drives. [`ApiClient`] is the real
/// implementation; tests swap in a scripted fake.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn login(&self, creds: &Credentials) -> Result<Identity>;
    async fn register(&self, creds: &Credentials) -> Result<Identity>;
    async fn start_chat(&self, user_id: Option<i64>) -> Result<StartChatResponse>;
    async fn send_message(&self, req: &SendMessageRequest) -> Result<AssistantReply>;
    async fn upload_image(&self, session_id: &str, upload: &ImageUpload)
    -> Result<UploadResponse>;
    async fn history(&self, user_id: i64) -> Result<Vec<SessionSummary>>;
    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
    async fn share_session(&self, session_id: &str) -> Result<ShareResponse>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn login(&self, creds: &Credentials) -> Result<Identity> {
        ApiClient::login(self, creds).await
    }

    async fn register(&self, creds: &Credentials) -> Result<Identity> {
        ApiClient::register(self, creds).await
    }

    async fn start_chat(&self, user_id: Option<i64>) -> Result<StartChatResponse> {
        ApiClient::start_chat(self, user_id).await
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<AssistantReply> {
        ApiClient::send_message(self, req).await
    }

    async fn upload_image(
        &self,
        session_id: &str,
        upload: &ImageUpload,
    ) -> Result<UploadResponse> {
        ApiClient::upload_image(self, session_id, upload).await
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SessionSummary>> {
        ApiClient::history(self, user_id).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        ApiClient::session_messages(self, session_id).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        ApiClient::delete_session(self, session_id).await
    }

    async fn share_session(&self, session_id: &str) -> Result<ShareResponse> {
        ApiClient::share_session(self, session_id).await
    }
}

/// System clipboard, or whatever stands in for it.
pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str) -> std::io::Result<()>;
}

/// Yes/no prompt shown before destructive actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
