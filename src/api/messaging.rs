use serde_json::json;

use crate::api::types::{ConversationEnvelope, ConversationList, MessageEnvelope, MessagePage};
use crate::error::ClientResult;
use crate::http::{ApiClient, ApiRequest};

/// Conversation and message routes
#[derive(Clone)]
pub struct MessagingApi {
    client: ApiClient,
}

impl MessagingApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn conversations(&self) -> ClientResult<ConversationList> {
        self.client.get("/conversations").await
    }

    pub async fn conversation(&self, id: &str) -> ClientResult<ConversationEnvelope> {
        self.client.get(&format!("/conversations/{}", id)).await
    }

    /// A page of messages; pass the previous page's `next_cursor` to continue
    pub async fn messages(&self, conversation_id: &str, cursor: Option<&str>) -> ClientResult<MessagePage> {
        self.client
            .request(
                ApiRequest::get(format!("/conversations/{}/messages", conversation_id))
                    .query_opt("cursor", cursor),
            )
            .await
    }

    pub async fn send(&self, conversation_id: &str, body: &str) -> ClientResult<MessageEnvelope> {
        self.client
            .post(
                &format!("/conversations/{}/messages", conversation_id),
                &json!({ "body": body, "message_type": "text" }),
            )
            .await
    }

    pub async fn mark_read(&self, conversation_id: &str) -> ClientResult<()> {
        self.client
            .execute(ApiRequest::post(format!("/conversations/{}/read", conversation_id)))
            .await?;
        Ok(())
    }

    pub async fn archive(&self, id: &str) -> ClientResult<()> {
        self.client
            .execute(ApiRequest::post(format!("/conversations/{}/archive", id)))
            .await?;
        Ok(())
    }
}
