use serde_json::json;

use crate::api::types::{QuoteAction, QuoteEnvelope, QuoteList, SubmitQuoteInput};
use crate::error::ClientResult;
use crate::http::{ApiClient, ApiRequest};

/// Quote submission and lifecycle routes
#[derive(Clone)]
pub struct QuotesApi {
    client: ApiClient,
}

impl QuotesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn for_job(&self, job_id: &str) -> ClientResult<QuoteList> {
        self.client.get(&format!("/jobs/{}/quotes", job_id)).await
    }

    /// Quotes submitted by the signed-in provider
    pub async fn mine(&self, status: Option<&str>) -> ClientResult<QuoteList> {
        self.client
            .request(ApiRequest::get("/quotes/mine").query_opt("status", status))
            .await
    }

    pub async fn get(&self, id: &str) -> ClientResult<QuoteEnvelope> {
        self.client.get(&format!("/quotes/{}", id)).await
    }

    pub async fn submit(&self, job_id: &str, input: &SubmitQuoteInput) -> ClientResult<QuoteEnvelope> {
        self.client
            .post(&format!("/jobs/{}/quotes", job_id), input)
            .await
    }

    pub async fn update(&self, id: &str, changes: &serde_json::Value) -> ClientResult<QuoteEnvelope> {
        self.client.patch(&format!("/quotes/{}", id), changes).await
    }

    pub async fn withdraw(&self, id: &str, reason: Option<&str>) -> ClientResult<QuoteEnvelope> {
        self.client
            .post(
                &format!("/quotes/{}/withdraw", id),
                &json!({ "withdrawal_reason": reason }),
            )
            .await
    }

    pub async fn mark_viewed(&self, id: &str) -> ClientResult<QuoteEnvelope> {
        self.act(id, QuoteAction::Viewed).await
    }

    pub async fn shortlist(&self, id: &str) -> ClientResult<QuoteEnvelope> {
        self.act(id, QuoteAction::Shortlisted).await
    }

    pub async fn reject(&self, id: &str) -> ClientResult<QuoteEnvelope> {
        self.act(id, QuoteAction::Rejected).await
    }

    async fn act(&self, id: &str, action: QuoteAction) -> ClientResult<QuoteEnvelope> {
        self.client
            .post(&format!("/quotes/{}/action", id), &json!({ "action": action }))
            .await
    }
}
