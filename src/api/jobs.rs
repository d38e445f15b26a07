use serde_json::json;

use crate::api::types::{CreateJobInput, JobEnvelope, JobFeed, JobFeedQuery};
use crate::error::ClientResult;
use crate::http::{ApiClient, ApiRequest};

/// Job listing and lifecycle routes
#[derive(Clone)]
pub struct JobsApi {
    client: ApiClient,
}

impl JobsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Open jobs matching `query`, one page at a time
    pub async fn feed(&self, query: &JobFeedQuery) -> ClientResult<JobFeed> {
        let mut request = ApiRequest::get("/jobs/feed");
        for (key, value) in query.to_pairs() {
            request = request.query(key, value);
        }
        self.client.request(request).await
    }

    /// Jobs posted by the signed-in customer
    pub async fn mine(&self, status: Option<&str>) -> ClientResult<JobFeed> {
        self.client
            .request(ApiRequest::get("/jobs").query_opt("status", status))
            .await
    }

    pub async fn get(&self, id: &str) -> ClientResult<JobEnvelope> {
        self.client.get(&format!("/jobs/{}", id)).await
    }

    pub async fn create(&self, input: &CreateJobInput) -> ClientResult<JobEnvelope> {
        self.client.post("/jobs", input).await
    }

    /// Partial update; only the fields present in `changes` are sent
    pub async fn update(&self, id: &str, changes: &serde_json::Value) -> ClientResult<JobEnvelope> {
        self.client.patch(&format!("/jobs/{}", id), changes).await
    }

    pub async fn publish(&self, id: &str) -> ClientResult<JobEnvelope> {
        self.client
            .request(ApiRequest::post(format!("/jobs/{}/publish", id)))
            .await
    }

    pub async fn cancel(&self, id: &str, reason: Option<&str>) -> ClientResult<JobEnvelope> {
        self.client
            .post(
                &format!("/jobs/{}/cancel", id),
                &json!({ "cancellation_reason": reason }),
            )
            .await
    }

    /// Accept a quote, awarding the job to its provider
    pub async fn award(&self, job_id: &str, quote_id: &str) -> ClientResult<JobEnvelope> {
        self.client
            .post(&format!("/jobs/{}/award", job_id), &json!({ "quote_id": quote_id }))
            .await
    }

    pub async fn complete(&self, id: &str) -> ClientResult<JobEnvelope> {
        self.client
            .request(ApiRequest::post(format!("/jobs/{}/complete", id)))
            .await
    }
}
