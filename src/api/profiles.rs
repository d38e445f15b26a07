use serde_json::json;

use crate::api::types::{
    CustomerProfileEnvelope, MyProfile, ProviderProfileEnvelope, UpdateCustomerProfileInput,
    UpdateProviderProfileInput, UpdateUserInput, UserEnvelope,
};
use crate::error::ClientResult;
use crate::http::ApiClient;

/// Profile routes
#[derive(Clone)]
pub struct ProfilesApi {
    client: ApiClient,
}

impl ProfilesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The signed-in user with whichever role profile they have
    pub async fn me(&self) -> ClientResult<MyProfile> {
        self.client.get("/profile/me").await
    }

    pub async fn provider(&self, user_id: &str) -> ClientResult<ProviderProfileEnvelope> {
        self.client
            .get(&format!("/profiles/provider/{}", user_id))
            .await
    }

    pub async fn update_user(&self, input: &UpdateUserInput) -> ClientResult<UserEnvelope> {
        self.client.patch("/profile/user", input).await
    }

    pub async fn update_customer(
        &self,
        input: &UpdateCustomerProfileInput,
    ) -> ClientResult<CustomerProfileEnvelope> {
        self.client.patch("/profile/customer", input).await
    }

    pub async fn update_provider(
        &self,
        input: &UpdateProviderProfileInput,
    ) -> ClientResult<ProviderProfileEnvelope> {
        self.client.patch("/profile/provider", input).await
    }

    pub async fn set_availability(&self, available: bool) -> ClientResult<ProviderProfileEnvelope> {
        self.client
            .post("/profile/provider/availability", &json!({ "available": available }))
            .await
    }
}
