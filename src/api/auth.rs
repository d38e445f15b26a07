use serde_json::json;
use tracing::instrument;

use crate::api::types::{
    AuthTokens, LoginInput, LoginResponse, MessageResponse, RegisterInput, UserEnvelope,
};
use crate::error::ClientResult;
use crate::http::{ApiClient, ApiRequest, REFRESH_PATH};

/// Authentication routes
///
/// Routes used before a session exists are sent without a bearer token, so a
/// rejected password never kicks off a token refresh.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    #[instrument(skip_all)]
    pub async fn login(&self, input: &LoginInput) -> ClientResult<LoginResponse> {
        self.client
            .request(ApiRequest::post("/auth/login").json(input)?.skip_auth())
            .await
    }

    #[instrument(skip_all)]
    pub async fn register(&self, input: &RegisterInput) -> ClientResult<LoginResponse> {
        self.client
            .request(ApiRequest::post("/auth/register").json(input)?.skip_auth())
            .await
    }

    /// Revoke a refresh token server-side
    pub async fn logout(&self, refresh_token: &str) -> ClientResult<()> {
        self.client
            .execute(
                ApiRequest::post("/auth/logout")
                    .with_body(json!({ "refresh_token": refresh_token })),
            )
            .await?;
        Ok(())
    }

    /// Exchange a refresh token directly
    ///
    /// The pipeline does this on its own when an access token is rejected;
    /// this is for callers that manage tokens themselves.
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<AuthTokens> {
        self.client
            .request(
                ApiRequest::post(REFRESH_PATH)
                    .with_body(json!({ "refresh_token": refresh_token }))
                    .skip_auth(),
            )
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> ClientResult<MessageResponse> {
        self.client
            .request(
                ApiRequest::post("/auth/forgot-password")
                    .with_body(json!({ "email": email }))
                    .skip_auth(),
            )
            .await
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> ClientResult<MessageResponse> {
        self.client
            .request(
                ApiRequest::post("/auth/reset-password")
                    .with_body(json!({ "token": token, "new_password": new_password }))
                    .skip_auth(),
            )
            .await
    }

    pub async fn verify_email(&self, token: &str) -> ClientResult<MessageResponse> {
        self.client
            .request(ApiRequest::post("/auth/verify-email").with_body(json!({ "token": token })))
            .await
    }

    pub async fn request_phone_otp(&self, phone: &str) -> ClientResult<MessageResponse> {
        self.client
            .request(ApiRequest::post("/auth/phone-otp/request").with_body(json!({ "phone": phone })))
            .await
    }

    pub async fn verify_phone_otp(&self, phone: &str, otp: &str) -> ClientResult<MessageResponse> {
        self.client
            .request(
                ApiRequest::post("/auth/phone-otp/verify")
                    .with_body(json!({ "phone": phone, "otp": otp })),
            )
            .await
    }

    /// The signed-in user
    pub async fn me(&self) -> ClientResult<UserEnvelope> {
        self.client.get("/auth/me").await
    }
}
