//! Wire models for the marketplace API
//!
//! Every model tolerates missing fields so that partial payloads (and the
//! empty object returned in mock mode) still decode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Provider,
    Admin,
    #[default]
    #[serde(other)]
    Unknown,
}

// ===== AUTH =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub display_name: Option<String>,
    pub role: UserRole,
    /// active, suspended, banned, pending_verification or deleted
    pub status: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub timezone: Option<String>,
    pub push_enabled: bool,
    pub email_notifications: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Body of a successful login or registration
///
/// Older server builds return the token pair at the top level, newer ones
/// nest it under `tokens`; `tokens()` reads either.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub user: Option<User>,
    pub tokens: Option<AuthTokens>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub customer_profile: Option<CustomerProfile>,
    pub provider_profile: Option<ProviderProfile>,
}

impl LoginResponse {
    /// The issued token pair, if the response carried a complete one
    pub fn tokens(&self) -> Option<AuthTokens> {
        if let Some(tokens) = &self.tokens {
            if !tokens.access_token.is_empty() && !tokens.refresh_token.is_empty() {
                return Some(tokens.clone());
            }
        }
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(AuthTokens {
                    access_token: access.clone(),
                    refresh_token: refresh.clone(),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    pub terms_accepted: bool,
    pub privacy_accepted: bool,
    pub marketing_consent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

/// Acknowledgement returned by password, email and phone verification routes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEnvelope {
    pub user: Option<User>,
}

// ===== JOB =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCategory {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub icon: String,
    pub parent_id: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAttachment {
    pub id: String,
    pub job_id: String,
    pub uploader_id: String,
    /// image or document
    pub file_type: String,
    pub mime_type: String,
    pub cdn_url: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sort_order: i32,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub customer_id: String,
    pub category_id: String,
    pub subcategory_id: Option<String>,
    pub title: String,
    pub description: String,
    /// draft, posted, quoting, awarded, in_progress, completed, cancelled, ...
    pub status: String,
    pub urgency: String,
    pub property_type: Option<String>,
    pub suburb: String,
    pub postcode: String,
    pub state: String,
    pub exact_address: Option<String>,
    /// Cents
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub budget_is_gst: bool,
    pub preferred_start_date: Option<String>,
    pub preferred_end_date: Option<String>,
    pub time_window_notes: Option<String>,
    pub quote_count: u32,
    pub awarded_quote_id: Option<String>,
    pub awarded_provider_id: Option<String>,
    pub awarded_at: Option<String>,
    pub published_at: Option<String>,
    pub expires_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub view_count: u32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub customer: Option<User>,
    pub category: Option<JobCategory>,
    pub attachments: Vec<JobAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobEnvelope {
    pub job: Option<Job>,
}

/// One page of jobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFeed {
    pub jobs: Vec<Job>,
    #[serde(rename = "nextCursor", alias = "next_cursor")]
    pub next_cursor: Option<String>,
}

/// Filters for the job feed; unset fields are left off the query string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFeedQuery {
    pub category_id: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub radius_km: Option<u32>,
    /// Sent comma-joined
    pub urgency: Vec<String>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl JobFeedQuery {
    /// Query pairs in a stable order
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key.to_string(), value));
            }
        };

        push("category_id", self.category_id.clone());
        push("state", self.state.clone());
        push("postcode", self.postcode.clone());
        push("radius_km", self.radius_km.map(|v| v.to_string()));
        push(
            "urgency",
            (!self.urgency.is_empty()).then(|| self.urgency.join(",")),
        );
        push("budget_min", self.budget_min.map(|v| v.to_string()));
        push("budget_max", self.budget_max.map(|v| v.to_string()));
        push("sort", self.sort.clone());
        push("cursor", self.cursor.clone());
        push("limit", self.limit.map(|v| v.to_string()));
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateJobInput {
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<String>,
    pub title: String,
    pub description: String,
    pub urgency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    pub suburb: String,
    pub postcode: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_max: Option<i64>,
    pub budget_is_gst: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window_notes: Option<String>,
    /// Publish immediately instead of saving a draft
    pub publish: bool,
}

// ===== QUOTE =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub id: String,
    pub job_id: String,
    pub provider_id: String,
    /// pending, viewed, shortlisted, awarded, rejected, withdrawn or expired
    pub status: String,
    /// fixed, estimate_range, hourly or call_for_quote
    pub quote_type: String,
    pub price_fixed: Option<i64>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub hourly_rate: Option<i64>,
    pub is_gst_included: bool,
    pub scope_notes: Option<String>,
    pub inclusions: Option<String>,
    pub exclusions: Option<String>,
    pub timeline_days: Option<u32>,
    pub warranty_months: Option<u32>,
    pub viewed_at: Option<String>,
    pub shortlisted_at: Option<String>,
    pub awarded_at: Option<String>,
    pub rejected_at: Option<String>,
    pub withdrawn_at: Option<String>,
    pub withdrawal_reason: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub provider: Option<ProviderProfile>,
    pub job: Option<Box<Job>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteEnvelope {
    pub quote: Option<Quote>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteList {
    pub quotes: Vec<Quote>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitQuoteInput {
    pub quote_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_fixed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<i64>,
    pub is_gst_included: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_months: Option<u32>,
}

/// Lifecycle actions a customer can take on a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteAction {
    Viewed,
    Shortlisted,
    Rejected,
}

// ===== PROFILE =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerProfile {
    pub user_id: String,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub jobs_posted: u32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderProfile {
    pub user_id: String,
    pub bio: Option<String>,
    pub years_experience: Option<u32>,
    pub service_radius_km: u32,
    pub business_name: Option<String>,
    pub abn: Option<String>,
    pub abn_verified: bool,
    pub identity_verified: bool,
    pub trade_license_verified: bool,
    pub insurance_verified: bool,
    pub avg_rating: Option<f64>,
    pub total_reviews: u32,
    pub total_quotes: u32,
    pub jobs_completed: u32,
    pub available: bool,
    pub last_active_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub user: Option<User>,
}

/// Body of `GET /profile/me`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MyProfile {
    pub user: Option<User>,
    pub customer_profile: Option<CustomerProfile>,
    pub provider_profile: Option<ProviderProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderProfileEnvelope {
    pub profile: Option<ProviderProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerProfileEnvelope {
    pub profile: Option<CustomerProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateUserInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCustomerProfileInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProviderProfileInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_radius_km: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
}

// ===== MESSAGING =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    /// text, image, system or quote_event
    pub message_type: String,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_mime: Option<String>,
    pub is_deleted: bool,
    pub pii_detected: bool,
    pub pii_blocked: bool,
    pub read_by_recipient_at: Option<String>,
    pub created_at: Option<String>,
    pub sender: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    pub id: String,
    pub job_id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub quote_id: Option<String>,
    pub last_message_at: Option<String>,
    pub customer_unread: u32,
    pub provider_unread: u32,
    pub is_archived: bool,
    pub created_at: Option<String>,
    pub job: Option<Box<Job>>,
    pub customer: Option<User>,
    pub provider: Option<User>,
    pub last_message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationList {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationEnvelope {
    pub conversation: Option<Conversation>,
}

/// One page of messages, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageEnvelope {
    pub message: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_response_reads_either_token_shape() {
        let flat: LoginResponse = serde_json::from_value(json!({
            "user": { "id": "u1", "role": "customer" },
            "access_token": "a1",
            "refresh_token": "r1"
        }))
        .unwrap();
        assert_eq!(flat.tokens().unwrap().access_token, "a1");
        assert_eq!(flat.user.unwrap().role, UserRole::Customer);

        let nested: LoginResponse = serde_json::from_value(json!({
            "tokens": { "access_token": "a2", "refresh_token": "r2" }
        }))
        .unwrap();
        assert_eq!(nested.tokens().unwrap().refresh_token, "r2");

        let empty: LoginResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.tokens().is_none());
    }

    #[test]
    fn test_unknown_role_is_tolerated() {
        let user: User = serde_json::from_value(json!({ "role": "moderator" })).unwrap();
        assert_eq!(user.role, UserRole::Unknown);
    }

    #[test]
    fn test_feed_query_pairs() {
        let query = JobFeedQuery {
            state: Some("NSW".into()),
            urgency: vec!["emergency".into(), "within_48h".into()],
            limit: Some(20),
            ..Default::default()
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("state".to_string(), "NSW".to_string()),
                ("urgency".to_string(), "emergency,within_48h".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_feed_accepts_both_cursor_spellings() {
        let feed: JobFeed = serde_json::from_value(json!({ "jobs": [], "nextCursor": "c1" })).unwrap();
        assert_eq!(feed.next_cursor.as_deref(), Some("c1"));
        let feed: JobFeed = serde_json::from_value(json!({ "next_cursor": "c2" })).unwrap();
        assert_eq!(feed.next_cursor.as_deref(), Some("c2"));
    }
}
