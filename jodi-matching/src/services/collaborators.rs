use std::sync::Arc;

use axum::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use jodi_shared::clients::rabbitmq::RabbitMQClient;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::event::payloads::{DocumentRef, PairingDeliver};
use jodi_shared::types::event::{routing_keys, Event};

use crate::models::Profile;

pub const SOURCE: &str = "jodi-matching";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    BioData,
    Picture,
    IdProof,
}

impl DocumentKind {
    fn as_str(self) -> &'static str {
        match self {
            DocumentKind::BioData => "bio_data",
            DocumentKind::Picture => "picture",
            DocumentKind::IdProof => "id_proof",
        }
    }
}

/// The documents attached to one side of a delivery. Any of them may be
/// absent; the channel renders what it gets.
#[derive(Debug, Clone, Default)]
pub struct ProfileDocuments {
    pub bio: Option<DocumentRef>,
    pub picture: Option<DocumentRef>,
    pub id_proof: Option<DocumentRef>,
}

/// Sends one counterpart profile to one recipient's chat handle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        to_chat_handle: &str,
        counterpart: &Profile,
        documents: &ProfileDocuments,
    ) -> AppResult<()>;
}

/// Looks up the active, verified documents of a profile.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn active_document(
        &self,
        profile_id: Uuid,
        kind: DocumentKind,
    ) -> AppResult<Option<DocumentRef>>;

    async fn documents_for(&self, profile_id: Uuid) -> AppResult<ProfileDocuments> {
        Ok(ProfileDocuments {
            bio: self.active_document(profile_id, DocumentKind::BioData).await?,
            picture: self.active_document(profile_id, DocumentKind::Picture).await?,
            id_proof: self.active_document(profile_id, DocumentKind::IdProof).await?,
        })
    }
}

/// Delivers by publishing a `pairing.deliver` event for the bot channel
/// to consume. Publish failure is a delivery failure; the caller keeps
/// the pairing claimable.
pub struct EventNotifier {
    rabbitmq: Arc<RabbitMQClient>,
}

impl EventNotifier {
    pub fn new(rabbitmq: Arc<RabbitMQClient>) -> Self {
        Self { rabbitmq }
    }
}

#[async_trait]
impl Notifier for EventNotifier {
    async fn deliver(
        &self,
        to_chat_handle: &str,
        counterpart: &Profile,
        documents: &ProfileDocuments,
    ) -> AppResult<()> {
        let payload = PairingDeliver {
            to_chat_handle: to_chat_handle.to_string(),
            counterpart_profile_id: counterpart.id,
            counterpart_name: counterpart.full_name.clone(),
            bio: documents.bio.clone(),
            picture: documents.picture.clone(),
            id_proof: documents.id_proof.clone(),
        };
        let event =
            Event::new(SOURCE, "pairing.deliver", payload).with_profile(counterpart.id);

        self.rabbitmq
            .publish(routing_keys::PAIRING_DELIVER, &event)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, to = %to_chat_handle, "failed to publish delivery");
                AppError::new(ErrorCode::DeliveryFailed, "failed to publish delivery event")
            })
    }
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    id: i64,
    url: String,
}

/// Fetches documents over HTTP from the document service. A 404 means
/// the profile has no active document of that kind.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn active_document(
        &self,
        profile_id: Uuid,
        kind: DocumentKind,
    ) -> AppResult<Option<DocumentRef>> {
        let url = format!(
            "{}/internal/documents/{}/{}",
            self.base_url,
            profile_id,
            kind.as_str()
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(error = %e, profile_id = %profile_id, "document service unreachable");
            AppError::new(ErrorCode::ServiceUnavailable, "document service unreachable")
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: DocumentResponse = response
            .error_for_status()
            .map_err(|e| {
                AppError::new(
                    ErrorCode::ServiceUnavailable,
                    format!("document service error: {e}"),
                )
            })?
            .json()
            .await
            .map_err(|e| AppError::internal(format!("bad document payload: {e}")))?;

        Ok(Some(DocumentRef {
            document_id: body.id,
            url: body.url,
        }))
    }
}
