//! HTTP implementation of [`DeskBackend`]

use async_trait::async_trait;
use redeemdesk_shared::{ChatMessage, Conversation, QueueItem};
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    backend::{DeskBackend, OutgoingMessage},
    error::{ClientError, ClientResult},
};

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct OpenConversationResponse {
    conversation: Conversation,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct MarkReadResponse {
    message_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    items: Vec<QueueItem>,
}

/// REST client for the Redeemdesk API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Decode a success body or map the service's error envelope
    async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let bytes = response.bytes().await?;
        match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            Ok(envelope) => Err(ClientError::from_api(
                status.as_u16(),
                &envelope.error.code,
                envelope.error.message,
            )),
            Err(_) => Err(ClientError::Api {
                status: status.as_u16(),
                code: "UNKNOWN".into(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }
}

fn map_send_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Http(err)
    }
}

#[async_trait]
impl DeskBackend for HttpBackend {
    async fn open_conversation(
        &self,
        customer_id: &str,
        customer_name: &str,
    ) -> ClientResult<Conversation> {
        let response = self
            .client
            .post(self.url("/chat/conversations"))
            .json(&json!({
                "customer_id": customer_id,
                "customer_name": customer_name,
            }))
            .send()
            .await
            .map_err(map_send_error)?;

        let body: OpenConversationResponse = Self::decode(response).await?;
        Ok(body.conversation)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        customer_id: &str,
    ) -> ClientResult<Vec<ChatMessage>> {
        let response = self
            .client
            .get(self.url(&format!("/chat/conversations/{}/messages", conversation_id)))
            .query(&[("customer_id", customer_id)])
            .send()
            .await
            .map_err(map_send_error)?;

        let body: MessagesResponse = Self::decode(response).await?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        message: &OutgoingMessage,
    ) -> ClientResult<ChatMessage> {
        let (content, image_url) = message.body.clone().into_columns();

        let response = self
            .client
            .post(self.url(&format!("/chat/conversations/{}/messages", conversation_id)))
            .json(&json!({
                "customer_id": message.customer_id,
                "sender_role": message.sender_role,
                "sender_id": message.sender_id,
                "content": content,
                "image_url": image_url,
            }))
            .send()
            .await
            .map_err(map_send_error)?;

        Self::decode(response).await
    }

    async fn mark_read(&self, conversation_id: Uuid, customer_id: &str) -> ClientResult<Vec<Uuid>> {
        let response = self
            .client
            .post(self.url(&format!("/chat/conversations/{}/read", conversation_id)))
            .json(&json!({ "customer_id": customer_id }))
            .send()
            .await
            .map_err(map_send_error)?;

        let body: MarkReadResponse = Self::decode(response).await?;
        Ok(body.message_ids)
    }

    async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/media"))
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let body: UploadResponse = Self::decode(response).await?;
        Ok(body.url)
    }

    async fn lookup_queue(&self, query: &str) -> ClientResult<Vec<QueueItem>> {
        let response = self
            .client
            .get(self.url("/queue/lookup"))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(map_send_error)?;

        let body: LookupResponse = Self::decode(response).await?;
        Ok(body.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use redeemdesk_shared::{MessageBody, SenderRole};

    const CONVERSATION_ID: &str = "6f1c1d1e-8a47-4c2b-9d7e-0b5a4f0e2a11";

    fn conversation_json() -> String {
        format!(
            r#"{{"conversation":{{"id":"{CONVERSATION_ID}","customer_id":"playerone","customer_name":"Player One","status":"active","created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-01T10:00:00Z","closed_at":null}},"created":true}}"#
        )
    }

    fn backend(server: &mockito::ServerGuard) -> HttpBackend {
        HttpBackend::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_open_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat/conversations")
            .match_body(Matcher::PartialJsonString(
                r#"{"customer_id":"Player One"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(conversation_json())
            .create_async()
            .await;

        let conversation = backend(&server)
            .open_conversation("Player One", "Player One")
            .await
            .unwrap();

        assert_eq!(conversation.customer_id, "playerone");
        assert!(conversation.is_active());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_message_closed_conversation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "POST",
                format!("/api/v1/chat/conversations/{CONVERSATION_ID}/messages").as_str(),
            )
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"CONVERSATION_CLOSED","message":"Conversation is closed"}}"#)
            .create_async()
            .await;

        let outgoing = OutgoingMessage {
            customer_id: "playerone".into(),
            sender_role: SenderRole::Customer,
            sender_id: None,
            body: MessageBody::Text("hello".into()),
        };
        let result = backend(&server)
            .send_message(CONVERSATION_ID.parse().unwrap(), &outgoing)
            .await;

        assert!(matches!(result, Err(ClientError::ConversationClosed)));
    }

    #[tokio::test]
    async fn test_lookup_queue_passes_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/queue/lookup")
            .match_query(Matcher::UrlEncoded("q".into(), "PlayerName".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"0b0c0d0e-0000-4000-8000-000000000001","queue_number":12,"product_type":"rov_account","status":"waiting","game_username":"PlayerName","customer_name":null,"contact_info":null,"assigned_code":null,"position":3,"created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-01T10:00:00Z"}]}"#)
            .create_async()
            .await;

        let items = backend(&server).lookup_queue("PlayerName").await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].queue_number, 12);
        assert_eq!(items[0].position, Some(3));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unstructured_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/queue/lookup")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = backend(&server).lookup_queue("x").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 502, .. }));
        assert!(err.is_transient());
    }
}
