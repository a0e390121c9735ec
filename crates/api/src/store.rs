//! Database access for conversations, messages, and queue items

use redeemdesk_shared::{ChatMessage, Conversation, QueueItem, SenderRole};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::is_unique_violation;

const CONVERSATION_COLUMNS: &str =
    "id, customer_id, customer_name, status, created_at, updated_at, closed_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_role, sender_id, content, image_url, is_read, created_at";

// =============================================================================
// Conversations
// =============================================================================

/// Newest active conversation for a normalized customer id
pub async fn find_active_conversation(
    pool: &PgPool,
    customer_id: &str,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM conversations
        WHERE customer_id = $1 AND status = 'active'
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await
}

async fn insert_conversation(
    pool: &PgPool,
    customer_id: &str,
    customer_name: &str,
) -> Result<Conversation, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        INSERT INTO conversations (customer_id, customer_name)
        VALUES ($1, $2)
        RETURNING {CONVERSATION_COLUMNS}
        "#
    ))
    .bind(customer_id)
    .bind(customer_name)
    .fetch_one(pool)
    .await
}

/// Find the customer's active conversation or create one.
///
/// Returns the conversation and whether it was created by this call. Two
/// concurrent creators race on the partial unique index; the loser re-reads
/// the winner's row.
pub async fn find_or_create_conversation(
    pool: &PgPool,
    customer_id: &str,
    customer_name: &str,
) -> Result<(Conversation, bool), sqlx::Error> {
    if let Some(existing) = find_active_conversation(pool, customer_id).await? {
        return Ok((existing, false));
    }

    match insert_conversation(pool, customer_id, customer_name).await {
        Ok(created) => Ok((created, true)),
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(customer_id = %customer_id, "Lost conversation create race, re-reading");
            find_active_conversation(pool, customer_id)
                .await?
                .map(|c| (c, false))
                .ok_or(sqlx::Error::RowNotFound)
        }
        Err(e) => Err(e),
    }
}

pub async fn get_conversation(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .await
}

pub async fn conversation_exists(pool: &PgPool, conversation_id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)")
        .bind(conversation_id)
        .fetch_one(pool)
        .await
}

pub async fn conversation_belongs_to(
    pool: &PgPool,
    conversation_id: Uuid,
    customer_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1 AND customer_id = $2)",
    )
    .bind(conversation_id)
    .bind(customer_id)
    .fetch_one(pool)
    .await
}

/// Close an active conversation; `None` if it does not exist or is already closed
pub async fn close_conversation(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        UPDATE conversations
        SET status = 'closed', closed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'active'
        RETURNING {CONVERSATION_COLUMNS}
        "#
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .await
}

/// Conversation row with admin inbox counters
#[derive(Debug, Serialize, FromRow)]
pub struct ConversationSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
}

/// Admin inbox: conversations with unread customer messages, newest activity first
pub async fn list_conversation_summaries(
    pool: &PgPool,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<ConversationSummary>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            c.id, c.customer_id, c.customer_name, c.status,
            c.created_at, c.updated_at, c.closed_at,
            COALESCE((
                SELECT COUNT(*) FROM chat_messages m
                WHERE m.conversation_id = c.id
                  AND m.sender_role = 'customer'
                  AND m.is_read = FALSE
            ), 0) AS unread_count,
            (SELECT MAX(m.created_at) FROM chat_messages m WHERE m.conversation_id = c.id)
                AS last_message_at
        FROM conversations c
        WHERE ($1::text IS NULL OR c.status = $1)
        ORDER BY c.updated_at DESC
        LIMIT $2
        "#,
    )
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// =============================================================================
// Messages
// =============================================================================

/// All messages of a conversation, oldest first
pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM chat_messages
        WHERE conversation_id = $1
        ORDER BY created_at ASC, id ASC
        "#
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .await
}

/// Fields of a message about to be appended
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: &'a str,
    pub content: Option<&'a str>,
    pub image_url: Option<&'a str>,
}

pub async fn insert_message(pool: &PgPool, msg: NewMessage<'_>) -> Result<ChatMessage, sqlx::Error> {
    let message: ChatMessage = sqlx::query_as(&format!(
        r#"
        INSERT INTO chat_messages (conversation_id, sender_role, sender_id, content, image_url)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(msg.conversation_id)
    .bind(msg.sender_role)
    .bind(msg.sender_id)
    .bind(msg.content)
    .bind(msg.image_url)
    .fetch_one(pool)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(msg.conversation_id)
        .execute(pool)
        .await?;

    Ok(message)
}

/// Mark unread messages sent by any of `authors` as read; returns the updated ids
pub async fn mark_read(
    pool: &PgPool,
    conversation_id: Uuid,
    authors: &[SenderRole],
) -> Result<Vec<Uuid>, sqlx::Error> {
    let authors: Vec<&str> = authors.iter().map(SenderRole::as_str).collect();

    sqlx::query_scalar(
        r#"
        UPDATE chat_messages
        SET is_read = TRUE
        WHERE conversation_id = $1
          AND sender_role = ANY($2)
          AND is_read = FALSE
        RETURNING id
        "#,
    )
    .bind(conversation_id)
    .bind(&authors)
    .fetch_all(pool)
    .await
}

// =============================================================================
// Queue
// =============================================================================

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive substring search over queue number, username, customer
/// name, and contact info
pub async fn search_queue(pool: &PgPool, query: &str) -> Result<Vec<QueueItem>, sqlx::Error> {
    let pattern = format!("%{}%", escape_like(query));

    sqlx::query_as(
        r#"
        SELECT
            q.id, q.queue_number, q.product_type, q.status,
            q.game_username, q.customer_name, q.contact_info, q.assigned_code,
            CASE WHEN q.status = 'waiting' THEN (
                SELECT COUNT(*) FROM queue_items w
                WHERE w.status = 'waiting' AND w.queue_number < q.queue_number
            ) END AS position,
            q.created_at, q.updated_at
        FROM queue_items q
        WHERE q.queue_number::text ILIKE $1 ESCAPE '\'
           OR q.game_username ILIKE $1 ESCAPE '\'
           OR q.customer_name ILIKE $1 ESCAPE '\'
           OR q.contact_info ILIKE $1 ESCAPE '\'
        ORDER BY q.queue_number ASC
        "#,
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use redeemdesk_shared::QueueStatus;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("PlayerName"), "PlayerName");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\x"), "c:\\\\x");
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = redeemdesk_shared::create_pool(&url, 2)
            .await
            .expect("Failed to create pool");
        redeemdesk_shared::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_find_or_create_is_idempotent() {
        let pool = test_pool().await;
        let customer = format!("player{}", Uuid::new_v4().simple());

        let (first, created) = find_or_create_conversation(&pool, &customer, "Player")
            .await
            .unwrap();
        assert!(created);

        let (second, created) = find_or_create_conversation(&pool, &customer, "Player")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_concurrent_create_yields_one_conversation() {
        let pool = test_pool().await;
        let customer = format!("racer{}", Uuid::new_v4().simple());

        let (a, b) = tokio::join!(
            find_or_create_conversation(&pool, &customer, "A"),
            find_or_create_conversation(&pool, &customer, "B"),
        );
        assert_eq!(a.unwrap().0.id, b.unwrap().0.id);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_mark_read_only_touches_requested_authors() {
        let pool = test_pool().await;
        let customer = format!("reader{}", Uuid::new_v4().simple());
        let (conversation, _) = find_or_create_conversation(&pool, &customer, "R")
            .await
            .unwrap();

        for role in [SenderRole::Customer, SenderRole::Admin, SenderRole::Bot] {
            insert_message(
                &pool,
                NewMessage {
                    conversation_id: conversation.id,
                    sender_role: role,
                    sender_id: "x",
                    content: Some("hello"),
                    image_url: None,
                },
            )
            .await
            .unwrap();
        }

        let read = mark_read(&pool, conversation.id, &[SenderRole::Admin, SenderRole::Bot])
            .await
            .unwrap();
        assert_eq!(read.len(), 2);

        let again = mark_read(&pool, conversation.id, &[SenderRole::Admin, SenderRole::Bot])
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    /// Reserve a block of 100 queue numbers no other test run will touch
    fn queue_block() -> (i64, String) {
        let id = Uuid::new_v4();
        let base = ((id.as_u128() % 1_000_000_000) as i64) * 100 + 10_000_000_000;
        (base, id.simple().to_string()[..12].to_string())
    }

    async fn seed_queue_item(
        pool: &PgPool,
        queue_number: i64,
        status: QueueStatus,
        game_username: Option<&str>,
        customer_name: Option<&str>,
        contact_info: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO queue_items
                (queue_number, product_type, status, game_username, customer_name, contact_info)
            VALUES ($1, 'rov_account', $2, $3, $4, $5)
            "#,
        )
        .bind(queue_number)
        .bind(status.as_str())
        .bind(game_username)
        .bind(customer_name)
        .bind(contact_info)
        .execute(pool)
        .await
        .unwrap();
    }

    fn numbers(items: &[QueueItem], base: i64) -> Vec<i64> {
        items
            .iter()
            .map(|item| item.queue_number)
            .filter(|n| (base..base + 100).contains(n))
            .collect()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_search_queue_matches_every_field_case_insensitively() {
        let pool = test_pool().await;
        let (base, tok) = queue_block();
        let upper = tok.to_uppercase();

        seed_queue_item(
            &pool,
            base + 1,
            QueueStatus::Waiting,
            Some(&format!("PlayerName{upper}")),
            None,
            None,
        )
        .await;
        seed_queue_item(
            &pool,
            base + 2,
            QueueStatus::Waiting,
            None,
            Some(&format!("ลูกค้า {upper}")),
            None,
        )
        .await;
        seed_queue_item(
            &pool,
            base + 3,
            QueueStatus::Waiting,
            None,
            None,
            Some(&format!("line: {upper}")),
        )
        .await;
        seed_queue_item(&pool, base + 4, QueueStatus::Waiting, Some("nobody"), None, None).await;

        let items = search_queue(&pool, &tok).await.unwrap();
        assert_eq!(numbers(&items, base), vec![base + 1, base + 2, base + 3]);

        let items = search_queue(&pool, &format!("playername{tok}")).await.unwrap();
        assert_eq!(numbers(&items, base), vec![base + 1]);

        let items = search_queue(&pool, &(base + 4).to_string()).await.unwrap();
        assert_eq!(numbers(&items, base), vec![base + 4]);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_search_queue_treats_wildcards_literally() {
        let pool = test_pool().await;
        let (base, tok) = queue_block();

        seed_queue_item(
            &pool,
            base + 1,
            QueueStatus::Waiting,
            None,
            Some(&format!("100% {tok}")),
            None,
        )
        .await;
        seed_queue_item(
            &pool,
            base + 2,
            QueueStatus::Waiting,
            None,
            Some(&format!("1000 {tok}")),
            None,
        )
        .await;
        seed_queue_item(
            &pool,
            base + 3,
            QueueStatus::Waiting,
            Some(&format!("a_{tok}")),
            None,
            None,
        )
        .await;
        seed_queue_item(
            &pool,
            base + 4,
            QueueStatus::Waiting,
            Some(&format!("ab{tok}")),
            None,
            None,
        )
        .await;

        let items = search_queue(&pool, &format!("100% {tok}")).await.unwrap();
        assert_eq!(numbers(&items, base), vec![base + 1]);

        let items = search_queue(&pool, &format!("a_{tok}")).await.unwrap();
        assert_eq!(numbers(&items, base), vec![base + 3]);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_search_queue_position_counts_waiting_ahead() {
        let pool = test_pool().await;
        let (base, tok) = queue_block();
        let contact = format!("pos-{tok}");

        seed_queue_item(&pool, base + 1, QueueStatus::Waiting, None, None, Some(&contact)).await;
        seed_queue_item(&pool, base + 2, QueueStatus::Processing, None, None, Some(&contact)).await;
        seed_queue_item(&pool, base + 3, QueueStatus::Completed, None, None, Some(&contact)).await;
        seed_queue_item(&pool, base + 4, QueueStatus::Waiting, None, None, Some(&contact)).await;

        let items = search_queue(&pool, &contact).await.unwrap();
        assert_eq!(items.len(), 4);

        let first = items[0].position.unwrap();
        assert_eq!(items[1].position, None);
        assert_eq!(items[2].position, None);
        // Only the waiting item ahead counts
        assert_eq!(items[3].position, Some(first + 1));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_search_queue_returns_every_match() {
        let pool = test_pool().await;
        let (base, tok) = queue_block();

        for n in 1..=25 {
            seed_queue_item(
                &pool,
                base + n,
                QueueStatus::Waiting,
                Some(&format!("PlayerName{n}_{tok}")),
                None,
                None,
            )
            .await;
        }

        let items = search_queue(&pool, &format!("_{tok}")).await.unwrap();
        assert_eq!(numbers(&items, base), (base + 1..=base + 25).collect::<Vec<_>>());
    }
}
