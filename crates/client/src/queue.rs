//! Queue lookup

use redeemdesk_shared::{QueueItem, QueueStatus};
use std::sync::Arc;

use crate::{
    backend::DeskBackend,
    error::{ClientError, ClientResult},
};

/// Shown when nothing matches the query
pub const NOT_FOUND_MESSAGE: &str = "ไม่พบข้อมูลคิวที่ค้นหา กรุณาตรวจสอบข้อมูลอีกครั้ง";

/// Shown when the query is blank
pub const EMPTY_QUERY_MESSAGE: &str = "กรุณากรอกหมายเลขคิว ชื่อผู้ใช้ หรือช่องทางติดต่อ";

/// What the lookup found
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Exactly one match
    Selected(QueueItem),
    /// Several matches; the customer picks one
    Choose(Vec<QueueItem>),
    NotFound,
}

impl LookupOutcome {
    pub fn from_items(mut items: Vec<QueueItem>) -> Self {
        match items.len() {
            0 => LookupOutcome::NotFound,
            1 => match items.pop() {
                Some(item) => LookupOutcome::Selected(item),
                None => LookupOutcome::NotFound,
            },
            _ => LookupOutcome::Choose(items),
        }
    }

    /// Thai message to show instead of results
    pub fn message(&self) -> Option<&'static str> {
        match self {
            LookupOutcome::NotFound => Some(NOT_FOUND_MESSAGE),
            _ => None,
        }
    }
}

/// One-line Thai description of a queue entry for the results list
pub fn summary_line(item: &QueueItem) -> String {
    let mut line = format!("คิวที่ {} · {}", item.queue_number, item.status.label_th());
    if let Some(position) = item.position.filter(|_| item.status == QueueStatus::Waiting) {
        line.push_str(&format!(" (รออีก {} คิว)", position));
    }
    // Codes are only handed out once the request is finished
    if !item.status.is_open() {
        if let Some(code) = item.assigned_code.as_deref().filter(|c| !c.is_empty()) {
            line.push_str(&format!(" · โค้ด: {}", code));
        }
    }
    line
}

/// Customer-facing queue search
#[derive(Clone)]
pub struct QueueLookup {
    backend: Arc<dyn DeskBackend>,
}

impl QueueLookup {
    pub fn new(backend: Arc<dyn DeskBackend>) -> Self {
        Self { backend }
    }

    pub async fn lookup(&self, query: &str) -> ClientResult<LookupOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::Validation(EMPTY_QUERY_MESSAGE.into()));
        }

        let items = self.backend.lookup_queue(query).await?;
        tracing::debug!(results = items.len(), "Queue lookup finished");

        Ok(LookupOutcome::from_items(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use time::macros::datetime;
    use uuid::Uuid;

    fn item(number: i64, username: &str, name: &str, contact: &str) -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            queue_number: number,
            product_type: "rov_account".into(),
            status: QueueStatus::Waiting,
            game_username: Some(username.into()),
            customer_name: Some(name.into()),
            contact_info: Some(contact.into()),
            assigned_code: None,
            position: None,
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-01 10:00 UTC),
        }
    }

    fn lookup() -> QueueLookup {
        QueueLookup::new(Arc::new(InMemoryBackend::with_queue(vec![
            item(7, "someone", "Somchai", "line: playername_fan"),
            item(3, "PLAYERNAME", "Anan", "0812345678"),
            item(12, "other", "playername's brother", "fb"),
            item(20, "unrelated", "Nobody", "none"),
        ])))
    }

    #[tokio::test]
    async fn test_matches_every_searchable_field() {
        match lookup().lookup("PlayerName").await.unwrap() {
            LookupOutcome::Choose(items) => {
                let numbers: Vec<i64> = items.iter().map(|i| i.queue_number).collect();
                assert_eq!(numbers, vec![3, 7, 12]);
            }
            other => panic!("expected Choose, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_match_is_selected() {
        match lookup().lookup(" 081234 ").await.unwrap() {
            LookupOutcome::Selected(item) => assert_eq!(item.queue_number, 3),
            other => panic!("expected Selected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_and_empty_query() {
        let outcome = lookup().lookup("zzz").await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound);
        assert_eq!(outcome.message(), Some(NOT_FOUND_MESSAGE));

        assert!(matches!(
            lookup().lookup("   ").await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_many_matches_are_all_offered() {
        let items = (1..=25)
            .map(|n| item(n, &format!("PlayerName{n}"), "x", "y"))
            .collect();
        let lookup = QueueLookup::new(Arc::new(InMemoryBackend::with_queue(items)));

        match lookup.lookup("playername").await.unwrap() {
            LookupOutcome::Choose(items) => assert_eq!(items.len(), 25),
            other => panic!("expected Choose, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_line() {
        let mut waiting = item(7, "p", "n", "c");
        waiting.position = Some(2);
        assert_eq!(summary_line(&waiting), "คิวที่ 7 · รอดำเนินการ (รออีก 2 คิว)");

        let mut done = item(8, "p", "n", "c");
        done.status = QueueStatus::Completed;
        done.position = Some(5);
        assert_eq!(summary_line(&done), "คิวที่ 8 · เสร็จสิ้น");

        done.assigned_code = Some("ABCD-1234".into());
        assert_eq!(summary_line(&done), "คิวที่ 8 · เสร็จสิ้น · โค้ด: ABCD-1234");

        let mut processing = item(9, "p", "n", "c");
        processing.status = QueueStatus::Processing;
        processing.assigned_code = Some("EFGH-5678".into());
        assert_eq!(summary_line(&processing), "คิวที่ 9 · กำลังดำเนินการ");
    }
}
