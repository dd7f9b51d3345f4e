//! 远端动作执行器
//!
//! 对会话客户端的一次性 best-effort 提交：失败只记日志 + 发结构化通知，
//! 不重试、不向调度器回抛（延迟任务即使提交失败也算完成了生命周期）。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::{ActionKind, ActionPayload, ChampionBook, SessionClient};

use super::Notice;

pub struct ActionExecutor {
    client: Arc<dyn SessionClient>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    champions: ChampionBook,
}

impl ActionExecutor {
    pub fn new(
        client: Arc<dyn SessionClient>,
        notice_tx: mpsc::UnboundedSender<Notice>,
        champions: ChampionBook,
    ) -> Self {
        Self {
            client,
            notice_tx,
            champions,
        }
    }

    pub fn champion_label(&self, champion_id: i64) -> String {
        self.champions.label(champion_id)
    }

    /// 提交一次 Pick/Ban（`finalize` 为 true 表示锁定，false 表示仅亮出）
    ///
    /// 失败在此消化：结构化事件 + 可读消息 + warn 日志，然后返回。
    pub async fn commit(&self, champion_id: i64, action_id: i64, finalize: bool, kind: ActionKind) {
        tracing::info!(
            "Committing {}: {} (action_id={}, finalize={})",
            kind.label(),
            self.champions.label(champion_id),
            action_id,
            finalize
        );

        let payload = ActionPayload {
            champion_id,
            completed: Some(finalize),
            kind: Some(kind),
        };
        if let Err(e) = self.client.commit_action(action_id, &payload).await {
            self.report_failure(kind, champion_id, e.to_string());
        }
    }

    /// 未轮到自己时声明意向（预亮，不携带锁定语义）
    pub async fn declare_intent(&self, champion_id: i64, action_id: i64) {
        tracing::info!(
            "Declaring intent: {} (action_id={})",
            self.champions.label(champion_id),
            action_id
        );

        let payload = ActionPayload {
            champion_id,
            completed: None,
            kind: None,
        };
        if let Err(e) = self.client.commit_action(action_id, &payload).await {
            self.report_failure(ActionKind::Pick, champion_id, e.to_string());
        }
    }

    fn report_failure(&self, kind: ActionKind, champion_id: i64, reason: String) {
        tracing::warn!(
            "Failed to {}, target champion: {} ({})",
            kind.label(),
            champion_id,
            reason
        );
        let _ = self.notice_tx.send(Notice::CommitFailed {
            kind,
            champion_id,
            champion: self.champions.label(champion_id),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SelectError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingClient;

    #[async_trait]
    impl SessionClient for FailingClient {
        async fn commit_action(
            &self,
            _action_id: i64,
            _payload: &ActionPayload,
        ) -> Result<(), SelectError> {
            Err(SelectError::CommitRejected("action is closed".into()))
        }
    }

    struct RecordingClient {
        calls: Mutex<Vec<(i64, ActionPayload)>>,
    }

    #[async_trait]
    impl SessionClient for RecordingClient {
        async fn commit_action(
            &self,
            action_id: i64,
            payload: &ActionPayload,
        ) -> Result<(), SelectError> {
            self.calls.lock().unwrap().push((action_id, payload.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commit_failure_emits_notice_and_returns() {
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let book = ChampionBook::new();
        book.insert(103, "阿狸");
        let exec = ActionExecutor::new(Arc::new(FailingClient), notice_tx, book);

        exec.commit(103, 10, true, ActionKind::Pick).await;

        match notice_rx.try_recv().unwrap() {
            Notice::CommitFailed {
                kind,
                champion_id,
                champion,
                reason,
            } => {
                assert_eq!(kind, ActionKind::Pick);
                assert_eq!(champion_id, 103);
                assert_eq!(champion, "阿狸");
                assert!(reason.contains("action is closed"));
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_declare_intent_sends_hover_payload() {
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let client = Arc::new(RecordingClient {
            calls: Mutex::new(vec![]),
        });
        let exec = ActionExecutor::new(client.clone(), notice_tx, ChampionBook::new());

        exec.declare_intent(238, 7).await;

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 7);
        assert_eq!(calls[0].1.champion_id, 238);
        assert!(calls[0].1.completed.is_none());
        assert!(calls[0].1.kind.is_none());
    }
}
