//! 决策反应器与漂移校正
//!
//! 对每个到达的（去重后的）求值结果做出决策：立即提交、先亮出再排程锁定、
//! 只排程、或取消在途任务。每通道独占一个调度器槽位。
//!
//! 漂移校正：每个权威剩余时间信号到达时，用信号重算在途任务应剩的延迟并
//! retarget。只重定时，不改配置的基础延迟、不创建任务、不重启已触发的任务。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::PickStrategy;
use crate::session::{ActionKind, PhaseTimer, SessionSnapshot};

use super::executor::ActionExecutor;
use super::intent::{BanEvaluation, PickEvaluation};
use super::scheduler::DelaySlot;
use super::{Notice, UpcomingAction};

/// 把配置的总延迟按权威剩余时间收紧：不超过阶段剩余时间，且非负
///
/// 没有收到过剩余时间信号时，按配置值使用。
pub fn appropriate_delay_ms(total_delay_ms: i64, time_left_ms: Option<i64>) -> i64 {
    let total = total_delay_ms.max(0);
    match time_left_ms {
        Some(left) => total.min(left.max(0)),
        None => total,
    }
}

pub(crate) struct DecisionReactor {
    executor: Arc<ActionExecutor>,
    /// 决策时非响应式读取（当前选中英雄、自定义房间标志等），不触发重新求值
    session_rx: watch::Receiver<Option<SessionSnapshot>>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    pick_slot: DelaySlot,
    ban_slot: DelaySlot,
    upcoming_pick_tx: watch::Sender<Option<UpcomingAction>>,
    upcoming_ban_tx: watch::Sender<Option<UpcomingAction>>,
    /// 最近一次求值携带的配置延迟，漂移校正按这个总量重算
    pick_delay_ms: i64,
    ban_delay_ms: i64,
    /// 最近一次权威信号报告的剩余毫秒数
    last_time_left_ms: Option<i64>,
}

impl DecisionReactor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        executor: Arc<ActionExecutor>,
        session_rx: watch::Receiver<Option<SessionSnapshot>>,
        notice_tx: mpsc::UnboundedSender<Notice>,
        upcoming_pick_tx: watch::Sender<Option<UpcomingAction>>,
        upcoming_ban_tx: watch::Sender<Option<UpcomingAction>>,
    ) -> Self {
        Self {
            executor,
            session_rx,
            notice_tx,
            pick_slot: DelaySlot::new(),
            ban_slot: DelaySlot::new(),
            upcoming_pick_tx,
            upcoming_ban_tx,
            pick_delay_ms: 0,
            ban_delay_ms: 0,
            last_time_left_ms: None,
        }
    }

    fn cancel_pick_task(&self) {
        self.pick_slot.cancel();
        let _ = self.upcoming_pick_tx.send(None);
    }

    fn cancel_ban_task(&self) {
        self.ban_slot.cancel();
        let _ = self.upcoming_ban_tx.send(None);
    }

    /// 当前快照里自己已选中的英雄（无会话视为未选择）
    fn current_selection(&self) -> i64 {
        self.session_rx
            .borrow()
            .as_ref()
            .map(|s| s.my_champion_id())
            .unwrap_or(0)
    }

    /// Pick 通道状态机
    pub(crate) async fn handle_pick(&mut self, eval: PickEvaluation) {
        self.pick_delay_ms = eval.delay_ms;

        let Some(intent) = eval.intent else {
            // 意图消失：同一求值周期内清掉在途任务
            self.cancel_pick_task();
            return;
        };

        if intent.is_acting_now && intent.action_in_progress {
            match eval.strategy {
                PickStrategy::Show => {
                    if self.current_selection() != intent.champion_id {
                        self.cancel_pick_task();
                        self.executor
                            .commit(intent.champion_id, intent.action_id, false, ActionKind::Pick)
                            .await;
                    }
                }
                PickStrategy::LockIn => {
                    self.cancel_pick_task();
                    self.executor
                        .commit(intent.champion_id, intent.action_id, true, ActionKind::Pick)
                        .await;
                }
                PickStrategy::ShowDelayLockIn => {
                    // 亮出是有条件的（已是目标则跳过），排程是无条件的；
                    // 亮出先于取消/排程
                    if self.current_selection() != intent.champion_id {
                        self.executor
                            .commit(intent.champion_id, intent.action_id, false, ActionKind::Pick)
                            .await;
                    }

                    self.cancel_pick_task();
                    let delay_ms = appropriate_delay_ms(eval.delay_ms, self.last_time_left_ms);
                    tracing::info!(
                        "Added delayed pick task: {}ms (adjusted: {}ms), target champion: {}",
                        eval.delay_ms,
                        delay_ms,
                        self.executor.champion_label(intent.champion_id)
                    );
                    let _ = self.notice_tx.send(Notice::DelayedCommitScheduled {
                        kind: ActionKind::Pick,
                        champion_id: intent.champion_id,
                        champion: self.executor.champion_label(intent.champion_id),
                        delay_ms,
                    });
                    let _ = self.upcoming_pick_tx.send(Some(UpcomingAction {
                        kind: ActionKind::Pick,
                        champion_id: intent.champion_id,
                        due_at_epoch_ms: chrono::Utc::now().timestamp_millis() + delay_ms,
                    }));

                    let executor = Arc::clone(&self.executor);
                    let upcoming_tx = self.upcoming_pick_tx.clone();
                    let (champion_id, action_id) = (intent.champion_id, intent.action_id);
                    self.pick_slot
                        .schedule(
                            Box::pin(async move {
                                executor
                                    .commit(champion_id, action_id, true, ActionKind::Pick)
                                    .await;
                                let _ = upcoming_tx.send(None);
                            }),
                            delay_ms,
                            true,
                        )
                        .await;
                }
            }
            return;
        }

        if !intent.is_acting_now {
            if !eval.show_intent {
                return;
            }

            // 自定义房间不声明意向；已有选择也不再声明
            let (is_custom, already_targeted) = match self.session_rx.borrow().as_ref() {
                Some(s) => (
                    s.is_custom_game,
                    s.find_action(intent.action_id)
                        .map(|a| a.champion_id == intent.champion_id)
                        .unwrap_or(false),
                ),
                None => return,
            };
            if is_custom || self.current_selection() != 0 {
                return;
            }
            // 该 action 已指向目标英雄，避免冗余调用
            if already_targeted {
                return;
            }

            self.executor
                .declare_intent(intent.champion_id, intent.action_id)
                .await;
        }
    }

    /// Ban 通道状态机：只有「轮到自己且 action 开放」才排程，其余一律取消
    pub(crate) async fn handle_ban(&mut self, eval: BanEvaluation) {
        self.ban_delay_ms = eval.delay_ms;

        let Some(intent) = eval.intent else {
            self.cancel_ban_task();
            return;
        };

        if !(intent.is_acting_now && intent.action_in_progress) {
            self.cancel_ban_task();
            return;
        }

        self.cancel_ban_task();
        let delay_ms = appropriate_delay_ms(eval.delay_ms, self.last_time_left_ms);
        tracing::info!(
            "Added delayed ban task: {}ms (adjusted: {}ms), target champion: {}",
            eval.delay_ms,
            delay_ms,
            self.executor.champion_label(intent.champion_id)
        );
        let _ = self.notice_tx.send(Notice::DelayedCommitScheduled {
            kind: ActionKind::Ban,
            champion_id: intent.champion_id,
            champion: self.executor.champion_label(intent.champion_id),
            delay_ms,
        });
        let _ = self.upcoming_ban_tx.send(Some(UpcomingAction {
            kind: ActionKind::Ban,
            champion_id: intent.champion_id,
            due_at_epoch_ms: chrono::Utc::now().timestamp_millis() + delay_ms,
        }));

        let executor = Arc::clone(&self.executor);
        let upcoming_tx = self.upcoming_ban_tx.clone();
        let (champion_id, action_id) = (intent.champion_id, intent.action_id);
        self.ban_slot
            .schedule(
                Box::pin(async move {
                    executor
                        .commit(champion_id, action_id, true, ActionKind::Ban)
                        .await;
                    let _ = upcoming_tx.send(None);
                }),
                delay_ms,
                true,
            )
            .await;
    }

    /// 漂移校正：纯 retarget，不创建任务，不触发推导
    pub(crate) fn handle_timer_tick(&mut self, tick: Option<PhaseTimer>) {
        let Some(timer) = tick else { return };
        let time_left = timer.adjusted_time_left_in_phase;
        self.last_time_left_ms = Some(time_left);

        if self.pick_slot.is_armed() {
            let adjusted = appropriate_delay_ms(self.pick_delay_ms, Some(time_left));
            self.pick_slot.retarget(adjusted);
            let due = chrono::Utc::now().timestamp_millis() + adjusted;
            self.upcoming_pick_tx.send_modify(|u| {
                if let Some(u) = u {
                    u.due_at_epoch_ms = due;
                }
            });
        }

        if self.ban_slot.is_armed() {
            let adjusted = appropriate_delay_ms(self.ban_delay_ms, Some(time_left));
            self.ban_slot.retarget(adjusted);
            let due = chrono::Utc::now().timestamp_millis() + adjusted;
            self.upcoming_ban_tx.send_modify(|u| {
                if let Some(u) = u {
                    u.due_at_epoch_ms = due;
                }
            });
        }
    }
}

/// 反应器主循环：单一事件循环消费求值结果与剩余时间信号
///
/// 只有远端提交会挂起；两个通道互不阻塞对方的槽位操作。
pub(crate) fn spawn_reactor(
    mut reactor: DecisionReactor,
    mut pick_rx: mpsc::UnboundedReceiver<PickEvaluation>,
    mut ban_rx: mpsc::UnboundedReceiver<BanEvaluation>,
    mut timer_rx: watch::Receiver<Option<PhaseTimer>>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                eval = pick_rx.recv() => {
                    match eval {
                        Some(eval) => reactor.handle_pick(eval).await,
                        None => return,
                    }
                }
                eval = ban_rx.recv() => {
                    match eval {
                        Some(eval) => reactor.handle_ban(eval).await,
                        None => return,
                    }
                }
                changed = timer_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let tick = timer_rx.borrow_and_update().clone();
                    reactor.handle_timer_tick(tick);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appropriate_delay_without_signal_uses_config() {
        assert_eq!(appropriate_delay_ms(3000, None), 3000);
        assert_eq!(appropriate_delay_ms(-100, None), 0);
    }

    #[test]
    fn test_appropriate_delay_clamped_by_time_left() {
        assert_eq!(appropriate_delay_ms(2000, Some(1200)), 1200);
        assert_eq!(appropriate_delay_ms(2000, Some(5000)), 2000);
        // 阶段已经没时间了：立即执行而不是负延迟
        assert_eq!(appropriate_delay_ms(2000, Some(-300)), 0);
    }
}
