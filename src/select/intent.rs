//! 意图推导
//!
//! 把（会话快照, 配置）求值为每通道一个规范化的意图值，纯函数部分无需运行时即可测试。
//! 推导循环监听 session/config 两个 watch 通道，任一输入变化即重算；
//! 求值结果与上一次做结构化相等比较，未变化则抑制下游通知 ——
//! 没有这层抑制，无关的状态抖动会反复取消/重排在途任务。

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{PickStrategy, SelectConfig};
use crate::session::{ActionKind, SessionSnapshot};

use super::Notice;

/// 单通道意图：要操作的英雄与绑定的 action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub champion_id: i64,
    pub action_id: i64,
    /// 当前是否轮到自己执行该 action（意向阶段 PLANNING 不算）
    pub is_acting_now: bool,
    /// 绑定的 action 槽位是否仍可修改
    pub action_in_progress: bool,
}

/// Pick 通道的一次求值结果：意图 + 决策所需的配置快照
///
/// 比较口径与求值三元组一致（意图、策略、延迟），任一变化都要重新决策。
#[derive(Debug, Clone, PartialEq)]
pub struct PickEvaluation {
    pub intent: Option<Intent>,
    pub strategy: PickStrategy,
    pub delay_ms: i64,
    pub show_intent: bool,
}

/// Ban 通道的一次求值结果
#[derive(Debug, Clone, PartialEq)]
pub struct BanEvaluation {
    pub intent: Option<Intent>,
    pub delay_ms: i64,
}

/// 推导 Pick 意图
///
/// 通道关闭、板凳席模式、没有本地玩家、没有未完成的 pick action，均无意图。
/// 目标英雄取该位置候选列表中第一个仍可用的。
pub fn derive_pick(snapshot: &SessionSnapshot, config: &SelectConfig) -> Option<Intent> {
    if !config.pick_enabled || snapshot.bench_enabled {
        return None;
    }
    let me = snapshot.member_me()?;
    let action = snapshot.my_open_action(ActionKind::Pick)?;

    let taken: Vec<i64> = snapshot.unavailable_champions().collect();
    let target = config
        .pick_candidates(&me.assigned_position.to_lowercase())
        .iter()
        .copied()
        .find(|id| *id > 0 && !taken.contains(id))?;

    Some(Intent {
        champion_id: target,
        action_id: action.id,
        is_acting_now: action.is_in_progress && !snapshot.timer.is_planning(),
        action_in_progress: !action.completed,
    })
}

/// 推导 Ban 意图
///
/// 除 Pick 的过滤外，还要避开队友声明的意向英雄（别 Ban 队友想玩的）。
pub fn derive_ban(snapshot: &SessionSnapshot, config: &SelectConfig) -> Option<Intent> {
    if !config.ban_enabled || snapshot.bench_enabled {
        return None;
    }
    let me = snapshot.member_me()?;
    let action = snapshot.my_open_action(ActionKind::Ban)?;

    let taken: Vec<i64> = snapshot.unavailable_champions().collect();
    let teammate_intents: Vec<i64> = snapshot.teammate_pick_intents().collect();
    let target = config
        .ban_candidates(&me.assigned_position.to_lowercase())
        .iter()
        .copied()
        .find(|id| *id > 0 && !taken.contains(id) && !teammate_intents.contains(id))?;

    Some(Intent {
        champion_id: target,
        action_id: action.id,
        is_acting_now: action.is_in_progress && !snapshot.timer.is_planning(),
        action_in_progress: !action.completed,
    })
}

pub fn evaluate_pick(snapshot: Option<&SessionSnapshot>, config: &SelectConfig) -> PickEvaluation {
    PickEvaluation {
        intent: snapshot.and_then(|s| derive_pick(s, config)),
        strategy: config.pick_strategy,
        delay_ms: config.lock_in_delay_ms(),
        show_intent: config.show_intent,
    }
}

pub fn evaluate_ban(snapshot: Option<&SessionSnapshot>, config: &SelectConfig) -> BanEvaluation {
    BanEvaluation {
        intent: snapshot.and_then(|s| derive_ban(s, config)),
        delay_ms: config.ban_delay_ms(),
    }
}

/// 推导循环：session/config 任一变化即重算两个通道，只在值变化时转发给 Reactor
///
/// 转发通道为无界 mpsc，保证按观察顺序送达。剩余时间信号不在监听范围内 ——
/// 它只走漂移校正，不触发推导。
pub fn spawn_derivation(
    mut session_rx: watch::Receiver<Option<SessionSnapshot>>,
    mut config_rx: watch::Receiver<SelectConfig>,
    pick_tx: mpsc::UnboundedSender<PickEvaluation>,
    ban_tx: mpsc::UnboundedSender<BanEvaluation>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut last_pick: Option<PickEvaluation> = None;
        let mut last_ban: Option<BanEvaluation> = None;
        let mut in_session = false;

        loop {
            {
                let snapshot = session_rx.borrow_and_update().clone();
                let config = config_rx.borrow_and_update().clone();

                // 新会话开始：播报一次启用了哪些自动化
                match &snapshot {
                    Some(s) if !s.actions.is_empty() => {
                        if !in_session {
                            in_session = true;
                            let _ = notice_tx.send(Notice::AutomationEnabled {
                                pick: config.pick_enabled,
                                ban: config.ban_enabled && s.has_ban_actions(),
                            });
                        }
                    }
                    _ => in_session = false,
                }

                let pick_eval = evaluate_pick(snapshot.as_ref(), &config);
                if last_pick.as_ref() != Some(&pick_eval) {
                    last_pick = Some(pick_eval.clone());
                    if pick_tx.send(pick_eval).is_err() {
                        return;
                    }
                } else {
                    tracing::debug!("Pick evaluation unchanged, suppressed");
                }

                let ban_eval = evaluate_ban(snapshot.as_ref(), &config);
                if last_ban.as_ref() != Some(&ban_eval) {
                    last_ban = Some(ban_eval.clone());
                    if ban_tx.send(ban_eval).is_err() {
                        return;
                    }
                } else {
                    tracing::debug!("Ban evaluation unchanged, suppressed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    });
}
