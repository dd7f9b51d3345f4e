//! 自动 Ban/Pick 核心子系统
//!
//! 数据流：会话快照源 -> 意图推导 -> 决策反应器 -> { 远端执行器（直接提交） |
//! 单槽位调度器（延迟提交） }；剩余时间信号 -> 漂移校正 -> 调度器（仅 retarget）。
//!
//! - **scheduler**: 单槽位延迟任务调度器
//! - **intent**: 意图推导（结构化相等抑制冗余重算）
//! - **reactor**: 决策状态机 + 漂移校正
//! - **executor**: 远端动作执行器（best-effort，不重试）

pub mod executor;
pub mod intent;
pub mod reactor;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::SelectConfig;
use crate::session::{ActionKind, ChampionBook, PhaseTimer, SessionClient, SessionSnapshot};

use executor::ActionExecutor;
use reactor::DecisionReactor;

pub use intent::{derive_ban, derive_pick, BanEvaluation, Intent, PickEvaluation};
pub use scheduler::DelaySlot;

/// 已排程的延迟提交（对外可观测：目标英雄与绝对到期时刻）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcomingAction {
    pub kind: ActionKind,
    pub champion_id: i64,
    /// 到期的 epoch 毫秒时刻，漂移校正后会更新
    pub due_at_epoch_ms: i64,
}

/// 发给通知接收方的结构化事件
///
/// 文案格式化 / 本地化是接收方的事，这里只给内置可读消息。
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// 进入选人会话时播报一次启用了哪些自动化
    AutomationEnabled { pick: bool, ban: bool },
    /// 已排程延迟提交
    DelayedCommitScheduled {
        kind: ActionKind,
        champion_id: i64,
        champion: String,
        delay_ms: i64,
    },
    /// 提交失败（不重试，仅上报）
    CommitFailed {
        kind: ActionKind,
        champion_id: i64,
        champion: String,
        reason: String,
    },
}

impl Notice {
    /// 内置可读消息
    pub fn message(&self) -> String {
        match self {
            Notice::AutomationEnabled { pick, ban } => {
                let mut parts = Vec::new();
                if *pick {
                    parts.push("自动选择");
                }
                if *ban {
                    parts.push("自动禁用");
                }
                if parts.is_empty() {
                    "自动化未启用".to_string()
                } else {
                    format!("已启用 {}", parts.join(" | "))
                }
            }
            Notice::DelayedCommitScheduled {
                kind,
                champion,
                delay_ms,
                ..
            } => match kind {
                ActionKind::Ban => {
                    format!("将在 {:.1} 秒后禁用 {}", *delay_ms as f64 / 1000.0, champion)
                }
                _ => format!("将在 {:.1} 秒后锁定 {}", *delay_ms as f64 / 1000.0, champion),
            },
            Notice::CommitFailed {
                kind,
                champion,
                reason,
                ..
            } => match kind {
                ActionKind::Ban => format!("禁用 {} 失败: {}", champion, reason),
                _ => format!("选择 {} 失败: {}", champion, reason),
            },
        }
    }
}

/// 子系统对外句柄：外部协作方通过这些通道接入
///
/// - `session_tx`: 会话状态源推送完整快照（None 表示离开选人阶段）
/// - `timer_tx`: 权威剩余时间信号（只用于漂移校正）
/// - `config_tx`: 配置热更新入口
/// - `notice_rx`: 结构化通知事件流
/// - `upcoming_*_rx`: 每通道在途延迟提交的可观测状态
pub struct AutoSelectHandles {
    pub session_tx: watch::Sender<Option<SessionSnapshot>>,
    pub timer_tx: watch::Sender<Option<PhaseTimer>>,
    pub config_tx: watch::Sender<SelectConfig>,
    pub notice_rx: mpsc::UnboundedReceiver<Notice>,
    pub upcoming_pick_rx: watch::Receiver<Option<UpcomingAction>>,
    pub upcoming_ban_rx: watch::Receiver<Option<UpcomingAction>>,
    pub champions: ChampionBook,
    cancel: CancellationToken,
}

impl AutoSelectHandles {
    /// 停止推导与反应器循环
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for AutoSelectHandles {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 创建并启动自动 Ban/Pick 子系统：推导循环 + 反应器循环两个后台任务
pub fn spawn_auto_select(
    client: Arc<dyn SessionClient>,
    initial_config: SelectConfig,
) -> AutoSelectHandles {
    let (session_tx, session_rx) = watch::channel(None::<SessionSnapshot>);
    let (timer_tx, timer_rx) = watch::channel(None::<PhaseTimer>);
    let (config_tx, config_rx) = watch::channel(initial_config);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (upcoming_pick_tx, upcoming_pick_rx) = watch::channel(None::<UpcomingAction>);
    let (upcoming_ban_tx, upcoming_ban_rx) = watch::channel(None::<UpcomingAction>);
    let (pick_eval_tx, pick_eval_rx) = mpsc::unbounded_channel();
    let (ban_eval_tx, ban_eval_rx) = mpsc::unbounded_channel();

    let champions = ChampionBook::new();
    let cancel = CancellationToken::new();

    let executor = Arc::new(ActionExecutor::new(
        client,
        notice_tx.clone(),
        champions.clone(),
    ));

    intent::spawn_derivation(
        session_rx.clone(),
        config_rx,
        pick_eval_tx,
        ban_eval_tx,
        notice_tx.clone(),
        cancel.clone(),
    );

    let decision = DecisionReactor::new(
        executor,
        session_rx,
        notice_tx,
        upcoming_pick_tx,
        upcoming_ban_tx,
    );
    reactor::spawn_reactor(decision, pick_eval_rx, ban_eval_rx, timer_rx, cancel.clone());

    AutoSelectHandles {
        session_tx,
        timer_tx,
        config_tx,
        notice_rx,
        upcoming_pick_rx,
        upcoming_ban_rx,
        champions,
        cancel,
    }
}
