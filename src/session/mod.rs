//! 会话模型与外部接口
//!
//! - **SessionSnapshot**: 选人会话的结构化快照（来自外部推送源，camelCase 线格式）
//! - **PhaseTimer**: 权威的阶段剩余时间信号（只用于漂移校正，不触发意图推导）
//! - **SessionClient**: 远端会话客户端抽象（提交 Pick/Ban 的唯一出口）
//! - **ChampionBook**: 英雄 ID -> 名称 的共享查询表（仅用于日志与通知的可读化）

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SelectError;

/// action 类型（线格式为小写字符串，未知类型归入 Other）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Pick,
    Ban,
    #[serde(other)]
    Other,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Pick => "pick",
            ActionKind::Ban => "ban",
            ActionKind::Other => "other",
        }
    }
}

/// 会话中的一个 action 槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionSlot {
    pub id: i64,
    pub actor_cell_id: i64,
    pub champion_id: i64,
    pub completed: bool,
    pub is_in_progress: bool,
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

impl Default for ActionSlot {
    fn default() -> Self {
        Self {
            id: 0,
            actor_cell_id: -1,
            champion_id: 0,
            completed: false,
            is_in_progress: false,
            kind: ActionKind::Other,
        }
    }
}

/// 队伍成员
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMember {
    pub cell_id: i64,
    /// 已锁定/已亮出的英雄，0 表示未选择
    pub champion_id: i64,
    /// 意向英雄（其他人声明的预选），0 表示无
    pub champion_pick_intent: i64,
    pub assigned_position: String,
}

/// 阶段计时信息：权威剩余时间信号
///
/// 到达节奏不规律，按 best-effort 处理；只用来重算已排程任务的触发时刻。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseTimer {
    /// PLANNING / BAN_PICK / BANNING / PICKING 等
    pub phase: String,
    /// 当前阶段剩余毫秒数
    pub adjusted_time_left_in_phase: i64,
}

impl PhaseTimer {
    /// PLANNING 为意向阶段：所有人同时预选，不算真正轮到自己
    pub fn is_planning(&self) -> bool {
        self.phase == "PLANNING"
    }
}

/// 选人会话快照（外部推送源每次送达完整快照）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSnapshot {
    pub local_player_cell_id: i64,
    pub is_custom_game: bool,
    /// 大乱斗板凳席模式：没有 Ban/Pick 轮次，本子系统不处理
    pub bench_enabled: bool,
    pub my_team: Vec<TeamMember>,
    /// 与线格式一致的嵌套分组（每组为同时进行的一批 action）
    pub actions: Vec<Vec<ActionSlot>>,
    pub timer: PhaseTimer,
}

impl SessionSnapshot {
    /// 本地玩家的队伍条目
    pub fn member_me(&self) -> Option<&TeamMember> {
        self.my_team
            .iter()
            .find(|m| m.cell_id == self.local_player_cell_id)
    }

    /// 本地玩家当前选中的英雄（0 = 未选择）
    pub fn my_champion_id(&self) -> i64 {
        self.member_me().map(|m| m.champion_id).unwrap_or(0)
    }

    /// 遍历所有 action（拍平嵌套分组）
    pub fn all_actions(&self) -> impl Iterator<Item = &ActionSlot> {
        self.actions.iter().flatten()
    }

    /// 本地玩家第一个未完成的指定类型 action
    pub fn my_open_action(&self, kind: ActionKind) -> Option<&ActionSlot> {
        self.all_actions().find(|a| {
            a.actor_cell_id == self.local_player_cell_id && a.kind == kind && !a.completed
        })
    }

    pub fn find_action(&self, action_id: i64) -> Option<&ActionSlot> {
        self.all_actions().find(|a| a.id == action_id)
    }

    /// 已被锁定占用的英雄（完成的 pick/ban 都不可再选）
    pub fn unavailable_champions(&self) -> impl Iterator<Item = i64> + '_ {
        self.all_actions()
            .filter(|a| a.completed && a.champion_id > 0)
            .map(|a| a.champion_id)
    }

    /// 队友声明的意向英雄（禁用时避开，防止 Ban 掉队友想玩的）
    pub fn teammate_pick_intents(&self) -> impl Iterator<Item = i64> + '_ {
        self.my_team
            .iter()
            .filter(move |m| m.cell_id != self.local_player_cell_id)
            .map(|m| m.champion_pick_intent)
            .filter(|&id| id > 0)
    }

    pub fn has_ban_actions(&self) -> bool {
        self.all_actions().any(|a| a.kind == ActionKind::Ban)
    }
}

/// 提交 action 的载荷（与远端 PATCH 语义一致）
///
/// `completed` 为 None 时表示仅声明意向（预亮），不携带锁定语义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub champion_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActionKind>,
}

/// 远端会话客户端抽象
///
/// 黑盒处理：失败原因任意（网络、校验、过期状态），本子系统不重试。
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// 对指定 action 提交一次修改（亮出 / 锁定 / 禁用）
    async fn commit_action(&self, action_id: i64, payload: &ActionPayload)
        -> Result<(), SelectError>;
}

/// 英雄 ID -> 名称 的共享查询表
///
/// 查不到时回退为数字 ID 字符串，仅影响日志与通知的可读性。
#[derive(Clone, Default)]
pub struct ChampionBook {
    names: Arc<RwLock<HashMap<i64, String>>>,
}

impl ChampionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: i64, name: impl Into<String>) {
        self.names.write().unwrap().insert(id, name.into());
    }

    pub fn replace_all(&self, entries: HashMap<i64, String>) {
        *self.names.write().unwrap() = entries;
    }

    /// 可读名称，查不到时返回数字 ID
    pub fn label(&self, id: i64) -> String {
        self.names
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session_json() -> &'static str {
        r#"{
            "localPlayerCellId": 2,
            "isCustomGame": false,
            "benchEnabled": false,
            "myTeam": [
                {"cellId": 0, "championId": 0, "championPickIntent": 157, "assignedPosition": "top"},
                {"cellId": 2, "championId": 0, "championPickIntent": 0, "assignedPosition": "middle"}
            ],
            "actions": [
                [
                    {"id": 1, "actorCellId": 0, "championId": 55, "completed": true, "isInProgress": false, "type": "ban"},
                    {"id": 2, "actorCellId": 2, "championId": 0, "completed": false, "isInProgress": true, "type": "ban"}
                ],
                [
                    {"id": 10, "actorCellId": 2, "championId": 0, "completed": false, "isInProgress": false, "type": "pick"}
                ]
            ],
            "timer": {"phase": "BAN_PICK", "adjustedTimeLeftInPhase": 27000}
        }"#
    }

    #[test]
    fn test_snapshot_wire_format() {
        let snap: SessionSnapshot = serde_json::from_str(sample_session_json()).unwrap();
        assert_eq!(snap.local_player_cell_id, 2);
        assert!(!snap.timer.is_planning());
        assert_eq!(snap.timer.adjusted_time_left_in_phase, 27000);

        let ban = snap.my_open_action(ActionKind::Ban).unwrap();
        assert_eq!(ban.id, 2);
        assert!(ban.is_in_progress);

        let pick = snap.my_open_action(ActionKind::Pick).unwrap();
        assert_eq!(pick.id, 10);
        assert!(!pick.is_in_progress);
    }

    #[test]
    fn test_snapshot_helpers() {
        let snap: SessionSnapshot = serde_json::from_str(sample_session_json()).unwrap();
        assert_eq!(snap.my_champion_id(), 0);
        assert_eq!(snap.unavailable_champions().collect::<Vec<_>>(), vec![55]);
        assert_eq!(snap.teammate_pick_intents().collect::<Vec<_>>(), vec![157]);
        assert!(snap.has_ban_actions());
    }

    #[test]
    fn test_unknown_action_type_maps_to_other() {
        let json = r#"{"id": 7, "actorCellId": 1, "championId": 0, "completed": false, "isInProgress": false, "type": "ten_bans_reveal"}"#;
        let slot: ActionSlot = serde_json::from_str(json).unwrap();
        assert_eq!(slot.kind, ActionKind::Other);
    }

    #[test]
    fn test_payload_omits_absent_fields() {
        let hover = ActionPayload {
            champion_id: 103,
            completed: None,
            kind: None,
        };
        let json = serde_json::to_value(&hover).unwrap();
        assert_eq!(json, serde_json::json!({"championId": 103}));

        let lock = ActionPayload {
            champion_id: 103,
            completed: Some(true),
            kind: Some(ActionKind::Pick),
        };
        let json = serde_json::to_value(&lock).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"championId": 103, "completed": true, "type": "pick"})
        );
    }

    #[test]
    fn test_champion_book_fallback() {
        let book = ChampionBook::new();
        book.insert(103, "阿狸");
        assert_eq!(book.label(103), "阿狸");
        assert_eq!(book.label(999), "999");
    }

    #[test]
    fn test_champion_book_bulk_replace() {
        let book = ChampionBook::new();
        book.insert(103, "旧名称");

        let mut entries = HashMap::new();
        entries.insert(103, "阿狸".to_string());
        entries.insert(238, "劫".to_string());
        book.replace_all(entries);

        assert_eq!(book.label(103), "阿狸");
        assert_eq!(book.label(238), "劫");
    }
}
