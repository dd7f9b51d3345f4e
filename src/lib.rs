//! Pickban - 英雄选择 Ban/Pick 自动化引擎
//!
//! 核心是延迟决策调度：从持续变化的会话状态推导当前意图（Pick / Ban 两条独立
//! 通道），按配置的策略立即提交、先亮出再延迟锁定、或延迟提交；意图变化时取消
//! 并替换在途任务，权威剩余时间信号到达时校正触发时刻。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与热更新
//! - **error**: 错误类型
//! - **observability**: 日志初始化
//! - **session**: 会话快照模型、剩余时间信号、远端客户端抽象
//! - **select**: 调度器、意图推导、决策反应器、执行器与装配入口
//!
//! 远端会话客户端、状态推送源、设置存储与展示层都是外部协作方，
//! 通过 [`select::spawn_auto_select`] 返回的通道句柄接入。

pub mod config;
pub mod error;
pub mod observability;
pub mod select;
pub mod session;

pub use config::{load_config, reload_config, AppConfig, PickStrategy, SelectConfig};
pub use error::SelectError;
pub use select::{spawn_auto_select, AutoSelectHandles, Notice, UpcomingAction};
pub use session::{ActionKind, ActionPayload, ChampionBook, PhaseTimer, SessionClient,
    SessionSnapshot};
