//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PICKBAN__*` 覆盖（双下划线表示嵌套，
//! 如 `PICKBAN__SELECT__PICK_STRATEGY=lock-in`）。
//!
//! 热更新：调用方重新加载后把新的 [`SelectConfig`] 发送到 `config_tx`，
//! 意图推导会立即用新配置重新求值。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SelectError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub select: SelectConfig,
}

/// Pick 策略
///
/// - `Show`：轮到自己时只亮出目标，不锁定
/// - `LockIn`：轮到自己时立即锁定
/// - `ShowDelayLockIn`：先亮出，再在配置的延迟后锁定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PickStrategy {
    Show,
    LockIn,
    ShowDelayLockIn,
}

impl Default for PickStrategy {
    fn default() -> Self {
        Self::ShowDelayLockIn
    }
}

/// [select] 段：策略、延迟与按位置的候选英雄
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectConfig {
    /// 自动 Pick 开关
    #[serde(default = "default_enabled")]
    pub pick_enabled: bool,
    /// 自动 Ban 开关
    #[serde(default = "default_enabled")]
    pub ban_enabled: bool,
    /// 未轮到自己时是否预亮意向英雄
    #[serde(default = "default_enabled")]
    pub show_intent: bool,
    #[serde(default)]
    pub pick_strategy: PickStrategy,
    /// 延迟锁定前等待的秒数（负值按 0 处理）
    #[serde(default = "default_lock_in_delay")]
    pub lock_in_delay_seconds: f64,
    /// 延迟禁用前等待的秒数（负值按 0 处理）
    #[serde(default = "default_ban_delay")]
    pub ban_delay_seconds: f64,
    /// 位置 -> 候选 Pick 英雄（按优先级排列），如 "top" = [266, 24]
    #[serde(default)]
    pub expected_picks: HashMap<String, Vec<i64>>,
    /// 位置 -> 候选 Ban 英雄（按优先级排列）
    #[serde(default)]
    pub expected_bans: HashMap<String, Vec<i64>>,
}

fn default_enabled() -> bool {
    true
}

fn default_lock_in_delay() -> f64 {
    3.0
}

fn default_ban_delay() -> f64 {
    2.0
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            pick_enabled: true,
            ban_enabled: true,
            show_intent: true,
            pick_strategy: PickStrategy::default(),
            lock_in_delay_seconds: default_lock_in_delay(),
            ban_delay_seconds: default_ban_delay(),
            expected_picks: HashMap::new(),
            expected_bans: HashMap::new(),
        }
    }
}

impl SelectConfig {
    /// 锁定延迟（毫秒，非负）
    pub fn lock_in_delay_ms(&self) -> i64 {
        (self.lock_in_delay_seconds.max(0.0) * 1000.0) as i64
    }

    /// 禁用延迟（毫秒，非负）
    pub fn ban_delay_ms(&self) -> i64 {
        (self.ban_delay_seconds.max(0.0) * 1000.0) as i64
    }

    /// 指定位置的候选列表（位置未配置时回退到 "default" 键）
    pub fn pick_candidates(&self, position: &str) -> &[i64] {
        lookup_candidates(&self.expected_picks, position)
    }

    pub fn ban_candidates(&self, position: &str) -> &[i64] {
        lookup_candidates(&self.expected_bans, position)
    }
}

fn lookup_candidates<'a>(map: &'a HashMap<String, Vec<i64>>, position: &str) -> &'a [i64] {
    if !position.is_empty() {
        if let Some(list) = map.get(position) {
            return list;
        }
    }
    map.get("default").map(|v| v.as_slice()).unwrap_or(&[])
}

/// 从 config 目录加载配置，环境变量 PICKBAN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PICKBAN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, SelectError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PICKBAN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder
        .build()
        .map_err(|e| SelectError::Config(e.to_string()))?;
    c.try_deserialize()
        .map_err(|e| SelectError::Config(e.to_string()))
}

/// 重新从磁盘与环境变量加载配置（配置热更新：调用方拿到新配置后发送到 config_tx 即生效）
pub fn reload_config() -> Result<AppConfig, SelectError> {
    load_config(None)
}
