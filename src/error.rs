//! 错误类型
//!
//! 本子系统中没有致命错误：提交失败在 Executor 内部消化（记日志 + 发通知），
//! 不会向上抛出中断调度循环。

use thiserror::Error;

/// 自动 Ban/Pick 过程中可能出现的错误
#[derive(Error, Debug)]
pub enum SelectError {
    /// 会话客户端拒绝了提交（校验失败、action 已关闭等）
    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    /// 传输层失败（网络超时、连接断开）
    #[error("Session client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("Config error: {0}")]
    Config(String),
}
