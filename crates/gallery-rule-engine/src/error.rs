//! 规则引擎错误类型
//!
//! 评估路径从不返回错误（畸形输入按不匹配/空操作处理），
//! 这里的错误类型只服务于加载与存储边界。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则集 schema 版本不受支持: {found} (期望 {expected})")]
    UnsupportedSchemaVersion { found: u32, expected: u32 },

    #[error("规则反序列化失败: {0}")]
    InvalidRule(String),

    #[error("规则集未找到: shop={0}")]
    RuleSetNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
