//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
///
/// 覆盖四个操作符族（字符串/数值/布尔/列表）以及时间族。
/// 同名操作符（如 equals、contains）由评估器按条件类型和字段
/// 分发到对应的族，族外操作符一律视为不匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 字符串族
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    MatchesRegex,
    InList,
    NotInList,

    // 数值族
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    Between,
    NotBetween,

    // 布尔族
    IsTrue,
    IsFalse,

    // 列表族
    ContainsAny,
    ContainsAll,
    IsEmpty,
    IsNotEmpty,

    // 时间族
    Before,
    After,
}

impl Operator {
    /// 上下文字段缺失时该操作符是否仍然成立
    ///
    /// 缺失字段的默认极性：否定类操作符（not_equals / not_contains /
    /// not_in_list）返回 true，其余一律 false。variant 条件在评估器中
    /// 另行覆盖为恒 false。
    pub fn holds_on_missing(self) -> bool {
        matches!(
            self,
            Self::NotEquals | Self::NotContains | Self::NotInList
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::MatchesRegex => "matches_regex",
            Self::InList => "in_list",
            Self::NotInList => "not_in_list",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEquals => "greater_than_or_equals",
            Self::LessThan => "less_than",
            Self::LessThanOrEquals => "less_than_or_equals",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
            Self::ContainsAny => "contains_any",
            Self::ContainsAll => "contains_all",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::Before => "before",
            Self::After => "after",
        };
        write!(f, "{}", s)
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}
