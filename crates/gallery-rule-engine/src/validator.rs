//! 规则保存期校验
//!
//! 供管理端在保存前调用，输出问题列表而不是抛错：Error 级建议
//! 阻止保存，Warning 级仅提示。评估路径对同样的数据始终容错，
//! 这里的校验只是帮商家提前发现问题。

use crate::evaluator::{self, MAX_REGEX_PATTERN_LEN};
use crate::models::{Action, Condition, ConditionGroup, ConditionNode, MediaMatchType, Rule};
use crate::operators::Operator;
use serde::Serialize;

/// 优先级允许的上限
pub const MAX_PRIORITY: i32 = 10_000;

/// 问题级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// 单条校验问题
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// 问题所在位置，如 "conditions[1]"、"actions[0]"
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// 规则校验器
pub struct RuleValidator;

impl RuleValidator {
    /// 校验单条规则，返回全部问题
    pub fn validate(rule: &Rule) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if rule.name.trim().is_empty() {
            issues.push(ValidationIssue::error("name", "规则名称不能为空"));
        }
        if rule.actions.is_empty() {
            issues.push(ValidationIssue::error("actions", "规则至少要有一个动作"));
        }
        if !(0..=MAX_PRIORITY).contains(&rule.priority) {
            issues.push(ValidationIssue::error(
                "priority",
                format!("优先级必须在 0 到 {} 之间", MAX_PRIORITY),
            ));
        }
        if let (Some(start), Some(end)) = (rule.start_date, rule.end_date) {
            if start > end {
                issues.push(ValidationIssue::warning(
                    "start_date",
                    "开始时间晚于结束时间，规则永远不会生效",
                ));
            }
        }

        Self::validate_group(&rule.conditions, "conditions", &mut issues);
        for (i, action) in rule.actions.iter().enumerate() {
            Self::validate_action(action, &format!("actions[{}]", i), &mut issues);
        }
        issues
    }

    /// 是否存在 Error 级问题
    pub fn has_errors(issues: &[ValidationIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }

    fn validate_group(group: &ConditionGroup, path: &str, issues: &mut Vec<ValidationIssue>) {
        for (i, node) in group.children.iter().enumerate() {
            let child_path = format!("{}[{}]", path, i);
            match node {
                ConditionNode::Group(g) => Self::validate_group(g, &child_path, issues),
                ConditionNode::Condition(c) => Self::validate_condition(c, &child_path, issues),
            }
        }
    }

    fn validate_condition(condition: &Condition, path: &str, issues: &mut Vec<ValidationIssue>) {
        let params = match condition {
            Condition::AbTest(p) => {
                if p.bucket_min > p.bucket_max {
                    issues.push(ValidationIssue::error(
                        path,
                        "分桶下界不能大于上界",
                    ));
                }
                if p.bucket_max > 99 {
                    issues.push(ValidationIssue::error(path, "分桶上界不能超过 99"));
                }
                return;
            }
            Condition::Variant(p)
            | Condition::Url(p)
            | Condition::Device(p)
            | Condition::Customer(p)
            | Condition::Time(p)
            | Condition::Geo(p)
            | Condition::Inventory(p)
            | Condition::TrafficSource(p)
            | Condition::Session(p)
            | Condition::Collection(p)
            | Condition::Product(p) => p,
        };

        if matches!(params.operator, Operator::Between | Operator::NotBetween)
            && params.value_end.is_none()
        {
            issues.push(ValidationIssue::error(
                path,
                "between/not_between 需要同时提供 value 和 value_end",
            ));
        }

        if params.operator == Operator::MatchesRegex {
            let Some(pattern) = params.value.as_str() else {
                issues.push(ValidationIssue::error(path, "正则条件的值必须是字符串"));
                return;
            };
            if pattern.chars().count() > MAX_REGEX_PATTERN_LEN {
                issues.push(ValidationIssue::error(
                    path,
                    format!("正则长度不能超过 {} 字符", MAX_REGEX_PATTERN_LEN),
                ));
            } else if evaluator::looks_unsafe(pattern) {
                // 评估期会按不命中处理，这里提前提示商家
                issues.push(ValidationIssue::warning(path, "正则形态疑似危险，评估时不会命中"));
            } else if evaluator::compile_regex(pattern).is_none() {
                issues.push(ValidationIssue::error(path, "正则无法编译"));
            }
        }
    }

    fn validate_action(action: &Action, path: &str, issues: &mut Vec<ValidationIssue>) {
        match action {
            Action::Filter { matcher, .. } | Action::Prioritize { matcher } => {
                Self::check_matcher(Some(matcher), path, issues);
            }
            Action::Reorder { matcher, .. } => {
                Self::check_matcher(matcher.as_ref(), path, issues);
            }
            Action::Badge { text, matcher, .. } => {
                if text.trim().is_empty() {
                    issues.push(ValidationIssue::error(path, "徽章文案不能为空"));
                }
                Self::check_matcher(matcher.as_ref(), path, issues);
            }
            Action::Limit {
                max_images,
                matcher,
                ..
            } => {
                if *max_images == 0 {
                    issues.push(ValidationIssue::error(path, "max_images 必须大于 0"));
                }
                Self::check_matcher(matcher.as_ref(), path, issues);
            }
            Action::Replace { source_id } => {
                if source_id.trim().is_empty() {
                    issues.push(ValidationIssue::error(path, "替换来源画廊不能为空"));
                }
            }
        }
    }

    fn check_matcher(
        matcher: Option<&crate::models::MediaMatcher>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        // universal 匹配不看 match_values，其余类型列表为空时永远不命中
        if let Some(m) = matcher {
            if m.match_type != MediaMatchType::Universal && m.match_values.is_empty() {
                issues.push(ValidationIssue::warning(
                    path,
                    "匹配值列表为空，该动作不会命中任何媒体",
                ));
            }
        }
    }
}
