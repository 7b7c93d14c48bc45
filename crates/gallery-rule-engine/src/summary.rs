//! 规则摘要
//!
//! 把规则渲染成商家可读的一句话描述，管理端列表页展示用。
//! 对条件和动作做穷尽匹配，是 tagged union 的第三个消费端。

use crate::models::{
    Action, BadgeTarget, Condition, ConditionGroup, ConditionNode, FilterMode, LimitKeep,
    MediaMatchType, ReorderStrategy, Rule,
};
use crate::operators::{LogicalOperator, Operator};
use serde_json::Value;

/// 渲染整条规则："当 <条件> 时，<动作>；<动作>"
pub fn summarize_rule(rule: &Rule) -> String {
    let conditions = summarize_group(&rule.conditions);
    let actions: Vec<String> = rule.actions.iter().map(summarize_action).collect();
    if actions.is_empty() {
        return format!("当{}时，不做任何处理", conditions);
    }
    format!("当{}时，{}", conditions, actions.join("；"))
}

/// 渲染条件组
pub fn summarize_group(group: &ConditionGroup) -> String {
    if group.children.is_empty() {
        return "任何访问".to_string();
    }
    let joiner = match group.operator {
        LogicalOperator::And => " 且 ",
        LogicalOperator::Or => " 或 ",
    };
    let parts: Vec<String> = group
        .children
        .iter()
        .map(|node| match node {
            ConditionNode::Group(g) => format!("({})", summarize_group(g)),
            ConditionNode::Condition(c) => summarize_condition(c),
        })
        .collect();
    parts.join(joiner)
}

/// 渲染单个叶子条件
pub fn summarize_condition(condition: &Condition) -> String {
    let body = match condition {
        Condition::AbTest(p) => {
            format!("访客分桶在 {} 到 {} 之间", p.bucket_min, p.bucket_max)
        }
        Condition::Variant(p) => describe("所选款式", p),
        Condition::Url(p) => describe("页面地址", p),
        Condition::Device(p) => describe("访问设备", p),
        Condition::Customer(p) => describe("客户", p),
        Condition::Time(p) => describe("访问时间", p),
        Condition::Geo(p) => describe("访客地区", p),
        Condition::Inventory(p) => describe("库存", p),
        Condition::TrafficSource(p) => describe("流量来源", p),
        Condition::Session(p) => describe("会话", p),
        Condition::Collection(p) => describe("集合", p),
        Condition::Product(p) => describe("商品", p),
    };
    if condition.negate() {
        format!("并非（{}）", body)
    } else {
        body
    }
}

fn describe(subject: &str, params: &crate::models::ConditionParams) -> String {
    let field = if params.field.is_empty() {
        String::new()
    } else {
        format!("的 {} ", params.field)
    };
    match (&params.operator, &params.value_end) {
        (Operator::Between, Some(end)) => format!(
            "{}{}在 {} 到 {} 之间",
            subject,
            field,
            render_value(&params.value),
            render_value(end)
        ),
        (Operator::NotBetween, Some(end)) => format!(
            "{}{}不在 {} 到 {} 之间",
            subject,
            field,
            render_value(&params.value),
            render_value(end)
        ),
        _ => format!(
            "{}{}{} {}",
            subject,
            field,
            operator_label(params.operator),
            render_value(&params.value)
        ),
    }
}

/// 渲染单个动作
pub fn summarize_action(action: &Action) -> String {
    match action {
        Action::Filter { mode, matcher } => {
            let target = matcher_label(matcher);
            match mode {
                FilterMode::Include => format!("只展示{}", target),
                FilterMode::Exclude => format!("隐藏{}", target),
            }
        }
        Action::Reorder {
            strategy, matcher, ..
        } => {
            let target = matcher
                .as_ref()
                .map(matcher_label)
                .unwrap_or_else(|| "媒体".to_string());
            match strategy {
                ReorderStrategy::MoveToFront => format!("把{}移到最前", target),
                ReorderStrategy::MoveToBack => format!("把{}移到最后", target),
                ReorderStrategy::Shuffle => "随机打乱展示顺序".to_string(),
                ReorderStrategy::Reverse => "倒序展示".to_string(),
                ReorderStrategy::SortByTagOrder => "按标签顺序排序".to_string(),
            }
        }
        Action::Prioritize { matcher } => format!("优先展示{}", matcher_label(matcher)),
        Action::Badge { text, target, .. } => {
            let scope = match target {
                BadgeTarget::All => "所有可见媒体",
                BadgeTarget::First => "第一张媒体",
                BadgeTarget::Last => "最后一张媒体",
                BadgeTarget::Matched => "命中的媒体",
            };
            format!("给{}加上「{}」徽章", scope, text)
        }
        Action::Limit {
            max_images, keep, ..
        } => {
            let strategy = match keep {
                LimitKeep::First => "保留最前",
                LimitKeep::Last => "保留最后",
                LimitKeep::EvenDistribution => "均匀抽取",
                LimitKeep::Matched => "优先保留命中",
            };
            format!("最多展示 {} 张（{}）", max_images, strategy)
        }
        Action::Replace { source_id } => format!("整体替换为画廊「{}」", source_id),
    }
}

fn matcher_label(matcher: &crate::models::MediaMatcher) -> String {
    let values = matcher.match_values.join("、");
    match matcher.match_type {
        MediaMatchType::MediaTag => format!("带「{}」标签的媒体", values),
        MediaMatchType::VariantValue => format!("款式值为「{}」的媒体", values),
        MediaMatchType::MediaType => format!("类型为「{}」的媒体", values),
        MediaMatchType::AltText => format!("替代文本含「{}」的媒体", values),
        MediaMatchType::Universal => "通用媒体".to_string(),
    }
}

/// 操作符的商家可读标签
pub fn operator_label(op: Operator) -> &'static str {
    match op {
        Operator::Equals => "等于",
        Operator::NotEquals => "不等于",
        Operator::Contains => "包含",
        Operator::NotContains => "不包含",
        Operator::StartsWith => "开头是",
        Operator::EndsWith => "结尾是",
        Operator::MatchesRegex => "匹配正则",
        Operator::InList => "属于",
        Operator::NotInList => "不属于",
        Operator::GreaterThan => "大于",
        Operator::GreaterThanOrEquals => "不小于",
        Operator::LessThan => "小于",
        Operator::LessThanOrEquals => "不大于",
        Operator::Between => "介于",
        Operator::NotBetween => "不介于",
        Operator::IsTrue => "为真",
        Operator::IsFalse => "为假",
        Operator::ContainsAny => "包含任一",
        Operator::ContainsAll => "包含全部",
        Operator::IsEmpty => "为空",
        Operator::IsNotEmpty => "不为空",
        Operator::Before => "早于",
        Operator::After => "晚于",
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "（未设置）".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("、"),
        other => other.to_string(),
    }
}
