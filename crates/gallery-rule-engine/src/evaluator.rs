//! 条件评估器
//!
//! 按条件类型 → 字段 → 操作符族三级分发。评估路径从不 panic、
//! 从不返回错误：未知字段、畸形值、非法正则一律按不匹配处理。
//!
//! 字段缺失时的默认极性（必须与另一端的评估器逐类型对齐）：
//! - 否定类操作符（not_equals / not_contains / not_in_list）返回 true
//! - 其余操作符返回 false
//! - variant 条件例外：未选择变体时无论操作符一律 false

use crate::context::EvaluationContext;
use crate::models::{AbTestParams, Condition, ConditionParams};
use crate::operators::Operator;
use chrono::{DateTime, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::warn;

/// 正则模式长度上限，超出直接按不匹配处理
pub const MAX_REGEX_PATTERN_LEN: usize = 200;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估单个叶子条件
    ///
    /// 叶子级 negate 由条件树处理，这里不应用。
    pub fn evaluate(condition: &Condition, ctx: &EvaluationContext) -> bool {
        match condition {
            Condition::Variant(p) => Self::eval_variant(p, ctx),
            Condition::Url(p) => Self::eval_url(p, ctx),
            Condition::Device(p) => Self::eval_device(p, ctx),
            Condition::Customer(p) => Self::eval_customer(p, ctx),
            Condition::Time(p) => Self::eval_time(p, ctx),
            Condition::Geo(p) => Self::eval_geo(p, ctx),
            Condition::Inventory(p) => Self::eval_inventory(p, ctx),
            Condition::TrafficSource(p) => Self::eval_traffic_source(p, ctx),
            Condition::Session(p) => Self::eval_session(p, ctx),
            Condition::Collection(p) => Self::eval_collection(p, ctx),
            Condition::Product(p) => Self::eval_product(p, ctx),
            Condition::AbTest(p) => Self::eval_ab_test(p, ctx),
        }
    }

    // ==================== 按类型分发 ====================

    /// variant：未选择变体时恒 false，不走默认极性表
    fn eval_variant(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        let Some(variant) = &ctx.variant else {
            return false;
        };
        match p.field.as_str() {
            "title" => Self::string_op(Some(&variant.title), p),
            "sku" => Self::string_op(variant.sku.as_deref(), p),
            "price" => Self::number_op(variant.price, p),
            "available" => Self::bool_op(Some(variant.available), p),
            "option_values" => Self::list_op(Some(&variant.option_values), p),
            _ => Self::unknown_field("variant", p),
        }
    }

    fn eval_url(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            "path" => Self::string_op(ctx.traffic.path.as_deref(), p),
            "full_url" => Self::string_op(ctx.traffic.full_url.as_deref(), p),
            field => {
                if let Some(name) = field.strip_prefix("query:") {
                    Self::string_op(ctx.traffic.query.get(name).map(String::as_str), p)
                } else {
                    Self::unknown_field("url", p)
                }
            }
        }
    }

    fn eval_device(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            "type" => Self::string_op(Some(&ctx.device.device_type), p),
            "screen_width" => Self::number_op(ctx.device.screen_width, p),
            _ => Self::unknown_field("device", p),
        }
    }

    fn eval_customer(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            "is_logged_in" => Self::bool_op(Some(ctx.customer.is_logged_in), p),
            "tags" => Self::list_op(Some(&ctx.customer.tags), p),
            "orders_count" => Self::number_op(ctx.customer.orders_count, p),
            "total_spent" => Self::number_op(ctx.customer.total_spent, p),
            _ => Self::unknown_field("customer", p),
        }
    }

    fn eval_time(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            "now" => Self::date_op(ctx.time.now, p),
            "day_of_week" => Self::string_op(Some(&ctx.time.day_of_week), p),
            "hour" => Self::number_op(Some(f64::from(ctx.time.hour)), p),
            _ => Self::unknown_field("time", p),
        }
    }

    fn eval_geo(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            "country" => Self::string_op(ctx.geo.country.as_deref(), p),
            "region" => Self::string_op(ctx.geo.region.as_deref(), p),
            "city" => Self::string_op(ctx.geo.city.as_deref(), p),
            _ => Self::unknown_field("geo", p),
        }
    }

    fn eval_inventory(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        let inventory = ctx.inventory.as_ref();
        match p.field.as_str() {
            "quantity" => Self::number_op(inventory.and_then(|i| i.quantity), p),
            "in_stock" => Self::bool_op(inventory.and_then(|i| i.in_stock), p),
            _ => Self::unknown_field("inventory", p),
        }
    }

    fn eval_traffic_source(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        let t = &ctx.traffic;
        match p.field.as_str() {
            "referrer" => Self::string_op(t.referrer.as_deref(), p),
            "utm_source" => Self::string_op(t.utm_source.as_deref(), p),
            "utm_medium" => Self::string_op(t.utm_medium.as_deref(), p),
            "utm_campaign" => Self::string_op(t.utm_campaign.as_deref(), p),
            "utm_content" => Self::string_op(t.utm_content.as_deref(), p),
            "utm_term" => Self::string_op(t.utm_term.as_deref(), p),
            field => {
                if let Some(name) = field.strip_prefix("param:") {
                    Self::string_op(t.params.get(name).map(String::as_str), p)
                } else {
                    Self::unknown_field("traffic_source", p)
                }
            }
        }
    }

    fn eval_session(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        let s = &ctx.session;
        match p.field.as_str() {
            "is_first_visit" => Self::bool_op(Some(s.is_first_visit), p),
            "page_views" => Self::number_op(Some(s.page_views), p),
            "duration_seconds" => Self::number_op(Some(s.duration_seconds), p),
            "viewed_products" => Self::list_op(Some(&s.viewed_product_ids), p),
            _ => Self::unknown_field("session", p),
        }
    }

    fn eval_collection(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        match p.field.as_str() {
            // 不在集合页时 collection_id 缺失，走默认极性表
            "id" | "" => Self::string_op(ctx.collection_id.as_deref(), p),
            _ => Self::unknown_field("collection", p),
        }
    }

    fn eval_product(p: &ConditionParams, ctx: &EvaluationContext) -> bool {
        let product = ctx.product.as_ref();
        match p.field.as_str() {
            "id" => Self::string_op(product.map(|pr| pr.id.as_str()), p),
            "handle" => Self::string_op(product.map(|pr| pr.handle.as_str()), p),
            "vendor" => Self::string_op(product.and_then(|pr| pr.vendor.as_deref()), p),
            "product_type" => Self::string_op(product.and_then(|pr| pr.product_type.as_deref()), p),
            "tags" => Self::list_op(product.map(|pr| pr.tags.as_slice()), p),
            "price" => Self::number_op(product.and_then(|pr| pr.price), p),
            _ => Self::unknown_field("product", p),
        }
    }

    /// ab_test：忽略操作符和值，只看分桶区间（闭区间）
    fn eval_ab_test(p: &AbTestParams, ctx: &EvaluationContext) -> bool {
        p.bucket_min <= ctx.ab_test_bucket && ctx.ab_test_bucket <= p.bucket_max
    }

    fn unknown_field(condition_type: &str, p: &ConditionParams) -> bool {
        warn!(
            condition_type,
            field = %p.field,
            "未知的条件字段，按不匹配处理"
        );
        false
    }

    // ==================== 操作符族 ====================

    /// 字符串族，全部大小写不敏感
    fn string_op(actual: Option<&str>, p: &ConditionParams) -> bool {
        let Some(actual) = actual else {
            return p.operator.holds_on_missing();
        };
        let lowered = actual.to_lowercase();
        match p.operator {
            Operator::Equals => {
                value_str(&p.value).is_some_and(|v| lowered == v.to_lowercase())
            }
            Operator::NotEquals => {
                !value_str(&p.value).is_some_and(|v| lowered == v.to_lowercase())
            }
            Operator::Contains => {
                value_str(&p.value).is_some_and(|v| lowered.contains(&v.to_lowercase()))
            }
            Operator::NotContains => {
                !value_str(&p.value).is_some_and(|v| lowered.contains(&v.to_lowercase()))
            }
            Operator::StartsWith => {
                value_str(&p.value).is_some_and(|v| lowered.starts_with(&v.to_lowercase()))
            }
            Operator::EndsWith => {
                value_str(&p.value).is_some_and(|v| lowered.ends_with(&v.to_lowercase()))
            }
            Operator::MatchesRegex => value_str(&p.value)
                .and_then(compile_regex)
                .is_some_and(|re| re.is_match(actual)),
            Operator::InList => value_str_list(&p.value)
                .iter()
                .any(|v| v.to_lowercase() == lowered),
            Operator::NotInList => !value_str_list(&p.value)
                .iter()
                .any(|v| v.to_lowercase() == lowered),
            _ => false,
        }
    }

    /// 数值族
    fn number_op(actual: Option<f64>, p: &ConditionParams) -> bool {
        let Some(a) = actual else {
            return p.operator.holds_on_missing();
        };
        let expected = value_f64(&p.value);
        match p.operator {
            Operator::Equals => expected.is_some_and(|v| (a - v).abs() < f64::EPSILON),
            Operator::NotEquals => expected.is_some_and(|v| (a - v).abs() >= f64::EPSILON),
            Operator::GreaterThan => expected.is_some_and(|v| a > v),
            Operator::GreaterThanOrEquals => expected.is_some_and(|v| a >= v),
            Operator::LessThan => expected.is_some_and(|v| a < v),
            Operator::LessThanOrEquals => expected.is_some_and(|v| a <= v),
            // between/not_between 缺任一边界时返回 false
            Operator::Between => match (expected, p.value_end.as_ref().and_then(value_f64_ref)) {
                (Some(lo), Some(hi)) => a >= lo && a <= hi,
                _ => false,
            },
            Operator::NotBetween => {
                match (expected, p.value_end.as_ref().and_then(value_f64_ref)) {
                    (Some(lo), Some(hi)) => !(a >= lo && a <= hi),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// 布尔族
    fn bool_op(actual: Option<bool>, p: &ConditionParams) -> bool {
        let Some(a) = actual else {
            return p.operator.holds_on_missing();
        };
        match p.operator {
            Operator::IsTrue => a,
            Operator::IsFalse => !a,
            _ => false,
        }
    }

    /// 列表族，基于大小写归一后的集合
    fn list_op(actual: Option<&[String]>, p: &ConditionParams) -> bool {
        let Some(items) = actual else {
            return p.operator.holds_on_missing();
        };
        let set: Vec<String> = items.iter().map(|s| s.to_lowercase()).collect();
        let expected = || {
            value_str_list(&p.value)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect::<Vec<_>>()
        };
        match p.operator {
            Operator::Contains => expected().iter().any(|v| set.contains(v)),
            Operator::NotContains => !expected().iter().any(|v| set.contains(v)),
            Operator::ContainsAny => expected().iter().any(|v| set.contains(v)),
            Operator::ContainsAll => {
                let exp = expected();
                !exp.is_empty() && exp.iter().all(|v| set.contains(v))
            }
            Operator::IsEmpty => set.is_empty(),
            Operator::IsNotEmpty => !set.is_empty(),
            _ => false,
        }
    }

    /// 时间族（作用于 time.now）
    fn date_op(now: DateTime<Utc>, p: &ConditionParams) -> bool {
        let expected = value_str(&p.value).and_then(parse_datetime);
        match p.operator {
            Operator::Before => expected.is_some_and(|v| now < v),
            Operator::After => expected.is_some_and(|v| now > v),
            Operator::Between => {
                let end = p
                    .value_end
                    .as_ref()
                    .and_then(|v| value_str(v))
                    .and_then(parse_datetime);
                match (expected, end) {
                    (Some(lo), Some(hi)) => now >= lo && now <= hi,
                    _ => false,
                }
            }
            Operator::NotBetween => {
                let end = p
                    .value_end
                    .as_ref()
                    .and_then(|v| value_str(v))
                    .and_then(parse_datetime);
                match (expected, end) {
                    (Some(lo), Some(hi)) => !(now >= lo && now <= hi),
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

// ==================== 值提取辅助 ====================

pub(crate) fn value_str(v: &Value) -> Option<&str> {
    v.as_str()
}

/// 数值提取，容忍数字字符串
pub(crate) fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_f64_ref(v: &Value) -> Option<f64> {
    value_f64(v)
}

/// 列表值提取：数组取标量元素，单个标量视为单元素列表
pub(crate) fn value_str_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(arr) => arr
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// 解析日期时间：先试 RFC3339，再试 YYYY-MM-DD（按 UTC 零点）
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// 编译正则：超长、启发式判定不安全或编译失败时返回 None
pub(crate) fn compile_regex(pattern: &str) -> Option<Regex> {
    // 长度上限按字符数计，多字节字符不吃亏
    if pattern.chars().count() > MAX_REGEX_PATTERN_LEN {
        warn!(len = pattern.chars().count(), "正则模式超长，按不匹配处理");
        return None;
    }
    if looks_unsafe(pattern) {
        warn!(pattern, "正则模式疑似不安全，按不匹配处理");
        return None;
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

/// 不安全正则的启发式检测（仅为顾问性质，非严格 ReDoS 防御；
/// 真正的安全网是长度上限加 regex crate 的线性时间引擎）
///
/// 检测两类形态：量词作用于内部已带量词的分组（如 `(a+)+`），
/// 以及 3 段以上的 `.*` 串联。
pub(crate) fn looks_unsafe(pattern: &str) -> bool {
    if pattern.matches(".*").count() >= 3 {
        return true;
    }
    has_nested_quantifier(pattern)
}

fn has_nested_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    for i in 1..bytes.len() {
        if (bytes[i] == b'*' || bytes[i] == b'+') && bytes[i - 1] == b')' {
            // 回溯到该分组起点，组内出现量词即判定嵌套
            let mut depth = 0;
            for j in (0..i - 1).rev() {
                match bytes[j] {
                    b')' => depth += 1,
                    b'(' if depth == 0 => break,
                    b'(' => depth -= 1,
                    b'*' | b'+' | b'{' if depth == 0 => return true,
                    _ => {}
                }
            }
        }
    }
    false
}
