//! 规则引擎领域模型
//!
//! 条件与动作均为封闭的 tagged union，评估器、校验器和摘要器
//! 三处消费端都做穷尽匹配，新增变体时由编译器强制同步。

use crate::operators::{LogicalOperator, Operator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// 规则定义
///
/// 一条商家编写的 WHEN 条件 THEN 动作单元。所有字段都带默认值，
/// 以容忍存储中部分非法或旧版本的数据（保存期校验是另一回事）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_scope: Option<ProductScope>,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub stop_processing: bool,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(name: impl Into<String>, conditions: ConditionGroup, actions: Vec<Action>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            scope: RuleScope::Shop,
            scope_id: None,
            product_scope: None,
            conditions,
            actions,
            priority: 0,
            stop_processing: false,
            status: RuleStatus::Active,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// 规则生效范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    Shop,
    Collection,
    Product,
}

/// 商品级包含/排除列表（叠加在 scope 之上）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductScope {
    pub mode: ProductScopeMode,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductScopeMode {
    Include,
    Exclude,
}

/// 规则生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Scheduled,
}

/// 条件组节点（AND/OR 嵌套树）
///
/// 空子节点列表恒为真。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    #[serde(default)]
    pub children: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn new(operator: LogicalOperator, children: Vec<ConditionNode>) -> Self {
        Self { operator, children }
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, children)
    }
}

impl Default for ConditionGroup {
    fn default() -> Self {
        Self::and(Vec::new())
    }
}

/// 条件树节点（叶子条件或嵌套组）
///
/// 叶子条件自身以 "type" 字段做内部标签，节点层级因此采用
/// untagged：组节点由 operator+children 形状识别。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Condition(Condition),
}

/// 叶子条件公共参数
///
/// value/value_end 用 JSON Value 承载，由评估器按操作符族解释；
/// value_end 仅 between/not_between 使用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionParams {
    #[serde(default)]
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_end: Option<Value>,
    #[serde(default)]
    pub negate: bool,
}

impl ConditionParams {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            value_end: None,
            negate: false,
        }
    }

    pub fn with_value_end(mut self, value_end: impl Into<Value>) -> Self {
        self.value_end = Some(value_end.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// A/B 分桶条件参数
///
/// 不携带操作符和值，命中判定为 bucket_min ≤ bucket ≤ bucket_max。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestParams {
    pub bucket_min: u8,
    pub bucket_max: u8,
    #[serde(default)]
    pub negate: bool,
}

/// 叶子条件（12 种类型的封闭联合）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Variant(ConditionParams),
    Url(ConditionParams),
    Device(ConditionParams),
    Customer(ConditionParams),
    Time(ConditionParams),
    Geo(ConditionParams),
    Inventory(ConditionParams),
    TrafficSource(ConditionParams),
    Session(ConditionParams),
    Collection(ConditionParams),
    Product(ConditionParams),
    AbTest(AbTestParams),
}

impl Condition {
    /// 条件类型名（与 serde 标签一致）
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Variant(_) => "variant",
            Self::Url(_) => "url",
            Self::Device(_) => "device",
            Self::Customer(_) => "customer",
            Self::Time(_) => "time",
            Self::Geo(_) => "geo",
            Self::Inventory(_) => "inventory",
            Self::TrafficSource(_) => "traffic_source",
            Self::Session(_) => "session",
            Self::Collection(_) => "collection",
            Self::Product(_) => "product",
            Self::AbTest(_) => "ab_test",
        }
    }

    /// 叶子级取反标记（在组合进父组之前应用）
    pub fn negate(&self) -> bool {
        match self {
            Self::Variant(p)
            | Self::Url(p)
            | Self::Device(p)
            | Self::Customer(p)
            | Self::Time(p)
            | Self::Geo(p)
            | Self::Inventory(p)
            | Self::TrafficSource(p)
            | Self::Session(p)
            | Self::Collection(p)
            | Self::Product(p) => p.negate,
            Self::AbTest(p) => p.negate,
        }
    }
}

/// 媒体匹配方式（动作选择媒体项的公共子结构）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMatcher {
    pub match_type: MediaMatchType,
    #[serde(default)]
    pub match_values: Vec<String>,
}

impl MediaMatcher {
    pub fn new(match_type: MediaMatchType, match_values: Vec<String>) -> Self {
        Self {
            match_type,
            match_values,
        }
    }

    pub fn tags(values: Vec<String>) -> Self {
        Self::new(MediaMatchType::MediaTag, values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMatchType {
    MediaTag,
    VariantValue,
    MediaType,
    AltText,
    Universal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderStrategy {
    MoveToFront,
    MoveToBack,
    Shuffle,
    Reverse,
    SortByTagOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTarget {
    All,
    First,
    Last,
    Matched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgePosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKeep {
    #[default]
    First,
    Last,
    EvenDistribution,
    Matched,
}

/// 动作（6 种类型的封闭联合）
///
/// 同一规则内按固定规范顺序执行，与存储数组顺序无关：
/// filter → reorder → prioritize → badge → limit → replace。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Filter {
        mode: FilterMode,
        #[serde(flatten)]
        matcher: MediaMatcher,
    },
    Reorder {
        strategy: ReorderStrategy,
        #[serde(flatten)]
        matcher: Option<MediaMatcher>,
        #[serde(default)]
        tag_order: Vec<String>,
    },
    Badge {
        text: String,
        #[serde(default)]
        position: BadgePosition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
        target: BadgeTarget,
        #[serde(flatten)]
        matcher: Option<MediaMatcher>,
    },
    Limit {
        max_images: usize,
        #[serde(default)]
        keep: LimitKeep,
        #[serde(default)]
        always_include_first: bool,
        #[serde(flatten)]
        matcher: Option<MediaMatcher>,
    },
    Prioritize {
        #[serde(flatten)]
        matcher: MediaMatcher,
    },
    Replace {
        source_id: String,
    },
}

impl Action {
    /// 动作类型名（与 serde 标签一致）
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::Reorder { .. } => "reorder",
            Self::Badge { .. } => "badge",
            Self::Limit { .. } => "limit",
            Self::Prioritize { .. } => "prioritize",
            Self::Replace { .. } => "replace",
        }
    }

    /// 规范执行顺序的序号（稳定排序，同类动作保持存储顺序）
    pub fn canonical_order(&self) -> u8 {
        match self {
            Self::Filter { .. } => 0,
            Self::Reorder { .. } => 1,
            Self::Prioritize { .. } => 2,
            Self::Badge { .. } => 3,
            Self::Limit { .. } => 4,
            Self::Replace { .. } => 5,
        }
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Image,
    Video,
    ExternalVideo,
    Model3d,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::ExternalVideo => "external_video",
            Self::Model3d => "model_3d",
        };
        write!(f, "{}", s)
    }
}

/// 画廊中的一项媒体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variant_values: Vec<String>,
    #[serde(default)]
    pub universal: bool,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            media_type: MediaType::Image,
            src: String::new(),
            alt: String::new(),
            position,
            tags: Vec::new(),
            variant_values: Vec::new(),
            universal: false,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// 徽章覆盖层元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeOverlay {
    pub text: String,
    pub position: BadgePosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// 评估后的媒体项
///
/// 在输入媒体之上叠加可见性、最终位置、徽章和命中规则记录，
/// 整体可直接序列化跨进程边界传输。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMediaItem {
    #[serde(flatten)]
    pub item: MediaItem,
    pub visible: bool,
    pub new_position: i32,
    #[serde(default)]
    pub badges: Vec<BadgeOverlay>,
    #[serde(default)]
    pub applied_rule_ids: Vec<String>,
}

impl From<MediaItem> for ProcessedMediaItem {
    fn from(item: MediaItem) -> Self {
        let new_position = item.position as i32;
        Self {
            item,
            visible: true,
            new_position,
            badges: Vec::new(),
            applied_rule_ids: Vec::new(),
        }
    }
}

/// 零规则命中时的兜底行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBehavior {
    #[default]
    ShowAll,
    ShowNone,
    DefaultGallery,
}

/// 全局设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub fallback_behavior: FallbackBehavior,
    #[serde(default = "default_max_rules")]
    pub max_rules_per_evaluation: usize,
    #[serde(default)]
    pub use_legacy_fallback: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_rules() -> usize {
    50
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_behavior: FallbackBehavior::ShowAll,
            max_rules_per_evaluation: 50,
            use_legacy_fallback: false,
        }
    }
}

/// 评估诊断计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats {
    /// 实际进入评估循环的规则数
    pub rules_evaluated: u32,
    /// 实际评估过的条件数（短路后的条件不计入）
    pub conditions_checked: u32,
    /// 实际执行过的动作数
    pub actions_applied: u32,
}

/// 评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluationResult {
    pub media: Vec<ProcessedMediaItem>,
    pub matched_rule_ids: Vec<String>,
    pub elapsed_ms: f64,
    pub fallback_applied: bool,
    /// replace 动作登记的替换媒体源，由外部协作方执行实际替换
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_replacement: Option<String>,
    pub stats: EvaluationStats,
}
