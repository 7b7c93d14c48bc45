//! 店面媒体画廊规则引擎
//!
//! 根据商家编写的 WHEN 条件 THEN 动作规则，决定商品画廊中哪些
//! 图片/视频可见、以什么顺序展示、叠加哪些徽章。支持：
//! - JSON 规则定义与容错解析
//! - AND/OR 嵌套条件树的短路求值
//! - 固定规范顺序的动作流水线
//! - 预处理规则集的批量复用与缓存
//!
//! 评估是纯同步计算：不做 IO，不抛 panic，同一输入（含随机种子）
//! 产出同一结果。

pub mod actions;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod models;
pub mod operators;
pub mod scope;
pub mod store;
pub mod summary;
pub mod tree;
pub mod validator;

pub use actions::ActionPipeline;
pub use context::{
    CustomerInfo, DeviceInfo, EvaluationContext, EvaluationContextBuilder, GeoInfo, InventoryInfo,
    ProductInfo, SessionInfo, TimeInfo, TrafficInfo, VariantInfo,
};
pub use engine::{PreparedRuleSet, RuleEngine, VariantImageMapper};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use loader::{LoadedRuleSet, ProductOverrides, RuleSetDocument, RuleSetLoader};
pub use models::{
    Action, BadgeOverlay, Condition, ConditionGroup, ConditionNode, ConditionParams,
    EvaluationStats, FallbackBehavior, GlobalSettings, MediaItem, MediaMatcher, MediaType,
    ProcessedMediaItem, Rule, RuleEvaluationResult, RuleScope, RuleStatus,
};
pub use operators::{LogicalOperator, Operator};
pub use scope::ScopeMatcher;
pub use store::RuleSetStore;
pub use tree::ConditionTree;
pub use validator::{RuleValidator, Severity, ValidationIssue};
