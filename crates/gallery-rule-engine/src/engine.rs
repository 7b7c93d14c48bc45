//! 规则引擎编排
//!
//! 单次评估是 (rules, context, settings) 的纯同步函数：不做 I/O、
//! 不持有跨调用的可变状态、输入只读，媒体列表整体复制后加工。
//! 唯一的外部可见非确定性来自 shuffle 策略与注入的 A/B 分桶，
//! 两者都由调用方提供或播种。

use crate::actions::ActionPipeline;
use crate::context::EvaluationContext;
use crate::models::{
    EvaluationStats, FallbackBehavior, GlobalSettings, ProcessedMediaItem, Rule,
    RuleEvaluationResult, RuleStatus,
};
use crate::scope::ScopeMatcher;
use crate::tree::ConditionTree;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info};

/// 预处理后的规则集
///
/// 资格过滤、优先级排序和条数截断只做一次，批量评估多个上下文
/// 时整体复用，不逐次重算。
#[derive(Debug, Clone)]
pub struct PreparedRuleSet {
    rules: Vec<Rule>,
    prepared_at: DateTime<Utc>,
}

impl PreparedRuleSet {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn prepared_at(&self) -> DateTime<Utc> {
        self.prepared_at
    }
}

/// 传统变体图映射协作方（default_gallery 兜底的外部接缝）
///
/// 返回应当可见的媒体 id 集合；返回 None 表示无映射可用，
/// 引擎退回全部展示。
pub trait VariantImageMapper: Send + Sync {
    fn visible_media_ids(&self, ctx: &EvaluationContext) -> Option<Vec<String>>;
}

/// 规则引擎
pub struct RuleEngine {
    settings: GlobalSettings,
    rng_seed: Option<u64>,
    variant_mapper: Option<Box<dyn VariantImageMapper>>,
}

impl RuleEngine {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            settings,
            rng_seed: None,
            variant_mapper: None,
        }
    }

    /// 固定 shuffle 随机源的种子，保证可复现（测试与双端一致性校验用）
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_variant_mapper(mut self, mapper: Box<dyn VariantImageMapper>) -> Self {
        self.variant_mapper = Some(mapper);
        self
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// 预处理规则集：资格过滤 → 稳定优先级排序 → 截断到条数上限
    ///
    /// 上限是硬截断，被截掉的规则彻底不进入评估循环。
    pub fn prepare(&self, rules: &[Rule], now: DateTime<Utc>) -> PreparedRuleSet {
        let total = rules.len();
        let mut eligible: Vec<Rule> = rules
            .iter()
            .filter(|r| Self::is_eligible(r, now))
            .cloned()
            .collect();
        // 稳定排序，优先级相同者保持原数组顺序
        eligible.sort_by_key(|r| r.priority);
        eligible.truncate(self.settings.max_rules_per_evaluation);

        info!(
            total,
            eligible = eligible.len(),
            cap = self.settings.max_rules_per_evaluation,
            "规则集预处理完成"
        );
        PreparedRuleSet {
            rules: eligible,
            prepared_at: now,
        }
    }

    /// 规则在当前时刻是否具备评估资格
    fn is_eligible(rule: &Rule, now: DateTime<Utc>) -> bool {
        // 已过期的规则无论状态如何一律出局
        if let Some(end) = rule.end_date {
            if end < now {
                return false;
            }
        }
        match rule.status {
            RuleStatus::Active => true,
            RuleStatus::Scheduled => rule.start_date.is_some_and(|start| now >= start),
            RuleStatus::Draft | RuleStatus::Paused => false,
        }
    }

    /// 对单个上下文评估预处理后的规则集
    pub fn evaluate(
        &self,
        prepared: &PreparedRuleSet,
        ctx: &EvaluationContext,
    ) -> RuleEvaluationResult {
        let start = Instant::now();
        let mut stats = EvaluationStats::default();
        let mut media: Vec<ProcessedMediaItem> = ctx
            .media
            .iter()
            .cloned()
            .map(ProcessedMediaItem::from)
            .collect();
        let mut matched_rule_ids: Vec<String> = Vec::new();
        let mut pending_replacement = None;

        if self.settings.enabled {
            let mut rng = match self.rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            for rule in prepared.rules() {
                stats.rules_evaluated += 1;

                if !ScopeMatcher::matches(rule, ctx) {
                    continue;
                }
                if !ConditionTree::evaluate(&rule.conditions, ctx, &mut stats.conditions_checked)
                {
                    continue;
                }

                debug!(rule_id = %rule.id, rule_name = %rule.name, "规则命中");
                if let Some(src) =
                    ActionPipeline::apply(&rule.actions, &mut media, ctx, &mut rng, &mut stats)
                {
                    pending_replacement = Some(src);
                }
                for item in media.iter_mut().filter(|m| m.visible) {
                    item.applied_rule_ids.push(rule.id.clone());
                }
                matched_rule_ids.push(rule.id.clone());

                if rule.stop_processing {
                    debug!(rule_id = %rule.id, "stop_processing 置位，终止后续规则");
                    break;
                }
            }
        }

        // 引擎禁用时直接返回原样全可见画廊，不走兜底
        let mut fallback_applied = false;
        if self.settings.enabled && matched_rule_ids.is_empty() {
            fallback_applied = true;
            self.apply_fallback(&mut media, ctx);
        }

        Self::finalize(&mut media);

        RuleEvaluationResult {
            media,
            matched_rule_ids,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            fallback_applied,
            pending_replacement,
            stats,
        }
    }

    /// 便捷入口：单次预处理加评估
    pub fn evaluate_rules(
        &self,
        rules: &[Rule],
        ctx: &EvaluationContext,
    ) -> RuleEvaluationResult {
        let prepared = self.prepare(rules, ctx.time.now);
        self.evaluate(&prepared, ctx)
    }

    /// 零规则命中时的兜底
    fn apply_fallback(&self, media: &mut [ProcessedMediaItem], ctx: &EvaluationContext) {
        let behavior = if self.settings.use_legacy_fallback {
            FallbackBehavior::DefaultGallery
        } else {
            self.settings.fallback_behavior
        };
        debug!(?behavior, "零规则命中，应用兜底行为");

        match behavior {
            FallbackBehavior::ShowAll => {
                for item in media.iter_mut() {
                    item.visible = true;
                }
            }
            FallbackBehavior::ShowNone => {
                for item in media.iter_mut() {
                    item.visible = false;
                }
            }
            FallbackBehavior::DefaultGallery => {
                let mapped = self
                    .variant_mapper
                    .as_ref()
                    .and_then(|m| m.visible_media_ids(ctx));
                match mapped {
                    Some(ids) => {
                        for item in media.iter_mut() {
                            item.visible = ids.contains(&item.item.id);
                        }
                    }
                    // 无映射可用时退回全部展示
                    None => {
                        for item in media.iter_mut() {
                            item.visible = true;
                        }
                    }
                }
            }
        }
    }

    /// 最终重排编号：可见项按当前顺序取 0..n，隐藏项置 -1 并排在
    /// 所有可见项之后
    fn finalize(media: &mut Vec<ProcessedMediaItem>) {
        let (mut visible, mut hidden): (Vec<_>, Vec<_>) =
            media.drain(..).partition(|m| m.visible);
        for (i, item) in visible.iter_mut().enumerate() {
            item.new_position = i as i32;
        }
        for item in hidden.iter_mut() {
            item.new_position = -1;
        }
        visible.extend(hidden);
        *media = visible;
    }
}
