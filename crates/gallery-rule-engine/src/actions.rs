//! 动作流水线
//!
//! 同一条命中规则内的动作按固定规范顺序执行，与存储数组顺序
//! 无关：filter → reorder → prioritize → badge → limit → replace。
//! 排序是稳定的，同类动作保持存储顺序。
//!
//! 工作列表的 Vec 顺序即当前展示顺序，隐藏项保持原位，最终由
//! 引擎统一重排编号。

use crate::context::EvaluationContext;
use crate::models::{
    Action, BadgeOverlay, BadgePosition, BadgeTarget, EvaluationStats, FilterMode, LimitKeep,
    MediaMatchType, MediaMatcher, ProcessedMediaItem, ReorderStrategy,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// 动作流水线
pub struct ActionPipeline;

impl ActionPipeline {
    /// 按规范顺序应用一条规则的全部动作
    ///
    /// 返回 replace 动作登记的替换媒体源 id（如有），实际替换由
    /// 外部协作方执行。
    pub fn apply(
        actions: &[Action],
        media: &mut Vec<ProcessedMediaItem>,
        ctx: &EvaluationContext,
        rng: &mut StdRng,
        stats: &mut EvaluationStats,
    ) -> Option<String> {
        let mut ordered: Vec<&Action> = actions.iter().collect();
        ordered.sort_by_key(|a| a.canonical_order());

        let mut pending_replacement = None;
        for action in ordered {
            match action {
                Action::Filter { mode, matcher } => Self::apply_filter(*mode, matcher, media),
                Action::Reorder {
                    strategy,
                    matcher,
                    tag_order,
                } => Self::apply_reorder(*strategy, matcher.as_ref(), tag_order, media, rng),
                Action::Prioritize { matcher } => Self::apply_prioritize(matcher, media),
                Action::Badge {
                    text,
                    position,
                    style,
                    target,
                    matcher,
                } => Self::apply_badge(
                    text,
                    *position,
                    style.clone(),
                    *target,
                    matcher.as_ref(),
                    media,
                    ctx,
                ),
                Action::Limit {
                    max_images,
                    keep,
                    always_include_first,
                    matcher,
                } => Self::apply_limit(
                    *max_images,
                    *keep,
                    *always_include_first,
                    matcher.as_ref(),
                    media,
                ),
                Action::Replace { source_id } => {
                    pending_replacement = Some(source_id.clone());
                }
            }
            stats.actions_applied += 1;
        }
        pending_replacement
    }

    /// 媒体项是否命中匹配器
    pub fn matches_media(item: &ProcessedMediaItem, matcher: &MediaMatcher) -> bool {
        let values = &matcher.match_values;
        match matcher.match_type {
            MediaMatchType::MediaTag => item.item.tags.iter().any(|tag| {
                values
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(tag))
            }),
            MediaMatchType::VariantValue => item.item.variant_values.iter().any(|vv| {
                values
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(vv))
            }),
            MediaMatchType::MediaType => {
                let media_type = item.item.media_type.to_string();
                values.iter().any(|v| v.eq_ignore_ascii_case(&media_type))
            }
            MediaMatchType::AltText => {
                let alt = item.item.alt.to_lowercase();
                values.iter().any(|v| alt.contains(&v.to_lowercase()))
            }
            // universal 标志本身即匹配条件，忽略 match_values
            MediaMatchType::Universal => item.item.universal,
        }
    }

    fn matches_opt(item: &ProcessedMediaItem, matcher: Option<&MediaMatcher>) -> bool {
        matcher.is_some_and(|m| Self::matches_media(item, m))
    }

    // ==================== filter ====================

    /// include 保留命中的可见项，隐藏其余；exclude 隐藏命中的。
    /// 只作用于当前可见项。
    fn apply_filter(mode: FilterMode, matcher: &MediaMatcher, media: &mut [ProcessedMediaItem]) {
        for item in media.iter_mut().filter(|m| m.visible) {
            let hit = Self::matches_media(item, matcher);
            match mode {
                FilterMode::Include => item.visible = hit,
                FilterMode::Exclude => {
                    if hit {
                        item.visible = false;
                    }
                }
            }
        }
    }

    // ==================== reorder ====================

    /// 对可见子序列做变换，隐藏项整体移到其后（最终编号阶段
    /// 反正会把隐藏项排到末尾）
    fn transform_visible<F>(media: &mut Vec<ProcessedMediaItem>, f: F)
    where
        F: FnOnce(&mut Vec<ProcessedMediaItem>),
    {
        let (mut visible, hidden): (Vec<_>, Vec<_>) =
            media.drain(..).partition(|m| m.visible);
        f(&mut visible);
        visible.extend(hidden);
        *media = visible;
    }

    fn apply_reorder(
        strategy: ReorderStrategy,
        matcher: Option<&MediaMatcher>,
        tag_order: &[String],
        media: &mut Vec<ProcessedMediaItem>,
        rng: &mut StdRng,
    ) {
        Self::transform_visible(media, |visible| match strategy {
            // 稳定划分：命中/未命中两段各自保持相对顺序
            ReorderStrategy::MoveToFront => {
                let (matched, rest): (Vec<_>, Vec<_>) = visible
                    .drain(..)
                    .partition(|m| Self::matches_opt(m, matcher));
                visible.extend(matched);
                visible.extend(rest);
            }
            ReorderStrategy::MoveToBack => {
                let (matched, rest): (Vec<_>, Vec<_>) = visible
                    .drain(..)
                    .partition(|m| Self::matches_opt(m, matcher));
                visible.extend(rest);
                visible.extend(matched);
            }
            ReorderStrategy::Shuffle => visible.shuffle(rng),
            ReorderStrategy::Reverse => visible.reverse(),
            ReorderStrategy::SortByTagOrder => {
                visible.sort_by_key(|m| Self::tag_rank(m, tag_order));
            }
        });
    }

    /// 显式标签优先级列表中的最小下标，无命中标签的排在最后
    fn tag_rank(item: &ProcessedMediaItem, tag_order: &[String]) -> usize {
        item.item
            .tags
            .iter()
            .filter_map(|tag| {
                tag_order
                    .iter()
                    .position(|t| t.eq_ignore_ascii_case(tag))
            })
            .min()
            .unwrap_or(usize::MAX)
    }

    // ==================== prioritize ====================

    /// 命中项稳定前移，从不隐藏任何项
    fn apply_prioritize(matcher: &MediaMatcher, media: &mut Vec<ProcessedMediaItem>) {
        Self::transform_visible(media, |visible| {
            let (matched, rest): (Vec<_>, Vec<_>) = visible
                .drain(..)
                .partition(|m| Self::matches_media(m, matcher));
            visible.extend(matched);
            visible.extend(rest);
        });
    }

    // ==================== badge ====================

    /// first/last 以同一规则内之前动作执行后的可见列表为准，
    /// 而不是规则的原始输入列表
    fn apply_badge(
        text: &str,
        position: BadgePosition,
        style: Option<String>,
        target: BadgeTarget,
        matcher: Option<&MediaMatcher>,
        media: &mut [ProcessedMediaItem],
        ctx: &EvaluationContext,
    ) {
        let overlay = BadgeOverlay {
            text: Self::substitute_placeholders(text, media, ctx),
            position,
            style,
        };

        let visible: Vec<usize> = media
            .iter()
            .enumerate()
            .filter(|(_, m)| m.visible)
            .map(|(i, _)| i)
            .collect();

        let targets: Vec<usize> = match target {
            BadgeTarget::All => visible,
            BadgeTarget::First => visible.first().copied().into_iter().collect(),
            BadgeTarget::Last => visible.last().copied().into_iter().collect(),
            BadgeTarget::Matched => visible
                .into_iter()
                .filter(|&i| Self::matches_opt(&media[i], matcher))
                .collect(),
        };

        for i in targets {
            media[i].badges.push(overlay.clone());
        }
    }

    /// 替换 {{count}} / {{price}} / {{discount}} 占位符
    fn substitute_placeholders(
        text: &str,
        media: &[ProcessedMediaItem],
        ctx: &EvaluationContext,
    ) -> String {
        let mut out = text.to_string();
        if out.contains("{{count}}") {
            let count = media.iter().filter(|m| m.visible).count();
            out = out.replace("{{count}}", &count.to_string());
        }
        if out.contains("{{price}}") {
            let price = ctx
                .variant
                .as_ref()
                .and_then(|v| v.price)
                .or_else(|| ctx.product.as_ref().and_then(|p| p.price));
            out = out.replace(
                "{{price}}",
                &price.map(Self::format_price).unwrap_or_default(),
            );
        }
        if out.contains("{{discount}}") {
            let variant_price = ctx.variant.as_ref().and_then(|v| v.price);
            let product_price = ctx.product.as_ref().and_then(|p| p.price);
            let discount = match (variant_price, product_price) {
                (Some(v), Some(p)) if p > 0.0 && v < p => {
                    format!("{}%", ((1.0 - v / p) * 100.0).round() as i64)
                }
                _ => String::new(),
            };
            out = out.replace("{{discount}}", &discount);
        }
        out
    }

    fn format_price(price: f64) -> String {
        if price.fract() == 0.0 {
            format!("{}", price as i64)
        } else {
            format!("{:.2}", price)
        }
    }

    // ==================== limit ====================

    fn apply_limit(
        max_images: usize,
        keep: LimitKeep,
        always_include_first: bool,
        matcher: Option<&MediaMatcher>,
        media: &mut [ProcessedMediaItem],
    ) {
        let visible: Vec<usize> = media
            .iter()
            .enumerate()
            .filter(|(_, m)| m.visible)
            .map(|(i, _)| i)
            .collect();
        if visible.len() <= max_images {
            return;
        }

        let mut kept: Vec<usize> = match keep {
            LimitKeep::First => visible[..max_images].to_vec(),
            LimitKeep::Last => visible[visible.len() - max_images..].to_vec(),
            LimitKeep::EvenDistribution => {
                if max_images == 0 {
                    Vec::new()
                } else if max_images == 1 {
                    vec![visible[0]]
                } else {
                    // 等距取样，首尾必含
                    (0..max_images)
                        .map(|i| visible[i * (visible.len() - 1) / (max_images - 1)])
                        .collect()
                }
            }
            LimitKeep::Matched => {
                let mut kept: Vec<usize> = visible
                    .iter()
                    .copied()
                    .filter(|&i| Self::matches_opt(&media[i], matcher))
                    .collect();
                kept.truncate(max_images);
                // 命中数不足时从前往后补足
                for &i in &visible {
                    if kept.len() >= max_images {
                        break;
                    }
                    if !kept.contains(&i) {
                        kept.push(i);
                    }
                }
                kept
            }
        };

        // 原可见首项落在保留窗口之外时拼接回来，挤掉最后一个保留项
        if always_include_first && !kept.is_empty() && !kept.contains(&visible[0]) {
            kept.pop();
            kept.insert(0, visible[0]);
        }

        let keep_set: HashSet<usize> = kept.into_iter().collect();
        for (i, item) in media.iter_mut().enumerate() {
            if item.visible && !keep_set.contains(&i) {
                item.visible = false;
            }
        }
    }
}
