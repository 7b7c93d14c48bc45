//! 范围匹配
//!
//! 两级检查：scope（shop/collection/product）与叠加其上的商品
//! 包含/排除列表，两者都通过规则才适用。

use crate::context::EvaluationContext;
use crate::models::{ProductScopeMode, Rule, RuleScope};

/// 范围匹配器
pub struct ScopeMatcher;

impl ScopeMatcher {
    /// 规则是否适用于当前上下文
    pub fn matches(rule: &Rule, ctx: &EvaluationContext) -> bool {
        Self::scope_matches(rule, ctx) && Self::product_scope_matches(rule, ctx)
    }

    fn scope_matches(rule: &Rule, ctx: &EvaluationContext) -> bool {
        match rule.scope {
            RuleScope::Shop => true,
            // scope_id 未设置时对该范围的所有目标生效
            RuleScope::Collection => match &rule.scope_id {
                None => true,
                Some(id) => ctx.collection_id.as_deref() == Some(id.as_str()),
            },
            RuleScope::Product => match &rule.scope_id {
                None => true,
                Some(id) => ctx
                    .product
                    .as_ref()
                    .is_some_and(|p| normalize_product_id(&p.id) == normalize_product_id(id)),
            },
        }
    }

    fn product_scope_matches(rule: &Rule, ctx: &EvaluationContext) -> bool {
        let Some(scope) = &rule.product_scope else {
            return true;
        };
        let current = ctx.product.as_ref().map(|p| normalize_product_id(&p.id));
        let in_list = current.as_ref().is_some_and(|id| {
            scope
                .product_ids
                .iter()
                .any(|candidate| normalize_product_id(candidate) == *id)
        });
        match scope.mode {
            // include 要求成员资格，无商品上下文时无法成立
            ProductScopeMode::Include => in_list,
            ProductScopeMode::Exclude => !in_list,
        }
    }
}

/// 归一化商品标识为末尾数字 id
///
/// "gid://shopify/Product/123456" 和 "123456" 视为同一商品；
/// 无末尾数字时原样返回。
pub fn normalize_product_id(id: &str) -> String {
    let trailing_digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    if trailing_digits.is_empty() {
        id.to_string()
    } else {
        trailing_digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProductInfo;
    use crate::models::{ProductScope, RuleStatus};

    fn rule_with_scope(scope: RuleScope, scope_id: Option<&str>) -> Rule {
        let mut rule = Rule::new("scoped", Default::default(), Vec::new());
        rule.scope = scope;
        rule.scope_id = scope_id.map(String::from);
        rule.status = RuleStatus::Active;
        rule
    }

    fn ctx_with_product(id: &str) -> EvaluationContext {
        EvaluationContext::builder()
            .product(ProductInfo {
                id: id.to_string(),
                ..Default::default()
            })
            .build()
    }

    #[test]
    fn test_shop_scope_always_passes() {
        let rule = rule_with_scope(RuleScope::Shop, None);
        assert!(ScopeMatcher::matches(&rule, &EvaluationContext::default()));
    }

    #[test]
    fn test_collection_scope_requires_matching_id() {
        let rule = rule_with_scope(RuleScope::Collection, Some("summer"));
        let ctx = EvaluationContext::builder().collection_id("summer").build();
        assert!(ScopeMatcher::matches(&rule, &ctx));

        let other = EvaluationContext::builder().collection_id("winter").build();
        assert!(!ScopeMatcher::matches(&rule, &other));

        // 无集合上下文
        assert!(!ScopeMatcher::matches(&rule, &EvaluationContext::default()));
    }

    #[test]
    fn test_collection_scope_without_id_passes() {
        let rule = rule_with_scope(RuleScope::Collection, None);
        assert!(ScopeMatcher::matches(&rule, &EvaluationContext::default()));
    }

    #[test]
    fn test_product_scope_gid_normalization() {
        let rule = rule_with_scope(RuleScope::Product, Some("gid://shopify/Product/123456"));
        let ctx = ctx_with_product("123456");
        assert!(ScopeMatcher::matches(&rule, &ctx));

        let other = ctx_with_product("999999");
        assert!(!ScopeMatcher::matches(&rule, &other));
    }

    #[test]
    fn test_include_list_requires_membership() {
        let mut rule = rule_with_scope(RuleScope::Shop, None);
        rule.product_scope = Some(ProductScope {
            mode: ProductScopeMode::Include,
            product_ids: vec!["gid://shopify/Product/111".into(), "222".into()],
        });

        assert!(ScopeMatcher::matches(&rule, &ctx_with_product("111")));
        assert!(ScopeMatcher::matches(&rule, &ctx_with_product("222")));
        assert!(!ScopeMatcher::matches(&rule, &ctx_with_product("333")));
        // 无商品上下文时 include 无法成立
        assert!(!ScopeMatcher::matches(&rule, &EvaluationContext::default()));
    }

    #[test]
    fn test_exclude_list_requires_non_membership() {
        let mut rule = rule_with_scope(RuleScope::Shop, None);
        rule.product_scope = Some(ProductScope {
            mode: ProductScopeMode::Exclude,
            product_ids: vec!["111".into()],
        });

        assert!(!ScopeMatcher::matches(&rule, &ctx_with_product("111")));
        assert!(ScopeMatcher::matches(&rule, &ctx_with_product("222")));
        // 无商品上下文时 exclude 视为非成员，通过
        assert!(ScopeMatcher::matches(&rule, &EvaluationContext::default()));
    }

    #[test]
    fn test_normalize_product_id() {
        assert_eq!(normalize_product_id("gid://shopify/Product/42"), "42");
        assert_eq!(normalize_product_id("42"), "42");
        assert_eq!(normalize_product_id("handle-only"), "handle-only");
    }
}
