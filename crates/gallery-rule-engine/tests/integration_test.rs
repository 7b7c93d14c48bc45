//! 端到端集成测试
//!
//! 覆盖从 JSON 规则集加载到最终画廊输出的完整链路。

use gallery_rules::{
    Action, Condition, ConditionGroup, ConditionNode, ConditionParams, CustomerInfo,
    EvaluationContext, FallbackBehavior, GlobalSettings, MediaItem, MediaMatcher, Operator,
    ProductInfo, Rule, RuleEngine, RuleSetLoader, RuleSetStore, SessionInfo,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gallery(n: usize) -> Vec<MediaItem> {
    (0..n)
        .map(|i| MediaItem::new(format!("m{}", i + 1), i))
        .collect()
}

fn engine() -> RuleEngine {
    RuleEngine::new(GlobalSettings::default()).with_rng_seed(7)
}

#[test]
fn test_loaded_ruleset_end_to_end() {
    init_tracing();

    // 从 JSON 文档一路到最终画廊输出
    let payload = json!({
        "schema_version": 1,
        "rules": [{
            "id": "mobile-limit",
            "name": "移动端限图",
            "status": "active",
            "conditions": {
                "operator": "AND",
                "children": [
                    {"type": "device", "field": "type", "operator": "equals", "value": "mobile"}
                ]
            },
            "actions": [
                {"type": "limit", "max_images": 3, "keep": "first"}
            ]
        }]
    })
    .to_string();

    let loaded = RuleSetLoader::parse(&payload);
    assert_eq!(loaded.discarded, 0);

    let ctx = EvaluationContext::builder()
        .device("mobile", Some(390.0))
        .media(gallery(6))
        .build();
    let result = engine().evaluate_rules(&loaded.rules, &ctx);

    assert_eq!(result.matched_rule_ids, vec!["mobile-limit"]);
    let visible: Vec<_> = result
        .media
        .iter()
        .filter(|m| m.visible)
        .map(|m| m.item.id.as_str())
        .collect();
    assert_eq!(visible, vec!["m1", "m2", "m3"]);
}

#[test]
fn test_sale_collection_scenario() {
    // 促销集合页：只展示带 sale 标签的图，打折扣徽章
    let media = vec![
        MediaItem::new("hero", 0),
        MediaItem::new("sale-1", 1).with_tags(vec!["sale".into()]),
        MediaItem::new("sale-2", 2).with_tags(vec!["sale".into()]),
        MediaItem::new("detail", 3),
    ];
    let mut rule = Rule::new(
        "促销集合页",
        ConditionGroup::and(vec![ConditionNode::Condition(Condition::Collection(
            ConditionParams::new("id", Operator::Equals, "sale-items"),
        ))]),
        vec![
            Action::Badge {
                text: "限时特惠".to_string(),
                position: Default::default(),
                style: None,
                target: gallery_rules::models::BadgeTarget::All,
                matcher: None,
            },
            Action::Filter {
                mode: gallery_rules::models::FilterMode::Include,
                matcher: MediaMatcher::tags(vec!["sale".into()]),
            },
        ],
    );
    rule.scope = gallery_rules::RuleScope::Collection;
    rule.scope_id = Some("sale-items".to_string());

    let ctx = EvaluationContext::builder()
        .collection_id("sale-items")
        .media(media)
        .build();
    let result = engine().evaluate_rules(&[rule], &ctx);

    let visible: Vec<_> = result
        .media
        .iter()
        .filter(|m| m.visible)
        .map(|m| m.item.id.as_str())
        .collect();
    assert_eq!(visible, vec!["sale-1", "sale-2"]);
    // filter 先于 badge 执行，徽章只落在过滤后仍可见的项上
    for item in result.media.iter().filter(|m| m.visible) {
        assert_eq!(item.badges.len(), 1);
        assert_eq!(item.badges[0].text, "限时特惠");
    }
    for item in result.media.iter().filter(|m| !m.visible) {
        assert!(item.badges.is_empty());
    }
}

#[test]
fn test_vip_customer_or_group_short_circuit() {
    let rule = Rule::new(
        "VIP 或 回头客",
        ConditionGroup::or(vec![
            ConditionNode::Condition(Condition::Customer(ConditionParams::new(
                "tags",
                Operator::Contains,
                "vip",
            ))),
            ConditionNode::Condition(Condition::Session(ConditionParams::new(
                "page_views",
                Operator::GreaterThan,
                10,
            ))),
        ]),
        vec![Action::Reorder {
            strategy: gallery_rules::models::ReorderStrategy::Reverse,
            matcher: None,
            tag_order: Vec::new(),
        }],
    );

    let ctx = EvaluationContext::builder()
        .customer(CustomerInfo {
            tags: vec!["VIP".into()],
            ..Default::default()
        })
        .session(SessionInfo {
            page_views: 1.0,
            ..Default::default()
        })
        .media(gallery(3))
        .build();
    let result = engine().evaluate_rules(&[rule], &ctx);

    assert_eq!(result.matched_rule_ids.len(), 1);
    // OR 第一个子条件命中即短路，第二个不再评估
    assert_eq!(result.stats.conditions_checked, 1);
    let ids: Vec<_> = result
        .media
        .iter()
        .filter(|m| m.visible)
        .map(|m| m.item.id.as_str())
        .collect();
    assert_eq!(ids, vec!["m3", "m2", "m1"]);
}

#[test]
fn test_ab_test_split_buckets() {
    let variant_a = Rule::new(
        "A 组",
        ConditionGroup::and(vec![ConditionNode::Condition(Condition::AbTest(
            gallery_rules::models::AbTestParams {
                bucket_min: 0,
                bucket_max: 49,
                negate: false,
            },
        ))]),
        vec![Action::Limit {
            max_images: 1,
            keep: Default::default(),
            always_include_first: false,
            matcher: None,
        }],
    );
    let variant_b = Rule::new(
        "B 组",
        ConditionGroup::and(vec![ConditionNode::Condition(Condition::AbTest(
            gallery_rules::models::AbTestParams {
                bucket_min: 50,
                bucket_max: 99,
                negate: false,
            },
        ))]),
        vec![Action::Limit {
            max_images: 2,
            keep: Default::default(),
            always_include_first: false,
            matcher: None,
        }],
    );
    let rules = [variant_a, variant_b];

    let ctx_a = EvaluationContext::builder()
        .ab_test_bucket(49)
        .media(gallery(4))
        .build();
    let result_a = engine().evaluate_rules(&rules, &ctx_a);
    assert_eq!(result_a.media.iter().filter(|m| m.visible).count(), 1);

    let ctx_b = EvaluationContext::builder()
        .ab_test_bucket(50)
        .media(gallery(4))
        .build();
    let result_b = engine().evaluate_rules(&rules, &ctx_b);
    assert_eq!(result_b.media.iter().filter(|m| m.visible).count(), 2);
}

#[test]
fn test_malformed_rules_never_panic() {
    // 评估路径对任意形状的输入都不得 panic
    let payloads = [
        json!({"schema_version": 1, "rules": [{"name": 42}]}),
        json!({"schema_version": 1, "rules": [{"actions": [{"type": "unknown"}]}]}),
        json!({"schema_version": 1, "rules": "not-an-array"}),
        json!({"schema_version": "one"}),
        json!([]),
        json!(null),
    ];
    let ctx = EvaluationContext::builder().media(gallery(2)).build();
    for payload in payloads {
        let loaded = RuleSetLoader::parse(&payload.to_string());
        let result = engine().evaluate_rules(&loaded.rules, &ctx);
        // 无有效规则时兜底展示全部
        assert!(result.fallback_applied);
        assert!(result.media.iter().all(|m| m.visible));
    }
}

#[test]
fn test_product_scope_exclusion() {
    let mut rule = Rule::new(
        "全店隐藏视频",
        ConditionGroup::default(),
        vec![Action::Filter {
            mode: gallery_rules::models::FilterMode::Exclude,
            matcher: MediaMatcher::new(
                gallery_rules::models::MediaMatchType::MediaType,
                vec!["video".into()],
            ),
        }],
    );
    rule.product_scope = Some(gallery_rules::models::ProductScope {
        mode: gallery_rules::models::ProductScopeMode::Exclude,
        product_ids: vec!["gid://shopify/Product/777".into()],
    });

    let mut media = gallery(2);
    media[1].media_type = gallery_rules::MediaType::Video;

    // 被排除的商品上规则不生效
    let excluded_ctx = EvaluationContext::builder()
        .product(ProductInfo {
            id: "777".to_string(),
            ..Default::default()
        })
        .media(media.clone())
        .build();
    let result = engine().evaluate_rules(&[rule.clone()], &excluded_ctx);
    assert!(result.fallback_applied);
    assert!(result.media.iter().all(|m| m.visible));

    // 其他商品上正常隐藏视频
    let normal_ctx = EvaluationContext::builder()
        .product(ProductInfo {
            id: "888".to_string(),
            ..Default::default()
        })
        .media(media)
        .build();
    let result = engine().evaluate_rules(&[rule], &normal_ctx);
    let visible: Vec<_> = result
        .media
        .iter()
        .filter(|m| m.visible)
        .map(|m| m.item.id.as_str())
        .collect();
    assert_eq!(visible, vec!["m1"]);
}

#[test]
fn test_store_prepared_reuse_across_contexts() {
    let store = RuleSetStore::new();
    let engine = engine();
    let rule = Rule::new(
        "移动端限图",
        ConditionGroup::and(vec![ConditionNode::Condition(Condition::Device(
            ConditionParams::new("type", Operator::Equals, "mobile"),
        ))]),
        vec![Action::Limit {
            max_images: 2,
            keep: Default::default(),
            always_include_first: false,
            matcher: None,
        }],
    );
    store.insert("shop-a", engine.prepare(&[rule], chrono::Utc::now()));

    let prepared = store.get("shop-a").unwrap();
    for n in [3usize, 5, 8] {
        let ctx = EvaluationContext::builder()
            .device("mobile", None)
            .media(gallery(n))
            .build();
        let result = engine.evaluate(&prepared, &ctx);
        assert_eq!(result.media.iter().filter(|m| m.visible).count(), 2);
    }
}

#[test]
fn test_show_none_fallback_hides_gallery() {
    let settings = GlobalSettings {
        fallback_behavior: FallbackBehavior::ShowNone,
        ..Default::default()
    };
    let ctx = EvaluationContext::builder().media(gallery(3)).build();
    let result = RuleEngine::new(settings).evaluate_rules(&[], &ctx);
    assert!(result.fallback_applied);
    assert!(result.media.iter().all(|m| !m.visible && m.new_position == -1));
}

#[test]
fn test_replace_is_recorded_not_executed() {
    let rule = Rule::new(
        "整体换画廊",
        ConditionGroup::default(),
        vec![Action::Replace {
            source_id: "campaign-gallery".to_string(),
        }],
    );
    let ctx = EvaluationContext::builder().media(gallery(3)).build();
    let result = engine().evaluate_rules(&[rule], &ctx);

    assert_eq!(result.pending_replacement.as_deref(), Some("campaign-gallery"));
    // 当前媒体列表保持不动，替换由外部协作方执行
    assert_eq!(result.media.len(), 3);
    assert!(result.media.iter().all(|m| m.visible));
}
