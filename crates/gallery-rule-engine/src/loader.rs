//! 规则集加载
//!
//! 解析外部元数据存储取回的规则集文档。店面路径采用 fail-open
//! 策略：schema 版本不符或文档不可解析时整体丢弃、退回空默认集，
//! 画廊展示安全的默认内容而不是报错；单条规则反序列化失败只丢弃
//! 该条。管理端保存路径使用 parse_strict 让错误浮出水面。

use crate::error::{Result, RuleError};
use crate::models::{GlobalSettings, Rule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// 当前支持的规则集 schema 版本
pub const RULESET_SCHEMA_VERSION: u32 = 1;

/// 持久化的规则集文档
///
/// rules 先以原始 JSON 承载，逐条容错反序列化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub rules: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<GlobalSettings>,
}

/// 商品级覆盖（先禁用，再追加）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductOverrides {
    #[serde(default)]
    pub disabled_rule_ids: Vec<String>,
    #[serde(default)]
    pub additional_rules: Vec<Rule>,
}

/// 加载结果
#[derive(Debug, Clone, Default)]
pub struct LoadedRuleSet {
    pub rules: Vec<Rule>,
    pub settings: GlobalSettings,
    /// 反序列化失败被丢弃的规则条数
    pub discarded: usize,
}

/// 规则集加载器
pub struct RuleSetLoader;

impl RuleSetLoader {
    /// fail-open 解析：任何整体性问题都退回空默认集
    pub fn parse(payload: &str) -> LoadedRuleSet {
        let doc: RuleSetDocument = match serde_json::from_str(payload) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "规则集文档解析失败，退回空规则集");
                return LoadedRuleSet::default();
            }
        };
        if doc.schema_version != RULESET_SCHEMA_VERSION {
            warn!(
                found = doc.schema_version,
                expected = RULESET_SCHEMA_VERSION,
                "规则集 schema 版本不受支持，整体丢弃"
            );
            return LoadedRuleSet::default();
        }
        Self::collect(doc)
    }

    /// 严格解析：文档不可解析或版本不符时返回错误（管理端保存路径）
    pub fn parse_strict(payload: &str) -> Result<LoadedRuleSet> {
        let doc: RuleSetDocument = serde_json::from_str(payload)?;
        if doc.schema_version != RULESET_SCHEMA_VERSION {
            return Err(RuleError::UnsupportedSchemaVersion {
                found: doc.schema_version,
                expected: RULESET_SCHEMA_VERSION,
            });
        }
        Ok(Self::collect(doc))
    }

    fn collect(doc: RuleSetDocument) -> LoadedRuleSet {
        let mut rules = Vec::with_capacity(doc.rules.len());
        let mut discarded = 0;
        for raw in doc.rules {
            match serde_json::from_value::<Rule>(raw) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    // 单条规则坏了不拖垮整个集合
                    warn!(error = %e, "规则反序列化失败，跳过该条");
                    discarded += 1;
                }
            }
        }
        LoadedRuleSet {
            rules,
            settings: doc.settings.unwrap_or_default(),
            discarded,
        }
    }

    /// 合并商品级覆盖：先按 id 禁用，再追加商品级规则
    pub fn merge_overrides(mut base: LoadedRuleSet, overrides: &ProductOverrides) -> LoadedRuleSet {
        if !overrides.disabled_rule_ids.is_empty() {
            base.rules
                .retain(|r| !overrides.disabled_rule_ids.contains(&r.id));
        }
        base.rules.extend(overrides.additional_rules.iter().cloned());
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_json(schema_version: u32, rules: Value) -> String {
        json!({
            "schema_version": schema_version,
            "rules": rules
        })
        .to_string()
    }

    fn valid_rule(id: &str) -> Value {
        json!({
            "id": id,
            "name": "测试规则",
            "status": "active",
            "conditions": {"operator": "AND", "children": []},
            "actions": [{"type": "reorder", "strategy": "reverse"}]
        })
    }

    #[test]
    fn test_parse_valid_document() {
        let payload = doc_json(1, json!([valid_rule("r1"), valid_rule("r2")]));
        let loaded = RuleSetLoader::parse(&payload);
        assert_eq!(loaded.rules.len(), 2);
        assert_eq!(loaded.discarded, 0);
    }

    #[test]
    fn test_schema_version_mismatch_fails_open() {
        let payload = doc_json(2, json!([valid_rule("r1")]));
        let loaded = RuleSetLoader::parse(&payload);
        assert!(loaded.rules.is_empty());
        assert!(loaded.settings.enabled);
    }

    #[test]
    fn test_garbage_payload_fails_open() {
        let loaded = RuleSetLoader::parse("not json at all {{{");
        assert!(loaded.rules.is_empty());
    }

    #[test]
    fn test_bad_rule_dropped_good_rules_kept() {
        let payload = doc_json(
            1,
            json!([
                valid_rule("r1"),
                {"id": "bad", "actions": [{"type": "hologram"}]},
                valid_rule("r3")
            ]),
        );
        let loaded = RuleSetLoader::parse(&payload);
        assert_eq!(loaded.rules.len(), 2);
        assert_eq!(loaded.discarded, 1);
    }

    #[test]
    fn test_parse_strict_rejects_version_mismatch() {
        let payload = doc_json(3, json!([]));
        let err = RuleSetLoader::parse_strict(&payload).unwrap_err();
        assert!(matches!(
            err,
            RuleError::UnsupportedSchemaVersion { found: 3, .. }
        ));
    }

    #[test]
    fn test_settings_carried_from_document() {
        let payload = json!({
            "schema_version": 1,
            "rules": [],
            "settings": {"fallback_behavior": "show_none", "max_rules_per_evaluation": 10}
        })
        .to_string();
        let loaded = RuleSetLoader::parse(&payload);
        assert_eq!(loaded.settings.max_rules_per_evaluation, 10);
    }

    #[test]
    fn test_merge_overrides_disables_then_appends() {
        let payload = doc_json(1, json!([valid_rule("r1"), valid_rule("r2")]));
        let base = RuleSetLoader::parse(&payload);

        let extra: Rule = serde_json::from_value(valid_rule("p1")).unwrap();
        let overrides = ProductOverrides {
            disabled_rule_ids: vec!["r1".to_string()],
            additional_rules: vec![extra],
        };
        let merged = RuleSetLoader::merge_overrides(base, &overrides);
        let ids: Vec<_> = merged.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "p1"]);
    }
}
