//! 规则集缓存
//!
//! 使用 DashMap 按店铺缓存预处理后的规则集，嵌入端在批量评估
//! 多个上下文时整体复用，避免逐请求重复过滤排序。

use crate::engine::PreparedRuleSet;
use crate::error::{Result, RuleError};
use crate::models::GlobalSettings;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则集缓存
#[derive(Clone)]
pub struct RuleSetStore {
    sets: Arc<DashMap<String, Arc<PreparedRuleSet>>>,
    /// 可热更新的全局默认设置
    default_settings: Arc<RwLock<GlobalSettings>>,
}

impl RuleSetStore {
    pub fn new() -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
            default_settings: Arc::new(RwLock::new(GlobalSettings::default())),
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// 写入（或整体替换）某店铺的预处理规则集
    #[instrument(skip(self, prepared), fields(rules = prepared.len()))]
    pub fn insert(&self, shop: &str, prepared: PreparedRuleSet) {
        self.sets.insert(shop.to_string(), Arc::new(prepared));
        info!(shop, "规则集已缓存");
    }

    pub fn get(&self, shop: &str) -> Option<Arc<PreparedRuleSet>> {
        self.sets.get(shop).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, shop: &str) -> bool {
        self.sets.contains_key(shop)
    }

    /// 移除某店铺的缓存
    #[instrument(skip(self))]
    pub fn remove(&self, shop: &str) -> Result<()> {
        if self.sets.remove(shop).is_some() {
            info!(shop, "规则集缓存已移除");
            Ok(())
        } else {
            warn!(shop, "移除不存在的规则集缓存");
            Err(RuleError::RuleSetNotFound(shop.to_string()))
        }
    }

    /// 清空全部缓存
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.sets.len();
        self.sets.clear();
        info!(count, "已清空规则集缓存");
    }

    /// 当前全局默认设置的快照
    pub fn default_settings(&self) -> GlobalSettings {
        self.default_settings.read().clone()
    }

    /// 热更新全局默认设置
    pub fn update_default_settings(&self, settings: GlobalSettings) {
        *self.default_settings.write() = settings;
        info!("全局默认设置已更新");
    }

    /// 缓存统计
    pub fn stats(&self) -> RuleSetStoreStats {
        let shop_count = self.sets.len();
        let total_rules: usize = self.sets.iter().map(|entry| entry.value().len()).sum();
        RuleSetStoreStats {
            shop_count,
            total_rules,
        }
    }
}

impl Default for RuleSetStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 缓存统计信息
#[derive(Debug, Clone)]
pub struct RuleSetStoreStats {
    pub shop_count: usize,
    pub total_rules: usize,
}
