//! 评估上下文
//!
//! 一次店面访问的只读快照。设备探测、会话/UTM/A-B 分桶存储、
//! 商品与库存数据均由外部协作方采集后注入，引擎本身不做任何 I/O。

use crate::models::MediaItem;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 设备信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// mobile / tablet / desktop
    #[serde(default)]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<f64>,
}

/// 客户信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<f64>,
}

/// 流量信息（URL 与来源条件共用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    /// 查询串参数（url 条件的 query:<name> 字段）
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// 自定义追踪参数（traffic_source 条件的 param:<name> 字段）
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// 会话信息（计数由外部持久化协作方维护）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub is_first_visit: bool,
    #[serde(default)]
    pub page_views: f64,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub viewed_product_ids: Vec<String>,
}

/// 时间信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeInfo {
    pub now: DateTime<Utc>,
    /// 小写英文星期名，如 "monday"
    pub day_of_week: String,
    /// 0-23
    pub hour: u32,
}

impl TimeInfo {
    /// 从时刻推导星期与小时
    pub fn from_now(now: DateTime<Utc>) -> Self {
        let day_of_week = match now.weekday() {
            Weekday::Mon => "monday",
            Weekday::Tue => "tuesday",
            Weekday::Wed => "wednesday",
            Weekday::Thu => "thursday",
            Weekday::Fri => "friday",
            Weekday::Sat => "saturday",
            Weekday::Sun => "sunday",
        };
        Self {
            now,
            day_of_week: day_of_week.to_string(),
            hour: now.hour(),
        }
    }
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self::from_now(Utc::now())
    }
}

/// 地理信息（通常只有国家可靠可用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// 当前商品信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// 选中的变体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub option_values: Vec<String>,
}

/// 库存信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

/// 评估上下文 - 一次评估调用的全部输入快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationContext {
    pub device: DeviceInfo,
    pub customer: CustomerInfo,
    pub traffic: TrafficInfo,
    pub session: SessionInfo,
    pub time: TimeInfo,
    pub geo: GeoInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// 持久化的 A/B 分桶，[0, 99]
    pub ab_test_bucket: u8,
    pub media: Vec<MediaItem>,
}

impl EvaluationContext {
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }
}

/// 评估上下文构建器
///
/// 各外部协作方（设备探测、会话存储、商品数据）分别填充自己的
/// 部分，最终 build 出不可变快照。
#[derive(Debug, Default)]
pub struct EvaluationContextBuilder {
    ctx: EvaluationContext,
}

impl EvaluationContextBuilder {
    pub fn device(mut self, device_type: impl Into<String>, screen_width: Option<f64>) -> Self {
        self.ctx.device = DeviceInfo {
            device_type: device_type.into(),
            screen_width,
        };
        self
    }

    pub fn customer(mut self, customer: CustomerInfo) -> Self {
        self.ctx.customer = customer;
        self
    }

    pub fn traffic(mut self, traffic: TrafficInfo) -> Self {
        self.ctx.traffic = traffic;
        self
    }

    pub fn session(mut self, session: SessionInfo) -> Self {
        self.ctx.session = session;
        self
    }

    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.ctx.time = TimeInfo::from_now(now);
        self
    }

    pub fn geo(mut self, geo: GeoInfo) -> Self {
        self.ctx.geo = geo;
        self
    }

    pub fn product(mut self, product: ProductInfo) -> Self {
        self.ctx.product = Some(product);
        self
    }

    pub fn variant(mut self, variant: VariantInfo) -> Self {
        self.ctx.variant = Some(variant);
        self
    }

    pub fn inventory(mut self, inventory: InventoryInfo) -> Self {
        self.ctx.inventory = Some(inventory);
        self
    }

    pub fn collection_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.collection_id = Some(id.into());
        self
    }

    pub fn ab_test_bucket(mut self, bucket: u8) -> Self {
        // 分桶值由外部持久化随机分配协作方提供，越界时收敛到上界
        self.ctx.ab_test_bucket = bucket.min(99);
        self
    }

    pub fn media(mut self, media: Vec<MediaItem>) -> Self {
        self.ctx.media = media;
        self
    }

    pub fn build(self) -> EvaluationContext {
        self.ctx
    }
}
