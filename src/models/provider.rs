//! AI 提供方目录与用户配置
//!
//! `ProviderId` 是封闭枚举：每个成员对应一个第三方对话网页。
//! `ProviderRoster` 持有用户可修改的启用状态与权重，并保证同一时间
//! 最多只有一个权重 AI（weight > 1）。

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::ConfigError;

/// 权重 AI 的权重值
pub const FAVORITE_WEIGHT: u32 = 2;

/// 普通 AI 的权重值
pub const DEFAULT_WEIGHT: u32 = 1;

static PROVIDER_BY_HOST: phf::Map<&'static str, ProviderId> = phf::phf_map! {
    "kimi.moonshot.cn" => ProviderId::Kimi,
    "kimi.com" => ProviderId::Kimi,
    "www.kimi.com" => ProviderId::Kimi,
    "chat.deepseek.com" => ProviderId::Deepseek,
    "tongyi.aliyun.com" => ProviderId::Tongyi,
    "www.tongyi.com" => ProviderId::Tongyi,
    "chatglm.cn" => ProviderId::Chatglm,
    "www.doubao.com" => ProviderId::Doubao,
    "doubao.com" => ProviderId::Doubao,
    "yiyan.baidu.com" => ProviderId::Yiyan,
    "xinghuo.xfyun.cn" => ProviderId::Xinghuo,
    "chatgpt.com" => ProviderId::Chatgpt,
    "chat.openai.com" => ProviderId::Chatgpt,
    "gemini.google.com" => ProviderId::Gemini,
};

/// AI 提供方标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Kimi,
    Deepseek,
    Tongyi,
    Chatglm,
    Doubao,
    Yiyan,
    Xinghuo,
    Chatgpt,
    Gemini,
}

impl ProviderId {
    /// 全部提供方（固定顺序）
    pub const ALL: [ProviderId; 9] = [
        ProviderId::Kimi,
        ProviderId::Deepseek,
        ProviderId::Tongyi,
        ProviderId::Chatglm,
        ProviderId::Doubao,
        ProviderId::Yiyan,
        ProviderId::Xinghuo,
        ProviderId::Chatgpt,
        ProviderId::Gemini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Kimi => "kimi",
            ProviderId::Deepseek => "deepseek",
            ProviderId::Tongyi => "tongyi",
            ProviderId::Chatglm => "chatglm",
            ProviderId::Doubao => "doubao",
            ProviderId::Yiyan => "yiyan",
            ProviderId::Xinghuo => "xinghuo",
            ProviderId::Chatgpt => "chatgpt",
            ProviderId::Gemini => "gemini",
        }
    }

    /// 入口地址
    pub fn endpoint(self) -> &'static str {
        match self {
            ProviderId::Kimi => "https://kimi.moonshot.cn/",
            ProviderId::Deepseek => "https://chat.deepseek.com/",
            ProviderId::Tongyi => "https://tongyi.aliyun.com/",
            ProviderId::Chatglm => "https://chatglm.cn/",
            ProviderId::Doubao => "https://www.doubao.com/",
            ProviderId::Yiyan => "https://yiyan.baidu.com/",
            ProviderId::Xinghuo => "https://xinghuo.xfyun.cn/desk",
            ProviderId::Chatgpt => "https://chatgpt.com/",
            ProviderId::Gemini => "https://gemini.google.com/app",
        }
    }

    /// 显示名称
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::Kimi => "Kimi",
            ProviderId::Deepseek => "DeepSeek",
            ProviderId::Tongyi => "通义千问",
            ProviderId::Chatglm => "智谱清言",
            ProviderId::Doubao => "豆包",
            ProviderId::Yiyan => "文心一言",
            ProviderId::Xinghuo => "讯飞星火",
            ProviderId::Chatgpt => "ChatGPT",
            ProviderId::Gemini => "Gemini",
        }
    }

    /// 显示颜色
    pub fn color(self) -> &'static str {
        match self {
            ProviderId::Kimi => "#FF6B6B",
            ProviderId::Deepseek => "#4ECDC4",
            ProviderId::Tongyi => "#45B7D1",
            ProviderId::Chatglm => "#2454FF",
            ProviderId::Doubao => "#FF6A00",
            ProviderId::Yiyan => "#4B5CC4",
            ProviderId::Xinghuo => "#1890FF",
            ProviderId::Chatgpt => "#10A37F",
            ProviderId::Gemini => "#1A73E8",
        }
    }

    /// 根据 URL 的主机名识别提供方
    pub fn from_url(url: &str) -> Option<Self> {
        let host = url_host(url)?;
        PROVIDER_BY_HOST.get(host).copied()
    }

    /// URL 是否仍属于该提供方的域名
    pub fn owns_url(self, url: &str) -> bool {
        Self::from_url(url) == Some(self)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == needle)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// 提取 URL 中的主机名（不含端口）
fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// 单个 AI 的用户配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub endpoint: String,
    pub display_name: String,
    pub color: String,
    pub enabled: bool,
    pub weight: u32,
}

impl ProviderConfig {
    /// 使用目录中的默认元数据创建配置
    pub fn new(id: ProviderId, enabled: bool) -> Self {
        Self {
            id,
            endpoint: id.endpoint().to_string(),
            display_name: id.display_name().to_string(),
            color: id.color().to_string(),
            enabled,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn is_favorite(&self) -> bool {
        self.weight > DEFAULT_WEIGHT
    }
}

/// 全部 AI 的配置集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRoster {
    providers: Vec<ProviderConfig>,
}

impl Default for ProviderRoster {
    fn default() -> Self {
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| {
                let enabled = matches!(
                    id,
                    ProviderId::Kimi | ProviderId::Deepseek | ProviderId::Tongyi | ProviderId::Chatglm
                );
                let mut config = ProviderConfig::new(id, enabled);
                if id == ProviderId::Deepseek {
                    config.weight = FAVORITE_WEIGHT;
                }
                config
            })
            .collect();
        Self { providers }
    }
}

impl ProviderRoster {
    /// 从持久化的配置构建，修复不满足约束的数据
    ///
    /// - 重复的 id 只保留第一个
    /// - 权重为 0 视为 1
    /// - 多个权重 AI 时只保留第一个
    /// - 目录中缺失的 AI 以未启用状态补齐
    pub fn from_configs(configs: Vec<ProviderConfig>) -> Self {
        let mut providers: Vec<ProviderConfig> = Vec::with_capacity(ProviderId::ALL.len());
        let mut favorite_seen = false;

        for mut config in configs {
            if providers.iter().any(|p| p.id == config.id) {
                continue;
            }
            if config.weight == 0 {
                config.weight = DEFAULT_WEIGHT;
            }
            if config.is_favorite() {
                if favorite_seen || !config.enabled {
                    config.weight = DEFAULT_WEIGHT;
                } else {
                    config.weight = FAVORITE_WEIGHT;
                    favorite_seen = true;
                }
            }
            providers.push(config);
        }

        for id in ProviderId::ALL {
            if !providers.iter().any(|p| p.id == id) {
                providers.push(ProviderConfig::new(id, false));
            }
        }

        Self { providers }
    }

    pub fn configs(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn into_configs(self) -> Vec<ProviderConfig> {
        self.providers
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// 已启用的 AI（保持配置顺序）
    pub fn enabled_ids(&self) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.id)
            .collect()
    }

    pub fn is_enabled(&self, id: ProviderId) -> bool {
        self.get(id).is_some_and(|p| p.enabled)
    }

    /// 该 AI 的投票权重，未知 AI 视为 1
    pub fn weight_of(&self, id: ProviderId) -> u32 {
        self.get(id).map(|p| p.weight).unwrap_or(DEFAULT_WEIGHT)
    }

    /// 当前的权重 AI
    pub fn favorite(&self) -> Option<ProviderId> {
        self.providers.iter().find(|p| p.is_favorite()).map(|p| p.id)
    }

    /// 在配置顺序中的位置，用于确定性的平局裁决
    pub fn position(&self, id: ProviderId) -> usize {
        self.providers
            .iter()
            .position(|p| p.id == id)
            .unwrap_or(usize::MAX)
    }

    /// 设置权重 AI：先把所有权重重置为 1，再设置新的权重 AI
    ///
    /// 传入 `None` 表示取消权重 AI。
    pub fn set_favorite(&mut self, id: Option<ProviderId>) -> Result<(), ConfigError> {
        if let Some(id) = id {
            if !self.is_enabled(id) {
                return Err(ConfigError::FavoriteDisabled(id));
            }
        }
        for provider in &mut self.providers {
            provider.weight = if Some(provider.id) == id {
                FAVORITE_WEIGHT
            } else {
                DEFAULT_WEIGHT
            };
        }
        Ok(())
    }

    /// 启用或停用 AI；停用权重 AI 时同时取消权重
    pub fn set_enabled(&mut self, id: ProviderId, enabled: bool) {
        if let Some(provider) = self.providers.iter_mut().find(|p| p.id == id) {
            provider.enabled = enabled;
            if !enabled {
                provider.weight = DEFAULT_WEIGHT;
            }
        }
    }
}
