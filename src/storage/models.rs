use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// 批量缩短请求中的一项
///
/// correlation_id 由调用方选择并在响应中原样带回，与标识推导无关
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: Uuid,
    pub original_url: String,
}

/// 批量缩短响应中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShortened {
    pub correlation_id: Uuid,
    pub short_url: String,
}

/// 用户链接列表项，short_url 为带前缀的完整短链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUrl {
    pub short_url: String,
    pub original_url: String,
}

/// 日志文件中的一条记录
///
/// 磁盘格式：一行一个 JSON 对象，字段名是稳定的——改名会破坏已有日志的回放。
/// 匿名保存时 uuid 等于 short_url；用户保存时 uuid 是所有者。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    pub short_url: String,
    pub original_url: String,
}

/// 异步删除流水线的工作单元
///
/// user_id 为 None 的事件是空操作：删除始终按用户范围执行
#[derive(Debug, Clone)]
pub struct DeleteEvent {
    pub user_id: Option<Uuid>,
    pub ids: Vec<Uuid>,
}

/// 从规范化 URL 推导确定性短链接标识
///
/// 同一 URL 重复缩短总是得到同一标识，冲突检测因此是输入的纯函数
pub fn derive_id(url: &Url) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_str().as_bytes())
}
