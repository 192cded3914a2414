use std::fmt;

#[derive(Debug, Clone)]
pub enum ShortenerError {
    Conflict(String),
    BatchEmpty(String),
    UrlNotValid(String),
    NotFound(String),
    DeleteAccepted(String),
    Unauthorized(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Serialization(String),
}

impl ShortenerError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ShortenerError::Conflict(_) => "E001",
            ShortenerError::BatchEmpty(_) => "E002",
            ShortenerError::UrlNotValid(_) => "E003",
            ShortenerError::NotFound(_) => "E004",
            ShortenerError::DeleteAccepted(_) => "E005",
            ShortenerError::Unauthorized(_) => "E006",
            ShortenerError::DatabaseConfig(_) => "E007",
            ShortenerError::DatabaseConnection(_) => "E008",
            ShortenerError::DatabaseOperation(_) => "E009",
            ShortenerError::FileOperation(_) => "E010",
            ShortenerError::Serialization(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ShortenerError::Conflict(_) => "Entity Conflict",
            ShortenerError::BatchEmpty(_) => "Batch Is Empty",
            ShortenerError::UrlNotValid(_) => "Url Not Valid",
            ShortenerError::NotFound(_) => "Entity Not Found",
            ShortenerError::DeleteAccepted(_) => "Entity Delete Accepted",
            ShortenerError::Unauthorized(_) => "User Unauthorized",
            ShortenerError::DatabaseConfig(_) => "Database Configuration Error",
            ShortenerError::DatabaseConnection(_) => "Database Connection Error",
            ShortenerError::DatabaseOperation(_) => "Database Operation Error",
            ShortenerError::FileOperation(_) => "File Operation Error",
            ShortenerError::Serialization(_) => "Serialization Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ShortenerError::Conflict(msg)
            | ShortenerError::BatchEmpty(msg)
            | ShortenerError::UrlNotValid(msg)
            | ShortenerError::NotFound(msg)
            | ShortenerError::DeleteAccepted(msg)
            | ShortenerError::Unauthorized(msg)
            | ShortenerError::DatabaseConfig(msg)
            | ShortenerError::DatabaseConnection(msg)
            | ShortenerError::DatabaseOperation(msg)
            | ShortenerError::FileOperation(msg)
            | ShortenerError::Serialization(msg) => msg,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

// 哨兵判断，调用方按错误类型分支而不是按消息文本
impl ShortenerError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ShortenerError::Conflict(_))
    }

    pub fn is_batch_empty(&self) -> bool {
        matches!(self, ShortenerError::BatchEmpty(_))
    }

    pub fn is_url_not_valid(&self) -> bool {
        matches!(self, ShortenerError::UrlNotValid(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ShortenerError::NotFound(_))
    }

    pub fn is_delete_accepted(&self) -> bool {
        matches!(self, ShortenerError::DeleteAccepted(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ShortenerError::Unauthorized(_))
    }
}

impl fmt::Display for ShortenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ShortenerError {}

// 便捷的构造函数
impl ShortenerError {
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Conflict(msg.into())
    }

    pub fn batch_empty<T: Into<String>>(msg: T) -> Self {
        ShortenerError::BatchEmpty(msg.into())
    }

    pub fn url_not_valid<T: Into<String>>(msg: T) -> Self {
        ShortenerError::UrlNotValid(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ShortenerError::NotFound(msg.into())
    }

    pub fn delete_accepted<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DeleteAccepted(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Unauthorized(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::FileOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Serialization(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for ShortenerError {
    fn from(err: sea_orm::DbErr) -> Self {
        ShortenerError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for ShortenerError {
    fn from(err: std::io::Error) -> Self {
        ShortenerError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ShortenerError {
    fn from(err: serde_json::Error) -> Self {
        ShortenerError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ShortenerError {
    fn from(err: url::ParseError) -> Self {
        ShortenerError::UrlNotValid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShortenerError>;
