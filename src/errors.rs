use std::fmt;

/// 面向传输层的错误分类
///
/// 传输层（HTTP/RPC）据此映射状态码：Validation → 400，NotFound → 404，
/// Gone → 410，Conflict → 409，Internal → 500。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Gone,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenerError {
    Validation(String),
    NotFound(String),
    /// 短码存在但已被软删除，携带该短码
    Gone(String),
    /// 原始 URL 已存在映射，携带已有短码
    AlreadyExists(String),
    /// 插入时短码已被占用，携带冲突短码
    CodeCollision(String),
    CodeGeneration(String),
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
            ShortenerError::Validation(_) => "E001",
            ShortenerError::NotFound(_) => "E002",
            ShortenerError::Gone(_) => "E003",
            ShortenerError::AlreadyExists(_) => "E004",
            ShortenerError::CodeCollision(_) => "E005",
            ShortenerError::CodeGeneration(_) => "E006",
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
            ShortenerError::Validation(_) => "Validation Error",
            ShortenerError::NotFound(_) => "Resource Not Found",
            ShortenerError::Gone(_) => "Resource Gone",
            ShortenerError::AlreadyExists(_) => "Original URL Already Exists",
            ShortenerError::CodeCollision(_) => "Short Code Collision",
            ShortenerError::CodeGeneration(_) => "Short Code Generation Error",
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
            ShortenerError::Validation(msg)
            | ShortenerError::NotFound(msg)
            | ShortenerError::Gone(msg)
            | ShortenerError::AlreadyExists(msg)
            | ShortenerError::CodeCollision(msg)
            | ShortenerError::CodeGeneration(msg)
            | ShortenerError::DatabaseConfig(msg)
            | ShortenerError::DatabaseConnection(msg)
            | ShortenerError::DatabaseOperation(msg)
            | ShortenerError::FileOperation(msg)
            | ShortenerError::Serialization(msg) => msg,
        }
    }

    /// 错误分类（供传输层映射状态码）
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShortenerError::Validation(_) => ErrorKind::Validation,
            ShortenerError::NotFound(_) => ErrorKind::NotFound,
            ShortenerError::Gone(_) => ErrorKind::Gone,
            ShortenerError::AlreadyExists(_) => ErrorKind::Conflict,
            ShortenerError::CodeCollision(_)
            | ShortenerError::CodeGeneration(_)
            | ShortenerError::DatabaseConfig(_)
            | ShortenerError::DatabaseConnection(_)
            | ShortenerError::DatabaseOperation(_)
            | ShortenerError::FileOperation(_)
            | ShortenerError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// 冲突时已存在的短码
    pub fn existing_short_code(&self) -> Option<&str> {
        match self {
            ShortenerError::AlreadyExists(code) => Some(code),
            _ => None,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
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
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ShortenerError::NotFound(msg.into())
    }

    pub fn gone<T: Into<String>>(code: T) -> Self {
        ShortenerError::Gone(code.into())
    }

    pub fn already_exists<T: Into<String>>(existing_code: T) -> Self {
        ShortenerError::AlreadyExists(existing_code.into())
    }

    pub fn code_collision<T: Into<String>>(code: T) -> Self {
        ShortenerError::CodeCollision(code.into())
    }

    pub fn code_generation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::CodeGeneration(msg.into())
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

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ShortenerError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(ShortenerError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(ShortenerError::gone("abcde").kind(), ErrorKind::Gone);
        assert_eq!(
            ShortenerError::already_exists("abcde").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ShortenerError::code_collision("abcde").kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            ShortenerError::file_operation("disk full").kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_existing_short_code_only_on_conflict() {
        let err = ShortenerError::already_exists("AbCdE");
        assert_eq!(err.existing_short_code(), Some("AbCdE"));
        assert_eq!(ShortenerError::gone("AbCdE").existing_short_code(), None);
    }

    #[test]
    fn test_display_uses_simple_format() {
        let err = ShortenerError::not_found("短链接不存在: abcde");
        assert_eq!(err.to_string(), "Resource Not Found: 短链接不存在: abcde");
    }
}
