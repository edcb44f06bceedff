use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ошибка оконного менеджера: {0}")]
    Host(String),

    #[error("Ошибка хранилища состояния: {0}")]
    Storage(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl KeeperError {
    pub fn host<T>(msg: impl Into<String>) -> Result<T> {
        Err(KeeperError::Host(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! keeper_error {
    (host, $($arg:tt)*) => {
        $crate::error::KeeperError::Host(format!($($arg)*))
    };
    (storage, $($arg:tt)*) => {
        $crate::error::KeeperError::Storage(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::KeeperError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::KeeperError::Internal(format!($($arg)*))
    };
}
