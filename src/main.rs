use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
mod services;
mod utils;

use config::Config;
use services::{create_window_host, FileStorage, MemoryStorage, StateStorage, WindowStateService};

#[derive(Parser, Debug)]
#[command(name = "winstate-keeper")]
#[command(about = "Сохраняет раскладку окон для каждого разрешения экрана и восстанавливает её при смене мониторов")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "winstate.toml")]
    config: String,

    /// Режим сухого запуска (симулятор вместо оконного менеджера)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает logging.level из конфигурации)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.filter)?;

    info!("Запуск winstate-keeper v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - окна реального оконного менеджера не трогаются");
    }

    let host = create_window_host(config.clone(), args.dry_run)?;
    let storage = create_storage(&config, args.dry_run)?;
    let service = WindowStateService::start(&config, host, storage)?;

    info!("Хранитель раскладки запущен");

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");
    let store = service.stop().await?;

    info!("winstate-keeper завершил работу, раскладок в памяти: {}", store.len());
    Ok(())
}

fn create_storage(config: &Config, dry_run: bool) -> Result<Option<Arc<dyn StateStorage>>> {
    if !config.persistence.enabled {
        info!("Сохранение раскладок между запусками отключено");
        return Ok(None);
    }

    if dry_run {
        return Ok(Some(Arc::new(MemoryStorage::new())));
    }

    let dir = match config.persistence_dir() {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    info!("Раскладки сохраняются в {:?}", dir);
    Ok(Some(Arc::new(FileStorage::new(dir))))
}

fn init_tracing(level: &str, filter: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directives = if filter.is_empty() {
        level.to_string()
    } else {
        format!("{},{}", level, filter)
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
