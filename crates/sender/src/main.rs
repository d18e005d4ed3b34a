//! # Telemetria Sender
//!
//! Coleta atributos e telemetria de cada dispositivo configurado e publica
//! via HTTP na API de dispositivos. Falhas de envio vão para o cache em
//! disco e são reenviadas depois.
//!
//! ## Uso
//! ```bash
//! telemetry_sender                          # config.toml ao lado do executável
//! telemetry_sender --config /etc/tb.toml    # caminho explícito
//! ```

mod agent;
mod ds18b20;
mod monitor;
mod simulated;
mod sources;
mod weather;

use agent::Agent;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use telemetry_core::config::AppConfig;
use telemetry_core::transport::HttpTransport;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn main() {
    // ── Carregar config ──
    let config_path = config_path_from_args().unwrap_or_else(AppConfig::default_path);
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => fatal(&e.to_string()),
    };

    // Salva um modelo se não existir
    if !config_path.exists() {
        match config.save(&config_path) {
            Ok(()) => eprintln!("Modelo de configuração salvo em {}", config_path.display()),
            Err(e) => eprintln!("Não foi possível salvar config padrão: {e}"),
        }
    }

    if let Err(e) = config.ensure_valid() {
        fatal(&format!("{e} ({})", config_path.display()));
    }
    if let Err(e) = config.check_directories() {
        fatal(&e.to_string());
    }

    // ── Logging ──
    if let Err(e) = init_logging(&config.storage.log_dir) {
        fatal(&format!("Falha ao abrir arquivo de log: {e}"));
    }
    info!("Configuração: {}", config_path.display());

    // ── Transporte + agente ──
    let transport = match HttpTransport::new(&config.connection) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let active = config.devices.iter().filter(|d| d.active).count();
    let interval = config.poll.interval_secs;
    let base_url = format!("{}://{}", config.connection.scheme, config.connection.server);
    let local_only = config.storage.local_only;
    let cache_dir = config.storage.cache_dir.clone();

    let mut agent = match Agent::new(config, transport) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Falha ao criar fontes de telemetria: {e}");
            std::process::exit(1);
        }
    };
    if local_only {
        warn!("Modo local ativo: nada será enviado ao servidor");
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA SENDER – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Servidor:     {base_url}");
    println!("  Dispositivos: {active} ativos");
    println!("  Intervalo:    {interval:.1}s");
    println!("  Cache:        {}", cache_dir.display());
    println!("══════════════════════════════════════════════");
    println!();

    agent.run()
}

/// `--config <caminho>`
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Stdout + arquivo `<log_dir>/<AAAA-MM-DD>_messages.log`, sem ANSI.
///
/// O nome do arquivo é fixado na partida.
fn init_logging(log_dir: &Path) -> std::io::Result<()> {
    let file_name = format!("{}_messages.log", chrono::Local::now().format("%Y-%m-%d"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .init();
    Ok(())
}

/// Erro de partida: o logging ainda não existe.
fn fatal(message: &str) -> ! {
    eprintln!("Erro: {message}");
    std::process::exit(1);
}
