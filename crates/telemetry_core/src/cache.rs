//! Cache em disco – arquivos append-only por dispositivo e por dia.
//!
//! Cada linha é um [`TelemetryRecord`] em JSON compacto, na ordem de criação.
//! Um arquivo só é removido depois que o drainer confirma todas as linhas.

use crate::protocol::{CACHE_EXTENSION, CacheFileName, CodecError, decode_record, encode_record};
use crate::types::TelemetryRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Erros do cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Erro de E/S em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Um arquivo de cache encontrado no diretório.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheFile {
    pub name: CacheFileName,
    pub path: PathBuf,
}

/// Estado agregado do cache (apenas informativo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHealth {
    Pending { files: usize, records: usize },
    /// Diretório ilegível no momento da checagem
    Unknown,
}

/// Armazenamento de cache num diretório.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Caminho do arquivo de hoje para o dispositivo.
    pub fn today_path(&self, device_key: &str) -> PathBuf {
        self.dir.join(CacheFileName::today(device_key).encode())
    }

    /// Acrescenta um registro ao arquivo de hoje do dispositivo.
    ///
    /// Cria diretório e arquivo se necessário. Retorna o caminho usado.
    pub fn append(&self, device_key: &str, record: &TelemetryRecord) -> Result<PathBuf, CacheError> {
        let line = encode_record(record)?;

        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let path = self.today_path(device_key);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CacheError::io(&path, e))?;
        // Linha inteira numa única escrita
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(|e| CacheError::io(&path, e))?;

        debug!("Cache += 1 registro em {}", path.display());
        Ok(path)
    }

    /// Lista todos os arquivos de cache, ordenados por dono e data.
    ///
    /// Arquivos com nome fora do padrão são ignorados.
    pub fn list_cache_files(&self) -> Result<Vec<CacheFile>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match CacheFileName::parse(file_name) {
                Ok(name) => files.push(CacheFile { name, path }),
                Err(e) => debug!("Ignorando {}: {e}", path.display()),
            }
        }

        files.sort();
        Ok(files)
    }

    /// Arquivos de um dispositivo, do mais antigo ao mais novo.
    pub fn files_for(&self, device_key: &str) -> Result<Vec<CacheFile>, CacheError> {
        Ok(self
            .list_cache_files()?
            .into_iter()
            .filter(|f| f.name.device_key == device_key)
            .collect())
    }

    /// Conta as linhas não vazias de um arquivo.
    pub fn line_count(&self, path: &Path) -> Result<usize, CacheError> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let mut count = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| CacheError::io(path, e))?;
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Lê as linhas não vazias de um arquivo, sem reinterpretar o conteúdo.
    pub fn read_lines(&self, path: &Path) -> Result<Vec<String>, CacheError> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| CacheError::io(path, e))?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Decodifica todos os registros de um arquivo.
    pub fn read_records(&self, path: &Path) -> Result<Vec<TelemetryRecord>, CacheError> {
        self.read_lines(path)?
            .iter()
            .map(|l| decode_record(l).map_err(CacheError::from))
            .collect()
    }

    pub fn remove(&self, path: &Path) -> Result<(), CacheError> {
        fs::remove_file(path).map_err(|e| CacheError::io(path, e))
    }

    /// Checagem informativa: quantos arquivos e registros aguardam envio.
    ///
    /// Nunca altera o cache e nunca falha; diretório ilegível vira
    /// [`CacheHealth::Unknown`].
    pub fn health_check(&self) -> CacheHealth {
        let files = match self.list_cache_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Não foi possível ler {}: {e}", self.dir.display());
                return CacheHealth::Unknown;
            }
        };

        let mut records = 0;
        for file in &files {
            match self.line_count(&file.path) {
                Ok(n) => records += n,
                Err(e) => {
                    warn!("Não foi possível ler {}: {e}", file.path.display());
                    return CacheHealth::Unknown;
                }
            }
        }

        if !files.is_empty() || records != 0 {
            info!("Cache: {} arquivos com {} registros pendentes", files.len(), records);
        }
        CacheHealth::Pending {
            files: files.len(),
            records,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
