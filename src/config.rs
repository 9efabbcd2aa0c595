//! Límites y opciones que gobiernan una extracción.

use std::path::PathBuf;
use std::time::Duration;

pub const LIST_LIMIT: usize = 50;
pub const PREVIEW_CHARS: usize = 200;
pub const HEADER_SIZE: usize = 16;
pub const HASH_SIZE_LIMIT: u64 = 100 * 1024 * 1024; // 100 MiB
pub const HASH_CHUNK_SIZE: usize = 8192;
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Máximo de elementos emitidos por cualquier enumeración.
    pub list_limit: usize,
    /// Caracteres conservados en las vistas previas de texto.
    pub preview_chars: usize,
    pub header_size: usize,
    pub hash_size_limit: u64,
    pub hash_chunk_size: usize,
    pub include_hash: bool,
    pub tool_timeout: Duration,
    /// Ruta explícita de ffprobe; tiene prioridad sobre la búsqueda en el sistema.
    pub ffprobe_path: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            list_limit: LIST_LIMIT,
            preview_chars: PREVIEW_CHARS,
            header_size: HEADER_SIZE,
            hash_size_limit: HASH_SIZE_LIMIT,
            hash_chunk_size: HASH_CHUNK_SIZE,
            include_hash: true,
            tool_timeout: TOOL_TIMEOUT,
            ffprobe_path: None,
        }
    }
}
