//! Despacho de la extracción por categoría.
//!
//! Cada backend combina varias fuentes independientes; el fallo de una fuente se
//! registra en el mapa y nunca detiene a las demás ni llega al llamador.

mod archive;
mod audio;
mod binary;
pub mod capabilities;
mod container;
mod document;
mod ffprobe;
mod generic;
pub mod hashing;
mod image;
mod native;
mod office;
mod pdf;
#[cfg(unix)]
mod permissions;
pub mod signature;
mod source;
mod text;
mod video;

pub use capabilities::{Capabilities, FixedLocator, SourceStatus, SystemLocator, ToolLocator};
pub use source::Source;

use crate::classify::Category;
use crate::config::ExtractOptions;
use crate::metadata::MetadataMap;
use std::path::Path;
use std::sync::OnceLock;

/// Opciones fijas más las herramientas externas detectadas al crearlo.
#[derive(Clone, Debug)]
pub struct Extractor {
    options: ExtractOptions,
    capabilities: Capabilities,
}

impl Extractor {
    /// Sondea el sistema con las opciones por defecto.
    pub fn new() -> Self {
        Self::with_options(ExtractOptions::default())
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        let capabilities = Capabilities::detect(options.ffprobe_path.as_deref());
        Self {
            options,
            capabilities,
        }
    }

    /// Sin sondeo: las capacidades las decide quien llama.
    pub fn with_capabilities(options: ExtractOptions, capabilities: Capabilities) -> Self {
        Self {
            options,
            capabilities,
        }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn extract(&self, path: &Path, category: Category) -> MetadataMap {
        let span = tracing::debug_span!("extract", path = %path.display(), %category);
        let _guard = span.enter();

        let map = match category {
            Category::Image => image::extract(path, &self.options),
            Category::Audio => audio::extract(path, &self.options),
            Category::Video => {
                video::extract(path, self.capabilities.ffprobe.as_deref(), &self.options)
            }
            Category::Document => document::extract(path, &self.options),
            Category::Archive => archive::extract(path, &self.options),
            Category::Other => generic::extract(path, &self.options),
        };
        tracing::debug!(fields = map.len(), "extracción terminada");
        map
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor del proceso; sus capacidades se sondean una única vez.
pub fn shared() -> &'static Extractor {
    static SHARED: OnceLock<Extractor> = OnceLock::new();
    SHARED.get_or_init(Extractor::new)
}

pub fn extract(path: &Path, category: Category) -> MetadataMap {
    shared().extract(path, category)
}
