use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use log::{debug, error};
use once_cell::unsync::OnceCell;

use crate::{
    error::{Error, Result},
    image::{Backend, ImageFormat},
    plugin::PluginBackend,
    ppm::PPMBackend,
};

/// Process-wide encoder settings, decided once at startup.
#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    library: Option<PathBuf>,
}

impl EncoderConfig {
    /// Settings with no library module: contexts default to PPM.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the module to load for [`ImageFormat::Library`] and makes that format the
    /// default.
    pub fn set_library_backend(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Image library backend set to {}", path.display());
        self.library = Some(path);
    }

    /// Builder form of [`set_library_backend`](Self::set_library_backend).
    pub fn with_library_backend(mut self, path: impl Into<PathBuf>) -> Self {
        self.set_library_backend(path);
        self
    }

    /// The configured module path, if any.
    pub fn library_backend(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    /// The format contexts get when they ask for [`ImageFormat::Default`].
    pub fn default_format(&self) -> ImageFormat {
        if self.library.is_some() {
            ImageFormat::Library
        } else {
            ImageFormat::Ppm
        }
    }
}

/// Hands out backends for image contexts.
///
/// Owns the configuration, so it cannot change once contexts exist. A configured module is loaded
/// the first time a context asks for it and stays loaded while this registry or any context using
/// it is alive. A failed load is not remembered.
#[derive(Debug)]
pub struct BackendRegistry {
    config: EncoderConfig,
    ppm: Rc<PPMBackend>,
    library: OnceCell<Rc<PluginBackend>>,
}

impl BackendRegistry {
    /// Takes ownership of `config`. No module is loaded yet.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            ppm: Rc::new(PPMBackend::new()),
            library: OnceCell::new(),
        }
    }

    /// A registry whose library backend is already resolved.
    #[cfg(test)]
    pub(crate) fn with_loaded_library(config: EncoderConfig, backend: PluginBackend) -> Self {
        let registry = Self::new(config);
        registry.library.get_or_init(|| Rc::new(backend));
        registry
    }

    /// The settings this registry was built with.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Maps `format` to a concrete format and the backend that implements it.
    pub fn resolve(&self, format: ImageFormat) -> Result<(ImageFormat, Rc<dyn Backend>)> {
        let format = match format {
            ImageFormat::Default => self.config.default_format(),
            other => other,
        };
        let backend: Rc<dyn Backend> = match format {
            ImageFormat::Ppm => self.ppm.clone(),
            ImageFormat::Library => self.library_backend()?,
            ImageFormat::Default => {
                error!("Error locating dispatch table");
                return Err(Error::InvalidArgument("image format did not resolve"));
            }
        };
        debug!("Resolved {} format to the {} backend", format, backend.name());
        Ok((format, backend))
    }

    fn library_backend(&self) -> Result<Rc<PluginBackend>> {
        let path = self.config.library.as_deref().ok_or(Error::NotConfigured)?;
        self.library
            .get_or_try_init(|| {
                let backend = PluginBackend::load(path)?;
                debug!("Image module {} ready", backend.path().display());
                Ok(Rc::new(backend))
            })
            .cloned()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}
