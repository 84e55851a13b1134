use std::{ffi::c_void, mem, path::Path};

use libloading::Library;
use log::{debug, error, warn};

use super::abi::{
    AddPixelFn, FreeFn, GetPixelFn, InitFn, SetPixelFn, WriteImageFn, ADD_PIXEL_SYMBOL,
    FREE_SYMBOL, GET_PIXEL_SYMBOL, INIT_SYMBOL, SET_PIXEL_SYMBOL, WRITE_SYMBOL,
};
use crate::error::{Error, Result};

/// Something exported symbols can be looked up in.
pub(crate) trait SymbolSource {
    /// Address of the NUL-terminated symbol `name`, or `None` if it is not exported.
    fn address(&self, name: &[u8]) -> Option<*const c_void>;
}

impl SymbolSource for Library {
    fn address(&self, name: &[u8]) -> Option<*const c_void> {
        // SAFETY: the symbol is read as a plain address; it is only called after being cast to
        // the signature the module interface declares for that name.
        let symbol = unsafe { self.get::<*const c_void>(name) }.ok()?;
        let address = *symbol;
        (!address.is_null()).then_some(address)
    }
}

/// Entry points resolved from a module. The mandatory ones are always present.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PluginVTable {
    pub init: InitFn,
    pub add_pixel: AddPixelFn,
    pub write: WriteImageFn,
    pub set_pixel: Option<SetPixelFn>,
    pub get_pixel: Option<GetPixelFn>,
    pub free: Option<FreeFn>,
}

impl PluginVTable {
    /// Looks up every entry point in `source`. Fails without returning anything partial if a
    /// mandatory one is missing.
    ///
    /// # Safety
    /// Each exported symbol must have the signature the module interface declares for its name.
    pub(crate) unsafe fn resolve<S: SymbolSource>(source: &S, path: &Path) -> Result<Self> {
        let required = |name: &'static [u8]| {
            source.address(name).ok_or_else(|| Error::ModuleInvalid {
                path: path.to_path_buf(),
                symbol: symbol_name(name),
            })
        };
        let init = required(INIT_SYMBOL)?;
        let add_pixel = required(ADD_PIXEL_SYMBOL)?;
        let write = required(WRITE_SYMBOL)?;

        Ok(Self {
            init: mem::transmute::<*const c_void, InitFn>(init),
            add_pixel: mem::transmute::<*const c_void, AddPixelFn>(add_pixel),
            write: mem::transmute::<*const c_void, WriteImageFn>(write),
            set_pixel: source
                .address(SET_PIXEL_SYMBOL)
                .map(|address| mem::transmute::<*const c_void, SetPixelFn>(address)),
            get_pixel: source
                .address(GET_PIXEL_SYMBOL)
                .map(|address| mem::transmute::<*const c_void, GetPixelFn>(address)),
            free: source
                .address(FREE_SYMBOL)
                .map(|address| mem::transmute::<*const c_void, FreeFn>(address)),
        })
    }
}

/// Opens the module at `path` and resolves its entry points. The module is closed again if
/// validation fails.
pub(crate) fn open_module(path: &Path) -> Result<(Library, PluginVTable)> {
    if path.as_os_str().is_empty() {
        error!("Custom image processor requested without specification");
        return Err(Error::NotConfigured);
    }

    // SAFETY: loading runs the module's initializers. A module is trusted once configured.
    let library = unsafe { Library::new(path) }.map_err(|source| {
        error!("Error loading shared object {}: {}", path.display(), source);
        Error::ModuleLoadFailed {
            path: path.to_path_buf(),
            source,
        }
    })?;

    // SAFETY: modules implementing the interface export these names with the declared signatures.
    match unsafe { PluginVTable::resolve(&library, path) } {
        Ok(vtable) => {
            debug!(
                "Loaded image module {} (set_pixel: {}, get_pixel: {}, free: {})",
                path.display(),
                vtable.set_pixel.is_some(),
                vtable.get_pixel.is_some(),
                vtable.free.is_some()
            );
            Ok((library, vtable))
        }
        Err(err) => {
            error!("Invalid image processing module specified: {}", err);
            if let Err(close_err) = library.close() {
                warn!("Error closing {}: {}", path.display(), close_err);
            }
            Err(err)
        }
    }
}

fn symbol_name(name: &'static [u8]) -> &'static str {
    let name = name.strip_suffix(b"\0").unwrap_or(name);
    std::str::from_utf8(name).unwrap_or("<non-utf8 symbol>")
}
