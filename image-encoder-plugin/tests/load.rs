use std::{
    env::consts::{DLL_PREFIX, DLL_SUFFIX},
    path::PathBuf,
};

use rust_image_encoder::{
    BackendRegistry, ColorModel, EncoderConfig, ImageContext, ImageFormat, Rgba,
};

/// The module cargo built for this package. It lands in `deps/` beside the test binary, with a
/// copy one level up for some build layouts.
fn built_module() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let name = format!("{DLL_PREFIX}image_encoder_plugin{DLL_SUFFIX}");
    let candidates = [deps.join(&name), deps.parent().unwrap().join(&name)];
    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .unwrap_or_else(|| panic!("image encoder module not built, looked for {candidates:?}"))
}

#[test_log::test]
fn module_is_built_next_to_tests() {
    let module = built_module();
    assert!(module.is_file());
}

#[test_log::test]
fn encodes_through_the_loaded_module() {
    let module = built_module();
    let registry = BackendRegistry::new(EncoderConfig::new().with_library_backend(module));
    let mut ctx = ImageContext::new();
    ctx.init(&registry, 2, 1, ColorModel::Rgb, ImageFormat::Default)
        .unwrap();
    assert_eq!(ctx.format().unwrap(), ImageFormat::Library);
    assert_eq!(ctx.file_name("coverage").unwrap(), "coverage.pam");

    ctx.add_pixel(1, 2, 3, 4).unwrap();
    ctx.set_pixel(1, 0, Rgba::new(5, 6, 7, 8)).unwrap();
    assert_eq!(ctx.get_pixel(0, 0).unwrap(), Rgba::new(1, 2, 3, 4));

    let mut out = Vec::new();
    ctx.write(&mut out).unwrap();
    let header = b"P7\nWIDTH 2\nHEIGHT 1\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n";
    assert!(out.starts_with(header));
    assert_eq!(&out[header.len()..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    ctx.free();

    // A second context reuses the module already loaded by the registry.
    let mut second = ImageContext::new();
    second
        .init(&registry, 1, 1, ColorModel::Rgb, ImageFormat::Library)
        .unwrap();
}
