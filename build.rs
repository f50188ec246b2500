use std::env;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
    println!("cargo:rerun-if-env-changed=BFORGE_SKIP_HEADER");

    if env::var_os("BFORGE_SKIP_HEADER").is_some() {
        return;
    }

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    if let Err(msg) = write_header(&crate_dir) {
        // A missing header must not break library builds.
        println!("cargo:warning=bforge.h not generated: {msg}");
    }
}

fn write_header(crate_dir: &Path) -> Result<(), String> {
    let output_file = crate_dir.join("include").join("bforge.h");
    if let Some(dir) = output_file.parent() {
        std::fs::create_dir_all(dir).map_err(|e| format!("creating {}: {e}", dir.display()))?;
    }

    let config = cbindgen::Config::from_file(crate_dir.join("cbindgen.toml"))
        .map_err(|e| format!("reading cbindgen.toml: {e}"))?;

    let bindings = cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
        .map_err(|e| e.to_string())?;
    bindings.write_to_file(&output_file);
    Ok(())
}
