use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CHATTODO_";

fn rust_sources(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// `CHATTODO_*` identifiers mentioned in `source`; the bare prefix is skipped.
fn env_keys(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .filter_map(|token| token.find(ENV_PREFIX).map(|at| &token[at..]))
        .filter(|key| key.len() > ENV_PREFIX.len())
}

fn main() -> io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        if let Ok(content) = fs::read_to_string(&file) {
            keys.extend(env_keys(&content).map(str::to_string));
        }
    }

    let out_dir = env::var_os("OUT_DIR").ok_or_else(|| io::Error::other("OUT_DIR is not set"))?;
    let mut generated = String::from("pub const GENERATED_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in &keys {
        generated.push_str(&format!("    \"{key}\",\n"));
    }
    generated.push_str("];\n");
    fs::write(Path::new(&out_dir).join("chattodo_env_allowlist.rs"), generated)?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
