use std::{env, error::Error, fs, path::PathBuf};

/// Embeds the worker executable named by `INFINITY_WORKER_BINARY`.
///
/// Without it the payload is empty and launching fails at runtime, which keeps
/// `cargo build` working on machines that never run a real collector.
fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed=INFINITY_WORKER_BINARY");

    let out = PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?).join("worker.bin");
    match env::var_os("INFINITY_WORKER_BINARY") {
        Some(src) => {
            let src = PathBuf::from(src);
            println!("cargo:rerun-if-changed={}", src.display());
            fs::copy(&src, &out)
                .map_err(|e| format!("embed worker binary {}: {e}", src.display()))?;
        }
        None => fs::write(&out, [])?,
    }
    Ok(())
}
