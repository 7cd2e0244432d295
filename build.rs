//! Build script — links `libespeak-ng` when the `espeak` feature is enabled.
//!
//! Resolution order:
//!   1. `ESPEAK_LIB_DIR` env var  — explicit library directory
//!   2. pkg-config                — standard desktop discovery
//!   3. bare `-lespeak-ng`        — linker searches its default paths

fn main() {
    println!("cargo:rerun-if-env-changed=ESPEAK_LIB_DIR");

    // Without the espeak feature there is nothing native to link.
    if std::env::var("CARGO_FEATURE_ESPEAK").is_err() {
        return;
    }

    // ── Explicit library directory ────────────────────────────────────────────
    if let Ok(dir) = std::env::var("ESPEAK_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
        println!("cargo:rustc-link-lib=dylib=espeak-ng");
        return;
    }

    // ── pkg-config (Linux / macOS) ────────────────────────────────────────────
    if pkg_config::Config::new()
        .atleast_version("1.49")
        .probe("espeak-ng")
        .is_ok()
    {
        // pkg-config emits all necessary rustc-link-* lines itself.
        return;
    }

    // ── Fallback: let the linker search its default paths ─────────────────────
    println!("cargo:rustc-link-lib=dylib=espeak-ng");
}
