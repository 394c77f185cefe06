//! Compiles the jump engine's register-switching primitive.
//!
//! The context and thread engines are pure Rust (`libc::ucontext_t` and
//! `std::thread`/`std::sync::Barrier` respectively) and need nothing here.
//! The jump engine needs a few dozen instructions of hand-written assembly
//! to save/restore the callee-saved registers and the stack pointer, the
//! same split `rustcc/coroutine-rs` used `gcc` for and `frenetic` uses `cc`
//! for (see DESIGN.md).

use std::path::PathBuf;

fn main() {
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap();

    let file = match arch.as_str() {
        "x86_64" => "x86_64_sysv.S",
        "aarch64" => "aarch64_aapcs.S",
        other => {
            println!(
                "cargo:warning=qlcoro: no jump-engine assembly for target_arch={}; \
                 the jump engine will be unavailable on this target",
                other
            );
            return;
        }
    };

    let path: PathBuf = ["src", "engine", "jump", "asm", file].iter().collect();
    println!("cargo:rerun-if-changed={}", path.display());

    cc::Build::new()
        .file(&path)
        .flag_if_supported("-fno-exceptions")
        .compile("qlcoro_jump");

    println!("cargo:rustc-cfg=qlcoro_jump_asm");
}
