use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!(
        "cargo:rustc-check-cfg=cfg(syncprim_backend, values(\"critical_section\", \"posix\", \"none\"))"
    );

    let backend = if env::var_os("CARGO_FEATURE_SINGLE_THREAD").is_some() {
        "none"
    } else {
        let families = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
        let has_family = |name: &str| families.split(',').any(|family| family == name);

        if has_family("windows") {
            "critical_section"
        } else if has_family("unix") {
            "posix"
        } else {
            panic!(
                "no threading backend for target family {:?}; enable the `single-thread` feature",
                families
            );
        }
    };

    println!("cargo:rustc-cfg=syncprim_backend=\"{}\"", backend);
}
