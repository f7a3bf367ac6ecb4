use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=LIBMPSSE_DIR");
    println!("cargo:rerun-if-env-changed=FTD2XX_DIR");

    // The vendor libraries are only needed for the FT232H back-end
    if env::var_os("CARGO_FEATURE_MPSSE").is_none() {
        return;
    }

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let project_root = PathBuf::from(&manifest_dir);

    // Shared FTDI libraries live next to the project unless overridden
    let shared_root = project_root.parent().unwrap_or(&project_root).to_path_buf();

    let mpsse_lib_path = env::var_os("LIBMPSSE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| shared_root.join("FTDI MPSSE").join("build").join("Win32").join("DLL"));
    let d2xx_lib_path = env::var_os("FTD2XX_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| shared_root.join("FTDI-D2XX-Drivers-Win-2.12.36.20U").join("x86"));

    println!("cargo:rustc-link-search=native={}", mpsse_lib_path.display());
    println!("cargo:rustc-link-search=native={}", d2xx_lib_path.display());

    // libmpsse depends on FTD2XX, which is resolved at runtime
    println!("cargo:rustc-link-lib=dylib=libmpsse");

    if let Ok(profile) = env::var("PROFILE") {
        let target_dir = project_root.join("target").join(&profile);

        // Only copy into an existing output directory (not during a bare script check)
        if target_dir.exists() {
            let _ = fs::copy(mpsse_lib_path.join("libmpsse.dll"), target_dir.join("libmpsse.dll"));
            let _ = fs::copy(d2xx_lib_path.join("FTD2XX.dll"), target_dir.join("FTD2XX.dll"));
            println!("cargo:warning=Copied runtime DLLs to {}", target_dir.display());
        }
    }
}
