fn main() {
    // Stamp the build time into BUILD_DATE for the startup banner
    let build_date = chrono::Utc::now()
        .format("%Y-%m-%d %H:%M UTC")
        .to_string();
    println!("cargo:rustc-env=BUILD_DATE={}", build_date);
    println!("cargo:rerun-if-changed=build.rs");
}
