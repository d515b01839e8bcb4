#![allow(clippy::print_stdout)]

use std::env;

const BUILD_ID_VAR: &str = "ACME_WFE_BUILD_ID";
const BUILD_HOST_VAR: &str = "ACME_WFE_BUILD_HOST";
const BUILD_TIME_VAR: &str = "ACME_WFE_BUILD_TIME";
const UNSPECIFIED: &str = "Unspecified";

fn main() {
    rerun_if_changed();
    emit_build_metadata();
}

fn rerun_if_changed() {
    println!("cargo:rerun-if-changed=build.rs");
    for var in [BUILD_ID_VAR, BUILD_HOST_VAR, "HOSTNAME"] {
        println!("cargo:rerun-if-env-changed={}", var);
    }
}

// The build id and host may be injected by the release pipeline; the build
// time is always stamped here.
fn emit_build_metadata() {
    let build_id = env::var(BUILD_ID_VAR).unwrap_or_else(|_| UNSPECIFIED.to_string());
    let build_host = env::var(BUILD_HOST_VAR)
        .or_else(|_| env::var("HOSTNAME"))
        .unwrap_or_else(|_| UNSPECIFIED.to_string());
    let build_time = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env={}={}", BUILD_ID_VAR, build_id);
    println!("cargo:rustc-env={}={}", BUILD_HOST_VAR, build_host);
    println!("cargo:rustc-env={}={}", BUILD_TIME_VAR, build_time);
}
