//! Bakes the station's primary topic into the simulator.
//!
//! Read from `VANE_PRIMARY_TOPIC`, either in the environment or in a `.env`
//! file next to the manifest.

const DEFAULT_PRIMARY_TOPIC: &str = "vane/sim";

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=VANE_PRIMARY_TOPIC");

    // A missing .env is fine, the environment or the default is used instead
    let _ = dotenvy::dotenv();

    let topic = std::env::var("VANE_PRIMARY_TOPIC")
        .unwrap_or_else(|_| DEFAULT_PRIMARY_TOPIC.to_string());
    println!("cargo:rustc-env=VANE_PRIMARY_TOPIC={topic}");
}
