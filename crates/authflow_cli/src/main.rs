//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `authflow_core` linkage.
//! - Hydrate the persisted stores from a data directory and print their
//!   status, without Flutter/FFI runtime setup.
//!
//! Usage: `authflow_cli [data_dir]`. Other settings come from `AUTHFLOW_*`.

use authflow_core::{AppStores, StateConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> ExitCode {
    println!("authflow_core ping={}", authflow_core::ping());
    println!("authflow_core version={}", authflow_core::core_version());

    let mut config = match StateConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(data_dir) = std::env::args().nth(1) {
        config.data_dir = PathBuf::from(data_dir);
    }

    if let Err(err) = authflow_core::init_logging_for(&config) {
        eprintln!("logging disabled: {err}");
    }

    let stores = match AppStores::open(config, Handle::current()) {
        Ok(stores) => stores,
        Err(err) => {
            eprintln!("store open failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    let report = stores.hydrate().await;
    stores.flush().await;

    let onboarding = stores.onboarding.snapshot();
    println!("data_dir={}", stores.config().data_dir.display());
    println!("platform={}", stores.config().platform);
    println!("hydrated={}", stores.is_hydrated());
    println!(
        "onboarding load={:?} step={} answers={}",
        report.onboarding,
        onboarding.step_index,
        onboarding.answers.len()
    );
    println!("bootstrap={:?}", report.bootstrap);
    println!(
        "session load={:?} signed_in={}",
        report.session,
        stores.session.is_signed_in()
    );
    ExitCode::SUCCESS
}
