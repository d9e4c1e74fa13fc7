use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Floorlens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory
/// ~/Floorlens/ on all platforms (user-visible, holds cached plan images)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Floorlens")
}

/// Get the tessdata directory used by the bundled OCR engine
pub fn tessdata_dir() -> PathBuf {
    app_data_dir().join("tessdata")
}
