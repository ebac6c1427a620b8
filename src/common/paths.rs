use std::path::PathBuf;

// System-wide locations used when facegate is installed as a package.
// DevMode and the [storage] section override these.

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/facegate/facegate.toml")
}

pub fn system_store_dir() -> PathBuf {
    PathBuf::from("/var/lib/facegate/store")
}
