//! On-disk fixtures: a database directory with its config file, resources and uploads.

use super::constants::*;
use anyhow::Result;
use siteworks_server::config::{AppConfig, CliConfig, FileConfig};
use siteworks_server::{AppServices, RequestsLoggingLevel};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Fully opened application services over a temporary database directory.
pub struct TestServices {
    pub config: AppConfig,
    pub services: Arc<AppServices>,
    pub dir: TempDir,
}

/// Encodes a solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    out.into_inner()
}

fn write_config_file(dir: &Path) -> Result<FileConfig> {
    let path = dir.join("siteworks.toml");
    fs::write(
        &path,
        format!(
            r#"
            vault_key = "{TEST_VAULT_KEY}"

            [task_queue]
            max_concurrent = 2
            poll_interval_secs = 1

            [schedules]
            enabled = false

            [geo]
            endpoint = "http://127.0.0.1:9/"
            timeout_secs = 1
            "#
        ),
    )?;
    FileConfig::load(&path)
}

fn write_images(config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.resources_dir)?;
    fs::write(
        config.resources_dir.join(RESOURCE_IMAGE),
        png_bytes(RESOURCE_IMAGE_WIDTH, RESOURCE_IMAGE_HEIGHT),
    )?;

    let uploaded = config.files_dir.join(UPLOADED_IMAGE);
    if let Some(parent) = uploaded.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(uploaded, png_bytes(30, 30))?;
    Ok(())
}

/// Opens every store in a fresh temporary directory.
///
/// `asset_base_url` is the address `files/` thumbnail sources are fetched from;
/// servers pass their own base URL.
pub fn open_test_services(asset_base_url: Option<String>) -> Result<TestServices> {
    let dir = TempDir::new()?;
    let file_config = write_config_file(dir.path())?;

    let cli = CliConfig {
        db_dir: Some(dir.path().to_path_buf()),
        port: 0,
        metrics_port: 0,
        logging_level: RequestsLoggingLevel::None,
        asset_base_url,
        ..Default::default()
    };
    let config = AppConfig::resolve(&cli, Some(file_config))?;
    write_images(&config)?;

    let services = Arc::new(AppServices::open(&config)?);
    Ok(TestServices {
        config,
        services,
        dir,
    })
}
