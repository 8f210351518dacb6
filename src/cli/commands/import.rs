//! Import command: register image files as pages.
//!
//! Walks the data directory for scanned images and inserts a page row for
//! each one not already registered. Safe to rerun; existing registrations
//! are skipped by image path.

use std::path::{Path, PathBuf};

use console::style;
use uuid::Uuid;

use super::build_graph;
use crate::config::Settings;
use crate::models::Page;

const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff", "jpg", "jpeg", "png", "bmp"];

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                out.push(path);
            }
        }
    }
    Ok(())
}

pub async fn cmd_import(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    let mut images = Vec::new();
    collect_images(&settings.data_dir, &mut images)?;
    images.sort();

    let mut registered = 0usize;
    let mut skipped = 0usize;

    for path in images {
        if limit > 0 && registered >= limit {
            break;
        }

        let rel = path
            .strip_prefix(&settings.data_dir)
            .unwrap_or(&path)
            .display()
            .to_string();

        if graph.pages.find_by_image_path(&rel).await?.is_some() {
            skipped += 1;
            continue;
        }

        let page = Page::new(Uuid::new_v4().to_string(), rel);
        graph.pages.insert(&page).await?;
        registered += 1;
    }

    println!(
        "  {} Registered {} pages ({} already known)",
        style("✓").green(),
        registered,
        skipped
    );

    Ok(())
}
