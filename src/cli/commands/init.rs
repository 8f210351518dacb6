//! Init command: create the data directory and database schema.

use console::style;

use crate::config::Settings;

pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    println!(
        "  {} Data directory: {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    crate::repository::run_migrations(&settings.database_url()).await?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        settings.database_path.display()
    );

    let ocr = crate::ocr::TesseractEngine::new(&settings.rescan.language);
    use crate::ocr::OcrEngine;
    if ocr.is_available() {
        println!("  {} Tesseract available", style("✓").green());
    } else {
        println!(
            "  {} Tesseract not found (install tesseract-ocr before scanning)",
            style("!").yellow()
        );
    }

    Ok(())
}
