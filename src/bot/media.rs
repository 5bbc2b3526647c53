//! Media handling for photo and voice messages
//!
//! Downloads Telegram files, prepares photos for the edit endpoint and
//! runs the voice transcode pipeline through the system `ffmpeg`.

use crate::llm::AiBackend;
use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileMeta;
use tokio::process::Command;
use tracing::{debug, warn};

/// Select the photo variant closest to the target dimensions.
///
/// An exact match wins immediately. Otherwise the variant minimizing the
/// sum of absolute width and height deltas is chosen, the first
/// encountered winning ties.
#[must_use]
pub fn pick_edit_variant(dims: &[(u32, u32)], target: (u32, u32)) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &(width, height)) in dims.iter().enumerate() {
        if (width, height) == target {
            return Some(index);
        }
        let distance = width.abs_diff(target.0) + height.abs_diff(target.1);
        if best.is_none_or(|(_, current)| distance < current) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}

/// Download a Telegram file into memory
///
/// # Errors
///
/// Returns an error if the file metadata request or the download fails.
pub async fn download_file(bot: &Bot, file: &FileMeta) -> Result<Vec<u8>> {
    let file = bot.get_file(file.id.clone()).await?;
    let mut buffer = Vec::new();
    bot.download_file(&file.path, &mut buffer).await?;
    debug!("Downloaded {} bytes from Telegram", buffer.len());
    Ok(buffer)
}

/// Image and mask bytes ready for the edit endpoint
pub struct EditPayload {
    /// RGBA photo, PNG-encoded at the target size
    pub image_png: Vec<u8>,
    /// Fully transparent mask covering the whole canvas
    pub mask_png: Vec<u8>,
}

/// Normalize photo bytes for editing.
///
/// The photo is resized to the target dimensions, converted to RGBA and
/// PNG-encoded; the mask is transparent everywhere, marking the entire
/// canvas as editable.
///
/// # Errors
///
/// Returns an error if decoding or encoding fails.
pub fn prepare_edit_payload(photo_bytes: &[u8], target: (u32, u32)) -> Result<EditPayload> {
    let decoded = image::load_from_memory(photo_bytes).context("failed to decode photo")?;
    let resized = decoded
        .resize_exact(target.0, target.1, FilterType::Lanczos3)
        .to_rgba8();

    let mut image_png = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut image_png), ImageFormat::Png)
        .context("failed to encode image")?;

    let mask = RgbaImage::from_pixel(target.0, target.1, Rgba([0, 0, 0, 0]));
    let mut mask_png = Vec::new();
    mask.write_to(&mut Cursor::new(&mut mask_png), ImageFormat::Png)
        .context("failed to encode mask")?;

    Ok(EditPayload {
        image_png,
        mask_png,
    })
}

/// Download, transcode and transcribe one voice note.
///
/// The OGG original is removed right after conversion and the MP3 after
/// transcription. Cleanup is best-effort; a failed removal is logged and
/// never masks the pipeline result.
///
/// # Errors
///
/// Returns an error if the download, conversion or transcription fails.
pub async fn transcribe_voice(
    bot: &Bot,
    ai: &dyn AiBackend,
    voice: &teloxide::types::Voice,
    unique_tag: &str,
) -> Result<String> {
    let work_dir = std::env::temp_dir();
    let source = work_dir.join(format!("voice_{unique_tag}.oga"));
    let converted = work_dir.join(format!("voice_{unique_tag}.mp3"));

    let bytes = download_file(bot, &voice.file).await?;
    tokio::fs::write(&source, &bytes)
        .await
        .context("failed to store voice file")?;

    let convert_result = convert_to_mp3(&source, &converted).await;
    remove_quietly(&source).await;
    convert_result?;

    let transcript = ai.transcribe(&converted).await;
    remove_quietly(&converted).await;
    Ok(transcript?)
}

async fn convert_to_mp3(input: &Path, output: &Path) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .arg(output)
        .output()
        .await
        .context("failed to spawn ffmpeg")?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr.chars().take(400).collect();
        return Err(anyhow!("ffmpeg conversion failed: {tail}"));
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temporary file {}: {}", path.display(), e);
        }
    }
}
