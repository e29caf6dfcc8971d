//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! pdfium keeps thread-local state and is not safe to drive from async
//! contexts, so all work happens inside `tokio::task::spawn_blocking`.
//! Images are scaled from the page's point size by `dpi / 72`, with a hard cap
//! on the longest edge so oversized pages cannot exhaust memory.

use crate::config::ExtractionConfig;
use crate::error::Pdf2RulesError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Longest rendered edge in pixels, regardless of DPI.
const MAX_RENDERED_PIXELS: i32 = 4000;

/// Rasterise all pages of a PDF, in page order.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<DynamicImage>, Pdf2RulesError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let password = config.password.clone();
    let lib_path = config.pdfium_lib_path.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, password.as_deref(), lib_path.as_deref())
    })
    .await
    .map_err(|e| Pdf2RulesError::Internal(format!("Render task panicked: {}", e)))?
}

fn bind(lib_path: Option<&Path>) -> Result<Pdfium, Pdf2RulesError> {
    let bound = match lib_path {
        Some(p) => pdfium_auto::bind_pdfium_from_path(p),
        None => pdfium_auto::bind_pdfium_silent(),
    };
    bound.map_err(|e| Pdf2RulesError::PdfiumBindingFailed(e.to_string()))
}

fn open<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2RulesError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2RulesError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2RulesError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2RulesError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    lib_path: Option<&Path>,
) -> Result<Vec<DynamicImage>, Pdf2RulesError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(Pdf2RulesError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages, rendering at {} DPI", total_pages, dpi);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDERED_PIXELS)
        .set_maximum_height(MAX_RENDERED_PIXELS);

    let mut images = Vec::with_capacity(total_pages);
    for idx in 0..total_pages {
        let page = pages
            .get(idx as u16)
            .map_err(|e| Pdf2RulesError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2RulesError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {}/{} → {}x{} px",
            idx + 1,
            total_pages,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
