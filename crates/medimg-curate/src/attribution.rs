use medimg_model::{image_file_name, CuratedImage, ImageMetadata};

/// Credits that carry no information.
fn is_known_credit(credit: &str) -> bool {
    let c = credit.trim().to_lowercase();
    !c.is_empty() && c != "unknown" && c != "nan"
}

/// Full attribution line:
/// `"Title" | Credit: ... | License: ... | Source: ...`.
///
/// Parts with no usable value are left out. The license part only appears
/// when the license is recognizably public domain or Creative Commons.
pub fn attribution_text(meta: &ImageMetadata) -> String {
    let mut parts = Vec::new();

    let title = meta.title.trim();
    if !title.is_empty() && title != "Unknown" {
        parts.push(format!("\"{title}\""));
    }

    if is_known_credit(&meta.credit) {
        parts.push(format!("Credit: {}", meta.credit.trim()));
    }

    let license = meta.license.to_lowercase();
    if license.contains("public domain") {
        parts.push("License: Public Domain".to_string());
    } else if license.contains("cc-by") || license.contains("creative commons") {
        parts.push("License: Creative Commons".to_string());
    }

    if !meta.source.is_empty() {
        parts.push(format!("Source: {}", meta.source));
    }

    parts.join(" | ")
}

/// Short figure caption: `Title. Credit: Creator.`
pub fn caption_text(meta: &ImageMetadata) -> String {
    let mut parts = Vec::new();
    if !meta.title.trim().is_empty() {
        parts.push(meta.title.trim().to_string());
    }
    if is_known_credit(&meta.credit) {
        parts.push(format!("Credit: {}", meta.credit.trim()));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("{}.", parts.join(". "))
    }
}

pub fn curated(meta: ImageMetadata, educational_score: u32) -> CuratedImage {
    let attribution_text = attribution_text(&meta);
    let caption_text = caption_text(&meta);
    CuratedImage {
        image_id: meta.image_id,
        rank: meta.rank,
        title: meta.title,
        description: meta.description,
        credit: meta.credit,
        license: meta.license,
        license_class: meta.license_class,
        source: meta.source,
        educational_score,
        attribution_text,
        caption_text,
    }
}

/// Human-readable list of every curated image with its attribution.
///
/// File names are the ones the curated download step writes.
pub fn attributions_listing(images: &[CuratedImage]) -> String {
    let rule = "=".repeat(70);
    let sep = "-".repeat(70);
    let mut out = format!("{rule}\nIMAGE ATTRIBUTIONS\n{rule}\n\n");
    for image in images {
        out.push_str(&format!("Image ID: {}\n", image.image_id));
        out.push_str(&format!("File: {}\n", image_file_name(&image.image_id)));
        out.push_str(&format!("Attribution: {}\n", image.attribution_text));
        out.push_str(&format!("Caption: {}\n", image.caption_text));
        out.push_str(&format!("\n{sep}\n\n"));
    }
    out
}
