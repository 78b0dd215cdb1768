// Detail page parsing.
//
// An image's detail page carries a large preview, a link to the retrieve
// endpoint, and a two-column information table (label in `th`, value in
// `td`). Older cached pages use "Label: value" paragraphs instead.

use medimg_model::{ImageMetadata, LicenseClass, SearchHit};
use scraper::{Html, Selector};

use crate::config::absolute_url;

/// Pages shorter than this are throttling notices or empty shells.
const MIN_DETAIL_PAGE_BYTES: usize = 1000;

/// Canonical detail page URL for an image id.
pub fn detail_url(base: &str, image_id: &str) -> String {
    absolute_url(base, &format!("details.cfm?imageid={image_id}"))
}

/// Whether a fetched body is a real detail page.
pub fn looks_like_detail_page(html: &str) -> bool {
    html.len() > MIN_DETAIL_PAGE_BYTES && html.to_lowercase().contains("imageid")
}

/// Find the full-resolution image link on a detail page.
///
/// Prefers the large preview image (`img.previewlg`); otherwise the first
/// link to the retrieve endpoint.
pub fn find_full_res_url(html: &str, base: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let preview_sel = Selector::parse("img.previewlg").expect("valid selector");
    if let Some(src) = document
        .select(&preview_sel)
        .filter_map(|img| img.value().attr("src"))
        .find(|src| !src.trim().is_empty())
    {
        return Some(absolute_url(base, src));
    }

    let link_sel = Selector::parse("a[href]").expect("valid selector");
    document
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("retrieve.cfm"))
        .map(|href| absolute_url(base, href))
}

#[derive(Debug, Default)]
struct Fields {
    title: String,
    description: String,
    credit: String,
    license: String,
}

/// Build the metadata record for `hit` from its detail page.
pub fn parse_metadata(html: &str, hit: &SearchHit, base: &str, query: &str) -> ImageMetadata {
    let document = Html::parse_document(html);
    let mut fields = Fields::default();

    let h2_sel = Selector::parse("h2").expect("valid selector");
    if let Some(h2) = document.select(&h2_sel).next() {
        fields.title = element_text(h2);
    }

    read_info_table(&document, &mut fields);
    read_labelled_paragraphs(&document, &mut fields);

    if fields.title.is_empty() {
        fields.title = hit.title.clone();
    }

    let combined = format!(
        "{} {} {} {}",
        fields.title, fields.description, fields.credit, fields.license
    );

    ImageMetadata {
        image_id: hit.image_id.clone(),
        rank: hit.rank,
        query: query.to_string(),
        license_class: LicenseClass::classify(&combined),
        title: fields.title,
        description: fields.description,
        credit: fields.credit,
        license: fields.license,
        source: detail_url(base, &hit.image_id),
        thumbnail: hit.thumbnail.clone(),
        full_res_url: find_full_res_url(html, base),
    }
}

fn read_info_table(document: &Html, fields: &mut Fields) {
    let table_sel = Selector::parse("table.image-information-text").expect("valid selector");
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let th_sel = Selector::parse("th").expect("valid selector");
    let td_sel = Selector::parse("td").expect("valid selector");

    let Some(table) = document.select(&table_sel).next() else {
        return;
    };

    for tr in table.select(&tr_sel) {
        let (Some(th), Some(td)) = (tr.select(&th_sel).next(), tr.select(&td_sel).next()) else {
            continue;
        };

        let label = element_text(th).to_lowercase();
        let label = label.trim_end_matches(':');
        let value = element_text(td);

        if label.contains("title") {
            fields.title = value;
        } else if label.contains("description") {
            fields.description = value;
        } else if ["credit", "source", "creator"].iter().any(|k| label.contains(k)) {
            fields.credit = value;
        } else if ["license", "rights", "usage", "copyright"].iter().any(|k| label.contains(k)) {
            fields.license = value;
        } else if ["terms", "reuse", "attribution"].iter().any(|k| label.contains(k)) {
            if fields.license.is_empty() {
                fields.license = value;
            }
        }
    }
}

/// Fill fields still empty from "Label: value" paragraphs.
fn read_labelled_paragraphs(document: &Html, fields: &mut Fields) {
    let p_sel = Selector::parse("p").expect("valid selector");

    for p in document.select(&p_sel) {
        let text = element_text(p);
        let slot = if let Some(v) = text.strip_prefix("Title:") {
            Some((&mut fields.title, v))
        } else if let Some(v) = text.strip_prefix("Description:") {
            Some((&mut fields.description, v))
        } else if let Some(v) = text.strip_prefix("Source:") {
            Some((&mut fields.credit, v))
        } else if let Some(v) = text.strip_prefix("Reuse Restrictions:") {
            Some((&mut fields.license, v))
        } else {
            None
        };

        if let Some((field, value)) = slot {
            if field.is_empty() {
                *field = value.trim().to_string();
            }
        }
    }
}

/// Text content with whitespace runs collapsed to single spaces.
fn element_text(element: scraper::ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
