//! Pages: load an HTML file, or build one from image paths.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use super::dom::{Document, parse_selector};
use crate::config::TrackerConfig;

/// Parse the HTML page at `path`
pub fn load_page(path: &Path) -> Result<Document> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page: {}", path.display()))?;
    Ok(Document::parse(&markup))
}

/// Markup with one `<img>` per path plus a progress bar.
///
/// Images carry the source attribute and start with the invisible class, as
/// recommended for hand-written pages.
pub fn page_markup(paths: &[PathBuf], config: &TrackerConfig) -> String {
    let mut out = String::from("<!DOCTYPE html>\n<html><body>\n");
    out.push_str(
        "<div class=\"images-loaded-progress-bar\" role=\"progressbar\" \
         aria-valuemin=\"0\" aria-valuemax=\"100\"></div>\n",
    );
    for path in paths {
        out.push_str(&format!(
            "<img class=\"{}\" {}=\"{}\">\n",
            escape_attr(&config.invisible_class),
            config.source_attribute,
            escape_attr(&path.display().to_string())
        ));
    }
    out.push_str("</body></html>\n");
    out
}

/// Page built by `page_markup`, checked against the configured selectors.
///
/// Fails when the image selector doesn't find every generated image; a bar
/// selector that misses the generated bar is only warned about.
pub fn page_for_images(paths: &[PathBuf], config: &TrackerConfig) -> Result<Document> {
    parse_selector(&config.image_selector)?;
    parse_selector(&config.progress_bar_selector)?;

    let doc = Document::parse(&page_markup(paths, config));
    let found = doc.select(&config.image_selector)?.len();
    if found != paths.len() {
        anyhow::bail!(
            "Image selector {:?} matches {} of {} generated images; use --page for custom markup",
            config.image_selector,
            found,
            paths.len()
        );
    }
    if doc.select(&config.progress_bar_selector)?.is_empty() {
        warn!(
            "Progress bar selector {:?} doesn't match the generated bar",
            config.progress_bar_selector
        );
    }
    Ok(doc)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::traits::{DomQuery, ElementHandle};

    #[test]
    fn test_for_images_matches_default_selectors() {
        let cfg = TrackerConfig::default();
        let paths = vec![PathBuf::from("a.png"), PathBuf::from("b & \"c\".jpg")];
        let doc = page_for_images(&paths, &cfg).unwrap();

        let imgs = doc.query_all(&cfg.image_selector);
        assert_eq!(imgs.len(), 2);
        assert_eq!(imgs[0].attribute("data-images-loaded-src").as_deref(), Some("a.png"));
        assert_eq!(imgs[1].attribute("data-images-loaded-src").as_deref(), Some("b & \"c\".jpg"));
        assert!(imgs[1].has_class(&cfg.invisible_class));
        assert_eq!(imgs[1].describe(), "<img.images-loaded--invisible>");

        let bar = doc.query(&cfg.progress_bar_selector).unwrap();
        assert_eq!(bar.attribute("role").as_deref(), Some("progressbar"));
    }

    #[test]
    fn test_for_images_custom_source_attribute() {
        let cfg = TrackerConfig {
            image_selector: "body > img[data-src]".to_string(),
            source_attribute: "data-src".to_string(),
            ..Default::default()
        };
        let doc = page_for_images(&[PathBuf::from("x.png")], &cfg).unwrap();
        let imgs = doc.query_all(&cfg.image_selector);
        assert_eq!(imgs.len(), 1);
        assert_eq!(imgs[0].attribute("data-src").as_deref(), Some("x.png"));
    }

    #[test]
    fn test_for_images_selector_must_find_images() {
        let cfg = TrackerConfig {
            image_selector: "img.gallery".to_string(),
            ..Default::default()
        };
        assert!(page_for_images(&[PathBuf::from("x.png")], &cfg).is_err());

        let cfg = TrackerConfig {
            image_selector: "img >".to_string(),
            ..Default::default()
        };
        assert!(page_for_images(&[], &cfg).is_err());
    }

    #[test]
    fn test_load_page() {
        let dir = std::env::temp_dir().join(format!("imgprogress-page-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("page.html");
        std::fs::write(
            &path,
            r#"<img data-images-loaded-src="s.png"><p id="p" class="images-loaded-progress-bar">0/1</p>"#,
        )
        .unwrap();

        let doc = load_page(&path).unwrap();
        assert_eq!(doc.query_all("[data-images-loaded-src]").len(), 1);
        let bar = doc.query("#p").unwrap();
        assert_eq!(bar.text(), "0/1");
        assert_eq!(bar.mutations(), 0);

        assert!(load_page(&dir.join("missing.html")).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
