//! Discovery of embedded images in rendered article HTML.
//!
//! Only absolute `http(s)` sources are matched. Relative and
//! protocol-relative `src` values are left alone, so such images keep
//! pointing at the source platform after migration.
//!
//! An escaped ampersand in a `src` value (`&amp;`, `&#38;`, `&#x26;`) is
//! decoded, so the yielded URL is the one written in the Markdown body.
use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img\s(?:[^>]*?\s)?src="(https?://[^"]+)""#).expect("valid img regex")
});

/// Lazily yields image URLs in document order, duplicates included.
///
/// Cloning before iteration gives an independent pass over the same HTML.
#[derive(Debug, Clone)]
pub struct ImageSources<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> Iterator for ImageSources<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos > self.html.len() {
            return None;
        }
        let Some(caps) = IMG_SRC.captures_at(self.html, self.pos) else {
            self.pos = self.html.len() + 1;
            return None;
        };
        let whole = caps.get(0)?;
        self.pos = whole.end();
        caps.get(1).map(|m| unescape_ampersands(m.as_str()))
    }
}

pub fn find_images(html: &str) -> ImageSources<'_> {
    ImageSources { html, pos: 0 }
}

fn unescape_ampersands(src: &str) -> Cow<'_, str> {
    if !src.contains("&#") && !src.contains("&amp;") {
        return Cow::Borrowed(src);
    }
    Cow::Owned(
        src.replace("&amp;", "&")
            .replace("&#38;", "&")
            .replace("&#x26;", "&"),
    )
}
