//! `scraper`-backed DOM for static HTML snapshots

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Document, DomElement, DomError};

/// Parsed HTML document with an optional base URL
pub struct HtmlPage {
    html: Html,
    base: Option<Url>,
}

impl HtmlPage {
    /// Parse a full document. A `<base href>` in the document refines `base`.
    #[must_use]
    pub fn parse(source: &str, base: Option<Url>) -> Self {
        let html = Html::parse_document(source);
        let base = document_base(&html, base);
        Self { html, base }
    }

    /// Parse an HTML fragment, e.g. a subtree the host just inserted.
    #[must_use]
    pub fn parse_fragment(source: &str, base: Option<Url>) -> Self {
        Self {
            html: Html::parse_fragment(source),
            base,
        }
    }

    #[must_use]
    pub fn root(&self) -> PageElement<'_> {
        PageElement {
            element: self.html.root_element(),
            base: self.base.as_ref(),
        }
    }

}

impl Document for HtmlPage {
    type Element<'a>
        = PageElement<'a>
    where
        Self: 'a;

    fn query_all(&self, selector: &str) -> Result<Vec<PageElement<'_>>, DomError> {
        let parsed = Selector::parse(selector).map_err(|e| DomError::Selector {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;

        Ok(self
            .html
            .select(&parsed)
            .map(|element| PageElement {
                element,
                base: self.base.as_ref(),
            })
            .collect())
    }

    fn base_url(&self) -> Option<&Url> {
        self.base.as_ref()
    }
}

fn document_base(html: &Html, base: Option<Url>) -> Option<Url> {
    let Ok(selector) = Selector::parse("base[href]") else {
        return base;
    };
    let Some(href) = html
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
    else {
        return base;
    };

    match &base {
        Some(page_url) => page_url.join(href.trim()).ok().or(base),
        None => Url::parse(href.trim()).ok(),
    }
}

/// Borrowed element of an [`HtmlPage`]
#[derive(Clone, Copy)]
pub struct PageElement<'a> {
    element: ElementRef<'a>,
    base: Option<&'a Url>,
}

impl PageElement<'_> {
    fn resolve(&self, raw: &str) -> String {
        match self.base {
            Some(base) => base.join(raw).map_or_else(|_| raw.to_string(), String::from),
            None => raw.to_string(),
        }
    }
}

impl DomElement for PageElement<'_> {
    fn tag_name(&self) -> String {
        self.element.value().name().to_ascii_lowercase()
    }

    fn attribute(&self, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.element.value().attr(name).map(str::to_string))
    }

    fn attributes(&self) -> Result<Vec<(String, String)>, DomError> {
        Ok(self
            .element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    fn url_property(&self, name: &str) -> Result<Option<String>, DomError> {
        // A static snapshot never has a loaded media resource
        if name == "currentSrc" {
            return Ok(None);
        }

        let Some(raw) = self.element.value().attr(name) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.resolve(raw)))
    }

    fn children(&self) -> Vec<Self> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .map(|element| PageElement {
                element,
                base: self.base,
            })
            .collect()
    }

    fn text(&self) -> String {
        self.element.text().collect()
    }
}
