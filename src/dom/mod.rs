//! DOM capability interface.
//!
//! The scanner never walks a live tree directly. Hosts hand it elements
//! through [`DomElement`] (for inserted subtrees and media events) and a
//! queryable [`Document`] (for full sweeps). References obtained here are
//! only used for the duration of one scan call.
//!
//! [`html::HtmlPage`] implements both on top of `scraper` for static HTML
//! snapshots.

pub mod html;

use thiserror::Error;
use url::Url;

pub use html::{HtmlPage, PageElement};

/// Failure reading from the host DOM
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },

    #[error("attribute {name:?} unreadable: {message}")]
    Attribute { name: String, message: String },

    #[error("node detached from document")]
    Detached,
}

/// One element of the host document
pub trait DomElement {
    /// Lower-case tag name (`video`, `a`, ...).
    fn tag_name(&self) -> String;

    /// Raw attribute value, as `getAttribute` would return it.
    fn attribute(&self, name: &str) -> Result<Option<String>, DomError>;

    /// Every attribute as `(name, value)` pairs.
    fn attributes(&self) -> Result<Vec<(String, String)>, DomError>;

    /// URL-valued property (`src`, `href`, `currentSrc`), resolved against
    /// the document base the way a browser's element properties are.
    ///
    /// Defaults to the raw attribute.
    fn url_property(&self, name: &str) -> Result<Option<String>, DomError> {
        self.attribute(name)
    }

    /// Child elements in document order.
    fn children(&self) -> Vec<Self>
    where
        Self: Sized;

    /// Concatenated text content.
    fn text(&self) -> String {
        String::new()
    }

    fn has_attribute(&self, name: &str) -> Result<bool, DomError> {
        Ok(self.attribute(name)?.is_some())
    }

    /// Descendants with the given tag, depth-first pre-order.
    fn descendants_by_tag(&self, tag: &str) -> Vec<Self>
    where
        Self: Sized,
    {
        let mut found = Vec::new();
        let mut stack = self.children();
        stack.reverse();
        while let Some(element) = stack.pop() {
            let mut children = element.children();
            children.reverse();
            if element.tag_name() == tag {
                found.push(element);
            }
            stack.extend(children);
        }
        found
    }
}

/// A queryable document
pub trait Document {
    type Element<'a>: DomElement
    where
        Self: 'a;

    /// All elements matching a CSS selector, in document order.
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Element<'_>>, DomError>;

    /// Base URL relative references resolve against.
    fn base_url(&self) -> Option<&Url> {
        None
    }
}
