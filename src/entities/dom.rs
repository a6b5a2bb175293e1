//! Page model: HTML parsed with `scraper`, plus live per-element state.
//!
//! Selectors are matched against the parsed markup. What the tracker writes
//! (classes, inline style, text, attributes) lives in the element handles,
//! one per parsed element, and every write that changes something bumps a
//! per-element counter so callers can observe how many writes a render made.

use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::error;
use scraper::{ElementRef, Html, Selector};

use super::traits::{DomQuery, ElementHandle};

/// A selector that doesn't parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid selector {:?}: {}", self.selector, self.reason)
    }
}

impl std::error::Error for SelectorError {}

/// Parse a CSS selector (group)
pub fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Element state behind the shared handle
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: String,
    pub classes: Vec<String>,
    /// Attributes in source order (`id` included, `class` excluded)
    pub attributes: IndexMap<String, String>,
    pub style: IndexMap<String, String>,
    pub text: String,
    /// Number of writes that changed something
    pub mutations: u64,
}

/// Shared element handle. Clones point at the same node.
#[derive(Debug, Clone)]
pub struct Element(Arc<RwLock<ElementData>>);

impl Element {
    /// Detached element, not part of any document
    pub fn new(tag: &str) -> Self {
        Self(Arc::new(RwLock::new(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        })))
    }

    /// Builder: set attribute without counting it as a mutation.
    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.write().put_attribute(name, value);
        self
    }

    /// Builder: add class without counting it as a mutation.
    pub fn with_class(self, class: &str) -> Self {
        {
            let mut data = self.write();
            if !data.classes.iter().any(|c| c == class) {
                data.classes.push(class.to_string());
            }
        }
        self
    }

    /// Live state seeded from a parsed element
    fn from_node(node: ElementRef<'_>) -> Self {
        let value = node.value();
        let mut data = ElementData {
            tag: value.name().to_string(),
            text: node.text().collect(),
            ..Default::default()
        };
        for (name, v) in value.attrs() {
            data.put_attribute(name, v);
        }
        Self(Arc::new(RwLock::new(data)))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ElementData> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ElementData> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tag(&self) -> String {
        self.read().tag.clone()
    }

    pub fn classes(&self) -> Vec<String> {
        self.read().classes.clone()
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.read().style.get(property).cloned()
    }

    pub fn text(&self) -> String {
        self.read().text.clone()
    }

    pub fn mutations(&self) -> u64 {
        self.read().mutations
    }

    /// Snapshot of the whole element state
    pub fn snapshot(&self) -> ElementData {
        self.read().clone()
    }

    /// Same underlying node?
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl ElementData {
    fn put_attribute(&mut self, name: &str, value: &str) {
        if name == "class" {
            self.classes.clear();
            for c in value.split_whitespace() {
                if !self.classes.iter().any(|x| x == c) {
                    self.classes.push(c.to_string());
                }
            }
        } else {
            self.attributes.insert(name.to_string(), value.to_string());
        }
    }
}

impl ElementHandle for Element {
    fn attribute(&self, name: &str) -> Option<String> {
        let data = self.read();
        if name == "class" {
            if data.classes.is_empty() {
                None
            } else {
                Some(data.classes.join(" "))
            }
        } else {
            data.attributes.get(name).cloned()
        }
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let mut data = self.write();
        data.put_attribute(name, value);
        data.mutations += 1;
    }

    fn has_class(&self, class: &str) -> bool {
        self.read().classes.iter().any(|c| c == class)
    }

    fn add_class(&self, class: &str) {
        let mut data = self.write();
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
            data.mutations += 1;
        }
    }

    fn remove_class(&self, class: &str) {
        let mut data = self.write();
        let before = data.classes.len();
        data.classes.retain(|c| c != class);
        if data.classes.len() != before {
            data.mutations += 1;
        }
    }

    fn set_style(&self, property: &str, value: &str) {
        let mut data = self.write();
        data.style.insert(property.to_string(), value.to_string());
        data.mutations += 1;
    }

    fn set_text(&self, text: &str) {
        let mut data = self.write();
        data.text = text.to_string();
        data.mutations += 1;
    }

    fn describe(&self) -> String {
        let data = self.read();
        let mut out = format!("<{}", data.tag);
        if let Some(id) = data.attributes.get("id") {
            out.push('#');
            out.push_str(id);
        }
        for c in &data.classes {
            out.push('.');
            out.push_str(c);
        }
        out.push('>');
        out
    }
}

/// Parsed page. Clones share the same elements.
#[derive(Clone)]
pub struct Document {
    html: Rc<Html>,
    /// One handle per element, in the order `nodes()` yields them
    elements: Rc<Vec<Element>>,
}

impl Document {
    /// Parse a full HTML document (missing `html`/`head`/`body` are implied)
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let elements = nodes(&html).map(Element::from_node).collect();
        Self {
            html: Rc::new(html),
            elements: Rc::new(elements),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Strict query: selector errors are returned, not logged.
    pub fn select(&self, selector: &str) -> Result<Vec<Element>, SelectorError> {
        let parsed = parse_selector(selector)?;
        Ok(nodes(&self.html)
            .zip(self.elements.iter())
            .filter(|(node, _)| parsed.matches(node))
            .map(|(_, element)| element.clone())
            .collect())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("elements", &self.elements.len())
            .finish()
    }
}

/// Every element of the tree, in document order
fn nodes(html: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    html.root_element().descendants().filter_map(ElementRef::wrap)
}

impl DomQuery for Document {
    type Element = Element;

    fn query_all(&self, selector: &str) -> Vec<Element> {
        match self.select(selector) {
            Ok(found) => found,
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }
}
