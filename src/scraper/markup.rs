//! Serialize parsed elements back to markup, with per-element text overrides.
//!
//! The parsed document is never modified; overrides are applied while writing.
//! Output is well-formed XHTML (void elements self-closed, text and attributes escaped)
//! so the same fragment can go into HTML, PDF, and EPUB output.

use crate::formats::html_escape_attr;
use scraper::{ElementRef, Node};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Replace the children of `element` with `text` when writing.
#[derive(Debug, Clone)]
pub(crate) struct Override<'a> {
    pub element: ElementRef<'a>,
    pub text: String,
}

/// Outer markup of `element`, applying `overrides`.
pub(crate) fn render_element(element: ElementRef<'_>, overrides: &[Override<'_>]) -> String {
    let mut out = String::new();
    write_element(element, overrides, &mut out);
    out
}

/// Inner markup of `element` (children only), applying `overrides`.
pub(crate) fn render_children(element: ElementRef<'_>, overrides: &[Override<'_>]) -> String {
    let mut out = String::new();
    write_children(element, overrides, &mut out);
    out
}

fn write_element(element: ElementRef<'_>, overrides: &[Override<'_>], out: &mut String) {
    let value = element.value();
    let name = value.name();
    out.push('<');
    out.push_str(name);
    for (key, val) in value.attrs() {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&html_escape_attr(val));
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    match overrides.iter().find(|o| o.element == element) {
        Some(o) => out.push_str(&html_escape_attr(&o.text)),
        None => write_children(element, overrides, out),
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn write_children(element: ElementRef<'_>, overrides: &[Override<'_>], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&html_escape_attr(text)),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    write_element(el, overrides, out);
                }
            }
            _ => {}
        }
    }
}
