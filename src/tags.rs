//! HTML fragment operations used by the rule engine.
//!
//! Fragments are parsed with `dom_query` (html5ever tree construction), so
//! raw-text elements, unquoted attributes and implied end tags behave the way
//! a browser sees them. A fragment is only re-serialized when an operation
//! actually changed its tree; otherwise the input is returned verbatim.

use dom_query::{Document, NodeRef, Selection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name.
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Read-only view of one element handed to the rule callbacks.
#[derive(Debug, Clone)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Element {
    fn from_node(node: &NodeRef<'_>) -> Option<Self> {
        let name = node.node_name()?.to_ascii_lowercase();
        let attributes = node
            .attrs()
            .iter()
            .map(|attr| Attribute::new(attr.name.local.to_string(), attr.value.to_string()))
            .collect();
        Some(Self { name, attributes })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }
}

pub fn is_void_tag(name: &str) -> bool {
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];
    VOID_TAGS.iter().any(|void| void.eq_ignore_ascii_case(name))
}

/// Parses `html` as body content, so leading `<style>`, `<meta>` or
/// `<script>` elements stay in the fragment instead of moving to `<head>`.
fn parse(html: &str) -> Document {
    Document::from(format!("<body>{html}"))
}

fn body_elements<'a>(doc: &'a Document) -> Vec<NodeRef<'a>> {
    doc.select("body *").nodes().to_vec()
}

fn body_html(doc: &Document) -> String {
    doc.select("body").inner_html().to_string()
}

/// Removes every element (with its content) for which `is_removable`
/// returns true.
pub fn remove_elements<F>(html: &str, mut is_removable: F) -> String
where
    F: FnMut(&Element) -> bool,
{
    let doc = parse(html);
    let doomed = body_elements(&doc)
        .into_iter()
        .filter(|node| Element::from_node(node).is_some_and(|element| is_removable(&element)))
        .collect::<Vec<_>>();
    if doomed.is_empty() {
        return html.to_owned();
    }

    for node in doomed.into_iter().rev() {
        Selection::from(node).remove();
    }
    body_html(&doc)
}

/// Replaces the attribute list of every element for which `rewrite` returns
/// one. Existing attributes keep their position; new ones are appended.
pub fn rewrite_attributes<F>(html: &str, mut rewrite: F) -> String
where
    F: FnMut(&Element) -> Option<Vec<Attribute>>,
{
    let doc = parse(html);
    let mut changed = false;

    for node in body_elements(&doc) {
        let Some(element) = Element::from_node(&node) else {
            continue;
        };
        let Some(attributes) = rewrite(&element) else {
            continue;
        };
        if attributes == element.attributes {
            continue;
        }

        let selection = Selection::from(node);
        for old in &element.attributes {
            if !attributes.iter().any(|attr| attr.name == old.name) {
                selection.remove_attr(&old.name);
            }
        }
        for attr in &attributes {
            selection.set_attr(&attr.name, &attr.value);
        }
        changed = true;
    }

    if changed { body_html(&doc) } else { html.to_owned() }
}

/// Appends the end tag of the last top-level element when the fragment
/// stops inside it, e.g. `<div><p>Text</p>` gains `</div>`.
pub fn close_dangling_element(mut html: String) -> String {
    let trimmed = html.trim_end();
    if !trimmed.ends_with('>') || trimmed.ends_with("-->") {
        return html;
    }

    let missing = {
        let doc = parse(trimmed);
        let top_level = doc.select("body > *");
        top_level
            .nodes()
            .last()
            .filter(|last| {
                let mut sibling = last.next_sibling();
                while let Some(node) = sibling {
                    if !node.text().trim().is_empty() {
                        return false;
                    }
                    sibling = node.next_sibling();
                }
                true
            })
            .and_then(NodeRef::node_name)
            .map(|name| name.to_ascii_lowercase())
    };
    let Some(name) = missing.filter(|name| !is_void_tag(name)) else {
        return html;
    };

    let end_tag = format!("</{name}>");
    let tail = trimmed.len().saturating_sub(end_tag.len());
    let closed = trimmed
        .get(tail..)
        .is_some_and(|tail| tail.eq_ignore_ascii_case(&end_tag));
    if !closed {
        html.push_str(&end_tag);
    }
    html
}

/// Inner HTML of the first `name` element.
pub fn first_inner_html(html: &str, name: &str) -> Option<String> {
    let doc = parse(html);
    let inner = body_elements(&doc)
        .into_iter()
        .find(|node| {
            node.node_name()
                .is_some_and(|tag| tag.eq_ignore_ascii_case(name))
        })
        .map(|node| Selection::from(node).inner_html().to_string());
    inner
}

/// Text content of `html` with all markup removed, trimmed.
pub fn strip_tags(html: &str) -> String {
    let doc = parse(html);
    let text = doc.select("body").text().trim().to_owned();
    text
}

pub fn decode_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Value of the `src` attribute of the first `<img>` in `html`.
pub fn first_image_source(html: &str) -> Option<String> {
    let doc = parse(html);
    let src = doc
        .select("body img")
        .nodes()
        .iter()
        .filter_map(Element::from_node)
        .find_map(|img| {
            img.attribute("src")
                .map(|attr| attr.value.trim().to_owned())
                .filter(|src| !src.is_empty())
        });
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_elements_drops_whole_element() {
        let html = r#"<p>keep</p><div class="ad"><p>ad</p></div><p>tail</p>"#;
        let out = remove_elements(html, |el| el.name == "div");
        assert_eq!(out, "<p>keep</p><p>tail</p>");
    }

    #[test]
    fn remove_elements_respects_unquoted_attributes() {
        let html = "<img alt=Don't src=tracker.gif><p>It's kept</p><p>second</p>";
        let out = remove_elements(html, |el| {
            el.attribute("src")
                .is_some_and(|src| src.value.contains("tracker"))
        });
        assert_eq!(out, "<p>It's kept</p><p>second</p>");
    }

    #[test]
    fn remove_elements_treats_script_as_raw_text() {
        let html = r#"<div class="ad"><script>document.write('</div>')</script></div><p>keep</p>"#;
        let out = remove_elements(html, |el| {
            el.attribute("class").is_some_and(|class| class.value == "ad")
        });
        assert_eq!(out, "<p>keep</p>");
    }

    #[test]
    fn untouched_fragments_are_returned_verbatim() {
        let html = "<h1>A<h2>B</h2>C</h1><br/><img src='x'>";
        assert_eq!(remove_elements(html, |_| false), html);
        assert_eq!(rewrite_attributes(html, |_| None), html);
        assert_eq!(
            rewrite_attributes(html, |el| Some(el.attributes.clone())),
            html
        );
    }

    #[test]
    fn rewrite_attributes_keeps_order_and_appends() {
        let html = r#"<a href="/x" onclick="evil()" title="t">x</a>"#;
        let out = rewrite_attributes(html, |el| {
            let mut attrs = el
                .attributes
                .iter()
                .filter(|a| a.name != "onclick")
                .cloned()
                .collect::<Vec<_>>();
            attrs.push(Attribute::new("rel", "nofollow"));
            Some(attrs)
        });
        assert_eq!(out, r#"<a href="/x" title="t" rel="nofollow">x</a>"#);
    }

    #[test]
    fn attribute_names_are_lowercased() {
        let doc = parse(r#"<P CLASS="a">x</P>"#);
        let nodes = body_elements(&doc);
        let element = nodes.first().and_then(Element::from_node).expect("element");
        assert_eq!(element.name, "p");
        assert_eq!(element.attribute("Class").map(|a| a.value.as_str()), Some("a"));
    }

    #[test]
    fn close_dangling_element_appends_missing_end_tag() {
        assert_eq!(
            close_dangling_element("<div><p>Text</p>".to_owned()),
            "<div><p>Text</p></div>"
        );
        assert_eq!(
            close_dangling_element("<div><p>Text</p></DIV>".to_owned()),
            "<div><p>Text</p></DIV>"
        );
        assert_eq!(close_dangling_element("<p>a</p>tail".to_owned()), "<p>a</p>tail");
        assert_eq!(close_dangling_element("<p>a</p><br>".to_owned()), "<p>a</p><br>");
        assert_eq!(
            close_dangling_element("<h2>A<h3>B</h3>C</h2>".to_owned()),
            "<h2>A<h3>B</h3>C</h2>"
        );
    }

    #[test]
    fn strip_tags_handles_truncated_markup() {
        assert_eq!(strip_tags("<p>Hello <b>you</b></p><a hre"), "Hello you");
        assert_eq!(strip_tags("  plain  "), "plain");
    }

    #[test]
    fn first_inner_html_finds_first_element() {
        assert_eq!(
            first_inner_html("<div><p><b>One</b></p><p>Two</p></div>", "p").as_deref(),
            Some("<b>One</b>")
        );
        assert_eq!(first_inner_html("<div>x</div>", "p"), None);
    }

    #[test]
    fn first_image_source_finds_src() {
        assert_eq!(
            first_image_source(r#"<p>x</p><img alt="a" src="/a.jpg"><img src="/b.jpg">"#),
            Some("/a.jpg".to_owned())
        );
        assert_eq!(first_image_source("<img src=''><img src=/c.png>"), Some("/c.png".to_owned()));
        assert_eq!(first_image_source("<p>none</p>"), None);
    }
}
