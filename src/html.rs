use crate::page_model::PAGE_DELIMITER_CLASS;
use crate::style::{InlineStyle, StyleCapabilities, TextAlign};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};

/// Generic node tree shared by both emitters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNode {
    Text { content: String },
    Element(ElementNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    /// Lowercase local name.
    pub tag: String,
    /// Attributes ordered by name.
    pub attributes: Vec<(String, String)>,
    pub style: InlineStyle,
    pub children: Vec<ParsedNode>,
}

impl ElementNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|value| value.split_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }

    pub fn is_page_delimiter(&self) -> bool {
        self.tag == "div" && self.has_class(PAGE_DELIMITER_CLASS)
    }

    pub fn is_heading(&self) -> bool {
        heading_level(&self.tag).is_some()
    }

    /// Alignment from inline `text-align`, then the `align` attribute.
    pub fn text_align(&self) -> Option<TextAlign> {
        self.style
            .text_align
            .or_else(|| self.attr("align").and_then(TextAlign::parse))
    }

    /// Flattened text. `<br>` becomes `\n` and a nested page delimiter
    /// becomes [`PAGE_BREAK_CHAR`].
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }
}

/// Stands in for a page delimiter inside flattened text.
pub const PAGE_BREAK_CHAR: char = '\u{000C}';

impl ParsedNode {
    pub fn text(content: impl Into<String>) -> Self {
        ParsedNode::Text {
            content: content.into(),
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            ParsedNode::Element(element) => Some(element),
            ParsedNode::Text { .. } => None,
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, ParsedNode::Text { content } if content.trim().is_empty())
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            ParsedNode::Text { content } => out.push_str(content),
            ParsedNode::Element(element) if element.tag == "br" => out.push('\n'),
            ParsedNode::Element(element) if element.is_page_delimiter() => out.push(PAGE_BREAK_CHAR),
            ParsedNode::Element(element) => {
                for child in &element.children {
                    child.collect_text(out);
                }
            }
        }
    }
}

pub fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Tags that start and end their own block in both emitters.
pub fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "main"
            | "blockquote"
            | "hr"
            | "table"
            | "tr"
            | "pre"
            | "figure"
    )
}

/// Parse a fragment with every style capability enabled.
pub fn parse(html: &str) -> Vec<ParsedNode> {
    parse_with(html, StyleCapabilities::all())
}

/// Parse a fragment into the children of its `<body>`.
pub fn parse_with(html: &str, caps: StyleCapabilities) -> Vec<ParsedNode> {
    let document = kuchiki::parse_html().one(html);
    let Ok(body) = document.select_first("body") else {
        // html5ever always synthesizes a body; keep the text if it did not.
        let text = document.text_contents();
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![ParsedNode::text(text)]
        };
    };
    convert_children(body.as_node(), caps)
}

fn convert_children(node: &NodeRef, caps: StyleCapabilities) -> Vec<ParsedNode> {
    node.children()
        .filter_map(|child| convert_node(&child, caps))
        .collect()
}

fn convert_node(node: &NodeRef, caps: StyleCapabilities) -> Option<ParsedNode> {
    match node.data() {
        NodeData::Text(text) => Some(ParsedNode::text(text.borrow().as_str())),
        NodeData::Element(element) => {
            let tag = element.name.local.as_ref().to_ascii_lowercase();
            if matches!(tag.as_str(), "script" | "style" | "template" | "noscript") {
                return None;
            }
            let mut attributes: Vec<(String, String)> = element
                .attributes
                .borrow()
                .map
                .iter()
                .map(|(name, attr)| (name.local.as_ref().to_ascii_lowercase(), attr.value.clone()))
                .collect();
            attributes.sort_by(|a, b| a.0.cmp(&b.0));
            let style = attributes
                .iter()
                .find(|(name, _)| name == "style")
                .map(|(_, raw)| InlineStyle::parse(raw, caps))
                .unwrap_or_default();
            Some(ParsedNode::Element(ElementNode {
                tag,
                attributes,
                style,
                children: convert_children(node, caps),
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Length;

    fn text_content(nodes: &[ParsedNode]) -> String {
        let mut out = String::new();
        for node in nodes {
            node.collect_text(&mut out);
        }
        out
    }

    fn first_element(nodes: &[ParsedNode]) -> &ElementNode {
        nodes
            .iter()
            .find_map(ParsedNode::as_element)
            .expect("element")
    }

    #[test]
    fn returns_body_children_with_styles() {
        let nodes = parse(r#"<p style="font-size: 14pt; text-align: center">Hi <b>Ana</b></p>"#);
        assert_eq!(nodes.len(), 1);
        let p = first_element(&nodes);
        assert_eq!(p.tag, "p");
        assert_eq!(p.style.font_size, Some(Length::Pt(14.0)));
        assert_eq!(p.text_align(), Some(TextAlign::Center));
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.text_content(), "Hi Ana");
    }

    #[test]
    fn drops_scripts_and_comments() {
        let nodes = parse("<!-- note --><script>alert(1)</script><p>kept</p><style>p{}</style>");
        assert_eq!(text_content(&nodes), "kept");
    }

    #[test]
    fn tolerates_malformed_markup() {
        let nodes = parse("<p>open <b>bold <i>both</p> tail");
        assert!(text_content(&nodes).contains("both"));
        assert!(text_content(&nodes).contains("tail"));
        let plain = parse("just text < not a tag");
        assert_eq!(text_content(&plain), "just text < not a tag");
    }

    #[test]
    fn recognizes_page_delimiter() {
        let nodes = parse(&format!("<p>a</p>{}<p>b</p>", crate::page_model::PAGE_DELIMITER));
        let delimiters = nodes
            .iter()
            .filter_map(ParsedNode::as_element)
            .filter(|el| el.is_page_delimiter())
            .count();
        assert_eq!(delimiters, 1);
    }

    #[test]
    fn align_attribute_is_a_fallback() {
        let nodes = parse(r#"<p align="right">x</p>"#);
        assert_eq!(first_element(&nodes).text_align(), Some(TextAlign::Right));
    }

    #[test]
    fn whitespace_text_nodes_are_kept() {
        let nodes = parse("<div><p>a</p>\n  <p>b</p></div>");
        let div = first_element(&nodes);
        assert!(div.children.iter().any(ParsedNode::is_blank_text));
    }

    #[test]
    fn br_counts_as_newline_in_text_content() {
        let nodes = parse("<blockquote>one<br>two</blockquote>");
        assert_eq!(text_content(&nodes), "one\ntwo");
    }

    #[test]
    fn nested_delimiter_marks_a_page_break_in_text_content() {
        let nodes = parse(&format!(
            "<blockquote>one{}two</blockquote>",
            crate::page_model::PAGE_DELIMITER
        ));
        assert_eq!(
            first_element(&nodes).text_content(),
            format!("one{}two", PAGE_BREAK_CHAR)
        );
    }
}
