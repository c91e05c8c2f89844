//! Conversion of payload HTML bodies into the configured text format.
//!
//! Markdown and plaintext output come from a structural walk of the parsed
//! HTML tree: non-content markup is dropped, block elements break lines,
//! quoted reply blocks get a leading `> ` marker, and whitespace is
//! normalized. HTML output is the payload verbatim.

use ego_tree::NodeRef;
use scraper::{Html, node::Node};

use crate::model::TextFormat;

/// Convert `html` into the requested body format.
pub(super) fn convert(html: &str, format: TextFormat) -> String {
    match format {
        TextFormat::Html => html.to_string(),
        TextFormat::Markdown | TextFormat::Plaintext => {
            let fragment = Html::parse_fragment(html);
            let mut out = String::new();
            render_node(fragment.tree.root(), format, &mut out);
            normalize(&out)
        }
    }
}

/// Elements whose content never belongs in a message body.
const SKIPPED: &[&str] = &["script", "style", "head", "title", "img"];

/// Elements that force a line break around their content.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "table", "tr", "ul", "ol", "pre",
];

fn render_node(node: NodeRef<'_, Node>, format: TextFormat, out: &mut String) {
    match node.value() {
        Node::Document | Node::Fragment => render_children(node, format, out),
        Node::Text(text) => push_text(text.as_ref(), out),
        Node::Element(el) => {
            let tag = el.name();
            if SKIPPED.contains(&tag) {
                return;
            }
            match tag {
                "br" => out.push('\n'),
                "blockquote" => {
                    let mut inner = String::new();
                    render_children(node, format, &mut inner);
                    break_line(out);
                    for line in normalize(&inner).lines() {
                        if line.is_empty() {
                            out.push_str(">\n");
                        } else {
                            out.push_str("> ");
                            out.push_str(line);
                            out.push('\n');
                        }
                    }
                }
                "li" => {
                    break_line(out);
                    out.push_str("- ");
                    render_children(node, format, out);
                    break_line(out);
                }
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    break_line(out);
                    if format == TextFormat::Markdown {
                        let level = tag.as_bytes()[1] - b'0';
                        for _ in 0..level {
                            out.push('#');
                        }
                        out.push(' ');
                    }
                    render_children(node, format, out);
                    break_line(out);
                }
                "b" | "strong" if format == TextFormat::Markdown => {
                    out.push_str("**");
                    render_children(node, format, out);
                    out.push_str("**");
                }
                "i" | "em" if format == TextFormat::Markdown => {
                    out.push('*');
                    render_children(node, format, out);
                    out.push('*');
                }
                "a" if format == TextFormat::Markdown => {
                    let mut label = String::new();
                    render_children(node, format, &mut label);
                    let label = label.trim();
                    match el.attr("href").filter(|_| !label.is_empty()) {
                        Some(href) => {
                            out.push('[');
                            out.push_str(label);
                            out.push_str("](");
                            out.push_str(href);
                            out.push(')');
                        }
                        None => out.push_str(label),
                    }
                }
                _ if BLOCKS.contains(&tag) => {
                    break_line(out);
                    render_children(node, format, out);
                    break_line(out);
                }
                _ => render_children(node, format, out),
            }
        }
        _ => {}
    }
}

fn render_children(node: NodeRef<'_, Node>, format: TextFormat, out: &mut String) {
    for child in node.children() {
        render_node(child, format, out);
    }
}

/// Append text with intra-text whitespace runs collapsed to single spaces.
fn push_text(text: &str, out: &mut String) {
    let mut last_space = out.ends_with([' ', '\n']) || out.is_empty();
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Trim trailing spaces, collapse blank-line runs, and drop outer blanks.
fn normalize(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = true;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if !blank_run {
                lines.push("");
            }
            blank_run = true;
        } else {
            lines.push(line);
            blank_run = false;
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
