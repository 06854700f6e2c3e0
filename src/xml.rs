//! Owned markup tree that serializes back exactly as it was read.
//!
//! Every node keeps the raw source text it was parsed from, so a document that is
//! only partially edited writes out byte-identical everywhere else. Elements are
//! addressed by child-index paths from the document root; a path's prefixes are
//! the element's ancestors.

use log::trace;
use quick_xml::Reader;
use quick_xml::escape::{EscapeError, escape, unescape};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use std::fmt;
use thiserror::Error;

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),
    #[error("Unclosed element <{0}>")]
    UnclosedElement(String),
    #[error("Unexpected end tag {0}")]
    UnexpectedEndTag(String),
    #[error("Document has no root element")]
    NoRootElement,
    #[error("Element <{0}> follows the root element")]
    MultipleRoots(String),
    #[error("Text outside the root element: {0:?}")]
    TextOutsideRoot(String),
    #[error("Malformed attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("Document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("Invalid tag name: {0}")]
    InvalidName(#[from] std::str::Utf8Error),
    #[error("Invalid entity reference: {0}")]
    Escape(#[from] EscapeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Escaped character data, entity references included.
    Text(String),
    /// Unescaped contents of a `<![CDATA[...]]>` section.
    CData(String),
    /// Comments, declarations, processing instructions and doctypes, verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    start_tag: String,
    /// `None` while the element is written as `<name/>`.
    end_tag: Option<String>,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    bom: bool,
    nodes: Vec<Node>,
}

impl Document {
    pub fn parse(source: &str) -> Result<Self, XmlError> {
        let (bom, body) = match source.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, source),
        };

        let mut reader = Reader::from_str(body);
        let mut open: Vec<Element> = Vec::new();
        let mut nodes = Vec::new();

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event()?;
            let raw = &body[start..reader.buffer_position() as usize];

            let node = match event {
                Event::Eof => break,
                Event::Start(tag) => {
                    open.push(Element::parsed(checked_tag_name(&tag)?, raw));
                    continue;
                }
                Event::End(_) => {
                    let mut element = open
                        .pop()
                        .ok_or_else(|| XmlError::UnexpectedEndTag(raw.to_string()))?;
                    element.end_tag = Some(raw.to_string());
                    Node::Element(element)
                }
                Event::Empty(tag) => Node::Element(Element::parsed(checked_tag_name(&tag)?, raw)),
                Event::CData(_) => match raw.strip_prefix("<![CDATA[").and_then(|data| data.strip_suffix("]]>")) {
                    Some(data) => Node::CData(data.to_string()),
                    None => Node::Markup(raw.to_string()),
                },
                // entity and character references arrive as their own events;
                // only the predefined entities and character references resolve
                _ if !raw.starts_with('<') => {
                    unescape(raw)?;
                    Node::Text(raw.to_string())
                }
                _ => Node::Markup(raw.to_string()),
            };

            match open.last_mut() {
                Some(parent) => parent.children.push(node),
                None => push_top_level(&mut nodes, node)?,
            }
        }

        if let Some(element) = open.pop() {
            return Err(XmlError::UnclosedElement(element.name));
        }
        if !nodes.iter().any(|node| matches!(node, Node::Element(_))) {
            return Err(XmlError::NoRootElement);
        }

        trace!("Parsed document with {} top-level nodes", nodes.len());
        Ok(Document { bom, nodes })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(Node::as_element)
    }

    /// Paths of every element with the given local name, in document order.
    pub fn find_all(&self, local_name: &str) -> Vec<Vec<usize>> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        collect_paths(&self.nodes, local_name, &mut path, &mut found);
        found
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        let mut current = self.nodes.get(*first)?.as_element()?;
        for index in rest {
            current = current.children.get(*index)?.as_element()?;
        }
        Some(current)
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut current = self.nodes.get_mut(*first)?.as_element_mut()?;
        for index in rest {
            current = current.children.get_mut(*index)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Path of the closest enclosing element named `local_name`, excluding the element itself.
    pub fn nearest_ancestor(&self, path: &[usize], local_name: &str) -> Option<Vec<usize>> {
        (1..path.len())
            .rev()
            .map(|len| &path[..len])
            .find(|prefix| {
                self.element_at(prefix)
                    .is_some_and(|element| element.local_name() == local_name)
            })
            .map(<[usize]>::to_vec)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bom {
            write!(f, "{BOM}")?;
        }
        self.nodes.iter().try_for_each(|node| write!(f, "{node}"))
    }
}

impl Element {
    /// A new, empty element written as `<name></name>`.
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            start_tag: format!("<{name}>"),
            end_tag: Some(format!("</{name}>")),
            children: Vec::new(),
        }
    }

    pub fn with_text(name: &str, text: &str) -> Self {
        let mut element = Element::new(name);
        element.set_text(text);
        element
    }

    /// End tag is filled in when the matching end event arrives; `<name/>` never gets one.
    fn parsed(name: String, start_tag: &str) -> Self {
        Element {
            name,
            start_tag: start_tag.to_string(),
            end_tag: None,
            children: Vec::new(),
        }
    }

    /// Qualified name as written, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Unescaped character data directly inside this element.
    pub fn text(&self) -> Result<String, XmlError> {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(raw) => text.push_str(&unescape(raw)?),
                Node::CData(data) => text.push_str(data),
                _ => {}
            }
        }
        Ok(text)
    }

    /// Replaces all content of this element with `text`.
    pub fn set_text(&mut self, text: &str) {
        self.open_up();
        self.children = vec![Node::Text(escape(text).into_owned())];
    }

    /// First descendant, in document order, whose local name is `local_name`.
    pub fn find_descendant(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().filter_map(Node::as_element).find_map(|child| {
            if child.local_name() == local_name {
                Some(child)
            } else {
                child.find_descendant(local_name)
            }
        })
    }

    /// Returns the first descendant named `name`, or appends a new child element
    /// holding `default` as its text and returns that.
    ///
    /// On a miss this mutates `self`: the new field is added after the existing
    /// children, indented like the first of them when the element is pretty-printed.
    /// `None` means the field could not be resolved after the lookup.
    pub fn get_or_insert_field(&mut self, name: &str, default: &str) -> Option<&mut Element> {
        let path = match self.descendant_path(name) {
            Some(path) => path,
            None => vec![self.push_field(Element::with_text(name, default))],
        };

        let mut current = self;
        for index in path {
            current = current.children.get_mut(index)?.as_element_mut()?;
        }
        Some(current)
    }

    fn descendant_path(&self, local_name: &str) -> Option<Vec<usize>> {
        self.children.iter().enumerate().find_map(|(index, node)| {
            let child = node.as_element()?;
            if child.local_name() == local_name {
                return Some(vec![index]);
            }
            child.descendant_path(local_name).map(|mut rest| {
                rest.insert(0, index);
                rest
            })
        })
    }

    fn push_field(&mut self, field: Element) -> usize {
        self.open_up();

        let closing_whitespace = matches!(self.children.last(), Some(Node::Text(text)) if is_blank(text));
        let indent = self.children.iter().find_map(|node| match node {
            Node::Text(text) if is_blank(text) && text.contains('\n') => Some(text.clone()),
            _ => None,
        });

        match indent {
            Some(indent) if closing_whitespace => {
                let at = self.children.len() - 1;
                self.children.insert(at, Node::Text(indent));
                self.children.insert(at + 1, Node::Element(field));
                at + 1
            }
            _ => {
                self.children.push(Node::Element(field));
                self.children.len() - 1
            }
        }
    }

    /// Turns `<name/>` into `<name></name>` so it can hold content.
    fn open_up(&mut self) {
        if self.end_tag.is_none() {
            let start = self.start_tag.trim_end_matches('>').trim_end_matches('/').trim_end();
            self.start_tag = format!("{start}>");
            self.end_tag = Some(format!("</{}>", self.name));
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.start_tag)?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        if let Some(end_tag) = &self.end_tag {
            f.write_str(end_tag)?;
        }
        Ok(())
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(element) => write!(f, "{element}"),
            Node::Text(raw) | Node::Markup(raw) => f.write_str(raw),
            Node::CData(data) => write!(f, "<![CDATA[{data}]]>"),
        }
    }
}

/// Tag name of a start or empty tag whose attributes are all well-formed and unique.
fn checked_tag_name(tag: &BytesStart) -> Result<String, XmlError> {
    for attribute in tag.attributes() {
        attribute?;
    }
    Ok(std::str::from_utf8(tag.name().as_ref())?.to_string())
}

/// Outside the root element only markup and whitespace may appear, and only one element.
fn push_top_level(nodes: &mut Vec<Node>, node: Node) -> Result<(), XmlError> {
    match &node {
        Node::Element(element) if nodes.iter().any(|node| node.as_element().is_some()) => {
            return Err(XmlError::MultipleRoots(element.name.clone()));
        }
        Node::Text(text) | Node::CData(text) if !is_blank(text) => {
            return Err(XmlError::TextOutsideRoot(text.clone()));
        }
        _ => {}
    }
    nodes.push(node);
    Ok(())
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn collect_paths(nodes: &[Node], local_name: &str, path: &mut Vec<usize>, found: &mut Vec<Vec<usize>>) {
    for (index, node) in nodes.iter().enumerate() {
        if let Node::Element(element) = node {
            path.push(index);
            if element.local_name() == local_name {
                found.push(path.clone());
            }
            collect_paths(&element.children, local_name, path, found);
            path.pop();
        }
    }
}
