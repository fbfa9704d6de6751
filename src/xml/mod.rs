//! Owned XML element trees for Neo payloads.
//!
//! Neo documents are small and shallow, so they are read fully into an
//! [`XmlNode`] tree and the typed records in [`consumer`] and [`response`]
//! map to and from that tree.

pub mod consumer;
pub mod response;

use crate::error::{NeoError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;
use std::io::Write;
use std::str::FromStr;

pub use consumer::*;
pub use response::*;

/// An XML element with its attributes, text content and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A leaf element holding `text`.
    pub fn leaf(name: impl Into<String>, text: impl Display) -> Self {
        Self {
            name: name.into(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Appends a leaf element when `value` is present.
    pub fn push_leaf<T: Display>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.children.push(XmlNode::leaf(name, value));
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the named child. An empty element yields `Some("")`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_deref().unwrap_or(""))
    }

    /// Parses the text of the named child, treating empty text as absent.
    pub fn parse_child<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.child_text(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| NeoError::InvalidValue {
                field: format!("{}/{}", self.name, name),
                value: raw.to_string(),
            }),
        }
    }
}

/// Parses an XML document into its root element.
pub fn parse(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(start_node(&e)?);
            }
            Event::Empty(e) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape()?;
                    top.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    top.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| NeoError::Parse("unbalanced XML document".to_string()))?;
                attach(&mut stack, &mut root, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NeoError::Parse("truncated XML document".to_string()));
    }
    root.ok_or_else(|| NeoError::Parse("empty XML document".to_string()))
}

fn start_node(e: &BytesStart<'_>) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut node = XmlNode::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        // Namespace declarations carry no data.
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Writes `node` as a standalone document with an XML declaration.
pub fn write_document<W: Write>(node: &XmlNode, out: W, pretty: bool) -> Result<()> {
    let mut writer = if pretty {
        Writer::new_with_indent(out, b' ', 2)
    } else {
        Writer::new(out)
    };
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_node(&mut writer, node)?;
    if pretty {
        writer.get_mut().write_all(b"\n")?;
    }
    Ok(())
}

/// Streams a document whose root element is written open, then filled one child at a time.
pub struct DocumentWriter<W: Write> {
    writer: Writer<W>,
    root: String,
    pretty: bool,
}

impl<W: Write> DocumentWriter<W> {
    pub fn start(out: W, root: &str, pretty: bool) -> Result<Self> {
        let mut writer = if pretty {
            Writer::new_with_indent(out, b' ', 2)
        } else {
            Writer::new(out)
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(root)))?;
        Ok(Self {
            writer,
            root: root.to_string(),
            pretty,
        })
    }

    pub fn write(&mut self, node: &XmlNode) -> Result<()> {
        write_node(&mut self.writer, node)
    }

    /// Closes the root element and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .write_event(Event::End(BytesEnd::new(self.root.as_str())))?;
        let mut out = self.writer.into_inner();
        if self.pretty {
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(out)
    }
}

/// Serializes `node` without an XML declaration, as used for request bodies.
pub fn to_string(node: &XmlNode) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node)?;
    String::from_utf8(writer.into_inner()).map_err(|e| NeoError::Parse(e.to_string()))
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() && node.text.as_deref().map_or(true, str::is_empty) {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = node.text.as_deref().filter(|t| !t.is_empty()) {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_with_namespace_and_entities() {
        let xml = r#"<?xml version="1.0"?>
            <ns:Consumer xmlns:ns="http://neo" recordNumber="3">
              <ns:FirstName>Jo &amp; Co</ns:FirstName>
              <ns:Title/>
              <ns:Email><ns:EmailId>a@b.c</ns:EmailId></ns:Email>
              <ns:Email><ns:EmailId>d@e.f</ns:EmailId></ns:Email>
            </ns:Consumer>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "Consumer");
        assert_eq!(root.attribute("recordNumber"), Some("3"));
        assert_eq!(root.child_text("FirstName"), Some("Jo & Co"));
        assert_eq!(root.child_text("Title"), Some(""));
        let emails: Vec<_> = root
            .children_named("Email")
            .filter_map(|e| e.child_text("EmailId"))
            .collect();
        assert_eq!(emails, vec!["a@b.c", "d@e.f"]);
    }

    #[test]
    fn test_parse_child_reports_bad_numbers() {
        let root = parse("<Phone><PhoneType>mobile</PhoneType><PhoneID></PhoneID></Phone>").unwrap();
        assert!(root.parse_child::<u32>("PhoneType").is_err());
        assert_eq!(root.parse_child::<u64>("PhoneID").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("not xml at all").is_err());
        assert!(parse("<Open><Inner></Open>").is_err());
    }

    #[test]
    fn test_write_escapes_and_collapses_empty_elements() {
        let node = XmlNode::new("Consumer")
            .with_child(XmlNode::leaf("Title", ""))
            .with_child(XmlNode::leaf("FirstName", "fïrst <name>"));
        let xml = to_string(&node).unwrap();
        assert_eq!(
            xml,
            "<Consumer><Title/><FirstName>fïrst &lt;name&gt;</FirstName></Consumer>"
        );
        assert_eq!(parse(&xml).unwrap().child_text("FirstName"), Some("fïrst <name>"));
    }

    #[test]
    fn test_write_document_has_declaration() {
        let mut out = Vec::new();
        write_document(&XmlNode::new("Consumers"), &mut out, false).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.ends_with("<Consumers/>"));
    }
}
