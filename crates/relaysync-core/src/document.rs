//! Mutable XML document over `quick-xml`
//!
//! Parses the whole file into an element tree, keeps comments, CDATA,
//! processing instructions and whitespace, and writes it back in the same
//! shape. Elements without children are written self-closing.

use crate::{SyncError, SyncResult};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::{Path, PathBuf};

/// Node of the document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Element
    Element(Element),
    /// Unescaped character data
    Text(String),
    /// CDATA section content
    CData(String),
    /// Comment content, as written
    Comment(String),
    /// Processing instruction content, as written
    Instruction(String),
    /// DOCTYPE content, as written
    DocType(String),
    /// XML declaration
    Declaration(Declaration),
}

/// `<?xml ...?>` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// XML version
    pub version: String,
    /// Declared encoding
    pub encoding: Option<String>,
    /// Declared standalone flag
    pub standalone: Option<String>,
}

impl Declaration {
    fn from_event(decl: &BytesDecl<'_>) -> SyncResult<Self> {
        Ok(Self {
            version: lossy(&decl.version()?),
            encoding: decl.encoding().transpose()?.map(|e| lossy(&e)),
            standalone: decl.standalone().transpose()?.map(|s| lossy(&s)),
        })
    }

    fn to_event(&self) -> BytesDecl<'_> {
        BytesDecl::new(&self.version, self.encoding.as_deref(), self.standalone.as_deref())
    }
}

/// Child-index path from the root element to a descendant
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Path of the root element itself
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the `index`-th child node below this path
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Child indices, outermost first
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// XML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Child nodes
    pub children: Vec<Node>,
}

impl Element {
    /// Empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder: add a child element holding `text`
    pub fn with_text_child(self, name: &str, text: &str) -> Self {
        let mut child = Element::new(name);
        child.set_text(text);
        self.with_child(child)
    }

    fn from_start(start: &BytesStart<'_>) -> SyncResult<Self> {
        let mut element = Element::new(lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = lossy(attr.key.as_ref());
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// Attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element named `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// First child element named `name`, mutably
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of the first child named `name`
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    /// Replace all content with `text`
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }

    /// Set the text of child `name`, appending the child when missing
    pub fn set_child_text(&mut self, name: &str, text: &str) {
        match self.child_mut(name) {
            Some(child) => child.set_text(text),
            None => {
                let mut child = Element::new(name);
                child.set_text(text);
                self.children.push(Node::Element(child));
            }
        }
    }

    /// Descendant element at `path`
    pub fn element_at(&self, path: &NodePath) -> Option<&Element> {
        let mut current = self;
        for &index in path.indices() {
            current = match current.children.get(index)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Descendant element at `path`, mutably
    pub fn element_at_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut current = self;
        for &index in path.indices() {
            current = match current.children.get_mut(index)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Paths of the elements reached by following tag names `names`
    pub fn select(&self, names: &[&str]) -> Vec<NodePath> {
        let mut found = Vec::new();
        self.select_into(names, NodePath::root(), &mut found);
        found
    }

    fn select_into(&self, names: &[&str], here: NodePath, found: &mut Vec<NodePath>) {
        let Some((head, rest)) = names.split_first() else {
            found.push(here);
            return;
        };
        for (index, node) in self.children.iter().enumerate() {
            if let Node::Element(child) = node {
                if child.name == *head {
                    child.select_into(rest, here.child(index), found);
                }
            }
        }
    }

    /// Visit every descendant element depth-first, this element included
    pub fn walk<F: FnMut(&NodePath, &Element)>(&self, visit: &mut F) {
        self.walk_from(&NodePath::root(), visit);
    }

    fn walk_from<F: FnMut(&NodePath, &Element)>(&self, here: &NodePath, visit: &mut F) {
        visit(here, self);
        for (index, node) in self.children.iter().enumerate() {
            if let Node::Element(child) = node {
                child.walk_from(&here.child(index), visit);
            }
        }
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), quick_xml::Error> {
    match node {
        Node::Element(e) => e.write(writer),
        // quotes stay literal in text content
        Node::Text(t) => writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(t)))),
        Node::CData(d) => writer.write_event(Event::CData(BytesCData::new(d.as_str()))),
        Node::Comment(c) => writer.write_event(Event::Comment(BytesText::from_escaped(c.as_str()))),
        Node::Instruction(p) => writer.write_event(Event::PI(BytesText::from_escaped(p.as_str()))),
        Node::DocType(d) => writer.write_event(Event::DocType(BytesText::from_escaped(d.as_str()))),
        Node::Declaration(d) => writer.write_event(Event::Decl(d.to_event())),
    }
}

/// Parsed configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl Document {
    /// Document consisting of a bare root element
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse XML text
    pub fn parse(xml: &str) -> SyncResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let node = match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(Element::from_start(&start)?);
                    continue;
                }
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => return Err(SyncError::Document("unexpected closing tag".into())),
                },
                Event::Empty(start) => Node::Element(Element::from_start(&start)?),
                Event::Text(text) => Node::Text(text.unescape()?.into_owned()),
                Event::CData(data) => Node::CData(lossy(&data)),
                Event::Comment(text) => Node::Comment(lossy(&text)),
                Event::PI(text) => Node::Instruction(lossy(&text)),
                Event::DocType(text) => Node::DocType(lossy(&text)),
                Event::Decl(decl) => Node::Declaration(Declaration::from_event(&decl)?),
                Event::Eof => break,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match node {
                Node::Element(element) => {
                    if root.is_some() {
                        return Err(SyncError::Document("more than one root element".into()));
                    }
                    root = Some(element);
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = stack.last() {
            return Err(SyncError::Document(format!("unclosed element <{}>", open.name)));
        }
        let root = root.ok_or_else(|| SyncError::Document("no root element".into()))?;

        Ok(Self { prolog, root, epilog })
    }

    /// Read and parse a file
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Serialize to XML text
    pub fn to_xml(&self) -> SyncResult<String> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        self.root.write(&mut writer)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }
        String::from_utf8(writer.into_inner()).map_err(|e| SyncError::Document(e.to_string()))
    }

    /// Replace the file at `path` in one rename, keeping its permissions
    pub fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let xml = self.to_xml()?;
        let staging = staging_path(path);
        std::fs::write(&staging, xml)?;

        let replaced = match std::fs::metadata(path) {
            Ok(existing) => std::fs::set_permissions(&staging, existing.permissions()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
        .and_then(|()| std::fs::rename(&staging, path));

        if let Err(e) = replaced {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }

    /// Root element
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Root element, mutably
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".relaysync-tmp");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<opnsense>
  <!-- managed -->
  <openvpn>
    <openvpn-client>
      <vpnid>1</vpnid>
      <description>NordVPN Main</description>
      <server_addr>10.0.0.1</server_addr>
      <custom_options><![CDATA[remote-random]]></custom_options>
    </openvpn-client>
  </openvpn>
  <system><hostname>fw &amp; gw</hostname><empty/></system>
</opnsense>
"#;

    #[test]
    fn test_round_trip_preserves_layout() {
        let doc = Document::parse(SAMPLE).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0"?>"#));
        assert!(xml.contains("<!-- managed -->"));
        assert!(xml.contains("<![CDATA[remote-random]]>"));
        assert!(xml.contains("<hostname>fw &amp; gw</hostname>"));
        assert!(xml.contains("<empty/>"));
        assert!(xml.contains("\n    <openvpn-client>\n      <vpnid>1</vpnid>"));
        assert_eq!(Document::parse(&xml).unwrap(), doc);
    }

    #[test]
    fn test_select_and_mutate() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let paths = doc.root().select(&["openvpn", "openvpn-client"]);
        assert_eq!(paths.len(), 1);

        let client = doc.root_mut().element_at_mut(&paths[0]).unwrap();
        assert_eq!(client.child_text("description").as_deref(), Some("NordVPN Main"));
        client.set_child_text("server_addr", "5.6.7.8");
        client.set_child_text("server_port", "1194");

        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("<server_addr>5.6.7.8</server_addr>"));
        assert!(xml.contains("<server_port>1194</server_port>"));
        assert_eq!(doc.root().child("system").unwrap().child_text("hostname").unwrap(), "fw & gw");
    }

    #[test]
    fn test_walk_visits_all_elements() {
        let doc = Document::parse(SAMPLE).unwrap();
        let mut names = Vec::new();
        doc.root().walk(&mut |path, element| {
            assert_eq!(doc.root().element_at(path).unwrap().name, element.name);
            names.push(element.name.clone());
        });
        assert_eq!(names.first().map(String::as_str), Some("opnsense"));
        assert!(names.contains(&"custom_options".to_string()));
        assert!(names.contains(&"empty".to_string()));
    }

    #[test]
    fn test_attributes() {
        let doc = Document::parse(r#"<a><client uuid="a&quot;b" enabled="1"/></a>"#).unwrap();
        let client = doc.root().child("client").unwrap();
        assert_eq!(client.attribute("uuid"), Some("a\"b"));
        assert_eq!(client.attribute("missing"), None);
        assert_eq!(doc.to_xml().unwrap(), r#"<a><client uuid="a&quot;b" enabled="1"/></a>"#);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("<a><b>").is_err());
        assert!(Document::parse("<a/><b/>").is_err());
        assert!(Document::parse("   ").is_err());
    }

    #[test]
    fn test_save_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<opnsense/>").unwrap();

        let doc = Document::new(Element::new("opnsense").with_text_child("version", "24.7"));
        doc.save(&path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<opnsense><version>24.7</version></opnsense>"
        );
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_quotes_in_text_written_literally() {
        let xml = r#"<d><n>it's "q" &amp; &lt;x&gt;</n></d>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.root().child_text("n").unwrap(), r#"it's "q" & <x>"#);
        assert_eq!(doc.to_xml().unwrap(), xml);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<opnsense/>").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        Document::parse("<opnsense><version>24.7</version></opnsense>")
            .unwrap()
            .save(&path)
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<opnsense><version>24.7</version></opnsense>"
        );
    }
}
