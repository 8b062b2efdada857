//! Read-only dump of the WireGuard structure of `config.xml`

use crate::document::{Element, Node};
use serde::Serialize;
use std::fmt;

/// One `client` element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientEntry {
    /// Slash-separated tag path from the root
    pub path: String,
    /// `name` child text
    pub name: Option<String>,
    /// `uuid` attribute
    pub uuid: Option<String>,
    /// `serveraddress` child text
    pub serveraddress: Option<String>,
    /// Whether a non-empty `pubkey` child exists
    pub has_pubkey: bool,
}

/// WireGuard-related elements of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WireGuardReport {
    /// Paths of elements whose tag mentions wireguard
    pub wireguard_paths: Vec<String>,
    /// Every `client` element
    pub clients: Vec<ClientEntry>,
}

/// Collect the WireGuard structure below `root`
pub fn inspect_wireguard(root: &Element) -> WireGuardReport {
    let mut report = WireGuardReport::default();
    visit(root, &root.name, &mut report);
    report
}

fn visit(element: &Element, path: &str, report: &mut WireGuardReport) {
    if element.name.to_ascii_lowercase().contains("wireguard") {
        report.wireguard_paths.push(path.to_string());
    }
    if element.name == "client" {
        report.clients.push(ClientEntry {
            path: path.to_string(),
            name: element.child_text("name"),
            uuid: element.attribute("uuid").map(String::from),
            serveraddress: element.child_text("serveraddress"),
            has_pubkey: element
                .child_text("pubkey")
                .is_some_and(|key| !key.trim().is_empty()),
        });
    }

    for node in &element.children {
        if let Node::Element(child) = node {
            visit(child, &format!("{}/{}", path, child.name), report);
        }
    }
}

impl fmt::Display for WireGuardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "WireGuard elements: {}", self.wireguard_paths.len())?;
        for path in &self.wireguard_paths {
            writeln!(f, "  {}", path)?;
        }

        writeln!(f, "Client elements: {}", self.clients.len())?;
        for client in &self.clients {
            writeln!(f, "  {}", client.path)?;
            writeln!(f, "    name:          {}", client.name.as_deref().unwrap_or("-"))?;
            writeln!(f, "    uuid:          {}", client.uuid.as_deref().unwrap_or("-"))?;
            writeln!(f, "    serveraddress: {}", client.serveraddress.as_deref().unwrap_or("-"))?;
            writeln!(f, "    pubkey:        {}", if client.has_pubkey { "present" } else { "missing" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    const CONFIG: &str = r#"<opnsense>
  <OPNsense>
    <wireguard>
      <general><enabled>1</enabled></general>
      <client>
        <clients>
          <client uuid="7d1c"><name>WG Main</name><pubkey>a2V5</pubkey><serveraddress>1.1.1.1</serveraddress></client>
          <client><name>WG Spare</name><pubkey/></client>
        </clients>
      </client>
    </wireguard>
  </OPNsense>
  <WireGuardLegacy/>
</opnsense>"#;

    #[test]
    fn test_lists_wireguard_paths() {
        let doc = Document::parse(CONFIG).unwrap();
        let report = inspect_wireguard(doc.root());
        assert_eq!(
            report.wireguard_paths,
            vec!["opnsense/OPNsense/wireguard", "opnsense/WireGuardLegacy"]
        );
    }

    #[test]
    fn test_lists_clients() {
        let doc = Document::parse(CONFIG).unwrap();
        let report = inspect_wireguard(doc.root());
        let paths: Vec<_> = report.clients.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "opnsense/OPNsense/wireguard/client",
                "opnsense/OPNsense/wireguard/client/clients/client",
                "opnsense/OPNsense/wireguard/client/clients/client",
            ]
        );

        let main = &report.clients[1];
        assert_eq!(main.name.as_deref(), Some("WG Main"));
        assert_eq!(main.uuid.as_deref(), Some("7d1c"));
        assert_eq!(main.serveraddress.as_deref(), Some("1.1.1.1"));
        assert!(main.has_pubkey);

        let spare = &report.clients[2];
        assert_eq!(spare.uuid, None);
        assert!(!spare.has_pubkey);
    }

    #[test]
    fn test_text_rendering() {
        let doc = Document::parse(CONFIG).unwrap();
        let text = inspect_wireguard(doc.root()).to_string();
        assert!(text.starts_with("WireGuard elements: 2\n"));
        assert!(text.contains("Client elements: 3\n"));
        assert!(text.contains("    name:          WG Spare\n    uuid:          -\n"));
        assert!(text.contains("    pubkey:        missing\n"));
    }

    #[test]
    fn test_document_without_wireguard() {
        let doc = Document::parse("<opnsense><system/></opnsense>").unwrap();
        assert_eq!(inspect_wireguard(doc.root()), WireGuardReport::default());
    }
}
