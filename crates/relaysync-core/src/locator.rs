//! Locates the client entry of a tunnel inside `config.xml`
//!
//! Each tunnel kind has an ordered list of strategies. The first strategy
//! that finds a match wins; a miss everywhere is `None`, never an error.

use crate::config::TunnelKind;
use crate::document::{Element, NodePath};

/// One way of finding a client entry by name
pub trait LocatorStrategy: Send + Sync {
    /// Short label for logs
    fn label(&self) -> String;

    /// Path of the matching element below `root`
    fn locate(&self, root: &Element, name: &str) -> Option<NodePath>;
}

/// Fixed element path whose `field` child equals the name
pub struct FieldMatch {
    path: Vec<&'static str>,
    field: &'static str,
}

impl FieldMatch {
    /// Match `path` elements on their `field` child
    pub fn new(path: &[&'static str], field: &'static str) -> Self {
        Self {
            path: path.to_vec(),
            field,
        }
    }
}

impl LocatorStrategy for FieldMatch {
    fn label(&self) -> String {
        format!("{}[{}]", self.path.join("/"), self.field)
    }

    fn locate(&self, root: &Element, name: &str) -> Option<NodePath> {
        root.select(&self.path).into_iter().find(|path| {
            root.element_at(path)
                .and_then(|e| e.child_text(self.field))
                .is_some_and(|text| text == name)
        })
    }
}

/// Any element with tag `tag` anywhere in the document
pub struct DescendantScan {
    tag: &'static str,
    field: &'static str,
}

impl DescendantScan {
    /// Scan every `tag` element for a matching `field` child
    pub fn new(tag: &'static str, field: &'static str) -> Self {
        Self { tag, field }
    }
}

impl LocatorStrategy for DescendantScan {
    fn label(&self) -> String {
        format!("//{}[{}]", self.tag, self.field)
    }

    fn locate(&self, root: &Element, name: &str) -> Option<NodePath> {
        let mut found = None;
        root.walk(&mut |path, element| {
            if found.is_none()
                && element.name == self.tag
                && element.child_text(self.field).is_some_and(|text| text == name)
            {
                found = Some(path.clone());
            }
        });
        found
    }
}

/// Strategies for one tunnel kind, highest priority first
pub struct Locator {
    strategies: Vec<Box<dyn LocatorStrategy>>,
}

impl Locator {
    /// Locator from explicit strategies
    pub fn new(strategies: Vec<Box<dyn LocatorStrategy>>) -> Self {
        Self { strategies }
    }

    /// Known `config.xml` shapes for `kind`
    pub fn for_kind(kind: TunnelKind) -> Self {
        match kind {
            TunnelKind::OpenVpn => Self::new(vec![Box::new(FieldMatch::new(
                &["openvpn", "openvpn-client"],
                "description",
            ))]),
            TunnelKind::WireGuard => Self::new(vec![
                Box::new(FieldMatch::new(&["OPNsense", "wireguard", "client", "clients", "client"], "name")),
                Box::new(FieldMatch::new(&["wireguard", "client"], "name")),
                Box::new(DescendantScan::new("client", "name")),
            ]),
        }
    }

    /// Path of the client entry named `name`
    pub fn locate(&self, root: &Element, name: &str) -> Option<NodePath> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.locate(root, name);
            if found.is_some() {
                tracing::debug!(tunnel = name, strategy = %strategy.label(), "client entry located");
            }
            found
        })
    }
}
