//! Message registry
//!
//! Maps opcode values between the two revisions. Built once at startup from
//! the intersection of both catalogs by message name, then shared read-only.
//! A miss on lookup is a normal outcome (the message exists in only one
//! revision, or was never assigned an opcode) and is never an error.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::proto::SchemaCatalog;

/// Packet travel direction through the shim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Payload arrives NEW-encoded and must leave OLD-encoded
    ClientToServer,
    /// Payload arrives OLD-encoded and must leave NEW-encoded
    ServerToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client->server"),
            Direction::ServerToClient => write!(f, "server->client"),
        }
    }
}

/// An opcode value qualified by its travel direction. The direction decides
/// which revision's numbering the value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub value: u16,
    pub direction: Direction,
}

impl Opcode {
    pub fn new(value: u16, direction: Direction) -> Self {
        Self { value, direction }
    }
}

/// One message present in both revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub old_opcode: u16,
    pub new_opcode: u16,
}

impl RegistryEntry {
    /// Opcode value this entry carries on arrival for the given direction
    pub fn incoming(&self, direction: Direction) -> u16 {
        match direction {
            Direction::ClientToServer => self.new_opcode,
            Direction::ServerToClient => self.old_opcode,
        }
    }

    /// Opcode value this entry must carry on departure
    pub fn outgoing(&self, direction: Direction) -> u16 {
        match direction {
            Direction::ClientToServer => self.old_opcode,
            Direction::ServerToClient => self.new_opcode,
        }
    }
}

/// Opcode mapping between revisions, indexed for both directions
#[derive(Debug)]
pub struct MessageRegistry {
    entries: Vec<RegistryEntry>,
    by_new_opcode: HashMap<u16, usize>,
    by_old_opcode: HashMap<u16, usize>,
    by_name: HashMap<String, usize>,
}

impl MessageRegistry {
    /// Build the registry from both catalogs. Messages present in only one
    /// revision are skipped; they will pass through the shim untouched.
    pub fn build(new_catalog: &SchemaCatalog, old_catalog: &SchemaCatalog) -> Self {
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for name in new_catalog.dispatchable_names() {
            let Some(new_opcode) = new_catalog.opcode_of(name) else {
                continue;
            };
            match old_catalog.opcode_of(name) {
                Some(old_opcode) => entries.push(RegistryEntry {
                    name: name.to_string(),
                    old_opcode,
                    new_opcode,
                }),
                None => {
                    debug!(message = name, "Message absent from old revision, passthrough");
                    skipped += 1;
                }
            }
        }

        // Deterministic order helps log diffing between runs
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut by_new_opcode = HashMap::with_capacity(entries.len());
        let mut by_old_opcode = HashMap::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            by_new_opcode.insert(entry.new_opcode, index);
            by_old_opcode.insert(entry.old_opcode, index);
            by_name.insert(entry.name.clone(), index);
        }

        info!(
            registered = entries.len(),
            skipped, "Message registry built"
        );

        Self {
            entries,
            by_new_opcode,
            by_old_opcode,
            by_name,
        }
    }

    /// Look up the entry for an incoming opcode. `None` means passthrough.
    pub fn lookup(&self, opcode: Opcode) -> Option<&RegistryEntry> {
        let index = match opcode.direction {
            Direction::ClientToServer => self.by_new_opcode.get(&opcode.value)?,
            Direction::ServerToClient => self.by_old_opcode.get(&opcode.value)?,
        };
        Some(&self.entries[*index])
    }

    pub fn lookup_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_name.get(name).map(|i| &self.entries[*i])
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogs() -> (SchemaCatalog, SchemaCatalog) {
        let new_catalog = SchemaCatalog::from_json(
            r#"{
                "revision": "new",
                "messages": [
                    { "name": "PingReq", "opcode": 4101, "fields": [] },
                    { "name": "PingRsp", "opcode": 4102, "fields": [] },
                    { "name": "BrandNewReq", "opcode": 4999, "fields": [] },
                    { "name": "Vector", "fields": [] }
                ]
            }"#,
        )
        .unwrap();
        let old_catalog = SchemaCatalog::from_json(
            r#"{
                "revision": "old",
                "messages": [
                    { "name": "PingReq", "opcode": 301, "fields": [] },
                    { "name": "PingRsp", "opcode": 302, "fields": [] },
                    { "name": "RetiredNtf", "opcode": 399, "fields": [] }
                ]
            }"#,
        )
        .unwrap();
        (new_catalog, old_catalog)
    }

    #[test]
    fn test_registry_intersection() {
        let (new_catalog, old_catalog) = catalogs();
        let registry = MessageRegistry::build(&new_catalog, &old_catalog);

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup_name("BrandNewReq").is_none());
        assert!(registry.lookup_name("RetiredNtf").is_none());
        assert!(registry.lookup_name("Vector").is_none());
    }

    #[test]
    fn test_lookup_both_directions() {
        let (new_catalog, old_catalog) = catalogs();
        let registry = MessageRegistry::build(&new_catalog, &old_catalog);

        let entry = registry
            .lookup(Opcode::new(4101, Direction::ClientToServer))
            .unwrap();
        assert_eq!(entry.name, "PingReq");
        assert_eq!(entry.outgoing(Direction::ClientToServer), 301);

        let entry = registry
            .lookup(Opcode::new(302, Direction::ServerToClient))
            .unwrap();
        assert_eq!(entry.name, "PingRsp");
        assert_eq!(entry.outgoing(Direction::ServerToClient), 4102);
    }

    #[test]
    fn test_miss_is_none() {
        let (new_catalog, old_catalog) = catalogs();
        let registry = MessageRegistry::build(&new_catalog, &old_catalog);

        // Old-revision numbering queried in the client->server direction
        assert!(registry
            .lookup(Opcode::new(301, Direction::ClientToServer))
            .is_none());
        assert!(registry
            .lookup(Opcode::new(399, Direction::ClientToServer))
            .is_none());
    }

    #[test]
    fn test_incoming_outgoing_are_inverse() {
        let entry = RegistryEntry {
            name: "PingReq".into(),
            old_opcode: 301,
            new_opcode: 4101,
        };
        for direction in [Direction::ClientToServer, Direction::ServerToClient] {
            assert_ne!(entry.incoming(direction), entry.outgoing(direction));
        }
        assert_eq!(
            entry.incoming(Direction::ClientToServer),
            entry.outgoing(Direction::ServerToClient)
        );
    }
}
